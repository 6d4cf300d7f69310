//! Docker engine implementation using bollard

use crate::{
    ContainerDetails, ContainerEngine, ContainerId, ContainerStats, ContainerStatus,
    ContainerSummary, CreateContainerConfig, CreateNetworkConfig, CreateVolumeConfig,
    EngineError, EngineInfo, HostInfo, LogConfig, LogStream, MountConfig, MountType,
    NetworkSummary, Outcome, PortConfig, PruneKind, PruneResult, ResourceLimits, Result,
    VolumeSummary,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, LogsOptions, NetworkingConfig, PruneContainersOptions,
    RemoveContainerOptions, RenameContainerOptions, RestartContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions, UpdateContainerOptions,
};
use bollard::image::PruneImagesOptions;
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions, ListNetworksOptions,
    PruneNetworksOptions,
};
use bollard::service::{
    EndpointSettings, HostConfig, Ipam, IpamConfig, Mount, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::volume::{
    CreateVolumeOptions, ListVolumesOptions, PruneVolumesOptions, RemoveVolumeOptions,
};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Docker engine using bollard crate
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect to a Docker-compatible engine and verify it answers
    pub async fn connect(socket_path: &str, timeout_secs: u64) -> Result<Self> {
        let client = if socket_path.starts_with("http://") || socket_path.starts_with("https://")
        {
            Docker::connect_with_http(socket_path, timeout_secs, bollard::API_DEFAULT_VERSION)
                .map_err(|e| EngineError::ConnectionError(e.to_string()))?
        } else {
            let path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(path, timeout_secs, bollard::API_DEFAULT_VERSION)
                .map_err(|e| EngineError::ConnectionError(e.to_string()))?
        };

        client
            .ping()
            .await
            .map_err(|e| EngineError::ConnectionError(e.to_string()))?;

        tracing::debug!("Connected to container engine at {}", socket_path);
        Ok(Self { client })
    }

    /// Get the underlying Docker client
    pub fn client(&self) -> &Docker {
        &self.client
    }
}

/// Treat the engine's 304 reply as "already there"
fn idempotent(result: std::result::Result<(), bollard::errors::Error>) -> Result<Outcome> {
    match result {
        Ok(()) => Ok(Outcome::Applied),
        Err(e) if EngineError::is_not_modified(&e) => Ok(Outcome::NoOp),
        Err(e) => Err(e.into()),
    }
}

fn none_if_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}

fn restart_policy_enum(name: &str) -> RestartPolicyNameEnum {
    match name {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "no" => RestartPolicyNameEnum::NO,
        _ => RestartPolicyNameEnum::EMPTY,
    }
}

fn restart_policy_name(policy: &RestartPolicyNameEnum) -> Option<String> {
    match policy {
        RestartPolicyNameEnum::ALWAYS => Some("always".to_string()),
        RestartPolicyNameEnum::UNLESS_STOPPED => Some("unless-stopped".to_string()),
        RestartPolicyNameEnum::ON_FAILURE => Some("on-failure".to_string()),
        RestartPolicyNameEnum::NO => Some("no".to_string()),
        _ => None,
    }
}

fn network_from_model(net: bollard::models::Network) -> NetworkSummary {
    let ipam_config = net
        .ipam
        .as_ref()
        .and_then(|ipam| ipam.config.as_ref())
        .and_then(|configs| configs.first().cloned());

    let mut containers: Vec<String> = net
        .containers
        .unwrap_or_default()
        .into_iter()
        .map(|(id, c)| c.name.unwrap_or(id))
        .collect();
    containers.sort();

    NetworkSummary {
        id: net.id.unwrap_or_default(),
        name: net.name.unwrap_or_default(),
        driver: net.driver.unwrap_or_default(),
        subnet: ipam_config.as_ref().and_then(|c| c.subnet.clone()),
        gateway: ipam_config.as_ref().and_then(|c| c.gateway.clone()),
        created: net.created.as_deref().and_then(parse_timestamp).unwrap_or(0),
        labels: net.labels.unwrap_or_default(),
        containers,
    }
}

fn volume_from_model(vol: bollard::models::Volume) -> VolumeSummary {
    VolumeSummary {
        created: vol.created_at.as_deref().and_then(parse_timestamp).unwrap_or(0),
        name: vol.name,
        driver: vol.driver,
        mountpoint: vol.mountpoint,
        labels: vol.labels,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .and_then(|n| n.first().cloned())
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                image: c.image.unwrap_or_default(),
                status: c
                    .state
                    .as_deref()
                    .map(ContainerStatus::from)
                    .unwrap_or(ContainerStatus::Unknown),
                status_text: c.status.unwrap_or_default(),
                created: c.created.unwrap_or(0),
                labels: c.labels.unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PortConfig {
                        host_port: p.public_port,
                        container_port: p.private_port,
                        protocol: p
                            .typ
                            .map(|t| format!("{:?}", t).to_lowercase())
                            .unwrap_or_else(|| "tcp".to_string()),
                        host_ip: p.ip,
                    })
                    .collect(),
                networks: c
                    .network_settings
                    .and_then(|ns| ns.networks)
                    .map(|nets| nets.into_keys().collect())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails> {
        let info = self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        let state = info.state.as_ref();
        let status = state
            .and_then(|s| s.status)
            .map(|s| ContainerStatus::from(format!("{:?}", s).to_lowercase().as_str()))
            .unwrap_or(ContainerStatus::Unknown);

        let config = info.config.as_ref();
        let host_config = info.host_config.as_ref();

        let mounts = info
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| {
                let mount_type = m
                    .typ
                    .map(|t| MountType::from(format!("{:?}", t).as_str()))
                    .unwrap_or(MountType::Bind);
                MountConfig {
                    source: match mount_type {
                        MountType::Volume => m.name.unwrap_or_default(),
                        _ => m.source.unwrap_or_default(),
                    },
                    mount_type,
                    target: m.destination.unwrap_or_default(),
                    read_only: m.rw.map(|rw| !rw).unwrap_or(false),
                }
            })
            .collect();

        let mut ports = Vec::new();
        if let Some(port_map) = host_config.and_then(|hc| hc.port_bindings.as_ref()) {
            for (container_port, bindings) in port_map {
                let mut parts = container_port.split('/');
                let port_num: u16 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
                let protocol = parts.next().unwrap_or("tcp").to_string();

                match bindings {
                    Some(bindings) if !bindings.is_empty() => {
                        for binding in bindings {
                            ports.push(PortConfig {
                                container_port: port_num,
                                host_port: binding.host_port.as_ref().and_then(|p| p.parse().ok()),
                                protocol: protocol.clone(),
                                host_ip: binding.host_ip.clone().filter(|ip| !ip.is_empty()),
                            });
                        }
                    }
                    _ => ports.push(PortConfig {
                        container_port: port_num,
                        host_port: None,
                        protocol,
                        host_ip: None,
                    }),
                }
            }
        }
        ports.sort_by_key(|p| (p.container_port, p.host_port));

        let mut networks: Vec<String> = info
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.as_ref())
            .map(|nets| nets.keys().cloned().collect())
            .unwrap_or_default();
        networks.sort();

        let resources = ResourceLimits {
            cpu_shares: host_config.and_then(|hc| hc.cpu_shares).unwrap_or(0),
            nano_cpus: host_config.and_then(|hc| hc.nano_cpus).unwrap_or(0),
            memory_bytes: host_config.and_then(|hc| hc.memory).unwrap_or(0),
        };

        let restart_policy = host_config
            .and_then(|hc| hc.restart_policy.as_ref())
            .and_then(|rp| rp.name.as_ref())
            .and_then(restart_policy_name);

        Ok(ContainerDetails {
            id: ContainerId::new(info.id.clone().unwrap_or_default()),
            name: info
                .name
                .clone()
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.and_then(|c| c.image.clone()).unwrap_or_default(),
            image_id: info.image.clone().unwrap_or_default(),
            status,
            created: info
                .created
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(0),
            started_at: state
                .and_then(|s| s.started_at.as_deref())
                .and_then(parse_timestamp),
            finished_at: state
                .and_then(|s| s.finished_at.as_deref())
                .and_then(parse_timestamp),
            exit_code: state.and_then(|s| s.exit_code),
            labels: config.and_then(|c| c.labels.clone()).unwrap_or_default(),
            env: config.and_then(|c| c.env.clone()).unwrap_or_default(),
            cmd: config.and_then(|c| c.cmd.clone()).unwrap_or_default(),
            mounts,
            ports,
            networks,
            restart_policy,
            resources,
            log_path: info.log_path.clone().filter(|p| !p.is_empty()),
        })
    }

    async fn create_container(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        });

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();

        for port in &config.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: port.host_port.map(|p| p.to_string()),
            };
            port_bindings
                .entry(container_port)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(binding);
        }

        let mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.clone()),
                typ: Some(match m.mount_type {
                    MountType::Bind => bollard::service::MountTypeEnum::BIND,
                    MountType::Volume => bollard::service::MountTypeEnum::VOLUME,
                    MountType::Tmpfs => bollard::service::MountTypeEnum::TMPFS,
                }),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let limits = &config.resources;
        let host_config = HostConfig {
            mounts: none_if_empty(mounts),
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            network_mode: config.network_mode.clone(),
            privileged: Some(config.privileged),
            restart_policy: config.restart_policy.as_deref().map(|name| RestartPolicy {
                name: Some(restart_policy_enum(name)),
                maximum_retry_count: None,
            }),
            cpu_shares: (limits.cpu_shares > 0).then_some(limits.cpu_shares),
            nano_cpus: (limits.nano_cpus > 0).then_some(limits.nano_cpus),
            memory: (limits.memory_bytes > 0).then_some(limits.memory_bytes),
            ..Default::default()
        };

        let networking_config = match (&config.network_mode, config.network_aliases.is_empty()) {
            (Some(network), false) => Some(NetworkingConfig {
                endpoints_config: HashMap::from([(
                    network.clone(),
                    EndpointSettings {
                        aliases: Some(config.network_aliases.clone()),
                        ..Default::default()
                    },
                )]),
            }),
            _ => None,
        };

        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            entrypoint: config.entrypoint.clone(),
            env: none_if_empty(env),
            working_dir: config.working_dir.clone(),
            hostname: config.hostname.clone(),
            tty: Some(config.tty),
            open_stdin: Some(config.stdin_open),
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        let response = self
            .client
            .create_container(options, container_config)
            .await?;

        for warning in &response.warnings {
            tracing::warn!("Engine warning creating {:?}: {}", config.name, warning);
        }

        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, name: &str) -> Result<Outcome> {
        idempotent(
            self.client
                .start_container(name, None::<StartContainerOptions<String>>)
                .await,
        )
    }

    async fn stop(&self, name: &str, grace_secs: Option<u32>) -> Result<Outcome> {
        let options = StopContainerOptions {
            t: grace_secs.unwrap_or(10) as i64,
        };
        idempotent(self.client.stop_container(name, Some(options)).await)
    }

    async fn restart(&self, name: &str, grace_secs: Option<u32>) -> Result<()> {
        let options = RestartContainerOptions {
            t: grace_secs.unwrap_or(10) as isize,
        };
        self.client.restart_container(name, Some(options)).await?;
        Ok(())
    }

    async fn pause(&self, name: &str) -> Result<Outcome> {
        match self.client.pause_container(name).await {
            Ok(()) => Ok(Outcome::Applied),
            Err(e) => match EngineError::from(e) {
                EngineError::Conflict(msg) if msg.contains("already paused") => Ok(Outcome::NoOp),
                other => Err(other),
            },
        }
    }

    async fn unpause(&self, name: &str) -> Result<Outcome> {
        match self.client.unpause_container(name).await {
            Ok(()) => Ok(Outcome::Applied),
            Err(e) => match EngineError::from(e) {
                EngineError::Conflict(msg) if msg.contains("not paused") => Ok(Outcome::NoOp),
                other => Err(other),
            },
        }
    }

    async fn kill(&self, name: &str, signal: Option<&str>) -> Result<()> {
        let options = KillContainerOptions {
            signal: signal.unwrap_or("SIGKILL"),
        };
        self.client.kill_container(name, Some(options)).await?;
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client.remove_container(name, Some(options)).await?;
        Ok(())
    }

    async fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        let options = RenameContainerOptions { name: new_name };
        self.client.rename_container(name, options).await?;
        Ok(())
    }

    async fn update_resources(&self, name: &str, limits: &ResourceLimits) -> Result<()> {
        let options = UpdateContainerOptions::<String> {
            cpu_shares: Some(limits.cpu_shares as isize),
            nano_cp_us: Some(limits.nano_cpus),
            memory: Some(limits.memory_bytes),
            // swap must be at least memory; -1 lifts the swap limit with it
            memory_swap: (limits.memory_bytes > 0).then_some(-1),
            ..Default::default()
        };
        self.client.update_container(name, options).await?;
        Ok(())
    }

    async fn stats(&self, name: &str) -> Result<ContainerStats> {
        // a non-streaming read still samples twice so precpu is populated
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut stream = self.client.stats(name, Some(options));

        let stats = match stream.next().await {
            Some(result) => result?,
            None => {
                return Err(EngineError::RuntimeError(format!(
                    "no stats returned for container {}",
                    name
                )))
            }
        };

        let cpu_delta = stats
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
        let system_delta = stats
            .cpu_stats
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or_else(|| {
            stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|v| v.len() as u64)
                .unwrap_or(1)
        });
        let cpu_percent = if system_delta > 0 && cpu_delta > 0 {
            (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
        } else {
            0.0
        };

        let (net_rx_bytes, net_tx_bytes) = stats
            .networks
            .as_ref()
            .map(|nets| {
                nets.values().fold((0u64, 0u64), |(rx, tx), n| {
                    (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
                })
            })
            .unwrap_or((0, 0));

        let (block_read_bytes, block_write_bytes) = stats
            .blkio_stats
            .io_service_bytes_recursive
            .as_ref()
            .map(|entries| {
                entries.iter().fold((0u64, 0u64), |(r, w), e| {
                    match e.op.to_lowercase().as_str() {
                        "read" => (r.saturating_add(e.value), w),
                        "write" => (r, w.saturating_add(e.value)),
                        _ => (r, w),
                    }
                })
            })
            .unwrap_or((0, 0));

        Ok(ContainerStats {
            cpu_percent,
            mem_usage_bytes: stats.memory_stats.usage.unwrap_or(0),
            mem_limit_bytes: stats.memory_stats.limit.unwrap_or(0),
            net_rx_bytes,
            net_tx_bytes,
            block_read_bytes,
            block_write_bytes,
            read_at: parse_timestamp(&stats.read).unwrap_or(0),
        })
    }

    async fn logs(&self, name: &str, config: &LogConfig) -> Result<LogStream> {
        let options = LogsOptions {
            follow: config.follow,
            stdout: config.stdout,
            stderr: config.stderr,
            tail: config
                .tail
                .map(|t| t.to_string())
                .unwrap_or_else(|| "all".to_string()),
            timestamps: config.timestamps,
            since: config.since.unwrap_or(0),
            until: config.until.unwrap_or(0),
        };

        let stream = self.client.logs(name, Some(options));
        let reader = LogOutputReader::new(stream);

        Ok(LogStream {
            stream: Box::pin(reader),
        })
    }

    async fn prune(&self, kind: PruneKind) -> Result<PruneResult> {
        let result = match kind {
            PruneKind::Containers => {
                let response = self
                    .client
                    .prune_containers(Some(PruneContainersOptions::<String> {
                        filters: HashMap::new(),
                    }))
                    .await?;
                PruneResult {
                    deleted: response.containers_deleted.unwrap_or_default(),
                    space_reclaimed: response.space_reclaimed.unwrap_or(0).max(0) as u64,
                }
            }
            PruneKind::Images => {
                let filters =
                    HashMap::from([("dangling".to_string(), vec!["true".to_string()])]);
                let response = self
                    .client
                    .prune_images(Some(PruneImagesOptions { filters }))
                    .await?;
                PruneResult {
                    deleted: response
                        .images_deleted
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|item| item.deleted.or(item.untagged))
                        .collect(),
                    space_reclaimed: response.space_reclaimed.unwrap_or(0).max(0) as u64,
                }
            }
            PruneKind::Volumes => {
                let response = self
                    .client
                    .prune_volumes(Some(PruneVolumesOptions::<String> {
                        filters: HashMap::new(),
                    }))
                    .await?;
                PruneResult {
                    deleted: response.volumes_deleted.unwrap_or_default(),
                    space_reclaimed: response.space_reclaimed.unwrap_or(0).max(0) as u64,
                }
            }
            PruneKind::Networks => {
                let response = self
                    .client
                    .prune_networks(Some(PruneNetworksOptions::<String> {
                        filters: HashMap::new(),
                    }))
                    .await?;
                PruneResult {
                    deleted: response.networks_deleted.unwrap_or_default(),
                    space_reclaimed: 0,
                }
            }
        };

        tracing::debug!(
            "Pruned {} {} ({} bytes)",
            result.deleted.len(),
            kind,
            result.space_reclaimed
        );
        Ok(result)
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        let networks = self
            .client
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?;
        Ok(networks.into_iter().map(network_from_model).collect())
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkSummary> {
        let network = self
            .client
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await?;
        Ok(network_from_model(network))
    }

    async fn create_network(&self, config: &CreateNetworkConfig) -> Result<String> {
        let ipam_config = if config.subnet.is_some() || config.gateway.is_some() {
            vec![IpamConfig {
                subnet: config.subnet.clone(),
                gateway: config.gateway.clone(),
                ip_range: config.ip_range.clone(),
                ..Default::default()
            }]
        } else {
            Vec::new()
        };

        let options = CreateNetworkOptions {
            name: config.name.clone(),
            check_duplicate: true,
            driver: if config.driver.is_empty() {
                "bridge".to_string()
            } else {
                config.driver.clone()
            },
            ipam: Ipam {
                config: none_if_empty(ipam_config),
                ..Default::default()
            },
            options: config.options.clone(),
            labels: config.labels.clone(),
            ..Default::default()
        };

        let response = self.client.create_network(options).await?;
        Ok(response.id.unwrap_or_default())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.client.remove_network(name).await?;
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: &[String],
    ) -> Result<()> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings {
                aliases: none_if_empty(aliases.to_vec()),
                ..Default::default()
            },
        };
        self.client.connect_network(network, options).await?;
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>> {
        let response = self
            .client
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(volume_from_model)
            .collect())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeSummary> {
        let volume = self.client.inspect_volume(name).await?;
        Ok(volume_from_model(volume))
    }

    async fn create_volume(&self, config: &CreateVolumeConfig) -> Result<VolumeSummary> {
        let options = CreateVolumeOptions {
            name: config.name.clone(),
            driver: if config.driver.is_empty() {
                "local".to_string()
            } else {
                config.driver.clone()
            },
            driver_opts: config.driver_opts.clone(),
            labels: config.labels.clone(),
        };
        let volume = self.client.create_volume(options).await?;
        Ok(volume_from_model(volume))
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await?;
        Ok(())
    }

    async fn host_info(&self) -> Result<HostInfo> {
        let info = self.client.info().await?;
        Ok(HostInfo {
            cpu_count: info.ncpu.unwrap_or(0).max(0) as u64,
            memory_bytes: info.mem_total.unwrap_or(0).max(0) as u64,
            server_version: info.server_version.unwrap_or_default(),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| EngineError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "docker".to_string(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Reader that converts log output stream to AsyncRead
struct LogOutputReader<S> {
    stream: S,
    buffer: Vec<u8>,
    pos: usize,
}

impl<S> LogOutputReader<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            pos: 0,
        }
    }
}

impl<S> AsyncRead for LogOutputReader<S>
where
    S: futures::Stream<
            Item = std::result::Result<bollard::container::LogOutput, bollard::errors::Error>,
        > + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.pos < self.buffer.len() {
            let remaining = &self.buffer[self.pos..];
            let to_copy = std::cmp::min(remaining.len(), buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.pos += to_copy;
            return std::task::Poll::Ready(Ok(()));
        }

        self.buffer.clear();
        self.pos = 0;

        // Empty frames carry nothing; returning them would read as EOF
        loop {
            match Pin::new(&mut self.stream).poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(output))) => {
                    let data = match output {
                        bollard::container::LogOutput::StdOut { message } => message,
                        bollard::container::LogOutput::StdErr { message } => message,
                        bollard::container::LogOutput::StdIn { message } => message,
                        bollard::container::LogOutput::Console { message } => message,
                    };
                    if data.is_empty() {
                        continue;
                    }
                    self.buffer = data.to_vec();

                    let to_copy = std::cmp::min(self.buffer.len(), buf.remaining());
                    buf.put_slice(&self.buffer[..to_copy]);
                    self.pos = to_copy;
                    return std::task::Poll::Ready(Ok(()));
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    return std::task::Poll::Ready(Err(std::io::Error::other(e.to_string())));
                }
                std::task::Poll::Ready(None) => return std::task::Poll::Ready(Ok(())),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_restart_policy_round_trip() {
        for name in ["always", "unless-stopped", "on-failure", "no"] {
            let policy = restart_policy_enum(name);
            assert_eq!(restart_policy_name(&policy).as_deref(), Some(name));
        }
        assert_eq!(restart_policy_name(&restart_policy_enum("bogus")), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1970-01-01T00:01:00Z"), Some(60));
        assert_eq!(parse_timestamp("0001-01-01T00:00:00Z").map(|t| t < 0), Some(true));
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_network_from_model_collects_attachments() {
        let network = bollard::models::Network {
            name: Some("web".to_string()),
            id: Some("n1".to_string()),
            driver: Some("bridge".to_string()),
            ipam: Some(Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some("172.30.0.0/16".to_string()),
                    gateway: Some("172.30.0.1".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            containers: Some(HashMap::from([(
                "abc".to_string(),
                bollard::models::NetworkContainer {
                    name: Some("api".to_string()),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        };

        let summary = network_from_model(network);
        assert_eq!(summary.name, "web");
        assert_eq!(summary.subnet.as_deref(), Some("172.30.0.0/16"));
        assert_eq!(summary.gateway.as_deref(), Some("172.30.0.1"));
        assert_eq!(summary.containers, vec!["api".to_string()]);
        assert!(summary.is_in_use());
    }

    #[tokio::test]
    async fn test_log_reader_concatenates_frames() {
        let frames = vec![
            Ok(bollard::container::LogOutput::StdOut {
                message: "first\n".into(),
            }),
            Ok(bollard::container::LogOutput::StdErr {
                message: "second\n".into(),
            }),
        ];
        let reader = LogOutputReader::new(futures::stream::iter(frames));
        let mut lines = tokio::io::BufReader::new(reader).lines();

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_log_reader_skips_empty_frames() {
        let frames = vec![
            Ok(bollard::container::LogOutput::StdOut {
                message: "GET / ".into(),
            }),
            Ok(bollard::container::LogOutput::StdOut {
                message: "".into(),
            }),
            Ok(bollard::container::LogOutput::StdOut {
                message: "200\n".into(),
            }),
            Ok(bollard::container::LogOutput::StdErr {
                message: "".into(),
            }),
            Ok(bollard::container::LogOutput::StdErr {
                message: "done\n".into(),
            }),
        ];
        let reader = LogOutputReader::new(futures::stream::iter(frames));
        let mut lines = tokio::io::BufReader::new(reader).lines();

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("GET / 200"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("done"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
