//! Test support utilities for dockhand-core
//!
//! Provides a stateful MockEngine for exercising the ContainerService
//! without a real container engine. The mock keeps containers, networks
//! and volumes in memory, records every call, and lets tests inject
//! failures per method and target.

use async_trait::async_trait;
use dockhand_engine::*;
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ListContainers { all: bool },
    Inspect { name: String },
    Create { name: Option<String>, image: String },
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    Pause { name: String },
    Unpause { name: String },
    Kill { name: String },
    Remove { name: String, force: bool },
    Rename { name: String, new_name: String },
    UpdateResources { name: String },
    Stats { name: String },
    Logs { name: String, follow: bool },
    Prune { kind: PruneKind },
    ListNetworks,
    InspectNetwork { name: String },
    CreateNetwork { name: String },
    RemoveNetwork { name: String },
    ConnectNetwork { network: String, container: String },
    ListVolumes,
    InspectVolume { name: String },
    CreateVolume { name: String },
    RemoveVolume { name: String },
    HostInfo,
    Ping,
}

impl MockCall {
    /// Whether the call changes engine state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            MockCall::ListContainers { .. }
                | MockCall::Inspect { .. }
                | MockCall::Stats { .. }
                | MockCall::Logs { .. }
                | MockCall::ListNetworks
                | MockCall::InspectNetwork { .. }
                | MockCall::ListVolumes
                | MockCall::InspectVolume { .. }
                | MockCall::HostInfo
                | MockCall::Ping
        )
    }
}

#[derive(Default)]
struct MockState {
    containers: BTreeMap<String, ContainerDetails>,
    networks: BTreeMap<String, NetworkSummary>,
    volumes: BTreeMap<String, VolumeSummary>,
    next_id: u64,
    clock: i64,
}

impl MockState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:012}", prefix, self.next_id)
    }

    fn container_key(&self, name_or_id: &str) -> Option<String> {
        if self.containers.contains_key(name_or_id) {
            return Some(name_or_id.to_string());
        }
        self.containers
            .values()
            .find(|c| c.id.0 == name_or_id || c.id.short() == name_or_id)
            .map(|c| c.name.clone())
    }

    fn container_mut(&mut self, name_or_id: &str) -> Result<&mut ContainerDetails> {
        let key = self
            .container_key(name_or_id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", name_or_id)))?;
        self.containers
            .get_mut(&key)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", name_or_id)))
    }

    fn network_with_members(&self, net: &NetworkSummary) -> NetworkSummary {
        let mut net = net.clone();
        net.containers = self
            .containers
            .values()
            .filter(|c| c.networks.iter().any(|n| n == &net.name))
            .map(|c| c.name.clone())
            .collect();
        net
    }

    fn volume_in_use(&self, name: &str) -> bool {
        self.containers.values().any(|c| {
            c.mounts
                .iter()
                .any(|m| m.mount_type == MountType::Volume && m.source == name)
        })
    }
}

/// Configurable in-memory container engine for testing
pub struct MockEngine {
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    state: Mutex<MockState>,
    /// Failures keyed by (method, target)
    failures: Mutex<HashMap<(String, String), EngineError>>,
    prune_results: Mutex<HashMap<PruneKind, PruneResult>>,
    /// Result for stats calls
    pub stats_result: Mutex<ContainerStats>,
    /// Result for host_info calls
    pub host: Mutex<HostInfo>,
    log_lines: Mutex<Vec<String>>,
    log_writers: Mutex<Vec<DuplexStream>>,
    log_stream_dropped: Arc<AtomicBool>,
    /// Read error surfaced by log streams once their buffered output is drained
    log_failure: Arc<Mutex<Option<(std::io::ErrorKind, String)>>>,
    delay: Mutex<Option<Duration>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create an empty engine where every call succeeds
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            state: Mutex::new(MockState::default()),
            failures: Mutex::new(HashMap::new()),
            prune_results: Mutex::new(HashMap::new()),
            stats_result: Mutex::new(ContainerStats::default()),
            host: Mutex::new(HostInfo {
                cpu_count: 4,
                memory_bytes: 8 * 1024 * 1024 * 1024,
                server_version: "mock-24.0".to_string(),
            }),
            log_lines: Mutex::new(Vec::new()),
            log_writers: Mutex::new(Vec::new()),
            log_stream_dropped: Arc::new(AtomicBool::new(false)),
            log_failure: Arc::new(Mutex::new(None)),
            delay: Mutex::new(None),
        }
    }

    // ==================== Seeding ====================

    /// Add a container in the given state
    pub fn add_container(&self, name: &str, status: ContainerStatus) -> ContainerId {
        self.add_container_with(mock_container_details(name, status))
    }

    /// Add a container carrying compose labels
    pub fn add_compose_member(
        &self,
        name: &str,
        project: &str,
        service: &str,
        status: ContainerStatus,
    ) -> ContainerId {
        let mut details = mock_container_details(name, status);
        details
            .labels
            .insert(COMPOSE_PROJECT_LABEL.to_string(), project.to_string());
        details
            .labels
            .insert(COMPOSE_SERVICE_LABEL.to_string(), service.to_string());
        self.add_container_with(details)
    }

    /// Add a fully specified container; its id and created time are assigned here
    pub fn add_container_with(&self, mut details: ContainerDetails) -> ContainerId {
        let mut state = self.state.lock().unwrap();
        details.id = ContainerId::new(state.next_id("c"));
        details.created = state.tick();
        let id = details.id.clone();
        state.containers.insert(details.name.clone(), details);
        id
    }

    pub fn add_network(&self, name: &str, labels: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let network = NetworkSummary {
            id: state.next_id("n"),
            name: name.to_string(),
            driver: "bridge".to_string(),
            subnet: None,
            gateway: None,
            created: state.tick(),
            labels: to_labels(labels),
            containers: Vec::new(),
        };
        state.networks.insert(name.to_string(), network);
    }

    /// Attach an existing container to an existing network
    pub fn attach(&self, network: &str, container: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.get_mut(container) {
            if !c.networks.iter().any(|n| n == network) {
                c.networks.push(network.to_string());
            }
        }
    }

    pub fn add_volume(&self, name: &str, labels: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let volume = VolumeSummary {
            name: name.to_string(),
            driver: "local".to_string(),
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", name),
            created: state.tick(),
            labels: to_labels(labels),
        };
        state.volumes.insert(name.to_string(), volume);
    }

    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.status = status;
        }
    }

    /// Make `method` fail for `target` until cleared
    pub fn fail_on(&self, method: &str, target: &str, err: EngineError) {
        self.failures
            .lock()
            .unwrap()
            .insert((method.to_string(), target.to_string()), err);
    }

    pub fn set_prune_result(&self, kind: PruneKind, result: PruneResult) {
        self.prune_results.lock().unwrap().insert(kind, result);
    }

    /// Delay every call by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Lines already present in every container's log
    pub fn set_log_lines(&self, lines: &[&str]) {
        *self.log_lines.lock().unwrap() = lines.iter().map(|l| l.to_string()).collect();
    }

    // ==================== Inspection ====================

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls that change engine state
    pub fn mutating_calls(&self) -> Vec<MockCall> {
        self.get_calls()
            .into_iter()
            .filter(MockCall::is_mutation)
            .collect()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn container(&self, name: &str) -> Option<ContainerDetails> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state.lock().unwrap().networks.keys().cloned().collect()
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.state.lock().unwrap().volumes.keys().cloned().collect()
    }

    // ==================== Log streams ====================

    /// Write a line to every open following log stream
    pub async fn push_log_line(&self, line: &str) {
        let mut writers = std::mem::take(&mut *self.log_writers.lock().unwrap());
        let mut alive = Vec::new();
        for mut writer in writers.drain(..) {
            if writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .is_ok()
            {
                alive.push(writer);
            }
        }
        self.log_writers.lock().unwrap().extend(alive);
    }

    /// Make open log streams fail with `err` after their pending output
    pub fn fail_log_stream(&self, err: std::io::Error) {
        *self.log_failure.lock().unwrap() = Some((err.kind(), err.to_string()));
        self.end_log_streams();
    }

    /// End every open log stream
    pub fn end_log_streams(&self) {
        self.log_writers.lock().unwrap().clear();
    }

    /// True once the reader handed out by the last `logs` call was dropped
    pub fn log_stream_dropped(&self) -> bool {
        self.log_stream_dropped.load(Ordering::SeqCst)
    }

    // ==================== Internals ====================

    /// Record a call, apply the configured delay and any injected failure
    async fn enter(&self, call: MockCall, method: &str, target: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failures = self.failures.lock().unwrap();
        match failures.get(&(method.to_string(), target.to_string())) {
            Some(err) => Err(clone_engine_error(err)),
            None => Ok(()),
        }
    }
}

fn to_labels(labels: &[(&str, &str)]) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Clone an EngineError (thiserror types don't implement Clone)
pub fn clone_engine_error(e: &EngineError) -> EngineError {
    match e {
        EngineError::ConnectionError(s) => EngineError::ConnectionError(s.clone()),
        EngineError::NotFound(s) => EngineError::NotFound(s.clone()),
        EngineError::Conflict(s) => EngineError::Conflict(s.clone()),
        EngineError::BadRequest(s) => EngineError::BadRequest(s.clone()),
        EngineError::RuntimeError(s) => EngineError::RuntimeError(s.clone()),
        EngineError::Timeout => EngineError::Timeout,
        EngineError::IoError(_) => EngineError::RuntimeError("IO error (cloned)".into()),
    }
}

/// Create a mock ContainerDetails
pub fn mock_container_details(name: &str, status: ContainerStatus) -> ContainerDetails {
    ContainerDetails {
        id: ContainerId::new(format!("id-{}", name)),
        name: name.to_string(),
        image: "nginx:latest".to_string(),
        image_id: "sha256:mock_image_id".to_string(),
        status,
        created: 0,
        started_at: None,
        finished_at: None,
        exit_code: None,
        labels: HashMap::new(),
        env: Vec::new(),
        cmd: Vec::new(),
        mounts: Vec::new(),
        ports: Vec::new(),
        networks: Vec::new(),
        restart_policy: None,
        resources: ResourceLimits::default(),
        log_path: None,
    }
}

fn summary_of(details: &ContainerDetails) -> ContainerSummary {
    ContainerSummary {
        id: details.id.clone(),
        name: details.name.clone(),
        image: details.image.clone(),
        status: details.status,
        status_text: details.status.to_string(),
        created: details.created,
        labels: details.labels.clone(),
        ports: details.ports.clone(),
        networks: details.networks.clone(),
    }
}

/// Log reader that reports when the consumer lets go of it
struct TrackedReader {
    inner: DuplexStream,
    dropped: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<(std::io::ErrorKind, String)>>>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            std::task::Poll::Ready(Ok(())) if buf.filled().len() == before => {
                match self.failure.lock().unwrap().clone() {
                    Some((kind, message)) => {
                        std::task::Poll::Ready(Err(std::io::Error::new(kind, message)))
                    }
                    None => std::task::Poll::Ready(Ok(())),
                }
            }
            other => other,
        }
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        self.enter(MockCall::ListContainers { all }, "list_containers", "")
            .await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .values()
            .filter(|c| all || c.status == ContainerStatus::Running)
            .map(summary_of)
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails> {
        self.enter(
            MockCall::Inspect {
                name: name.to_string(),
            },
            "inspect_container",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        Ok(state.container_mut(name)?.clone())
    }

    async fn create_container(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        let target = config.name.clone().unwrap_or_default();
        self.enter(
            MockCall::Create {
                name: config.name.clone(),
                image: config.image.clone(),
            },
            "create_container",
            &target,
        )
        .await?;

        let mut state = self.state.lock().unwrap();
        let name = match &config.name {
            Some(name) => name.clone(),
            None => format!("auto_{}", state.next_id + 1),
        };
        if state.containers.contains_key(&name) {
            return Err(EngineError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                name
            )));
        }

        let mut env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let details = ContainerDetails {
            id: ContainerId::new(state.next_id("c")),
            name: name.clone(),
            image: config.image.clone(),
            image_id: format!("sha256:{}", config.image),
            status: ContainerStatus::Created,
            created: state.tick(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            labels: config.labels.clone(),
            env,
            cmd: config.cmd.clone().unwrap_or_default(),
            mounts: config.mounts.clone(),
            ports: config.ports.clone(),
            networks: config.network_mode.iter().cloned().collect(),
            restart_policy: config.restart_policy.clone(),
            resources: config.resources.clone(),
            log_path: Some(format!("/var/lib/docker/containers/{}/json.log", name)),
        };
        let id = details.id.clone();
        state.containers.insert(name, details);
        Ok(id)
    }

    async fn start(&self, name: &str) -> Result<Outcome> {
        self.enter(
            MockCall::Start {
                name: name.to_string(),
            },
            "start",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let c = state.container_mut(name)?;
        if c.status == ContainerStatus::Running {
            return Ok(Outcome::NoOp);
        }
        c.status = ContainerStatus::Running;
        Ok(Outcome::Applied)
    }

    async fn stop(&self, name: &str, _grace_secs: Option<u32>) -> Result<Outcome> {
        self.enter(
            MockCall::Stop {
                name: name.to_string(),
            },
            "stop",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let c = state.container_mut(name)?;
        match c.status {
            ContainerStatus::Running | ContainerStatus::Restarting | ContainerStatus::Paused => {
                c.status = ContainerStatus::Exited;
                Ok(Outcome::Applied)
            }
            _ => Ok(Outcome::NoOp),
        }
    }

    async fn restart(&self, name: &str, _grace_secs: Option<u32>) -> Result<()> {
        self.enter(
            MockCall::Restart {
                name: name.to_string(),
            },
            "restart",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        state.container_mut(name)?.status = ContainerStatus::Running;
        Ok(())
    }

    async fn pause(&self, name: &str) -> Result<Outcome> {
        self.enter(
            MockCall::Pause {
                name: name.to_string(),
            },
            "pause",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let c = state.container_mut(name)?;
        match c.status {
            ContainerStatus::Running => {
                c.status = ContainerStatus::Paused;
                Ok(Outcome::Applied)
            }
            ContainerStatus::Paused => Ok(Outcome::NoOp),
            other => Err(EngineError::Conflict(format!(
                "Container {} is not running ({})",
                name, other
            ))),
        }
    }

    async fn unpause(&self, name: &str) -> Result<Outcome> {
        self.enter(
            MockCall::Unpause {
                name: name.to_string(),
            },
            "unpause",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let c = state.container_mut(name)?;
        match c.status {
            ContainerStatus::Paused => {
                c.status = ContainerStatus::Running;
                Ok(Outcome::Applied)
            }
            _ => Ok(Outcome::NoOp),
        }
    }

    async fn kill(&self, name: &str, _signal: Option<&str>) -> Result<()> {
        self.enter(
            MockCall::Kill {
                name: name.to_string(),
            },
            "kill",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        state.container_mut(name)?.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        self.enter(
            MockCall::Remove {
                name: name.to_string(),
                force,
            },
            "remove",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let key = state
            .container_key(name)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", name)))?;
        let running = state
            .containers
            .get(&key)
            .map(|c| c.status == ContainerStatus::Running)
            .unwrap_or(false);
        if running && !force {
            return Err(EngineError::Conflict(format!(
                "You cannot remove a running container {}",
                name
            )));
        }
        state.containers.remove(&key);
        Ok(())
    }

    async fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        self.enter(
            MockCall::Rename {
                name: name.to_string(),
                new_name: new_name.to_string(),
            },
            "rename",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        if state.containers.contains_key(new_name) {
            return Err(EngineError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                new_name
            )));
        }
        let key = state
            .container_key(name)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", name)))?;
        if let Some(mut c) = state.containers.remove(&key) {
            c.name = new_name.to_string();
            state.containers.insert(new_name.to_string(), c);
        }
        Ok(())
    }

    async fn update_resources(&self, name: &str, limits: &ResourceLimits) -> Result<()> {
        self.enter(
            MockCall::UpdateResources {
                name: name.to_string(),
            },
            "update_resources",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        state.container_mut(name)?.resources = limits.clone();
        Ok(())
    }

    async fn stats(&self, name: &str) -> Result<ContainerStats> {
        self.enter(
            MockCall::Stats {
                name: name.to_string(),
            },
            "stats",
            name,
        )
        .await?;
        self.state.lock().unwrap().container_mut(name)?;
        Ok(self.stats_result.lock().unwrap().clone())
    }

    async fn logs(&self, name: &str, config: &LogConfig) -> Result<LogStream> {
        self.enter(
            MockCall::Logs {
                name: name.to_string(),
                follow: config.follow,
            },
            "logs",
            name,
        )
        .await?;
        self.state.lock().unwrap().container_mut(name)?;

        let mut lines = self.log_lines.lock().unwrap().clone();
        if let Some(tail) = config.tail {
            let skip = lines.len().saturating_sub(tail as usize);
            lines.drain(..skip);
        }

        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        for line in lines {
            writer.write_all(format!("{}\n", line).as_bytes()).await?;
        }
        if config.follow {
            self.log_writers.lock().unwrap().push(writer);
        }

        self.log_stream_dropped.store(false, Ordering::SeqCst);
        Ok(LogStream {
            stream: Box::pin(TrackedReader {
                inner: reader,
                dropped: self.log_stream_dropped.clone(),
                failure: self.log_failure.clone(),
            }),
        })
    }

    async fn prune(&self, kind: PruneKind) -> Result<PruneResult> {
        self.enter(MockCall::Prune { kind }, "prune", &kind.to_string())
            .await?;
        Ok(self
            .prune_results
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        self.enter(MockCall::ListNetworks, "list_networks", "").await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .values()
            .map(|n| state.network_with_members(n))
            .collect())
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkSummary> {
        self.enter(
            MockCall::InspectNetwork {
                name: name.to_string(),
            },
            "inspect_network",
            name,
        )
        .await?;
        let state = self.state.lock().unwrap();
        state
            .networks
            .get(name)
            .map(|n| state.network_with_members(n))
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", name)))
    }

    async fn create_network(&self, config: &CreateNetworkConfig) -> Result<String> {
        self.enter(
            MockCall::CreateNetwork {
                name: config.name.clone(),
            },
            "create_network",
            &config.name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        if state.networks.contains_key(&config.name) {
            return Err(EngineError::Conflict(format!(
                "network with name {} already exists",
                config.name
            )));
        }
        let network = NetworkSummary {
            id: state.next_id("n"),
            name: config.name.clone(),
            driver: config.driver.clone(),
            subnet: config.subnet.clone(),
            gateway: config.gateway.clone(),
            created: state.tick(),
            labels: config.labels.clone(),
            containers: Vec::new(),
        };
        let id = network.id.clone();
        state.networks.insert(config.name.clone(), network);
        Ok(id)
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.enter(
            MockCall::RemoveNetwork {
                name: name.to_string(),
            },
            "remove_network",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        let network = state
            .networks
            .get(name)
            .map(|n| state.network_with_members(n))
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", name)))?;
        if network.is_in_use() {
            return Err(EngineError::Conflict(format!(
                "error while removing network: network {} has active endpoints",
                name
            )));
        }
        state.networks.remove(name);
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        _aliases: &[String],
    ) -> Result<()> {
        self.enter(
            MockCall::ConnectNetwork {
                network: network.to_string(),
                container: container.to_string(),
            },
            "connect_network",
            network,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        if !state.networks.contains_key(network) {
            return Err(EngineError::NotFound(format!("network {} not found", network)));
        }
        let c = state.container_mut(container)?;
        if !c.networks.iter().any(|n| n == network) {
            c.networks.push(network.to_string());
        }
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>> {
        self.enter(MockCall::ListVolumes, "list_volumes", "").await?;
        Ok(self.state.lock().unwrap().volumes.values().cloned().collect())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeSummary> {
        self.enter(
            MockCall::InspectVolume {
                name: name.to_string(),
            },
            "inspect_volume",
            name,
        )
        .await?;
        self.state
            .lock()
            .unwrap()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("get {}: no such volume", name)))
    }

    async fn create_volume(&self, config: &CreateVolumeConfig) -> Result<VolumeSummary> {
        self.enter(
            MockCall::CreateVolume {
                name: config.name.clone(),
            },
            "create_volume",
            &config.name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.volumes.get(&config.name) {
            return Ok(existing.clone());
        }
        let volume = VolumeSummary {
            name: config.name.clone(),
            driver: if config.driver.is_empty() {
                "local".to_string()
            } else {
                config.driver.clone()
            },
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", config.name),
            created: state.tick(),
            labels: config.labels.clone(),
        };
        state.volumes.insert(config.name.clone(), volume.clone());
        Ok(volume)
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<()> {
        self.enter(
            MockCall::RemoveVolume {
                name: name.to_string(),
            },
            "remove_volume",
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        if !state.volumes.contains_key(name) {
            return Err(EngineError::NotFound(format!("get {}: no such volume", name)));
        }
        if state.volume_in_use(name) {
            return Err(EngineError::Conflict(format!(
                "remove {}: volume is in use",
                name
            )));
        }
        state.volumes.remove(name);
        Ok(())
    }

    async fn host_info(&self) -> Result<HostInfo> {
        self.enter(MockCall::HostInfo, "host_info", "").await?;
        Ok(self.host.lock().unwrap().clone())
    }

    async fn ping(&self) -> Result<()> {
        self.enter(MockCall::Ping, "ping", "").await
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "mock".to_string(),
            api_version: "mock".to_string(),
            os: "test".to_string(),
            arch: "test".to_string(),
        }
    }
}
