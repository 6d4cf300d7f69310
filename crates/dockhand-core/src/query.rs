//! Resource queries: paging, inspection, stats and form data

use crate::service::name_matches;
use crate::{ContainerService, CoreError, Result};
use dockhand_engine::{
    ContainerDetails, ContainerStats, ContainerStatus, ContainerSummary, CreateContainerConfig,
    MountConfig, NetworkSummary, PortConfig, ResourceLimits, VolumeSummary,
    COMPOSE_CONFIG_FILES_LABEL, COMPOSE_WORKDIR_LABEL,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Page selection and filters for list queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number
    pub page: usize,
    pub page_size: usize,
    /// Case-insensitive substring of the resource name
    #[serde(default)]
    pub name: Option<String>,
    /// Containers only: keep this state
    #[serde(default)]
    pub state: Option<ContainerStatus>,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            name: None,
            state: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_state(mut self, state: ContainerStatus) -> Self {
        self.state = Some(state);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(CoreError::InvalidParams("page starts at 1".into()));
        }
        if self.page_size == 0 {
            return Err(CoreError::InvalidParams(
                "page_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// One page of a filtered, ordered listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Number of items matching the filters, across all pages
    pub total: usize,
    pub items: Vec<T>,
}

/// Slice an already filtered and sorted list
fn paginate<T>(items: Vec<T>, req: &PageRequest) -> Page<T> {
    let total = items.len();
    let start = (req.page - 1).saturating_mul(req.page_size);
    let items = items.into_iter().skip(start).take(req.page_size).collect();
    Page { total, items }
}

/// Newest first, then by name
fn sort_by_created<T>(items: &mut [T], key: impl Fn(&T) -> (i64, &str)) {
    items.sort_by(|a, b| {
        let (ca, na) = key(a);
        let (cb, nb) = key(b);
        cb.cmp(&ca).then_with(|| na.cmp(nb))
    });
}

/// Container of a compose stack as listed with the stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeMember {
    pub name: String,
    pub service: String,
    pub status: ContainerStatus,
}

/// A compose stack, reconstructed from its members' labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeSummary {
    pub name: String,
    pub members: Vec<ComposeMember>,
    /// Members currently running
    pub running: usize,
    /// Creation time of the oldest member
    pub created: i64,
    pub working_dir: Option<String>,
    pub config_files: Option<String>,
}

impl ComposeSummary {
    pub fn is_running(&self) -> bool {
        self.running == self.members.len() && !self.members.is_empty()
    }
}

/// Group labeled containers into stacks
pub(crate) fn group_stacks(containers: Vec<ContainerSummary>) -> Vec<ComposeSummary> {
    let mut stacks: BTreeMap<String, ComposeSummary> = BTreeMap::new();

    for c in containers {
        let Some(project) = c.compose_project().map(str::to_string) else {
            continue;
        };
        let stack = stacks
            .entry(project.clone())
            .or_insert_with(|| ComposeSummary {
                name: project,
                members: Vec::new(),
                running: 0,
                created: c.created,
                working_dir: None,
                config_files: None,
            });

        if c.status == ContainerStatus::Running {
            stack.running += 1;
        }
        stack.created = stack.created.min(c.created);
        if stack.working_dir.is_none() {
            stack.working_dir = c.labels.get(COMPOSE_WORKDIR_LABEL).cloned();
        }
        if stack.config_files.is_none() {
            stack.config_files = c.labels.get(COMPOSE_CONFIG_FILES_LABEL).cloned();
        }
        stack.members.push(ComposeMember {
            service: c.compose_service().unwrap_or_default().to_string(),
            name: c.name,
            status: c.status,
        });
    }

    stacks
        .into_values()
        .map(|mut s| {
            s.members.sort_by(|a, b| a.name.cmp(&b.name));
            s
        })
        .collect()
}

/// Kind of resource for [`ContainerService::inspect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Network,
    Volume,
    Compose,
}

impl std::str::FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "container" => Ok(Self::Container),
            "network" => Ok(Self::Network),
            "volume" => Ok(Self::Volume),
            "compose" => Ok(Self::Compose),
            _ => Err(CoreError::InvalidParams(format!(
                "unknown resource type: {}",
                s
            ))),
        }
    }
}

/// A compose stack together with its persisted definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeDetail {
    #[serde(flatten)]
    pub summary: ComposeSummary,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "lowercase")]
pub enum ResourceDetail {
    Container(ContainerDetails),
    Network(NetworkSummary),
    Volume(VolumeSummary),
    Compose(ComposeDetail),
}

/// Advisory ceiling for container resource limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimit {
    pub max_cpu_cores: u64,
    pub max_memory_bytes: u64,
}

/// Volume entry for pickers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOption {
    pub name: String,
    pub driver: String,
}

/// Editable container configuration, used for create and update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    /// `KEY=value` entries
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortConfig>,
    pub mounts: Vec<MountConfig>,
    pub network: Option<String>,
    pub restart_policy: Option<String>,
    pub limits: ResourceLimits,
    pub privileged: bool,
    pub tty: bool,
    pub open_stdin: bool,
}

impl ContainerSpec {
    /// Current configuration of an existing container
    pub fn from_details(details: &ContainerDetails) -> Self {
        Self {
            name: details.name.clone(),
            image: details.image.clone(),
            cmd: details.cmd.clone(),
            entrypoint: Vec::new(),
            env: details.env.clone(),
            labels: details.labels.clone(),
            ports: details.ports.clone(),
            mounts: details.mounts.clone(),
            network: details.networks.first().cloned(),
            restart_policy: details.restart_policy.clone(),
            limits: details.resources.clone(),
            privileged: false,
            tty: false,
            open_stdin: false,
        }
        .normalized()
    }

    /// Order-insensitive fields sorted so specs compare by content
    pub(crate) fn normalized(mut self) -> Self {
        self.env.sort();
        self.ports
            .sort_by_key(|p| (p.container_port, p.host_port, p.protocol.clone()));
        self.mounts.sort_by(|a, b| a.target.cmp(&b.target));
        self
    }

    /// True when `other` can be reached by changing limits in place
    pub(crate) fn differs_only_in_limits(&self, other: &ContainerSpec) -> bool {
        let mut a = self.clone().normalized();
        let b = other.clone().normalized();
        a.limits = b.limits.clone();
        a == b
    }

    pub(crate) fn to_create_config(&self) -> CreateContainerConfig {
        let env = self
            .env
            .iter()
            .filter_map(|e| match e.split_once('=') {
                Some((k, v)) => Some((k.to_string(), v.to_string())),
                None if !e.is_empty() => Some((e.clone(), String::new())),
                None => None,
            })
            .collect();

        CreateContainerConfig {
            image: self.image.clone(),
            name: Some(self.name.clone()),
            cmd: (!self.cmd.is_empty()).then(|| self.cmd.clone()),
            entrypoint: (!self.entrypoint.is_empty()).then(|| self.entrypoint.clone()),
            env,
            mounts: self.mounts.clone(),
            ports: self.ports.clone(),
            labels: self.labels.clone(),
            tty: self.tty,
            stdin_open: self.open_stdin,
            network_mode: self.network.clone(),
            restart_policy: self.restart_policy.clone(),
            resources: self.limits.clone(),
            privileged: self.privileged,
            ..Default::default()
        }
    }
}

impl ContainerService {
    /// Page through containers, including stopped ones
    pub async fn page_containers(&self, req: &PageRequest) -> Result<Page<ContainerSummary>> {
        req.validate()?;
        let mut containers: Vec<ContainerSummary> = self
            .call(self.engine.list_containers(true))
            .await?
            .into_iter()
            .filter(|c| name_matches(req.name.as_deref(), &c.name))
            .filter(|c| req.state.map_or(true, |s| c.status == s))
            .collect();
        sort_by_created(&mut containers, |c| (c.created, c.name.as_str()));
        Ok(paginate(containers, req))
    }

    pub async fn page_networks(&self, req: &PageRequest) -> Result<Page<NetworkSummary>> {
        req.validate()?;
        let mut networks: Vec<NetworkSummary> = self
            .call(self.engine.list_networks())
            .await?
            .into_iter()
            .filter(|n| name_matches(req.name.as_deref(), &n.name))
            .collect();
        sort_by_created(&mut networks, |n| (n.created, n.name.as_str()));
        Ok(paginate(networks, req))
    }

    pub async fn page_volumes(&self, req: &PageRequest) -> Result<Page<VolumeSummary>> {
        req.validate()?;
        let mut volumes: Vec<VolumeSummary> = self
            .call(self.engine.list_volumes())
            .await?
            .into_iter()
            .filter(|v| name_matches(req.name.as_deref(), &v.name))
            .collect();
        sort_by_created(&mut volumes, |v| (v.created, v.name.as_str()));
        Ok(paginate(volumes, req))
    }

    /// Page through compose stacks, grouped from container labels
    pub async fn page_composes(&self, req: &PageRequest) -> Result<Page<ComposeSummary>> {
        req.validate()?;
        let containers = self.call(self.engine.list_containers(true)).await?;
        let mut stacks: Vec<ComposeSummary> = group_stacks(containers)
            .into_iter()
            .filter(|s| name_matches(req.name.as_deref(), &s.name))
            .collect();
        sort_by_created(&mut stacks, |s| (s.created, s.name.as_str()));
        Ok(paginate(stacks, req))
    }

    /// Inspect one resource by name
    pub async fn inspect(&self, kind: ResourceKind, name: &str) -> Result<ResourceDetail> {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidParams("name is required".into()));
        }
        match kind {
            ResourceKind::Container => Ok(ResourceDetail::Container(
                self.call(self.engine.inspect_container(name)).await?,
            )),
            ResourceKind::Network => Ok(ResourceDetail::Network(
                self.call(self.engine.inspect_network(name)).await?,
            )),
            ResourceKind::Volume => Ok(ResourceDetail::Volume(
                self.call(self.engine.inspect_volume(name)).await?,
            )),
            ResourceKind::Compose => {
                let summary = self.find_stack(name).await?;
                let definition = match self.definition_path(name) {
                    Some(path) if path.exists() => Some(tokio::fs::read_to_string(&path).await?),
                    _ => None,
                };
                Ok(ResourceDetail::Compose(ComposeDetail {
                    summary,
                    definition,
                }))
            }
        }
    }

    /// Single point-in-time resource usage read
    pub async fn stats(&self, name: &str) -> Result<ContainerStats> {
        self.call(self.engine.stats(name)).await
    }

    /// Host CPU and memory ceiling for limit forms
    pub async fn load_resource_limit(&self) -> Result<ResourceLimit> {
        let host = self.call(self.engine.host_info()).await?;
        Ok(ResourceLimit {
            max_cpu_cores: host.cpu_count,
            max_memory_bytes: host.memory_bytes,
        })
    }

    /// Current configuration of a container as an editable form
    pub async fn container_spec(&self, name: &str) -> Result<ContainerSpec> {
        let details = self.call(self.engine.inspect_container(name)).await?;
        Ok(ContainerSpec::from_details(&details))
    }

    /// Every volume, by name, for pickers
    pub async fn list_volume_options(&self) -> Result<Vec<VolumeOption>> {
        let mut options: Vec<VolumeOption> = self
            .call(self.engine.list_volumes())
            .await?
            .into_iter()
            .map(|v| VolumeOption {
                name: v.name,
                driver: v.driver,
            })
            .collect();
        options.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(options)
    }

    /// Stack summary, or NotFound when no container carries its label
    pub(crate) async fn find_stack(&self, name: &str) -> Result<ComposeSummary> {
        let containers = self.call(self.engine.list_containers(true)).await?;
        group_stacks(containers)
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CoreError::NotFound(format!("compose stack {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::{ErrorKind, ServiceConfig};
    use dockhand_engine::{ContainerStatus, MountType, COMPOSE_PROJECT_LABEL};
    use std::sync::Arc;

    fn service(mock: &Arc<MockEngine>) -> ContainerService {
        ContainerService::new(mock.clone(), ServiceConfig::default())
    }

    fn seeded() -> Arc<MockEngine> {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("alpha", ContainerStatus::Running);
        mock.add_container("bravo", ContainerStatus::Exited);
        mock.add_container("charlie", ContainerStatus::Running);
        mock.add_container("delta-web", ContainerStatus::Paused);
        mock.add_container("echo-web", ContainerStatus::Running);
        mock
    }

    // ==================== Paging ====================

    #[tokio::test]
    async fn test_page_size_bounds_items_and_total_is_stable() {
        let mock = seeded();
        let svc = service(&mock);

        for size in 1..=6 {
            let page = svc.page_containers(&PageRequest::new(1, size)).await.unwrap();
            assert!(page.items.len() <= size);
            assert_eq!(page.total, 5);
        }
    }

    #[tokio::test]
    async fn test_newest_first() {
        let mock = seeded();
        let svc = service(&mock);

        let page = svc.page_containers(&PageRequest::new(1, 2)).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["echo-web", "delta-web"]);

        let page = svc.page_containers(&PageRequest::new(3, 2)).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha"]);
    }

    #[test]
    fn test_ties_ordered_by_name() {
        let mut items = vec![(7, "zulu"), (7, "able"), (9, "mike")];
        sort_by_created(&mut items, |(created, name)| (*created, *name));
        assert_eq!(items, vec![(9, "mike"), (7, "able"), (7, "zulu")]);
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty() {
        let mock = seeded();
        let svc = service(&mock);

        let page = svc.page_containers(&PageRequest::new(9, 10)).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn test_zero_page_or_size_rejected() {
        let mock = seeded();
        let svc = service(&mock);

        let err = svc.page_containers(&PageRequest::new(0, 10)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        let err = svc.page_networks(&PageRequest::new(1, 0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(mock.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_name_and_state_filters() {
        let mock = seeded();
        let svc = service(&mock);

        let page = svc
            .page_containers(&PageRequest::new(1, 10).with_name("WEB"))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = svc
            .page_containers(
                &PageRequest::new(1, 10)
                    .with_name("web")
                    .with_state(ContainerStatus::Running),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "echo-web");
    }

    #[tokio::test]
    async fn test_page_networks_and_volumes() {
        let mock = Arc::new(MockEngine::new());
        mock.add_network("bridge", &[]);
        mock.add_network("app_default", &[]);
        mock.add_volume("data", &[]);
        let svc = service(&mock);

        let nets = svc.page_networks(&PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(nets.total, 2);
        assert_eq!(nets.items[0].name, "app_default");

        let vols = svc
            .page_volumes(&PageRequest::new(1, 10).with_name("dat"))
            .await
            .unwrap();
        assert_eq!(vols.total, 1);
    }

    // ==================== Compose stacks ====================

    #[tokio::test]
    async fn test_page_composes_groups_by_label() {
        let mock = Arc::new(MockEngine::new());
        mock.add_compose_member("shop-web-1", "shop", "web", ContainerStatus::Running);
        mock.add_compose_member("shop-db-1", "shop", "db", ContainerStatus::Exited);
        mock.add_compose_member("blog-web-1", "blog", "web", ContainerStatus::Running);
        mock.add_container("loner", ContainerStatus::Running);
        let svc = service(&mock);

        let page = svc.page_composes(&PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].name, "blog");
        let shop = &page.items[1];
        assert_eq!(shop.name, "shop");
        assert_eq!(shop.members.len(), 2);
        assert_eq!(shop.running, 1);
        assert!(!shop.is_running());
        assert_eq!(shop.members[0].service, "db");
    }

    #[tokio::test]
    async fn test_inspect_compose_reads_definition() {
        let tmp = tempfile::tempdir().unwrap();
        let stack_dir = tmp.path().join("shop");
        std::fs::create_dir_all(&stack_dir).unwrap();
        std::fs::write(stack_dir.join("docker-compose.yml"), "services: {}\n").unwrap();

        let mock = Arc::new(MockEngine::new());
        mock.add_compose_member("shop-web-1", "shop", "web", ContainerStatus::Running);
        let config = ServiceConfig {
            compose_dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let svc = ContainerService::new(mock.clone(), config);

        match svc.inspect(ResourceKind::Compose, "shop").await.unwrap() {
            ResourceDetail::Compose(detail) => {
                assert_eq!(detail.summary.members.len(), 1);
                assert_eq!(detail.definition.as_deref(), Some("services: {}\n"));
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    // ==================== Inspection ====================

    #[tokio::test]
    async fn test_inspect_missing_resources() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);

        for kind in [
            ResourceKind::Container,
            ResourceKind::Network,
            ResourceKind::Volume,
            ResourceKind::Compose,
        ] {
            let err = svc.inspect(kind, "ghost").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{:?}", kind);
        }
    }

    #[tokio::test]
    async fn test_inspect_network_lists_attachments() {
        let mock = seeded();
        mock.add_network("web", &[("owner", "ops")]);
        mock.attach("web", "alpha");
        let svc = service(&mock);

        match svc.inspect(ResourceKind::Network, "web").await.unwrap() {
            ResourceDetail::Network(net) => assert_eq!(net.containers, vec!["alpha"]),
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!("Volume".parse::<ResourceKind>().unwrap(), ResourceKind::Volume);
        assert!("image".parse::<ResourceKind>().is_err());
    }

    #[tokio::test]
    async fn test_stats_passthrough() {
        let mock = seeded();
        *mock.stats_result.lock().unwrap() = ContainerStats {
            cpu_percent: 12.5,
            mem_usage_bytes: 1024,
            ..Default::default()
        };
        let svc = service(&mock);

        let stats = svc.stats("alpha").await.unwrap();
        assert_eq!(stats.cpu_percent, 12.5);
        assert_eq!(stats.mem_usage_bytes, 1024);
        assert_eq!(svc.stats("ghost").await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_load_resource_limit() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);

        let limit = svc.load_resource_limit().await.unwrap();
        assert_eq!(limit.max_cpu_cores, 4);
        assert_eq!(limit.max_memory_bytes, 8 * 1024 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_container_spec_from_details() {
        let mock = Arc::new(MockEngine::new());
        let mut details = mock_container_details("api", ContainerStatus::Running);
        details.env = vec!["B=2".into(), "A=1".into()];
        details.networks = vec!["backend".into()];
        details.mounts = vec![MountConfig {
            mount_type: MountType::Volume,
            source: "data".into(),
            target: "/data".into(),
            read_only: false,
        }];
        details.resources.memory_bytes = 256 * 1024 * 1024;
        mock.add_container_with(details);
        let svc = service(&mock);

        let spec = svc.container_spec("api").await.unwrap();
        assert_eq!(spec.name, "api");
        assert_eq!(spec.env, vec!["A=1", "B=2"]);
        assert_eq!(spec.network.as_deref(), Some("backend"));
        assert_eq!(spec.limits.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(spec.mounts.len(), 1);
    }

    #[test]
    fn test_spec_limit_only_difference() {
        let base = ContainerSpec {
            name: "api".into(),
            image: "nginx".into(),
            env: vec!["A=1".into(), "B=2".into()],
            ..Default::default()
        };
        let mut limits_changed = base.clone();
        limits_changed.limits.nano_cpus = 500_000_000;
        limits_changed.env.reverse();
        assert!(base.differs_only_in_limits(&limits_changed));

        let mut image_changed = base.clone();
        image_changed.image = "nginx:1.25".into();
        assert!(!base.differs_only_in_limits(&image_changed));
    }

    #[test]
    fn test_spec_to_create_config_splits_env() {
        let spec = ContainerSpec {
            name: "api".into(),
            image: "nginx".into(),
            env: vec!["A=1".into(), "URL=http://x?a=b".into(), "FLAG".into()],
            ..Default::default()
        };
        let config = spec.to_create_config();
        assert_eq!(config.env.get("URL").map(String::as_str), Some("http://x?a=b"));
        assert_eq!(config.env.get("FLAG").map(String::as_str), Some(""));
        assert!(config.cmd.is_none());
        assert_eq!(config.name.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_volume_options_sorted() {
        let mock = Arc::new(MockEngine::new());
        mock.add_volume("zeta", &[(COMPOSE_PROJECT_LABEL, "x")]);
        mock.add_volume("alpha", &[]);
        let svc = service(&mock);

        let options = svc.list_volume_options().await.unwrap();
        let names: Vec<_> = options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(options[0].driver, "local");
    }
}
