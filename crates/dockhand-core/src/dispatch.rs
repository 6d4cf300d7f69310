//! Lifecycle operations on containers, networks and volumes

use crate::service::is_valid_name;
use crate::{ContainerService, ContainerSpec, CoreError, ErrorKind, Result};
use dockhand_engine::{
    ContainerStatus, CreateNetworkConfig, CreateVolumeConfig, Outcome, PruneKind,
    COMPOSE_PROJECT_LABEL,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// Lifecycle operation on a single container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
    Kill,
    Remove,
    Rename,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
            Self::Pause => write!(f, "pause"),
            Self::Unpause => write!(f, "unpause"),
            Self::Kill => write!(f, "kill"),
            Self::Remove => write!(f, "remove"),
            Self::Rename => write!(f, "rename"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "pause" => Ok(Self::Pause),
            "unpause" => Ok(Self::Unpause),
            "kill" => Ok(Self::Kill),
            "remove" | "rm" => Ok(Self::Remove),
            "rename" => Ok(Self::Rename),
            _ => Err(CoreError::InvalidParams(format!("unknown operation: {}", s))),
        }
    }
}

/// What to do with a requested operation given the container's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Call the engine
    Apply,
    /// Already in the requested state
    NoOp,
    /// Not allowed from this state
    Conflict,
}

/// Decide an operation from the current state alone
pub fn admit(status: ContainerStatus, op: OperationKind, force: bool) -> Admission {
    use Admission::*;
    use ContainerStatus as S;
    use OperationKind as Op;

    match (op, status) {
        (_, S::Removing | S::Unknown) => Conflict,

        (Op::Start, S::Created | S::Exited) => Apply,
        (Op::Start, S::Running | S::Restarting) => NoOp,
        (Op::Start, S::Paused | S::Dead) => Conflict,

        (Op::Stop, S::Running | S::Restarting) => Apply,
        (Op::Stop, S::Created | S::Exited | S::Dead) => NoOp,
        (Op::Stop, S::Paused) => Conflict,

        (Op::Restart, S::Created | S::Running | S::Exited) => Apply,
        (Op::Restart, S::Restarting) => NoOp,
        (Op::Restart, S::Paused | S::Dead) => Conflict,

        (Op::Pause, S::Running) => Apply,
        (Op::Pause, S::Paused) => NoOp,
        (Op::Pause, _) => Conflict,

        (Op::Unpause, S::Paused) => Apply,
        (Op::Unpause, S::Running) => NoOp,
        (Op::Unpause, _) => Conflict,

        (Op::Kill, S::Running | S::Paused | S::Restarting) => Apply,
        (Op::Kill, S::Exited | S::Dead) => NoOp,
        (Op::Kill, S::Created) => Conflict,

        (Op::Remove, S::Created | S::Exited | S::Dead) => Apply,
        (Op::Remove, S::Running | S::Paused | S::Restarting) => {
            if force {
                Apply
            } else {
                Conflict
            }
        }

        (Op::Rename, _) => Apply,
    }
}

/// A lifecycle operation on one or more containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub names: Vec<String>,
    pub operation: OperationKind,
    /// Target name for rename
    #[serde(default)]
    pub new_name: Option<String>,
    /// Remove running containers
    #[serde(default)]
    pub force: bool,
    /// Keep the stack's networks when its last member is removed
    #[serde(default)]
    pub retain_networks: bool,
}

impl OperationRequest {
    pub fn new(operation: OperationKind, names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            operation,
            new_name: None,
            force: false,
            retain_networks: false,
        }
    }

    pub fn rename(name: &str, new_name: &str) -> Self {
        Self {
            new_name: Some(new_name.to_string()),
            ..Self::new(OperationKind::Rename, &[name])
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// A batch member that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub name: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Per-member outcome of a batch, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What a prune reclaimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub kind: PruneKind,
    pub deleted: Vec<String>,
    pub reclaimed_count: usize,
    pub space_reclaimed: u64,
}

/// Network creation form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub ip_range: Option<String>,
    pub labels: HashMap<String, String>,
    pub options: HashMap<String, String>,
}

/// Volume creation form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSpec {
    pub name: String,
    pub driver: String,
    pub driver_opts: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

/// Run `op` for every distinct name concurrently and collect a report
async fn run_batch<'a, F, Fut>(names: &'a [String], op: F) -> Result<BatchReport>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = Result<()>> + 'a,
{
    let mut seen = HashSet::new();
    let distinct: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(*n))
        .collect();
    if distinct.is_empty() {
        return Err(CoreError::InvalidParams("no names given".into()));
    }

    let results = join_all(distinct.iter().map(|name| op(*name))).await;

    let mut report = BatchReport::default();
    for (name, result) in distinct.into_iter().zip(results) {
        match result {
            Ok(()) => report.succeeded.push(name.to_string()),
            Err(e) => report.failed.push(BatchFailure {
                name: name.to_string(),
                kind: e.kind(),
                reason: e.to_string(),
            }),
        }
    }
    Ok(report)
}

impl ContainerService {
    /// Apply an operation to the single container named in the request
    pub async fn operate(&self, req: &OperationRequest) -> Result<Outcome> {
        match req.names.as_slice() {
            [name] if !name.trim().is_empty() => self.operate_one(name.trim(), req).await,
            [] => Err(CoreError::InvalidParams("container name is required".into())),
            [_] => Err(CoreError::InvalidParams("container name is required".into())),
            _ => Err(CoreError::InvalidParams(
                "operate takes exactly one container; use operate_batch".into(),
            )),
        }
    }

    /// Apply an operation to every named container, reporting each one
    pub async fn operate_batch(&self, req: &OperationRequest) -> Result<BatchReport> {
        if req.operation == OperationKind::Rename {
            return Err(CoreError::InvalidParams(
                "rename applies to a single container".into(),
            ));
        }
        run_batch(&req.names, |name| async move {
            self.operate_one(name, req).await.map(|_| ())
        })
        .await
    }

    pub(crate) async fn operate_one(&self, name: &str, req: &OperationRequest) -> Result<Outcome> {
        let new_name = match req.operation {
            OperationKind::Rename => Some(self.check_new_name(name, req.new_name.as_deref()).await?),
            _ => None,
        };

        let details = self.call(self.engine.inspect_container(name)).await?;
        match admit(details.status, req.operation, req.force) {
            Admission::NoOp => {
                tracing::debug!(
                    "{} {}: already {}, nothing to do",
                    req.operation,
                    name,
                    details.status
                );
                return Ok(Outcome::NoOp);
            }
            Admission::Conflict => {
                return Err(CoreError::InvalidState {
                    name: name.to_string(),
                    current: details.status,
                    requested: req.operation,
                })
            }
            Admission::Apply => {}
        }

        let grace = Some(self.config.stop_grace_secs);
        let outcome = match req.operation {
            OperationKind::Start => self.call(self.engine.start(name)).await?,
            OperationKind::Stop => self.call(self.engine.stop(name, grace)).await?,
            OperationKind::Restart => {
                self.call(self.engine.restart(name, grace)).await?;
                Outcome::Applied
            }
            OperationKind::Pause => self.call(self.engine.pause(name)).await?,
            OperationKind::Unpause => self.call(self.engine.unpause(name)).await?,
            OperationKind::Kill => {
                self.call(self.engine.kill(name, None)).await?;
                Outcome::Applied
            }
            OperationKind::Remove => {
                self.call(self.engine.remove(name, req.force)).await?;
                if let Some(project) = details.compose_project() {
                    if !(req.retain_networks || self.config.retain_networks) {
                        self.remove_orphaned_stack_networks(project).await;
                    }
                }
                Outcome::Applied
            }
            OperationKind::Rename => {
                let new_name = new_name.unwrap_or_default();
                self.call(self.engine.rename(name, &new_name)).await?;
                Outcome::Applied
            }
        };

        tracing::info!("{} {}: {:?}", req.operation, name, outcome);
        Ok(outcome)
    }

    async fn check_new_name(&self, name: &str, new_name: Option<&str>) -> Result<String> {
        let new_name = new_name.map(str::trim).unwrap_or_default();
        if new_name.is_empty() {
            return Err(CoreError::InvalidParams("new name is required".into()));
        }
        if !is_valid_name(new_name) {
            return Err(CoreError::InvalidParams(format!(
                "invalid container name: {}",
                new_name
            )));
        }
        if new_name == name {
            return Err(CoreError::InvalidParams(format!(
                "{} already has that name",
                name
            )));
        }
        self.ensure_container_name_free(new_name).await?;
        Ok(new_name.to_string())
    }

    async fn ensure_container_name_free(&self, name: &str) -> Result<()> {
        let containers = self.call(self.engine.list_containers(true)).await?;
        if containers.iter().any(|c| c.name == name) {
            return Err(CoreError::Conflict(format!(
                "container name {} is already in use",
                name
            )));
        }
        Ok(())
    }

    /// Once a stack has no containers left, drop its private networks
    pub(crate) async fn remove_orphaned_stack_networks(&self, project: &str) {
        let remaining = match self.call(self.engine.list_containers(true)).await {
            Ok(containers) => containers
                .iter()
                .filter(|c| c.compose_project() == Some(project))
                .count(),
            Err(e) => {
                tracing::warn!("Could not list members of stack {}: {}", project, e);
                return;
            }
        };
        if remaining > 0 {
            return;
        }

        let networks = match self.stack_networks(project).await {
            Ok(networks) => networks,
            Err(e) => {
                tracing::warn!("Could not list networks of stack {}: {}", project, e);
                return;
            }
        };
        for network in networks {
            match self.call(self.engine.remove_network(&network)).await {
                Ok(()) => tracing::info!("Removed network {} of empty stack {}", network, project),
                Err(e) => tracing::warn!("Failed to remove network {}: {}", network, e),
            }
        }
    }

    /// Networks carrying the stack label
    pub(crate) async fn stack_networks(&self, project: &str) -> Result<Vec<String>> {
        let networks = self.call(self.engine.list_networks()).await?;
        Ok(networks
            .into_iter()
            .filter(|n| n.labels.get(COMPOSE_PROJECT_LABEL).map(String::as_str) == Some(project))
            .map(|n| n.name)
            .collect())
    }

    /// Reclaim unused resources of one kind
    pub async fn prune(&self, kind: PruneKind) -> Result<PruneReport> {
        let result = self.call(self.engine.prune(kind)).await?;
        tracing::info!(
            "Pruned {}: {} removed, {} bytes reclaimed",
            kind,
            result.deleted.len(),
            result.space_reclaimed
        );
        Ok(PruneReport {
            kind,
            reclaimed_count: result.deleted.len(),
            deleted: result.deleted,
            space_reclaimed: result.space_reclaimed,
        })
    }

    // ==================== Containers ====================

    /// Create and start a container; a container that fails to start is removed again
    pub async fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.validate_spec(spec)?;
        self.ensure_container_name_free(&spec.name).await?;

        self.call(self.engine.create_container(&spec.to_create_config()))
            .await?;
        if let Err(e) = self.call(self.engine.start(&spec.name)).await {
            tracing::warn!("Container {} failed to start, removing it: {}", spec.name, e);
            if let Err(cleanup) = self.call(self.engine.remove(&spec.name, true)).await {
                tracing::warn!("Failed to remove {}: {}", spec.name, cleanup);
            }
            return Err(e);
        }

        tracing::info!("Created container {} from {}", spec.name, spec.image);
        Ok(())
    }

    /// Converge an existing container to `spec`
    ///
    /// Limit-only changes are applied in place; anything else recreates the
    /// container. A failed recreate is not rolled back.
    pub async fn update_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.validate_spec(spec)?;
        let details = self.call(self.engine.inspect_container(&spec.name)).await?;
        let current = ContainerSpec::from_details(&details);

        if current.differs_only_in_limits(spec) {
            if current.limits != spec.limits {
                self.call(self.engine.update_resources(&spec.name, &spec.limits))
                    .await?;
                tracing::info!("Updated resource limits of {}", spec.name);
            }
            return Ok(());
        }

        let grace = Some(self.config.stop_grace_secs);
        self.call(self.engine.stop(&spec.name, grace)).await?;
        self.call(self.engine.remove(&spec.name, true)).await?;
        self.call(self.engine.create_container(&spec.to_create_config()))
            .await?;
        self.call(self.engine.start(&spec.name)).await?;

        tracing::info!("Recreated container {}", spec.name);
        Ok(())
    }

    fn validate_spec(&self, spec: &ContainerSpec) -> Result<()> {
        if !is_valid_name(&spec.name) {
            return Err(CoreError::InvalidParams(format!(
                "invalid container name: {:?}",
                spec.name
            )));
        }
        if spec.image.trim().is_empty() {
            return Err(CoreError::InvalidParams("image is required".into()));
        }
        let limits = &spec.limits;
        if limits.cpu_shares < 0 || limits.nano_cpus < 0 || limits.memory_bytes < 0 {
            return Err(CoreError::InvalidParams(
                "resource limits must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Truncate the engine's log file for a container
    pub async fn clean_container_log(&self, name: &str) -> Result<()> {
        let details = self.call(self.engine.inspect_container(name)).await?;
        let path = details.log_path.ok_or_else(|| {
            CoreError::InvalidParams(format!("container {} has no log file", name))
        })?;

        tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;

        tracing::info!("Cleaned log of {} ({})", name, path);
        Ok(())
    }

    // ==================== Networks ====================

    pub async fn create_network(&self, spec: &NetworkSpec) -> Result<String> {
        if !is_valid_name(&spec.name) {
            return Err(CoreError::InvalidParams(format!(
                "invalid network name: {:?}",
                spec.name
            )));
        }
        let networks = self.call(self.engine.list_networks()).await?;
        if networks.iter().any(|n| n.name == spec.name) {
            return Err(CoreError::Conflict(format!(
                "network {} already exists",
                spec.name
            )));
        }

        let config = CreateNetworkConfig {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            subnet: spec.subnet.clone(),
            gateway: spec.gateway.clone(),
            ip_range: spec.ip_range.clone(),
            labels: spec.labels.clone(),
            options: spec.options.clone(),
        };
        let id = self.call(self.engine.create_network(&config)).await?;
        tracing::info!("Created network {}", spec.name);
        Ok(id)
    }

    /// Delete networks; a network with attached containers is refused
    pub async fn delete_networks(&self, names: &[String]) -> Result<BatchReport> {
        run_batch(names, |name| async move {
            let network = self.call(self.engine.inspect_network(name)).await?;
            if network.is_in_use() {
                return Err(CoreError::Conflict(format!(
                    "network {} is used by {}",
                    name,
                    network.containers.join(", ")
                )));
            }
            self.call(self.engine.remove_network(name)).await?;
            tracing::info!("Removed network {}", name);
            Ok(())
        })
        .await
    }

    // ==================== Volumes ====================

    pub async fn create_volume(&self, spec: &VolumeSpec) -> Result<()> {
        if !is_valid_name(&spec.name) {
            return Err(CoreError::InvalidParams(format!(
                "invalid volume name: {:?}",
                spec.name
            )));
        }
        let volumes = self.call(self.engine.list_volumes()).await?;
        if volumes.iter().any(|v| v.name == spec.name) {
            return Err(CoreError::Conflict(format!(
                "volume {} already exists",
                spec.name
            )));
        }

        let config = CreateVolumeConfig {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            driver_opts: spec.driver_opts.clone(),
            labels: spec.labels.clone(),
        };
        self.call(self.engine.create_volume(&config)).await?;
        tracing::info!("Created volume {}", spec.name);
        Ok(())
    }

    /// Delete volumes; the engine refuses volumes still mounted
    pub async fn delete_volumes(&self, names: &[String]) -> Result<BatchReport> {
        run_batch(names, |name| async move {
            self.call(self.engine.remove_volume(name, false)).await?;
            tracing::info!("Removed volume {}", name);
            Ok(())
        })
        .await
    }
}
