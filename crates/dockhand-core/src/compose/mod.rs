//! Compose orchestration
//!
//! Turns a declarative compose definition into engine calls: networks and
//! volumes first, then services in dependency order. Stack membership is
//! carried entirely by engine labels, so a stack exists exactly as long as
//! one container carries its project label.

mod definition;

pub use definition::{
    is_valid_stack_name, CommandLine, ComposeFile, DependsOn, IpamDef, IpamPool, KeyValues,
    LongMount, LongPort, MountEntry, NetworkDef, PortEntry, Scalar, ServiceDef,
    ServiceNetworkDef, ServiceNetworks, VolumeDef, DEFAULT_NETWORK,
};

use crate::dispatch::{OperationKind, OperationRequest};
use crate::service::send_progress;
use crate::{ContainerService, CoreError, Result};
use definition::{StackFiles, StackPlan};
use dockhand_engine::{ContainerSummary, COMPOSE_PROJECT_LABEL};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// File name used for persisted definitions
pub const DEFINITION_FILE: &str = "docker-compose.yml";

/// Request to bring up a new stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub name: String,
    /// Raw YAML definition
    pub definition: String,
}

/// Ordered transcript of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub lines: Vec<String>,
    /// Step that stopped provisioning, if any
    pub failed_step: Option<String>,
}

impl ExecutionLog {
    pub fn succeeded(&self) -> bool {
        self.failed_step.is_none()
    }

    fn push(&mut self, progress: Option<&mpsc::UnboundedSender<String>>, line: String) {
        send_progress(progress, &line);
        self.lines.push(line);
    }

    /// Record the outcome of one step
    fn record<T>(
        &mut self,
        progress: Option<&mpsc::UnboundedSender<String>>,
        step: &str,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                self.push(progress, format!("{} ... done", step));
                Ok(value)
            }
            Err(e) => {
                self.push(progress, format!("{} ... failed: {}", step, e));
                self.failed_step = Some(step.to_string());
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeAction {
    Start,
    Stop,
    Restart,
    Remove,
}

impl std::fmt::Display for ComposeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComposeAction::Start => "start",
            ComposeAction::Stop => "stop",
            ComposeAction::Restart => "restart",
            ComposeAction::Remove => "remove",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ComposeAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "start" | "up" => Ok(ComposeAction::Start),
            "stop" => Ok(ComposeAction::Stop),
            "restart" => Ok(ComposeAction::Restart),
            "remove" | "rm" | "down" => Ok(ComposeAction::Remove),
            other => Err(CoreError::InvalidParams(format!(
                "unknown compose action: {}",
                other
            ))),
        }
    }
}

/// Whole-stack action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeOperation {
    pub name: String,
    pub action: ComposeAction,
    /// Keep stack networks on remove
    #[serde(default)]
    pub retain_networks: bool,
    /// Also remove the stack's named volumes on remove
    #[serde(default)]
    pub remove_volumes: bool,
    /// Also delete the persisted definition on remove
    #[serde(default)]
    pub remove_files: bool,
}

impl ComposeOperation {
    pub fn new(name: &str, action: ComposeAction) -> Self {
        Self {
            name: name.to_string(),
            action,
            retain_networks: false,
            remove_volumes: false,
            remove_files: false,
        }
    }
}

fn check_stack_name(name: &str) -> Result<()> {
    if !is_valid_stack_name(name) {
        return Err(CoreError::InvalidParams(format!(
            "invalid stack name {:?}: use lowercase letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(())
}

/// Parse a definition meant for stack `name`
fn parse_for(name: &str, definition: &str) -> Result<ComposeFile> {
    let file = ComposeFile::parse(definition)?;
    match &file.name {
        Some(pinned) if pinned != name => Err(CoreError::InvalidParams(format!(
            "definition is named {} but the stack is {}",
            pinned, name
        ))),
        _ => Ok(file),
    }
}

impl ContainerService {
    /// Validate a definition without touching the engine or the filesystem
    pub fn test_compose(&self, definition: &str) -> Result<ComposeFile> {
        ComposeFile::parse(definition)
    }

    /// Where the definition of stack `name` is persisted
    pub(crate) fn definition_path(&self, name: &str) -> Option<PathBuf> {
        self.config
            .compose_dir
            .as_ref()
            .map(|dir| dir.join(name).join(DEFINITION_FILE))
    }

    async fn persist_definition(&self, name: &str, definition: &str) -> Result<Option<StackFiles>> {
        let Some(path) = self.definition_path(name) else {
            return Ok(None);
        };
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, definition).await?;
        tracing::debug!("Wrote definition of {} to {}", name, path.display());
        Ok(Some(StackFiles::new(&path)))
    }

    /// Members of a stack, oldest first
    async fn stack_members(&self, name: &str) -> Result<Vec<ContainerSummary>> {
        let mut members: Vec<ContainerSummary> = self
            .call(self.engine.list_containers(true))
            .await?
            .into_iter()
            .filter(|c| c.compose_project() == Some(name))
            .collect();
        members.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        Ok(members)
    }

    /// Bring up a new stack
    ///
    /// Provisioning failures do not turn into `Err`: the returned log carries
    /// the failing step and everything created before it stays in place.
    pub async fn create_compose(
        &self,
        req: &ComposeRequest,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<ExecutionLog> {
        check_stack_name(&req.name)?;
        let file = parse_for(&req.name, &req.definition)?;

        if !self.stack_members(&req.name).await?.is_empty() {
            return Err(CoreError::Conflict(format!(
                "compose stack {} already exists",
                req.name
            )));
        }

        let files = self.persist_definition(&req.name, &req.definition).await?;
        let plan = file.plan(&req.name, files.as_ref())?;

        let mut log = ExecutionLog::default();
        log.push(progress, format!("Creating stack {}", req.name));
        match self.provision(&plan, &mut log, progress, false).await {
            Ok(()) => {
                log.push(progress, format!("Stack {} is up", req.name));
                tracing::info!("Created compose stack {}", req.name);
            }
            Err(e) => {
                tracing::warn!("Compose stack {} stopped provisioning: {}", req.name, e);
            }
        }
        Ok(log)
    }

    /// Converge an existing stack onto a new definition
    pub async fn update_compose(&self, name: &str, definition: &str) -> Result<()> {
        check_stack_name(name)?;
        let file = parse_for(name, definition)?;

        let members = self.stack_members(name).await?;
        if members.is_empty() {
            return Err(CoreError::NotFound(format!("compose stack {}", name)));
        }

        let files = self.persist_definition(name, definition).await?;
        let plan = file.plan(name, files.as_ref())?;

        let wanted: HashSet<&str> = plan.services.iter().map(|s| s.service.as_str()).collect();
        for member in &members {
            let gone = member
                .compose_service()
                .map(|service| !wanted.contains(service))
                .unwrap_or(true);
            if gone {
                tracing::info!("Removing {}: service no longer in stack {}", member.name, name);
                self.call(self.engine.remove(&member.name, true)).await?;
            }
        }

        let mut log = ExecutionLog::default();
        self.provision(&plan, &mut log, None, true).await?;
        for line in &log.lines {
            tracing::debug!("{}: {}", name, line);
        }
        tracing::info!("Updated compose stack {}", name);
        Ok(())
    }

    /// Create networks, volumes, then services
    ///
    /// With `replace`, containers already holding a planned name are removed
    /// first so they are recreated from the new definition.
    async fn provision(
        &self,
        plan: &StackPlan,
        log: &mut ExecutionLog,
        progress: Option<&mpsc::UnboundedSender<String>>,
        replace: bool,
    ) -> Result<()> {
        let networks: HashSet<String> = self
            .call(self.engine.list_networks())
            .await?
            .into_iter()
            .map(|n| n.name)
            .collect();
        for network in &plan.networks {
            let name = &network.config.name;
            if networks.contains(name) {
                log.push(progress, format!("Network {} exists", name));
                continue;
            }
            let step = format!("Network {} create", name);
            let result = if network.external {
                Err(CoreError::NotFound(format!("external network {}", name)))
            } else {
                self.call(self.engine.create_network(&network.config))
                    .await
                    .map(|_| ())
            };
            log.record(progress, &step, result)?;
        }

        let volumes: HashSet<String> = self
            .call(self.engine.list_volumes())
            .await?
            .into_iter()
            .map(|v| v.name)
            .collect();
        for volume in &plan.volumes {
            let name = &volume.config.name;
            if volumes.contains(name) {
                log.push(progress, format!("Volume {} exists", name));
                continue;
            }
            let step = format!("Volume {} create", name);
            let result = if volume.external {
                Err(CoreError::NotFound(format!("external volume {}", name)))
            } else {
                self.call(self.engine.create_volume(&volume.config))
                    .await
                    .map(|_| ())
            };
            log.record(progress, &step, result)?;
        }

        let existing: HashSet<String> = if replace {
            self.call(self.engine.list_containers(true))
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect()
        } else {
            HashSet::new()
        };

        for service in &plan.services {
            let name = service.container_name();
            if existing.contains(name) {
                let step = format!("Container {} remove", name);
                let result = self.call(self.engine.remove(name, true)).await;
                log.record(progress, &step, result)?;
            }

            let step = format!("Container {} create", name);
            let result = self.call(self.engine.create_container(&service.config)).await;
            log.record(progress, &step, result)?;

            for (network, aliases) in &service.extra_networks {
                let step = format!("Container {} join {}", name, network);
                let result = self
                    .call(self.engine.connect_network(network, name, aliases))
                    .await;
                log.record(progress, &step, result)?;
            }

            let step = format!("Container {} start", name);
            let result = self.call(self.engine.start(name)).await;
            log.record(progress, &step, result)?;
        }
        Ok(())
    }

    /// Apply a whole-stack action to every member
    pub async fn operate_compose(&self, op: &ComposeOperation) -> Result<()> {
        let members = self.stack_members(&op.name).await?;
        if members.is_empty() {
            return Err(CoreError::NotFound(format!("compose stack {}", op.name)));
        }

        let mut first_error: Option<CoreError> = None;
        let mut keep_first = |result: Result<()>, what: &str| {
            if let Err(e) = result {
                tracing::warn!("{} {}: {}", op.action, what, e);
                first_error.get_or_insert(e);
            }
        };

        match op.action {
            ComposeAction::Start | ComposeAction::Stop | ComposeAction::Restart => {
                let kind = match op.action {
                    ComposeAction::Start => OperationKind::Start,
                    ComposeAction::Stop => OperationKind::Stop,
                    _ => OperationKind::Restart,
                };
                let req = OperationRequest::new(kind, &[]);
                let mut ordered: Vec<&ContainerSummary> = members.iter().collect();
                if kind == OperationKind::Stop {
                    ordered.reverse();
                }
                for member in ordered {
                    let result = self.operate_one(&member.name, &req).await.map(|_| ());
                    keep_first(result, &member.name);
                }
            }
            ComposeAction::Remove => {
                let mut members_removed = true;
                for member in members.iter().rev() {
                    let result = self.call(self.engine.remove(&member.name, true)).await;
                    members_removed &= result.is_ok();
                    keep_first(result, &member.name);
                }

                // Networks, volumes and files go only once no member is left
                if !members_removed {
                    tracing::warn!("Stack {} still has members, keeping its resources", op.name);
                } else {
                    if !(op.retain_networks || self.config.retain_networks) {
                        match self.stack_networks(&op.name).await {
                            Ok(networks) => {
                                for network in networks {
                                    let result = self.call(self.engine.remove_network(&network)).await;
                                    keep_first(result, &network);
                                }
                            }
                            Err(e) => keep_first(Err(e), "networks"),
                        }
                    }

                    if op.remove_volumes {
                        match self.call(self.engine.list_volumes()).await {
                            Ok(volumes) => {
                                for volume in volumes.into_iter().filter(|v| {
                                    v.labels.get(COMPOSE_PROJECT_LABEL).map(String::as_str)
                                        == Some(op.name.as_str())
                                }) {
                                    let result =
                                        self.call(self.engine.remove_volume(&volume.name, false)).await;
                                    keep_first(result, &volume.name);
                                }
                            }
                            Err(e) => keep_first(Err(e), "volumes"),
                        }
                    }

                    if op.remove_files {
                        if let Some(dir) = self
                            .definition_path(&op.name)
                            .and_then(|p| p.parent().map(PathBuf::from))
                        {
                            if dir.exists() {
                                let result = tokio::fs::remove_dir_all(&dir)
                                    .await
                                    .map_err(CoreError::from);
                                keep_first(result, "definition files");
                            }
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("{} compose stack {}", op.action, op.name);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::{ErrorKind, ServiceConfig};
    use dockhand_engine::{ContainerStatus, EngineError, COMPOSE_NETWORK_LABEL};
    use std::sync::Arc;

    const WEB: &str = r#"
services:
  web:
    image: nginx:1.25
    ports: ["8080:80"]
    depends_on: [api]
    networks: [front, back]
  api:
    image: shop/api:2
    networks: [back]
    volumes:
      - data:/data
networks:
  front:
  back:
volumes:
  data:
"#;

    fn service(mock: &Arc<MockEngine>) -> ContainerService {
        ContainerService::new(mock.clone(), ServiceConfig::default())
    }

    fn service_in(mock: &Arc<MockEngine>, dir: &std::path::Path) -> ContainerService {
        let config = ServiceConfig {
            compose_dir: Some(dir.to_path_buf()),
            ..ServiceConfig::default()
        };
        ContainerService::new(mock.clone(), config)
    }

    fn request(name: &str, definition: &str) -> ComposeRequest {
        ComposeRequest {
            name: name.to_string(),
            definition: definition.to_string(),
        }
    }

    fn position(calls: &[MockCall], wanted: impl Fn(&MockCall) -> bool) -> Vec<usize> {
        calls
            .iter()
            .enumerate()
            .filter(|(_, c)| wanted(c))
            .map(|(i, _)| i)
            .collect()
    }

    // ==================== Test ====================

    #[tokio::test]
    async fn test_compose_has_no_side_effects() {
        let mock = Arc::new(MockEngine::new());
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(&mock, dir.path());

        let file = svc.test_compose(WEB).unwrap();
        assert_eq!(file.services.len(), 2);

        let err = svc.test_compose("services:\n  web: {}\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        assert!(mock.get_calls().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("up".parse::<ComposeAction>().unwrap(), ComposeAction::Start);
        assert_eq!("down".parse::<ComposeAction>().unwrap(), ComposeAction::Remove);
        assert!("scale".parse::<ComposeAction>().is_err());
    }

    // ==================== Create ====================

    #[tokio::test]
    async fn test_create_provisions_in_dependency_order() {
        let mock = Arc::new(MockEngine::new());
        let dir = tempfile::tempdir().unwrap();
        let svc = service_in(&mock, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let log = svc.create_compose(&request("shop", WEB), Some(&tx)).await.unwrap();
        assert!(log.succeeded(), "{:?}", log);

        assert_eq!(mock.network_names(), vec!["shop_back", "shop_front"]);
        assert_eq!(mock.volume_names(), vec!["shop_data"]);
        let api = mock.container("shop-api-1").unwrap();
        let web = mock.container("shop-web-1").unwrap();
        assert_eq!(api.status, ContainerStatus::Running);
        assert_eq!(web.status, ContainerStatus::Running);
        assert!(api.created < web.created);
        assert_eq!(web.networks, vec!["shop_back", "shop_front"]);
        assert_eq!(api.compose_project(), Some("shop"));

        let calls = mock.mutating_calls();
        let networks = position(&calls, |c| matches!(c, MockCall::CreateNetwork { .. }));
        let creates = position(&calls, |c| matches!(c, MockCall::Create { .. }));
        assert!(networks.iter().max() < creates.iter().min());

        let path = dir.path().join("shop").join(DEFINITION_FILE);
        assert_eq!(std::fs::read_to_string(path).unwrap(), WEB);

        drop(tx);
        let mut streamed = Vec::new();
        while let Some(line) = rx.recv().await {
            streamed.push(line);
        }
        assert_eq!(streamed, log.lines);
    }

    #[tokio::test]
    async fn test_create_existing_stack_is_conflict() {
        let mock = Arc::new(MockEngine::new());
        mock.add_compose_member("shop-web-1", "shop", "web", ContainerStatus::Running);
        let svc = service(&mock);

        let err = svc.create_compose(&request("shop", WEB), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(mock.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input_before_engine() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);

        let err = svc.create_compose(&request("Shop!", WEB), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let pinned = format!("name: other\n{}", WEB);
        let err = svc.create_compose(&request("shop", &pinned), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        assert!(mock.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_records_step_and_keeps_progress() {
        let mock = Arc::new(MockEngine::new());
        mock.fail_on(
            "start",
            "shop-web-1",
            EngineError::RuntimeError("port 8080 is already allocated".into()),
        );
        let svc = service(&mock);

        let log = svc.create_compose(&request("shop", WEB), None).await.unwrap();
        assert_eq!(log.failed_step.as_deref(), Some("Container shop-web-1 start"));
        assert!(log.lines.last().unwrap().contains("port 8080 is already allocated"));

        // earlier work stays in place
        assert_eq!(
            mock.container("shop-api-1").unwrap().status,
            ContainerStatus::Running
        );
        assert!(mock.container("shop-web-1").is_some());
    }

    #[tokio::test]
    async fn test_create_missing_external_network_fails_step() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);
        let text = "services:\n  app:\n    image: x\n    networks: [proxy]\nnetworks:\n  proxy:\n    external: true\n";

        let log = svc.create_compose(&request("blog", text), None).await.unwrap();
        assert_eq!(log.failed_step.as_deref(), Some("Network proxy create"));
        assert!(mock.container_names().is_empty());
    }

    // ==================== Update ====================

    #[tokio::test]
    async fn test_update_missing_stack_is_not_found() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);

        let err = svc.update_compose("shop", WEB).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_name_mismatch_is_invalid() {
        let mock = Arc::new(MockEngine::new());
        mock.add_compose_member("shop-web-1", "shop", "web", ContainerStatus::Running);
        let svc = service(&mock);

        let pinned = format!("name: blog\n{}", WEB);
        let err = svc.update_compose("shop", &pinned).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(mock.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_converges_services() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);
        svc.create_compose(&request("shop", WEB), None).await.unwrap();
        mock.add_compose_member("shop-worker-1", "shop", "worker", ContainerStatus::Running);

        let next = WEB.replace("nginx:1.25", "nginx:1.27");
        svc.update_compose("shop", &next).await.unwrap();

        assert!(mock.container("shop-worker-1").is_none());
        let web = mock.container("shop-web-1").unwrap();
        assert_eq!(web.image, "nginx:1.27");
        assert_eq!(web.status, ContainerStatus::Running);
        assert_eq!(
            mock.container("shop-api-1").unwrap().status,
            ContainerStatus::Running
        );
    }

    // ==================== Operate ====================

    fn seed_stack(mock: &MockEngine) {
        mock.add_network(
            "shop_default",
            &[(COMPOSE_PROJECT_LABEL, "shop"), (COMPOSE_NETWORK_LABEL, "default")],
        );
        mock.add_volume("shop_data", &[(COMPOSE_PROJECT_LABEL, "shop")]);
        mock.add_compose_member("shop-db-1", "shop", "db", ContainerStatus::Running);
        mock.add_compose_member("shop-web-1", "shop", "web", ContainerStatus::Exited);
        mock.attach("shop_default", "shop-db-1");
        mock.attach("shop_default", "shop-web-1");
    }

    #[tokio::test]
    async fn test_stack_removal_removes_members_before_networks() {
        let mock = Arc::new(MockEngine::new());
        seed_stack(&mock);
        let svc = service(&mock);

        svc.operate_compose(&ComposeOperation::new("shop", ComposeAction::Remove))
            .await
            .unwrap();

        assert!(mock.container_names().is_empty());
        assert!(mock.network_names().is_empty());
        assert_eq!(mock.volume_names(), vec!["shop_data"]);

        let calls = mock.mutating_calls();
        let removes = position(&calls, |c| matches!(c, MockCall::Remove { force: true, .. }));
        let net_removes = position(&calls, |c| matches!(c, MockCall::RemoveNetwork { .. }));
        assert_eq!(removes.len(), 2);
        assert_eq!(net_removes.len(), 1);
        assert!(removes.iter().max() < net_removes.iter().min());
    }

    #[tokio::test]
    async fn test_stack_removal_keeps_networks_while_a_member_remains() {
        let mock = Arc::new(MockEngine::new());
        seed_stack(&mock);
        mock.fail_on(
            "remove",
            "shop-db-1",
            EngineError::RuntimeError("device or resource busy".into()),
        );
        let dir = tempfile::tempdir().unwrap();
        let stack_dir = dir.path().join("shop");
        std::fs::create_dir_all(&stack_dir).unwrap();
        std::fs::write(stack_dir.join(DEFINITION_FILE), WEB).unwrap();
        let svc = service_in(&mock, dir.path());

        let op = ComposeOperation {
            remove_volumes: true,
            remove_files: true,
            ..ComposeOperation::new("shop", ComposeAction::Remove)
        };
        let err = svc.operate_compose(&op).await.unwrap_err();

        assert!(err.to_string().contains("device or resource busy"));
        assert_eq!(mock.container_names(), vec!["shop-db-1"]);
        assert_eq!(mock.network_names(), vec!["shop_default"]);
        assert_eq!(mock.volume_names(), vec!["shop_data"]);
        assert!(stack_dir.exists());
        assert!(!mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::RemoveNetwork { .. } | MockCall::RemoveVolume { .. })));
    }

    #[tokio::test]
    async fn test_stack_removal_with_volumes_and_files() {
        let mock = Arc::new(MockEngine::new());
        seed_stack(&mock);
        let dir = tempfile::tempdir().unwrap();
        let stack_dir = dir.path().join("shop");
        std::fs::create_dir_all(&stack_dir).unwrap();
        std::fs::write(stack_dir.join(DEFINITION_FILE), WEB).unwrap();
        let svc = service_in(&mock, dir.path());

        let op = ComposeOperation {
            retain_networks: true,
            remove_volumes: true,
            remove_files: true,
            ..ComposeOperation::new("shop", ComposeAction::Remove)
        };
        svc.operate_compose(&op).await.unwrap();

        assert_eq!(mock.network_names(), vec!["shop_default"]);
        assert!(mock.volume_names().is_empty());
        assert!(!stack_dir.exists());
    }

    #[tokio::test]
    async fn test_stack_start_applies_state_rules() {
        let mock = Arc::new(MockEngine::new());
        seed_stack(&mock);
        let svc = service(&mock);

        svc.operate_compose(&ComposeOperation::new("shop", ComposeAction::Start))
            .await
            .unwrap();

        assert!(mock.was_called(&MockCall::Start {
            name: "shop-web-1".into()
        }));
        // already running: no engine call
        assert!(!mock.was_called(&MockCall::Start {
            name: "shop-db-1".into()
        }));
    }

    #[tokio::test]
    async fn test_stack_operation_attempts_every_member() {
        let mock = Arc::new(MockEngine::new());
        seed_stack(&mock);
        mock.set_status("shop-web-1", ContainerStatus::Running);
        mock.fail_on(
            "stop",
            "shop-web-1",
            EngineError::RuntimeError("cannot kill container".into()),
        );
        let svc = service(&mock);

        let err = svc
            .operate_compose(&ComposeOperation::new("shop", ComposeAction::Stop))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineError);
        assert!(err.to_string().contains("cannot kill container"));
        assert_eq!(
            mock.container("shop-db-1").unwrap().status,
            ContainerStatus::Exited
        );
    }

    #[tokio::test]
    async fn test_operate_unknown_stack_is_not_found() {
        let mock = Arc::new(MockEngine::new());
        let svc = service(&mock);

        let err = svc
            .operate_compose(&ComposeOperation::new("ghost", ComposeAction::Restart))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
