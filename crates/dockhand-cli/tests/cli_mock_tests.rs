//! Mock-based command tests.
//!
//! These tests call command functions directly with a `ContainerService`
//! backed by a `MockEngine`, avoiding any real container engine.

use dockhand_cli::commands::{self, ListArgs};
use dockhand_cli::output::OutputFormat;
use dockhand_core::test_support::{MockCall, MockEngine};
use dockhand_core::{
    ComposeAction, ComposeOperation, ContainerService, ContainerSpec, LogRequest, OperationKind,
    ServiceConfig,
};
use dockhand_engine::{ContainerStatus, EngineError, PruneKind, COMPOSE_PROJECT_LABEL};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

fn service(mock: &Arc<MockEngine>) -> ContainerService {
    ContainerService::new(mock.clone(), ServiceConfig::default())
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn write_temp(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

fn all() -> ListArgs {
    ListArgs {
        page: 1,
        page_size: 50,
        name: None,
    }
}

// ==================== Queries ====================

#[tokio::test]
async fn test_listings_succeed() {
    let mock = Arc::new(MockEngine::new());
    mock.add_container("web", ContainerStatus::Running);
    mock.add_compose_member("shop-db-1", "shop", "db", ContainerStatus::Running);
    mock.add_network("front", &[]);
    mock.add_volume("data", &[]);
    let svc = service(&mock);

    commands::ps(&svc, &all(), Some("running"), OutputFormat::Table).await.unwrap();
    commands::ps(&svc, &all(), None, OutputFormat::Json).await.unwrap();
    commands::list_networks(&svc, &all(), OutputFormat::Table).await.unwrap();
    commands::list_volumes(&svc, &all(), OutputFormat::Table).await.unwrap();
    commands::list_composes(&svc, &all(), OutputFormat::Table).await.unwrap();
    commands::limits(&svc, OutputFormat::Table).await.unwrap();
    commands::volume_options(&svc, OutputFormat::Json).await.unwrap();
}

#[tokio::test]
async fn test_bad_page_is_an_error() {
    let mock = Arc::new(MockEngine::new());
    let svc = service(&mock);
    let args = ListArgs {
        page: 0,
        page_size: 10,
        name: None,
    };

    let err = commands::ps(&svc, &args, None, OutputFormat::Table)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("page"), "{}", err);
}

// ==================== Operations ====================

#[tokio::test]
async fn test_operate_stops_every_container() {
    let mock = Arc::new(MockEngine::new());
    mock.add_container("web", ContainerStatus::Running);
    mock.add_container("api", ContainerStatus::Running);
    let svc = service(&mock);

    commands::operate(
        &svc,
        OperationKind::Stop,
        &names(&["web", "api"]),
        false,
        false,
        OutputFormat::Table,
    )
    .await
    .unwrap();

    assert_eq!(mock.container("web").unwrap().status, ContainerStatus::Exited);
    assert_eq!(mock.container("api").unwrap().status, ContainerStatus::Exited);
}

#[tokio::test]
async fn test_operate_partial_failure_fails_command() {
    let mock = Arc::new(MockEngine::new());
    mock.add_container("web", ContainerStatus::Running);
    mock.add_container("db", ContainerStatus::Exited);
    let svc = service(&mock);

    let err = commands::operate(
        &svc,
        OperationKind::Pause,
        &names(&["web", "db"]),
        false,
        false,
        OutputFormat::Json,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("1 of 2 failed"), "{}", err);
    assert_eq!(mock.container("web").unwrap().status, ContainerStatus::Paused);
}

#[tokio::test]
async fn test_create_from_spec_file() {
    let mock = Arc::new(MockEngine::new());
    let svc = service(&mock);
    let spec = ContainerSpec {
        name: "cache".into(),
        image: "redis:7".into(),
        ..ContainerSpec::default()
    };
    let file = write_temp(&serde_json::to_string(&spec).unwrap());

    commands::create(&svc, file.path()).await.unwrap();

    let created = mock.container("cache").unwrap();
    assert_eq!(created.image, "redis:7");
    assert_eq!(created.status, ContainerStatus::Running);
}

#[tokio::test]
async fn test_create_rejects_malformed_spec() {
    let mock = Arc::new(MockEngine::new());
    let svc = service(&mock);
    let file = write_temp("{ not json");

    let err = commands::create(&svc, file.path()).await.unwrap_err();
    assert!(err.to_string().contains("Invalid JSON"), "{}", err);
    assert!(mock.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_prune_and_resource_removal() {
    let mock = Arc::new(MockEngine::new());
    mock.add_network("front", &[]);
    mock.add_volume("data", &[]);
    let svc = service(&mock);

    commands::prune(&svc, PruneKind::Images, OutputFormat::Table).await.unwrap();
    assert!(mock.was_called(&MockCall::Prune {
        kind: PruneKind::Images
    }));

    commands::network_rm(&svc, &names(&["front"]), OutputFormat::Table)
        .await
        .unwrap();
    commands::volume_rm(&svc, &names(&["data"]), OutputFormat::Table)
        .await
        .unwrap();
    assert!(mock.network_names().is_empty());
    assert!(mock.volume_names().is_empty());
}

#[tokio::test]
async fn test_volume_create_applies_labels() {
    let mock = Arc::new(MockEngine::new());
    let svc = service(&mock);
    let labels = HashMap::from([("tier".to_string(), "db".to_string())]);

    commands::volume_create(&svc, "pgdata", "local", labels, HashMap::new())
        .await
        .unwrap();
    assert_eq!(mock.volume_names(), vec!["pgdata"]);
}

// ==================== Compose ====================

#[tokio::test]
async fn test_compose_up_and_down() {
    let mock = Arc::new(MockEngine::new());
    let svc = service(&mock);
    let file = write_temp("services:\n  web:\n    image: nginx:1.25\n");

    commands::compose_up(&svc, "site", file.path()).await.unwrap();
    assert_eq!(mock.container_names(), vec!["site-web-1"]);
    assert_eq!(mock.network_names(), vec!["site_default"]);

    let op = ComposeOperation::new("site", ComposeAction::Remove);
    commands::compose_operate(&svc, &op).await.unwrap();
    assert!(mock.container_names().is_empty());
    assert!(mock.network_names().is_empty());
}

#[tokio::test]
async fn test_compose_up_reports_failed_step() {
    let mock = Arc::new(MockEngine::new());
    mock.fail_on(
        "create_container",
        "site-web-1",
        EngineError::NotFound("No such image: nginx:9".into()),
    );
    let svc = service(&mock);
    let file = write_temp("services:\n  web:\n    image: nginx:9\n");

    let err = commands::compose_up(&svc, "site", file.path()).await.unwrap_err();
    assert!(err.to_string().contains("Container site-web-1 create"), "{}", err);
    // the network created before the failure stays
    assert_eq!(mock.network_names(), vec!["site_default"]);
}

#[tokio::test]
async fn test_compose_start_unknown_stack() {
    let mock = Arc::new(MockEngine::new());
    mock.add_network("site_default", &[(COMPOSE_PROJECT_LABEL, "site")]);
    let svc = service(&mock);

    let op = ComposeOperation::new("site", ComposeAction::Start);
    let err = commands::compose_operate(&svc, &op).await.unwrap_err();
    assert!(err.to_string().contains("Not found"), "{}", err);
}

// ==================== Logs ====================

#[tokio::test]
async fn test_logs_prints_until_end_of_stream() {
    let mock = Arc::new(MockEngine::new());
    mock.add_container("web", ContainerStatus::Running);
    mock.set_log_lines(&["ready"]);
    let svc = service(&mock);

    commands::logs(&svc, LogRequest::new("web")).await.unwrap();
    assert!(mock.was_called(&MockCall::Logs {
        name: "web".into(),
        follow: false
    }));
}
