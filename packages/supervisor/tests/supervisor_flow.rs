// ABOUTME: End-to-end supervisor tests over an in-memory database and both backends
// ABOUTME: Exercises the status state machine, rejections, rebuild stages, notifications and live updates

#![cfg(unix)]

mod common;

use common::{container_config, fake_cli, process_config, FakeRuntime, LONG_RUNNING_CLI};
use nexus_supervisor::{
    ContainerBackend, EventBus, LiveUpdateKind, MetricsCollector, MonitorConfig, NewNode,
    NodeBackend, NodeStatus, NodeStore, NodeSupervisor, NodeType, NotificationKind,
    ObservedState, OperationResult, ProcessBackend, RebuildStage, SqliteNodeStore, StartOptions,
    SupervisorError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    supervisor: Arc<NodeSupervisor>,
    store: Arc<SqliteNodeStore>,
    process: Arc<ProcessBackend>,
    container: Arc<ContainerBackend>,
    runtime: Arc<FakeRuntime>,
    _dir: TempDir,
}

async fn harness_with(readiness: Option<Duration>, cli_body: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteNodeStore::in_memory().await.unwrap());
    let process = Arc::new(ProcessBackend::new(process_config(fake_cli(&dir, cli_body))));
    let runtime = Arc::new(FakeRuntime::new());
    let container = Arc::new(ContainerBackend::new(container_config(&dir), runtime.clone()));

    let mut supervisor = NodeSupervisor::new(store.clone(), EventBus::new(64))
        .with_readiness_timeout(readiness);
    supervisor.register_backend(process.clone());
    supervisor.register_backend(container.clone());

    Harness {
        supervisor: Arc::new(supervisor),
        store,
        process,
        container,
        runtime,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(None, LONG_RUNNING_CLI).await
}

fn new_node(prover_id: &str, node_type: NodeType) -> NewNode {
    NewNode {
        prover_id: prover_id.to_string(),
        name: format!("Node {}", prover_id),
        node_type,
        config: None,
    }
}

#[tokio::test]
async fn test_process_node_start_reject_stop() {
    let h = harness().await;
    let mut events = h.supervisor.subscribe([]);
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();
    assert_eq!(node.status, NodeStatus::Stopped);
    assert_eq!(events.recv().await.unwrap().kind, LiveUpdateKind::NodeCreated);

    let started = h
        .supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();
    assert!(started.outcome.pid.unwrap() > 0);
    assert_eq!(started.node.status, NodeStatus::Running);
    assert!(started.node.last_seen.is_some());
    assert!(h.process.is_tracked("p1").await);

    let started_event = events.recv().await.unwrap();
    assert_eq!(started_event.kind, LiveUpdateKind::NodeStarted);
    assert_eq!(started_event.data.pid, started.outcome.pid);

    let again = h.supervisor.start(node.id, &StartOptions::default()).await;
    assert!(matches!(again, Err(SupervisorError::AlreadyRunning { .. })));
    assert_eq!(h.process.tracked().await.len(), 1);

    let stopped = h.supervisor.stop(node.id).await.unwrap();
    assert_eq!(stopped.node.status, NodeStatus::Stopped);
    assert!(!h.process.is_tracked("p1").await);
    assert_eq!(events.recv().await.unwrap().kind, LiveUpdateKind::NodeStopped);

    let titles: Vec<String> = h
        .supervisor
        .notifications(Some(node.id), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Node Stopped", "Node Started"]);
}

#[tokio::test]
async fn test_stop_of_stopped_node_is_rejected() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();

    let result = h.supervisor.stop(node.id).await;
    assert!(matches!(result, Err(SupervisorError::AlreadyStopped { .. })));
}

#[tokio::test]
async fn test_stop_of_untracked_running_node_succeeds() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();
    h.store
        .update_node(node.id, &nexus_supervisor::NodeUpdate::status(NodeStatus::Running))
        .await
        .unwrap();

    let stopped = h.supervisor.stop(node.id).await.unwrap();
    assert_eq!(stopped.node.status, NodeStatus::Stopped);
    assert_eq!(
        stopped.outcome.method,
        nexus_supervisor::StopMethod::AlreadyStopped
    );
}

#[tokio::test]
async fn test_custom_container_name_survives_supervisor_restart() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();
    let overrides = StartOptions {
        container_name: Some("custom-c1".to_string()),
        ..Default::default()
    };
    h.supervisor.start(node.id, &overrides).await.unwrap();

    // A second supervisor over the same database has an empty running table
    let fresh = Arc::new(ContainerBackend::new(
        container_config(&h._dir),
        h.runtime.clone(),
    ));
    let mut restarted = NodeSupervisor::new(h.store.clone(), EventBus::new(8));
    restarted.register_backend(fresh.clone());
    assert!(!fresh.is_tracked("c1").await);

    let status = restarted.status(node.id).await.unwrap();
    assert_eq!(status.observed.state, ObservedState::Running);
    assert!(!status.diverged);

    let stopped = restarted.stop(node.id).await.unwrap();
    assert_eq!(stopped.outcome.method, nexus_supervisor::StopMethod::Scan);
    assert_eq!(stopped.node.status, NodeStatus::Stopped);
    h.runtime
        .with_state(|s| assert!(!s.containers.contains_key("custom-c1")));
}

#[tokio::test]
async fn test_launch_failure_marks_error_and_records_text() {
    let h = harness_with(None, "echo 'bad credentials' >&2\nexit 2").await;
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();

    let result = h.supervisor.start(node.id, &StartOptions::default()).await;
    assert!(matches!(result, Err(SupervisorError::Backend { .. })));

    let failed = h.supervisor.get_node(node.id).await.unwrap();
    assert_eq!(failed.status, NodeStatus::Error);
    assert!(failed.errors.unwrap().contains("bad credentials"));
    assert!(!h.process.is_tracked("p1").await);
}

#[tokio::test]
async fn test_container_node_lifecycle_persists_identifiers() {
    let h = harness().await;
    let mut docker_events = h
        .supervisor
        .subscribe([LiveUpdateKind::DockerNodeStarted, LiveUpdateKind::DockerNodeStopped]);
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();

    let started = h
        .supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();
    assert_eq!(started.node.container_name.as_deref(), Some("nexus-node-c1"));
    assert_eq!(started.node.container_id.as_deref(), Some("id-nexus-node-c1"));

    let event = docker_events.recv().await.unwrap();
    assert_eq!(event.kind, LiveUpdateKind::DockerNodeStarted);
    assert_eq!(event.data.container_name.as_deref(), Some("nexus-node-c1"));

    let status = h.supervisor.status(node.id).await.unwrap();
    assert_eq!(status.persisted, NodeStatus::Running);
    assert_eq!(status.observed.state, ObservedState::Running);
    assert!(!status.diverged);

    let stopped = h.supervisor.stop(node.id).await.unwrap();
    assert_eq!(stopped.node.container_name, None);
    assert_eq!(stopped.node.container_id, None);
    assert_eq!(
        docker_events.recv().await.unwrap().kind,
        LiveUpdateKind::DockerNodeStopped
    );

    let notifications = h.supervisor.notifications(Some(node.id), 10).await.unwrap();
    assert_eq!(notifications[1].title, "Docker Node Started");
    assert_eq!(notifications[1].kind, NotificationKind::Success);
}

#[tokio::test]
async fn test_container_build_failure_leaves_no_handle() {
    let h = harness().await;
    h.runtime.with_state(|s| s.fail_build = true);
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();

    let result = h.supervisor.start(node.id, &StartOptions::default()).await;
    let err = result.unwrap_err();
    let envelope: OperationResult<()> = OperationResult::error(&err);
    assert!(!envelope.success);
    assert!(envelope.error.unwrap().contains("docker build failed"));

    assert!(!h.container.is_tracked("c1").await);
    assert_eq!(
        h.supervisor.get_node(node.id).await.unwrap().status,
        NodeStatus::Error
    );
}

#[tokio::test]
async fn test_status_reports_divergence() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();
    h.supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();

    h.runtime.with_state(|s| s.containers.clear());
    let report = h.supervisor.status(node.id).await.unwrap();
    assert_eq!(report.persisted, NodeStatus::Running);
    assert_eq!(report.observed.state, ObservedState::Stopped);
    assert!(report.diverged);
}

#[tokio::test]
async fn test_rebuild_runs_all_stages() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();
    h.supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();

    let report = h
        .supervisor
        .rebuild(node.id, &StartOptions::default())
        .await
        .unwrap();
    assert_eq!(
        report.stages,
        vec![
            RebuildStage::Stopping,
            RebuildStage::Building,
            RebuildStage::Starting,
            RebuildStage::Completed
        ]
    );
    assert_eq!(report.image, "nexus-node-c1");
    assert_eq!(report.node.status, NodeStatus::Running);

    // One build from the first start, one from the rebuild; the restart skips building
    h.runtime.with_state(|s| assert_eq!(s.builds.len(), 2));

    let titles: Vec<String> = h
        .supervisor
        .notifications(Some(node.id), 1)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Node Rebuilt"]);
}

#[tokio::test]
async fn test_rebuild_build_failure_does_not_restart() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();
    h.supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();
    h.runtime.with_state(|s| s.fail_build = true);

    let result = h
        .supervisor
        .rebuild(node.id, &StartOptions::default())
        .await;
    match result {
        Err(SupervisorError::Rebuild {
            stage, completed, ..
        }) => {
            assert_eq!(stage, RebuildStage::Building);
            assert_eq!(completed, vec![RebuildStage::Stopping]);
        }
        other => panic!("expected rebuild failure, got {:?}", other),
    }

    assert!(!h.container.is_tracked("c1").await);
    h.runtime.with_state(|s| assert_eq!(s.compose_ups.len(), 1));
    assert_eq!(
        h.supervisor.get_node(node.id).await.unwrap().status,
        NodeStatus::Stopped
    );
}

#[tokio::test]
async fn test_rebuild_is_container_only() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();

    let result = h
        .supervisor
        .rebuild(node.id, &StartOptions::default())
        .await;
    assert!(matches!(result, Err(SupervisorError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_create_node_validation() {
    let h = harness().await;
    h.supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();

    let duplicate = h
        .supervisor
        .create_node(new_node("p1", NodeType::Container))
        .await;
    assert!(matches!(duplicate, Err(SupervisorError::DuplicateProverId(_))));

    let unsafe_id = h
        .supervisor
        .create_node(new_node("p1;rm", NodeType::Process))
        .await;
    assert!(matches!(unsafe_id, Err(SupervisorError::InvalidRequest(_))));

    let mut unnamed = new_node("p2", NodeType::Process);
    unnamed.name = "  ".to_string();
    assert!(matches!(
        h.supervisor.create_node(unnamed).await,
        Err(SupervisorError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_delete_running_node_stops_it_first() {
    let h = harness().await;
    let mut deleted = h.supervisor.subscribe([LiveUpdateKind::NodeDeleted]);
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();
    h.supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();

    h.supervisor.delete_node(node.id).await.unwrap();
    assert!(!h.process.is_tracked("p1").await);
    assert!(matches!(
        h.supervisor.get_node(node.id).await,
        Err(SupervisorError::NotFound(_))
    ));
    assert_eq!(deleted.recv().await.unwrap().data.prover_id, "p1");
}

#[tokio::test]
async fn test_concurrent_starts_of_different_nodes() {
    let h = harness().await;
    let a = h
        .supervisor
        .create_node(new_node("node-a", NodeType::Process))
        .await
        .unwrap();
    let b = h
        .supervisor
        .create_node(new_node("node-b", NodeType::Process))
        .await
        .unwrap();

    let options = StartOptions::default();
    let (ra, rb) = tokio::join!(
        h.supervisor.start(a.id, &options),
        h.supervisor.start(b.id, &options)
    );
    assert_ne!(ra.unwrap().outcome.pid, rb.unwrap().outcome.pid);
    assert_eq!(h.process.tracked().await.len(), 2);

    h.supervisor.shutdown().await;
    assert!(h.process.tracked().await.is_empty());
    assert_eq!(
        h.supervisor.get_node(a.id).await.unwrap().status,
        NodeStatus::Stopped
    );
}

#[tokio::test]
async fn test_readiness_probe_accepts_running_node() {
    let h = harness_with(Some(Duration::from_secs(2)), LONG_RUNNING_CLI).await;
    let node = h
        .supervisor
        .create_node(new_node("p1", NodeType::Process))
        .await
        .unwrap();

    let started = h
        .supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();
    assert_eq!(started.node.status, NodeStatus::Running);
    h.supervisor.stop(node.id).await.unwrap();
}

#[tokio::test]
async fn test_readiness_probe_failure_marks_error() {
    let h = harness_with(Some(Duration::from_secs(1)), LONG_RUNNING_CLI).await;
    h.runtime.with_state(|s| s.start_stopped = true);
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();

    let result = h.supervisor.start(node.id, &StartOptions::default()).await;
    assert!(matches!(result, Err(SupervisorError::NotReady { .. })));

    let failed = h.supervisor.get_node(node.id).await.unwrap();
    assert_eq!(failed.status, NodeStatus::Error);
    assert!(failed.errors.unwrap().contains("did not report running"));
    assert!(!h.container.is_tracked("c1").await);
    h.runtime.with_state(|s| assert!(s.containers.is_empty()));
}

#[tokio::test]
async fn test_metrics_are_persisted_and_collected() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();
    h.supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();

    let metrics = h.supervisor.metrics(node.id).await.unwrap();
    assert_eq!(metrics.cpu_usage, Some(25.0));
    let history = h.supervisor.metrics_history(node.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sample.cpu_usage, 25.0);
    assert_eq!(history[0].sample.uptime.as_deref(), Some("45m"));

    let collector = MetricsCollector::new(
        h.supervisor.clone(),
        MonitorConfig {
            interval: Duration::from_secs(60),
            history_days: 30,
        },
    );
    let summary = collector.collect_once().await;
    assert_eq!(summary.sampled, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.supervisor.metrics_history(node.id, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_collector_start_is_idempotent() {
    let h = harness().await;
    let collector = MetricsCollector::new(
        h.supervisor.clone(),
        MonitorConfig {
            interval: Duration::from_millis(50),
            history_days: 30,
        },
    );

    collector.start().await;
    collector.start().await;
    assert!(collector.is_running().await);
    collector.stop().await;
    assert!(!collector.is_running().await);
}

async fn wait_for_samples(h: &Harness, id: i64, count: usize) {
    for _ in 0..40 {
        if h.supervisor.metrics_history(id, 100).await.unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("collector never reached {} samples", count);
}

#[tokio::test]
async fn test_collector_restart_runs_a_single_loop() {
    let h = harness().await;
    let node = h
        .supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();
    h.supervisor
        .start(node.id, &StartOptions::default())
        .await
        .unwrap();

    let collector = MetricsCollector::new(
        h.supervisor.clone(),
        MonitorConfig {
            interval: Duration::from_millis(400),
            history_days: 30,
        },
    );

    collector.start().await;
    wait_for_samples(&h, node.id, 1).await;
    collector.stop().await;
    collector.start().await;
    wait_for_samples(&h, node.id, 2).await;

    // One interval later only the restarted loop has sampled again
    tokio::time::sleep(Duration::from_millis(600)).await;
    collector.stop().await;
    assert_eq!(h.supervisor.metrics_history(node.id, 100).await.unwrap().len(), 3);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.supervisor.metrics_history(node.id, 100).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_availability_covers_both_backends() {
    let h = harness().await;
    let availability = h.supervisor.check_availability().await;
    let types: Vec<NodeType> = availability.iter().map(|a| a.node_type).collect();
    assert_eq!(types, vec![NodeType::Container, NodeType::Process]);
    assert!(availability[1].availability.available);
}

#[tokio::test]
async fn test_missing_backend_is_reported() {
    let store = Arc::new(SqliteNodeStore::in_memory().await.unwrap());
    let supervisor = NodeSupervisor::new(store, EventBus::new(8));
    let node = supervisor
        .create_node(new_node("c1", NodeType::Container))
        .await
        .unwrap();

    let result = supervisor.start(node.id, &StartOptions::default()).await;
    assert!(matches!(
        result,
        Err(SupervisorError::NoBackend(NodeType::Container))
    ));
    assert_eq!(
        supervisor.get_node(node.id).await.unwrap().status,
        NodeStatus::Stopped
    );
}
