// ABOUTME: Node supervisor dispatching lifecycle operations to the backend of each node's type
// ABOUTME: Owns the persisted status state machine, per-node serialization, notifications and live updates

use crate::backends::{
    validate_prover_id, Availability, NodeBackend, NodeMetrics, ObservedState, ObservedStatus,
    StartOptions, StartOutcome, StopOutcome,
};
use crate::error::BackendError;
use crate::events::{EventBus, LiveUpdate, LiveUpdateKind, NodeEventData, Subscription};
use crate::store::{NodeStore, StoreError};
use crate::types::{
    MetricRecord, MetricSample, NewNode, NewNotification, NodeRecord, NodeStatus, NodeType,
    NodeUpdate, Notification, NotificationKind,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Step of a container rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildStage {
    Stopping,
    Building,
    Starting,
    Completed,
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebuildStage::Stopping => "stopping",
            RebuildStage::Building => "building",
            RebuildStage::Starting => "starting",
            RebuildStage::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Node {prover_id} is already running")]
    AlreadyRunning { prover_id: String },

    #[error("Node {prover_id} is already stopped")]
    AlreadyStopped { prover_id: String },

    #[error("A node with prover id '{0}' already exists")]
    DuplicateProverId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No backend registered for {0} nodes")]
    NoBackend(NodeType),

    #[error("Node {prover_id}: {source}")]
    Backend {
        prover_id: String,
        #[source]
        source: BackendError,
    },

    /// A rebuild step failed; earlier steps are not rolled back
    #[error("Rebuild failed while {stage} (completed: {completed:?}): {message}")]
    Rebuild {
        stage: RebuildStage,
        completed: Vec<RebuildStage>,
        message: String,
    },

    #[error("Node {prover_id} did not report running within {seconds} seconds")]
    NotReady { prover_id: String, seconds: u64 },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartReport {
    pub node: NodeRecord,
    #[serde(flatten)]
    pub outcome: StartOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReport {
    pub node: NodeRecord,
    #[serde(flatten)]
    pub outcome: StopOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub node: NodeRecord,
    pub image: String,
    pub outcome: StartOutcome,
    pub stages: Vec<RebuildStage>,
}

/// Persisted and freshly observed status side by side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub id: i64,
    pub prover_id: String,
    pub node_type: NodeType,
    pub persisted: NodeStatus,
    pub observed: ObservedStatus,
    /// Persisted and observed state disagree about whether the node runs
    pub diverged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendAvailability {
    pub node_type: NodeType,
    #[serde(flatten)]
    pub availability: Availability,
}

fn diverged(persisted: NodeStatus, observed: ObservedState) -> bool {
    match observed {
        ObservedState::Unknown => false,
        ObservedState::Running => persisted != NodeStatus::Running,
        ObservedState::Stopped => persisted == NodeStatus::Running,
    }
}

fn metric_sample(metrics: &NodeMetrics) -> MetricSample {
    MetricSample {
        nex_points: metrics.nex_points.unwrap_or(0.0),
        tasks_completed: metrics.tasks_completed.map(|v| v as i64).unwrap_or(0),
        cpu_usage: metrics.cpu_usage.unwrap_or(0.0),
        memory_usage: metrics.memory_usage.unwrap_or(0.0),
        uptime: metrics.uptime.clone(),
        block_height: metrics.block_height.map(|v| v as i64).unwrap_or(0),
    }
}

/// Single entry point for node lifecycle operations
pub struct NodeSupervisor {
    store: Arc<dyn NodeStore>,
    backends: HashMap<NodeType, Arc<dyn NodeBackend>>,
    events: EventBus,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    readiness_timeout: Option<Duration>,
}

impl NodeSupervisor {
    pub fn new(store: Arc<dyn NodeStore>, events: EventBus) -> Self {
        Self {
            store,
            backends: HashMap::new(),
            events,
            locks: Mutex::new(HashMap::new()),
            readiness_timeout: None,
        }
    }

    /// Require backends to observe a started node running before the start counts
    pub fn with_readiness_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.readiness_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Register the backend for its node type, replacing any previous one
    pub fn register_backend(&mut self, backend: Arc<dyn NodeBackend>) {
        let node_type = backend.node_type();
        info!("Registered {} backend", node_type);
        self.backends.insert(node_type, backend);
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self, filter: impl IntoIterator<Item = LiveUpdateKind>) -> Subscription {
        self.events.subscribe(filter)
    }

    fn backend_for(&self, node_type: NodeType) -> SupervisorResult<Arc<dyn NodeBackend>> {
        self.backends
            .get(&node_type)
            .cloned()
            .ok_or(SupervisorError::NoBackend(node_type))
    }

    /// Backend for a stored node, told the container name persisted for it
    async fn backend_for_node(&self, node: &NodeRecord) -> SupervisorResult<Arc<dyn NodeBackend>> {
        let backend = self.backend_for(node.node_type)?;
        if let Some(name) = &node.container_name {
            backend
                .remember_container_name(&node.prover_id, name)
                .await;
        }
        Ok(backend)
    }

    async fn node_lock(&self, prover_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(prover_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the per-prover lock entry unless another caller still holds a clone of it
    async fn release_lock(&self, prover_id: &str, held: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let unshared = locks
            .get(prover_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, held) && Arc::strong_count(held) == 2);
        if unshared {
            locks.remove(prover_id);
        }
    }

    async fn load(&self, id: i64) -> SupervisorResult<NodeRecord> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    async fn notify(&self, node_id: i64, kind: NotificationKind, title: &str, message: String) {
        let notification = NewNotification {
            kind,
            title: title.to_string(),
            message,
        };
        if let Err(e) = self.store.add_notification(Some(node_id), &notification).await {
            warn!("Failed to record notification '{}' for node {}: {}", title, node_id, e);
        }
    }

    fn emit(&self, kind: LiveUpdateKind, data: NodeEventData) {
        self.events.emit(LiveUpdate::new(kind, data));
    }

    pub async fn get_node(&self, id: i64) -> SupervisorResult<NodeRecord> {
        self.load(id).await
    }

    pub async fn list_nodes(&self, status: Option<NodeStatus>) -> SupervisorResult<Vec<NodeRecord>> {
        Ok(self.store.list_nodes(status).await?)
    }

    pub async fn notifications(
        &self,
        node_id: Option<i64>,
        limit: i64,
    ) -> SupervisorResult<Vec<Notification>> {
        Ok(self.store.list_notifications(node_id, limit).await?)
    }

    pub async fn metrics_history(&self, id: i64, limit: i64) -> SupervisorResult<Vec<MetricRecord>> {
        Ok(self.store.list_metrics(id, limit).await?)
    }

    /// Create a node record with status `stopped`
    pub async fn create_node(&self, request: NewNode) -> SupervisorResult<NodeRecord> {
        validate_prover_id(&request.prover_id)
            .map_err(|e| SupervisorError::InvalidRequest(e.to_string()))?;
        if request.name.trim().is_empty() {
            return Err(SupervisorError::InvalidRequest(
                "Node name cannot be empty".to_string(),
            ));
        }
        if self
            .store
            .get_node_by_prover_id(&request.prover_id)
            .await?
            .is_some()
        {
            return Err(SupervisorError::DuplicateProverId(request.prover_id));
        }

        let node = self.store.create_node(&request).await?;
        info!(
            "Created {} node {} ({})",
            node.node_type, node.id, node.prover_id
        );
        self.emit(
            LiveUpdateKind::NodeCreated,
            NodeEventData::new(node.id, node.prover_id.clone()),
        );
        Ok(node)
    }

    /// Delete a node, stopping it first when it is running or tracked
    pub async fn delete_node(&self, id: i64) -> SupervisorResult<()> {
        let node = self.load(id).await?;
        let lock = self.node_lock(&node.prover_id).await;
        let _guard = lock.lock().await;

        if let Some(backend) = self.backends.get(&node.node_type) {
            if let Some(name) = &node.container_name {
                backend
                    .remember_container_name(&node.prover_id, name)
                    .await;
            }
            if node.status == NodeStatus::Running || backend.is_tracked(&node.prover_id).await {
                info!("Stopping node {} before deletion", node.prover_id);
                backend
                    .stop(&node.prover_id)
                    .await
                    .map_err(|source| SupervisorError::Backend {
                        prover_id: node.prover_id.clone(),
                        source,
                    })?;
            }
        }

        self.store.delete_node(id).await?;
        self.release_lock(&node.prover_id, &lock).await;
        info!("Deleted node {} ({})", id, node.prover_id);
        self.emit(
            LiveUpdateKind::NodeDeleted,
            NodeEventData::new(id, node.prover_id),
        );
        Ok(())
    }

    /// Start a node: `stopped|error -> starting -> running|error`
    pub async fn start(&self, id: i64, overrides: &StartOptions) -> SupervisorResult<StartReport> {
        let node = self.load(id).await?;
        let lock = self.node_lock(&node.prover_id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock so a concurrent transition is observed
        let node = self.load(id).await?;
        self.start_locked(node, overrides).await
    }

    async fn start_locked(
        &self,
        node: NodeRecord,
        overrides: &StartOptions,
    ) -> SupervisorResult<StartReport> {
        if node.status == NodeStatus::Running {
            return Err(SupervisorError::AlreadyRunning {
                prover_id: node.prover_id,
            });
        }
        let backend = self.backend_for_node(&node).await?;
        let options = StartOptions::from_stored(node.config.as_ref(), overrides);

        self.store
            .update_node(node.id, &NodeUpdate::status(NodeStatus::Starting))
            .await?;
        info!("Starting {} node {}", node.node_type, node.prover_id);

        let outcome = match backend.start(&node.prover_id, &options).await {
            Ok(outcome) => outcome,
            Err(BackendError::AlreadyRunning(_)) => {
                // The backend still tracks a live handle; the persisted status was stale
                self.store
                    .update_node(
                        node.id,
                        &NodeUpdate {
                            status: Some(NodeStatus::Running),
                            last_seen: Some(Some(Utc::now())),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Err(SupervisorError::AlreadyRunning {
                    prover_id: node.prover_id,
                });
            }
            Err(e) => {
                error!("Failed to start node {}: {}", node.prover_id, e);
                self.mark_failed(node.id, e.to_string()).await?;
                return Err(SupervisorError::Backend {
                    prover_id: node.prover_id,
                    source: e,
                });
            }
        };

        if let Some(limit) = self.readiness_timeout {
            if !self.wait_until_running(backend.as_ref(), &node.prover_id, limit).await {
                warn!(
                    "Node {} not observed running after {:?}, tearing it down",
                    node.prover_id, limit
                );
                if let Err(e) = backend.stop(&node.prover_id).await {
                    warn!("Failed to stop unready node {}: {}", node.prover_id, e);
                }
                let err = SupervisorError::NotReady {
                    prover_id: node.prover_id.clone(),
                    seconds: limit.as_secs(),
                };
                self.mark_failed(node.id, err.to_string()).await?;
                return Err(err);
            }
        }

        let is_container = node.node_type == NodeType::Container;
        let mut update = NodeUpdate {
            status: Some(NodeStatus::Running),
            last_seen: Some(Some(Utc::now())),
            errors: Some(None),
            ..Default::default()
        };
        if is_container {
            update.container_name = Some(outcome.container_name.clone());
            update.container_id = Some(outcome.container_id.clone());
        }
        self.store.update_node(node.id, &update).await?;
        let node = self.load(node.id).await?;

        info!("Node {} is running", node.prover_id);
        let (title, kind) = if is_container {
            ("Docker Node Started", LiveUpdateKind::DockerNodeStarted)
        } else {
            ("Node Started", LiveUpdateKind::NodeStarted)
        };
        self.notify(
            node.id,
            NotificationKind::Success,
            title,
            format!("Node {} started successfully", node.name),
        )
        .await;

        let mut data = NodeEventData::new(node.id, node.prover_id.clone());
        data.pid = outcome.pid;
        data.container_name = outcome.container_name.clone();
        data.container_id = outcome.container_id.clone();
        self.emit(kind, data);

        Ok(StartReport { node, outcome })
    }

    async fn mark_failed(&self, id: i64, message: String) -> SupervisorResult<()> {
        self.store
            .update_node(
                id,
                &NodeUpdate {
                    status: Some(NodeStatus::Error),
                    errors: Some(Some(message)),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn wait_until_running(
        &self,
        backend: &dyn NodeBackend,
        prover_id: &str,
        limit: Duration,
    ) -> bool {
        let poll = async {
            loop {
                if backend.status(prover_id).await.is_running() {
                    return;
                }
                tokio::time::sleep(READINESS_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(limit, poll).await.is_ok()
    }

    /// Stop a node. A backend failure leaves the persisted status untouched.
    pub async fn stop(&self, id: i64) -> SupervisorResult<StopReport> {
        let node = self.load(id).await?;
        let lock = self.node_lock(&node.prover_id).await;
        let _guard = lock.lock().await;

        let node = self.load(id).await?;
        self.stop_locked(node).await
    }

    async fn stop_locked(&self, node: NodeRecord) -> SupervisorResult<StopReport> {
        if node.status == NodeStatus::Stopped {
            return Err(SupervisorError::AlreadyStopped {
                prover_id: node.prover_id,
            });
        }
        let backend = self.backend_for_node(&node).await?;

        info!("Stopping {} node {}", node.node_type, node.prover_id);
        let outcome =
            backend
                .stop(&node.prover_id)
                .await
                .map_err(|source| SupervisorError::Backend {
                    prover_id: node.prover_id.clone(),
                    source,
                })?;

        self.store
            .update_node(
                node.id,
                &NodeUpdate {
                    status: Some(NodeStatus::Stopped),
                    last_seen: Some(Some(Utc::now())),
                    container_name: Some(None),
                    container_id: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        let stopped = self.load(node.id).await?;
        info!("Node {} stopped ({:?})", stopped.prover_id, outcome.method);

        let (title, kind) = if stopped.node_type == NodeType::Container {
            ("Docker Node Stopped", LiveUpdateKind::DockerNodeStopped)
        } else {
            ("Node Stopped", LiveUpdateKind::NodeStopped)
        };
        self.notify(
            stopped.id,
            NotificationKind::Info,
            title,
            format!("Node {} stopped", stopped.name),
        )
        .await;

        let mut data = NodeEventData::new(stopped.id, stopped.prover_id.clone());
        data.container_name = node.container_name.clone();
        data.container_id = node.container_id.clone();
        self.emit(kind, data);

        Ok(StopReport {
            node: stopped,
            outcome,
        })
    }

    /// Observe the node live through its backend
    pub async fn status(&self, id: i64) -> SupervisorResult<NodeStatusReport> {
        let node = self.load(id).await?;
        let backend = self.backend_for_node(&node).await?;
        let observed = backend.status(&node.prover_id).await;

        Ok(NodeStatusReport {
            id: node.id,
            prover_id: node.prover_id,
            node_type: node.node_type,
            persisted: node.status,
            diverged: diverged(node.status, observed.state),
            observed,
        })
    }

    pub async fn logs(&self, id: i64, lines: usize) -> SupervisorResult<Vec<String>> {
        let node = self.load(id).await?;
        let backend = self.backend_for_node(&node).await?;
        backend
            .logs(&node.prover_id, lines)
            .await
            .map_err(|source| SupervisorError::Backend {
                prover_id: node.prover_id,
                source,
            })
    }

    /// Collect metrics and record a history sample
    pub async fn metrics(&self, id: i64) -> SupervisorResult<NodeMetrics> {
        let node = self.load(id).await?;
        let backend = self.backend_for_node(&node).await?;
        let metrics =
            backend
                .metrics(&node.prover_id)
                .await
                .map_err(|source| SupervisorError::Backend {
                    prover_id: node.prover_id.clone(),
                    source,
                })?;

        if let Err(e) = self.store.add_metric(node.id, &metric_sample(&metrics)).await {
            warn!("Failed to record metrics for node {}: {}", node.prover_id, e);
        }
        Ok(metrics)
    }

    /// Stop, rebuild the image and start again without a second build.
    ///
    /// Completed steps are not rolled back; the error names the failed stage.
    pub async fn rebuild(&self, id: i64, overrides: &StartOptions) -> SupervisorResult<RebuildReport> {
        let node = self.load(id).await?;
        if node.node_type != NodeType::Container {
            return Err(SupervisorError::InvalidRequest(format!(
                "Rebuild is only available for container nodes, {} is a {} node",
                node.prover_id, node.node_type
            )));
        }
        let backend = self.backend_for_node(&node).await?;

        let lock = self.node_lock(&node.prover_id).await;
        let _guard = lock.lock().await;
        let mut node = self.load(id).await?;
        let mut completed = Vec::new();

        let failed = |stage: RebuildStage, completed: &[RebuildStage], message: String| {
            SupervisorError::Rebuild {
                stage,
                completed: completed.to_vec(),
                message,
            }
        };

        if node.status == NodeStatus::Running || backend.is_tracked(&node.prover_id).await {
            info!("Rebuild {}: stopping", node.prover_id);
            let stopped = if node.status == NodeStatus::Stopped {
                backend
                    .stop(&node.prover_id)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            } else {
                self.stop_locked(node.clone())
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            };
            if let Err(message) = stopped {
                return Err(failed(RebuildStage::Stopping, &completed, message));
            }
            node = self.load(id).await?;
        }
        completed.push(RebuildStage::Stopping);

        info!("Rebuild {}: building image", node.prover_id);
        let image = match backend.build_image(&node.prover_id).await {
            Ok(image) => image,
            Err(e) => {
                error!("Rebuild of {} failed to build: {}", node.prover_id, e);
                return Err(failed(RebuildStage::Building, &completed, e.to_string()));
            }
        };
        completed.push(RebuildStage::Building);

        info!("Rebuild {}: starting", node.prover_id);
        let start_options = StartOptions {
            skip_build: true,
            rebuild: false,
            ..overrides.clone()
        };
        let report = match self.start_locked(node, &start_options).await {
            Ok(report) => report,
            Err(e) => return Err(failed(RebuildStage::Starting, &completed, e.to_string())),
        };
        completed.push(RebuildStage::Starting);
        completed.push(RebuildStage::Completed);

        self.notify(
            report.node.id,
            NotificationKind::Info,
            "Node Rebuilt",
            format!("Node {} rebuilt with image {}", report.node.name, image),
        )
        .await;

        Ok(RebuildReport {
            node: report.node,
            image,
            outcome: report.outcome,
            stages: completed,
        })
    }

    pub async fn check_availability(&self) -> Vec<BackendAvailability> {
        let mut results = Vec::with_capacity(self.backends.len());
        for (node_type, backend) in &self.backends {
            results.push(BackendAvailability {
                node_type: *node_type,
                availability: backend.check_availability().await,
            });
        }
        results.sort_by_key(|r| r.node_type.as_str());
        results
    }

    /// Tear down every tracked node and mark the ones we know about stopped
    pub async fn shutdown(&self) {
        for (node_type, backend) in &self.backends {
            let tracked = backend.tracked().await;
            info!("Shutting down {} backend ({} tracked)", node_type, tracked.len());
            backend.cleanup().await;

            for entry in tracked {
                match self.store.get_node_by_prover_id(&entry.prover_id).await {
                    Ok(Some(node)) => {
                        let update = NodeUpdate {
                            status: Some(NodeStatus::Stopped),
                            last_seen: Some(Some(Utc::now())),
                            container_name: Some(None),
                            container_id: Some(None),
                            ..Default::default()
                        };
                        if let Err(e) = self.store.update_node(node.id, &update).await {
                            warn!("Failed to mark {} stopped: {}", entry.prover_id, e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Failed to look up {}: {}", entry.prover_id, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NodeStatus::Running, ObservedState::Running, false)]
    #[case(NodeStatus::Running, ObservedState::Stopped, true)]
    #[case(NodeStatus::Stopped, ObservedState::Running, true)]
    #[case(NodeStatus::Error, ObservedState::Stopped, false)]
    #[case(NodeStatus::Running, ObservedState::Unknown, false)]
    fn test_divergence(
        #[case] persisted: NodeStatus,
        #[case] observed: ObservedState,
        #[case] expected: bool,
    ) {
        assert_eq!(diverged(persisted, observed), expected);
    }

    #[test]
    fn test_metric_sample_defaults_missing_fields() {
        let mut metrics = NodeMetrics::empty();
        metrics.cpu_usage = Some(12.5);
        metrics.tasks_completed = Some(4);

        let sample = metric_sample(&metrics);
        assert_eq!(sample.cpu_usage, 12.5);
        assert_eq!(sample.tasks_completed, 4);
        assert_eq!(sample.nex_points, 0.0);
        assert_eq!(sample.block_height, 0);
    }

    #[test]
    fn test_rebuild_error_names_stage() {
        let err = SupervisorError::Rebuild {
            stage: RebuildStage::Building,
            completed: vec![RebuildStage::Stopping],
            message: "exit code 1".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("building"));
        assert!(text.contains("Stopping"));
    }

    async fn supervisor() -> NodeSupervisor {
        let store = crate::store::SqliteNodeStore::in_memory().await.unwrap();
        NodeSupervisor::new(Arc::new(store), EventBus::new(16))
    }

    fn process_node(prover_id: &str) -> NewNode {
        NewNode {
            prover_id: prover_id.to_string(),
            name: format!("node {}", prover_id),
            node_type: NodeType::Process,
            config: None,
        }
    }

    #[tokio::test]
    async fn test_delete_keeps_lock_shared_with_waiting_callers() {
        let supervisor = supervisor().await;
        let node = supervisor.create_node(process_node("p1")).await.unwrap();

        let waiting = supervisor.node_lock("p1").await;
        supervisor.delete_node(node.id).await.unwrap();

        supervisor.create_node(process_node("p1")).await.unwrap();
        let current = supervisor.node_lock("p1").await;
        assert!(Arc::ptr_eq(&waiting, &current));
    }

    #[tokio::test]
    async fn test_delete_releases_unused_lock() {
        let supervisor = supervisor().await;
        let node = supervisor.create_node(process_node("p1")).await.unwrap();

        supervisor.delete_node(node.id).await.unwrap();
        assert!(!supervisor.locks.lock().await.contains_key("p1"));
    }
}
