// ABOUTME: Background metrics collector for running nodes
// ABOUTME: Periodically samples metrics through the supervisor and prunes old history

use crate::config::MonitorConfig;
use crate::supervisor::NodeSupervisor;
use crate::types::NodeStatus;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Outcome of one collection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub sampled: usize,
    pub failed: usize,
    pub pruned: u64,
}

pub struct MetricsCollector {
    supervisor: Arc<NodeSupervisor>,
    config: MonitorConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsCollector {
    pub fn new(supervisor: Arc<NodeSupervisor>, config: MonitorConfig) -> Self {
        Self {
            supervisor,
            config,
            task: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Spawn the collection loop; calling it again while running does nothing
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let supervisor = self.supervisor.clone();
        let config = self.config.clone();

        *task = Some(tokio::spawn(async move {
            info!(
                "Metrics collector started (interval: {:?}, retention: {} days)",
                config.interval, config.history_days
            );

            loop {
                let summary = Self::collect_cycle(&supervisor, &config).await;
                debug!(
                    "Metrics cycle: {} sampled, {} failed, {} pruned",
                    summary.sampled, summary.failed, summary.pruned
                );

                time::sleep(config.interval).await;
            }
        }));
    }

    /// Abort the collection loop, including a cycle in progress
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            info!("Metrics collector stopped");
        }
    }

    /// Run a single cycle immediately
    pub async fn collect_once(&self) -> CollectionSummary {
        Self::collect_cycle(&self.supervisor, &self.config).await
    }

    async fn collect_cycle(supervisor: &NodeSupervisor, config: &MonitorConfig) -> CollectionSummary {
        let mut summary = CollectionSummary::default();

        match supervisor.list_nodes(Some(NodeStatus::Running)).await {
            Ok(nodes) => {
                for node in nodes {
                    match supervisor.metrics(node.id).await {
                        Ok(_) => summary.sampled += 1,
                        Err(e) => {
                            summary.failed += 1;
                            warn!("Failed to collect metrics for {}: {}", node.prover_id, e);
                        }
                    }
                }
            }
            Err(e) => error!("Failed to list running nodes: {}", e),
        }

        match supervisor
            .store()
            .clean_old_metrics(config.history_days)
            .await
        {
            Ok(pruned) => summary.pruned = pruned,
            Err(e) => error!("Failed to prune metrics history: {}", e),
        }

        summary
    }
}
