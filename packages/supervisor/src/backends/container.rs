// ABOUTME: Container backend running one compose-managed container per node
// ABOUTME: Generates definitions, builds images, and reconciles its running table with the runtime

use super::compose::{self, RuntimeDefinition};
use super::runtime::{ContainerRuntime, ContainerSummary, DockerRuntime};
use super::{
    format_uptime, validate_prover_id, Availability, NodeBackend, NodeMetrics, ObservedState,
    ObservedStatus, StartOptions, StartOutcome, StopMethod, StopOutcome, ToolVersion, TrackedNode,
};
use crate::config::ContainerConfig;
use crate::error::{BackendError, BackendResult};
use crate::types::NodeType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Running-table entry for a container the backend brought up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub container_name: String,
    pub definition_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

pub struct ContainerBackend {
    config: Arc<ContainerConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    running: Arc<RwLock<HashMap<String, ContainerHandle>>>,
    /// Container names persisted for nodes this instance may not be tracking
    known_names: Arc<RwLock<HashMap<String, String>>>,
}

impl ContainerBackend {
    pub fn new(config: ContainerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
            running: Arc::new(RwLock::new(HashMap::new())),
            known_names: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Backend talking to the local Docker engine
    pub fn with_docker(config: ContainerConfig) -> BackendResult<Self> {
        let runtime = DockerRuntime::new(config.clone())?;
        Ok(Self::new(config, Arc::new(runtime)))
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Write the node's compose definition, defaulting the container name to `<prefix>-<prover_id>`
    pub async fn create_runtime_definition(
        &self,
        prover_id: &str,
        container_name: Option<&str>,
    ) -> BackendResult<RuntimeDefinition> {
        validate_prover_id(prover_id)?;
        let container_name = container_name
            .map(str::to_string)
            .unwrap_or_else(|| self.config.container_name(prover_id));
        compose::write_definition(
            &self.config.data_dir,
            prover_id,
            &container_name,
            &self.config.image_name(prover_id),
        )
        .await
    }

    /// Every container known to the runtime, in any state
    pub async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        self.runtime.list_containers().await
    }

    pub async fn handle(&self, prover_id: &str) -> Option<ContainerHandle> {
        self.running.read().await.get(prover_id).cloned()
    }

    async fn resolved_name(&self, prover_id: &str) -> String {
        if let Some(handle) = self.handle(prover_id).await {
            return handle.container_name;
        }
        match self.known_names.read().await.get(prover_id) {
            Some(name) => name.clone(),
            None => self.config.container_name(prover_id),
        }
    }

    /// Names an untracked node's container may carry, the remembered one first
    async fn candidate_names(&self, prover_id: &str) -> Vec<String> {
        let default = self.config.container_name(prover_id);
        let mut names = Vec::with_capacity(2);
        if let Some(known) = self.known_names.read().await.get(prover_id) {
            if *known != default {
                names.push(known.clone());
            }
        }
        names.push(default);
        names
    }

    /// Decide whether `start` has to build: `rebuild` always does, `skip_build` never does,
    /// otherwise only a missing image is built
    async fn needs_build(&self, prover_id: &str, options: &StartOptions) -> BackendResult<bool> {
        if options.rebuild {
            return Ok(true);
        }
        if options.skip_build {
            return Ok(false);
        }
        let exists = self
            .runtime
            .image_exists(&self.config.image_name(prover_id))
            .await?;
        Ok(!exists)
    }

    /// First container carrying one of `names`, in the order given
    async fn find_container(&self, names: &[String]) -> BackendResult<Option<ContainerSummary>> {
        let containers = self.runtime.list_containers().await?;
        Ok(names
            .iter()
            .find_map(|name| containers.iter().find(|c| c.has_name(name)).cloned()))
    }

    async fn scan_status(&self, prover_id: &str, names: &[String]) -> ObservedStatus {
        match self.find_container(names).await {
            Ok(Some(container)) => {
                let running = container.is_running();
                let mut status = ObservedStatus::new(if running {
                    ObservedState::Running
                } else {
                    ObservedState::Stopped
                });
                status.uptime = Some(match (running, container.created) {
                    (true, Some(created)) => format_uptime(created, Utc::now()),
                    _ => "0".to_string(),
                });
                status.container_id = Some(container.id.clone());
                status.container_name = Some(container.name.clone());
                status.image = Some(container.image.clone());
                status.raw_output = Some(container.status.clone());
                status
            }
            Ok(None) => {
                let mut status = ObservedStatus::stopped();
                status.uptime = Some("0".to_string());
                status.raw_output = Some("Container not found".to_string());
                status
            }
            Err(e) => {
                error!("Failed to list containers for node {}: {}", prover_id, e);
                ObservedStatus::unknown(e.to_string())
            }
        }
    }
}

fn tool_version(name: String, probe: BackendResult<String>) -> ToolVersion {
    match probe {
        Ok(version) => ToolVersion {
            name,
            available: true,
            version: Some(version),
            error: None,
        },
        Err(e) => ToolVersion {
            name,
            available: false,
            version: None,
            error: Some(e.to_string()),
        },
    }
}

#[async_trait]
impl NodeBackend for ContainerBackend {
    fn node_type(&self) -> NodeType {
        NodeType::Container
    }

    async fn check_availability(&self) -> Availability {
        let runtime = tool_version(
            self.config.docker_path.clone(),
            self.runtime.runtime_version().await,
        );
        let compose = tool_version(
            self.config.compose.display(),
            self.runtime.compose_version().await,
        );
        Availability::from_components(vec![runtime, compose])
    }

    async fn start(&self, prover_id: &str, options: &StartOptions) -> BackendResult<StartOutcome> {
        validate_prover_id(prover_id)?;
        info!("Starting container node {}", prover_id);

        tokio::fs::create_dir_all(&self.config.data_dir).await?;

        let definition = self
            .create_runtime_definition(prover_id, options.container_name.as_deref())
            .await?;

        if self.needs_build(prover_id, options).await? {
            self.build_image(prover_id).await?;
        } else {
            debug!("Skipping image build for node {}", prover_id);
        }

        let output = self.runtime.compose_up(&definition.path).await?;
        debug!("compose up for node {}: {}", prover_id, output.trim());

        let state = match self.runtime.inspect(&definition.container_name).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Container {} started but could not be inspected: {}",
                    definition.container_name, e
                );
                None
            }
        };

        let started_at = state
            .as_ref()
            .and_then(|s| s.started_at)
            .unwrap_or_else(Utc::now);
        self.running.write().await.insert(
            prover_id.to_string(),
            ContainerHandle {
                container_name: definition.container_name.clone(),
                definition_path: definition.path.clone(),
                started_at,
            },
        );

        info!(
            "Container node {} is up as {}",
            prover_id, definition.container_name
        );
        Ok(StartOutcome {
            pid: None,
            container_name: Some(definition.container_name),
            container_id: state.as_ref().map(|s| s.id.clone()),
            status: state.map(|s| s.status),
        })
    }

    async fn stop(&self, prover_id: &str) -> BackendResult<StopOutcome> {
        validate_prover_id(prover_id)?;
        info!("Stopping container node {}", prover_id);

        // The table entry goes away whatever the outcome of the stop attempt
        let handle = self.running.write().await.remove(prover_id);
        let names = self.candidate_names(prover_id).await;
        self.known_names.write().await.remove(prover_id);

        if let Some(handle) = handle {
            self.runtime.compose_down(&handle.definition_path).await?;
            return Ok(StopOutcome::new(
                StopMethod::ComposeDown,
                "Docker node stopped successfully",
            ));
        }

        match self.find_container(&names).await? {
            Some(container) => {
                self.runtime.stop_container(&container.id).await?;
                self.runtime.remove_container(&container.id).await?;
                Ok(StopOutcome::new(
                    StopMethod::Scan,
                    format!("Stopped and removed container {}", container.name),
                ))
            }
            None => Ok(StopOutcome::new(
                StopMethod::AlreadyStopped,
                format!("No container found for node {}", prover_id),
            )),
        }
    }

    async fn status(&self, prover_id: &str) -> ObservedStatus {
        if let Some(handle) = self.handle(prover_id).await {
            match self.runtime.inspect(&handle.container_name).await {
                Ok(Some(state)) if state.running => {
                    let started_at = state.started_at.unwrap_or(handle.started_at);
                    let mut status = ObservedStatus::new(ObservedState::Running);
                    status.uptime = Some(format_uptime(started_at, Utc::now()));
                    status.started_at = Some(started_at);
                    status.container_id = Some(state.id.clone());
                    status.container_name = Some(state.name.clone());
                    status.image = state.image.clone();
                    status.raw_output = Some(state.status);
                    return status;
                }
                Ok(_) => {
                    info!(
                        "Tracked container {} for node {} is no longer running",
                        handle.container_name, prover_id
                    );
                    self.running.write().await.remove(prover_id);
                }
                Err(e) => {
                    warn!(
                        "Failed to inspect container {}: {}",
                        handle.container_name, e
                    );
                }
            }
            return self
                .scan_status(prover_id, &[handle.container_name])
                .await;
        }

        let names = self.candidate_names(prover_id).await;
        self.scan_status(prover_id, &names).await
    }

    async fn logs(&self, prover_id: &str, lines: usize) -> BackendResult<Vec<String>> {
        validate_prover_id(prover_id)?;
        let name = self.resolved_name(prover_id).await;
        self.runtime.logs(&name, lines).await
    }

    async fn metrics(&self, prover_id: &str) -> BackendResult<NodeMetrics> {
        let observed = self.status(prover_id).await;
        if let Some(error) = observed.error {
            return Err(BackendError::Unavailable(error));
        }

        let mut metrics = NodeMetrics::empty();
        metrics.status = Some(observed.state);
        metrics.uptime = observed.uptime;
        metrics.container_id = observed.container_id.clone();
        metrics.image = observed.image;

        if observed.state == ObservedState::Running {
            if let Some(container_id) = &observed.container_id {
                match self.runtime.stats(container_id).await {
                    Ok(snapshot) => {
                        metrics.cpu_usage = Some(snapshot.cpu_percent);
                        metrics.memory_usage = Some(snapshot.memory_percent);
                        metrics.memory_used_mb = Some(snapshot.memory_used_mb);
                        metrics.memory_limit_mb = Some(snapshot.memory_limit_mb);
                        metrics.network_rx_bytes = Some(snapshot.network_rx_bytes);
                        metrics.network_tx_bytes = Some(snapshot.network_tx_bytes);
                        metrics.block_read_bytes = Some(snapshot.block_read_bytes);
                        metrics.block_write_bytes = Some(snapshot.block_write_bytes);
                    }
                    Err(e) => {
                        warn!(
                            "Could not get container stats for node {}: {}",
                            prover_id, e
                        );
                    }
                }
            }
        }

        Ok(metrics)
    }

    async fn build_image(&self, prover_id: &str) -> BackendResult<String> {
        validate_prover_id(prover_id)?;
        let image_name = self.config.image_name(prover_id);
        info!("Building image {} for node {}", image_name, prover_id);

        let context =
            compose::write_build_context(&self.config.data_dir, &self.config.repo_url, prover_id)
                .await?;
        match self.runtime.build_image(&image_name, &context).await {
            Ok(_) => {
                info!("Built image {}", image_name);
                Ok(image_name)
            }
            Err(e) => {
                error!("Failed to build image for node {}: {}", prover_id, e);
                Err(e)
            }
        }
    }

    async fn remember_container_name(&self, prover_id: &str, container_name: &str) {
        self.known_names
            .write()
            .await
            .insert(prover_id.to_string(), container_name.to_string());
    }

    async fn is_tracked(&self, prover_id: &str) -> bool {
        self.running.read().await.contains_key(prover_id)
    }

    async fn tracked(&self) -> Vec<TrackedNode> {
        let mut nodes: Vec<TrackedNode> = self
            .running
            .read()
            .await
            .iter()
            .map(|(prover_id, handle)| TrackedNode {
                prover_id: prover_id.clone(),
                pid: None,
                container_name: Some(handle.container_name.clone()),
                started_at: handle.started_at,
            })
            .collect();
        nodes.sort_by(|a, b| a.prover_id.cmp(&b.prover_id));
        nodes
    }

    async fn cleanup(&self) {
        let handles: Vec<(String, ContainerHandle)> =
            self.running.write().await.drain().collect();
        for (prover_id, handle) in handles {
            info!("Bringing down container node {} on shutdown", prover_id);
            if let Err(e) = self.runtime.compose_down(&handle.definition_path).await {
                warn!("Failed to stop container node {}: {}", prover_id, e);
            }
        }
    }
}
