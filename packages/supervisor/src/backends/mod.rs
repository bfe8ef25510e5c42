// ABOUTME: Backend abstraction for node lifecycle operations
// ABOUTME: Defines the NodeBackend trait plus the result types both backends return

pub mod compose;
pub mod container;
pub mod process;
pub mod runtime;

pub use container::ContainerBackend;
pub use process::ProcessBackend;
pub use runtime::{ContainerRuntime, ContainerState, ContainerSummary, DockerRuntime, ResourceSnapshot};

use crate::error::{BackendError, BackendResult};
use crate::types::NodeType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Options accepted by `start`; fields irrelevant to a backend are ignored by it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Container: do not build the image before bringing the container up
    pub skip_build: bool,
    /// Container: build the image even if it already exists
    pub rebuild: bool,
    /// Container: explicit container name instead of `<prefix>-<prover_id>`
    pub container_name: Option<String>,
    /// Process: configuration passed to the CLI as `--config <json>`
    pub config: Option<JsonValue>,
    /// Process: `--log-level`
    pub log_level: Option<String>,
    /// Process: `--workers`
    pub workers: Option<u32>,
}

impl StartOptions {
    /// Merge options persisted with a node under caller supplied overrides.
    ///
    /// Unknown keys in the stored JSON are ignored.
    pub fn from_stored(stored: Option<&JsonValue>, overrides: &StartOptions) -> Self {
        let mut merged = stored
            .and_then(|v| serde_json::from_value::<StartOptions>(v.clone()).ok())
            .unwrap_or_default();

        merged.skip_build = merged.skip_build || overrides.skip_build;
        merged.rebuild = merged.rebuild || overrides.rebuild;
        if overrides.container_name.is_some() {
            merged.container_name = overrides.container_name.clone();
        }
        if overrides.config.is_some() {
            merged.config = overrides.config.clone();
        }
        if overrides.log_level.is_some() {
            merged.log_level = overrides.log_level.clone();
        }
        if overrides.workers.is_some() {
            merged.workers = overrides.workers;
        }
        merged
    }
}

/// Result of a successful start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// How a stop request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    /// Tracked process exited after SIGTERM
    Graceful,
    /// Tracked process needed SIGKILL
    Forced,
    /// Tracked container brought down through compose
    ComposeDown,
    /// Untracked processes or containers found by scan and terminated
    Scan,
    /// Nothing matched; the node was not running
    AlreadyStopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub method: StopMethod,
    pub message: String,
}

impl StopOutcome {
    pub fn new(method: StopMethod, message: impl Into<String>) -> Self {
        Self {
            method,
            message: message.into(),
        }
    }
}

/// Live state observed from a backend, independent of the persisted status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedState {
    Running,
    Stopped,
    /// The underlying query failed; see `ObservedStatus::error`
    Unknown,
}

impl ObservedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedState::Running => "running",
            ObservedState::Stopped => "stopped",
            ObservedState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ObservedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Freshly observed node status. Never an error: query failures land in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedStatus {
    #[serde(rename = "status")]
    pub state: ObservedState,
    pub uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub tasks_completed: u64,
    pub nex_points: f64,
    /// Evidence the observation was based on (scan output, runtime state)
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ObservedStatus {
    pub fn new(state: ObservedState) -> Self {
        Self {
            state,
            uptime: None,
            pid: None,
            container_id: None,
            container_name: None,
            image: None,
            started_at: None,
            tasks_completed: 0,
            nex_points: 0.0,
            raw_output: None,
            error: None,
        }
    }

    pub fn stopped() -> Self {
        Self::new(ObservedState::Stopped)
    }

    pub fn unknown(error: impl Into<String>) -> Self {
        let mut status = Self::new(ObservedState::Unknown);
        status.error = Some(error.into());
        status
    }

    pub fn is_running(&self) -> bool {
        self.state == ObservedState::Running
    }
}

/// Metrics reported by either backend; absent fields were not available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub status: Option<ObservedState>,
    pub uptime: Option<String>,
    pub container_id: Option<String>,
    pub image: Option<String>,
    pub cpu_usage: Option<f64>,
    /// Memory usage in percent
    pub memory_usage: Option<f64>,
    pub memory_used_mb: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    /// Free-form network figure printed by the CLI
    pub network_usage: Option<String>,
    pub network_rx_bytes: Option<u64>,
    pub network_tx_bytes: Option<u64>,
    pub block_read_bytes: Option<u64>,
    pub block_write_bytes: Option<u64>,
    pub block_height: Option<u64>,
    pub tasks_completed: Option<u64>,
    pub nex_points: Option<f64>,
    pub raw_output: Option<String>,
    pub last_check: DateTime<Utc>,
}

impl NodeMetrics {
    pub fn empty() -> Self {
        Self {
            status: None,
            uptime: None,
            container_id: None,
            image: None,
            cpu_usage: None,
            memory_usage: None,
            memory_used_mb: None,
            memory_limit_mb: None,
            network_usage: None,
            network_rx_bytes: None,
            network_tx_bytes: None,
            block_read_bytes: None,
            block_write_bytes: None,
            block_height: None,
            tasks_completed: None,
            nex_points: None,
            raw_output: None,
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolVersion {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Result of probing a backend's external tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
    /// Individual tools probed (runtime and compose for containers)
    pub components: Vec<ToolVersion>,
}

impl Availability {
    pub fn from_components(components: Vec<ToolVersion>) -> Self {
        let available = !components.is_empty() && components.iter().all(|c| c.available);
        let version = components.first().and_then(|c| c.version.clone());
        let errors: Vec<String> = components
            .iter()
            .filter_map(|c| c.error.as_ref().map(|e| format!("{}: {}", c.name, e)))
            .collect();

        Self {
            available,
            version,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            components,
        }
    }
}

/// Tracked node as reported by a backend's running-handle table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedNode {
    pub prover_id: String,
    pub pid: Option<u32>,
    pub container_name: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Lifecycle contract implemented by each execution strategy.
///
/// Every backend owns its running-handle table keyed by prover id. Table
/// access must be safe for concurrent operations on different nodes.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Node type this backend serves
    fn node_type(&self) -> NodeType;

    /// Probe the external tools. Never fails; problems are reported in the result.
    async fn check_availability(&self) -> Availability;

    async fn start(&self, prover_id: &str, options: &StartOptions) -> BackendResult<StartOutcome>;

    /// Stop a node; finding nothing to stop is a success
    async fn stop(&self, prover_id: &str) -> BackendResult<StopOutcome>;

    async fn status(&self, prover_id: &str) -> ObservedStatus;

    async fn logs(&self, prover_id: &str, lines: usize) -> BackendResult<Vec<String>>;

    async fn metrics(&self, prover_id: &str) -> BackendResult<NodeMetrics>;

    /// Build the node's image; only meaningful for container backends
    async fn build_image(&self, prover_id: &str) -> BackendResult<String> {
        Err(BackendError::NotSupported(format!(
            "{} backend cannot build images for {}",
            self.node_type(),
            prover_id
        )))
    }

    /// Record the container name a node was last started under so lookups
    /// without a running handle can find it
    async fn remember_container_name(&self, _prover_id: &str, _container_name: &str) {}

    async fn is_tracked(&self, prover_id: &str) -> bool;

    async fn tracked(&self) -> Vec<TrackedNode>;

    /// Best-effort teardown of every tracked node; clears the table
    async fn cleanup(&self);
}

/// Render the time since `started_at` as `Xd Yh Zm`, dropping leading zero units
pub fn format_uptime(started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - started_at).num_minutes().max(0);
    let days = elapsed / (24 * 60);
    let hours = (elapsed % (24 * 60)) / 60;
    let minutes = elapsed % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Validate a prover id before it is embedded in arguments, file names or container names
///
/// Only alphanumeric characters, hyphens, and underscores are allowed.
pub fn validate_prover_id(prover_id: &str) -> BackendResult<()> {
    let invalid = |reason: &str| BackendError::InvalidProverId {
        prover_id: prover_id.to_string(),
        reason: reason.to_string(),
    };

    if prover_id.is_empty() {
        return Err(invalid("Prover ID cannot be empty"));
    }

    if prover_id.len() > 128 {
        return Err(invalid("Prover ID cannot be longer than 128 characters"));
    }

    if prover_id.contains("..") || prover_id.contains('/') || prover_id.contains('\\') {
        return Err(invalid(
            "Prover ID cannot contain path traversal sequences (.. / \\)",
        ));
    }

    if !prover_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "Prover ID can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }

    Ok(())
}
