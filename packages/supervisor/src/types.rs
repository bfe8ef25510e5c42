// ABOUTME: Core type definitions for persisted node records, notifications and metrics
// ABOUTME: Also defines the serialized success/error envelope returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Execution strategy chosen for a node at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Native CLI subprocess
    Process,
    /// Docker container managed through compose
    Container,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Process => "process",
            NodeType::Container => "container",
        }
    }
}

impl FromStr for NodeType {
    type Err = String;

    /// Accepts the legacy `cli`/`docker` spellings used by older databases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "process" | "cli" => Ok(NodeType::Process),
            "container" | "docker" => Ok(NodeType::Container),
            other => Err(format!("unknown node type '{}'", other)),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Stopped => "stopped",
            NodeStatus::Starting => "starting",
            NodeStatus::Running => "running",
            NodeStatus::Error => "error",
        }
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(NodeStatus::Stopped),
            "starting" => Ok(NodeStatus::Starting),
            "running" => Ok(NodeStatus::Running),
            "error" => Ok(NodeStatus::Error),
            other => Err(format!("unknown node status '{}'", other)),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of a prover node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: i64,
    /// Externally supplied, unique correlation key shared by both backends
    pub prover_id: String,
    pub name: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// Start options stored with the node (log level, workers, CLI config)
    pub config: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Error text recorded by the most recent failed start
    pub errors: Option<String>,
    pub container_name: Option<String>,
    pub container_id: Option<String>,
}

/// Request to create a node record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub prover_id: String,
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub config: Option<JsonValue>,
}

/// Partial update applied to a node record.
///
/// Outer `None` leaves a column untouched. For nullable columns the inner
/// `Option` distinguishes "set to value" from "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub status: Option<NodeStatus>,
    pub config: Option<Option<JsonValue>>,
    pub last_seen: Option<Option<DateTime<Utc>>>,
    pub errors: Option<Option<String>>,
    pub container_name: Option<Option<String>>,
    pub container_id: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn status(status: NodeStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(NotificationKind::Success),
            "info" => Ok(NotificationKind::Info),
            "warning" => Ok(NotificationKind::Warning),
            "error" => Ok(NotificationKind::Error),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub node_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
}

/// One metrics sample as persisted in the history table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub nex_points: f64,
    pub tasks_completed: i64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub uptime: Option<String>,
    pub block_height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: i64,
    pub node_id: i64,
    #[serde(flatten)]
    pub sample: MetricSample,
    pub timestamp: DateTime<Utc>,
}

/// Structured `{success, data, error}` envelope handed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error<E: ToString>(error: E) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for OperationResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::error(e),
        }
    }
}
