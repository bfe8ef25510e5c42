// ABOUTME: Lifecycle supervisor for Nexus prover nodes run as CLI subprocesses or containers
// ABOUTME: Re-exports the backends, supervisor, persistence gateway, live updates and collector

pub mod backends;
pub mod command;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod events;
pub mod monitor;
pub mod parser;
pub mod store;
pub mod supervisor;
pub mod types;

pub use backends::{
    Availability, ContainerBackend, ContainerRuntime, DockerRuntime, NodeBackend, NodeMetrics,
    ObservedState, ObservedStatus, ProcessBackend, StartOptions, StartOutcome, StopMethod,
    StopOutcome, TrackedNode,
};
pub use config::{ContainerConfig, MonitorConfig, ProcessConfig, SupervisorConfig};
pub use error::{BackendError, BackendResult};
pub use events::{EventBus, LiveUpdate, LiveUpdateKind, NodeEventData, Subscription};
pub use monitor::{CollectionSummary, MetricsCollector};
pub use store::{NodeStore, SqliteNodeStore, StoreError, StoreResult};
pub use supervisor::{
    BackendAvailability, NodeStatusReport, NodeSupervisor, RebuildReport, RebuildStage,
    StartReport, StopReport, SupervisorError, SupervisorResult,
};
pub use types::{
    MetricRecord, MetricSample, NewNode, NewNotification, NodeRecord, NodeStatus, NodeType,
    NodeUpdate, Notification, NotificationKind, OperationResult,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
