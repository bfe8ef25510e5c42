// ABOUTME: Error types shared by the process and container backends
// ABOUTME: Every backend failure carries the underlying tool's error text

use thiserror::Error;

/// Error type for backend operations
#[derive(Error, Debug)]
pub enum BackendError {
    /// Executable or container runtime could not be located or reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    /// External command exited with a nonzero status
    #[error("Command '{command}' failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command '{command}' timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    /// Subprocess exited before the launch grace period elapsed
    #[error("Node {prover_id} exited during startup with code {code:?}: {output}")]
    LaunchFailed {
        prover_id: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Node {0} is already running")]
    AlreadyRunning(String),

    #[error("Invalid prover id '{prover_id}': {reason}")]
    InvalidProverId { prover_id: String, reason: String },

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Failed to signal process {pid}: {error}")]
    Signal { pid: u32, error: String },

    /// Docker Engine API errors
    #[error("Docker error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;
