// ABOUTME: Environment variable name constants and built-in defaults
// ABOUTME: Centralized definitions of every setting the supervisor reads from the environment

// Native CLI
pub const NEXUS_CLI_PATH: &str = "NEXUS_CLI_PATH";
pub const NEXUS_LAUNCH_GRACE_MS: &str = "NEXUS_LAUNCH_GRACE_MS";
pub const NEXUS_STOP_TIMEOUT_SECS: &str = "NEXUS_STOP_TIMEOUT_SECS";
pub const NEXUS_STRICT_PROCESS_TRACKING: &str = "NEXUS_STRICT_PROCESS_TRACKING";
pub const NEXUS_PROCESS_PATTERNS: &str = "NEXUS_PROCESS_PATTERNS";
pub const NEXUS_LOG_DIR: &str = "NEXUS_LOG_DIR";

// Container runtime
pub const DOCKER_PATH: &str = "DOCKER_PATH";
pub const DOCKER_COMPOSE_PATH: &str = "DOCKER_COMPOSE_PATH";
pub const NEXUS_DATA_DIR: &str = "NEXUS_DATA_DIR";
pub const NEXUS_REPO_URL: &str = "NEXUS_REPO_URL";
pub const NEXUS_CONTAINER_PREFIX: &str = "NEXUS_CONTAINER_PREFIX";
pub const NEXUS_BUILD_TIMEOUT_SECS: &str = "NEXUS_BUILD_TIMEOUT_SECS";

// Shared command bounds
pub const NEXUS_COMMAND_TIMEOUT_SECS: &str = "NEXUS_COMMAND_TIMEOUT_SECS";

// Supervisor
pub const NEXUS_READINESS_TIMEOUT_SECS: &str = "NEXUS_READINESS_TIMEOUT_SECS";
pub const NEXUS_EVENT_CHANNEL_SIZE: &str = "NEXUS_EVENT_CHANNEL_SIZE";

// Persistence and monitoring
pub const DB_PATH: &str = "DB_PATH";
pub const METRICS_UPDATE_INTERVAL: &str = "METRICS_UPDATE_INTERVAL"; // milliseconds
pub const PERFORMANCE_HISTORY_DAYS: &str = "PERFORMANCE_HISTORY_DAYS";

// Logging
pub const LOG_LEVEL: &str = "LOG_LEVEL";

// Defaults
pub const DEFAULT_CLI_PATH: &str = "nexus-cli";
pub const DEFAULT_DOCKER_PATH: &str = "docker";
pub const DEFAULT_COMPOSE_PATH: &str = "docker-compose";
pub const DEFAULT_DATA_DIR: &str = "./nexus-docker";
pub const DEFAULT_DB_PATH: &str = "./database/nexus-nodes.db";
pub const DEFAULT_REPO_URL: &str = "https://github.com/nexus-xyz/nexus-cli.git";
pub const DEFAULT_CONTAINER_PREFIX: &str = "nexus-node";
pub const DEFAULT_PROCESS_PATTERNS: &str = "nexus,prover";
