// ABOUTME: Supervisor configuration assembled from environment variables
// ABOUTME: Groups settings for the process backend, container backend and metrics collector

use crate::constants::*;
use crate::env::{
    env_string_or, parse_env_flag, parse_env_or_default, parse_env_or_default_with_validation,
    split_list,
};
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity for the live-update broadcast channel
pub const DEFAULT_EVENT_CHANNEL_SIZE: usize = 200;

/// Settings for the native CLI backend
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub cli_path: String,
    /// Delay after spawning used only to surface immediate launch failures
    pub launch_grace: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,
    /// Bound on read-only CLI subcommands
    pub command_timeout: Duration,
    /// Disables the OS-wide process scan used when no handle is tracked
    pub strict_tracking: bool,
    /// Substrings matched against process names and command lines by the scan
    pub process_patterns: Vec<String>,
    /// When set, node stdout/stderr go to `<log_dir>/<prover_id>.log` instead of pipes
    pub log_dir: Option<PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            cli_path: DEFAULT_CLI_PATH.to_string(),
            launch_grace: Duration::from_millis(2000),
            stop_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
            strict_tracking: false,
            process_patterns: split_list(DEFAULT_PROCESS_PATTERNS),
            log_dir: None,
        }
    }
}

impl ProcessConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let patterns = split_list(&env_string_or(
            NEXUS_PROCESS_PATTERNS,
            DEFAULT_PROCESS_PATTERNS,
        ));

        Self {
            cli_path: env_string_or(NEXUS_CLI_PATH, DEFAULT_CLI_PATH),
            launch_grace: Duration::from_millis(parse_env_or_default_with_validation(
                NEXUS_LAUNCH_GRACE_MS,
                2000u64,
                |v| v <= 60_000,
            )),
            stop_timeout: Duration::from_secs(parse_env_or_default_with_validation(
                NEXUS_STOP_TIMEOUT_SECS,
                5u64,
                |v| (1..=300).contains(&v),
            )),
            command_timeout: command_timeout_from_env(),
            strict_tracking: parse_env_flag(NEXUS_STRICT_PROCESS_TRACKING, false),
            process_patterns: if patterns.is_empty() {
                defaults.process_patterns
            } else {
                patterns
            },
            log_dir: std::env::var(NEXUS_LOG_DIR)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// How the compose tool is invoked: a standalone binary or a runtime subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub base_args: Vec<String>,
}

impl ComposeCommand {
    /// Parse `docker-compose` or `docker compose` style values
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .unwrap_or_else(|| DEFAULT_COMPOSE_PATH.to_string());
        Self {
            program,
            base_args: parts.collect(),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.base_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Settings for the container backend
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub docker_path: String,
    pub compose: ComposeCommand,
    /// Holds per-node compose definitions and build contexts
    pub data_dir: PathBuf,
    pub repo_url: String,
    /// Prefix for container and image names, e.g. `nexus-node-<prover_id>`
    pub name_prefix: String,
    pub command_timeout: Duration,
    pub build_timeout: Duration,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            docker_path: DEFAULT_DOCKER_PATH.to_string(),
            compose: ComposeCommand::parse(DEFAULT_COMPOSE_PATH),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            repo_url: DEFAULT_REPO_URL.to_string(),
            name_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            command_timeout: Duration::from_secs(30),
            build_timeout: Duration::from_secs(1800),
        }
    }
}

impl ContainerConfig {
    pub fn from_env() -> Self {
        Self {
            docker_path: env_string_or(DOCKER_PATH, DEFAULT_DOCKER_PATH),
            compose: ComposeCommand::parse(&env_string_or(
                DOCKER_COMPOSE_PATH,
                DEFAULT_COMPOSE_PATH,
            )),
            data_dir: PathBuf::from(env_string_or(NEXUS_DATA_DIR, DEFAULT_DATA_DIR)),
            repo_url: env_string_or(NEXUS_REPO_URL, DEFAULT_REPO_URL),
            name_prefix: env_string_or(NEXUS_CONTAINER_PREFIX, DEFAULT_CONTAINER_PREFIX),
            command_timeout: command_timeout_from_env(),
            build_timeout: Duration::from_secs(parse_env_or_default_with_validation(
                NEXUS_BUILD_TIMEOUT_SECS,
                1800u64,
                |v| v >= 60,
            )),
        }
    }

    pub fn container_name(&self, prover_id: &str) -> String {
        format!("{}-{}", self.name_prefix, prover_id)
    }

    pub fn image_name(&self, prover_id: &str) -> String {
        format!("{}-{}", self.name_prefix, prover_id)
    }
}

/// Settings for the background metrics collector
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub history_days: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            history_days: 30,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_millis(parse_env_or_default_with_validation(
                METRICS_UPDATE_INTERVAL,
                30_000u64,
                |v| v >= 1000,
            )),
            history_days: parse_env_or_default_with_validation(
                PERFORMANCE_HISTORY_DAYS,
                30u32,
                |v| v >= 1,
            ),
        }
    }
}

/// Full supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub process: ProcessConfig,
    pub container: ContainerConfig,
    pub monitor: MonitorConfig,
    pub db_path: PathBuf,
    /// When set, a start is only reported successful once the backend observes the node running
    pub readiness_timeout: Option<Duration>,
    pub event_channel_size: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            process: ProcessConfig::default(),
            container: ContainerConfig::default(),
            monitor: MonitorConfig::default(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            readiness_timeout: None,
            event_channel_size: DEFAULT_EVENT_CHANNEL_SIZE,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let readiness_secs: u64 = parse_env_or_default(NEXUS_READINESS_TIMEOUT_SECS, 0);

        Self {
            process: ProcessConfig::from_env(),
            container: ContainerConfig::from_env(),
            monitor: MonitorConfig::from_env(),
            db_path: PathBuf::from(env_string_or(DB_PATH, DEFAULT_DB_PATH)),
            readiness_timeout: (readiness_secs > 0).then(|| Duration::from_secs(readiness_secs)),
            event_channel_size: parse_env_or_default_with_validation(
                NEXUS_EVENT_CHANNEL_SIZE,
                DEFAULT_EVENT_CHANNEL_SIZE,
                |v| (10..=10000).contains(&v),
            ),
        }
    }
}

fn command_timeout_from_env() -> Duration {
    Duration::from_secs(parse_env_or_default_with_validation(
        NEXUS_COMMAND_TIMEOUT_SECS,
        30u64,
        |v| (1..=3600).contains(&v),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_compose_command_parse() {
        let standalone = ComposeCommand::parse("docker-compose");
        assert_eq!(standalone.program, "docker-compose");
        assert!(standalone.base_args.is_empty());

        let plugin = ComposeCommand::parse("docker  compose");
        assert_eq!(plugin.program, "docker");
        assert_eq!(plugin.base_args, vec!["compose".to_string()]);
        assert_eq!(plugin.display(), "docker compose");
    }

    #[test]
    fn test_container_naming() {
        let config = ContainerConfig::default();
        assert_eq!(config.container_name("p1"), "nexus-node-p1");
        assert_eq!(config.image_name("p1"), "nexus-node-p1");
    }

    #[test]
    #[serial]
    fn test_supervisor_config_from_env() {
        std::env::set_var(NEXUS_CLI_PATH, "/opt/nexus/bin/nexus-network");
        std::env::set_var(DOCKER_COMPOSE_PATH, "docker compose");
        std::env::set_var(NEXUS_READINESS_TIMEOUT_SECS, "15");
        std::env::set_var(NEXUS_STRICT_PROCESS_TRACKING, "true");
        std::env::set_var(METRICS_UPDATE_INTERVAL, "10");

        let config = SupervisorConfig::from_env();
        assert_eq!(config.process.cli_path, "/opt/nexus/bin/nexus-network");
        assert!(config.process.strict_tracking);
        assert_eq!(config.container.compose.base_args, vec!["compose".to_string()]);
        assert_eq!(config.readiness_timeout, Some(Duration::from_secs(15)));
        // Below the 1s floor, so the default applies
        assert_eq!(config.monitor.interval, Duration::from_millis(30_000));

        for var in [
            NEXUS_CLI_PATH,
            DOCKER_COMPOSE_PATH,
            NEXUS_READINESS_TIMEOUT_SECS,
            NEXUS_STRICT_PROCESS_TRACKING,
            METRICS_UPDATE_INTERVAL,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        std::env::remove_var(NEXUS_READINESS_TIMEOUT_SECS);
        std::env::remove_var(NEXUS_PROCESS_PATTERNS);
        let config = SupervisorConfig::from_env();
        assert_eq!(config.readiness_timeout, None);
        assert_eq!(
            config.process.process_patterns,
            vec!["nexus".to_string(), "prover".to_string()]
        );
    }
}
