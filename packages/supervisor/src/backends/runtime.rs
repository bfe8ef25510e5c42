// ABOUTME: Container runtime access used by the container backend
// ABOUTME: Engine API calls go through bollard; builds and compose up/down go through the CLIs

use crate::command::run_checked;
use crate::config::ContainerConfig;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use bollard::container::{
    ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions, StatsOptions,
    StopContainerOptions,
};
use bollard::Docker;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Seconds the engine waits before killing a container on stop
const STOP_GRACE_SECS: i64 = 10;

/// Inspected state of a single container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub running: bool,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
}

/// One row of the container listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub image: String,
    pub command: String,
    pub created: Option<DateTime<Utc>>,
    pub status: String,
    pub state: String,
    pub ports: String,
    /// Primary name without the engine's leading slash
    pub name: String,
    pub names: Vec<String>,
}

impl ContainerSummary {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Point-in-time resource usage of a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_used_mb: u64,
    pub memory_limit_mb: u64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
}

/// Operations the container backend needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn runtime_version(&self) -> BackendResult<String>;

    async fn compose_version(&self) -> BackendResult<String>;

    /// Build `context` into an image tagged `tag`, returning the build output
    async fn build_image(&self, tag: &str, context: &Path) -> BackendResult<String>;

    async fn image_exists(&self, tag: &str) -> BackendResult<bool>;

    /// Bring the services of a definition file up in detached mode
    async fn compose_up(&self, definition: &Path) -> BackendResult<String>;

    async fn compose_down(&self, definition: &Path) -> BackendResult<String>;

    /// Inspect a container by name or id; `None` when it does not exist
    async fn inspect(&self, name: &str) -> BackendResult<Option<ContainerState>>;

    /// Every container in any state
    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>>;

    async fn stop_container(&self, id: &str) -> BackendResult<()>;

    async fn remove_container(&self, id: &str) -> BackendResult<()>;

    async fn logs(&self, name: &str, tail: usize) -> BackendResult<Vec<String>>;

    async fn stats(&self, id: &str) -> BackendResult<ResourceSnapshot>;
}

/// Docker-backed runtime
pub struct DockerRuntime {
    client: Docker,
    config: ContainerConfig,
}

impl DockerRuntime {
    /// Connect to the local engine. The connection is lazy; no request is made here.
    pub fn new(config: ContainerConfig) -> BackendResult<Self> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Docker, config: ContainerConfig) -> Self {
        Self { client, config }
    }

    fn compose_args(&self, definition: &Path, action: &[&str]) -> Vec<String> {
        let mut compose_args = self.config.compose.base_args.clone();
        compose_args.push("-f".to_string());
        compose_args.push(definition.to_string_lossy().to_string());
        compose_args.extend(action.iter().map(|a| a.to_string()));
        compose_args
    }
}

fn is_status(error: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|dt| dt.timestamp() > 0)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn runtime_version(&self) -> BackendResult<String> {
        probe_version(&self.config.docker_path, &[], self.config.command_timeout).await
    }

    async fn compose_version(&self) -> BackendResult<String> {
        probe_version(
            &self.config.compose.program,
            &self.config.compose.base_args,
            self.config.command_timeout,
        )
        .await
    }

    async fn build_image(&self, tag: &str, context: &Path) -> BackendResult<String> {
        info!("Building image {} from {:?}", tag, context);
        let build_args = vec![
            "build".to_string(),
            "-t".to_string(),
            tag.to_string(),
            context.to_string_lossy().to_string(),
        ];
        let output = run_checked(
            &self.config.docker_path,
            &build_args,
            None,
            self.config.build_timeout,
        )
        .await?;
        Ok(output.stdout)
    }

    async fn image_exists(&self, tag: &str) -> BackendResult<bool> {
        match self.client.inspect_image(tag).await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 404) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn compose_up(&self, definition: &Path) -> BackendResult<String> {
        let output = run_checked(
            &self.config.compose.program,
            &self.compose_args(definition, &["up", "-d"]),
            None,
            self.config.command_timeout,
        )
        .await?;
        // Compose reports progress on stderr
        Ok(format!("{}{}", output.stdout, output.stderr))
    }

    async fn compose_down(&self, definition: &Path) -> BackendResult<String> {
        let output = run_checked(
            &self.config.compose.program,
            &self.compose_args(definition, &["down"]),
            None,
            self.config.command_timeout,
        )
        .await?;
        Ok(format!("{}{}", output.stdout, output.stderr))
    }

    async fn inspect(&self, name: &str) -> BackendResult<Option<ContainerState>> {
        let inspect = match self.client.inspect_container(name, None).await {
            Ok(inspect) => inspect,
            Err(e) if is_status(&e, 404) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = inspect.state.as_ref();
        let status = state
            .and_then(|s| s.status.as_ref())
            .map(|s| s.as_ref().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Some(ContainerState {
            id: inspect.id.clone().unwrap_or_else(|| name.to_string()),
            name: inspect
                .name
                .clone()
                .unwrap_or_else(|| name.to_string())
                .trim_start_matches('/')
                .to_string(),
            image: inspect
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .or_else(|| inspect.image.clone()),
            running: state.and_then(|s| s.running).unwrap_or(false),
            status,
            started_at: state
                .and_then(|s| s.started_at.as_deref())
                .and_then(parse_timestamp),
        }))
    }

    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let names: Vec<String> = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .collect();
                let ports = c
                    .ports
                    .unwrap_or_default()
                    .iter()
                    .map(|p| match p.public_port {
                        Some(public) => format!(
                            "{}:{}->{}",
                            p.ip.clone().unwrap_or_default(),
                            public,
                            p.private_port
                        ),
                        None => p.private_port.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    image: c.image.unwrap_or_default(),
                    command: c.command.unwrap_or_default(),
                    created: c.created.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    status: c.status.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    ports,
                    name: names.first().cloned().unwrap_or_default(),
                    names,
                }
            })
            .collect())
    }

    async fn stop_container(&self, id: &str) -> BackendResult<()> {
        info!("Stopping container {}", id);
        match self
            .client
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if is_status(&e, 304) || is_status(&e, 404) => {
                debug!("Container {} was not running: {}", id, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, id: &str) -> BackendResult<()> {
        info!("Removing container {}", id);
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.client.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn logs(&self, name: &str, tail: usize) -> BackendResult<Vec<String>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let mut stream = self.client.logs(name, Some(options));
        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let message = match chunk? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => message,
                LogOutput::StdIn { .. } => continue,
            };
            lines.extend(
                String::from_utf8_lossy(&message)
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(str::to_string),
            );
        }
        Ok(lines)
    }

    async fn stats(&self, id: &str) -> BackendResult<ResourceSnapshot> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };

        let mut stream = self.client.stats(id, Some(options));
        let stats = match stream.next().await {
            Some(result) => result?,
            None => {
                warn!("Engine returned no stats for container {}", id);
                return Err(BackendError::Unavailable(format!(
                    "no stats reported for container {}",
                    id
                )));
            }
        };

        let cpu_delta = stats
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
        let system_delta = stats
            .cpu_stats
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
        let cpu_percent = if system_delta > 0 && cpu_delta > 0 {
            (cpu_delta as f64 / system_delta as f64)
                * 100.0
                * stats.cpu_stats.online_cpus.unwrap_or(1) as f64
        } else {
            0.0
        };

        let memory_used = stats.memory_stats.usage.unwrap_or(0);
        let memory_limit = stats.memory_stats.limit.unwrap_or(0);
        let memory_percent = if memory_limit > 0 {
            memory_used as f64 / memory_limit as f64 * 100.0
        } else {
            0.0
        };

        let (network_rx_bytes, network_tx_bytes) = stats
            .networks
            .as_ref()
            .map(|networks| {
                (
                    networks.values().map(|n| n.rx_bytes).sum::<u64>(),
                    networks.values().map(|n| n.tx_bytes).sum::<u64>(),
                )
            })
            .unwrap_or((0, 0));

        let (block_read_bytes, block_write_bytes) = stats
            .blkio_stats
            .io_service_bytes_recursive
            .as_ref()
            .map(|entries| {
                entries.iter().fold((0u64, 0u64), |(read, write), entry| {
                    match entry.op.to_lowercase().as_str() {
                        "read" => (read + entry.value, write),
                        "write" => (read, write + entry.value),
                        _ => (read, write),
                    }
                })
            })
            .unwrap_or((0, 0));

        Ok(ResourceSnapshot {
            cpu_percent,
            memory_used_mb: memory_used / (1024 * 1024),
            memory_limit_mb: memory_limit / (1024 * 1024),
            memory_percent,
            network_rx_bytes,
            network_tx_bytes,
            block_read_bytes,
            block_write_bytes,
        })
    }
}

async fn probe_version(
    program: &str,
    base_args: &[String],
    timeout: std::time::Duration,
) -> BackendResult<String> {
    let mut probe_args = base_args.to_vec();
    probe_args.push("--version".to_string());
    let output = run_checked(program, &probe_args, None, timeout).await?;
    Ok(output.stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComposeCommand;
    use std::path::PathBuf;

    #[test]
    fn test_parse_timestamp_rejects_zero_time() {
        assert!(parse_timestamp("0001-01-01T00:00:00Z").is_none());
        let parsed = parse_timestamp("2024-05-01T10:00:00.123456789Z").unwrap();
        assert_eq!(parsed.timestamp(), 1714557600);
    }

    #[test]
    fn test_compose_args_for_plugin_style_compose() {
        let config = ContainerConfig {
            compose: ComposeCommand::parse("docker compose"),
            ..Default::default()
        };
        let client = match Docker::connect_with_local_defaults() {
            Ok(client) => client,
            Err(_) => return,
        };
        let runtime = DockerRuntime::with_client(client, config);

        let compose_args =
            runtime.compose_args(&PathBuf::from("/data/docker-compose-p1.yml"), &["up", "-d"]);
        assert_eq!(
            compose_args,
            vec!["compose", "-f", "/data/docker-compose-p1.yml", "up", "-d"]
        );
    }

    #[test]
    fn test_summary_name_matching() {
        let summary = ContainerSummary {
            id: "abc".to_string(),
            image: "nexus-node-p1".to_string(),
            command: String::new(),
            created: None,
            status: "Up 5 minutes".to_string(),
            state: "running".to_string(),
            ports: String::new(),
            name: "nexus-node-p1".to_string(),
            names: vec!["nexus-node-p1".to_string()],
        };
        assert!(summary.has_name("nexus-node-p1"));
        assert!(!summary.has_name("nexus-node-p"));
        assert!(summary.is_running());
    }

    #[tokio::test]
    #[ignore = "requires a running Docker daemon"]
    async fn test_docker_runtime_lists_containers() {
        let runtime = DockerRuntime::new(ContainerConfig::default()).unwrap();
        assert!(runtime.runtime_version().await.is_ok());
        assert!(runtime.list_containers().await.is_ok());
    }
}
