// ABOUTME: Shared fixtures for supervisor integration tests
// ABOUTME: Provides an in-memory container runtime and a shell script standing in for the node CLI

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use nexus_supervisor::backends::compose::ComposeDefinition;
use nexus_supervisor::backends::{ContainerRuntime, ContainerState, ContainerSummary, ResourceSnapshot};
use nexus_supervisor::{BackendError, BackendResult, ContainerConfig, ProcessConfig};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub images: HashSet<String>,
    pub containers: HashMap<String, FakeContainer>,
    pub builds: Vec<String>,
    pub compose_ups: Vec<PathBuf>,
    pub compose_downs: Vec<PathBuf>,
    pub stopped: Vec<String>,
    pub removed: Vec<String>,
    pub fail_build: bool,
    pub fail_compose_up: bool,
    pub fail_list: bool,
    pub fail_stats: bool,
    /// Containers created by compose up exit immediately
    pub start_stopped: bool,
}

/// Container runtime that keeps containers in memory and applies compose files it is given
#[derive(Debug, Default)]
pub struct FakeRuntime {
    pub state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Simulate a container started outside the backend
    pub fn add_container(&self, name: &str, running: bool) {
        self.with_state(|s| {
            s.containers.insert(
                name.to_string(),
                FakeContainer {
                    id: format!("id-{}", name),
                    name: name.to_string(),
                    image: "nexus-node-external".to_string(),
                    running,
                },
            );
        });
    }

    fn failed(command: &str) -> BackendError {
        BackendError::CommandFailed {
            command: command.to_string(),
            code: Some(1),
            stderr: format!("{} failed", command),
        }
    }
}

fn read_definition(path: &Path) -> BackendResult<ComposeDefinition> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn runtime_version(&self) -> BackendResult<String> {
        Ok("Docker version 27.0.0".to_string())
    }

    async fn compose_version(&self) -> BackendResult<String> {
        Err(BackendError::Unavailable("docker-compose not found".to_string()))
    }

    async fn build_image(&self, tag: &str, context: &Path) -> BackendResult<String> {
        assert!(context.join("Dockerfile").exists());
        self.with_state(|s| {
            s.builds.push(tag.to_string());
            if s.fail_build {
                return Err(Self::failed("docker build"));
            }
            s.images.insert(tag.to_string());
            Ok(format!("Successfully tagged {}", tag))
        })
    }

    async fn image_exists(&self, tag: &str) -> BackendResult<bool> {
        Ok(self.with_state(|s| s.images.contains(tag)))
    }

    async fn compose_up(&self, definition: &Path) -> BackendResult<String> {
        let parsed = read_definition(definition)?;
        self.with_state(|s| {
            s.compose_ups.push(definition.to_path_buf());
            if s.fail_compose_up {
                return Err(Self::failed("docker-compose up"));
            }
            for service in parsed.services.values() {
                s.containers.insert(
                    service.container_name.clone(),
                    FakeContainer {
                        id: format!("id-{}", service.container_name),
                        name: service.container_name.clone(),
                        image: service.image.clone(),
                        running: !s.start_stopped,
                    },
                );
            }
            Ok("Started".to_string())
        })
    }

    async fn compose_down(&self, definition: &Path) -> BackendResult<String> {
        let parsed = read_definition(definition)?;
        self.with_state(|s| {
            s.compose_downs.push(definition.to_path_buf());
            for service in parsed.services.values() {
                s.containers.remove(&service.container_name);
            }
            Ok("Removed".to_string())
        })
    }

    async fn inspect(&self, name: &str) -> BackendResult<Option<ContainerState>> {
        Ok(self.with_state(|s| {
            s.containers.get(name).map(|c| ContainerState {
                id: c.id.clone(),
                name: c.name.clone(),
                image: Some(c.image.clone()),
                running: c.running,
                status: if c.running { "running" } else { "exited" }.to_string(),
                started_at: Some(Utc::now() - chrono::Duration::minutes(45)),
            })
        }))
    }

    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        self.with_state(|s| {
            if s.fail_list {
                return Err(BackendError::Unavailable("engine unreachable".to_string()));
            }
            let mut containers: Vec<ContainerSummary> = s
                .containers
                .values()
                .map(|c| ContainerSummary {
                    id: c.id.clone(),
                    image: c.image.clone(),
                    command: "start".to_string(),
                    created: Some(Utc::now() - chrono::Duration::hours(1)),
                    status: if c.running { "Up 1 hour" } else { "Exited (0)" }.to_string(),
                    state: if c.running { "running" } else { "exited" }.to_string(),
                    ports: "0.0.0.0:49153->8080/tcp".to_string(),
                    name: c.name.clone(),
                    names: vec![c.name.clone()],
                })
                .collect();
            containers.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(containers)
        })
    }

    async fn stop_container(&self, id: &str) -> BackendResult<()> {
        self.with_state(|s| {
            s.stopped.push(id.to_string());
            if let Some(c) = s.containers.values_mut().find(|c| c.id == id) {
                c.running = false;
            }
        });
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> BackendResult<()> {
        self.with_state(|s| {
            s.removed.push(id.to_string());
            s.containers.retain(|_, c| c.id != id);
        });
        Ok(())
    }

    async fn logs(&self, name: &str, tail: usize) -> BackendResult<Vec<String>> {
        let lines: Vec<String> = (1..=5).map(|i| format!("{} line {}", name, i)).collect();
        let skip = lines.len().saturating_sub(tail);
        Ok(lines.into_iter().skip(skip).collect())
    }

    async fn stats(&self, _id: &str) -> BackendResult<ResourceSnapshot> {
        self.with_state(|s| {
            if s.fail_stats {
                return Err(BackendError::Unavailable("stats unavailable".to_string()));
            }
            Ok(ResourceSnapshot {
                cpu_percent: 25.0,
                memory_used_mb: 512,
                memory_limit_mb: 2048,
                memory_percent: 25.0,
                network_rx_bytes: 1000,
                network_tx_bytes: 2000,
                block_read_bytes: 300,
                block_write_bytes: 400,
            })
        })
    }
}

pub fn container_config(dir: &TempDir) -> ContainerConfig {
    ContainerConfig {
        data_dir: dir.path().join("nexus-docker"),
        ..ContainerConfig::default()
    }
}

/// Write an executable shell script that behaves like the node CLI
#[cfg(unix)]
pub fn fake_cli(dir: &TempDir, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("fake-nexus-cli");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

/// A CLI whose `start` keeps running until signalled
pub const LONG_RUNNING_CLI: &str = r#"case "$1" in
  --version) echo "nexus-cli 0.8.0" ;;
  start) echo "node $3 starting"; exec sleep 30 ;;
  status) printf 'Status: Running\nUptime: 1h 2m\nTasks: 3\nPoints: 42\n' ;;
  logs) printf 'first\n\nsecond\nthird\n' ;;
  node) printf 'CPU: 5%%\nMemory: 10%%\nBlock Height: 9\n' ;;
  *) exit 1 ;;
esac"#;

/// Scan patterns that cannot match anything on the host
pub fn unmatched_patterns() -> Vec<String> {
    vec![format!("no-such-process-{}", uuid::Uuid::new_v4())]
}

pub fn process_config(cli_path: String) -> ProcessConfig {
    ProcessConfig {
        cli_path,
        launch_grace: Duration::from_millis(300),
        stop_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_secs(5),
        strict_tracking: true,
        process_patterns: unmatched_patterns(),
        log_dir: None,
    }
}
