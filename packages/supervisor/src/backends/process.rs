// ABOUTME: Native CLI backend that runs one prover subprocess per node
// ABOUTME: Tracks live child handles, captures their output and falls back to an OS process scan

use super::{
    format_uptime, validate_prover_id, Availability, NodeBackend, NodeMetrics, ObservedState,
    ObservedStatus, StartOptions, StartOutcome, StopMethod, StopOutcome, ToolVersion, TrackedNode,
};
use crate::command::{args, describe, run_checked, run_command};
use crate::config::ProcessConfig;
use crate::error::{BackendError, BackendResult};
use crate::parser::{
    parse_info_output, parse_list_output, parse_log_lines, parse_metrics_output,
    parse_status_output, CliNodeEntry,
};
use crate::types::NodeType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

/// Lines of subprocess output retained per node
pub const MAX_CAPTURED_LINES: usize = 1000;

const LAUNCH_FAILURE_CONTEXT_LINES: usize = 20;
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How a node subprocess ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed by one
    pub signal: Option<i32>,
    pub exited_at: DateTime<Utc>,
}

/// A process found by the heuristic scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
}

#[derive(Clone)]
struct ProcessHandle {
    pid: u32,
    started_at: DateTime<Utc>,
    /// Distinguishes launches so a stale exit never removes a newer handle
    generation: u64,
    exit: watch::Receiver<Option<ExitRecord>>,
}

impl ProcessHandle {
    fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Graceful,
    Forced,
}

/// Runs prover nodes as subprocesses of the native CLI
#[derive(Clone)]
pub struct ProcessBackend {
    config: Arc<ProcessConfig>,
    handles: Arc<RwLock<HashMap<String, ProcessHandle>>>,
    output: Arc<RwLock<HashMap<String, VecDeque<String>>>>,
    last_exits: Arc<RwLock<HashMap<String, ExitRecord>>>,
    next_generation: Arc<AtomicU64>,
}

impl ProcessBackend {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config: Arc::new(config),
            handles: Arc::new(RwLock::new(HashMap::new())),
            output: Arc::new(RwLock::new(HashMap::new())),
            last_exits: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    fn start_args(&self, prover_id: &str, options: &StartOptions) -> BackendResult<Vec<String>> {
        let mut cli_args = args(["start", "--node-id", prover_id]);
        if let Some(config) = &options.config {
            cli_args.push("--config".to_string());
            cli_args.push(serde_json::to_string(config)?);
        }
        if let Some(level) = &options.log_level {
            cli_args.push("--log-level".to_string());
            cli_args.push(level.clone());
        }
        if let Some(workers) = options.workers {
            cli_args.push("--workers".to_string());
            cli_args.push(workers.to_string());
        }
        Ok(cli_args)
    }

    fn log_file_path(&self, prover_id: &str) -> Option<PathBuf> {
        self.config
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", prover_id)))
    }

    async fn open_log_file(&self, path: &Path) -> BackendResult<std::fs::File> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?)
    }

    /// Stream stdout/stderr into tracing and the per-node ring buffer
    fn capture_output(&self, prover_id: &str, child: &mut Child) {
        if let Some(stdout) = child.stdout.take() {
            let backend = self.clone();
            let id = prover_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(prover_id = %id, "{}", line);
                    backend.push_output(&id, line).await;
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let backend = self.clone();
            let id = prover_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(prover_id = %id, "{}", line);
                    backend.push_output(&id, line).await;
                }
            });
        }
    }

    async fn push_output(&self, prover_id: &str, line: String) {
        let mut output = self.output.write().await;
        let buffer = output.entry(prover_id.to_string()).or_default();
        if buffer.len() >= MAX_CAPTURED_LINES {
            buffer.pop_front();
        }
        buffer.push_back(line);
    }

    /// Reap the child, record how it ended and drop the handle if it is still ours
    fn spawn_exit_watcher(
        &self,
        prover_id: String,
        generation: u64,
        mut child: Child,
        exit_tx: watch::Sender<Option<ExitRecord>>,
    ) {
        let handles = self.handles.clone();
        let last_exits = self.last_exits.clone();

        tokio::spawn(async move {
            let record = match child.wait().await {
                Ok(status) => ExitRecord {
                    code: status.code(),
                    signal: exit_signal(&status),
                    exited_at: Utc::now(),
                },
                Err(e) => {
                    error!("Failed to wait on process for node {}: {}", prover_id, e);
                    ExitRecord {
                        code: None,
                        signal: None,
                        exited_at: Utc::now(),
                    }
                }
            };

            info!(
                "Node {} process exited (code: {:?}, signal: {:?})",
                prover_id, record.code, record.signal
            );

            {
                let mut table = handles.write().await;
                if table
                    .get(&prover_id)
                    .is_some_and(|handle| handle.generation == generation)
                {
                    table.remove(&prover_id);
                }
            }
            last_exits
                .write()
                .await
                .insert(prover_id.clone(), record.clone());
            let _ = exit_tx.send(Some(record));
        });
    }

    async fn remove_handle_if(&self, prover_id: &str, generation: u64) {
        let mut handles = self.handles.write().await;
        if handles
            .get(prover_id)
            .is_some_and(|handle| handle.generation == generation)
        {
            handles.remove(prover_id);
        }
    }

    async fn live_handle(&self, prover_id: &str) -> Option<ProcessHandle> {
        self.handles
            .read()
            .await
            .get(prover_id)
            .filter(|handle| !handle.has_exited())
            .cloned()
    }

    /// Most recent output lines of a node, from the log file or the in-memory buffer
    pub async fn captured_output(&self, prover_id: &str, lines: usize) -> Vec<String> {
        if let Some(path) = self.log_file_path(prover_id) {
            return match tokio::fs::read_to_string(&path).await {
                Ok(content) => tail(parse_log_lines(&content), lines),
                Err(e) => {
                    debug!("No log file for node {} at {:?}: {}", prover_id, path, e);
                    Vec::new()
                }
            };
        }

        self.output
            .read()
            .await
            .get(prover_id)
            .map(|buffer| {
                let skip = buffer.len().saturating_sub(lines);
                buffer.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// How the most recent subprocess for a node ended, if it has
    pub async fn last_exit(&self, prover_id: &str) -> Option<ExitRecord> {
        self.last_exits.read().await.get(prover_id).cloned()
    }

    /// Tracked subprocesses that have not exited
    pub async fn running_nodes(&self) -> Vec<TrackedNode> {
        self.tracked().await
    }

    /// Run the CLI's `info` subcommand
    pub async fn info(&self, prover_id: &str) -> BackendResult<BTreeMap<String, String>> {
        validate_prover_id(prover_id)?;
        let output = run_checked(
            &self.config.cli_path,
            &args(["info", "--node-id", prover_id]),
            None,
            self.config.command_timeout,
        )
        .await?;
        Ok(parse_info_output(&output.stdout))
    }

    /// Nodes known to the CLI itself, independent of what this backend tracks
    pub async fn list_nodes(&self) -> BackendResult<Vec<CliNodeEntry>> {
        let output = run_checked(
            &self.config.cli_path,
            &args(["list"]),
            None,
            self.config.command_timeout,
        )
        .await?;
        Ok(parse_list_output(&output.stdout))
    }

    /// Push a configuration document to the CLI for a node
    pub async fn update_config(
        &self,
        prover_id: &str,
        config: &serde_json::Value,
    ) -> BackendResult<String> {
        validate_prover_id(prover_id)?;
        let mut cli_args = args(["node", "config", "--prover-id", prover_id, "--config"]);
        cli_args.push(serde_json::to_string(config)?);

        let output = run_checked(
            &self.config.cli_path,
            &cli_args,
            None,
            self.config.command_timeout,
        )
        .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Processes whose name or command line matches a configured pattern.
    ///
    /// This process and its parent are never reported.
    pub fn scan_processes(&self) -> Vec<MatchedProcess> {
        use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessStatus, System, UpdateKind};

        let patterns: Vec<String> = self
            .config
            .process_patterns
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        if patterns.is_empty() {
            return Vec::new();
        }

        let mut system = System::new();
        // Command lines are only loaded when asked for
        system.refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));

        let own_pid = std::process::id();
        let parent_pid = system
            .process(SysPid::from_u32(own_pid))
            .and_then(|process| process.parent())
            .map(|pid| pid.as_u32());

        let mut matches: Vec<MatchedProcess> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let pid = pid.as_u32();
                if pid == own_pid || Some(pid) == parent_pid {
                    return None;
                }
                if process.status() == ProcessStatus::Zombie {
                    return None;
                }

                let name = process.name().to_string();
                let command = process.cmd().join(" ");
                let haystack = format!("{} {}", name, command).to_lowercase();

                patterns
                    .iter()
                    .any(|pattern| haystack.contains(pattern.as_str()))
                    .then_some(MatchedProcess { pid, name, command })
            })
            .collect();

        matches.sort_by_key(|m| m.pid);
        matches
    }

    async fn stop_tracked(
        &self,
        prover_id: &str,
        mut handle: ProcessHandle,
    ) -> BackendResult<StopOutcome> {
        if handle.has_exited() {
            return Ok(StopOutcome::new(
                StopMethod::AlreadyStopped,
                format!("Node {} process had already exited", prover_id),
            ));
        }

        info!("Stopping node {} (pid {})", prover_id, handle.pid);
        if !send_signal(handle.pid, Termination::Graceful, true)? {
            return Ok(StopOutcome::new(
                StopMethod::AlreadyStopped,
                format!("Node {} process had already exited", prover_id),
            ));
        }

        if wait_for_exit(&mut handle.exit, self.config.stop_timeout).await {
            info!("Node {} stopped gracefully", prover_id);
            return Ok(StopOutcome::new(
                StopMethod::Graceful,
                "Node stopped successfully",
            ));
        }

        warn!(
            "Node {} did not exit within {:?} after SIGTERM, sending SIGKILL",
            prover_id, self.config.stop_timeout
        );
        send_signal(handle.pid, Termination::Forced, true)?;

        if wait_for_exit(&mut handle.exit, KILL_CONFIRM_TIMEOUT).await {
            Ok(StopOutcome::new(StopMethod::Forced, "Node force stopped"))
        } else {
            error!("Node {} (pid {}) survived SIGKILL", prover_id, handle.pid);
            Err(BackendError::Signal {
                pid: handle.pid,
                error: "Process did not terminate even after SIGKILL".to_string(),
            })
        }
    }

    async fn stop_untracked(&self, prover_id: &str) -> BackendResult<StopOutcome> {
        if self.config.strict_tracking {
            debug!(
                "No tracked process for node {} and strict tracking is enabled",
                prover_id
            );
            return Ok(StopOutcome::new(
                StopMethod::AlreadyStopped,
                format!("Node {} is not running", prover_id),
            ));
        }

        let matches = self.scan_processes();
        if matches.is_empty() {
            info!("No process found for node {}, already stopped", prover_id);
            return Ok(StopOutcome::new(
                StopMethod::AlreadyStopped,
                format!("Node {} is not running", prover_id),
            ));
        }

        warn!(
            "No tracked process for node {}; terminating {} process(es) matching {:?}",
            prover_id,
            matches.len(),
            self.config.process_patterns
        );

        let mut failures = Vec::new();
        for matched in &matches {
            if let Err(e) = self.terminate_pid(matched.pid).await {
                warn!("Failed to terminate pid {}: {}", matched.pid, e);
                failures.push(e);
            }
        }

        let terminated = matches.len() - failures.len();
        if terminated == 0 {
            if let Some(first) = failures.into_iter().next() {
                return Err(first);
            }
        }

        Ok(StopOutcome::new(
            StopMethod::Scan,
            format!(
                "Terminated {} of {} matching process(es)",
                terminated,
                matches.len()
            ),
        ))
    }

    /// SIGTERM an untracked pid, escalating to SIGKILL after the stop timeout
    async fn terminate_pid(&self, pid: u32) -> BackendResult<()> {
        if !send_signal(pid, Termination::Graceful, false)? {
            return Ok(());
        }
        if wait_for_pid_exit(pid, self.config.stop_timeout).await {
            return Ok(());
        }

        warn!("Process {} did not respond to SIGTERM, sending SIGKILL", pid);
        if !send_signal(pid, Termination::Forced, false)? {
            return Ok(());
        }
        if wait_for_pid_exit(pid, KILL_CONFIRM_TIMEOUT).await {
            Ok(())
        } else {
            Err(BackendError::Signal {
                pid,
                error: "Process did not terminate even after SIGKILL".to_string(),
            })
        }
    }
}

#[async_trait]
impl NodeBackend for ProcessBackend {
    fn node_type(&self) -> NodeType {
        NodeType::Process
    }

    async fn check_availability(&self) -> Availability {
        let tool = match run_command(
            &self.config.cli_path,
            &args(["--version"]),
            None,
            self.config.command_timeout,
        )
        .await
        {
            Ok(output) if output.success() => ToolVersion {
                name: self.config.cli_path.clone(),
                available: true,
                version: Some(output.stdout.trim().to_string()),
                error: None,
            },
            Ok(output) => ToolVersion {
                name: self.config.cli_path.clone(),
                available: false,
                version: None,
                error: Some(output.error_text()),
            },
            Err(e) => ToolVersion {
                name: self.config.cli_path.clone(),
                available: false,
                version: None,
                error: Some(e.to_string()),
            },
        };

        if !tool.available {
            warn!("Nexus CLI unavailable: {:?}", tool.error);
        }
        Availability::from_components(vec![tool])
    }

    async fn start(&self, prover_id: &str, options: &StartOptions) -> BackendResult<StartOutcome> {
        validate_prover_id(prover_id)?;

        if self.live_handle(prover_id).await.is_some() {
            return Err(BackendError::AlreadyRunning(prover_id.to_string()));
        }

        let cli_args = self.start_args(prover_id, options)?;
        let rendered = describe(&self.config.cli_path, &cli_args);
        info!("Starting node {}: {}", prover_id, rendered);

        let mut command = Command::new(&self.config.cli_path);
        command.args(&cli_args).stdin(Stdio::null());
        // Own process group so terminal signals aimed at the supervisor skip the node
        #[cfg(unix)]
        command.process_group(0);

        let log_path = self.log_file_path(prover_id);
        match &log_path {
            Some(path) => {
                let file = self.open_log_file(path).await?;
                command.stdout(Stdio::from(file.try_clone()?));
                command.stderr(Stdio::from(file));
            }
            None => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::Unavailable(format!("{} not found: {}", self.config.cli_path, e))
            } else {
                BackendError::Spawn {
                    command: rendered.clone(),
                    error: e.to_string(),
                }
            }
        })?;

        let Some(pid) = child.id() else {
            return Err(BackendError::Spawn {
                command: rendered,
                error: "process exited before a pid was assigned".to_string(),
            });
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (exit_tx, mut exit_rx) = watch::channel(None);
        let started_at = Utc::now();

        {
            let mut handles = self.handles.write().await;
            if handles
                .get(prover_id)
                .is_some_and(|handle| !handle.has_exited())
            {
                warn!(
                    "Node {} was started concurrently; discarding pid {}",
                    prover_id, pid
                );
                let _ = child.start_kill();
                return Err(BackendError::AlreadyRunning(prover_id.to_string()));
            }
            handles.insert(
                prover_id.to_string(),
                ProcessHandle {
                    pid,
                    started_at,
                    generation,
                    exit: exit_rx.clone(),
                },
            );
        }

        self.output
            .write()
            .await
            .insert(prover_id.to_string(), VecDeque::new());
        if log_path.is_none() {
            self.capture_output(prover_id, &mut child);
        }
        self.spawn_exit_watcher(prover_id.to_string(), generation, child, exit_tx);

        let early_exit = tokio::time::timeout(self.config.launch_grace, async {
            exit_rx
                .wait_for(Option::is_some)
                .await
                .map(|record| record.clone())
        })
        .await;

        match early_exit {
            Err(_) => {
                info!("Node {} started with pid {}", prover_id, pid);
                Ok(StartOutcome {
                    pid: Some(pid),
                    status: Some(ObservedState::Running.to_string()),
                    ..Default::default()
                })
            }
            Ok(result) => {
                self.remove_handle_if(prover_id, generation).await;
                let code = result.ok().flatten().and_then(|record| record.code);
                // Let the capture tasks drain whatever the process printed last
                tokio::time::sleep(Duration::from_millis(50)).await;
                let output = self
                    .captured_output(prover_id, LAUNCH_FAILURE_CONTEXT_LINES)
                    .await
                    .join("\n");
                error!(
                    "Node {} exited during startup (code: {:?}): {}",
                    prover_id, code, output
                );
                Err(BackendError::LaunchFailed {
                    prover_id: prover_id.to_string(),
                    code,
                    output,
                })
            }
        }
    }

    async fn stop(&self, prover_id: &str) -> BackendResult<StopOutcome> {
        // The handle goes away whatever the outcome of the stop attempt
        let handle = self.handles.write().await.remove(prover_id);
        match handle {
            Some(handle) => self.stop_tracked(prover_id, handle).await,
            None => self.stop_untracked(prover_id).await,
        }
    }

    async fn status(&self, prover_id: &str) -> ObservedStatus {
        if let Some(handle) = self.live_handle(prover_id).await {
            let mut status = ObservedStatus::new(ObservedState::Running);
            status.pid = Some(handle.pid);
            status.started_at = Some(handle.started_at);
            status.uptime = Some(format_uptime(handle.started_at, Utc::now()));
            status.raw_output = Some(format!("Tracked process {}", handle.pid));
            return status;
        }

        if self.config.strict_tracking {
            let mut status = ObservedStatus::stopped();
            status.raw_output = Some("No tracked process".to_string());
            return status;
        }

        let matches = self.scan_processes();
        match matches.first() {
            Some(first) => {
                let mut status = ObservedStatus::new(ObservedState::Running);
                status.pid = Some(first.pid);
                status.raw_output = Some(
                    matches
                        .iter()
                        .map(|m| format!("{} {} {}", m.pid, m.name, m.command))
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
                status
            }
            None => {
                let mut status = ObservedStatus::stopped();
                status.raw_output = Some("Node is not running".to_string());
                status
            }
        }
    }

    async fn logs(&self, prover_id: &str, lines: usize) -> BackendResult<Vec<String>> {
        validate_prover_id(prover_id)?;
        let output = run_checked(
            &self.config.cli_path,
            &args([
                "logs".to_string(),
                "--node-id".to_string(),
                prover_id.to_string(),
                "--lines".to_string(),
                lines.to_string(),
            ]),
            None,
            self.config.command_timeout,
        )
        .await?;
        Ok(parse_log_lines(&output.stdout))
    }

    async fn metrics(&self, prover_id: &str) -> BackendResult<NodeMetrics> {
        validate_prover_id(prover_id)?;
        let output = run_checked(
            &self.config.cli_path,
            &args(["node", "metrics", "--prover-id", prover_id]),
            None,
            self.config.command_timeout,
        )
        .await?;
        let parsed = parse_metrics_output(&output.stdout);

        let mut metrics = NodeMetrics::empty();
        metrics.cpu_usage = parsed.cpu_usage;
        metrics.memory_usage = parsed.memory_usage;
        metrics.network_usage = parsed.network_usage;
        metrics.block_height = parsed.block_height;
        metrics.raw_output = Some(output.stdout);

        let observed = self.status(prover_id).await;
        metrics.status = Some(observed.state);
        metrics.uptime = observed.uptime;

        // Task and point counters come from the status subcommand when it is supported
        match run_command(
            &self.config.cli_path,
            &args(["status", "--node-id", prover_id]),
            None,
            self.config.command_timeout,
        )
        .await
        {
            Ok(status_output) if status_output.success() => {
                let status = parse_status_output(&status_output.stdout);
                metrics.tasks_completed = status.tasks_completed;
                metrics.nex_points = status.nex_points;
                if status.uptime.is_some() {
                    metrics.uptime = status.uptime;
                }
            }
            Ok(status_output) => debug!(
                "Status subcommand failed for node {}: {}",
                prover_id,
                status_output.error_text()
            ),
            Err(e) => debug!("Status subcommand failed for node {}: {}", prover_id, e),
        }

        Ok(metrics)
    }

    async fn is_tracked(&self, prover_id: &str) -> bool {
        self.live_handle(prover_id).await.is_some()
    }

    async fn tracked(&self) -> Vec<TrackedNode> {
        let mut nodes: Vec<TrackedNode> = self
            .handles
            .read()
            .await
            .iter()
            .filter(|(_, handle)| !handle.has_exited())
            .map(|(prover_id, handle)| TrackedNode {
                prover_id: prover_id.clone(),
                pid: Some(handle.pid),
                container_name: None,
                started_at: handle.started_at,
            })
            .collect();
        nodes.sort_by(|a, b| a.prover_id.cmp(&b.prover_id));
        nodes
    }

    async fn cleanup(&self) {
        let handles: Vec<(String, ProcessHandle)> = self.handles.write().await.drain().collect();
        for (prover_id, handle) in handles {
            if handle.has_exited() {
                continue;
            }
            info!("Terminating node {} (pid {}) on shutdown", prover_id, handle.pid);
            if let Err(e) = send_signal(handle.pid, Termination::Graceful, true) {
                warn!("Failed to terminate node {}: {}", prover_id, e);
            }
        }
    }
}

fn tail(mut lines: Vec<String>, count: usize) -> Vec<String> {
    let skip = lines.len().saturating_sub(count);
    lines.drain(..skip);
    lines
}

async fn wait_for_exit(exit: &mut watch::Receiver<Option<ExitRecord>>, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, exit.wait_for(Option::is_some)).await,
        Ok(Ok(_))
    )
}

async fn wait_for_pid_exit(pid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if !pid_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    }
}

fn pid_alive(pid: u32) -> bool {
    use sysinfo::{Pid as SysPid, ProcessStatus, System};

    let mut system = System::new();
    system.refresh_processes();
    system
        .process(SysPid::from_u32(pid))
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// Signal a pid (or its process group). `Ok(false)` means nothing was there to signal.
#[cfg(unix)]
fn send_signal(pid: u32, termination: Termination, group: bool) -> BackendResult<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let signal = match termination {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forced => Signal::SIGKILL,
    };
    let target = Pid::from_raw(pid as i32);
    let result = if group {
        killpg(target, signal)
    } else {
        kill(target, signal)
    };

    match result {
        Ok(()) => {
            debug!("Sent {} to {}{}", signal, if group { "group " } else { "" }, pid);
            Ok(true)
        }
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(BackendError::Signal {
            pid,
            error: format!("Failed to send {}: {}", signal, e),
        }),
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, _termination: Termination, _group: bool) -> BackendResult<bool> {
    Err(BackendError::NotSupported(format!(
        "signalling process {} is only implemented on unix",
        pid
    )))
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
