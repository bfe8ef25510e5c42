// ABOUTME: Command handlers for the nexus-nodes CLI
// ABOUTME: Wires configuration, storage and backends into a supervisor and runs one command

use crate::output;
use crate::{Commands, StartArgs};
use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use nexus_supervisor::{
    ContainerBackend, EventBus, MetricsCollector, NewNode, NodeStatus, NodeSupervisor,
    NodeType, ProcessBackend, SqliteNodeStore, StartOptions, SupervisorConfig,
};
use std::sync::Arc;
use tracing::{info, warn};

struct App {
    supervisor: Arc<NodeSupervisor>,
    process: Arc<ProcessBackend>,
    container: Option<Arc<ContainerBackend>>,
    config: SupervisorConfig,
}

async fn bootstrap() -> Result<App> {
    let mut config = SupervisorConfig::from_env();
    if config.process.log_dir.is_none() {
        config.process.log_dir = Some(config.container.data_dir.join("logs"));
    }

    let store = SqliteNodeStore::connect(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    let events = EventBus::new(config.event_channel_size);
    let mut supervisor = NodeSupervisor::new(Arc::new(store), events)
        .with_readiness_timeout(config.readiness_timeout);

    let process = Arc::new(ProcessBackend::new(config.process.clone()));
    supervisor.register_backend(process.clone());

    let container = match ContainerBackend::with_docker(config.container.clone()) {
        Ok(backend) => {
            let backend = Arc::new(backend);
            supervisor.register_backend(backend.clone());
            Some(backend)
        }
        Err(e) => {
            warn!("Container backend unavailable: {}", e);
            None
        }
    };

    Ok(App {
        supervisor: Arc::new(supervisor),
        process,
        container,
        config,
    })
}

fn start_options(args: StartArgs) -> StartOptions {
    StartOptions {
        skip_build: args.skip_build,
        rebuild: args.rebuild,
        container_name: args.container_name,
        log_level: args.log_level,
        workers: args.workers,
        ..Default::default()
    }
}

fn parse_config(raw: Option<String>) -> Result<Option<serde_json::Value>> {
    raw.map(|raw| serde_json::from_str(&raw).context("--config must be a JSON document"))
        .transpose()
}

fn parse_status(raw: Option<String>) -> Result<Option<NodeStatus>> {
    raw.map(|raw| raw.parse::<NodeStatus>().map_err(|e| anyhow!(e)))
        .transpose()
}

pub async fn run(command: Commands, json: bool) -> Result<()> {
    let app = bootstrap().await?;
    let supervisor = &app.supervisor;

    match command {
        Commands::Check => {
            let results = supervisor.check_availability().await;
            output::emit(json, &results, |r| output::print_availability(r))
        }
        Commands::Create {
            prover_id,
            name,
            node_type,
            config,
        } => {
            let node = supervisor
                .create_node(NewNode {
                    prover_id,
                    name,
                    node_type: node_type.into(),
                    config: parse_config(config)?,
                })
                .await?;
            output::emit(json, &node, |n| {
                println!("{}", "✅ Node created".green().bold());
                output::print_node(n);
            })
        }
        Commands::List { status } => {
            let nodes = supervisor.list_nodes(parse_status(status)?).await?;
            output::emit(json, &nodes, |n| output::print_nodes(n))
        }
        Commands::Show { id } => {
            let node = supervisor.get_node(id).await?;
            output::emit(json, &node, output::print_node)
        }
        Commands::Delete { id } => {
            supervisor.delete_node(id).await?;
            output::emit(json, &id, |id| {
                println!("{}", format!("🗑  Node {} deleted", id).green());
            })
        }
        Commands::Start { id, options } => {
            let report = supervisor.start(id, &start_options(options)).await?;
            output::emit(json, &report, |r| {
                println!(
                    "{}",
                    format!("🚀 Node {} started", r.node.prover_id).green().bold()
                );
                if let Some(pid) = r.outcome.pid {
                    println!("{:<15} {}", "PID:".cyan(), pid);
                }
                if let Some(name) = &r.outcome.container_name {
                    println!("{:<15} {}", "Container:".cyan(), name);
                }
            })
        }
        Commands::Stop { id } => {
            let report = supervisor.stop(id).await?;
            output::emit(json, &report, |r| {
                println!(
                    "{}",
                    format!("⏹  Node {} stopped", r.node.prover_id).green().bold()
                );
                println!("{}", r.outcome.message.dimmed());
            })
        }
        Commands::Status { id } => {
            let report = supervisor.status(id).await?;
            output::emit(json, &report, output::print_status)
        }
        Commands::Logs { id, lines } => {
            let logs = supervisor.logs(id, lines).await?;
            output::emit(json, &logs, |logs| {
                for line in logs {
                    println!("{}", line);
                }
            })
        }
        Commands::Metrics { id } => {
            let metrics = supervisor.metrics(id).await?;
            output::emit(json, &metrics, output::print_metrics)
        }
        Commands::Rebuild { id, container_name } => {
            let overrides = StartOptions {
                container_name,
                ..Default::default()
            };
            let report = supervisor.rebuild(id, &overrides).await?;
            output::emit(json, &report, |r| {
                println!(
                    "{}",
                    format!("🔨 Node {} rebuilt from image {}", r.node.prover_id, r.image)
                        .green()
                        .bold()
                );
            })
        }
        Commands::Info { id } => {
            let node = supervisor.get_node(id).await?;
            if node.node_type != NodeType::Process {
                bail!("Node {} is not a process node", node.prover_id);
            }
            let details = app.process.info(&node.prover_id).await?;
            output::emit(json, &details, |details| {
                for (key, value) in details {
                    println!("{:<20} {}", format!("{}:", key).cyan(), value);
                }
            })
        }
        Commands::Containers => {
            let backend = app
                .container
                .as_ref()
                .ok_or_else(|| anyhow!("Container backend is not available"))?;
            let containers = backend.list_containers().await?;
            output::emit(json, &containers, |c| output::print_containers(c))
        }
        Commands::Notifications { node, limit } => {
            let notifications = supervisor.notifications(node, limit).await?;
            output::emit(json, &notifications, |n| output::print_notifications(n))
        }
        Commands::Run => run_foreground(&app).await,
    }
}

/// Collect metrics and print live updates as JSON lines until Ctrl-C
async fn run_foreground(app: &App) -> Result<()> {
    let collector = MetricsCollector::new(app.supervisor.clone(), app.config.monitor.clone());
    let mut updates = app.supervisor.subscribe([]);

    collector.start().await;
    info!(
        "Collecting metrics every {}s; press Ctrl-C to stop",
        app.config.monitor.interval.as_secs()
    );

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => println!("{}", serde_json::to_string(&update)?),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!("Shutting down");
    collector.stop().await;
    app.supervisor.shutdown().await;
    Ok(())
}
