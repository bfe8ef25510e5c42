// ABOUTME: Entry point for the nexus-nodes operator CLI
// ABOUTME: Parses arguments, initialises logging and dispatches to the supervisor commands

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use nexus_supervisor::constants::LOG_LEVEL;
use nexus_supervisor::NodeType;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nexus-nodes")]
#[command(about = "Supervise Nexus prover nodes running as processes or containers")]
#[command(version = nexus_supervisor::VERSION)]
struct Cli {
    /// Print results as a JSON success/error envelope
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TypeArg {
    Process,
    Container,
}

impl From<TypeArg> for NodeType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Process => NodeType::Process,
            TypeArg::Container => NodeType::Container,
        }
    }
}

#[derive(clap::Args, Debug, Default, PartialEq)]
struct StartArgs {
    /// Start without building the image
    #[arg(long)]
    skip_build: bool,
    /// Force an image build before starting
    #[arg(long)]
    rebuild: bool,
    /// Override the container name
    #[arg(long)]
    container_name: Option<String>,
    /// Log level passed to the node
    #[arg(long)]
    log_level: Option<String>,
    /// Worker count passed to the node
    #[arg(long)]
    workers: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report which backend tools are installed
    Check,
    /// Register a new node
    Create {
        #[arg(long)]
        prover_id: String,
        #[arg(long)]
        name: String,
        #[arg(long = "type", value_enum, default_value = "process")]
        node_type: TypeArg,
        /// Node configuration as a JSON document
        #[arg(long)]
        config: Option<String>,
    },
    /// List registered nodes
    List {
        /// Only show nodes with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a single node record
    Show { id: i64 },
    /// Stop (if needed) and remove a node with its history
    Delete { id: i64 },
    /// Start a node
    Start {
        id: i64,
        #[command(flatten)]
        options: StartArgs,
    },
    /// Stop a node
    Stop { id: i64 },
    /// Compare persisted status with what the backend observes
    Status { id: i64 },
    /// Show recent log lines
    Logs {
        id: i64,
        #[arg(long, short = 'n', default_value_t = 100)]
        lines: usize,
    },
    /// Take a metrics sample
    Metrics { id: i64 },
    /// Stop, rebuild the image and start a container node
    Rebuild {
        id: i64,
        #[arg(long)]
        container_name: Option<String>,
    },
    /// Ask the node CLI for its own view of a process node
    Info { id: i64 },
    /// List containers on the engine
    Containers,
    /// Show recent notifications
    Notifications {
        /// Restrict to one node
        #[arg(long)]
        node: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Run the metrics collector and stream live updates until interrupted
    Run,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var(LOG_LEVEL)
                .map_err(|e| e.to_string())
                .and_then(|level| EnvFilter::try_new(level).map_err(|e| e.to_string()))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = commands::run(cli.command, json).await {
        output::emit_error(json, &e);
        process::exit(1);
    }
}
