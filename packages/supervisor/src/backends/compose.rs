// ABOUTME: Per-node build contexts and compose service definitions
// ABOUTME: Renders the Dockerfile and writes the definition file the compose tool brings up

use crate::error::BackendResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Host port binding; `0` lets the engine pick a free port
pub const MONITORING_PORT: &str = "0:8080";
pub const DATA_MOUNT: &str = "/nexus-data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub image: String,
    pub container_name: String,
    pub volumes: Vec<String>,
    pub command: Vec<String>,
    pub restart: String,
    pub stdin_open: bool,
    pub tty: bool,
    pub environment: Vec<String>,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {}

/// A compose file holding a single node service and its data volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeDefinition {
    pub services: BTreeMap<String, ServiceSpec>,
    pub volumes: BTreeMap<String, VolumeSpec>,
}

impl ComposeDefinition {
    pub fn for_node(prover_id: &str, container_name: &str, image_name: &str) -> Self {
        let volume_name = volume_name(prover_id);
        let service = ServiceSpec {
            image: image_name.to_string(),
            container_name: container_name.to_string(),
            volumes: vec![format!("{}:{}", volume_name, DATA_MOUNT)],
            command: vec![
                "start".to_string(),
                "--node-id".to_string(),
                prover_id.to_string(),
            ],
            restart: "unless-stopped".to_string(),
            stdin_open: true,
            tty: true,
            environment: vec![format!("NODE_ID={}", prover_id)],
            ports: vec![MONITORING_PORT.to_string()],
        };

        Self {
            services: BTreeMap::from([(container_name.to_string(), service)]),
            volumes: BTreeMap::from([(volume_name, VolumeSpec::default())]),
        }
    }
}

/// Files generated for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDefinition {
    pub container_name: String,
    pub volume_name: String,
    pub image_name: String,
    pub path: PathBuf,
}

pub fn volume_name(prover_id: &str) -> String {
    format!("nexus_data_{}", prover_id)
}

pub fn definition_path(data_dir: &Path, prover_id: &str) -> PathBuf {
    data_dir.join(format!("docker-compose-{}.yml", prover_id))
}

pub fn build_context_dir(data_dir: &Path, prover_id: &str) -> PathBuf {
    data_dir.join("build").join(prover_id)
}

pub fn render_dockerfile(repo_url: &str, prover_id: &str) -> String {
    format!(
        r#"FROM rust:latest

RUN apt update && apt install -y protobuf-compiler git

RUN git clone {repo_url} /nexus

WORKDIR /nexus/clients/cli
RUN cargo build --release

ENTRYPOINT ["./target/release/nexus-network"]
CMD ["start", "--node-id", "{prover_id}"]
"#
    )
}

/// Write `<data_dir>/build/<prover_id>/Dockerfile` and return the context directory
pub async fn write_build_context(
    data_dir: &Path,
    repo_url: &str,
    prover_id: &str,
) -> BackendResult<PathBuf> {
    let context = build_context_dir(data_dir, prover_id);
    tokio::fs::create_dir_all(&context).await?;
    tokio::fs::write(
        context.join("Dockerfile"),
        render_dockerfile(repo_url, prover_id),
    )
    .await?;
    debug!("Wrote build context for {} at {:?}", prover_id, context);
    Ok(context)
}

/// Generate and write the compose definition for a node.
///
/// Compose tools read YAML, and JSON is valid YAML, so the file is written as JSON.
pub async fn write_definition(
    data_dir: &Path,
    prover_id: &str,
    container_name: &str,
    image_name: &str,
) -> BackendResult<RuntimeDefinition> {
    tokio::fs::create_dir_all(data_dir).await?;

    let definition = ComposeDefinition::for_node(prover_id, container_name, image_name);
    let path = definition_path(data_dir, prover_id);
    tokio::fs::write(&path, serde_json::to_string_pretty(&definition)?).await?;
    debug!("Wrote compose definition for {} at {:?}", prover_id, path);

    Ok(RuntimeDefinition {
        container_name: container_name.to_string(),
        volume_name: volume_name(prover_id),
        image_name: image_name.to_string(),
        path,
    })
}
