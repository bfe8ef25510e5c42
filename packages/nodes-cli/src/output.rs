// ABOUTME: Terminal rendering for node records, statuses, metrics and containers
// ABOUTME: Builds comfy-table tables and colours statuses; JSON mode prints the result envelope

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use nexus_supervisor::backends::ContainerSummary;
use nexus_supervisor::{
    BackendAvailability, NodeMetrics, NodeRecord, NodeStatusReport, Notification,
    NotificationKind, OperationResult,
};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a successful result either as the JSON envelope or through `render`
pub fn emit<T: Serialize>(json: bool, data: &T, render: impl FnOnce(&T)) -> Result<()> {
    if json {
        print_json(&OperationResult::success(data))
    } else {
        render(data);
        Ok(())
    }
}

pub fn emit_error(json: bool, error: &anyhow::Error) {
    if json {
        let envelope: OperationResult<()> = OperationResult::error(format!("{:#}", error));
        if let Ok(rendered) = serde_json::to_string_pretty(&envelope) {
            println!("{}", rendered);
        }
    }
    eprintln!("{} {:#}", "Error:".red().bold(), error);
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn colour_status(status: &str) -> ColoredString {
    match status {
        "running" => status.green(),
        "starting" => status.yellow(),
        "error" | "unknown" => status.red(),
        _ => status.dimmed(),
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

pub fn print_nodes(nodes: &[NodeRecord]) {
    if nodes.is_empty() {
        println!("{}", "No nodes found".yellow());
        println!(
            "{}",
            "Use 'nexus-nodes create' to register your first node".dimmed()
        );
        return;
    }

    let mut table = new_table();
    table.set_header(vec![
        "ID",
        "Prover ID",
        "Name",
        "Type",
        "Status",
        "Container",
        "Last Seen",
    ]);

    for node in nodes {
        table.add_row(vec![
            node.id.to_string(),
            truncate(&node.prover_id, 24),
            truncate(&node.name, 24),
            node.node_type.to_string(),
            colour_status(node.status.as_str()).to_string(),
            or_dash(node.container_name.as_deref()),
            format_date(node.last_seen),
        ]);
    }

    println!("{}", table);
    println!("Total: {} nodes", nodes.len().to_string().cyan());
}

pub fn print_node(node: &NodeRecord) {
    println!("{}", format!("Node {} ({})", node.name, node.prover_id).blue().bold());
    println!("{:<15} {}", "ID:".cyan(), node.id);
    println!("{:<15} {}", "Type:".cyan(), node.node_type);
    println!("{:<15} {}", "Status:".cyan(), colour_status(node.status.as_str()));
    println!("{:<15} {}", "Created:".cyan(), format_date(Some(node.created_at)));
    println!("{:<15} {}", "Last seen:".cyan(), format_date(node.last_seen));
    if let Some(name) = &node.container_name {
        println!("{:<15} {}", "Container:".cyan(), name);
    }
    if let Some(errors) = &node.errors {
        println!("{:<15} {}", "Last error:".cyan(), errors.red());
    }
}

pub fn print_status(report: &NodeStatusReport) {
    let observed = &report.observed;
    println!("{}", format!("Status of {}", report.prover_id).blue().bold());
    println!(
        "{:<15} {}",
        "Persisted:".cyan(),
        colour_status(report.persisted.as_str())
    );
    println!(
        "{:<15} {}",
        "Observed:".cyan(),
        colour_status(observed.state.as_str())
    );
    println!("{:<15} {}", "Uptime:".cyan(), or_dash(observed.uptime.as_deref()));
    if let Some(pid) = observed.pid {
        println!("{:<15} {}", "PID:".cyan(), pid);
    }
    if let Some(id) = &observed.container_id {
        println!("{:<15} {}", "Container ID:".cyan(), truncate(id, 12));
    }
    if let Some(error) = &observed.error {
        println!("{:<15} {}", "Error:".cyan(), error.red());
    }
    if report.diverged {
        println!(
            "{}",
            "Persisted status disagrees with what the backend observes".yellow()
        );
    }
}

pub fn print_metrics(metrics: &NodeMetrics) {
    let mut table = new_table();
    table.set_header(vec!["Metric", "Value"]);

    let rows: Vec<(&str, String)> = vec![
        ("Status", or_dash(metrics.status.map(|s| s.as_str()))),
        ("Uptime", or_dash(metrics.uptime.as_deref())),
        ("CPU %", or_dash(metrics.cpu_usage.map(|v| format!("{:.1}", v)))),
        ("Memory %", or_dash(metrics.memory_usage.map(|v| format!("{:.1}", v)))),
        (
            "Memory",
            match (metrics.memory_used_mb, metrics.memory_limit_mb) {
                (Some(used), Some(limit)) => format!("{} / {} MB", used, limit),
                _ => "-".to_string(),
            },
        ),
        ("Network", or_dash(metrics.network_usage.as_deref())),
        ("Net RX bytes", or_dash(metrics.network_rx_bytes)),
        ("Net TX bytes", or_dash(metrics.network_tx_bytes)),
        ("Block read", or_dash(metrics.block_read_bytes)),
        ("Block write", or_dash(metrics.block_write_bytes)),
        ("Block height", or_dash(metrics.block_height)),
        ("Tasks", or_dash(metrics.tasks_completed)),
        ("NEX points", or_dash(metrics.nex_points)),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }

    println!("{}", table);
}

pub fn print_availability(results: &[BackendAvailability]) {
    let mut table = new_table();
    table.set_header(vec!["Backend", "Tool", "Available", "Version", "Error"]);

    for result in results {
        for tool in &result.availability.components {
            let available = if tool.available {
                "yes".green()
            } else {
                "no".red()
            };
            table.add_row(vec![
                result.node_type.to_string(),
                tool.name.clone(),
                available.to_string(),
                or_dash(tool.version.as_deref()),
                truncate(tool.error.as_deref().unwrap_or(""), 40),
            ]);
        }
    }

    println!("{}", table);
}

pub fn print_containers(containers: &[ContainerSummary]) {
    if containers.is_empty() {
        println!("{}", "No containers found".yellow());
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["ID", "Name", "Image", "Command", "Created", "Status", "Ports"]);
    for container in containers {
        table.add_row(vec![
            truncate(&container.id, 12),
            container.name.clone(),
            truncate(&container.image, 30),
            truncate(&container.command, 20),
            format_date(container.created),
            container.status.clone(),
            container.ports.clone(),
        ]);
    }

    println!("{}", table);
}

pub fn print_notifications(notifications: &[Notification]) {
    if notifications.is_empty() {
        println!("{}", "No notifications".dimmed());
        return;
    }

    for notification in notifications {
        let title = match notification.kind {
            NotificationKind::Success => notification.title.green(),
            NotificationKind::Info => notification.title.cyan(),
            NotificationKind::Warning => notification.title.yellow(),
            NotificationKind::Error => notification.title.red(),
        };
        println!(
            "{} {} {}",
            format_date(Some(notification.timestamp)).dimmed(),
            title.bold(),
            notification.message
        );
    }
}
