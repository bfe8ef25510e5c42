// ABOUTME: Parsers for the line-oriented text printed by the native Nexus CLI
// ABOUTME: Turns `Key: value` output into typed status, metrics, info and list values

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Matches list lines such as `node_123 (running) - 127.0.0.1:8080`
static LIST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s+\((\w+)\)\s*-\s*(.+)$").expect("valid list regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliStatus {
    pub status: Option<String>,
    pub uptime: Option<String>,
    pub tasks_completed: Option<u64>,
    pub nex_points: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliMetrics {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub network_usage: Option<String>,
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliNodeEntry {
    pub id: String,
    pub status: String,
    pub address: String,
}

fn value_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.find(key).map(|idx| line[idx + key.len()..].trim())
}

fn parse_percent(raw: &str) -> f64 {
    raw.replace('%', "").trim().parse::<f64>().unwrap_or(0.0)
}

/// Parse the output of the status subcommand.
///
/// Unparseable task and point counts become zero.
pub fn parse_status_output(output: &str) -> CliStatus {
    let mut status = CliStatus::default();

    for line in output.lines() {
        if let Some(value) = value_after(line, "Status:") {
            status.status = Some(value.to_lowercase());
        } else if let Some(value) = value_after(line, "Uptime:") {
            status.uptime = Some(value.to_string());
        } else if let Some(value) = value_after(line, "Tasks:") {
            status.tasks_completed = Some(value.parse().unwrap_or(0));
        } else if let Some(value) = value_after(line, "Points:") {
            status.nex_points = Some(value.parse().unwrap_or(0.0));
        }
    }

    status
}

/// Parse the output of `node metrics`.
pub fn parse_metrics_output(output: &str) -> CliMetrics {
    let mut metrics = CliMetrics::default();

    for line in output.lines() {
        if let Some(value) = value_after(line, "CPU:") {
            metrics.cpu_usage = Some(parse_percent(value));
        } else if let Some(value) = value_after(line, "Memory:") {
            metrics.memory_usage = Some(parse_percent(value));
        } else if let Some(value) = value_after(line, "Network:") {
            metrics.network_usage = Some(value.to_string());
        } else if let Some(value) = value_after(line, "Block Height:") {
            metrics.block_height = Some(value.parse().unwrap_or(0));
        }
    }

    metrics
}

/// Parse generic `Key: value` output into snake_case keys.
pub fn parse_info_output(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            let key = key
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_");
            Some((key, value.to_string()))
        })
        .collect()
}

/// Parse the `list` subcommand; lines that don't match are skipped.
pub fn parse_list_output(output: &str) -> Vec<CliNodeEntry> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| LIST_LINE.captures(line))
        .map(|caps| CliNodeEntry {
            id: caps[1].to_string(),
            status: caps[2].to_string(),
            address: caps[3].trim().to_string(),
        })
        .collect()
}

/// Split log output into its non-empty lines
pub fn parse_log_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_status_output() {
        let output = "Node: p1\nStatus: RUNNING\nUptime: 3h 12m\nTasks: 42\nPoints: 1250\n";
        let status = parse_status_output(output);
        assert_eq!(
            status,
            CliStatus {
                status: Some("running".to_string()),
                uptime: Some("3h 12m".to_string()),
                tasks_completed: Some(42),
                nex_points: Some(1250.0),
            }
        );
    }

    #[test]
    fn test_parse_status_output_invalid_numbers_become_zero() {
        let status = parse_status_output("Tasks: many\nPoints: n/a");
        assert_eq!(status.tasks_completed, Some(0));
        assert_eq!(status.nex_points, Some(0.0));
        assert_eq!(status.status, None);
    }

    #[rstest]
    #[case("CPU: 45.5%", Some(45.5), None)]
    #[case("CPU: busy", Some(0.0), None)]
    #[case("Memory: 12 %", None, Some(12.0))]
    #[case("Uptime: 1h", None, None)]
    fn test_parse_metrics_percentages(
        #[case] line: &str,
        #[case] cpu: Option<f64>,
        #[case] memory: Option<f64>,
    ) {
        let metrics = parse_metrics_output(line);
        assert_eq!(metrics.cpu_usage, cpu);
        assert_eq!(metrics.memory_usage, memory);
    }

    #[test]
    fn test_parse_metrics_output_full() {
        let output = "CPU: 12.5%\nMemory: 40%\nNetwork: 1.2 MB/s\nBlock Height: 98765\n";
        let metrics = parse_metrics_output(output);
        assert_eq!(
            metrics,
            CliMetrics {
                cpu_usage: Some(12.5),
                memory_usage: Some(40.0),
                network_usage: Some("1.2 MB/s".to_string()),
                block_height: Some(98765),
            }
        );
    }

    #[test]
    fn test_parse_info_output_snake_cases_keys() {
        let output = "Node Id: p1\nWallet Address: 0xabc\nEndpoint: http://127.0.0.1:8080\nempty:\n";
        let info = parse_info_output(output);
        assert_eq!(info.get("node_id").map(String::as_str), Some("p1"));
        assert_eq!(info.get("wallet_address").map(String::as_str), Some("0xabc"));
        assert_eq!(
            info.get("endpoint").map(String::as_str),
            Some("http://127.0.0.1:8080")
        );
        assert!(!info.contains_key("empty"));
    }

    #[test]
    fn test_parse_list_output() {
        let output = "Nodes:\nnode_123 (running) - 127.0.0.1:8080\n  node_9 (stopped) -  offline \ngarbage line\n";
        let nodes = parse_list_output(output);
        assert_eq!(
            nodes,
            vec![
                CliNodeEntry {
                    id: "node_123".to_string(),
                    status: "running".to_string(),
                    address: "127.0.0.1:8080".to_string(),
                },
                CliNodeEntry {
                    id: "node_9".to_string(),
                    status: "stopped".to_string(),
                    address: "offline".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_log_lines_drops_blank_lines() {
        let lines = parse_log_lines("first\n\n   \nsecond\n");
        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
    }
}
