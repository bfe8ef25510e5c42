// ABOUTME: Persistence gateway for node records, metrics history and notifications
// ABOUTME: Defines the NodeStore trait and its SQLite implementation with embedded migrations

use crate::types::{
    MetricRecord, MetricSample, NewNode, NewNotification, NodeRecord, NodeStatus, NodeType,
    NodeUpdate, Notification, NotificationKind,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Node not found: {0}")]
    NotFound(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable storage consumed by the supervisor
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get_node(&self, id: i64) -> StoreResult<Option<NodeRecord>>;

    async fn get_node_by_prover_id(&self, prover_id: &str) -> StoreResult<Option<NodeRecord>>;

    async fn list_nodes(&self, status: Option<NodeStatus>) -> StoreResult<Vec<NodeRecord>>;

    /// Insert a node with status `stopped`
    async fn create_node(&self, node: &NewNode) -> StoreResult<NodeRecord>;

    async fn update_node(&self, id: i64, update: &NodeUpdate) -> StoreResult<()>;

    /// Delete a node together with its metrics and notifications
    async fn delete_node(&self, id: i64) -> StoreResult<()>;

    async fn add_notification(
        &self,
        node_id: Option<i64>,
        notification: &NewNotification,
    ) -> StoreResult<i64>;

    /// Newest first; `node_id = None` lists notifications for every node
    async fn list_notifications(
        &self,
        node_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>>;

    async fn add_metric(&self, node_id: i64, sample: &MetricSample) -> StoreResult<i64>;

    /// Newest first
    async fn list_metrics(&self, node_id: i64, limit: i64) -> StoreResult<Vec<MetricRecord>>;

    /// Delete samples older than `days`, returning how many were removed
    async fn clean_old_metrics(&self, days: u32) -> StoreResult<u64>;
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp(format!("{}: {}", raw, e)))
}

const NODE_COLUMNS: &str = "id, prover_id, name, node_type, status, config, created_at, \
                            last_seen, errors, container_name, container_id";

/// SQLite-backed [`NodeStore`]
#[derive(Clone)]
pub struct SqliteNodeStore {
    pool: SqlitePool,
}

impl SqliteNodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and apply migrations
    pub async fn connect(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("Node database ready at {:?}", db_path);
        Ok(store)
    }

    /// Single-connection in-memory database, mainly for tests
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_node(&self, column: &str, value: NodeKey<'_>) -> StoreResult<Option<NodeRecord>> {
        let query = format!("SELECT {} FROM nodes WHERE {} = ?1", NODE_COLUMNS, column);
        let q = sqlx::query(&query);
        let q = match value {
            NodeKey::Id(id) => q.bind(id),
            NodeKey::ProverId(prover_id) => q.bind(prover_id),
        };

        match q.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(self.row_to_node(row)?)),
            None => Ok(None),
        }
    }

    fn row_to_node(&self, row: SqliteRow) -> StoreResult<NodeRecord> {
        let status: String = row.get("status");
        let node_type: String = row.get("node_type");

        Ok(NodeRecord {
            id: row.get("id"),
            prover_id: row.get("prover_id"),
            name: row.get("name"),
            node_type: node_type
                .parse::<NodeType>()
                .map_err(StoreError::InvalidNodeType)?,
            status: status.parse::<NodeStatus>().map_err(StoreError::InvalidStatus)?,
            config: row
                .get::<Option<String>, _>("config")
                .and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            last_seen: row
                .get::<Option<String>, _>("last_seen")
                .and_then(|s| parse_timestamp(&s).ok()),
            errors: row.get("errors"),
            container_name: row.get("container_name"),
            container_id: row.get("container_id"),
        })
    }

    fn row_to_notification(&self, row: SqliteRow) -> StoreResult<Notification> {
        let kind: String = row.get("type");
        Ok(Notification {
            id: row.get("id"),
            node_id: row.get("node_id"),
            kind: kind
                .parse::<NotificationKind>()
                .map_err(StoreError::InvalidStatus)?,
            title: row.get("title"),
            message: row.get("message"),
            is_read: row.get::<i64, _>("is_read") != 0,
            timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
        })
    }

    fn row_to_metric(&self, row: SqliteRow) -> StoreResult<MetricRecord> {
        Ok(MetricRecord {
            id: row.get("id"),
            node_id: row.get("node_id"),
            sample: MetricSample {
                nex_points: row.get("nex_points"),
                tasks_completed: row.get("tasks_completed"),
                cpu_usage: row.get("cpu_usage"),
                memory_usage: row.get("memory_usage"),
                uptime: row.get("uptime"),
                block_height: row.get("block_height"),
            },
            timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
        })
    }
}

enum NodeKey<'a> {
    Id(i64),
    ProverId(&'a str),
}

#[async_trait]
impl NodeStore for SqliteNodeStore {
    async fn get_node(&self, id: i64) -> StoreResult<Option<NodeRecord>> {
        self.fetch_node("id", NodeKey::Id(id)).await
    }

    async fn get_node_by_prover_id(&self, prover_id: &str) -> StoreResult<Option<NodeRecord>> {
        self.fetch_node("prover_id", NodeKey::ProverId(prover_id))
            .await
    }

    async fn list_nodes(&self, status: Option<NodeStatus>) -> StoreResult<Vec<NodeRecord>> {
        let mut query = format!("SELECT {} FROM nodes", NODE_COLUMNS);
        if status.is_some() {
            query.push_str(" WHERE status = ?1");
        }
        query.push_str(" ORDER BY id ASC");

        let mut q = sqlx::query(&query);
        if let Some(status) = status {
            q = q.bind(status.as_str());
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(|row| self.row_to_node(row)).collect()
    }

    async fn create_node(&self, node: &NewNode) -> StoreResult<NodeRecord> {
        let config_json = node.config.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO nodes (prover_id, name, node_type, status, config, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&node.prover_id)
        .bind(&node.name)
        .bind(node.node_type.as_str())
        .bind(NodeStatus::Stopped.as_str())
        .bind(&config_json)
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Created node {} ({})", id, node.prover_id);

        self.get_node(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_node(&self, id: i64, update: &NodeUpdate) -> StoreResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        // Every column touched here is stored as text
        let mut assignments: Vec<(&str, Option<String>)> = Vec::new();
        if let Some(name) = &update.name {
            assignments.push(("name", Some(name.clone())));
        }
        if let Some(status) = update.status {
            assignments.push(("status", Some(status.as_str().to_string())));
        }
        if let Some(config) = &update.config {
            assignments.push((
                "config",
                config.as_ref().map(serde_json::to_string).transpose()?,
            ));
        }
        if let Some(last_seen) = update.last_seen {
            assignments.push(("last_seen", last_seen.map(timestamp)));
        }
        if let Some(errors) = &update.errors {
            assignments.push(("errors", errors.clone()));
        }
        if let Some(container_name) = &update.container_name {
            assignments.push(("container_name", container_name.clone()));
        }
        if let Some(container_id) = &update.container_id {
            assignments.push(("container_id", container_id.clone()));
        }

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "UPDATE nodes SET {} WHERE id = ?{}",
            set_clause,
            assignments.len() + 1
        );

        let mut q = sqlx::query(&query);
        for (_, value) in &assignments {
            q = q.bind(value.clone());
        }
        let result = q.bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_node(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM metrics WHERE node_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM notifications WHERE node_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM nodes WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_notification(
        &self,
        node_id: Option<i64>,
        notification: &NewNotification,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (node_id, type, title, message, is_read, timestamp)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(node_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_notifications(
        &self,
        node_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let rows = match node_id {
            Some(node_id) => {
                sqlx::query(
                    "SELECT id, node_id, type, title, message, is_read, timestamp
                     FROM notifications WHERE node_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT ?2",
                )
                .bind(node_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, node_id, type, title, message, is_read, timestamp
                     FROM notifications ORDER BY timestamp DESC, id DESC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|row| self.row_to_notification(row))
            .collect()
    }

    async fn add_metric(&self, node_id: i64, sample: &MetricSample) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO metrics (
                node_id, nex_points, tasks_completed, cpu_usage, memory_usage,
                uptime, block_height, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(node_id)
        .bind(sample.nex_points)
        .bind(sample.tasks_completed)
        .bind(sample.cpu_usage)
        .bind(sample.memory_usage)
        .bind(&sample.uptime)
        .bind(sample.block_height)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_metrics(&self, node_id: i64, limit: i64) -> StoreResult<Vec<MetricRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, node_id, nex_points, tasks_completed, cpu_usage, memory_usage,
                   uptime, block_height, timestamp
            FROM metrics
            WHERE node_id = ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(node_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_metric(row)).collect()
    }

    async fn clean_old_metrics(&self, days: u32) -> StoreResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let result = sqlx::query("DELETE FROM metrics WHERE timestamp < ?1")
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("Removed {} metric samples older than {} days", removed, days);
        }
        Ok(removed)
    }
}
