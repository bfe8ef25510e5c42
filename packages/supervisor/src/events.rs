// ABOUTME: Live update channel broadcasting node lifecycle transitions to subscribers
// ABOUTME: Subscriptions may filter by event type and keep working after lagging behind

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveUpdateKind {
    NodeStarted,
    NodeStopped,
    DockerNodeStarted,
    DockerNodeStopped,
    NodeCreated,
    NodeDeleted,
}

impl LiveUpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveUpdateKind::NodeStarted => "nodeStarted",
            LiveUpdateKind::NodeStopped => "nodeStopped",
            LiveUpdateKind::DockerNodeStarted => "dockerNodeStarted",
            LiveUpdateKind::DockerNodeStopped => "dockerNodeStopped",
            LiveUpdateKind::NodeCreated => "nodeCreated",
            LiveUpdateKind::NodeDeleted => "nodeDeleted",
        }
    }
}

/// Payload carried by every live update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEventData {
    pub id: i64,
    pub prover_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl NodeEventData {
    pub fn new(id: i64, prover_id: impl Into<String>) -> Self {
        Self {
            id,
            prover_id: prover_id.into(),
            container_name: None,
            container_id: None,
            pid: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    #[serde(rename = "type")]
    pub kind: LiveUpdateKind,
    pub data: NodeEventData,
    pub timestamp: DateTime<Utc>,
}

impl LiveUpdate {
    pub fn new(kind: LiveUpdateKind, data: NodeEventData) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out of lifecycle transitions
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LiveUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast an update; having no subscribers is not an error
    pub fn emit(&self, update: LiveUpdate) {
        debug!(
            "Live update {} for node {}",
            update.kind.as_str(),
            update.data.prover_id
        );
        if let Err(e) = self.sender.send(update) {
            if self.sender.receiver_count() > 0 {
                warn!("Failed to broadcast live update: {}", e);
            }
        }
    }

    /// Subscribe to updates; an empty filter receives every event type
    pub fn subscribe(&self, filter: impl IntoIterator<Item = LiveUpdateKind>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: filter.into_iter().collect(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<LiveUpdate>,
    filter: HashSet<LiveUpdateKind>,
}

impl Subscription {
    fn accepts(&self, kind: LiveUpdateKind) -> bool {
        self.filter.is_empty() || self.filter.contains(&kind)
    }

    /// Next matching update, or `None` once the bus is dropped
    pub async fn recv(&mut self) -> Option<LiveUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) if self.accepts(update.kind) => return Some(update),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Live update subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`]
    pub fn try_recv(&mut self) -> Option<LiveUpdate> {
        loop {
            match self.receiver.try_recv() {
                Ok(update) if self.accepts(update.kind) => return Some(update),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
