use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::RespondError;
use crate::types::{Member, Tags};

/// One reply to a query, tagged with the responding node's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResponse {
    pub from: String,
    pub payload: Vec<u8>,
}

/// Targeting and timing options for a cluster query.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Only these nodes receive the query. Empty means every alive member.
    pub filter_nodes: Vec<String>,
    /// Every listed tag must match exactly for a member to receive the query.
    pub filter_tags: Tags,
    /// Overrides the engine's default query timeout.
    pub timeout: Option<Duration>,
}

impl QueryParams {
    pub fn accepts(&self, member: &Member) -> bool {
        if !self.filter_nodes.is_empty() && !self.filter_nodes.iter().any(|n| n == &member.name) {
            return false;
        }
        self.filter_tags
            .iter()
            .all(|(k, v)| member.tags.get(k) == Some(v))
    }
}

/// A query as delivered to one recipient, carrying its response handle.
///
/// The handle permits a single reply before the deadline.
#[derive(Debug)]
pub struct Query {
    pub ltime: u64,
    pub name: String,
    pub payload: Vec<u8>,
    /// Name of the node that issued the query.
    pub source: String,
    recipient: String,
    deadline: Instant,
    response_tx: mpsc::UnboundedSender<NodeResponse>,
    responded: AtomicBool,
}

impl Query {
    pub fn new(
        ltime: u64,
        name: impl Into<String>,
        payload: Vec<u8>,
        source: impl Into<String>,
        recipient: impl Into<String>,
        deadline: Instant,
        response_tx: mpsc::UnboundedSender<NodeResponse>,
    ) -> Self {
        Self {
            ltime,
            name: name.into(),
            payload,
            source: source.into(),
            recipient: recipient.into(),
            deadline,
            response_tx,
            responded: AtomicBool::new(false),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// Send this node's reply back to the querier.
    pub fn respond(&self, payload: impl Into<Vec<u8>>) -> Result<(), RespondError> {
        if self.has_responded() {
            return Err(RespondError::AlreadyResponded);
        }
        if Instant::now() > self.deadline {
            return Err(RespondError::DeadlineExceeded);
        }
        if self.responded.swap(true, Ordering::AcqRel) {
            return Err(RespondError::AlreadyResponded);
        }

        self.response_tx
            .send(NodeResponse {
                from: self.recipient.clone(),
                payload: payload.into(),
            })
            .map_err(|_| RespondError::QuerierGone)
    }
}

/// The querier's side of a query: replies arrive until the deadline passes or
/// every recipient has dropped its copy of the query.
#[derive(Debug)]
pub struct QueryResponse {
    name: String,
    deadline: Instant,
    response_rx: mpsc::UnboundedReceiver<NodeResponse>,
}

impl QueryResponse {
    pub fn new(
        name: impl Into<String>,
        deadline: Instant,
        response_rx: mpsc::UnboundedReceiver<NodeResponse>,
    ) -> Self {
        Self {
            name: name.into(),
            deadline,
            response_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub async fn recv(&mut self) -> Option<NodeResponse> {
        tokio::time::timeout_at(self.deadline, self.response_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for all replies.
    pub async fn collect(mut self) -> Vec<NodeResponse> {
        let mut responses = Vec::new();
        while let Some(response) = self.recv().await {
            responses.push(response);
        }
        responses
    }
}
