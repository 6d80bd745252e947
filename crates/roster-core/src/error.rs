use std::net::SocketAddr;

use thiserror::Error;

/// Failures reported by a gossip engine.
#[derive(Debug, Error)]
pub enum GossipError {
    #[error("Address already in use: {0}")]
    AddrInUse(SocketAddr),

    #[error("Invalid node name: {0:?}")]
    InvalidNodeName(String),

    #[error("None of the seed addresses are reachable: {0:?}")]
    NoSeedsReachable(Vec<String>),

    #[error("Node name {name} is already alive at {addr}")]
    NameConflict { name: String, addr: SocketAddr },

    #[error("Gossip engine is not running")]
    NotRunning,

    #[error("Payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Timed out waiting to {0}")]
    Timeout(&'static str),
}

/// Errors surfaced by the membership facade.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Invalid bind address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Failed to create gossip engine: {0}")]
    EngineCreateFailed(#[source] GossipError),

    #[error("Failed to join cluster: {0}")]
    JoinFailed(#[source] GossipError),

    #[error("Failed to leave cluster: {0}")]
    LeaveFailed(#[source] GossipError),

    #[error("Gossip error: {0}")]
    Gossip(#[from] GossipError),
}

/// Errors returned when answering a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespondError {
    #[error("Response already sent")]
    AlreadyResponded,

    #[error("Response is past the query deadline")]
    DeadlineExceeded,

    #[error("Querying node is no longer listening")]
    QuerierGone,
}
