use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// Arbitrary key/value metadata gossiped with a member (e.g. `rpc_addr`).
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    Alive,
    /// Leave intent broadcast but not yet confirmed. Only engines with a real
    /// transport report it; `MemoryNetwork` delivers the intent atomically and
    /// goes straight to `Left`.
    Leaving,
    Left,
    Failed,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Leaving => "leaving",
            MemberStatus::Left => "left",
            MemberStatus::Failed => "failed",
        }
    }

    /// Left and Failed members are tombstones waiting to be reaped.
    pub fn is_departed(&self) -> bool {
        matches!(self, MemberStatus::Left | MemberStatus::Failed)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one cluster participant as seen by the gossip engine.
///
/// Snapshots are never refreshed in place; ask the engine again for a newer view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub addr: SocketAddr,
    pub tags: Tags,
    pub status: MemberStatus,
}

impl Member {
    pub fn new(name: impl Into<String>, addr: SocketAddr, tags: Tags) -> Self {
        Self {
            name: name.into(),
            addr,
            tags,
            status: MemberStatus::Alive,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_alive(&self) -> bool {
        self.status == MemberStatus::Alive
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.addr, self.status)
    }
}

/// A named broadcast delivered to every member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEvent {
    /// Lamport time assigned by the sender's engine.
    pub ltime: u64,
    pub name: String,
    pub payload: Vec<u8>,
    /// Reliable (coalescable, ordered) delivery when true, best-effort otherwise.
    pub coalesce: bool,
}

impl UserEvent {
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
