use std::future::Future;
use std::net::SocketAddr;

use roster_core::{GossipError, Member, Query, QueryParams, QueryResponse, Tags, UserEvent};
use tokio::sync::mpsc;

/// Raw events emitted by a gossip engine, in delivery order.
///
/// Engines may grow new kinds over time, so consumers outside this crate
/// cannot match exhaustively.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineEvent {
    MemberJoin(Vec<Member>),
    MemberLeave(Vec<Member>),
    MemberFailed(Vec<Member>),
    MemberUpdate(Vec<Member>),
    MemberReap(Vec<Member>),
    User(UserEvent),
    Query(Query),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::MemberJoin(_) => "member-join",
            EngineEvent::MemberLeave(_) => "member-leave",
            EngineEvent::MemberFailed(_) => "member-failed",
            EngineEvent::MemberUpdate(_) => "member-update",
            EngineEvent::MemberReap(_) => "member-reap",
            EngineEvent::User(_) => "user",
            EngineEvent::Query(_) => "query",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub node_name: String,
    pub tags: Tags,
}

/// Starts gossip engines. The engine owns `events` and drops it on shutdown,
/// which is how consumers observe the end of the stream.
pub trait EngineFactory: Send + Sync {
    type Engine: GossipEngine;

    fn create(
        &self,
        config: EngineConfig,
        events: EventSender,
    ) -> impl Future<Output = Result<Self::Engine, GossipError>> + Send;
}

/// Membership, failure detection and dissemination for one local node.
pub trait GossipEngine: Send + Sync + 'static {
    /// Contact the given seeds, returning how many were reached.
    fn join(
        &self,
        seeds: &[String],
        ignore_old: bool,
    ) -> impl Future<Output = Result<usize, GossipError>> + Send;

    /// Broadcast intent to leave, then stop participating.
    fn leave(&self) -> impl Future<Output = Result<(), GossipError>> + Send;

    fn members(&self) -> impl Future<Output = Vec<Member>> + Send;

    fn local_member(&self) -> impl Future<Output = Member> + Send;

    /// Replace the local tags and gossip a member-update.
    fn set_tags(&self, tags: Tags) -> impl Future<Output = Result<(), GossipError>> + Send;

    fn user_event(
        &self,
        name: &str,
        payload: Vec<u8>,
        coalesce: bool,
    ) -> impl Future<Output = Result<(), GossipError>> + Send;

    fn query(
        &self,
        name: &str,
        payload: Vec<u8>,
        params: QueryParams,
    ) -> impl Future<Output = Result<QueryResponse, GossipError>> + Send;

    /// Stop the engine and close its event stream. Safe to call more than once.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}
