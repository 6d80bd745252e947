use roster_core::{Member, Query, UserEvent};
use roster_gossip::EngineEvent;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberEventKind {
    Join,
    Leave,
    Failed,
    Update,
    Reap,
}

impl MemberEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberEventKind::Join => "join",
            MemberEventKind::Leave => "leave",
            MemberEventKind::Failed => "failed",
            MemberEventKind::Update => "update",
            MemberEventKind::Reap => "reap",
        }
    }

    /// Leave and Failed both mean the member is gone from the live cluster.
    pub fn is_departure(&self) -> bool {
        matches!(self, MemberEventKind::Leave | MemberEventKind::Failed)
    }
}

/// A raw engine event, classified for dispatch.
#[derive(Debug)]
pub enum MembershipEvent {
    /// Members are in the order the engine batched them.
    Member {
        kind: MemberEventKind,
        members: Vec<Member>,
    },
    User(UserEvent),
    Query(Query),
}

impl MembershipEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipEvent::Member { kind, .. } => kind.as_str(),
            MembershipEvent::User(_) => "user",
            MembershipEvent::Query(_) => "query",
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown gossip event kind: {0}")]
pub struct UnknownEventKind(pub String);

pub fn classify(event: EngineEvent) -> Result<MembershipEvent, UnknownEventKind> {
    let member = |kind, members| MembershipEvent::Member { kind, members };

    let event = match event {
        EngineEvent::MemberJoin(members) => member(MemberEventKind::Join, members),
        EngineEvent::MemberLeave(members) => member(MemberEventKind::Leave, members),
        EngineEvent::MemberFailed(members) => member(MemberEventKind::Failed, members),
        EngineEvent::MemberUpdate(members) => member(MemberEventKind::Update, members),
        EngineEvent::MemberReap(members) => member(MemberEventKind::Reap, members),
        EngineEvent::User(user) => MembershipEvent::User(user),
        EngineEvent::Query(query) => MembershipEvent::Query(query),
        other => return Err(UnknownEventKind(format!("{other:?}"))),
    };

    Ok(event)
}
