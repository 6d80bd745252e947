use std::future::Future;
use std::net::SocketAddr;
use std::sync::Mutex;

use roster_core::{
    GossipError, Member, MembershipConfig, Query, QueryParams, QueryResponse, Tags, UserEvent,
};
use roster_gossip::GossipEngine;
use roster_membership::Handler;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(3);
const EVENTUALLY_POLL: Duration = Duration::from_millis(25);

/// Poll `check` until it holds or three seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + EVENTUALLY_TIMEOUT;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EVENTUALLY_POLL).await;
    }
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn member(name: &str, port: u16) -> Member {
    Member::new(name, addr(port), Tags::new())
}

pub fn node_config(name: &str, port: u16, seeds: &[u16]) -> MembershipConfig {
    let bind_addr = addr(port).to_string();
    MembershipConfig {
        node_name: name.to_string(),
        tags: Tags::from([("rpc_addr".to_string(), bind_addr.clone())]),
        bind_addr,
        join_addrs: seeds.iter().map(|p| addr(*p).to_string()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Join(String),
    Leave(String),
    Update(String),
    Reap(String),
    User { name: String, payload: Vec<u8> },
    Query(String),
}

/// Handler double that reports every callback over a channel.
pub struct RecordingHandler {
    calls: mpsc::UnboundedSender<Call>,
    fail_on: Vec<&'static str>,
    response: Option<Vec<u8>>,
}

impl RecordingHandler {
    /// Record, then fail, every callback of this kind.
    pub fn failing_on(mut self, kind: &'static str) -> Self {
        self.fail_on.push(kind);
        self
    }

    pub fn responding(mut self, payload: &str) -> Self {
        self.response = Some(payload.as_bytes().to_vec());
        self
    }

    fn record(&self, kind: &'static str, call: Call) -> anyhow::Result<()> {
        let _ = self.calls.send(call);
        if self.fail_on.contains(&kind) {
            anyhow::bail!("{kind} callback failed");
        }
        Ok(())
    }
}

impl Handler for RecordingHandler {
    fn join(&self, member: &Member) -> anyhow::Result<()> {
        self.record("join", Call::Join(member.name.clone()))
    }

    fn leave(&self, member: &Member) -> anyhow::Result<()> {
        self.record("leave", Call::Leave(member.name.clone()))
    }

    fn update(&self, member: &Member) -> anyhow::Result<()> {
        self.record("update", Call::Update(member.name.clone()))
    }

    fn reap(&self, member: &Member) -> anyhow::Result<()> {
        self.record("reap", Call::Reap(member.name.clone()))
    }

    fn user(&self, event: &UserEvent) -> anyhow::Result<()> {
        self.record(
            "user",
            Call::User {
                name: event.name.clone(),
                payload: event.payload.clone(),
            },
        )
    }

    fn query(&self, query: &Query) -> anyhow::Result<()> {
        if let Some(payload) = &self.response {
            query.respond(payload.clone())?;
        }
        self.record("query", Call::Query(query.name.clone()))
    }
}

/// Test-side end of a [`RecordingHandler`].
pub struct Recorder {
    rx: Mutex<mpsc::UnboundedReceiver<Call>>,
    seen: Mutex<Vec<Call>>,
}

pub fn recorder() -> (RecordingHandler, Recorder) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = RecordingHandler {
        calls: tx,
        fail_on: vec![],
        response: None,
    };
    let recorder = Recorder {
        rx: Mutex::new(rx),
        seen: Mutex::new(vec![]),
    };
    (handler, recorder)
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        let mut rx = self.rx.lock().unwrap();
        let mut seen = self.seen.lock().unwrap();
        while let Ok(call) = rx.try_recv() {
            seen.push(call);
        }
        seen.clone()
    }

    pub fn joins(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Join(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn leaves(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Leave(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn reaps(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Reap(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn users(&self) -> Vec<(String, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::User { name, payload } => Some((name, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Query(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

/// Engine double that only knows its own identity.
pub struct StubEngine {
    local: Member,
}

impl StubEngine {
    pub fn new(name: &str) -> Self {
        Self {
            local: member(name, 7000),
        }
    }
}

impl GossipEngine for StubEngine {
    async fn join(&self, _seeds: &[String], _ignore_old: bool) -> Result<usize, GossipError> {
        Ok(0)
    }

    async fn leave(&self) -> Result<(), GossipError> {
        Ok(())
    }

    async fn members(&self) -> Vec<Member> {
        vec![self.local.clone()]
    }

    async fn local_member(&self) -> Member {
        self.local.clone()
    }

    async fn set_tags(&self, _tags: Tags) -> Result<(), GossipError> {
        Ok(())
    }

    async fn user_event(
        &self,
        _name: &str,
        _payload: Vec<u8>,
        _coalesce: bool,
    ) -> Result<(), GossipError> {
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        _payload: Vec<u8>,
        _params: QueryParams,
    ) -> Result<QueryResponse, GossipError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(QueryResponse::new(name, Instant::now(), rx))
    }

    async fn shutdown(&self) {}
}
