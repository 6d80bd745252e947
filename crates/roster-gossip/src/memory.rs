use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use roster_core::{
    GossipConfig, GossipError, Member, MemberStatus, Query, QueryParams, QueryResponse, Tags,
    UserEvent,
};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::{EngineConfig, EngineEvent, EngineFactory, EventSender, GossipEngine};
use crate::reaper;

const USER_EVENT_SIZE_LIMIT: usize = 512;
const QUERY_SIZE_LIMIT: usize = 1024;

struct MemberRecord {
    member: Member,
    changed_at: Instant,
}

/// One node's private state: its own view of the cluster plus its event sink.
struct NodeState {
    name: String,
    view: Vec<MemberRecord>,
    events: EventSender,
    ltime: u64,
    recent_events: VecDeque<UserEvent>,
    left: bool,
}

impl NodeState {
    fn new(local: Member, events: EventSender) -> Self {
        Self {
            name: local.name.clone(),
            view: vec![MemberRecord {
                member: local,
                changed_at: Instant::now(),
            }],
            events,
            ltime: 0,
            recent_events: VecDeque::new(),
            left: false,
        }
    }

    fn find(&self, name: &str) -> Option<&Member> {
        self.view
            .iter()
            .map(|r| &r.member)
            .find(|m| m.name == name)
    }

    fn local(&self) -> Option<&Member> {
        self.find(&self.name)
    }

    fn snapshot(&self) -> Vec<Member> {
        self.view.iter().map(|r| r.member.clone()).collect()
    }

    fn alive_members(&self) -> impl Iterator<Item = &Member> {
        self.view.iter().map(|r| &r.member).filter(|m| m.is_alive())
    }

    fn alive_addrs(&self) -> Vec<SocketAddr> {
        self.alive_members().map(|m| m.addr).collect()
    }

    /// Record `member` as alive. Returns true if this is news to the node,
    /// including a departed name coming back as a new incarnation.
    fn learn(&mut self, member: &Member) -> bool {
        match self.view.iter_mut().find(|r| r.member.name == member.name) {
            Some(record) if record.member.is_alive() => false,
            Some(record) => {
                record.member = member.clone();
                record.member.status = MemberStatus::Alive;
                record.changed_at = Instant::now();
                true
            }
            None => {
                let mut member = member.clone();
                member.status = MemberStatus::Alive;
                self.view.push(MemberRecord {
                    member,
                    changed_at: Instant::now(),
                });
                true
            }
        }
    }

    /// Names are only unique among live members, so the address must match too.
    fn set_status(
        &mut self,
        name: &str,
        addr: SocketAddr,
        status: MemberStatus,
    ) -> Option<Member> {
        let record = self.view.iter_mut().find(|r| {
            r.member.name == name && r.member.addr == addr && !r.member.status.is_departed()
        })?;
        record.member.status = status;
        record.changed_at = Instant::now();
        Some(record.member.clone())
    }

    fn set_tags(&mut self, name: &str, addr: SocketAddr, tags: &Tags) -> Option<Member> {
        let record = self
            .view
            .iter_mut()
            .find(|r| r.member.name == name && r.member.addr == addr && r.member.is_alive())?;
        record.member.tags = tags.clone();
        Some(record.member.clone())
    }

    fn observe_ltime(&mut self, ltime: u64) {
        self.ltime = self.ltime.max(ltime);
    }

    fn remember(&mut self, event: &UserEvent, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.recent_events.len() >= capacity {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event.clone());
    }

    fn reap(&mut self, tombstone: Duration) -> Vec<Member> {
        let now = Instant::now();
        let local = self.name.clone();
        let mut reaped = Vec::new();
        self.view.retain(|r| {
            let expired = r.member.name != local
                && r.member.status.is_departed()
                && now.duration_since(r.changed_at) >= tombstone;
            if expired {
                reaped.push(r.member.clone());
            }
            !expired
        });
        reaped
    }

    fn emit(&self, event: EngineEvent) {
        if !matches!(event, EngineEvent::User(_) | EngineEvent::Query(_)) {
            roster_core::metrics::set_alive_members(
                &self.name,
                self.alive_members().count() as f64,
            );
        }
        // The receiver is gone once the local dispatch loop has stopped.
        let _ = self.events.send(event);
    }
}

/// An in-process gossip network. Every node created on it gets its own view
/// of the cluster; views converge immediately on join, leave and shutdown.
///
/// Used by tests and the simulator in place of a real transport.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<SocketAddr, NodeState>>>,
    config: GossipConfig,
}

impl MemoryNetwork {
    pub fn new(config: GossipConfig) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub async fn is_bound(&self, addr: SocketAddr) -> bool {
        self.nodes.read().await.contains_key(&addr)
    }

    /// Drop a node without a graceful leave, as if its process died. Peers
    /// that still saw it alive mark it failed.
    pub async fn crash(&self, addr: SocketAddr) -> bool {
        self.remove(addr, None).await
    }

    async fn remove(&self, addr: SocketAddr, name: Option<&str>) -> bool {
        let mut nodes = self.nodes.write().await;
        let matches = nodes
            .get(&addr)
            .is_some_and(|s| name.is_none_or(|n| s.name == n));
        if !matches {
            return false;
        }
        let Some(removed) = nodes.remove(&addr) else {
            return false;
        };

        if !removed.left {
            for state in nodes.values_mut() {
                if let Some(failed) = state.set_status(&removed.name, addr, MemberStatus::Failed) {
                    state.emit(EngineEvent::MemberFailed(vec![failed]));
                }
            }
        }

        info!(node = %removed.name, addr = %addr, left = removed.left, "Node removed from network");
        true
    }

    /// Returns false once the node is no longer bound, which stops its reaper.
    pub(crate) async fn reap(&self, addr: SocketAddr, name: &str) -> bool {
        let mut nodes = self.nodes.write().await;
        let Some(state) = nodes.get_mut(&addr).filter(|s| s.name == name) else {
            return false;
        };

        let reaped = state.reap(self.config.tombstone_timeout());
        if !reaped.is_empty() {
            debug!(node = %name, count = reaped.len(), "Reaped departed members");
            state.emit(EngineEvent::MemberReap(reaped));
        }
        true
    }

    fn merge(
        &self,
        nodes: &mut HashMap<SocketAddr, NodeState>,
        joiner: SocketAddr,
        seed: SocketAddr,
        ignore_old: bool,
    ) -> Result<(), GossipError> {
        let seed_state = nodes
            .get(&seed)
            .filter(|s| !s.left)
            .ok_or_else(|| GossipError::NoSeedsReachable(vec![seed.to_string()]))?;
        let joiner_state = nodes.get(&joiner).ok_or(GossipError::NotRunning)?;
        let joiner_local = joiner_state.local().cloned().ok_or(GossipError::NotRunning)?;

        if let Some(existing) = seed_state.find(&joiner_local.name)
            && existing.is_alive()
            && existing.addr != joiner
        {
            let addr = existing.addr;
            return Err(GossipError::NameConflict {
                name: joiner_local.name,
                addr,
            });
        }

        let mut cluster: Vec<SocketAddr> = Vec::new();
        for addr in seed_state
            .alive_addrs()
            .into_iter()
            .chain(joiner_state.alive_addrs())
        {
            if !cluster.contains(&addr) && nodes.get(&addr).is_some_and(|s| !s.left) {
                cluster.push(addr);
            }
        }

        let locals: Vec<Member> = cluster
            .iter()
            .filter_map(|addr| nodes.get(addr).and_then(|s| s.local().cloned()))
            .collect();
        let seed_ltime = seed_state.ltime;
        let replay: Vec<UserEvent> = if ignore_old {
            Vec::new()
        } else {
            seed_state.recent_events.iter().cloned().collect()
        };

        for addr in &cluster {
            if let Some(state) = nodes.get_mut(addr) {
                let learned: Vec<Member> = locals
                    .iter()
                    .filter(|m| state.learn(m))
                    .cloned()
                    .collect();
                if !learned.is_empty() {
                    debug!(node = %state.name, count = learned.len(), "Learned new members");
                    state.emit(EngineEvent::MemberJoin(learned));
                }
            }
        }

        if let Some(state) = nodes.get_mut(&joiner) {
            state.observe_ltime(seed_ltime);
            for event in replay {
                if !state.recent_events.contains(&event) {
                    state.remember(&event, self.config.event_buffer_size);
                    state.emit(EngineEvent::User(event));
                }
            }
        }

        Ok(())
    }
}

impl EngineFactory for MemoryNetwork {
    type Engine = MemoryEngine;

    async fn create(
        &self,
        config: EngineConfig,
        events: EventSender,
    ) -> Result<MemoryEngine, GossipError> {
        if config.node_name.trim().is_empty() {
            return Err(GossipError::InvalidNodeName(config.node_name));
        }

        let addr = config.bind_addr;
        {
            let mut nodes = self.nodes.write().await;
            if nodes.contains_key(&addr) {
                return Err(GossipError::AddrInUse(addr));
            }

            let local = Member::new(config.node_name.clone(), addr, config.tags);
            let state = NodeState::new(local.clone(), events);
            state.emit(EngineEvent::MemberJoin(vec![local]));
            nodes.insert(addr, state);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(reaper::run_reaper(
            self.clone(),
            addr,
            config.node_name.clone(),
            shutdown_rx,
        ));

        info!(node = %config.node_name, addr = %addr, "Gossip engine started");

        Ok(MemoryEngine {
            addr,
            name: config.node_name,
            network: self.clone(),
            shutdown_tx,
        })
    }
}

/// Handle to one node on a [`MemoryNetwork`].
pub struct MemoryEngine {
    addr: SocketAddr,
    name: String,
    network: MemoryNetwork,
    shutdown_tx: watch::Sender<bool>,
}

impl MemoryEngine {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    fn local_state<'a>(
        &self,
        nodes: &'a mut HashMap<SocketAddr, NodeState>,
    ) -> Result<&'a mut NodeState, GossipError> {
        nodes
            .get_mut(&self.addr)
            .filter(|s| s.name == self.name && !s.left)
            .ok_or(GossipError::NotRunning)
    }
}

impl GossipEngine for MemoryEngine {
    async fn join(&self, seeds: &[String], ignore_old: bool) -> Result<usize, GossipError> {
        let mut nodes = self.network.nodes.write().await;
        self.local_state(&mut nodes)?;

        let mut contacted = 0;
        let mut last_err = None;
        for seed in seeds {
            let seed_addr: SocketAddr = match seed.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(seed = %seed, error = %e, "Ignoring unparseable seed address");
                    continue;
                }
            };
            if seed_addr == self.addr {
                contacted += 1;
                continue;
            }

            match self
                .network
                .merge(&mut nodes, self.addr, seed_addr, ignore_old)
            {
                Ok(()) => contacted += 1,
                Err(e) => {
                    warn!(node = %self.name, seed = %seed, error = %e, "Failed to contact seed");
                    last_err = Some(e);
                }
            }
        }

        if contacted == 0 {
            return match last_err {
                Some(e @ GossipError::NameConflict { .. }) => Err(e),
                _ => Err(GossipError::NoSeedsReachable(seeds.to_vec())),
            };
        }

        info!(node = %self.name, contacted, "Joined cluster");
        Ok(contacted)
    }

    async fn leave(&self) -> Result<(), GossipError> {
        let mut nodes = tokio::time::timeout(
            self.network.config.leave_timeout(),
            self.network.nodes.write(),
        )
        .await
        .map_err(|_| GossipError::Timeout("broadcast leave intent"))?;

        let me = self.local_state(&mut nodes)?;
        me.left = true;
        let peers: Vec<SocketAddr> = me
            .alive_addrs()
            .into_iter()
            .filter(|addr| *addr != self.addr)
            .collect();
        if let Some(departed) = me.set_status(&self.name, self.addr, MemberStatus::Left) {
            me.emit(EngineEvent::MemberLeave(vec![departed]));
        }

        for addr in peers {
            if let Some(state) = nodes.get_mut(&addr)
                && let Some(departed) = state.set_status(&self.name, self.addr, MemberStatus::Left)
            {
                state.emit(EngineEvent::MemberLeave(vec![departed]));
            }
        }

        info!(node = %self.name, "Left cluster");
        Ok(())
    }

    async fn members(&self) -> Vec<Member> {
        let nodes = self.network.nodes.read().await;
        nodes
            .get(&self.addr)
            .filter(|s| s.name == self.name)
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    async fn local_member(&self) -> Member {
        let nodes = self.network.nodes.read().await;
        nodes
            .get(&self.addr)
            .filter(|s| s.name == self.name)
            .and_then(|s| s.local().cloned())
            // No longer bound: report the node as gone.
            .unwrap_or_else(|| Member {
                name: self.name.clone(),
                addr: self.addr,
                tags: Tags::new(),
                status: MemberStatus::Left,
            })
    }

    async fn set_tags(&self, tags: Tags) -> Result<(), GossipError> {
        let mut nodes = self.network.nodes.write().await;
        let peers = self.local_state(&mut nodes)?.alive_addrs();

        for addr in peers {
            if let Some(state) = nodes.get_mut(&addr)
                && let Some(updated) = state.set_tags(&self.name, self.addr, &tags)
            {
                state.emit(EngineEvent::MemberUpdate(vec![updated]));
            }
        }

        debug!(node = %self.name, "Tags updated");
        Ok(())
    }

    async fn user_event(
        &self,
        name: &str,
        payload: Vec<u8>,
        coalesce: bool,
    ) -> Result<(), GossipError> {
        let size = name.len() + payload.len();
        if size > USER_EVENT_SIZE_LIMIT {
            return Err(GossipError::PayloadTooLarge {
                size,
                limit: USER_EVENT_SIZE_LIMIT,
            });
        }

        let mut nodes = self.network.nodes.write().await;
        let me = self.local_state(&mut nodes)?;
        me.ltime += 1;
        let event = UserEvent {
            ltime: me.ltime,
            name: name.to_string(),
            payload,
            coalesce,
        };
        let recipients = me.alive_addrs();

        let capacity = self.network.config.event_buffer_size;
        for addr in recipients {
            if let Some(state) = nodes.get_mut(&addr) {
                state.observe_ltime(event.ltime);
                state.remember(&event, capacity);
                state.emit(EngineEvent::User(event.clone()));
            }
        }

        debug!(node = %self.name, event = %name, ltime = event.ltime, "User event broadcast");
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        payload: Vec<u8>,
        params: QueryParams,
    ) -> Result<QueryResponse, GossipError> {
        let size = name.len() + payload.len();
        if size > QUERY_SIZE_LIMIT {
            return Err(GossipError::PayloadTooLarge {
                size,
                limit: QUERY_SIZE_LIMIT,
            });
        }

        let mut nodes = self.network.nodes.write().await;
        let me = self.local_state(&mut nodes)?;
        me.ltime += 1;
        let ltime = me.ltime;
        let recipients: Vec<Member> = me
            .alive_members()
            .filter(|m| params.accepts(m))
            .cloned()
            .collect();

        let timeout = params
            .timeout
            .unwrap_or_else(|| self.network.config.query_timeout());
        let deadline = Instant::now() + timeout;
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        for member in recipients {
            if let Some(state) = nodes.get_mut(&member.addr) {
                state.observe_ltime(ltime);
                state.emit(EngineEvent::Query(Query::new(
                    ltime,
                    name,
                    payload.clone(),
                    self.name.clone(),
                    member.name,
                    deadline,
                    response_tx.clone(),
                )));
            }
        }

        debug!(node = %self.name, query = %name, ltime, "Query issued");
        Ok(QueryResponse::new(name, deadline, response_rx))
    }

    async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if self.network.remove(self.addr, Some(&self.name)).await {
            info!(node = %self.name, "Gossip engine stopped");
        }
    }
}
