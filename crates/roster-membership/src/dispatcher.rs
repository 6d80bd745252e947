use std::ops::ControlFlow;
use std::sync::Arc;

use roster_core::Member;
use roster_gossip::{EventReceiver, GossipEngine};
use tracing::{debug, error, info};

use crate::classify::{MemberEventKind, MembershipEvent, classify};
use crate::handler::Handler;

/// Delivers classified events to the application's [`Handler`].
///
/// Events about the local node are filtered: joins, updates and reaps of
/// ourselves are echoes of our own state and are skipped, while a leave or
/// failure of ourselves ends dispatching altogether.
pub struct Dispatcher<E> {
    engine: Arc<E>,
    handler: Arc<dyn Handler>,
}

impl<E: GossipEngine> Dispatcher<E> {
    pub fn new(engine: Arc<E>, handler: Arc<dyn Handler>) -> Self {
        Self { engine, handler }
    }

    /// Drain `events` until the stream closes or the local node departs.
    ///
    /// Panics on an event kind it cannot classify: carrying on would leave the
    /// application with a membership view that silently diverges from the
    /// engine's.
    pub async fn run(self, mut events: EventReceiver) {
        while let Some(raw) = events.recv().await {
            let event = match classify(raw) {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "Cannot classify gossip event");
                    panic!("{e}");
                }
            };

            if self.dispatch(event).await.is_break() {
                roster_core::metrics::record_local_departure();
                // TODO: give handlers an explicit shutdown callback instead of going quiet.
                info!("Local node departed the cluster, stopping event dispatch");
                return;
            }
        }

        info!("Gossip event stream closed");
    }

    /// Deliver one event. Breaks when the event reports the local node
    /// leaving or failing; members after it in the same batch are not
    /// delivered.
    pub async fn dispatch(&self, event: MembershipEvent) -> ControlFlow<()> {
        match event {
            MembershipEvent::Member { kind, members } => {
                let local = self.engine.local_member().await;
                for member in &members {
                    if member.name == local.name {
                        if kind.is_departure() {
                            return ControlFlow::Break(());
                        }
                        debug!(kind = kind.as_str(), "Skipping event about local node");
                        continue;
                    }
                    self.deliver(kind, member);
                }
            }
            MembershipEvent::User(event) => {
                let result = self.handler.user(&event);
                self.report("user", &event.name, result);
            }
            MembershipEvent::Query(query) => {
                let result = self.handler.query(&query);
                self.report("query", &query.name, result);
            }
        }

        ControlFlow::Continue(())
    }

    fn deliver(&self, kind: MemberEventKind, member: &Member) {
        let result = match kind {
            MemberEventKind::Join => self.handler.join(member),
            MemberEventKind::Leave | MemberEventKind::Failed => self.handler.leave(member),
            MemberEventKind::Update => self.handler.update(member),
            MemberEventKind::Reap => self.handler.reap(member),
        };
        self.report(kind.as_str(), &member.name, result);
    }

    fn report(&self, kind: &'static str, name: &str, result: anyhow::Result<()>) {
        roster_core::metrics::record_event_dispatched(kind);

        if let Err(e) = result {
            roster_core::metrics::record_handler_error(kind);
            let cause = format!("{e:#}");
            error!(kind, name = %name, error = %cause, "Handler failed to process {kind} event");
        }
    }
}
