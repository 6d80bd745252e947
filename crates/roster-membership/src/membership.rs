use std::net::SocketAddr;
use std::sync::Arc;

use roster_core::{
    Member, MembershipConfig, MembershipError, QueryParams, QueryResponse, Tags,
};
use roster_gossip::{EngineConfig, EngineFactory, GossipEngine};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, dispatcher, info, info_span, warn};

use crate::dispatcher::Dispatcher;
use crate::handler::Handler;

/// Builder for a [`Membership`].
pub struct MembershipBuilder {
    config: MembershipConfig,
    handler: Arc<dyn Handler>,
    logger: Option<Dispatch>,
    ignore_old: bool,
}

impl MembershipBuilder {
    pub fn new(config: MembershipConfig, handler: impl Handler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            logger: None,
            ignore_old: true,
        }
    }

    /// Where this membership's diagnostics go. Without one they are discarded.
    pub fn logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Whether user events buffered by the seeds are replayed on join.
    pub fn ignore_old(mut self, ignore_old: bool) -> Self {
        self.ignore_old = ignore_old;
        self
    }

    pub async fn start<F: EngineFactory>(
        self,
        factory: &F,
    ) -> Result<Membership<F::Engine>, MembershipError> {
        let logger = self.logger.unwrap_or_else(Dispatch::none);
        let bind_addr = resolve_bind_addr(&self.config.bind_addr).await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = factory
            .create(
                EngineConfig {
                    bind_addr,
                    node_name: self.config.node_name.clone(),
                    tags: self.config.tags.clone(),
                },
                event_tx,
            )
            .with_subscriber(logger.clone())
            .await
            .map_err(MembershipError::EngineCreateFailed)?;
        let engine = Arc::new(engine);

        // Dispatch must be running before the join so join events are not missed.
        let span = dispatcher::with_default(&logger, || {
            info_span!("membership", node = %self.config.node_name)
        });
        let task = tokio::spawn(
            Dispatcher::new(engine.clone(), self.handler)
                .run(event_rx)
                .instrument(span)
                .with_subscriber(logger.clone()),
        );

        let membership = Membership {
            config: self.config,
            engine,
            logger,
            task,
        };

        if !membership.config.join_addrs.is_empty() {
            let joined = membership
                .engine
                .join(&membership.config.join_addrs, self.ignore_old)
                .with_subscriber(membership.logger.clone())
                .await;
            match joined {
                Ok(contacted) => membership.log(|| {
                    info!(
                        node = %membership.config.node_name,
                        contacted,
                        "Joined cluster"
                    )
                }),
                Err(e) => {
                    membership.log(|| {
                        warn!(
                            node = %membership.config.node_name,
                            seeds = ?membership.config.join_addrs,
                            error = %e,
                            "Failed to join cluster"
                        )
                    });
                    membership.shutdown().await;
                    return Err(MembershipError::JoinFailed(e));
                }
            }
        }

        Ok(membership)
    }
}

/// A node's membership in a cluster: owns the gossip engine and the
/// background task that feeds engine events to the [`Handler`].
///
/// Call [`Membership::shutdown`] to stop the engine and wait for the task.
/// Dropping a `Membership` without it leaves the engine bound and its
/// background tasks running.
pub struct Membership<E: GossipEngine> {
    config: MembershipConfig,
    engine: Arc<E>,
    logger: Dispatch,
    task: JoinHandle<()>,
}

impl<E: GossipEngine> Membership<E> {
    /// Start with diagnostics discarded. See [`MembershipBuilder`] for options.
    pub async fn start<F>(
        config: MembershipConfig,
        handler: impl Handler,
        factory: &F,
    ) -> Result<Self, MembershipError>
    where
        F: EngineFactory<Engine = E>,
    {
        MembershipBuilder::new(config, handler).start(factory).await
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Live snapshot from the engine, in the engine's order.
    pub async fn members(&self) -> Vec<Member> {
        self.engine.members().await
    }

    pub async fn local_member(&self) -> Member {
        self.engine.local_member().await
    }

    /// Gracefully leave the cluster. Peers see this node as left rather than
    /// failed, and local event dispatch stops.
    pub async fn leave(&self) -> Result<(), MembershipError> {
        self.engine
            .leave()
            .with_subscriber(self.logger.clone())
            .await
            .map_err(|e| {
                self.log(|| warn!(node = %self.config.node_name, error = %e, "Failed to leave cluster"));
                MembershipError::LeaveFailed(e)
            })
    }

    pub async fn set_tags(&self, tags: Tags) -> Result<(), MembershipError> {
        Ok(self.engine.set_tags(tags).await?)
    }

    pub async fn user_event(
        &self,
        name: &str,
        payload: impl Into<Vec<u8>>,
        coalesce: bool,
    ) -> Result<(), MembershipError> {
        Ok(self.engine.user_event(name, payload.into(), coalesce).await?)
    }

    pub async fn query(
        &self,
        name: &str,
        payload: impl Into<Vec<u8>>,
        params: QueryParams,
    ) -> Result<QueryResponse, MembershipError> {
        Ok(self.engine.query(name, payload.into(), params).await?)
    }

    /// False once the event stream has closed or the local node departed.
    pub fn is_dispatching(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the engine, which closes the event stream, then wait for the
    /// dispatch task to drain it. A panic in the dispatch task is re-raised.
    pub async fn shutdown(self) {
        let Membership {
            config,
            engine,
            logger,
            task,
        } = self;

        engine.shutdown().with_subscriber(logger.clone()).await;
        let result = task.await;
        dispatcher::with_default(&logger, || {
            info!(node = %config.node_name, "Membership shut down")
        });

        if let Err(e) = result
            && e.is_panic()
        {
            std::panic::resume_unwind(e.into_panic());
        }
    }

    fn log(&self, f: impl FnOnce()) {
        dispatcher::with_default(&self.logger, f);
    }
}

/// A bare `:port` binds every interface.
async fn resolve_bind_addr(addr: &str) -> Result<SocketAddr, MembershipError> {
    let invalid = |reason: String| MembershipError::InvalidAddress {
        addr: addr.to_string(),
        reason,
    };

    let host_port = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };
    let mut resolved = tokio::net::lookup_host(host_port)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    resolved
        .next()
        .ok_or_else(|| invalid("no addresses resolved".to_string()))
}
