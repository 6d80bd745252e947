use std::sync::Arc;

use roster_core::{Member, Query, UserEvent};

/// Application callbacks for cluster changes.
///
/// Callbacks for one `Membership` run one at a time on its dispatch task, in
/// the order the gossip engine delivered the events, so implementations need
/// no locking of their own. A slow callback delays every event behind it:
/// hand long-running work off to your own tasks.
///
/// Returned errors are logged with the event kind and member name, then
/// dropped. They never stop delivery of later events.
pub trait Handler: Send + Sync + 'static {
    fn join(&self, member: &Member) -> anyhow::Result<()>;

    /// Called for graceful departures and detected failures alike.
    fn leave(&self, member: &Member) -> anyhow::Result<()>;

    fn update(&self, _member: &Member) -> anyhow::Result<()> {
        Ok(())
    }

    fn reap(&self, _member: &Member) -> anyhow::Result<()> {
        Ok(())
    }

    fn user(&self, _event: &UserEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// Reply through [`Query::respond`], at most once. Nothing is sent back
    /// to the querier unless the handler responds.
    fn query(&self, _query: &Query) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn join(&self, member: &Member) -> anyhow::Result<()> {
        (**self).join(member)
    }

    fn leave(&self, member: &Member) -> anyhow::Result<()> {
        (**self).leave(member)
    }

    fn update(&self, member: &Member) -> anyhow::Result<()> {
        (**self).update(member)
    }

    fn reap(&self, member: &Member) -> anyhow::Result<()> {
        (**self).reap(member)
    }

    fn user(&self, event: &UserEvent) -> anyhow::Result<()> {
        (**self).user(event)
    }

    fn query(&self, query: &Query) -> anyhow::Result<()> {
        (**self).query(query)
    }
}
