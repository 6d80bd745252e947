use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::debug;

use crate::memory::MemoryNetwork;

/// Background task that periodically drops Left/Failed members older than the
/// tombstone timeout from one node's view, emitting a member-reap for them.
pub(crate) async fn run_reaper(
    network: MemoryNetwork,
    addr: SocketAddr,
    name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = network.config().reap_interval().max(Duration::from_millis(1));
    let mut interval = time::interval(period);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(node = %name, "Reaper shutting down");
                    return;
                }
            }
            _ = interval.tick() => {
                if !network.reap(addr, &name).await {
                    debug!(node = %name, "Node no longer bound, reaper exiting");
                    return;
                }
            }
        }
    }
}
