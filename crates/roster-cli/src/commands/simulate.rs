use std::net::SocketAddr;

use anyhow::{Context, Result};
use roster_core::{Member, NodeConfig, Query, QueryParams, UserEvent};
use roster_gossip::{MemoryEngine, MemoryNetwork};
use roster_membership::{Handler, Membership, MembershipBuilder};
use tokio::time::Duration;
use tracing::info;

/// Logs every callback and answers every query with "world".
struct LoggingHandler {
    node: String,
}

impl Handler for LoggingHandler {
    fn join(&self, member: &Member) -> anyhow::Result<()> {
        info!(node = %self.node, member = %member, "Join event");
        Ok(())
    }

    fn leave(&self, member: &Member) -> anyhow::Result<()> {
        info!(node = %self.node, member = %member, "Leave event");
        Ok(())
    }

    fn update(&self, member: &Member) -> anyhow::Result<()> {
        info!(node = %self.node, member = %member, tags = ?member.tags, "Update event");
        Ok(())
    }

    fn reap(&self, member: &Member) -> anyhow::Result<()> {
        info!(node = %self.node, member = %member, "Reap event");
        Ok(())
    }

    fn user(&self, event: &UserEvent) -> anyhow::Result<()> {
        info!(
            node = %self.node,
            name = %event.name,
            payload = %String::from_utf8_lossy(&event.payload),
            ltime = event.ltime,
            "User event"
        );
        Ok(())
    }

    fn query(&self, query: &Query) -> anyhow::Result<()> {
        info!(node = %self.node, name = %query.name, source = %query.source, "Query event");
        query.respond("world")?;
        Ok(())
    }
}

pub async fn run(config: NodeConfig, nodes: u16, settle: Duration) -> Result<()> {
    anyhow::ensure!(nodes > 0, "at least one node is required");

    let base: SocketAddr = tokio::net::lookup_host(&config.membership.bind_addr)
        .await
        .with_context(|| format!("invalid bind address {}", config.membership.bind_addr))?
        .next()
        .context("bind address resolved to nothing")?;
    let prefix = if config.membership.node_name.is_empty() {
        uuid::Uuid::now_v7().to_string()[..8].to_string()
    } else {
        config.membership.node_name.clone()
    };

    let network = MemoryNetwork::new(config.gossip.clone());
    let logger = tracing::dispatcher::get_default(|current| current.clone());

    let mut members: Vec<Membership<MemoryEngine>> = Vec::with_capacity(nodes as usize);
    for i in 0..nodes {
        let port = base
            .port()
            .checked_add(i)
            .context("node ports overflow the port range")?;
        let addr = SocketAddr::new(base.ip(), port);
        let name = format!("{prefix}-{i}");

        let mut node_config = config.membership.clone();
        node_config.node_name = name.clone();
        node_config.bind_addr = addr.to_string();
        node_config
            .tags
            .insert("rpc_addr".to_string(), addr.to_string());
        node_config.join_addrs = if i == 0 {
            vec![]
        } else {
            vec![base.to_string()]
        };

        let membership = MembershipBuilder::new(node_config, LoggingHandler { node: name })
            .logger(logger.clone())
            .start(&network)
            .await?;
        members.push(membership);
    }
    tokio::time::sleep(settle).await;

    let first = &members[0];
    first.user_event("hello", "world", true).await?;

    let responses = first
        .query("hello", "world", QueryParams::default())
        .await?
        .collect()
        .await;
    for response in &responses {
        info!(
            from = %response.from,
            payload = %String::from_utf8_lossy(&response.payload),
            "Query response"
        );
    }

    if members.len() > 1
        && let Some(last) = members.last()
    {
        last.leave().await?;
    }
    tokio::time::sleep(settle).await;

    for member in first.members().await {
        info!(member = %member.name, status = %member.status, "Final view");
    }

    for membership in members {
        membership.shutdown().await;
    }

    Ok(())
}
