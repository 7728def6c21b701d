use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use clap::ValueEnum;
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    connection::SharedWriter,
    protocol::{Presence, relay_line},
};

/// Upper bound on one fan-out write so a stalled peer cannot hold the registry.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

pub type ConnectionId = u64;

/// Which registered connections a broadcast skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExclusionPolicy {
    /// Skip every connection whose peer IP matches the sender's. Clients
    /// sharing one address never see each other's lines.
    #[default]
    Address,
    /// Skip only the connection the line arrived on.
    Connection,
}

impl ExclusionPolicy {
    fn skips(self, origin: &Origin, id: ConnectionId, peer: SocketAddr) -> bool {
        match self {
            ExclusionPolicy::Address => peer.ip() == origin.peer.ip(),
            ExclusionPolicy::Connection => id == origin.id,
        }
    }
}

/// Identity of one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub id: ConnectionId,
    pub peer: SocketAddr,
}

struct RegisteredHandler {
    peer: SocketAddr,
    writer: SharedWriter,
}

/// Live connections known to the server.
///
/// Every fan-out runs with the registry lock held, so chat lines and
/// presence notices reach all clients in one total order.
pub struct Registry {
    handlers: Mutex<BTreeMap<ConnectionId, RegisteredHandler>>,
    next_id: AtomicU64,
    policy: ExclusionPolicy,
    delivery_timeout: Duration,
}

impl Registry {
    pub fn new(policy: ExclusionPolicy) -> Self {
        Self::with_delivery_timeout(policy, DELIVERY_TIMEOUT)
    }

    pub fn with_delivery_timeout(policy: ExclusionPolicy, delivery_timeout: Duration) -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            policy,
            delivery_timeout,
        }
    }

    pub async fn register(&self, peer: SocketAddr, writer: SharedWriter) -> Origin {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().await;
        handlers.insert(id, RegisteredHandler { peer, writer });
        info!(%peer, connections = handlers.len(), "client connected");
        Origin { id, peer }
    }

    /// Relays `line` from `origin` to every connection the policy does not skip.
    pub async fn broadcast(&self, line: &str, origin: &Origin) {
        let relayed = relay_line(origin.peer.ip(), line);
        let handlers = self.handlers.lock().await;
        info!("{relayed}");
        self.fan_out(&handlers, Some(origin), &relayed).await;
    }

    pub async fn notify_connection_change(&self, origin: &Origin, presence: Presence) {
        let handlers = self.handlers.lock().await;
        self.fan_out(&handlers, Some(origin), &presence.notice(origin.peer.ip()))
            .await;
    }

    /// Deregisters `origin` and tells the remaining clients it left.
    ///
    /// Returns `false`, without notifying anyone, if it was already removed.
    pub async fn remove(&self, origin: &Origin) -> bool {
        let mut handlers = self.handlers.lock().await;
        if handlers.remove(&origin.id).is_none() {
            return false;
        }
        info!(peer = %origin.peer, connections = handlers.len(), "client disconnected");
        self.fan_out(&handlers, Some(origin), &Presence::Left.notice(origin.peer.ip()))
            .await;
        true
    }

    /// Sends a status line to every registered connection.
    pub async fn announce(&self, line: &str) {
        let handlers = self.handlers.lock().await;
        self.fan_out(&handlers, None, line).await;
    }

    pub async fn len(&self) -> usize {
        self.handlers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.lock().await.is_empty()
    }

    async fn fan_out(
        &self,
        handlers: &BTreeMap<ConnectionId, RegisteredHandler>,
        origin: Option<&Origin>,
        line: &str,
    ) {
        for (&id, handler) in handlers {
            if origin.is_some_and(|origin| self.policy.skips(origin, id, handler.peer)) {
                continue;
            }
            match timeout(self.delivery_timeout, handler.writer.write_line(line)).await {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => {
                    debug!(peer = %handler.peer, ?error, "failed to deliver line to client");
                }
                Err(_) => warn!(peer = %handler.peer, "timed out delivering line to client"),
            }
            // The writer now refuses further lines. Closing it tells the client,
            // whose disconnect then deregisters it.
            let closed = timeout(self.delivery_timeout, handler.writer.shutdown()).await;
            if let Ok(Err(error)) = closed {
                debug!(peer = %handler.peer, ?error, "failed to close undeliverable client");
            }
        }
    }
}
