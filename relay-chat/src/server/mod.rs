//! Broadcast server: accepts connections, runs one [`ClientHandler`] task per
//! connection and relays each received line to the other clients.

mod handler;
mod registry;

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

pub use handler::ClientHandler;
pub use registry::{ConnectionId, ExclusionPolicy, Origin, Registry};

use crate::{connection::Connection, protocol::Presence};

const SHUTDOWN_NOTICE: &str = "*** server shutting down";

pub struct BroadcastServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl BroadcastServer {
    pub fn new(listener: TcpListener, policy: ExclusionPolicy) -> Self {
        Self {
            listener,
            registry: Arc::new(Registry::new(policy)),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let BroadcastServer { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&registry).await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry).await;
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_shutdown(registry: &Registry) {
    info!("relay server shutting down");
    registry.announce(SHUTDOWN_NOTICE).await;
}

async fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
) {
    match result {
        Ok((stream, peer)) => {
            if let Err(err) = spawn_client_handler(stream, registry).await {
                warn!(peer = %peer, error = ?err, "failed to set up client connection");
            }
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

/// Registers the connection before its handler task starts reading.
async fn spawn_client_handler(
    stream: TcpStream,
    registry: &Arc<Registry>,
) -> std::io::Result<()> {
    let connection = Connection::new(stream, None)?;
    let peer = connection.peer_addr();
    let (reader, writer) = connection.into_parts();

    let origin = registry.register(peer, writer.clone()).await;
    // The join notice precedes any line relayed from this client.
    registry
        .notify_connection_change(&origin, Presence::Joined)
        .await;

    let handler = ClientHandler::new(origin, reader, writer, Arc::clone(registry));
    tokio::spawn(handler.run());
    Ok(())
}
