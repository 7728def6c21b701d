use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use super::registry::{Origin, Registry};
use crate::{
    connection::{LineReader, ReadError, SharedWriter},
    protocol::QUIT_COMMAND,
};

/// Server-side worker for one accepted connection.
///
/// Relays every line it reads to the registry until the peer closes the
/// stream or sends `quit`, then closes its socket and deregisters itself.
pub struct ClientHandler<R> {
    origin: Origin,
    reader: LineReader<R>,
    writer: SharedWriter,
    registry: Arc<Registry>,
}

impl<R> ClientHandler<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        origin: Origin,
        reader: LineReader<R>,
        writer: SharedWriter,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            origin,
            reader,
            writer,
            registry,
        }
    }

    pub async fn run(mut self) {
        if let Err(error) = self.relay_lines().await {
            warn!(peer = %self.origin.peer, %error, "client connection closed with error");
        }

        if let Err(error) = self.writer.shutdown().await {
            debug!(peer = %self.origin.peer, ?error, "failed to close client socket");
        }
        self.registry.remove(&self.origin).await;
    }

    async fn relay_lines(&mut self) -> Result<(), ReadError> {
        while let Some(line) = self.reader.read_line().await? {
            if line == QUIT_COMMAND {
                debug!(peer = %self.origin.peer, "client sent quit");
                break;
            }
            self.registry.broadcast(&line, &self.origin).await;
        }
        Ok(())
    }
}
