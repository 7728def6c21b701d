use std::{io, time::Duration};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncWrite},
    net::TcpStream,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info};

use super::{
    SessionIdentity, alias::prompt_alias, receiver::Receiver, sender::Sender, write_output,
};
use crate::{
    connection::{Connection, SharedWriter},
    protocol::SessionId,
    shutdown::ShutdownFlag,
};

const SEPARATOR: &str = "************************************************************";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Connected,
    Running,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Longest silence tolerated from the server; `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_secs(60)),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection refused by {addr}")]
    Refused { addr: String },
    #[error("no route to {addr}")]
    Unreachable { addr: String },
    #[error("timed out connecting to {addr} after {after:?}")]
    TimedOut { addr: String, after: Duration },
    #[error("failed to connect to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    fn classify(addr: String, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::Refused { addr },
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ConnectError::Unreachable { addr }
            }
            _ => ConnectError::Io { addr, source },
        }
    }
}

/// Client side of one chat connection.
///
/// Owns the connection and the two workers started by [`initialize`]: the
/// sender reading local input and the receiver printing server lines. Both
/// share one [`ShutdownFlag`]; whichever stops first sets it and the other
/// follows. Call [`close`] on every exit path; it is idempotent.
///
/// [`initialize`]: ClientSession::initialize
/// [`close`]: ClientSession::close
pub struct ClientSession {
    state: SessionState,
    settings: SessionSettings,
    id: SessionId,
    alias: Option<String>,
    host: String,
    connection: Option<Connection>,
    writer: Option<SharedWriter>,
    shutdown: ShutdownFlag,
    workers: Vec<JoinHandle<()>>,
}

impl ClientSession {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            state: SessionState::Init,
            settings,
            id: SessionId::generate(),
            alias: None,
            host: String::new(),
            connection: None,
            writer: None,
            shutdown: ShutdownFlag::new(),
            workers: Vec::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    pub fn state(&self) -> SessionState {
        if self.state == SessionState::Running && self.shutdown.is_set() {
            SessionState::Closing
        } else {
            self.state
        }
    }

    /// Opens the socket. Any failure leaves the session `Closed`.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.state = SessionState::Connecting;
        let addr = format!("{host}:{port}");

        let connecting = TcpStream::connect((host, port));
        let stream = match timeout(self.settings.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.state = SessionState::Closed;
                return Err(ConnectError::classify(addr, source));
            }
            Err(_) => {
                self.state = SessionState::Closed;
                return Err(ConnectError::TimedOut {
                    addr,
                    after: self.settings.connect_timeout,
                });
            }
        };

        self.attach(host, stream).map_err(|source| {
            self.state = SessionState::Closed;
            ConnectError::classify(addr, source)
        })
    }

    /// Adopts an already connected stream; fails if it has no live peer.
    pub fn attach(&mut self, host: &str, stream: TcpStream) -> io::Result<()> {
        let connection = Connection::new(stream, self.settings.read_timeout)?;
        info!(peer = %connection.peer_addr(), "connected to chat server");
        self.host = host.to_string();
        self.connection = Some(connection);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Asks for the alias, prints the banner and starts both workers.
    pub async fn initialize<I, O>(&mut self, mut input: I, mut output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        if self.state != SessionState::Connected {
            return Err(anyhow!(
                "cannot initialize a session in state {:?}",
                self.state
            ));
        }
        let connection = self
            .connection
            .take()
            .context("connected session has no connection")?;

        let alias = prompt_alias(&mut input, &mut output)
            .await
            .context("failed to read user alias")?;
        self.alias = Some(alias.clone());

        print_banner(&mut output, &connection, &self.host, &alias)
            .await
            .context("failed to print connection banner")?;

        let identity = SessionIdentity { id: self.id, alias };
        let (reader, writer) = connection.into_parts();
        self.writer = Some(writer.clone());

        let receiver = Receiver::new(self.id, reader, output, self.shutdown.clone());
        self.workers.push(tokio::spawn(receiver.run()));

        let sender = Sender::new(identity, input, writer, self.shutdown.clone());
        self.workers.push(tokio::spawn(sender.run()));

        self.state = SessionState::Running;
        Ok(())
    }

    /// Waits until both workers have stopped.
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        for worker in self.workers.drain(..) {
            match worker.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => return Err(anyhow!("session worker failed: {err}")),
            }
        }
        Ok(())
    }

    /// Sets the flag, cancels both workers and closes the socket.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;

        self.shutdown.set();
        for worker in self.workers.drain(..) {
            worker.abort();
            // A cancelled sender releases the writer lock once it is dropped.
            let _ = worker.await;
        }

        if let Some(writer) = self.writer.take() {
            if let Err(error) = writer.shutdown().await {
                debug!(?error, "failed to shut down connection");
            }
        }
        self.connection = None;

        self.state = SessionState::Closed;
        info!("chat session closed");
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.shutdown.set();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn print_banner<O>(
    output: &mut O,
    connection: &Connection,
    host: &str,
    alias: &str,
) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    let lines = [
        "***********************   SUCCESS   ************************".to_string(),
        "Socket connection established between local and remote host".to_string(),
        SEPARATOR.to_string(),
        format!("IP: {}", connection.peer_addr().ip()),
        format!("Host name: {host}"),
        SEPARATOR.to_string(),
        format!(">>> WELCOME TO THE CHAT {alias} <<<"),
        "Enter 'quit' to exit".to_string(),
        SEPARATOR.to_string(),
    ];
    for line in &lines {
        write_output(output, line).await?;
    }
    Ok(())
}
