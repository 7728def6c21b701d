//! Line-oriented connection endpoint shared by the server and the client.
//!
//! A TCP stream is split into a [`LineReader`] owned by exactly one task and a
//! cloneable [`LineWriter`] that may be used from many tasks at once. Writes go
//! through a per-connection mutex so two concurrent writers never interleave
//! bytes inside one line.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpStream, tcp::OwnedReadHalf},
    sync::Mutex,
    time::timeout,
};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Type-erased write half so the registry can hold writers for any stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writer half as stored by the server registry and the client session.
pub type SharedWriter = LineWriter<BoxedWriter>;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no data received within {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct LineReader<R> {
    inner: BufReader<R>,
    read_timeout: Option<Duration>,
    pending: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, read_timeout: Option<Duration>) -> Self {
        Self {
            inner: BufReader::new(reader),
            read_timeout,
            pending: Vec::new(),
        }
    }

    /// Reads the next line without its terminator. `Ok(None)` means the peer
    /// closed the stream.
    ///
    /// Cancel safe: bytes of a partially read line stay buffered and are
    /// returned by the next call.
    pub async fn read_line(&mut self) -> Result<Option<String>, ReadError> {
        let read = self.inner.read_until(b'\n', &mut self.pending);
        let bytes = match self.read_timeout {
            Some(limit) => timeout(limit, read)
                .await
                .map_err(|_| ReadError::TimedOut(limit))??,
            None => read.await?,
        };

        if bytes == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(LINE_ENDINGS)
            .to_string();
        self.pending.clear();
        Ok(Some(line))
    }
}

pub struct LineWriter<W> {
    inner: Arc<Mutex<WriteHalf<W>>>,
}

struct WriteHalf<W> {
    writer: W,
    broken: bool,
}

impl<W> Clone for LineWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> LineWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WriteHalf {
                writer,
                broken: false,
            })),
        }
    }

    /// Writes `line` plus a newline and flushes, holding the connection's
    /// write lock for the whole line.
    ///
    /// A write that fails or is cancelled partway leaves a fragment on the
    /// stream. The writer is then broken and every later call fails with
    /// [`io::ErrorKind::BrokenPipe`], so no line is ever appended to a
    /// fragment.
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut encoded = Vec::with_capacity(line.len() + 1);
        encoded.extend_from_slice(line.as_bytes());
        encoded.push(b'\n');

        let mut half = self.inner.lock().await;
        if half.broken {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "an earlier line was not fully written",
            ));
        }
        half.broken = true;
        half.writer.write_all(&encoded).await?;
        half.writer.flush().await?;
        half.broken = false;
        Ok(())
    }

    pub async fn is_broken(&self) -> bool {
        self.inner.lock().await.broken
    }

    /// Half-closes the stream; the peer observes end of stream.
    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.writer.shutdown().await
    }
}

impl SharedWriter {
    pub fn boxed<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        LineWriter::new(Box::new(writer) as BoxedWriter)
    }
}

/// One live TCP connection, split into its line reader and shared writer.
pub struct Connection {
    peer: SocketAddr,
    reader: LineReader<OwnedReadHalf>,
    writer: SharedWriter,
}

impl Connection {
    /// Fails if the stream is no longer connected to a peer.
    pub fn new(stream: TcpStream, read_timeout: Option<Duration>) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            peer,
            reader: LineReader::new(reader, read_timeout),
            writer: SharedWriter::boxed(writer),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_parts(self) -> (LineReader<OwnedReadHalf>, SharedWriter) {
        (self.reader, self.writer)
    }
}
