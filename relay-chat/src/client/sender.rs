use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    select,
};
use tracing::debug;

use super::SessionIdentity;
use crate::{
    connection::SharedWriter,
    protocol::{Outgoing, chat_line},
    shutdown::ShutdownFlag,
};

/// Reads local input and writes tagged lines to the server.
pub(crate) struct Sender<I> {
    identity: SessionIdentity,
    input: I,
    writer: SharedWriter,
    shutdown: ShutdownFlag,
}

impl<I> Sender<I>
where
    I: AsyncBufRead + Unpin,
{
    pub(crate) fn new(
        identity: SessionIdentity,
        input: I,
        writer: SharedWriter,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            identity,
            input,
            writer,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut line = String::new();
        while !self.shutdown.is_set() {
            line.clear();
            let read = select! {
                _ = self.shutdown.wait() => break,
                read = self.input.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("local input closed");
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(?error, "failed to read local input");
                    break;
                }
            }

            let text = line.trim_end_matches(['\n', '\r']);
            let wire = match Outgoing::classify(text) {
                Outgoing::Quit => break,
                Outgoing::ListClients => text.to_string(),
                Outgoing::Chat(text) => chat_line(self.identity.id, &self.identity.alias, text),
            };

            let written = select! {
                _ = self.shutdown.wait() => break,
                written = self.writer.write_line(&wire) => written,
            };
            if let Err(error) = written {
                debug!(?error, "failed to send line to server");
                break;
            }
        }
        self.shutdown.set();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, BufReader, duplex},
        time::{sleep, timeout},
    };

    use super::*;
    use crate::{connection::LineReader, protocol::SessionId};

    fn identity() -> SessionIdentity {
        SessionIdentity {
            id: SessionId::generate(),
            alias: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn tags_chat_and_stops_on_quit_without_sending_it() {
        let identity = identity();
        let (tx, rx) = duplex(4096);
        let mut server = LineReader::new(rx, Some(Duration::from_millis(100)));
        let shutdown = ShutdownFlag::new();
        let input: &[u8] = b"hello\nwwhhoo\n QUIT \nafter quit\n";

        Sender::new(identity.clone(), input, SharedWriter::boxed(tx), shutdown.clone())
            .run()
            .await;

        assert!(shutdown.is_set());
        let first = server.read_line().await.expect("read").expect("line");
        assert_eq!(first, format!("{}|[alice]: hello", identity.id));
        let second = server.read_line().await.expect("read").expect("line");
        assert_eq!(second, "wwhhoo");
        // Sender dropped its writer, so the stream ends right after.
        assert!(server.read_line().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn end_of_input_sets_the_flag() {
        let (tx, _rx) = duplex(4096);
        let shutdown = ShutdownFlag::new();
        let input: &[u8] = b"";

        Sender::new(identity(), input, SharedWriter::boxed(tx), shutdown.clone())
            .run()
            .await;

        assert!(shutdown.is_set());
    }

    #[tokio::test]
    async fn write_failure_sets_the_flag() {
        let (tx, rx) = duplex(4096);
        drop(rx);
        let shutdown = ShutdownFlag::new();
        let input: &[u8] = b"nobody listens\n";

        Sender::new(identity(), input, SharedWriter::boxed(tx), shutdown.clone())
            .run()
            .await;

        assert!(shutdown.is_set());
    }

    #[tokio::test]
    async fn setting_the_flag_interrupts_a_blocked_write() {
        let (tx, _server) = duplex(16);
        let (mut keyboard, input) = duplex(4096);
        let shutdown = ShutdownFlag::new();
        let task = tokio::spawn(
            Sender::new(
                identity(),
                BufReader::new(input),
                SharedWriter::boxed(tx),
                shutdown.clone(),
            )
            .run(),
        );

        let long_line = format!("{}\n", "y".repeat(1000));
        keyboard.write_all(long_line.as_bytes()).await.expect("type");
        sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        shutdown.set();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("sender should stop")
            .expect("sender task");
    }

    #[tokio::test]
    async fn setting_the_flag_interrupts_a_pending_read() {
        let (tx, mut rx) = duplex(4096);
        let (_keyboard, input) = duplex(64);
        let shutdown = ShutdownFlag::new();
        let task = tokio::spawn(
            Sender::new(
                identity(),
                BufReader::new(input),
                SharedWriter::boxed(tx),
                shutdown.clone(),
            )
            .run(),
        );

        shutdown.set();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("sender should stop")
            .expect("sender task");

        let mut leftover = Vec::new();
        rx.read_to_end(&mut leftover).await.expect("read");
        assert!(leftover.is_empty());
    }
}
