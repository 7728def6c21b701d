use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
};
use tracing::debug;

use super::write_output;
use crate::{
    connection::{LineReader, ReadError},
    protocol::{Incoming, SessionId},
    shutdown::ShutdownFlag,
};

/// Prints lines from the server, hiding the session's own echoed messages.
pub(crate) struct Receiver<R, O> {
    own_id: String,
    reader: LineReader<R>,
    output: O,
    shutdown: ShutdownFlag,
}

impl<R, O> Receiver<R, O>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        id: SessionId,
        reader: LineReader<R>,
        output: O,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            own_id: id.to_string(),
            reader,
            output,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        while !self.shutdown.is_set() {
            let read = select! {
                _ = self.shutdown.wait() => break,
                read = self.reader.read_line() => read,
            };

            let notice = match read {
                Ok(Some(line)) => {
                    let Some(text) = Incoming::parse(&line).visible_to(&self.own_id) else {
                        continue;
                    };
                    if let Err(error) = write_output(&mut self.output, text).await {
                        debug!(?error, "failed to print received line");
                        break;
                    }
                    continue;
                }
                Ok(None) => "*** connection closed by server".to_string(),
                Err(ReadError::TimedOut(after)) => {
                    format!("*** no data from server for {after:?}; terminating connection")
                }
                Err(ReadError::Io(error)) => {
                    format!("*** connection error ({error}); terminating connection")
                }
            };

            if let Err(error) = write_output(&mut self.output, &notice).await {
                debug!(?error, "failed to print connection notice");
            }
            break;
        }
        self.shutdown.set();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncWriteExt, duplex},
        time::timeout,
    };

    use super::*;

    fn lines(output: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(output)
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn hides_own_echo_and_prints_everything_else() {
        let id = SessionId::generate();
        let other = SessionId::generate();
        let (mut server, rx) = duplex(4096);
        let shutdown = ShutdownFlag::new();
        let mut output = Vec::new();

        let script = format!(
            "{id}|[me]: mine\n\
             10.0.0.2: {other}|[bob]: hi there\n\
             CLIENT CONNECTED: 10.0.0.3\n\
             odd {other} without separator\n"
        );
        server.write_all(script.as_bytes()).await.expect("write");
        drop(server);

        Receiver::new(id, LineReader::new(rx, None), &mut output, shutdown.clone())
            .run()
            .await;

        assert!(shutdown.is_set());
        assert_eq!(
            lines(&output),
            vec![
                "[bob]: hi there".to_string(),
                "CLIENT CONNECTED: 10.0.0.3".to_string(),
                format!("odd {other} without separator"),
                "*** connection closed by server".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn read_timeout_ends_the_session() {
        let (_server, rx) = duplex(4096);
        let shutdown = ShutdownFlag::new();
        let mut output = Vec::new();
        let reader = LineReader::new(rx, Some(Duration::from_millis(50)));

        Receiver::new(SessionId::generate(), reader, &mut output, shutdown.clone())
            .run()
            .await;

        assert!(shutdown.is_set());
        let printed = lines(&output);
        assert_eq!(printed.len(), 1);
        assert!(printed[0].starts_with("*** no data from server"));
    }

    #[tokio::test]
    async fn stops_when_the_sender_sets_the_flag() {
        let (_server, rx) = duplex(4096);
        let shutdown = ShutdownFlag::new();
        let (output, _screen) = duplex(4096);
        let receiver = Receiver::new(
            SessionId::generate(),
            LineReader::new(rx, None),
            output,
            shutdown.clone(),
        );
        let task = tokio::spawn(receiver.run());

        shutdown.set();

        timeout(Duration::from_secs(1), task)
            .await
            .expect("receiver should stop")
            .expect("receiver task");
    }
}
