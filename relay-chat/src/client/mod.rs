//! Terminal chat client: one [`ClientSession`] per process, with a sender task
//! reading stdin and a receiver task printing server lines to stdout.

pub mod alias;
mod receiver;
mod sender;
mod session;

use std::io;

use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

pub use session::{ClientSession, ConnectError, SessionSettings, SessionState};

use crate::{
    cli::{ClientArgs, DEFAULT_PORT},
    protocol::SessionId,
};

/// Origin tag attached to every chat line a session sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: SessionId,
    pub alias: String,
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let host = args.host().to_string();
    let port = match args.port() {
        Ok(port) => port,
        Err(rejection) => {
            debug!(?rejection, "ignoring port argument");
            write_output(&mut stdout, &format!("{rejection}. Using default")).await?;
            DEFAULT_PORT
        }
    };

    let mut session = ClientSession::new(args.settings());
    if let Err(err) = session.connect(&host, port).await {
        write_output(&mut stdout, &format!("*** {err}. Shutting down.")).await?;
        return Err(err.into());
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = match session.initialize(stdin, stdout).await {
        Ok(()) => session.wait_for_completion().await,
        Err(err) => Err(err),
    };
    session.close().await;

    outcome
}

pub(crate) async fn write_output<O>(output: &mut O, line: &str) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
