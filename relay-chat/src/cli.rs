use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::{client::SessionSettings, server::ExclusionPolicy};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2000;

/// Lowest port a client may target; everything below is a well-known port.
const MIN_USER_PORT: u32 = 1024;
const MAX_USER_PORT: u32 = 65535;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server, broadcasting every line to the other clients.
    Server(ServerArgs),
    /// Connect to a relay server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on. Non-numeric values fall back to 2000; 0 picks a free port.
    pub port: Option<String>,

    /// Which connections a relayed line skips.
    #[arg(long, value_enum, default_value_t = ExclusionPolicy::Address)]
    pub exclusion: ExclusionPolicy,
}

impl ServerArgs {
    pub fn port(&self) -> u16 {
        self.port
            .as_deref()
            .and_then(|port| port.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Server host name or address.
    pub host: Option<String>,

    /// Server port between 1024 and 65535.
    pub port: Option<String>,

    /// Seconds of server silence before the session ends; 0 waits forever.
    #[arg(long, default_value_t = 60)]
    pub read_timeout: u64,

    /// Seconds to wait for the connection to be established.
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,
}

impl ClientArgs {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> Result<u16, PortRejection> {
        match self.port.as_deref() {
            Some(port) => parse_user_port(port),
            None => Ok(DEFAULT_PORT),
        }
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            read_timeout: (self.read_timeout > 0).then(|| Duration::from_secs(self.read_timeout)),
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortRejection {
    #[error("Invalid port number")]
    NotNumeric(String),
    #[error("Well-known ports not accepted")]
    OutOfRange(u32),
}

fn parse_user_port(raw: &str) -> Result<u16, PortRejection> {
    let port: u32 = raw
        .trim()
        .parse()
        .map_err(|_| PortRejection::NotNumeric(raw.to_string()))?;
    if !(MIN_USER_PORT..=MAX_USER_PORT).contains(&port) {
        return Err(PortRejection::OutOfRange(port));
    }
    u16::try_from(port).map_err(|_| PortRejection::OutOfRange(port))
}
