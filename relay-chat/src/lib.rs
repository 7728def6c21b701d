//! Multi-client line chat over TCP.
//!
//! A relay server accepts any number of clients and forwards every line it
//! receives to all other connected clients, prefixed with the sender's
//! address. Clients tag outgoing lines with a per-session id and alias and
//! hide their own echoed messages.
//!
//! - [`cli`] parses the `server` and `client` subcommands.
//! - [`server`] runs the accept loop, the connection registry and one
//!   handler task per client.
//! - [`client`] runs a session with a sender task (stdin to socket) and a
//!   receiver task (socket to stdout).
//! - [`connection`] wraps a TCP stream in line reader and writer halves.
//! - [`protocol`] builds and classifies the text lines on the wire.
//! - [`shutdown`] is the stop signal shared by a session's two tasks.

pub mod cli;
pub mod client;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod shutdown;
