use std::{fmt, net::IpAddr};

use uuid::Uuid;

/// Ends a session. Clients match it loosely, the server matches it exactly.
pub const QUIT_COMMAND: &str = "quit";

/// Asks for the list of connected peers. Sent untagged and relayed as-is.
pub const LIST_CLIENTS_COMMAND: &str = "wwhhoo";

const ORIGIN_SEPARATOR: char = '|';
const HYPHENATED_ID_LEN: usize = 36;

/// Per-session origin tag carried in front of every chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// What a line typed by the local user turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing<'a> {
    Quit,
    ListClients,
    Chat(&'a str),
}

impl<'a> Outgoing<'a> {
    pub fn classify(input: &'a str) -> Self {
        if input.trim().eq_ignore_ascii_case(QUIT_COMMAND) {
            Outgoing::Quit
        } else if input == LIST_CLIENTS_COMMAND {
            Outgoing::ListClients
        } else {
            Outgoing::Chat(input)
        }
    }
}

pub fn chat_line(id: SessionId, alias: &str, text: &str) -> String {
    format!("{id}{ORIGIN_SEPARATOR}[{alias}]: {text}")
}

/// A line received from the server, classified once before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming<'a> {
    /// Line carrying a session id somewhere; `origin` is everything before
    /// the first `|`, which may include the server's address prefix.
    Chat { origin: &'a str, payload: &'a str },
    Plain(&'a str),
}

impl<'a> Incoming<'a> {
    pub fn parse(line: &'a str) -> Self {
        if !contains_session_id(line) {
            return Incoming::Plain(line);
        }

        // An id without a separator cannot be split; show it untouched.
        match line.split_once(ORIGIN_SEPARATOR) {
            Some((origin, payload)) => Incoming::Chat { origin, payload },
            None => Incoming::Plain(line),
        }
    }

    /// Text to show a session with id `own`, or `None` for its own echo.
    pub fn visible_to(self, own: &str) -> Option<&'a str> {
        match self {
            Incoming::Chat { origin, .. } if origin == own => None,
            Incoming::Chat { payload, .. } => Some(payload),
            Incoming::Plain(text) => Some(text),
        }
    }
}

/// True when a hyphenated UUID appears anywhere in `line`.
pub fn contains_session_id(line: &str) -> bool {
    line.as_bytes()
        .windows(HYPHENATED_ID_LEN)
        .any(|window| Uuid::try_parse_ascii(window).is_ok())
}

/// Line the server fans out for a message received from `origin`.
pub fn relay_line(origin: IpAddr, line: &str) -> String {
    format!("{origin}: {line}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Joined,
    Left,
}

impl Presence {
    pub fn notice(self, addr: IpAddr) -> String {
        match self {
            Presence::Joined => format!("CLIENT CONNECTED: {addr}"),
            Presence::Left => format!("CLIENT DISCONNECTED: {addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    fn session_id() -> SessionId {
        SessionId::from(Uuid::parse_str(ID).expect("valid uuid"))
    }

    #[test]
    fn chat_line_tags_text_with_id_and_alias() {
        assert_eq!(
            chat_line(session_id(), "alice", "hello"),
            format!("{ID}|[alice]: hello")
        );
    }

    #[test]
    fn quit_is_trimmed_and_case_insensitive() {
        assert_eq!(Outgoing::classify("quit"), Outgoing::Quit);
        assert_eq!(Outgoing::classify("  QuIt \t"), Outgoing::Quit);
        assert_eq!(Outgoing::classify("quit now"), Outgoing::Chat("quit now"));
    }

    #[test]
    fn list_token_must_match_exactly() {
        assert_eq!(Outgoing::classify("wwhhoo"), Outgoing::ListClients);
        assert_eq!(Outgoing::classify(" wwhhoo"), Outgoing::Chat(" wwhhoo"));
    }

    #[test]
    fn relayed_chat_keeps_address_in_origin() {
        let line = format!("10.0.0.1: {ID}|[alice]: hello | world");
        let origin = format!("10.0.0.1: {ID}");
        assert_eq!(
            Incoming::parse(&line),
            Incoming::Chat {
                origin: &origin,
                payload: "[alice]: hello | world",
            }
        );
    }

    #[test]
    fn id_is_found_anywhere_in_the_line() {
        assert!(contains_session_id(&format!("prefix {ID} suffix")));
        assert!(contains_session_id(&ID.to_uppercase()));
        assert!(!contains_session_id("CLIENT CONNECTED: 10.0.0.1"));
        assert!(!contains_session_id("0f8fad5b-d9cb-469f-a165-70867728950"));
    }

    #[test]
    fn id_without_separator_is_plain_text() {
        let line = format!("status {ID}");
        assert_eq!(Incoming::parse(&line), Incoming::Plain(&line));
    }

    #[test]
    fn separator_without_id_is_plain_text() {
        assert_eq!(Incoming::parse("a|b"), Incoming::Plain("a|b"));
    }

    #[test]
    fn own_echo_is_hidden_and_others_are_shown() {
        let own = format!("{ID}|[me]: hi");
        assert_eq!(Incoming::parse(&own).visible_to(ID), None);

        let other = "7c9e6679-7425-40de-944b-e07fc1f90ae7|[bob]: hi";
        assert_eq!(Incoming::parse(other).visible_to(ID), Some("[bob]: hi"));

        let relayed = format!("10.0.0.1: {ID}|[me]: hi");
        assert_eq!(Incoming::parse(&relayed).visible_to(ID), Some("[me]: hi"));

        assert_eq!(
            Incoming::parse("CLIENT CONNECTED: 10.0.0.2").visible_to(ID),
            Some("CLIENT CONNECTED: 10.0.0.2")
        );
    }

    #[test]
    fn server_lines_use_the_peer_address() {
        let addr: IpAddr = "10.0.0.1".parse().expect("ip");
        assert_eq!(relay_line(addr, "quit?"), "10.0.0.1: quit?");
        assert_eq!(Presence::Joined.notice(addr), "CLIENT CONNECTED: 10.0.0.1");
        assert_eq!(Presence::Left.notice(addr), "CLIENT DISCONNECTED: 10.0.0.1");
    }
}
