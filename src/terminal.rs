//! The interactive command surface: parses what the user types, runs it against a [`Node`],
//! and renders node events for the terminal.
//!
//! Only input typed locally is parsed here. Lines from peers arrive as
//! [`NodeEvent::Message`] and are printed, never interpreted.

use std::fmt::Write;
use std::net::SocketAddr;

use thiserror::Error;

use crate::node::{Node, NodeEvent};
use crate::peer::{Direction, PeerId};

pub const HELP: &str = "\
Commands:
 connect <host> <port>   - connect to a peer
 msg <text>              - send message to all peers
 peers                   - list connected peers
 history                 - show local chat history
 disconnect <id>         - drop a connected peer
 help                    - this help
 quit                    - exit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { host: String, port: u16 },
    Msg(String),
    Peers,
    History,
    Disconnect(PeerId),
    Help,
    Quit,
}

/// Why a line was rejected. The message is meant to be shown as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
    #[error("Unknown command. Type 'help' for commands.")]
    Unknown,
}

impl Command {
    /// Parse one line of input. Blank lines and `msg` without text parse to nothing.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        let command = match keyword {
            "connect" => {
                let mut args = rest.split_whitespace();
                let (host, port) = match (args.next(), args.next()) {
                    (Some(host), Some(port)) => (host, port),
                    _ => return Err(CommandError::Usage("connect <host> <port>")),
                };
                let port = port.parse().map_err(|_| CommandError::Invalid {
                    what: "port",
                    value: port.to_string(),
                })?;
                Command::Connect {
                    host: host.to_string(),
                    port,
                }
            }
            "msg" => {
                if rest.is_empty() {
                    return Ok(None);
                }
                Command::Msg(rest.to_string())
            }
            "disconnect" => {
                let id = rest
                    .split_whitespace()
                    .next()
                    .ok_or(CommandError::Usage("disconnect <id>"))?;
                let id = id
                    .trim_start_matches('#')
                    .parse()
                    .map_err(|_| CommandError::Invalid {
                        what: "peer id",
                        value: id.to_string(),
                    })?;
                Command::Disconnect(PeerId(id))
            }
            "peers" if rest.is_empty() => Command::Peers,
            "history" if rest.is_empty() => Command::History,
            "help" if rest.is_empty() => Command::Help,
            "quit" if rest.is_empty() => Command::Quit,
            _ => return Err(CommandError::Unknown),
        };
        Ok(Some(command))
    }
}

/// Run a command, returning what to print. `Quit` is left to the caller, which owns the
/// shutdown.
pub fn execute(node: &Node, command: Command) -> Option<String> {
    match command {
        Command::Connect { host, port } => {
            node.connect_in_background(host, port);
            None
        }
        Command::Msg(text) => Some(node.broadcast(&text).echo),
        Command::Peers => Some(render_peers(&node.list_peers())),
        Command::History => Some(render_history(&node.history())),
        Command::Disconnect(peer) => {
            if node.disconnect(peer) {
                None
            } else {
                Some(format!("No connected peer#{}", peer))
            }
        }
        Command::Help => Some(HELP.trim_end().to_string()),
        Command::Quit => None,
    }
}

pub fn render_peers(peers: &[(PeerId, SocketAddr)]) -> String {
    if peers.is_empty() {
        return "No connected peers.".to_string();
    }
    let mut out = String::from("Connected peers:");
    for (peer, addr) in peers {
        let _ = write!(out, "\n #{} - {}", peer, addr);
    }
    out
}

pub fn render_history(entries: &[String]) -> String {
    if entries.is_empty() {
        return "(no history)".to_string();
    }
    let mut out = String::from("Chat history:");
    for entry in entries {
        out.push('\n');
        out.push_str(entry);
    }
    out
}

pub fn render_event(event: &NodeEvent) -> String {
    match event {
        NodeEvent::PeerConnected {
            peer,
            addr,
            direction: Direction::Inbound,
        } => format!("Incoming connection accepted: peer#{} - {}", peer, addr),
        NodeEvent::PeerConnected {
            peer,
            addr,
            direction: Direction::Outbound,
        } => format!("Connected to peer#{} - {}", peer, addr),
        NodeEvent::Message { formatted, .. } => formatted.clone(),
        NodeEvent::PeerDisconnected { peer } => format!("Peer#{} disconnected", peer),
        NodeEvent::ConnectFailed { target, reason } => {
            format!("Failed to connect to {} - {}", target, reason)
        }
        NodeEvent::AcceptFailed { reason } => format!("Error accepting connection: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn parse(line: &str) -> Option<Command> {
        Command::parse(line).unwrap()
    }

    #[test]
    fn parses_connect() {
        assert_eq!(
            parse("  connect  localhost 7001 "),
            Some(Command::Connect {
                host: "localhost".into(),
                port: 7001
            })
        );
        assert_eq!(
            Command::parse("connect localhost"),
            Err(CommandError::Usage("connect <host> <port>"))
        );
        assert_eq!(
            Command::parse("connect localhost seven"),
            Err(CommandError::Invalid {
                what: "port",
                value: "seven".into()
            })
        );
    }

    #[test]
    fn msg_keeps_inner_spacing() {
        assert_eq!(parse("msg  hello   there "), Some(Command::Msg("hello   there".into())));
        assert_eq!(parse("msg"), None);
        assert_eq!(parse("msg    "), None);
    }

    #[test]
    fn bare_keywords() {
        assert_eq!(parse("peers"), Some(Command::Peers));
        assert_eq!(parse("history"), Some(Command::History));
        assert_eq!(parse("help"), Some(Command::Help));
        assert_eq!(parse("quit"), Some(Command::Quit));
        assert_eq!(parse(""), None);
        assert_eq!(Command::parse("peers now"), Err(CommandError::Unknown));
        assert_eq!(Command::parse("hello"), Err(CommandError::Unknown));
    }

    #[test]
    fn parses_disconnect() {
        assert_eq!(parse("disconnect 3"), Some(Command::Disconnect(PeerId(3))));
        assert_eq!(parse("disconnect #4"), Some(Command::Disconnect(PeerId(4))));
        assert_eq!(
            Command::parse("disconnect"),
            Err(CommandError::Usage("disconnect <id>"))
        );
        assert!(matches!(
            Command::parse("disconnect x"),
            Err(CommandError::Invalid { what: "peer id", .. })
        ));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            CommandError::Unknown.to_string(),
            "Unknown command. Type 'help' for commands."
        );
        assert_eq!(
            CommandError::Usage("connect <host> <port>").to_string(),
            "Usage: connect <host> <port>"
        );
    }

    #[test]
    fn renders_listings() {
        assert_eq!(render_peers(&[]), "No connected peers.");
        let addr: SocketAddr = "10.0.0.2:7000".parse().unwrap();
        assert_eq!(
            render_peers(&[(PeerId(1), addr), (PeerId(4), addr)]),
            "Connected peers:\n #1 - 10.0.0.2:7000\n #4 - 10.0.0.2:7000"
        );
        assert_eq!(render_history(&[]), "(no history)");
        assert_eq!(
            render_history(&["[bob@me] hi".to_string()]),
            "Chat history:\n[bob@me] hi"
        );
    }

    #[test]
    fn renders_events() {
        let addr: SocketAddr = "10.0.0.2:7000".parse().unwrap();
        let inbound = NodeEvent::PeerConnected {
            peer: PeerId(2),
            addr,
            direction: Direction::Inbound,
        };
        assert_eq!(
            render_event(&inbound),
            "Incoming connection accepted: peer#2 - 10.0.0.2:7000"
        );
        assert_eq!(
            render_event(&NodeEvent::PeerDisconnected { peer: PeerId(2) }),
            "Peer#2 disconnected"
        );
        let failed = NodeEvent::ConnectFailed {
            target: "nowhere:1".into(),
            reason: "Connection refused".into(),
        };
        assert_eq!(render_event(&failed), "Failed to connect to nowhere:1 - Connection refused");
    }

    #[tokio::test]
    async fn executes_against_a_node() {
        let config =
            NodeConfig::new(0, "carol").with_listen_addr("127.0.0.1:0".parse().unwrap());
        let (node, _events) = Node::start(config).await.unwrap();

        assert_eq!(execute(&node, Command::Peers).as_deref(), Some("No connected peers."));
        assert_eq!(
            execute(&node, Command::Msg("hi all".into())).as_deref(),
            Some("[carol@me] hi all")
        );
        assert_eq!(
            execute(&node, Command::History).as_deref(),
            Some("Chat history:\n[carol@me] hi all")
        );
        assert_eq!(
            execute(&node, Command::Disconnect(PeerId(42))).as_deref(),
            Some("No connected peer#42")
        );
        assert_eq!(execute(&node, Command::Quit), None);

        node.shutdown().await;
    }
}
