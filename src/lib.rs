//! # A peer-to-peer chat node.
//!
//! Every node both listens for peers and dials out to them, and once connected the two
//! directions are indistinguishable: each connection is a newline-delimited text channel. A
//! user can:
//!
//! 1. Open up a connection to a peer.
//! 2. Broadcast messages to each connected peer.
//! 3. List connected peers and the local chat history,
//! 4. Disconnect a peer,
//! 5. Exit the application.
//!
//! Incoming connections are accepted automatically. Each connection gets a `PeerId` from a
//! single counter shared by inbound and outbound connections; ids are never reused.
//!
//! A peer that fails, whether on read, on write or by hanging up, is simply disconnected. It
//! never takes down the node or any other peer.
//!
//! Architecture:
//!
//! ```text
//!  Listener   Connector
//!     v           v
//! +-----------+             +---------------+                        +---------+
//! | TcpStream |<-LineCodec->| SessionDriver |<-BoundedLineChannel----| Session |--+
//! +-----------+             +---------------+                        +---------+  |
//! | TcpStream |<-LineCodec->| SessionDriver |<-BoundedLineChannel----| Session |--+-- Registry
//! +-----------+             +---------------+                        +---------+  |
//! | ...       |    ...      | ...           |          ...           | ...     |--+
//! +-----------+             +---------------+                        +---------+
//!                                   |                                     ^
//!                             SessionHandler                          broadcast
//!                                   v                                     |
//!                           +-------------------------------------------------+
//!                           |            Node (history, shutdown)             |
//!                           +-------------------------------------------------+
//!                                   |                                     ^
//!                          UnboundedEventChannel                       commands
//!                                   v                                     |
//!                           +-------------------------------------------------+
//!                           |                    Terminal                     |
//!                           +-------------------------------------------------+
//!                                                ^     v
//!                                              stdin stdout
//! ```

pub mod config;
mod connector;
pub mod error;
pub mod history;
pub mod listener;
pub mod message;
pub mod node;
pub mod peer;
pub mod registry;
pub mod terminal;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use history::HistoryLog;
pub use node::{Broadcast, Node, NodeEvent};
pub use peer::{Direction, PeerId, Session, SessionHandler};
pub use registry::Registry;
