//! The node: owns the listener, the session table and the history, fans broadcasts out, and
//! turns what sessions observe into [`NodeEvent`]s for the application.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::connector;
use crate::error::{NodeError, Result};
use crate::history::HistoryLog;
use crate::listener::Listener;
use crate::message;
use crate::peer::{Direction, PeerId, Session, SessionHandler};
use crate::registry::Registry;

/// Notifications delivered to the application, in the order the node observed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    PeerConnected {
        peer: PeerId,
        addr: SocketAddr,
        direction: Direction,
    },
    /// A line from a peer. `line` is exactly what arrived; `formatted` is what went into the
    /// history.
    Message {
        peer: PeerId,
        addr: SocketAddr,
        line: String,
        formatted: String,
    },
    PeerDisconnected {
        peer: PeerId,
    },
    /// A background connect attempt failed.
    ConnectFailed {
        target: String,
        reason: String,
    },
    AcceptFailed {
        reason: String,
    },
}

/// Outcome of [`Node::broadcast`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Broadcast {
    /// Our own copy of the message, as recorded in the history.
    pub echo: String,
    /// Sessions the payload was queued for.
    pub recipients: usize,
}

/// State shared by the node handle, the listener, connect attempts and every session task.
pub(crate) struct Shared {
    config: NodeConfig,
    next_id: AtomicU64,
    registry: Registry,
    history: HistoryLog,
    events: mpsc::UnboundedSender<NodeEvent>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Shared {
    pub(crate) fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Nothing reaches the application once shutdown has begun.
    pub(crate) fn emit(&self, event: NodeEvent) {
        if self.is_shutting_down() {
            return;
        }
        // The application may have stopped listening; that's its business.
        let _ = self.events.send(event);
    }

    /// Give a freshly connected stream an id, register it and start its task.
    ///
    /// Only called from tasks on the tracker, so shutdown can't finish waiting between the
    /// registration and the spawn.
    pub(crate) fn adopt(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        direction: Direction,
    ) -> Result<PeerId> {
        if self.is_shutting_down() {
            return Err(NodeError::ShuttingDown);
        }
        let peer = PeerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (session, driver) = Session::open(
            peer,
            stream,
            addr,
            self.config.send_queue_depth,
            self.shutdown.child_token(),
        );
        // On refusal the driver drops here, closing the stream.
        if self.registry.put(session).is_err() {
            return Err(NodeError::ShuttingDown);
        }

        info!(peer = %peer, addr = %addr, ?direction, "peer connected");
        self.emit(NodeEvent::PeerConnected {
            peer,
            addr,
            direction,
        });

        let handler: Arc<dyn SessionHandler> = self.clone();
        self.tracker.spawn(driver.run(handler));
        Ok(peer)
    }
}

impl SessionHandler for Shared {
    fn message_received(&self, peer: PeerId, line: String) {
        if self.is_shutting_down() {
            return;
        }
        let Some(session) = self.registry.get(peer) else {
            debug!(peer = %peer, "line from unregistered peer dropped");
            return;
        };
        let addr = session.remote_addr();
        let formatted = message::incoming(peer, addr, &line);
        self.history.push(formatted.clone());
        self.emit(NodeEvent::Message {
            peer,
            addr,
            line,
            formatted,
        });
    }

    fn peer_disconnected(&self, peer: PeerId) {
        if self.registry.remove(peer).is_some() {
            info!(peer = %peer, "peer disconnected");
        }
        self.emit(NodeEvent::PeerDisconnected { peer });
    }
}

/// Handle to a running node. Cheap to clone; every clone drives the same node.
#[derive(Clone)]
pub struct Node {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
}

impl Node {
    /// Bind the listen address and start accepting peers. Events for the application arrive
    /// on the returned receiver.
    pub async fn start(config: NodeConfig) -> Result<(Node, mpsc::UnboundedReceiver<NodeEvent>)> {
        let listener = Listener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr();
        let (events, receiver) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            config,
            next_id: AtomicU64::new(1),
            registry: Registry::new(),
            history: HistoryLog::new(),
            events,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        info!(user = %shared.config.username, addr = %local_addr, "listening");
        shared.tracker.spawn(listener.run(Arc::clone(&shared)));

        Ok((Node { shared, local_addr }, receiver))
    }

    /// The address actually bound, with any port 0 resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn username(&self) -> &str {
        &self.shared.config.username
    }

    /// Connect to a peer and wait for the outcome. The attempt itself runs as its own task,
    /// so it proceeds alongside the listener and other attempts.
    pub async fn connect(&self, host: &str, port: u16) -> Result<PeerId> {
        if self.shared.is_shutting_down() {
            return Err(NodeError::ShuttingDown);
        }
        let attempt = connector::connect(Arc::clone(&self.shared), host.to_string(), port);
        match self.shared.tracker.spawn(attempt).await {
            Ok(result) => result,
            Err(err) => Err(NodeError::Io(io::Error::other(err))),
        }
    }

    /// Connect without waiting. Success shows up as [`NodeEvent::PeerConnected`], failure as
    /// [`NodeEvent::ConnectFailed`].
    pub fn connect_in_background(&self, host: impl Into<String>, port: u16) {
        if self.shared.is_shutting_down() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let host = host.into();
        self.shared.tracker.spawn(async move {
            let target = format!("{}:{}", host, port);
            if let Err(err) = connector::connect(Arc::clone(&shared), host, port).await {
                warn!(target = %target, error = %err, "connect failed");
                let reason = match err {
                    NodeError::Connect { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                shared.emit(NodeEvent::ConnectFailed { target, reason });
            }
        });
    }

    /// Send `text` to every connected peer as `<username>: <text>` and record our own copy.
    ///
    /// Each session is only handed the line; a dead or slow peer affects nobody else, and
    /// nothing waits for the peers to receive it.
    pub fn broadcast(&self, text: &str) -> Broadcast {
        let username = &self.shared.config.username;
        let payload = message::payload(username, text);
        let recipients = self
            .shared
            .registry
            .snapshot()
            .into_iter()
            .filter(|(_, session)| session.send(payload.clone()))
            .count();

        let echo = message::local_echo(username, text);
        self.shared.history.push(echo.clone());
        debug!(recipients, "broadcast queued");
        Broadcast { echo, recipients }
    }

    /// Connected peers in id order. May be stale as soon as it returns.
    pub fn list_peers(&self) -> Vec<(PeerId, SocketAddr)> {
        self.shared
            .registry
            .snapshot()
            .into_iter()
            .map(|(peer, session)| (peer, session.remote_addr()))
            .collect()
    }

    pub fn history(&self) -> Vec<String> {
        self.shared.history.snapshot()
    }

    /// Close one peer's connection. The usual disconnect notification follows. Returns false
    /// if no such peer is connected.
    pub fn disconnect(&self, peer: PeerId) -> bool {
        match self.shared.registry.get(peer) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Stop accepting, close every session and wait for all node tasks to finish.
    ///
    /// When this returns the listen port is free, no peers are listed and no further events
    /// will be sent. Calling it again just waits for the first call to complete.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        if !shared.is_shutting_down() {
            info!(addr = %self.local_addr, "shutting down");
            shared.shutdown.cancel();
            for session in shared.registry.close() {
                session.close();
            }
        }
        shared.tracker.close();
        shared.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    async fn local_node(name: &str) -> (Node, mpsc::UnboundedReceiver<NodeEvent>) {
        let config =
            NodeConfig::new(0, name).with_listen_addr("127.0.0.1:0".parse().unwrap());
        Node::start(config).await.unwrap()
    }

    #[tokio::test]
    async fn broadcast_without_peers_still_records_echo() {
        let (node, _events) = local_node("alice").await;
        let sent = node.broadcast("anyone there?");
        assert_eq!(sent.recipients, 0);
        assert_eq!(sent.echo, "[alice@me] anyone there?");
        assert_eq!(node.history(), vec!["[alice@me] anyone there?"]);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn start_resolves_port_zero() {
        let (node, _events) = local_node("alice").await;
        assert_ne!(node.local_addr().port(), 0);
        assert_eq!(node.username(), "alice");
        node.shutdown().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let (node, _events) = local_node("alice").await;
        let taken = NodeConfig::new(0, "bob").with_listen_addr(node.local_addr());
        match Node::start(taken).await {
            Err(NodeError::Bind { addr, .. }) => assert_eq!(addr, node.local_addr()),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("second bind on the same port succeeded"),
        }
        node.shutdown().await;
    }

    #[tokio::test]
    async fn connect_after_shutdown_is_refused() {
        let (node, _events) = local_node("alice").await;
        node.shutdown().await;
        assert!(node.is_shut_down());
        let result = node.connect("127.0.0.1", node.local_addr().port()).await;
        assert!(matches!(result, Err(NodeError::ShuttingDown)));
    }

    #[tokio::test]
    async fn shutdown_twice_returns() {
        let (node, _events) = local_node("alice").await;
        let other = node.clone();
        timeout(Duration::from_secs(5), node.shutdown()).await.unwrap();
        timeout(Duration::from_secs(5), other.shutdown()).await.unwrap();
        assert!(node.list_peers().is_empty());
    }

    #[tokio::test]
    async fn refused_connect_registers_nothing() {
        // Grab a free port and release it so nothing is listening there.
        let port = {
            let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            spare.local_addr().unwrap().port()
        };
        let (node, _events) = local_node("alice").await;
        let result = node.connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(NodeError::Connect { .. })));
        assert!(node.list_peers().is_empty());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn background_connect_failure_is_an_event() {
        let port = {
            let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            spare.local_addr().unwrap().port()
        };
        let (node, mut events) = local_node("alice").await;
        node.connect_in_background("127.0.0.1", port);
        let event = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        match event {
            NodeEvent::ConnectFailed { target, .. } => {
                assert_eq!(target, format!("127.0.0.1:{}", port))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        node.shutdown().await;
    }
}
