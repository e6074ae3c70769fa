//! Defines IO with a chat peer.
//!
//! A connection is split in two: the cheap, cloneable [`Session`] handle that the rest of the
//! node keeps in its registry, and the [`SessionDriver`] that owns the socket and runs as the
//! connection's task. They talk over a bounded queue of outgoing lines and a
//! cancellation token.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::message::LineCodec;

/// Process-local name of a session. Assigned from one increasing counter and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side opened the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Receives what a session's driver observes. Called from the driver's task, one call at a
/// time per session.
pub trait SessionHandler: Send + Sync + 'static {
    /// A complete line arrived. The driver does not read the next line until this returns.
    fn message_received(&self, peer: PeerId, line: String);

    /// The connection ended. Called exactly once per session, from any cause.
    fn peer_disconnected(&self, peer: PeerId);
}

/// Handle to one open connection.
#[derive(Clone, Debug)]
pub struct Session {
    id: PeerId,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl Session {
    /// Wrap an established stream. At most `queue_depth` lines wait to be written. Nothing
    /// moves until the returned driver is run; dropping the driver instead closes the stream.
    pub fn open(
        id: PeerId,
        stream: TcpStream,
        remote_addr: SocketAddr,
        queue_depth: usize,
        cancel: CancellationToken,
    ) -> (Session, SessionDriver) {
        let (reader, writer) = stream.into_split();
        let (outbound, queued) = mpsc::channel(queue_depth.max(1));
        let session = Session {
            id,
            remote_addr,
            outbound,
            cancel: cancel.clone(),
        };
        let driver = SessionDriver {
            id,
            lines: FramedRead::new(reader, LineCodec::new()),
            sink: FramedWrite::new(writer, LineCodec::new()),
            queued,
            cancel,
        };
        (session, driver)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Queue `line` for the peer; the driver writes it with a trailing newline and flushes.
    ///
    /// Never waits. A peer whose queue is full has stopped reading and is closed, the same
    /// as one whose write failed. Returns false if the line was not queued; either way the
    /// caller only learns the peer is gone through the disconnect.
    pub fn send(&self, line: impl Into<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.outbound.try_send(line.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(peer = %self.id, "send queue full, closing session");
                self.close();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stop the session. Idempotent, and safe while the driver is blocked on a read.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Owns the socket of a [`Session`] and moves lines in both directions.
pub struct SessionDriver {
    id: PeerId,
    lines: FramedRead<OwnedReadHalf, LineCodec>,
    sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    queued: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl SessionDriver {
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Run until the peer hangs up, an IO error occurs, or the session is closed. Reports the
    /// disconnect to `handler` once on the way out; the socket closes when the driver drops.
    ///
    /// Reading and writing are separate loops polled together, so a write stuck on a full
    /// socket never stops incoming lines from being drained. Whichever loop ends first
    /// cancels the other.
    pub async fn run(self, handler: Arc<dyn SessionHandler>) {
        let SessionDriver {
            id,
            mut lines,
            mut sink,
            mut queued,
            cancel,
        } = self;

        let reading = async {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = lines.next() => match next {
                        Some(Ok(line)) => handler.message_received(id, line),
                        Some(Err(err)) => {
                            debug!(peer = %id, error = %err, "read failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
            cancel.cancel();
        };

        let writing = async {
            loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = queued.recv() => match next {
                        Some(line) => line,
                        None => break,
                    },
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = sink.send(line) => {
                        if let Err(err) = sent {
                            debug!(peer = %id, error = %err, "write failed");
                            break;
                        }
                    }
                }
            }
            cancel.cancel();
        };

        tokio::join!(reading, writing);
        handler.peer_disconnected(id);
    }
}
