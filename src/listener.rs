//! Accepts inbound peers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::{NodeError, Result};
use crate::node::{NodeEvent, Shared};
use crate::peer::Direction;

// Pause after a failed accept so a persistent error (e.g. out of file descriptors) doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A bound listening socket that has not started accepting yet.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    pub async fn bind(addr: SocketAddr) -> Result<Listener> {
        let socket = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| NodeError::Bind { addr, source })?;
        Ok(Listener { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until the node shuts down, registering a session per connection. The socket is
    /// closed when this returns.
    pub(crate) async fn run(self, shared: Arc<Shared>) {
        let Listener { socket, local_addr } = self;
        let stop = shared.shutdown_token();

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                accepted = socket.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(err) = shared.adopt(stream, addr, Direction::Inbound) {
                            debug!(addr = %addr, error = %err, "dropped inbound connection");
                        }
                    }
                    Err(err) => {
                        if stop.is_cancelled() {
                            break;
                        }
                        warn!(error = %err, "error accepting connection");
                        shared.emit(NodeEvent::AcceptFailed {
                            reason: err.to_string(),
                        });
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        info!(addr = %local_addr, "stopped listening");
    }
}
