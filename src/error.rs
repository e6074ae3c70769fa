use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Failures the node reports to its caller. Anything that happens on an established
/// session is not an error here; it surfaces as a disconnect instead.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to {target} timed out after {millis}ms", millis = .timeout.as_millis())]
    ConnectTimeout { target: String, timeout: Duration },
    #[error("node is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = NodeError> = std::result::Result<T, E>;
