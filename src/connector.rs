//! Opens outbound peers.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time;
use tracing::info;

use crate::error::{NodeError, Result};
use crate::node::Shared;
use crate::peer::{Direction, PeerId};

/// One connect attempt to `host:port`, bounded by the configured timeout and abandoned if the
/// node shuts down meanwhile. Nothing is registered unless it succeeds.
pub(crate) async fn connect(shared: Arc<Shared>, host: String, port: u16) -> Result<PeerId> {
    let target = format!("{}:{}", host, port);
    let timeout = shared.config().connect_timeout;
    let stop = shared.shutdown_token();

    let attempt = time::timeout(timeout, TcpStream::connect((host.as_str(), port)));
    let stream = tokio::select! {
        _ = stop.cancelled() => return Err(NodeError::ShuttingDown),
        result = attempt => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(NodeError::Connect { target, source }),
            Err(_) => return Err(NodeError::ConnectTimeout { target, timeout }),
        },
    };

    let addr = stream
        .peer_addr()
        .map_err(|source| NodeError::Connect { target: target.clone(), source })?;
    let peer = shared.adopt(stream, addr, Direction::Outbound)?;
    info!(peer = %peer, target = %target, "connected to peer");
    Ok(peer)
}
