use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Connect attempts give up after this long unless configured otherwise.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Lines that may wait for a slow peer before it is dropped.
pub const DEFAULT_SEND_QUEUE_DEPTH: usize = 256;

/// Settings fixed for the lifetime of a node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address the listener binds. Port 0 picks a free port.
    pub listen_addr: SocketAddr,
    /// Name prefixed to every message this node broadcasts.
    pub username: String,
    pub connect_timeout: Duration,
    /// Per-peer limit on unwritten lines. A peer that falls this far behind is disconnected.
    pub send_queue_depth: usize,
}

impl NodeConfig {
    /// Listen on every interface at `port`.
    pub fn new(port: u16, username: impl Into<String>) -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            username: username.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
        }
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_send_queue_depth(mut self, depth: usize) -> Self {
        self.send_queue_depth = depth;
        self
    }
}
