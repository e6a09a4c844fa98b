//! Bookkeeping for accepted connections.
//!
//! The registry owns every connection the listening socket has admitted,
//! keyed by an opaque handle it mints itself. Pure bookkeeping: no network
//! I/O happens here, and the event loop is the only mutator.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use tokio::net::TcpStream;

// ── PeerId ───────────────────────────────────────────────────────

/// Opaque, stable handle for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

// ── PeerConnection ───────────────────────────────────────────────

/// An accepted connection and the address it came from.
///
/// Created on accept, destroyed only at process teardown — the protocol
/// never proactively closes a peer on protocol events.
#[derive(Debug)]
pub struct PeerConnection {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PeerConnection {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self { stream, addr }
    }

    /// The underlying socket.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Remote address of the connection.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

// ── Registry ─────────────────────────────────────────────────────

/// Owns the set of accepted connections, keyed by [`PeerId`].
#[derive(Debug, Default)]
pub struct Registry {
    next_id: u64,
    peers: HashMap<PeerId, PeerConnection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection and mint its handle.
    pub fn insert(&mut self, conn: PeerConnection) -> PeerId {
        let id = PeerId(self.next_id);
        self.next_id += 1;
        self.peers.insert(id, conn);
        id
    }

    /// Remove a connection by handle.
    ///
    /// An absent handle is a no-op, not an error — cleanup during shutdown
    /// stays idempotent.
    pub fn remove(&mut self, id: PeerId) -> Option<PeerConnection> {
        self.peers.remove(&id)
    }

    /// Whether the handle is currently tracked.
    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Look up a connection by handle.
    pub fn get(&self, id: PeerId) -> Option<&PeerConnection> {
        self.peers.get(&id)
    }

    /// All tracked connections, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values()
    }

    /// All tracked connections with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, &PeerConnection)> {
        self.peers.iter().map(|(id, conn)| (*id, conn))
    }

    /// Tracked handles, sorted. Used for invariant checks against the
    /// multiplexer's registered-peer set.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Remove and return every tracked connection.
    pub fn drain(&mut self) -> Vec<(PeerId, PeerConnection)> {
        self.peers.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
