use crate::peer::{Peer, PeerId, PeerOptions};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// A peer record interned in the [`PeerCache`].
///
/// Address and peer id are frozen when the record is created; only the
/// options are replaced when a source observes the peer again. The
/// record is shared as `Arc<CachedPeer>`, so every subsystem holding
/// "the peer at 1.2.3.4:6881" holds the same object.
pub struct CachedPeer {
    addr: SocketAddr,
    peer_id: Option<PeerId>,
    options: RwLock<PeerOptions>,
}

impl CachedPeer {
    fn from_peer(peer: &Peer) -> Self {
        Self {
            addr: peer.addr(),
            peer_id: peer.peer_id(),
            options: RwLock::new(peer.options()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id
    }

    /// The most recently observed options.
    pub fn options(&self) -> PeerOptions {
        *self.options.read()
    }

    fn set_options(&self, options: PeerOptions) {
        *self.options.write() = options;
    }
}

impl fmt::Debug for CachedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPeer")
            .field("addr", &self.addr)
            .field("peer_id", &self.peer_id)
            .finish()
    }
}

impl fmt::Display for CachedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Canonical directory of every peer the client has seen.
///
/// At most one record exists per endpoint. All mutation goes through
/// one mutex so that a `register` from a peer source can never race a
/// `lookup` from the connection manager into two records for the same
/// address. Records live for the process lifetime; pruning, if any, is
/// a higher layer's call.
pub struct PeerCache {
    known_peers: Mutex<HashMap<SocketAddr, Arc<CachedPeer>>>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self {
            known_peers: Mutex::new(HashMap::new()),
        }
    }

    /// Interns a peer observation.
    ///
    /// A first observation creates the record; a repeat observation
    /// keeps the existing record and replaces its options.
    pub fn register(&self, peer: &Peer) -> Arc<CachedPeer> {
        let mut known = self.known_peers.lock();
        match known.entry(peer.addr()) {
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                existing.set_options(peer.options());
                existing
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(CachedPeer::from_peer(peer)))),
        }
    }

    /// The record for an address, interning a minimal one if the
    /// address has never been seen.
    pub fn lookup(&self, addr: SocketAddr) -> Arc<CachedPeer> {
        let mut known = self.known_peers.lock();
        Arc::clone(
            known
                .entry(addr)
                .or_insert_with(|| Arc::new(CachedPeer::from_peer(&Peer::new(addr)))),
        )
    }

    /// Whether an address has a record.
    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.known_peers.lock().contains_key(&addr)
    }

    /// Number of known endpoints.
    pub fn len(&self) -> usize {
        self.known_peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_peers.lock().is_empty()
    }
}

impl Default for PeerCache {
    fn default() -> Self {
        Self::new()
    }
}
