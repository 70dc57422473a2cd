use rand::Rng as _;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

const CLIENT_PREFIX: &[u8; 8] = b"-RS0001-";

/// A 20-byte peer id.
///
/// Ids this client generates carry the client prefix followed by
/// random bytes; ids observed on the wire are treated as opaque.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Generates a fresh local peer id.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        let (prefix, suffix) = id.split_at_mut(CLIENT_PREFIX.len());
        prefix.copy_from_slice(CLIENT_PREFIX);
        rand::rng().fill(suffix);
        Self(id)
    }

    /// Wraps a peer id received on the wire.
    ///
    /// Returns `None` unless the slice is exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", *byte as char)?;
            } else {
                write!(f, "%{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

/// Protocol capabilities observed for a peer.
///
/// These are the capability bits a handshake's reserved bytes carry;
/// peer sources may also learn them out of band (e.g. from a tracker's
/// non-compact response or a PEX flags field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerOptions {
    /// DHT support ([BEP-5]).
    ///
    /// [BEP-5]: http://bittorrent.org/beps/bep_0005.html
    pub supports_dht: bool,
    /// Extension protocol support ([BEP-10]).
    ///
    /// [BEP-10]: http://bittorrent.org/beps/bep_0010.html
    pub supports_extension_protocol: bool,
    /// Fast extension support ([BEP-6]).
    ///
    /// [BEP-6]: http://bittorrent.org/beps/bep_0006.html
    pub supports_fast: bool,
}

/// A remote swarm endpoint.
///
/// Identity is the socket address alone: two peers at the same address
/// are the same peer regardless of peer id or options.
#[derive(Debug, Clone)]
pub struct Peer {
    addr: SocketAddr,
    peer_id: Option<PeerId>,
    options: PeerOptions,
}

impl Peer {
    /// Creates a peer known only by address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            peer_id: None,
            options: PeerOptions::default(),
        }
    }

    /// Creates a peer with a known id.
    pub fn with_id(addr: SocketAddr, peer_id: PeerId) -> Self {
        Self {
            addr,
            peer_id: Some(peer_id),
            options: PeerOptions::default(),
        }
    }

    /// Creates a fully described peer.
    pub fn with_options(addr: SocketAddr, peer_id: Option<PeerId>, options: PeerOptions) -> Self {
        Self {
            addr,
            peer_id,
            options,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id
    }

    pub fn options(&self) -> PeerOptions {
        self.options
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer_id {
            Some(id) => write!(f, "{} ({})", self.addr, id),
            None => write!(f, "{}", self.addr),
        }
    }
}
