//! Torrent identity and the torrent registry seam.
//!
//! The swarm core does not parse metainfo; it only needs a torrent's
//! identity (the v1 info hash), its announce declaration ([BEP-12]
//! multi-tracker lists included) and its private flag ([BEP-27]). The
//! owning client supplies those through the [`TorrentRegistry`] trait.
//!
//! [BEP-12]: http://bittorrent.org/beps/bep_0012.html
//! [BEP-27]: http://bittorrent.org/beps/bep_0027.html

use std::fmt;
use std::sync::Arc;

/// A torrent's identity: the 20-byte SHA1 info hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TorrentId(pub [u8; 20]);

impl TorrentId {
    /// Creates a torrent id from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the info hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Converts to a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        self.0
            .iter()
            .fold(String::with_capacity(40), |mut s, b| {
                use std::fmt::Write;
                let _ = write!(s, "{:02x}", b);
                s
            })
    }
}

impl fmt::Debug for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TorrentId({})", self.to_hex())
    }
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A torrent's tracker declaration.
///
/// Either a single announce URL or the tiered list-of-lists from an
/// `announce-list` ([BEP-12]): tiers are tried in order, trackers within
/// a tier are equivalent.
///
/// [BEP-12]: http://bittorrent.org/beps/bep_0012.html
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnnounceKey {
    /// A single `announce` URL.
    Single(String),
    /// A tiered `announce-list`.
    Tiered(Vec<Vec<String>>),
}

impl AnnounceKey {
    /// Creates a single-tracker key.
    pub fn single(url: impl Into<String>) -> Self {
        AnnounceKey::Single(url.into())
    }

    /// Creates a multi-tracker key from announce-list tiers.
    pub fn tiered(tiers: Vec<Vec<String>>) -> Self {
        AnnounceKey::Tiered(tiers)
    }

    /// Returns `true` for a tiered multi-tracker key.
    pub fn is_multi(&self) -> bool {
        matches!(self, AnnounceKey::Tiered(_))
    }

    /// All tracker URLs in tier order.
    pub fn urls(&self) -> Vec<&str> {
        match self {
            AnnounceKey::Single(url) => vec![url.as_str()],
            AnnounceKey::Tiered(tiers) => tiers
                .iter()
                .flat_map(|tier| tier.iter().map(String::as_str))
                .collect(),
        }
    }
}

impl fmt::Display for AnnounceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnounceKey::Single(url) => write!(f, "{}", url),
            AnnounceKey::Tiered(_) => write!(f, "[{}]", self.urls().join(", ")),
        }
    }
}

/// The slice of a torrent the swarm core cares about.
#[derive(Debug, Clone)]
pub struct Torrent {
    id: TorrentId,
    announce_key: Option<AnnounceKey>,
    private: bool,
}

impl Torrent {
    pub fn new(id: TorrentId, announce_key: Option<AnnounceKey>, private: bool) -> Self {
        Self {
            id,
            announce_key,
            private,
        }
    }

    pub fn id(&self) -> TorrentId {
        self.id
    }

    pub fn announce_key(&self) -> Option<&AnnounceKey> {
        self.announce_key.as_ref()
    }

    /// Returns `true` if the torrent is flagged `private=1` ([BEP-27]).
    ///
    /// [BEP-27]: http://bittorrent.org/beps/bep_0027.html
    pub fn is_private(&self) -> bool {
        self.private
    }
}

/// Runtime state of a registered torrent.
#[derive(Debug, Clone, Copy)]
pub struct TorrentDescriptor {
    active: bool,
}

impl TorrentDescriptor {
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// The owning client's directory of torrents.
pub trait TorrentRegistry: Send + Sync {
    /// Runtime descriptor for a torrent, if it is registered.
    fn descriptor(&self, id: &TorrentId) -> Option<TorrentDescriptor>;

    /// The torrent's metadata slice, if known.
    fn torrent(&self, id: &TorrentId) -> Option<Arc<Torrent>>;
}
