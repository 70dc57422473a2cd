//! Tracker seam.
//!
//! The swarm core never speaks the tracker wire protocols itself; the
//! owning client supplies a [`TrackerService`] that knows which announce
//! URL schemes it can handle and builds [`Tracker`] clients for them
//! (HTTP, UDP, multi-tier fallback). Discovery only ever asks a tracker
//! one question: which peers are in this swarm right now.

use crate::peer::Peer;
use crate::torrent::{AnnounceKey, TorrentId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The tracker answered with a failure reason.
    #[error("tracker returned error: {0}")]
    Failure(String),

    /// The tracker's answer could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The query timed out.
    #[error("timeout")]
    Timeout,

    /// No client exists for the announce URL's scheme.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}

/// A tracker client bound to one announce key.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Announces for the torrent and returns the swarm peers the
    /// tracker reported.
    async fn announce(&self, torrent_id: &TorrentId) -> Result<Vec<Peer>, TrackerError>;
}

/// Builds tracker clients and vets announce URLs.
pub trait TrackerService: Send + Sync {
    /// Returns `true` if a client can be built for the URL's scheme.
    fn is_supported_protocol(&self, url: &str) -> bool;

    /// Builds (or reuses) a client for the announce key.
    fn tracker(&self, key: &AnnounceKey) -> Result<Arc<dyn Tracker>, TrackerError>;
}
