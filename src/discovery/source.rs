use super::error::SourceError;
use crate::peer::Peer;
use crate::torrent::{AnnounceKey, TorrentId};
use crate::tracker::{Tracker, TrackerService};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A pull-based supplier of candidate peers for one torrent.
///
/// Sources are rate-limited internally: [`update`](Self::update)
/// returns `Ok(false)` when the source has nothing new (or is not
/// willing to refresh yet), and `Ok(true)` when a fresh snapshot is
/// available through [`peers`](Self::peers).
///
/// Sources take `&self` and keep their own state, so a factory can
/// cache one source per torrent and have its rate-limit clock survive
/// across discovery sweeps.
#[async_trait]
pub trait PeerSource: Send + Sync {
    /// Attempts to refresh the candidate set.
    async fn update(&self) -> Result<bool, SourceError>;

    /// The current candidate snapshot.
    fn peers(&self) -> Vec<Peer>;
}

/// Builds peer sources for torrents.
///
/// This is the plug-in seam: PEX, DHT or any other discovery mechanism
/// joins the sweep by registering a factory with the registry.
pub trait PeerSourceFactory: Send + Sync {
    fn peer_source(&self, torrent_id: &TorrentId) -> Arc<dyn PeerSource>;
}

struct TrackerSourceState {
    last_queried: Option<Instant>,
    peers: Vec<Peer>,
}

/// Peer source backed by a tracker client.
///
/// Honors a minimum interval between successful queries; a failed query
/// does not consume the interval, so the tracker is retried on the next
/// sweep.
pub struct TrackerPeerSource {
    tracker: Arc<dyn Tracker>,
    torrent_id: TorrentId,
    query_interval: Duration,
    state: Mutex<TrackerSourceState>,
}

impl TrackerPeerSource {
    pub fn new(tracker: Arc<dyn Tracker>, torrent_id: TorrentId, query_interval: Duration) -> Self {
        Self {
            tracker,
            torrent_id,
            query_interval,
            state: Mutex::new(TrackerSourceState {
                last_queried: None,
                peers: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl PeerSource for TrackerPeerSource {
    async fn update(&self) -> Result<bool, SourceError> {
        {
            let state = self.state.lock();
            if let Some(last) = state.last_queried {
                if last.elapsed() < self.query_interval {
                    return Ok(false);
                }
            }
        }

        let peers = self.tracker.announce(&self.torrent_id).await?;

        let mut state = self.state.lock();
        state.last_queried = Some(Instant::now());
        state.peers = peers;
        Ok(true)
    }

    fn peers(&self) -> Vec<Peer> {
        self.state.lock().peers.clone()
    }
}

/// Builds and caches one rate-limited tracker source per
/// (torrent, announce key) pair.
pub(crate) struct TrackerSourceFactory {
    tracker_service: Arc<dyn TrackerService>,
    query_interval: Duration,
    sources: DashMap<(TorrentId, AnnounceKey), Arc<TrackerPeerSource>>,
}

impl TrackerSourceFactory {
    pub(crate) fn new(tracker_service: Arc<dyn TrackerService>, query_interval: Duration) -> Self {
        Self {
            tracker_service,
            query_interval,
            sources: DashMap::new(),
        }
    }

    /// The source for the pair, or `None` when the announce key's
    /// protocol is unsupported.
    pub(crate) fn source(
        &self,
        torrent_id: &TorrentId,
        key: &AnnounceKey,
    ) -> Option<Arc<TrackerPeerSource>> {
        if !self.supports(key) {
            return None;
        }

        use dashmap::mapref::entry::Entry;
        match self.sources.entry((*torrent_id, key.clone())) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let tracker = match self.tracker_service.tracker(key) {
                    Ok(tracker) => tracker,
                    Err(err) => {
                        warn!("failed to create tracker client for {}: {}", key, err);
                        return None;
                    }
                };
                let source = Arc::new(TrackerPeerSource::new(
                    tracker,
                    *torrent_id,
                    self.query_interval,
                ));
                entry.insert(Arc::clone(&source));
                Some(source)
            }
        }
    }

    // A tiered key is only usable when every URL in every tier is
    // supported.
    fn supports(&self, key: &AnnounceKey) -> bool {
        key.urls()
            .iter()
            .all(|url| self.tracker_service.is_supported_protocol(url))
    }
}
