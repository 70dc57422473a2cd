//! Peer discovery across all active torrents.
//!
//! The [`PeerRegistry`] is the single place the rest of the client
//! learns about swarm peers from. It runs one periodic sweep over every
//! torrent that has subscribers, pulls candidates out of tracker and
//! plug-in peer sources, interns them in the [`PeerCache`] and fans the
//! canonical records out to the subscribers (typically the connection
//! manager). Private torrents ([BEP-27]) are only ever announced to
//! their own tracker.
//!
//! [BEP-27]: http://bittorrent.org/beps/bep_0027.html

mod cache;
mod error;
mod source;

pub use cache::{CachedPeer, PeerCache};
pub use error::SourceError;
pub use source::{PeerSource, PeerSourceFactory, TrackerPeerSource};

use crate::identity::IdentityService;
use crate::lifecycle::LifecycleBinder;
use crate::peer::Peer;
use crate::torrent::{AnnounceKey, TorrentId, TorrentRegistry};
use crate::tracker::TrackerService;
use dashmap::DashMap;
use parking_lot::Mutex;
use source::TrackerSourceFactory;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

/// A subscriber callback receiving discovered peers.
///
/// Callbacks run synchronously on the discovery task and must return
/// promptly; hand the peer off to your own executor if connecting takes
/// time. A returned error is logged and does not stop delivery to other
/// subscribers.
pub type PeerSink = Arc<
    dyn Fn(&Arc<CachedPeer>) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Registry construction parameters. All fields are mandatory.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Address this client is reachable at.
    pub local_address: IpAddr,
    /// Port this client listens on.
    pub local_port: u16,
    /// Cadence of the discovery sweep.
    pub peer_discovery_interval: Duration,
    /// Minimum interval between queries to one tracker.
    pub tracker_query_interval: Duration,
}

/// Multiplexes peer discovery across all active torrents.
///
/// Construct once at startup, wrap in an `Arc`, and either call
/// [`start`](Self::start) directly or register with a
/// [`LifecycleBinder`] via [`bind`](Self::bind).
pub struct PeerRegistry {
    local_peer: Peer,
    cache: PeerCache,
    torrents: Arc<dyn TorrentRegistry>,
    tracker_sources: TrackerSourceFactory,
    extra_source_factories: Vec<Arc<dyn PeerSourceFactory>>,
    consumers: DashMap<TorrentId, Vec<PeerSink>>,
    extra_announce_keys: Mutex<HashMap<TorrentId, HashSet<AnnounceKey>>>,
    discovery_interval: Duration,
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl PeerRegistry {
    pub fn new(
        config: RegistryConfig,
        identity: &dyn IdentityService,
        torrents: Arc<dyn TorrentRegistry>,
        tracker_service: Arc<dyn TrackerService>,
        extra_source_factories: Vec<Arc<dyn PeerSourceFactory>>,
    ) -> Self {
        let local_addr = SocketAddr::new(config.local_address, config.local_port);
        Self {
            local_peer: Peer::with_id(local_addr, identity.local_peer_id()),
            cache: PeerCache::new(),
            torrents,
            tracker_sources: TrackerSourceFactory::new(
                tracker_service,
                config.tracker_query_interval,
            ),
            extra_source_factories,
            consumers: DashMap::new(),
            extra_announce_keys: Mutex::new(HashMap::new()),
            discovery_interval: config.peer_discovery_interval,
            collector: Mutex::new(None),
        }
    }

    /// This client's own peer identity.
    pub fn local_peer(&self) -> &Peer {
        &self.local_peer
    }

    /// The cached record for an address, interned on first sight.
    pub fn peer_for_address(&self, addr: SocketAddr) -> Arc<CachedPeer> {
        self.cache.lookup(addr)
    }

    /// Interns a discovered peer and delivers it to the torrent's
    /// subscribers.
    ///
    /// A peer that is really this client (unspecified address with our
    /// port) is dropped silently, before it can enter the cache.
    pub fn add_peer(&self, torrent_id: &TorrentId, peer: Peer) {
        if self.is_local(&peer) {
            trace!("dropping local peer {}", peer);
            return;
        }
        let cached = self.cache.register(&peer);

        // clone the subscriber list out of the map so a subscriber
        // registering mid-delivery never races the iteration
        let consumers = match self.consumers.get(torrent_id) {
            Some(list) => list.value().clone(),
            None => return,
        };
        for consumer in consumers {
            if let Err(err) = (*consumer)(&cached) {
                warn!("peer consumer failed for {}: {}", cached, err);
            }
        }
    }

    /// Subscribes a callback to the torrent's discovered peers.
    ///
    /// Subscribers form a list, not a set: registering the same
    /// callback twice delivers every peer twice.
    pub fn add_peer_consumer(&self, torrent_id: &TorrentId, consumer: PeerSink) {
        self.consumers.entry(*torrent_id).or_default().push(consumer);
    }

    /// Drops all subscribers for the torrent.
    // TODO: wire this into the torrent lifecycle so it runs when a
    // torrent is stopped or completed
    pub fn remove_peer_consumers(&self, torrent_id: &TorrentId) {
        self.consumers.remove(torrent_id);
    }

    /// Adds a user-supplied tracker for the torrent.
    pub fn add_peer_source(&self, torrent_id: &TorrentId, announce_key: AnnounceKey) {
        self.extra_announce_keys
            .lock()
            .entry(*torrent_id)
            .or_default()
            .insert(announce_key);
    }

    fn is_local(&self, peer: &Peer) -> bool {
        peer.addr().ip().is_unspecified() && peer.addr().port() == self.local_peer.addr().port()
    }

    /// Spawns the `peer-collector` sweep: first tick after 1 ms, then
    /// every `peer_discovery_interval`. A second call is a no-op while
    /// the task is running.
    pub fn start(self: Arc<Self>) {
        let mut collector = self.collector.lock();
        if collector.is_some() {
            return;
        }
        let registry = Arc::clone(&self);
        *collector = Some(tokio::spawn(async move {
            let first = tokio::time::Instant::now() + Duration::from_millis(1);
            let mut ticks = tokio::time::interval_at(first, registry.discovery_interval);
            loop {
                ticks.tick().await;
                registry.collect_and_visit_peers().await;
            }
        }));
    }

    /// Stops the sweep immediately; an in-flight query is abandoned.
    pub fn shutdown(&self) {
        if let Some(task) = self.collector.lock().take() {
            task.abort();
        }
    }

    /// Registers start/shutdown of the sweep with the process
    /// lifecycle.
    pub fn bind(self: Arc<Self>, lifecycle: &dyn LifecycleBinder) {
        let registry = Arc::clone(&self);
        lifecycle.on_startup(
            "schedule periodic peer lookup",
            Box::new(move || registry.start()),
        );
        lifecycle.on_shutdown(
            "shutdown peer lookup scheduler",
            Box::new(move || self.shutdown()),
        );
    }

    /// One discovery sweep over every torrent that has subscribers.
    async fn collect_and_visit_peers(&self) {
        let torrent_ids: Vec<TorrentId> = self.consumers.iter().map(|entry| *entry.key()).collect();

        for torrent_id in torrent_ids {
            let Some(descriptor) = self.torrents.descriptor(&torrent_id) else {
                continue;
            };
            if !descriptor.is_active() {
                continue;
            }

            let torrent = self.torrents.torrent(&torrent_id);
            let announce_key = torrent.as_ref().and_then(|t| t.announce_key().cloned());
            let is_private = torrent.as_ref().map(|t| t.is_private()).unwrap_or(false);

            // snapshot under the lock; the queries below may block on
            // tracker I/O and must not hold up add_peer_source callers
            let mut extra_keys = {
                let keys = self.extra_announce_keys.lock();
                keys.get(&torrent_id)
                    .map(|set| set.iter().cloned().collect::<Vec<_>>())
                    .unwrap_or_default()
            };

            if is_private && !extra_keys.is_empty() {
                // private torrents may only announce to their own
                // tracker (BEP-27)
                warn!(
                    "will not query extra trackers for private torrent, id: {}",
                    torrent_id
                );
                extra_keys.clear();
            }

            if let Some(key) = announce_key {
                self.query_tracker(&torrent_id, &key).await;
            }
            for key in extra_keys {
                self.query_tracker(&torrent_id, &key).await;
            }

            if !is_private {
                for factory in &self.extra_source_factories {
                    let source = factory.peer_source(&torrent_id);
                    self.query_source(&torrent_id, source.as_ref()).await;
                }
            }
        }
    }

    async fn query_tracker(&self, torrent_id: &TorrentId, key: &AnnounceKey) {
        trace!(
            "querying tracker peer source (announce key: {}) for torrent id: {}",
            key,
            torrent_id
        );
        // unsupported protocols are skipped silently
        let Some(source) = self.tracker_sources.source(torrent_id, key) else {
            return;
        };
        self.query_source(torrent_id, source.as_ref()).await;
    }

    async fn query_source(&self, torrent_id: &TorrentId, source: &dyn PeerSource) {
        match source.update().await {
            Ok(true) => {
                for peer in source.peers() {
                    self.add_peer(torrent_id, peer);
                }
            }
            Ok(false) => {}
            Err(err) => {
                error!("error when querying peer source for {}: {}", torrent_id, err);
            }
        }
    }
}
