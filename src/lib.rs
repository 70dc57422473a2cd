//! rswarm - A BitTorrent swarm engine
//!
//! This library implements the core of a BitTorrent client: discovering
//! swarm peers across many concurrent torrents and exchanging pieces
//! with them over the peer wire protocol. Everything around that core -
//! metainfo parsing, tracker wire clients, disk storage, socket framing
//! and piece selection - is reached through traits the owning client
//! implements.
//!
//! # Modules
//!
//! - [`discovery`] - Peer registry, peer cache and peer sources
//! - [`peer`] - BEP-3 peer wire protocol state machine and types
//! - [`torrent`] - Torrent identity and the torrent registry seam
//! - [`tracker`] - Tracker client seam
//! - [`identity`] - Local peer identity
//! - [`lifecycle`] - Startup/shutdown hook binding
//!
//! # Overview
//!
//! The [`PeerRegistry`] runs a periodic sweep over every torrent that
//! has subscribers, pulling candidates from tracker and plug-in peer
//! sources and interning them in a process-wide [`PeerCache`]. The
//! connection manager subscribes to the registry, opens sockets, and
//! hands each live connection to a [`ConnectionWorker`] that it ticks
//! from its own scheduler.

pub mod discovery;
pub mod identity;
pub mod lifecycle;
pub mod peer;
pub mod torrent;
pub mod tracker;

pub use discovery::{
    CachedPeer, PeerCache, PeerRegistry, PeerSink, PeerSource, PeerSourceFactory, RegistryConfig,
    SourceError, TrackerPeerSource,
};
pub use identity::{Identity, IdentityService};
pub use lifecycle::{LifecycleBinder, LifecycleHook, RuntimeLifecycle};
pub use peer::{
    Block, BlockConsumer, BlockRequest, BlockSupplier, BlockWrite, Connection, ConnectionState,
    ConnectionWorker, Message, Peer, PeerId, PeerOptions, PieceManager, RequestConsumer,
    SendError, WorkerError, MAX_PENDING_REQUESTS, REQUEST_REBUILD_TIMEOUT,
};
pub use torrent::{AnnounceKey, Torrent, TorrentDescriptor, TorrentId, TorrentRegistry};
pub use tracker::{Tracker, TrackerError, TrackerService};
