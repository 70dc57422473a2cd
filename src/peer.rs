//! Peer wire protocol ([BEP-3]).
//!
//! This module holds the per-connection half of the swarm core: the
//! protocol message variants, the four-flag connection state, and the
//! [`ConnectionWorker`] state machine that drives one live connection
//! tick by tick. Framing and socket I/O stay behind the [`Connection`]
//! trait; piece selection stays behind [`PieceManager`].
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod connection;
mod error;
mod info;
mod message;
mod piece;
mod state;
mod worker;

pub use connection::{Connection, SendError};
pub use error::WorkerError;
pub use info::{Peer, PeerId, PeerOptions};
pub use message::Message;
pub use piece::{
    Block, BlockRequest, BlockWrite, PieceManager, MAX_PENDING_REQUESTS, REQUEST_REBUILD_TIMEOUT,
};
pub use state::ConnectionState;
pub use worker::{BlockConsumer, BlockSupplier, ConnectionWorker, RequestConsumer};
