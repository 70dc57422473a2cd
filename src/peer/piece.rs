//! Block types and the piece-manager seam.

use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;

/// Most block requests a worker keeps in flight toward one peer.
pub const MAX_PENDING_REQUESTS: usize = 3;

/// How long a worker sits on an empty request queue with an unfinished
/// piece before it rebuilds requests for the missing blocks.
pub const REQUEST_REBUILD_TIMEOUT: Duration = Duration::from_secs(30);

/// A request for a specific block of data.
///
/// The triple also serves as the identity of an in-flight transfer:
/// pending requests, pending writes and cancelled uploads are all keyed
/// by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    /// The piece index.
    pub piece_index: u32,
    /// Byte offset within the piece.
    pub offset: u32,
    /// Length of the block in bytes.
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// A block of piece data, received from a peer or read back for one.
#[derive(Debug, Clone)]
pub struct Block {
    /// The piece index.
    pub piece_index: u32,
    /// Byte offset within the piece.
    pub offset: u32,
    /// The block data.
    pub data: Bytes,
}

impl Block {
    pub fn new(piece_index: u32, offset: u32, data: Bytes) -> Self {
        Self {
            piece_index,
            offset,
            data,
        }
    }

    /// The request key this block answers.
    pub fn request(&self) -> BlockRequest {
        BlockRequest {
            piece_index: self.piece_index,
            offset: self.offset,
            length: self.data.len() as u32,
        }
    }
}

/// Handle to an in-progress disk write of a received block.
pub trait BlockWrite: Send + Sync {
    /// The write has finished, successfully or not.
    fn is_complete(&self) -> bool;

    /// The write finished and the data is durable.
    fn is_success(&self) -> bool;
}

/// Piece bookkeeping and selection, owned by the torrent session.
///
/// Connections are identified by their remote address; the manager
/// keeps whatever per-peer state it needs (bitfields, availability)
/// keyed by that handle, so workers and the manager never own each
/// other.
pub trait PieceManager: Send + Sync {
    /// We hold at least one verified piece.
    fn have_any_data(&self) -> bool;

    /// Our bitfield, ready to put on the wire.
    fn bitfield(&self) -> Bytes;

    /// Records the peer's announced bitfield.
    fn peer_has_bitfield(&self, peer: SocketAddr, bitfield: Bytes);

    /// Records a single piece announcement from the peer.
    fn peer_has_piece(&self, peer: SocketAddr, piece_index: u32);

    /// The peer has at least one piece we could want.
    fn might_select_piece_for_peer(&self, peer: SocketAddr) -> bool;

    /// Assigns the next piece to download from the peer, if any.
    fn select_piece_for_peer(&self, peer: SocketAddr) -> Option<u32>;

    /// Block requests still needed for the piece.
    fn build_requests_for_piece(&self, piece_index: u32) -> Vec<BlockRequest>;

    /// The piece has all blocks and passed verification.
    fn check_piece_completed(&self, piece_index: u32) -> bool;
}
