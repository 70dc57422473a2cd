use super::connection::SendError;
use std::net::SocketAddr;
use thiserror::Error;

/// Fatal failures of a connection worker.
///
/// Any of these tears the connection down; the worker is the unit of
/// quarantine for protocol misbehavior.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The link closed under us.
    #[error("connection closed: {0}")]
    ConnectionClosed(SocketAddr),

    /// The peer sent a block we never asked for.
    #[error("unexpected block {piece_index}:{offset}+{length} from {peer}")]
    UnexpectedBlock {
        peer: SocketAddr,
        piece_index: u32,
        offset: u32,
        length: u32,
    },

    /// The peer sent a message the worker does not speak.
    #[error("unexpected {kind} message from {peer}")]
    UnexpectedMessage {
        peer: SocketAddr,
        kind: &'static str,
    },

    /// The outbound queue refused a message.
    #[error("failed to send {kind}: {source}")]
    Send {
        kind: &'static str,
        #[source]
        source: SendError,
    },
}
