use super::message::Message;
use std::net::SocketAddr;
use thiserror::Error;

/// Posting a message into the connection's outbound queue failed.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection is gone.
    #[error("connection closed")]
    Closed,

    /// The connection refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// One framed peer link, owned by the connection manager and shared
/// with its worker.
///
/// Implementations do the socket I/O, length-prefix framing and
/// handshake elsewhere; the worker only ever polls for the next decoded
/// message and queues outbound ones, so both methods must be
/// non-blocking.
pub trait Connection: Send + Sync {
    /// The next already-received message, if one is buffered.
    fn read_message_now(&self) -> Option<Message>;

    /// Queues a message for sending.
    fn post_message(&self, message: Message) -> Result<(), SendError>;

    /// The link is no longer usable.
    fn is_closed(&self) -> bool;

    /// Remote endpoint of the link.
    fn remote_peer(&self) -> SocketAddr;
}
