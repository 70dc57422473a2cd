use bytes::Bytes;

/// A peer wire protocol message.
///
/// Messages arrive already framed and decoded through the
/// [`Connection`](super::Connection) seam, so this is pure data: the
/// tagged variant the worker dispatches on. The variant set covers
/// everything a compliant peer may legally put on the wire, including
/// fast-extension and extension-protocol traffic the worker itself does
/// not speak — those surface as protocol errors rather than decode
/// failures.
#[derive(Debug, Clone)]
pub enum Message {
    /// Empty message to keep the connection alive.
    KeepAlive,
    /// The peer stops serving our requests.
    Choke,
    /// The peer resumes serving our requests.
    Unchoke,
    /// The peer wants our data.
    Interested,
    /// The peer no longer wants our data.
    NotInterested,
    /// The peer announces a newly acquired piece.
    Have { piece: u32 },
    /// The peer announces all pieces it holds.
    Bitfield(Bytes),
    /// The peer requests a block of data.
    Request { index: u32, begin: u32, length: u32 },
    /// Block data.
    Piece { index: u32, begin: u32, data: Bytes },
    /// The peer retracts a pending request.
    Cancel { index: u32, begin: u32, length: u32 },
    /// DHT port announcement.
    Port(u16),
    /// Suggested piece (fast extension).
    Suggest { piece: u32 },
    /// Seeder shortcut (fast extension).
    HaveAll,
    /// Empty-bitfield shortcut (fast extension).
    HaveNone,
    /// Rejected block request (fast extension).
    Reject { index: u32, begin: u32, length: u32 },
    /// Piece downloadable while choked (fast extension).
    AllowedFast { piece: u32 },
    /// Extension protocol message ([BEP-10]).
    ///
    /// [BEP-10]: http://bittorrent.org/beps/bep_0010.html
    Extended { id: u8, payload: Bytes },
}

impl Message {
    /// Wire-level name of the message, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::KeepAlive => "keep-alive",
            Message::Choke => "choke",
            Message::Unchoke => "unchoke",
            Message::Interested => "interested",
            Message::NotInterested => "not-interested",
            Message::Have { .. } => "have",
            Message::Bitfield(_) => "bitfield",
            Message::Request { .. } => "request",
            Message::Piece { .. } => "piece",
            Message::Cancel { .. } => "cancel",
            Message::Port(_) => "port",
            Message::Suggest { .. } => "suggest",
            Message::HaveAll => "have-all",
            Message::HaveNone => "have-none",
            Message::Reject { .. } => "reject",
            Message::AllowedFast { .. } => "allowed-fast",
            Message::Extended { .. } => "extended",
        }
    }
}
