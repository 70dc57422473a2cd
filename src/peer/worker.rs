use super::connection::Connection;
use super::error::WorkerError;
use super::message::Message;
use super::piece::{
    Block, BlockRequest, BlockWrite, PieceManager, MAX_PENDING_REQUESTS, REQUEST_REBUILD_TIMEOUT,
};
use super::state::ConnectionState;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Sink for block requests the peer sends us.
pub type RequestConsumer = Box<dyn FnMut(BlockRequest) + Send>;

/// Sink for blocks the peer sends us; returns the write handle the
/// data layer opened for the block.
pub type BlockConsumer = Box<dyn FnMut(Block) -> Arc<dyn BlockWrite> + Send>;

/// Source of blocks read back for the peer, `None` when nothing is
/// ready yet.
pub type BlockSupplier = Box<dyn FnMut() -> Option<Block> + Send>;

/// Drives the peer wire protocol over one live connection.
///
/// The worker is tick-driven: an external scheduler calls
/// [`do_work`](Self::do_work) repeatedly, and each tick reads at most
/// one inbound message and advances the outbound side (serving blocks,
/// interest management, request pipelining). The worker never blocks
/// and never schedules I/O of its own.
///
/// `do_work` is not re-entrant; schedule at most one invocation per
/// worker at a time. Any returned error is fatal to the connection.
pub struct ConnectionWorker {
    connection: Arc<dyn Connection>,
    piece_manager: Arc<dyn PieceManager>,

    request_consumer: RequestConsumer,
    block_consumer: BlockConsumer,
    block_supplier: BlockSupplier,

    state: ConnectionState,

    current_piece: Option<u32>,
    request_queue: VecDeque<BlockRequest>,
    pending_requests: HashSet<BlockRequest>,
    pending_writes: HashMap<BlockRequest, Arc<dyn BlockWrite>>,
    cancelled_peer_requests: HashSet<BlockRequest>,

    last_requests_built_at: Instant,

    received: u64,
    sent: u64,
}

impl ConnectionWorker {
    /// Creates a worker for the connection and announces our bitfield
    /// if we hold any data.
    pub fn new(
        connection: Arc<dyn Connection>,
        piece_manager: Arc<dyn PieceManager>,
        request_consumer: RequestConsumer,
        block_consumer: BlockConsumer,
        block_supplier: BlockSupplier,
    ) -> Result<Self, WorkerError> {
        let worker = Self {
            connection,
            piece_manager,
            request_consumer,
            block_consumer,
            block_supplier,
            state: ConnectionState::new(),
            current_piece: None,
            request_queue: VecDeque::new(),
            pending_requests: HashSet::new(),
            pending_writes: HashMap::new(),
            cancelled_peer_requests: HashSet::new(),
            last_requests_built_at: Instant::now(),
            received: 0,
            sent: 0,
        };

        if worker.piece_manager.have_any_data() {
            let bitfield = worker.piece_manager.bitfield();
            worker.post(Message::Bitfield(bitfield))?;
        }

        Ok(worker)
    }

    /// Bytes of block data received from the peer.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Bytes of block data sent to the peer.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Current choke/interest flags of the connection.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Advances the protocol by one tick.
    pub fn do_work(&mut self) -> Result<(), WorkerError> {
        self.check_connection()?;
        self.process_inbound()?;
        self.process_outbound()
    }

    fn check_connection(&self) -> Result<(), WorkerError> {
        if self.connection.is_closed() {
            return Err(WorkerError::ConnectionClosed(self.connection.remote_peer()));
        }
        Ok(())
    }

    fn process_inbound(&mut self) -> Result<(), WorkerError> {
        let peer = self.connection.remote_peer();
        let Some(message) = self.connection.read_message_now() else {
            return Ok(());
        };
        trace!("received {} from peer {}", message.kind(), peer);

        match message {
            Message::KeepAlive => {}
            Message::Bitfield(bitfield) => self.piece_manager.peer_has_bitfield(peer, bitfield),
            Message::Choke => self.state.set_peer_choking(true),
            Message::Unchoke => self.state.set_peer_choking(false),
            Message::Interested => self.state.set_peer_interested(true),
            Message::NotInterested => {
                self.state.set_peer_interested(false);
                self.post(Message::Choke)?;
                self.state.set_choking(true);
            }
            Message::Have { piece } => self.piece_manager.peer_has_piece(peer, piece),
            Message::Request {
                index,
                begin,
                length,
            } => {
                if !self.state.is_choking() {
                    (self.request_consumer)(BlockRequest::new(index, begin, length));
                }
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => {
                self.cancelled_peer_requests
                    .insert(BlockRequest::new(index, begin, length));
            }
            Message::Piece { index, begin, data } => {
                // the block must answer one of our in-flight requests
                let key = BlockRequest::new(index, begin, data.len() as u32);
                if !self.pending_requests.remove(&key) {
                    return Err(WorkerError::UnexpectedBlock {
                        peer,
                        piece_index: index,
                        offset: begin,
                        length: key.length,
                    });
                }
                trace!(
                    "{} requests left in queue for piece #{}",
                    self.request_queue.len(),
                    index
                );
                self.received += data.len() as u64;
                let write = (self.block_consumer)(Block::new(index, begin, data));
                self.pending_writes.insert(key, write);
            }
            Message::Port(_) => {}
            other => {
                return Err(WorkerError::UnexpectedMessage {
                    peer,
                    kind: other.kind(),
                });
            }
        }

        Ok(())
    }

    fn process_outbound(&mut self) -> Result<(), WorkerError> {
        let peer = self.connection.remote_peer();

        // serve blocks owed to the peer, unless the request was
        // retracted while the block was being read back
        while let Some(block) = (self.block_supplier)() {
            if self.cancelled_peer_requests.remove(&block.request()) {
                continue;
            }
            self.sent += block.data.len() as u64;
            self.post(Message::Piece {
                index: block.piece_index,
                begin: block.offset,
                data: block.data,
            })?;
        }

        if self.request_queue.is_empty() {
            match self.current_piece {
                Some(piece) => {
                    if self.piece_manager.check_piece_completed(piece) {
                        debug!("finished downloading piece #{} from peer {}", piece, peer);
                        self.current_piece = None;
                        self.pending_writes.clear();
                    }
                }
                None => {
                    if self.piece_manager.might_select_piece_for_peer(peer) {
                        if !self.state.is_interested() {
                            self.post(Message::Interested)?;
                            self.state.set_interested(true);
                        }
                    } else if self.state.is_interested() {
                        self.post(Message::NotInterested)?;
                        self.state.set_interested(false);
                    }
                }
            }
        }

        if self.state.is_peer_choking() {
            return Ok(());
        }

        match self.current_piece {
            None => {
                if let Some(piece) = self.piece_manager.select_piece_for_peer(peer) {
                    debug!("begin downloading piece #{} from peer {}", piece, peer);
                    self.current_piece = Some(piece);
                    self.request_queue
                        .extend(self.piece_manager.build_requests_for_piece(piece));
                    self.last_requests_built_at = Instant::now();
                    trace!(
                        "initialized request queue for piece #{}: {} requests",
                        piece,
                        self.request_queue.len()
                    );
                }
            }
            Some(piece) => {
                if self.request_queue.is_empty()
                    && self.last_requests_built_at.elapsed() >= REQUEST_REBUILD_TIMEOUT
                {
                    self.rebuild_requests(piece);
                }
            }
        }

        self.issue_requests()
    }

    /// Re-creates requests for the blocks of the current piece that are
    /// neither in flight nor sitting in a live or successful write.
    ///
    /// The data layer may discard received blocks (e.g. on a failed
    /// write); without this the piece would hang forever once the queue
    /// drained.
    fn rebuild_requests(&mut self, piece: u32) {
        for request in self.piece_manager.build_requests_for_piece(piece) {
            if self.pending_requests.contains(&request) {
                continue;
            }
            match self.pending_writes.get(&request) {
                None => self.request_queue.push_back(request),
                Some(write) if write.is_complete() && !write.is_success() => {
                    self.pending_writes.remove(&request);
                    self.request_queue.push_back(request);
                }
                Some(_) => {}
            }
        }
        self.last_requests_built_at = Instant::now();
        if !self.request_queue.is_empty() {
            trace!(
                "rebuilt request queue for piece #{}: {} requests",
                piece,
                self.request_queue.len()
            );
        }
    }

    fn issue_requests(&mut self) -> Result<(), WorkerError> {
        while self.pending_requests.len() < MAX_PENDING_REQUESTS {
            let Some(request) = self.request_queue.pop_front() else {
                break;
            };
            if self.pending_requests.contains(&request) {
                continue;
            }
            self.post(Message::Request {
                index: request.piece_index,
                begin: request.offset,
                length: request.length,
            })?;
            self.pending_requests.insert(request);
        }
        Ok(())
    }

    fn post(&self, message: Message) -> Result<(), WorkerError> {
        let kind = message.kind();
        self.connection
            .post_message(message)
            .map_err(|source| WorkerError::Send { kind, source })
    }
}

#[cfg(test)]
mod tests {
    use super::super::connection::SendError;
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const BLOCK: u32 = 16384;

    struct StubConnection {
        remote: SocketAddr,
        closed: AtomicBool,
        inbound: Mutex<VecDeque<Message>>,
        outbound: Mutex<Vec<Message>>,
    }

    impl StubConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                remote: "10.0.0.9:6881".parse().unwrap(),
                closed: AtomicBool::new(false),
                inbound: Mutex::new(VecDeque::new()),
                outbound: Mutex::new(Vec::new()),
            })
        }

        fn push_inbound(&self, message: Message) {
            self.inbound.lock().push_back(message);
        }

        fn posted(&self) -> Vec<Message> {
            self.outbound.lock().clone()
        }
    }

    impl Connection for StubConnection {
        fn read_message_now(&self) -> Option<Message> {
            self.inbound.lock().pop_front()
        }

        fn post_message(&self, message: Message) -> Result<(), SendError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SendError::Closed);
            }
            self.outbound.lock().push(message);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn remote_peer(&self) -> SocketAddr {
            self.remote
        }
    }

    #[derive(Default)]
    struct StubPieceManager {
        have_any: bool,
        our_bitfield: Bytes,
        selectable: Mutex<Option<u32>>,
        requests: Mutex<HashMap<u32, Vec<BlockRequest>>>,
        completed: Mutex<HashSet<u32>>,
        peer_bitfields: Mutex<Vec<(SocketAddr, Bytes)>>,
        peer_haves: Mutex<Vec<(SocketAddr, u32)>>,
    }

    impl PieceManager for StubPieceManager {
        fn have_any_data(&self) -> bool {
            self.have_any
        }

        fn bitfield(&self) -> Bytes {
            self.our_bitfield.clone()
        }

        fn peer_has_bitfield(&self, peer: SocketAddr, bitfield: Bytes) {
            self.peer_bitfields.lock().push((peer, bitfield));
        }

        fn peer_has_piece(&self, peer: SocketAddr, piece_index: u32) {
            self.peer_haves.lock().push((peer, piece_index));
        }

        fn might_select_piece_for_peer(&self, _peer: SocketAddr) -> bool {
            self.selectable.lock().is_some()
        }

        fn select_piece_for_peer(&self, _peer: SocketAddr) -> Option<u32> {
            self.selectable.lock().take()
        }

        fn build_requests_for_piece(&self, piece_index: u32) -> Vec<BlockRequest> {
            self.requests
                .lock()
                .get(&piece_index)
                .cloned()
                .unwrap_or_default()
        }

        fn check_piece_completed(&self, piece_index: u32) -> bool {
            self.completed.lock().contains(&piece_index)
        }
    }

    struct StubWrite {
        complete: bool,
        success: bool,
    }

    impl BlockWrite for StubWrite {
        fn is_complete(&self) -> bool {
            self.complete
        }

        fn is_success(&self) -> bool {
            self.success
        }
    }

    struct Fixture {
        connection: Arc<StubConnection>,
        manager: Arc<StubPieceManager>,
        consumed: Arc<Mutex<Vec<BlockRequest>>>,
        supplier: Arc<Mutex<VecDeque<Block>>>,
        worker: ConnectionWorker,
    }

    fn fixture(manager: StubPieceManager) -> Fixture {
        let connection = StubConnection::new();
        let manager = Arc::new(manager);
        let consumed = Arc::new(Mutex::new(Vec::new()));
        let supplier = Arc::new(Mutex::new(VecDeque::new()));

        let request_sink = consumed.clone();
        let block_queue = supplier.clone();
        let worker = ConnectionWorker::new(
            connection.clone(),
            manager.clone(),
            Box::new(move |request| request_sink.lock().push(request)),
            Box::new(|_block| {
                Arc::new(StubWrite {
                    complete: false,
                    success: false,
                }) as Arc<dyn BlockWrite>
            }),
            Box::new(move || block_queue.lock().pop_front()),
        )
        .unwrap();

        Fixture {
            connection,
            manager,
            consumed,
            supplier,
            worker,
        }
    }

    fn block_requests(piece: u32, count: u32) -> Vec<BlockRequest> {
        (0..count)
            .map(|i| BlockRequest::new(piece, i * BLOCK, BLOCK))
            .collect()
    }

    fn posted_requests(posted: &[Message]) -> Vec<BlockRequest> {
        posted
            .iter()
            .filter_map(|message| match message {
                Message::Request {
                    index,
                    begin,
                    length,
                } => Some(BlockRequest::new(*index, *begin, *length)),
                _ => None,
            })
            .collect()
    }

    fn block_of_zeroes(piece: u32, offset: u32) -> Block {
        Block::new(piece, offset, Bytes::from(vec![0u8; BLOCK as usize]))
    }

    #[test]
    fn test_posts_bitfield_on_construction() {
        let manager = StubPieceManager {
            have_any: true,
            our_bitfield: Bytes::from_static(&[0xff, 0x10]),
            ..Default::default()
        };
        let fx = fixture(manager);

        let posted = fx.connection.posted();
        assert_eq!(posted.len(), 1);
        match &posted[0] {
            Message::Bitfield(bits) => assert_eq!(bits.as_ref(), &[0xff, 0x10]),
            other => panic!("expected bitfield, got {}", other.kind()),
        }
    }

    #[test]
    fn test_no_bitfield_without_data() {
        let fx = fixture(StubPieceManager::default());
        assert!(fx.connection.posted().is_empty());
    }

    #[test]
    fn test_piece_download_pipeline() {
        let manager = StubPieceManager::default();
        *manager.selectable.lock() = Some(7);
        manager.requests.lock().insert(7, block_requests(7, 4));
        let mut fx = fixture(manager);

        // peer unchokes us; one tick gets us interested and pipelining
        fx.connection.push_inbound(Message::Unchoke);
        fx.worker.do_work().unwrap();

        let posted = fx.connection.posted();
        assert!(matches!(posted[0], Message::Interested));
        assert!(fx.worker.state.is_interested());
        assert_eq!(
            posted_requests(&posted),
            vec![
                BlockRequest::new(7, 0, BLOCK),
                BlockRequest::new(7, BLOCK, BLOCK),
                BlockRequest::new(7, 2 * BLOCK, BLOCK),
            ]
        );
        assert_eq!(fx.worker.current_piece, Some(7));
        assert_eq!(fx.worker.pending_requests.len(), 3);
        assert_eq!(fx.worker.request_queue.len(), 1);

        // first block arrives; the fourth request goes out
        fx.connection.push_inbound(Message::Piece {
            index: 7,
            begin: 0,
            data: Bytes::from(vec![0u8; BLOCK as usize]),
        });
        fx.worker.do_work().unwrap();

        assert!(!fx.worker.pending_requests.contains(&BlockRequest::new(7, 0, BLOCK)));
        assert!(fx
            .worker
            .pending_requests
            .contains(&BlockRequest::new(7, 3 * BLOCK, BLOCK)));
        assert_eq!(fx.worker.pending_requests.len(), 3);
        assert_eq!(fx.worker.received(), BLOCK as u64);
        assert!(fx.worker.pending_writes.contains_key(&BlockRequest::new(7, 0, BLOCK)));
    }

    #[test]
    fn test_piece_completion_clears_state() {
        let manager = StubPieceManager::default();
        manager.completed.lock().insert(2);
        let mut fx = fixture(manager);

        fx.worker.current_piece = Some(2);
        fx.worker.pending_writes.insert(
            BlockRequest::new(2, 0, BLOCK),
            Arc::new(StubWrite {
                complete: true,
                success: true,
            }),
        );

        fx.worker.do_work().unwrap();

        assert_eq!(fx.worker.current_piece, None);
        assert!(fx.worker.pending_writes.is_empty());
    }

    #[test]
    fn test_loses_interest_when_nothing_selectable() {
        let mut fx = fixture(StubPieceManager::default());
        fx.worker.state.set_interested(true);

        fx.worker.do_work().unwrap();

        assert!(!fx.worker.state.is_interested());
        let posted = fx.connection.posted();
        assert!(matches!(posted.last(), Some(Message::NotInterested)));
    }

    #[test]
    fn test_stall_rebuilds_failed_writes() {
        let manager = StubPieceManager::default();
        manager.requests.lock().insert(
            3,
            vec![
                BlockRequest::new(3, 0, BLOCK),
                BlockRequest::new(3, BLOCK, BLOCK),
            ],
        );
        let mut fx = fixture(manager);

        fx.worker.state.set_peer_choking(false);
        fx.worker.current_piece = Some(3);
        fx.worker.pending_writes.insert(
            BlockRequest::new(3, 0, BLOCK),
            Arc::new(StubWrite {
                complete: true,
                success: false,
            }),
        );
        fx.worker.pending_writes.insert(
            BlockRequest::new(3, BLOCK, BLOCK),
            Arc::new(StubWrite {
                complete: true,
                success: true,
            }),
        );
        fx.worker.last_requests_built_at = Instant::now() - Duration::from_secs(31);

        fx.worker.do_work().unwrap();

        // only the failed write is re-requested
        assert_eq!(
            posted_requests(&fx.connection.posted()),
            vec![BlockRequest::new(3, 0, BLOCK)]
        );
        assert!(fx.worker.pending_requests.contains(&BlockRequest::new(3, 0, BLOCK)));
        assert!(!fx.worker.pending_writes.contains_key(&BlockRequest::new(3, 0, BLOCK)));
        assert!(fx
            .worker
            .pending_writes
            .contains_key(&BlockRequest::new(3, BLOCK, BLOCK)));
    }

    #[test]
    fn test_no_rebuild_before_stall_timeout() {
        let manager = StubPieceManager::default();
        manager
            .requests
            .lock()
            .insert(3, vec![BlockRequest::new(3, 0, BLOCK)]);
        let mut fx = fixture(manager);

        fx.worker.state.set_peer_choking(false);
        fx.worker.current_piece = Some(3);

        fx.worker.do_work().unwrap();

        assert!(fx.connection.posted().is_empty());
    }

    #[test]
    fn test_request_ignored_while_choking() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection.push_inbound(Message::Request {
            index: 5,
            begin: 0,
            length: BLOCK,
        });
        fx.worker.do_work().unwrap();

        assert!(fx.consumed.lock().is_empty());
    }

    #[test]
    fn test_cancelled_request_is_not_served() {
        let mut fx = fixture(StubPieceManager::default());
        fx.worker.state.set_choking(false);

        fx.connection.push_inbound(Message::Request {
            index: 5,
            begin: 0,
            length: BLOCK,
        });
        fx.worker.do_work().unwrap();
        assert_eq!(
            fx.consumed.lock().as_slice(),
            &[BlockRequest::new(5, 0, BLOCK)]
        );

        fx.connection.push_inbound(Message::Cancel {
            index: 5,
            begin: 0,
            length: BLOCK,
        });
        fx.worker.do_work().unwrap();
        assert!(fx
            .worker
            .cancelled_peer_requests
            .contains(&BlockRequest::new(5, 0, BLOCK)));

        // the block becomes available only after the cancel
        fx.supplier.lock().push_back(block_of_zeroes(5, 0));
        fx.worker.do_work().unwrap();

        assert!(!fx
            .connection
            .posted()
            .iter()
            .any(|message| matches!(message, Message::Piece { .. })));
        assert!(fx.worker.cancelled_peer_requests.is_empty());
        assert_eq!(fx.worker.sent(), 0);
    }

    #[test]
    fn test_serves_block_and_counts_bytes() {
        let mut fx = fixture(StubPieceManager::default());

        fx.supplier.lock().push_back(block_of_zeroes(4, BLOCK));
        fx.worker.do_work().unwrap();

        let posted = fx.connection.posted();
        assert!(matches!(
            posted.last(),
            Some(Message::Piece { index: 4, begin, .. }) if *begin == BLOCK
        ));
        assert_eq!(fx.worker.sent(), BLOCK as u64);
    }

    #[test]
    fn test_not_interested_triggers_choke() {
        let mut fx = fixture(StubPieceManager::default());
        fx.worker.state.set_choking(false);
        fx.worker.state.set_peer_interested(true);

        fx.connection.push_inbound(Message::NotInterested);
        fx.worker.do_work().unwrap();

        assert!(!fx.worker.state.is_peer_interested());
        assert!(fx.worker.state.is_choking());
        assert!(matches!(fx.connection.posted()[0], Message::Choke));
    }

    #[test]
    fn test_bitfield_and_have_recorded() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection
            .push_inbound(Message::Bitfield(Bytes::from_static(&[0xa0])));
        fx.worker.do_work().unwrap();
        fx.connection.push_inbound(Message::Have { piece: 12 });
        fx.worker.do_work().unwrap();

        let bitfields = fx.manager.peer_bitfields.lock();
        assert_eq!(bitfields.len(), 1);
        assert_eq!(bitfields[0].0, fx.connection.remote);
        assert_eq!(bitfields[0].1.as_ref(), &[0xa0]);
        assert_eq!(*fx.manager.peer_haves.lock(), vec![(fx.connection.remote, 12)]);
    }

    #[test]
    fn test_unexpected_block_is_fatal() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection.push_inbound(Message::Piece {
            index: 1,
            begin: 0,
            data: Bytes::from(vec![0u8; BLOCK as usize]),
        });

        assert!(matches!(
            fx.worker.do_work(),
            Err(WorkerError::UnexpectedBlock { piece_index: 1, .. })
        ));
    }

    #[test]
    fn test_unexpected_message_is_fatal() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection.push_inbound(Message::HaveAll);

        assert!(matches!(
            fx.worker.do_work(),
            Err(WorkerError::UnexpectedMessage { kind: "have-all", .. })
        ));
    }

    #[test]
    fn test_closed_connection_is_fatal() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection.closed.store(true, Ordering::SeqCst);

        assert!(matches!(
            fx.worker.do_work(),
            Err(WorkerError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn test_keepalive_and_port_are_ignored() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection.push_inbound(Message::KeepAlive);
        fx.worker.do_work().unwrap();
        fx.connection.push_inbound(Message::Port(6881));
        fx.worker.do_work().unwrap();

        assert!(fx.connection.posted().is_empty());
        assert_eq!(fx.worker.state(), ConnectionState::new());
    }

    #[test]
    fn test_choke_and_unchoke_flip_peer_state() {
        let mut fx = fixture(StubPieceManager::default());

        fx.connection.push_inbound(Message::Unchoke);
        fx.worker.do_work().unwrap();
        assert!(!fx.worker.state.is_peer_choking());

        fx.connection.push_inbound(Message::Choke);
        fx.worker.do_work().unwrap();
        assert!(fx.worker.state.is_peer_choking());
    }
}
