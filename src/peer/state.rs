/// Choke and interest flags for one connection.
///
/// Both directions start choked and not interested, per the base
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    choking: bool,
    interested: bool,
    peer_choking: bool,
    peer_interested: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            choking: true,
            interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// We are choking the peer.
    pub fn is_choking(&self) -> bool {
        self.choking
    }

    pub fn set_choking(&mut self, choking: bool) {
        self.choking = choking;
    }

    /// We are interested in the peer's data.
    pub fn is_interested(&self) -> bool {
        self.interested
    }

    pub fn set_interested(&mut self, interested: bool) {
        self.interested = interested;
    }

    /// The peer is choking us.
    pub fn is_peer_choking(&self) -> bool {
        self.peer_choking
    }

    pub fn set_peer_choking(&mut self, peer_choking: bool) {
        self.peer_choking = peer_choking;
    }

    /// The peer is interested in our data.
    pub fn is_peer_interested(&self) -> bool {
        self.peer_interested
    }

    pub fn set_peer_interested(&mut self, peer_interested: bool) {
        self.peer_interested = peer_interested;
    }
}
