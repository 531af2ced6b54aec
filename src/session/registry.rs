use crate::error::WriteError;

use super::decoder::InboundDecoder;

/// An open bidirectional byte stream to one peer.
pub trait PeerConnection {
    fn is_writable(&self) -> bool;
    fn write(&mut self, frame: &[u8]) -> Result<(), WriteError>;
    fn close(&mut self);
}

struct PeerEntry<C> {
    id: String,
    connection: C,
    decoder: InboundDecoder,
}

/// Open connections keyed by peer id, kept in registration order.
pub struct Registry<C> {
    peers: Vec<PeerEntry<C>>,
}

impl<C: PeerConnection> Registry<C> {
    pub fn new() -> Self {
        Self { peers: Vec::new() }
    }

    /// Registers `peer_id` and returns the new peer count.
    ///
    /// A second connection for an already registered peer replaces the old
    /// one in place; the count does not change.
    pub fn on_peer_connected(&mut self, peer_id: &str, connection: C) -> usize {
        if let Some(entry) = self.peers.iter_mut().find(|entry| entry.id == peer_id) {
            log::debug!("Replacing connection for already registered peer {peer_id}");
            entry.connection.close();
            entry.connection = connection;
        } else {
            self.peers.push(PeerEntry {
                id: peer_id.to_string(),
                connection,
                decoder: InboundDecoder::new(peer_id),
            });
        }
        self.peers.len()
    }

    /// Removes `peer_id` and returns the new peer count. Unknown ids are ignored.
    pub fn on_peer_closed(&mut self, peer_id: &str) -> usize {
        if let Some(index) = self.peers.iter().position(|entry| entry.id == peer_id) {
            let mut entry = self.peers.remove(index);
            entry.connection.close();
        }
        self.peers.len()
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.iter().any(|entry| entry.id == peer_id)
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(|entry| entry.id.as_str())
    }

    /// Calls `f` for every writable peer, in registration order.
    pub fn for_each_writable<F>(&mut self, mut f: F)
    where
        F: FnMut(&str, &mut C),
    {
        for entry in &mut self.peers {
            if entry.connection.is_writable() {
                f(&entry.id, &mut entry.connection);
            } else {
                log::warn!("Peer {} not writable", entry.id);
            }
        }
    }

    pub fn write_to(&mut self, peer_id: &str, frame: &[u8]) -> Result<(), WriteError> {
        match self.peers.iter_mut().find(|entry| entry.id == peer_id) {
            Some(entry) if entry.connection.is_writable() => entry.connection.write(frame),
            _ => Err(WriteError::Closed(peer_id.to_string())),
        }
    }

    pub fn decoder_mut(&mut self, peer_id: &str) -> Option<&mut InboundDecoder> {
        self.peers
            .iter_mut()
            .find(|entry| entry.id == peer_id)
            .map(|entry| &mut entry.decoder)
    }

    /// Closes and forgets every connection.
    pub fn close_all(&mut self) -> usize {
        let closed = self.peers.len();
        for mut entry in self.peers.drain(..) {
            entry.connection.close();
        }
        closed
    }
}

impl<C: PeerConnection> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}
