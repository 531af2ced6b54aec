use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use libp2p::PeerId;
use tokio::sync::mpsc;

use crate::error::WriteError;
use crate::session::PeerConnection;

/// A frame a [`PeerLink`] hands to the network task.
#[derive(Debug)]
pub struct OutboundFrame {
    pub peer: PeerId,
    pub bytes: Vec<u8>,
}

/// Connection handle stored in the session registry for one room peer.
///
/// Writes are queued to the network task that owns the swarm, which keeps
/// `write` synchronous for the session.
#[derive(Debug)]
pub struct PeerLink {
    peer: PeerId,
    label: String,
    frames: mpsc::UnboundedSender<OutboundFrame>,
    open: bool,
}

impl PeerLink {
    pub fn new(peer: PeerId, frames: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            peer,
            label: short_peer_id(&peer),
            frames,
            open: true,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }
}

impl PeerConnection for PeerLink {
    fn is_writable(&self) -> bool {
        self.open && !self.frames.is_closed()
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), WriteError> {
        if !self.open {
            return Err(WriteError::Closed(self.label.clone()));
        }
        self.frames
            .send(OutboundFrame {
                peer: self.peer,
                bytes: frame.to_vec(),
            })
            .map_err(|_| WriteError::Closed(self.label.clone()))
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Short, human-readable peer id: the last 8 hex digits of the identity bytes.
pub fn short_peer_id(peer: &PeerId) -> String {
    let encoded = hex::encode(peer.to_bytes());
    encoded[encoded.len().saturating_sub(8)..].to_string()
}

#[derive(Debug)]
struct Lane<Id> {
    busy: bool,
    in_flight: Option<Id>,
    pending: VecDeque<Vec<u8>>,
}

/// Per-peer outbound queues with at most one request in flight each.
///
/// A frame is only released once the previous one to the same peer has been
/// answered or failed, so each peer receives our records in write order.
#[derive(Debug)]
pub struct OutboundLanes<Id> {
    lanes: HashMap<PeerId, Lane<Id>>,
}

impl<Id: Copy + Eq + Hash> OutboundLanes<Id> {
    pub fn new() -> Self {
        Self {
            lanes: HashMap::new(),
        }
    }

    /// Queues `bytes`; returns them back if the lane was idle and they should go out now.
    pub fn enqueue(&mut self, peer: PeerId, bytes: Vec<u8>) -> Option<Vec<u8>> {
        let lane = self.lanes.entry(peer).or_insert_with(|| Lane {
            busy: false,
            in_flight: None,
            pending: VecDeque::new(),
        });
        if lane.busy {
            lane.pending.push_back(bytes);
            None
        } else {
            lane.busy = true;
            Some(bytes)
        }
    }

    /// Records the request id of the frame just released for `peer`.
    pub fn mark_sent(&mut self, peer: &PeerId, id: Id) {
        if let Some(lane) = self.lanes.get_mut(peer) {
            lane.in_flight = Some(id);
        }
    }

    /// Finishes request `id` and returns the next frame to send to `peer`, if any.
    pub fn complete(&mut self, peer: &PeerId, id: Id) -> Option<Vec<u8>> {
        let lane = self.lanes.get_mut(peer)?;
        if lane.in_flight != Some(id) {
            return None;
        }
        lane.in_flight = None;
        match lane.pending.pop_front() {
            Some(next) => Some(next),
            None => {
                lane.busy = false;
                None
            }
        }
    }

    /// Forgets `peer`, returning how many frames were still waiting.
    pub fn drop_peer(&mut self, peer: &PeerId) -> usize {
        self.lanes
            .remove(peer)
            .map(|lane| lane.pending.len())
            .unwrap_or(0)
    }

    pub fn pending(&self, peer: &PeerId) -> usize {
        self.lanes
            .get(peer)
            .map(|lane| lane.pending.len())
            .unwrap_or(0)
    }
}

impl<Id: Copy + Eq + Hash> Default for OutboundLanes<Id> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use libp2p::identity;

    use super::*;

    fn random_peer() -> PeerId {
        identity::Keypair::generate_ed25519().public().to_peer_id()
    }

    #[test]
    fn lane_releases_frames_one_at_a_time_in_order() {
        let peer = random_peer();
        let mut lanes = OutboundLanes::<u32>::new();

        assert_eq!(lanes.enqueue(peer, b"1".to_vec()), Some(b"1".to_vec()));
        lanes.mark_sent(&peer, 10);
        assert_eq!(lanes.enqueue(peer, b"2".to_vec()), None);
        assert_eq!(lanes.enqueue(peer, b"3".to_vec()), None);
        assert_eq!(lanes.pending(&peer), 2);

        // a stale id does not advance the lane
        assert_eq!(lanes.complete(&peer, 99), None);

        assert_eq!(lanes.complete(&peer, 10), Some(b"2".to_vec()));
        lanes.mark_sent(&peer, 11);
        assert_eq!(lanes.complete(&peer, 11), Some(b"3".to_vec()));
        lanes.mark_sent(&peer, 12);
        assert_eq!(lanes.complete(&peer, 12), None);

        // idle again
        assert_eq!(lanes.enqueue(peer, b"4".to_vec()), Some(b"4".to_vec()));
    }

    #[test]
    fn lanes_are_independent_per_peer() {
        let a = random_peer();
        let b = random_peer();
        let mut lanes = OutboundLanes::<u32>::new();

        assert!(lanes.enqueue(a, b"a1".to_vec()).is_some());
        assert!(lanes.enqueue(b, b"b1".to_vec()).is_some());
        assert!(lanes.enqueue(a, b"a2".to_vec()).is_none());
        assert_eq!(lanes.drop_peer(&a), 1);
        assert_eq!(lanes.pending(&b), 0);
    }

    #[test]
    fn short_peer_id_is_eight_hex_digits() {
        let peer = random_peer();
        let short = short_peer_id(&peer);
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(short, short_peer_id(&peer));
    }

    #[test]
    fn link_stops_writing_once_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peer = random_peer();
        let mut link = PeerLink::new(peer, tx);

        link.write(b"frame").unwrap();
        assert_eq!(rx.try_recv().unwrap().bytes, b"frame".to_vec());

        link.close();
        assert!(!link.is_writable());
        assert!(matches!(link.write(b"late"), Err(WriteError::Closed(_))));
    }

    #[test]
    fn link_is_unwritable_when_the_network_task_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut link = PeerLink::new(random_peer(), tx);
        drop(rx);

        assert!(!link.is_writable());
        assert!(link.write(b"x").is_err());
    }
}
