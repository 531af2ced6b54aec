use tokio::sync::{mpsc, watch};

use crate::common::{InboundRecord, SessionEvent};

/// Receives session output. Implementations must not block.
pub trait SessionObserver: Send {
    fn on_message(&mut self, record: &InboundRecord);
    fn on_peer_count(&mut self, count: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber list notified in subscription order.
pub struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Box<dyn SessionObserver>)>,
}

impl Observers {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn notify_message(&mut self, record: &InboundRecord) {
        for (_, observer) in &mut self.entries {
            observer.on_message(record);
        }
    }

    pub fn notify_peer_count(&mut self, count: usize) {
        for (_, observer) in &mut self.entries {
            observer.on_peer_count(count);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-end feed. Unbounded so a slow reader never loses a record or a count.
impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_message(&mut self, record: &InboundRecord) {
        if self
            .send(SessionEvent::MessageReceived(record.clone()))
            .is_err()
        {
            log::debug!("Front-end receiver dropped; message not delivered");
        }
    }

    fn on_peer_count(&mut self, count: usize) {
        if self.send(SessionEvent::PeerCountChanged(count)).is_err() {
            log::debug!("Front-end receiver dropped; peer count not delivered");
        }
    }
}

/// Mirrors the peer count so callers can read it without a round trip.
impl SessionObserver for watch::Sender<usize> {
    fn on_message(&mut self, _record: &InboundRecord) {}

    fn on_peer_count(&mut self, count: usize) {
        self.send_replace(count);
    }
}
