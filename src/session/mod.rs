//! Multi-peer broadcast channel built from an unordered set of peer connections.
//!
//! [`RoomSession`] is a plain synchronous state machine. It is driven by one
//! owner (the network task) reacting to discrete events, so the registry,
//! the outbox and the readiness flag never need locks.

pub mod broadcast;
pub mod decoder;
pub mod observer;
pub mod outbox;
pub mod registry;
pub mod topic;
pub mod wire;

pub use observer::{Observers, SessionObserver, SubscriptionId};
pub use outbox::{Admission, Readiness, ReadinessGate};
pub use registry::{PeerConnection, Registry};
pub use topic::Topic;

use crate::common::{InboundRecord, OutgoingMessage};
use crate::error::ConnectionError;

use self::wire::WireRecord;

/// What happened to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Broadcast attempted on this many peers.
    Broadcast(usize),
    /// The session was already destroyed.
    Discarded,
}

pub struct RoomSession<C> {
    room_name: String,
    topic: Topic,
    registry: Registry<C>,
    gate: ReadinessGate,
    observers: Observers,
    destroyed: bool,
}

impl<C: PeerConnection> RoomSession<C> {
    pub fn new(room_name: impl Into<String>) -> Self {
        let room_name = room_name.into();
        let topic = Topic::derive(&room_name);
        log::info!("Room name: {room_name}");
        log::info!("Topic hash: {topic}");

        Self {
            room_name,
            topic,
            registry: Registry::new(),
            gate: ReadinessGate::new(),
            observers: Observers::new(),
            destroyed: false,
        }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) -> Option<SubscriptionId> {
        if self.destroyed {
            return None;
        }
        Some(self.observers.subscribe(observer))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Registers a new connection. Listeners see the new count before any
    /// queued message is flushed.
    pub fn peer_connected(&mut self, peer_id: &str, mut connection: C) {
        if self.destroyed {
            connection.close();
            return;
        }

        let previous = self.registry.count();
        let count = self.registry.on_peer_connected(peer_id, connection);
        log::info!("New peer connected: {peer_id} (total peers: {count})");

        if count != previous {
            self.observers.notify_peer_count(count);
        }

        let queued = self.gate.on_peer_count(previous, count);
        if !queued.is_empty() {
            log::info!("First peer connected, flushing {} queued messages", queued.len());
        }
        for message in &queued {
            broadcast::broadcast(&mut self.registry, message);
        }

        self.send_handshake(peer_id);
    }

    pub fn peer_closed(&mut self, peer_id: &str) {
        if self.destroyed {
            return;
        }

        let previous = self.registry.count();
        let count = self.registry.on_peer_closed(peer_id);
        if count == previous {
            log::debug!("Close for unregistered peer {peer_id} ignored");
            return;
        }

        log::info!("Peer disconnected: {peer_id} (total peers: {count})");
        self.observers.notify_peer_count(count);
        self.gate.on_peer_count(previous, count);
        if count == 0 {
            log::warn!("No peers connected");
        }
    }

    /// Connection-level faults are logged only; the close event removes the peer.
    pub fn peer_error(&mut self, peer_id: &str, err: &ConnectionError) {
        log::warn!("Connection error with {peer_id}: {err}");
    }

    /// Feeds one received frame from `peer_id`.
    pub fn inbound(&mut self, peer_id: &str, chunk: &[u8]) {
        if self.destroyed {
            return;
        }

        let Some(decoder) = self.registry.decoder_mut(peer_id) else {
            log::debug!("Dropping {} bytes from unregistered peer {peer_id}", chunk.len());
            return;
        };

        match decoder.feed(chunk) {
            Ok(Some(record)) => {
                log::debug!("Received from {peer_id}: message");
                self.observers.notify_message(&record);
            }
            Ok(None) => {}
            Err(err) => {
                log::error!("Parse error from {peer_id}: {err}");
                log::error!("Raw data: {}", String::from_utf8_lossy(chunk));
            }
        }
    }

    /// Submits a message and echoes it locally, whatever the gate decides.
    pub fn send(&mut self, text: &str, username: &str) -> SendOutcome {
        if self.destroyed {
            log::warn!("Session destroyed; dropping outgoing message");
            return SendOutcome::Discarded;
        }

        log::debug!("Sending message (current peers: {})", self.registry.count());
        let message = OutgoingMessage::new(text, username);
        let echo = InboundRecord::local_echo(&message);

        let outcome = match self.gate.submit(message) {
            Admission::Queued => {
                log::info!("No peers connected, queueing message");
                SendOutcome::Queued
            }
            Admission::SendNow(message) => {
                SendOutcome::Broadcast(broadcast::broadcast(&mut self.registry, &message))
            }
        };

        self.observers.notify_message(&echo);
        outcome
    }

    pub fn peer_count(&self) -> usize {
        self.registry.count()
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn queued(&self) -> usize {
        self.gate.queued()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Closes every connection and drops all listeners. Safe to call twice.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let closed = self.registry.close_all();
        let dropped = self.gate.clear();
        self.observers.clear();
        log::info!(
            "Session for room {} destroyed ({closed} connections closed, {dropped} queued messages dropped)",
            self.room_name
        );
    }

    fn send_handshake(&mut self, peer_id: &str) {
        let frame = match WireRecord::handshake().encode() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Failed to serialize handshake: {err}");
                return;
            }
        };
        if let Err(err) = self.registry.write_to(peer_id, &frame) {
            log::warn!("Handshake to {peer_id} failed: {err}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeConnection, Recorder};
    use super::*;
    use crate::common::Origin;

    fn session() -> (RoomSession<FakeConnection>, Recorder) {
        let mut session = RoomSession::new("alpha");
        let recorder = Recorder::default();
        session.subscribe(Box::new(recorder.clone()));
        (session, recorder)
    }

    #[test]
    fn send_without_peers_queues_and_echoes() {
        let (mut session, recorder) = session();

        assert_eq!(session.send("hi", "u1"), SendOutcome::Queued);

        let echoes = recorder.messages();
        assert_eq!(echoes.len(), 1);
        assert_eq!(echoes[0].text, "hi");
        assert_eq!(echoes[0].username, "u1");
        assert_eq!(echoes[0].peer_label(), "you");
        assert_eq!(session.queued(), 1);
    }

    #[test]
    fn first_peer_flushes_the_queue_in_order() {
        let (mut session, _recorder) = session();
        session.send("hi", "u1");
        session.send("again", "u1");

        let p1 = FakeConnection::new();
        session.peer_connected("p1", p1.clone());

        let texts: Vec<_> = p1
            .chat_frames()
            .iter()
            .map(|frame| frame["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["hi", "again"]);
        assert_eq!(session.queued(), 0);
        assert!(session.is_ready());
    }

    #[test]
    fn peer_count_is_announced_before_the_flush() {
        struct Probe(FakeConnection, std::sync::Arc<std::sync::Mutex<Vec<usize>>>);
        impl SessionObserver for Probe {
            fn on_message(&mut self, _record: &InboundRecord) {}
            fn on_peer_count(&mut self, _count: usize) {
                self.1.lock().unwrap().push(self.0.chat_frames().len());
            }
        }

        let mut session = RoomSession::new("alpha");
        let p1 = FakeConnection::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        session.subscribe(Box::new(Probe(p1.clone(), seen.clone())));
        session.send("queued", "u1");

        session.peer_connected("p1", p1.clone());

        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(p1.chat_frames().len(), 1);
    }

    #[test]
    fn new_peer_receives_a_handshake() {
        let (mut session, _recorder) = session();
        let p1 = FakeConnection::new();
        session.peer_connected("p1", p1.clone());

        let frames = p1.frames();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(value["type"], "handshake");
    }

    #[test]
    fn send_with_two_peers_broadcasts_once_to_each() {
        let (mut session, recorder) = session();
        let p1 = FakeConnection::new();
        let p2 = FakeConnection::new();
        session.peer_connected("p1", p1.clone());
        session.peer_connected("p2", p2.clone());

        assert_eq!(session.send("yo", "u2"), SendOutcome::Broadcast(2));

        assert_eq!(p1.chat_frames().len(), 1);
        assert_eq!(p2.chat_frames().len(), 1);
        assert_eq!(p1.chat_frames()[0]["username"], "u2");
        assert_eq!(recorder.messages().len(), 1);
        assert_eq!(session.peer_count(), 2);
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn write_failure_does_not_change_membership() {
        let (mut session, _recorder) = session();
        let broken = FakeConnection::failing();
        let healthy = FakeConnection::new();
        session.peer_connected("a", broken.clone());
        session.peer_connected("b", healthy.clone());

        assert_eq!(session.send("x", "u"), SendOutcome::Broadcast(2));
        assert_eq!(healthy.chat_frames().len(), 1);
        assert_eq!(session.peer_count(), 2);
    }

    #[test]
    fn last_peer_leaving_rearms_the_queue() {
        let (mut session, recorder) = session();
        session.peer_connected("p1", FakeConnection::new());
        session.peer_closed("p1");

        assert_eq!(session.send("again", "u1"), SendOutcome::Queued);
        assert_eq!(session.queued(), 1);
        assert!(!session.is_ready());
        assert_eq!(recorder.peer_counts(), vec![1, 0]);

        let p2 = FakeConnection::new();
        session.peer_connected("p2", p2.clone());
        assert_eq!(p2.chat_frames().len(), 1);
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn inbound_chat_is_forwarded_with_origin() {
        let (mut session, recorder) = session();
        session.peer_connected("p1", FakeConnection::new());

        session.inbound("p1", br#"{"text":"hey","username":"bob","timestamp":5}"#);

        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin, Origin::Remote("p1".into()));
        assert_eq!(messages[0].timestamp, 5);
    }

    #[test]
    fn malformed_or_handshake_chunks_never_reach_listeners() {
        let (mut session, recorder) = session();
        let p1 = FakeConnection::new();
        session.peer_connected("p1", p1.clone());

        session.inbound("p1", b"garbage");
        session.inbound("p1", br#"{"type":"handshake","timestamp":1}"#);

        assert!(recorder.messages().is_empty());
        assert!(!p1.is_closed());
        assert_eq!(session.peer_count(), 1);
    }

    #[test]
    fn records_from_one_peer_keep_their_order() {
        let (mut session, recorder) = session();
        session.peer_connected("p1", FakeConnection::new());

        for i in 0..5 {
            let frame = format!(r#"{{"text":"m{i}","username":"u","timestamp":{i}}}"#);
            session.inbound("p1", frame.as_bytes());
        }

        let texts: Vec<_> = recorder.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn peer_count_follows_connects_minus_closes() {
        let (mut session, recorder) = session();
        session.peer_connected("a", FakeConnection::new());
        session.peer_connected("b", FakeConnection::new());
        session.peer_connected("a", FakeConnection::new());
        session.peer_closed("a");
        session.peer_closed("a");
        session.peer_closed("zzz");

        assert_eq!(session.peer_count(), 1);
        assert_eq!(recorder.peer_counts(), vec![1, 2, 1]);
    }

    #[test]
    fn destroy_is_idempotent_and_silences_listeners() {
        let (mut session, recorder) = session();
        let p1 = FakeConnection::new();
        session.peer_connected("p1", p1.clone());

        session.destroy();
        session.destroy();

        assert!(p1.is_closed());
        assert_eq!(session.peer_count(), 0);
        assert_eq!(session.send("late", "u"), SendOutcome::Discarded);
        session.peer_connected("p2", FakeConnection::new());
        session.inbound("p2", br#"{"text":"x","username":"u","timestamp":1}"#);
        assert_eq!(recorder.peer_counts(), vec![1]);
        assert!(recorder.messages().is_empty());
        assert!(session.subscribe(Box::new(Recorder::default())).is_none());
    }
}
