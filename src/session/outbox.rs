use std::collections::VecDeque;

use crate::common::OutgoingMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

/// Outcome of submitting a message to the gate.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Queued,
    SendNow(OutgoingMessage),
}

/// Holds messages composed while no peer is connected and releases them,
/// in submission order, on the first 0 -> 1 peer transition.
#[derive(Debug)]
pub struct ReadinessGate {
    readiness: Readiness,
    queue: VecDeque<OutgoingMessage>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            readiness: Readiness::NotReady,
            queue: VecDeque::new(),
        }
    }

    pub fn submit(&mut self, message: OutgoingMessage) -> Admission {
        match self.readiness {
            Readiness::NotReady => {
                self.queue.push_back(message);
                Admission::Queued
            }
            Readiness::Ready => Admission::SendNow(message),
        }
    }

    /// Feeds a peer-count change into the gate.
    ///
    /// Returns the drained queue on a 0 -> 1 transition and nothing otherwise.
    /// A drop to 0 re-arms the gate.
    pub fn on_peer_count(&mut self, previous: usize, current: usize) -> Vec<OutgoingMessage> {
        match self.readiness {
            Readiness::NotReady if previous == 0 && current > 0 => {
                self.readiness = Readiness::Ready;
                self.queue.drain(..).collect()
            }
            Readiness::Ready if current == 0 => {
                self.readiness = Readiness::NotReady;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> OutgoingMessage {
        OutgoingMessage {
            text: text.into(),
            username: "u".into(),
            timestamp: 0,
        }
    }

    #[test]
    fn queues_until_first_peer_then_drains_in_order() {
        let mut gate = ReadinessGate::new();
        assert_eq!(gate.submit(msg("a")), Admission::Queued);
        assert_eq!(gate.submit(msg("b")), Admission::Queued);
        assert_eq!(gate.queued(), 2);

        let drained = gate.on_peer_count(0, 1);
        let texts: Vec<_> = drained.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(gate.queued(), 0);
        assert!(gate.is_ready());
    }

    #[test]
    fn ready_gate_passes_messages_through() {
        let mut gate = ReadinessGate::new();
        gate.on_peer_count(0, 1);

        assert_eq!(gate.submit(msg("now")), Admission::SendNow(msg("now")));
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn further_arrivals_do_not_drain_again() {
        let mut gate = ReadinessGate::new();
        gate.submit(msg("a"));
        assert_eq!(gate.on_peer_count(0, 1).len(), 1);
        assert!(gate.on_peer_count(1, 2).is_empty());
        assert!(gate.on_peer_count(2, 1).is_empty());
        assert!(gate.is_ready());
    }

    #[test]
    fn dropping_to_zero_rearms_the_gate() {
        let mut gate = ReadinessGate::new();
        gate.on_peer_count(0, 1);
        gate.on_peer_count(1, 0);
        assert_eq!(gate.readiness(), Readiness::NotReady);

        assert_eq!(gate.submit(msg("later")), Admission::Queued);
        let drained = gate.on_peer_count(0, 1);
        assert_eq!(drained, vec![msg("later")]);
    }
}
