use crate::common::OutgoingMessage;

use super::registry::{PeerConnection, Registry};
use super::wire::WireRecord;

/// Writes `message` to every writable peer and returns how many were attempted.
///
/// A failed write is logged and skipped. It never removes the peer: removal
/// only follows the connection's own close signal.
pub fn broadcast<C: PeerConnection>(registry: &mut Registry<C>, message: &OutgoingMessage) -> usize {
    let frame = match WireRecord::chat(message).encode() {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("Failed to serialize message: {err}");
            return 0;
        }
    };

    let mut attempted = 0;
    let mut sent = 0;
    registry.for_each_writable(|peer_id, connection| {
        attempted += 1;
        match connection.write(&frame) {
            Ok(()) => {
                sent += 1;
                log::debug!("Sent to peer: {peer_id}");
            }
            Err(err) => log::warn!("Send failed to {peer_id}: {err}"),
        }
    });

    log::info!("Message sent to {sent}/{} peers", registry.count());
    attempted
}
