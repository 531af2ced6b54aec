use crate::common::{InboundRecord, Origin};
use crate::error::DecodeError;

use super::wire::{MESSAGE_TYPE, WireRecord};

/// Per-connection consumer turning received frames into chat records.
///
/// Every chunk handed to [`InboundDecoder::feed`] is expected to be one whole
/// record: the transport delimits frames, so there is no reassembly here.
#[derive(Debug)]
pub struct InboundDecoder {
    peer_id: String,
    handshake_seen: bool,
    accepted: u64,
    rejected: u64,
}

impl InboundDecoder {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            handshake_seen: false,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Returns `Ok(None)` for protocol-internal records.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<InboundRecord>, DecodeError> {
        match self.decode(chunk) {
            Ok(record) => {
                self.accepted += 1;
                Ok(record)
            }
            Err(err) => {
                self.rejected += 1;
                Err(err)
            }
        }
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Option<InboundRecord>, DecodeError> {
        let record = WireRecord::parse(chunk)?;

        if record.is_handshake() {
            if !self.handshake_seen {
                log::debug!("Handshake received from {}", self.peer_id);
            }
            self.handshake_seen = true;
            return Ok(None);
        }

        match record.kind.as_deref() {
            None | Some(MESSAGE_TYPE) => {}
            Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
        }

        let text = record.text.ok_or(DecodeError::MissingField("text"))?;
        let username = record.username.ok_or(DecodeError::MissingField("username"))?;
        let timestamp = record
            .timestamp
            .ok_or(DecodeError::MissingField("timestamp"))?;

        Ok(Some(InboundRecord {
            text,
            username,
            timestamp,
            origin: Origin::Remote(self.peer_id.clone()),
        }))
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn handshake_seen(&self) -> bool {
        self.handshake_seen
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
