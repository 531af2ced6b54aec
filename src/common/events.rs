use super::types::InboundRecord;

/// Events pushed from the session to a front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MessageReceived(InboundRecord),
    PeerCountChanged(usize),
}
