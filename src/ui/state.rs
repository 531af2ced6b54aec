use std::collections::VecDeque;

use crate::common::{InboundRecord, SessionEvent};

/// Number of records kept on screen.
pub const VISIBLE_MESSAGES: usize = 20;

/// Local UI state.
pub struct AppState {
    pub messages: VecDeque<InboundRecord>,
    pub input_text: String,
    pub peer_count: usize,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            messages: VecDeque::with_capacity(VISIBLE_MESSAGES),
            input_text: String::new(),
            peer_count: 0,
        }
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::MessageReceived(record) => self.push_message(record),
            SessionEvent::PeerCountChanged(count) => self.peer_count = count,
        }
    }

    pub fn push_message(&mut self, record: InboundRecord) {
        if self.messages.len() == VISIBLE_MESSAGES {
            self.messages.pop_front();
        }
        self.messages.push_back(record);
    }

    /// Takes the trimmed input for sending, leaving the box empty.
    pub fn take_input(&mut self) -> Option<String> {
        let text = self.input_text.trim().to_string();
        self.input_text.clear();
        (!text.is_empty()).then_some(text)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
