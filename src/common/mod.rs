pub mod commands;
pub mod events;
pub mod types;

pub use commands::SessionCommand;
pub use events::SessionEvent;
pub use types::{InboundRecord, LOCAL_PEER_LABEL, Origin, OutgoingMessage};
