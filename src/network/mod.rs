pub mod behavior;
pub mod bootstrap;
pub mod client;
pub mod codec;
pub mod handle;
pub mod identity;
pub mod link;
pub mod transport;

pub use bootstrap::BootstrapNode;
pub use client::{RoomNetwork, parse_bootstrap_peers};
pub use handle::Session;
pub use link::{PeerLink, short_peer_id};
