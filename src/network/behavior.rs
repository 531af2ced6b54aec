use std::error::Error;
use std::time::Duration;

use libp2p::identify;
use libp2p::kad::{self, Mode as KadMode, store::MemoryStore};
use libp2p::mdns;
use libp2p::ping;
use libp2p::request_response::{self, ProtocolSupport};
use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{PeerId, identity};

use super::codec::{CHAT_PROTOCOL, FrameCodec};

const IDENTIFY_PROTOCOL: &str = "p2p-room-chat/1.0.0";

#[derive(NetworkBehaviour)]
pub struct RoomBehavior {
    pub kad: kad::Behaviour<MemoryStore>,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub chat: request_response::Behaviour<FrameCodec>,
}

pub fn build_behavior(
    local_key: &identity::Keypair,
    local_peer_id: PeerId,
    enable_mdns: bool,
) -> Result<RoomBehavior, Box<dyn Error>> {
    let store = MemoryStore::new(local_peer_id);
    let mut kad = kad::Behaviour::new(local_peer_id, store);
    kad.set_mode(Some(KadMode::Server));

    let mdns = if enable_mdns {
        Some(mdns::tokio::Behaviour::new(
            mdns::Config::default(),
            local_peer_id,
        )?)
    } else {
        None
    };

    let identify_config =
        identify::Config::new(IDENTIFY_PROTOCOL.into(), local_key.public().clone());
    let identify = identify::Behaviour::new(identify_config);

    let ping = ping::Behaviour::new(ping::Config::default());

    let chat = request_response::Behaviour::with_codec(
        FrameCodec,
        [(CHAT_PROTOCOL, ProtocolSupport::Full)],
        request_response::Config::default().with_request_timeout(Duration::from_secs(30)),
    );

    Ok(RoomBehavior {
        kad,
        mdns: Toggle::from(mdns),
        identify,
        ping,
        chat,
    })
}
