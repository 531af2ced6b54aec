use std::collections::{HashMap, HashSet};
use std::error::Error;

use futures::StreamExt;
use libp2p::identify;
use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::{Config as SwarmConfig, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm};
use tokio::time::{Duration, interval};

use crate::config::{self, AppConfig};

use super::behavior::{RoomBehavior, RoomBehaviorEvent, build_behavior};
use super::identity::load_or_generate_local_key;
use super::transport::build_transport;

const NODE_KEY_PATH: &str = "data/node_key.pk";

/// Rendezvous node: a DHT server that joins no room and only helps peers
/// find each other's topic announcements.
pub struct BootstrapNode {
    peers: HashMap<PeerId, HashSet<Multiaddr>>,
    local_peer_id: Option<PeerId>,
    config_path: String,
    published: bool,
}

impl BootstrapNode {
    pub fn new(config_path: impl Into<String>) -> Self {
        Self {
            peers: HashMap::new(),
            local_peer_id: None,
            config_path: config_path.into(),
            published: false,
        }
    }

    pub async fn run(&mut self, app_config: &AppConfig, port: u16) -> Result<(), Box<dyn Error>> {
        let local_key = load_or_generate_local_key(NODE_KEY_PATH)?;
        let local_peer_id = PeerId::from(local_key.public());
        self.local_peer_id = Some(local_peer_id);
        log::info!("Bootstrap Node PeerID: {local_peer_id:?}");

        let transport = build_transport(&local_key)?;
        let behavior = build_behavior(&local_key, local_peer_id, app_config.enable_mdns)?;

        let mut swarm = Swarm::new(
            transport,
            behavior,
            local_peer_id,
            SwarmConfig::with_tokio_executor()
                .with_idle_connection_timeout(app_config.idle_timeout()),
        );

        swarm.listen_on(format!("/ip4/0.0.0.0/tcp/{port}").parse()?)?;
        log::info!("Bootstrap node started on tcp/{port}, waiting for connections...");

        let mut stats_interval = interval(Duration::from_secs(30));

        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    self.handle_swarm_event(event, &mut swarm);
                }
                _ = stats_interval.tick() => {
                    log::info!("Statistics: {} known peers", self.known_peers_count());
                }
            }
        }
    }

    fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<RoomBehaviorEvent>,
        swarm: &mut Swarm<RoomBehavior>,
    ) {
        match event {
            SwarmEvent::Behaviour(RoomBehaviorEvent::Identify(event)) => {
                self.handle_identify_event(event, swarm);
            }
            SwarmEvent::Behaviour(RoomBehaviorEvent::Kad(event)) => {
                self.handle_kad_event(event);
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                let Some(peer_id) = self.local_peer_id else {
                    log::info!("Bootstrap node listening on: {address}");
                    return;
                };
                let full_addr = address.with(Protocol::P2p(peer_id));
                log::info!("Clients can connect to: {full_addr}");
                if !self.published && is_routable(&full_addr) {
                    config::persist_bootstrap_node(&self.config_path, &full_addr.to_string());
                    self.published = true;
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                log::info!("Client connected: {peer_id}");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                log::info!("Client disconnected: {peer_id}");
            }
            _ => {}
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event, swarm: &mut Swarm<RoomBehavior>) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            for addr in info.listen_addrs {
                swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&peer_id, addr.clone());
                self.peers.entry(peer_id).or_default().insert(addr);
            }
            log::debug!("Known peers: {}", self.known_peers_count());
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                let entry = self.peers.entry(peer).or_default();
                for addr in addresses.iter() {
                    entry.insert(addr.clone());
                }
                log::debug!(
                    "Kademlia routing table updated for {} ({} addrs). Total peers: {}",
                    peer,
                    entry.len(),
                    self.known_peers_count()
                );
            }
            kad::Event::InboundRequest { request } => {
                log::debug!("DHT request: {request:?}");
            }
            _ => {}
        }
    }

    pub fn known_peers_count(&self) -> usize {
        self.peers.len()
    }
}

/// Loopback addresses are useless to remote clients.
fn is_routable(addr: &Multiaddr) -> bool {
    addr.iter().any(|protocol| match protocol {
        Protocol::Ip4(ip) => !ip.is_loopback() && !ip.is_unspecified(),
        Protocol::Ip6(ip) => !ip.is_loopback() && !ip.is_unspecified(),
        _ => false,
    })
}
