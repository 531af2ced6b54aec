use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::time::Duration;

use futures::StreamExt;
use libp2p::identify;
use libp2p::kad::{self, RecordKey};
use libp2p::mdns;
use libp2p::multiaddr::Protocol;
use libp2p::request_response::{self, OutboundRequestId};
use libp2p::swarm::{Config as SwarmConfig, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm};
use tokio::sync::mpsc;
use tokio::time;

use crate::common::SessionCommand;
use crate::config::AppConfig;
use crate::error::{ConnectionError, DiscoveryError};
use crate::session::{RoomSession, Topic};

use super::behavior::{RoomBehavior, RoomBehaviorEvent, build_behavior};
use super::identity::load_or_generate_local_key;
use super::link::{OutboundFrame, OutboundLanes, PeerLink, short_peer_id};
use super::transport::build_transport;

/// Owns the swarm and turns its events into registry transitions for one room.
///
/// Room membership is decided here: a peer joins the registry once we are
/// connected to it and know it provides the room topic, or as soon as it
/// speaks the chat protocol to us. DHT neighbours and rendezvous nodes that do
/// neither are never counted.
pub struct RoomNetwork {
    swarm: Swarm<RoomBehavior>,
    local_peer_id: PeerId,
    topic_key: RecordKey,
    providers: HashSet<PeerId>,
    members: HashMap<PeerId, String>,
    lanes: OutboundLanes<OutboundRequestId>,
    frame_tx: mpsc::UnboundedSender<OutboundFrame>,
    frame_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    announce_query: Option<kad::QueryId>,
    announced: Option<Result<(), DiscoveryError>>,
    status_interval: Duration,
}

impl RoomNetwork {
    pub fn start(config: &AppConfig, topic: Topic) -> Result<Self, DiscoveryError> {
        let local_key = load_or_generate_local_key(&config.identity_key_path)?;
        let local_peer_id = PeerId::from(local_key.public());
        log::info!("Local PeerID: {local_peer_id:?}");

        let transport = build_transport(&local_key)?;
        let behavior = build_behavior(&local_key, local_peer_id, config.enable_mdns)?;

        let mut swarm = Swarm::new(
            transport,
            behavior,
            local_peer_id,
            SwarmConfig::with_tokio_executor().with_idle_connection_timeout(config.idle_timeout()),
        );

        let listen_addr: Multiaddr =
            config
                .listen_addr
                .parse()
                .map_err(|err: libp2p::multiaddr::Error| DiscoveryError::Listen {
                    addr: config.listen_addr.clone(),
                    reason: err.to_string(),
                })?;
        swarm
            .listen_on(listen_addr)
            .map_err(|err| DiscoveryError::Listen {
                addr: config.listen_addr.clone(),
                reason: err.to_string(),
            })?;

        let bootstrap_peers = parse_bootstrap_peers(&config.bootstrap_nodes);
        if bootstrap_peers.is_empty() {
            log::warn!("No bootstrap peers configured; only LAN discovery is available");
        } else {
            for (peer_id, addr) in bootstrap_peers {
                log::info!("Adding bootstrap peer {peer_id} at {addr}");
                swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&peer_id, addr.clone());
                if let Err(err) = swarm.dial(addr) {
                    log::warn!("Failed to dial bootstrap peer {peer_id}: {err}");
                }
            }

            if let Err(err) = swarm.behaviour_mut().kad.bootstrap() {
                log::warn!("Failed to trigger Kademlia bootstrap: {err}");
            }
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        Ok(Self {
            swarm,
            local_peer_id,
            topic_key: RecordKey::new(topic.as_bytes()),
            providers: HashSet::new(),
            members: HashMap::new(),
            lanes: OutboundLanes::new(),
            frame_tx,
            frame_rx,
            announce_query: None,
            announced: None,
            status_interval: config.status_interval(),
        })
    }

    /// Announces the room topic and waits until the announcement is live.
    ///
    /// Connections that arrive meanwhile are already fed into `session`.
    pub async fn announce(
        &mut self,
        session: &mut RoomSession<PeerLink>,
        timeout: Option<Duration>,
    ) -> Result<(), DiscoveryError> {
        log::info!("Starting discovery...");
        let query = self
            .swarm
            .behaviour_mut()
            .kad
            .start_providing(self.topic_key.clone())
            .map_err(|err| DiscoveryError::Announce(format!("{err:?}")))?;
        self.announce_query = Some(query);
        self.lookup_providers();

        match timeout {
            Some(limit) => time::timeout(limit, self.await_announcement(session))
                .await
                .map_err(|_| DiscoveryError::AnnounceTimeout(limit))?,
            None => self.await_announcement(session).await,
        }
    }

    async fn await_announcement(
        &mut self,
        session: &mut RoomSession<PeerLink>,
    ) -> Result<(), DiscoveryError> {
        loop {
            if let Some(result) = self.announced.take() {
                return result;
            }
            tokio::select! {
                event = self.swarm.next() => match event {
                    Some(event) => self.handle_swarm_event(event, session),
                    None => return Err(DiscoveryError::Interrupted),
                },
                Some(frame) = self.frame_rx.recv() => self.dispatch_frame(frame),
            }
        }
    }

    /// Event loop after a successful announcement. Returns once the session is destroyed
    /// or every command sender is gone; the swarm is dropped with `self`.
    pub async fn run(
        mut self,
        mut session: RoomSession<PeerLink>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let mut status = time::interval(self.status_interval);
        log::info!("Network event loop started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.leave(&mut session);
                        break;
                    };
                    if self.handle_command(command, &mut session).is_break() {
                        break;
                    }
                }
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event, &mut session);
                }
                Some(frame) = self.frame_rx.recv() => self.dispatch_frame(frame),
                _ = status.tick() => self.on_status_tick(&session),
            }
        }

        log::info!("Network event loop stopped");
    }

    fn handle_command(
        &mut self,
        command: SessionCommand,
        session: &mut RoomSession<PeerLink>,
    ) -> ControlFlow<()> {
        match command {
            SessionCommand::Send { text, username } => {
                session.send(&text, &username);
            }
            SessionCommand::Subscribe { observer, reply } => {
                if let Some(id) = session.subscribe(observer) {
                    let _ = reply.send(id);
                }
            }
            SessionCommand::Unsubscribe { id, reply } => {
                let _ = reply.send(session.unsubscribe(id));
            }
            SessionCommand::Destroy { done } => {
                self.leave(session);
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<RoomBehaviorEvent>,
        session: &mut RoomSession<PeerLink>,
    ) {
        match event {
            SwarmEvent::Behaviour(RoomBehaviorEvent::Kad(event)) => {
                self.handle_kad_event(event, session);
            }
            SwarmEvent::Behaviour(RoomBehaviorEvent::Mdns(event)) => {
                self.handle_mdns_event(event);
            }
            SwarmEvent::Behaviour(RoomBehaviorEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }
            SwarmEvent::Behaviour(RoomBehaviorEvent::Chat(event)) => {
                self.handle_chat_event(event, session);
            }
            SwarmEvent::Behaviour(RoomBehaviorEvent::Ping(_)) => {}
            SwarmEvent::NewListenAddr { address, .. } => {
                let full_addr = address.with(Protocol::P2p(self.local_peer_id));
                log::info!("Listening on {full_addr}");
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                log::debug!("Connection established with {peer_id} ({num_established} open)");
                if self.providers.contains(&peer_id) {
                    self.admit(peer_id, session);
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                if num_established == 0 {
                    self.release(peer_id, cause.map(|err| err.to_string()), session);
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                log::debug!("Outgoing connection to {peer_id:?} failed: {error}");
            }
            _ => {}
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event, session: &mut RoomSession<PeerLink>) {
        match event {
            kad::Event::OutboundQueryProgressed { id, result, .. } => match result {
                kad::QueryResult::StartProviding(res) => {
                    if self.announce_query == Some(id) {
                        self.announce_query = None;
                        self.announced = Some(match res {
                            Ok(_) => {
                                log::info!("Discovery flushed - actively looking for peers");
                                Ok(())
                            }
                            Err(err) => Err(DiscoveryError::Announce(format!("{err:?}"))),
                        });
                    }
                }
                kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                    providers,
                    ..
                })) => {
                    for provider in providers {
                        self.on_provider(provider, session);
                    }
                }
                kad::QueryResult::GetProviders(Ok(_)) => {}
                kad::QueryResult::GetProviders(Err(err)) => {
                    log::debug!("Provider lookup failed: {err:?}");
                }
                kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk { num_remaining, .. })) => {
                    log::debug!("Kademlia bootstrap ok, remaining peers: {num_remaining}");
                }
                kad::QueryResult::Bootstrap(Err(err)) => {
                    log::warn!("Kademlia bootstrap error: {err:?}");
                }
                _ => {}
            },
            kad::Event::RoutingUpdated { peer, addresses, .. } => {
                log::debug!("Kademlia routing table updated for {peer} (addresses: {addresses:?})");
            }
            _ => {}
        }
    }

    fn handle_mdns_event(&mut self, event: mdns::Event) {
        match event {
            mdns::Event::Discovered(list) => {
                let mut found_new = false;
                for (peer_id, addr) in list {
                    log::debug!("mDNS discovered {peer_id} at {addr}");
                    found_new |= !self.swarm.is_connected(&peer_id);
                    self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
                if found_new {
                    self.lookup_providers();
                }
            }
            mdns::Event::Expired(list) => {
                for (peer_id, _) in list {
                    log::debug!("mDNS record expired for {peer_id}");
                }
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            log::debug!(
                "Identify info from {peer_id}: protocols={:?}",
                info.protocols
            );
            for addr in info.listen_addrs {
                self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
            }
        }
    }

    fn handle_chat_event(
        &mut self,
        event: request_response::Event<Vec<u8>, ()>,
        session: &mut RoomSession<PeerLink>,
    ) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    if self
                        .swarm
                        .behaviour_mut()
                        .chat
                        .send_response(channel, ())
                        .is_err()
                    {
                        log::debug!("Could not acknowledge frame from {peer}");
                    }
                    // Only room members speak the chat protocol to us.
                    self.admit(peer, session);
                    if let Some(label) = self.members.get(&peer) {
                        session.inbound(label, &request);
                    }
                }
                request_response::Message::Response { request_id, .. } => {
                    self.advance_lane(peer, request_id);
                }
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                if let Some(label) = self.members.get(&peer) {
                    let err = ConnectionError::Outbound {
                        peer: label.clone(),
                        reason: error.to_string(),
                    };
                    session.peer_error(label, &err);
                }
                self.advance_lane(peer, request_id);
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                if let Some(label) = self.members.get(&peer) {
                    let err = ConnectionError::Inbound {
                        peer: label.clone(),
                        reason: error.to_string(),
                    };
                    session.peer_error(label, &err);
                }
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    fn on_provider(&mut self, peer: PeerId, session: &mut RoomSession<PeerLink>) {
        if peer == self.local_peer_id {
            return;
        }
        if self.providers.insert(peer) {
            log::info!("Discovered room peer {peer}");
        }
        if self.members.contains_key(&peer) {
            return;
        }
        if self.swarm.is_connected(&peer) {
            self.admit(peer, session);
        } else if let Err(err) = self.swarm.dial(peer) {
            log::debug!("Dial to room peer {peer} failed ({err}); asking the DHT for its address");
            self.swarm.behaviour_mut().kad.get_closest_peers(peer);
        }
    }

    fn admit(&mut self, peer: PeerId, session: &mut RoomSession<PeerLink>) {
        if self.members.contains_key(&peer) {
            return;
        }
        let label = short_peer_id(&peer);
        self.members.insert(peer, label.clone());
        session.peer_connected(&label, PeerLink::new(peer, self.frame_tx.clone()));
    }

    fn release(
        &mut self,
        peer: PeerId,
        cause: Option<String>,
        session: &mut RoomSession<PeerLink>,
    ) {
        let Some(label) = self.members.remove(&peer) else {
            return;
        };
        if let Some(reason) = cause {
            let err = ConnectionError::Closed {
                peer: label.clone(),
                reason,
            };
            session.peer_error(&label, &err);
        }
        let dropped = self.lanes.drop_peer(&peer);
        if dropped > 0 {
            log::debug!("Discarded {dropped} unsent frames for {label}");
        }
        session.peer_closed(&label);
    }

    fn dispatch_frame(&mut self, frame: OutboundFrame) {
        if !self.members.contains_key(&frame.peer) {
            log::debug!("Dropping frame for departed peer {}", frame.peer);
            return;
        }
        if let Some(bytes) = self.lanes.enqueue(frame.peer, frame.bytes) {
            self.send_frame(frame.peer, bytes);
        }
    }

    fn advance_lane(&mut self, peer: PeerId, request_id: OutboundRequestId) {
        if let Some(next) = self.lanes.complete(&peer, request_id) {
            self.send_frame(peer, next);
        }
    }

    fn send_frame(&mut self, peer: PeerId, bytes: Vec<u8>) {
        let request_id = self.swarm.behaviour_mut().chat.send_request(&peer, bytes);
        self.lanes.mark_sent(&peer, request_id);
    }

    fn lookup_providers(&mut self) {
        self.swarm
            .behaviour_mut()
            .kad
            .get_providers(self.topic_key.clone());
    }

    fn on_status_tick(&mut self, session: &RoomSession<PeerLink>) {
        if session.peer_count() == 0 {
            log::info!("Still waiting for peers... (ensure both clients use same room name)");
        }
        self.lookup_providers();
    }

    /// Leaves the topic and closes every room connection.
    fn leave(&mut self, session: &mut RoomSession<PeerLink>) {
        self.swarm
            .behaviour_mut()
            .kad
            .stop_providing(&self.topic_key);
        for peer in self.members.keys() {
            let _ = self.swarm.disconnect_peer_id(*peer);
        }
        self.members.clear();
        session.destroy();
        log::info!("Left room {}", session.room_name());
    }
}

pub fn parse_bootstrap_peers(entries: &[String]) -> Vec<(PeerId, Multiaddr)> {
    entries
        .iter()
        .filter_map(|entry| {
            let mut addr: Multiaddr = match entry.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    log::warn!("Invalid multiaddr `{entry}`: {err}");
                    return None;
                }
            };

            let peer_id = match addr.pop() {
                Some(Protocol::P2p(peer)) => peer,
                _ => {
                    log::warn!("Multiaddr `{entry}` missing /p2p/PeerId suffix");
                    return None;
                }
            };

            Some((peer_id, addr))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use libp2p::identity;

    use super::*;
    use crate::common::{InboundRecord, Origin, SessionEvent};
    use crate::network::Session;

    fn free_local_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .unwrap()
    }

    fn loopback_config(listen_port: u16, bootstrap_nodes: Vec<String>) -> AppConfig {
        let key_path = std::env::temp_dir()
            .join(format!("room-chat-{}", uuid::Uuid::new_v4()))
            .join("client_key.pk");
        AppConfig {
            bootstrap_nodes,
            listen_addr: format!("/ip4/127.0.0.1/tcp/{listen_port}"),
            enable_mdns: false,
            identity_key_path: key_path.to_string_lossy().to_string(),
            announce_timeout_secs: 20,
            settle_delay_ms: 0,
            status_interval_secs: 1,
            ..AppConfig::default()
        }
    }

    /// Two configs where the second bootstraps from the first's listen address.
    fn linked_configs() -> (AppConfig, AppConfig, PeerId) {
        let port = free_local_port();
        let first = loopback_config(port, Vec::new());
        let first_peer = load_or_generate_local_key(&first.identity_key_path)
            .unwrap()
            .public()
            .to_peer_id();
        let second = loopback_config(
            0,
            vec![format!("/ip4/127.0.0.1/tcp/{port}/p2p/{first_peer}")],
        );
        (first, second, first_peer)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            time::sleep(Duration::from_millis(100)).await;
        }
        condition()
    }

    async fn next_message(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> InboundRecord {
        loop {
            match time::timeout(Duration::from_secs(20), events.recv()).await {
                Ok(Some(SessionEvent::MessageReceived(record))) => return record,
                Ok(Some(SessionEvent::PeerCountChanged(_))) => continue,
                Ok(None) => panic!("session closed before a message arrived"),
                Err(_) => panic!("no message within 20s"),
            }
        }
    }

    #[tokio::test]
    async fn peers_in_the_same_room_meet_and_exchange_records() {
        let (config_a, config_b, peer_a) = linked_configs();

        let (a_tx, mut a_events) = mpsc::unbounded_channel();
        let a = Session::join_with("lobby", &config_a, vec![Box::new(a_tx)])
            .await
            .unwrap();
        a.send("sent before anyone joined", "alice");

        let (b_tx, mut b_events) = mpsc::unbounded_channel();
        let b = Session::join_with("lobby", &config_b, vec![Box::new(b_tx)])
            .await
            .unwrap();

        assert!(wait_until(|| a.peer_count() == 1 && b.peer_count() == 1).await);

        let echo = next_message(&mut a_events).await;
        assert_eq!(echo.origin, Origin::Local);

        let delivered = next_message(&mut b_events).await;
        assert_eq!(delivered.text, "sent before anyone joined");
        assert_eq!(delivered.username, "alice");
        assert_eq!(delivered.origin, Origin::Remote(short_peer_id(&peer_a)));

        b.destroy().await;
        assert!(b.is_destroyed());
        assert!(wait_until(|| a.peer_count() == 0).await);

        a.destroy().await;
    }

    #[tokio::test]
    async fn dropping_join_mid_announcement_releases_the_listener() {
        let port = free_local_port();
        let unreachable = identity::Keypair::generate_ed25519().public().to_peer_id();
        let config = loopback_config(
            port,
            vec![format!("/ip4/127.0.0.1/tcp/1/p2p/{unreachable}")],
        );

        let attempt = time::timeout(Duration::ZERO, Session::join("lobby", &config)).await;
        assert!(attempt.is_err());

        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    #[tokio::test]
    async fn connected_peers_in_different_rooms_stay_apart() {
        let (config_a, config_b, _) = linked_configs();

        let a = Session::join("lobby", &config_a).await.unwrap();
        let b = Session::join("attic", &config_b).await.unwrap();
        b.send("anyone?", "bob");

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(a.peer_count(), 0);
        assert_eq!(b.peer_count(), 0);

        a.destroy().await;
        b.destroy().await;
    }

    #[test]
    fn bootstrap_entries_need_a_peer_id_suffix() {
        let peer = identity::Keypair::generate_ed25519().public().to_peer_id();
        let entries = vec![
            format!("/ip4/10.0.0.1/tcp/4001/p2p/{peer}"),
            "/ip4/10.0.0.2/tcp/4001".to_string(),
            "not a multiaddr".to_string(),
        ];

        let parsed = parse_bootstrap_peers(&entries);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, peer);
        assert_eq!(parsed[0].1.to_string(), "/ip4/10.0.0.1/tcp/4001");
    }
}
