use tokio::sync::{mpsc, oneshot, watch};

use crate::common::SessionCommand;
use crate::config::AppConfig;
use crate::error::DiscoveryError;
use crate::session::{RoomSession, SessionObserver, SubscriptionId, Topic};

use super::client::RoomNetwork;

/// Public face of a joined room. Cheap to clone; every clone talks to the
/// same network task.
#[derive(Clone)]
pub struct Session {
    room_name: String,
    topic: Topic,
    commands: mpsc::UnboundedSender<SessionCommand>,
    peer_count: watch::Receiver<usize>,
}

impl Session {
    /// Derives the topic, announces it and starts the network task.
    ///
    /// Returns once the announcement is live. No peer needs to be present yet.
    /// Dropping the returned future before it resolves abandons the
    /// announcement and releases the network stack.
    pub async fn join(room_name: &str, config: &AppConfig) -> Result<Self, DiscoveryError> {
        Self::join_with(room_name, config, Vec::new()).await
    }

    /// Like [`Session::join`], with `observers` attached before discovery
    /// starts, so records from peers met during the announcement are kept.
    pub async fn join_with(
        room_name: &str,
        config: &AppConfig,
        observers: Vec<Box<dyn SessionObserver>>,
    ) -> Result<Self, DiscoveryError> {
        let mut core = RoomSession::new(room_name);
        let (count_tx, peer_count) = watch::channel(0usize);
        core.subscribe(Box::new(count_tx));
        for observer in observers {
            core.subscribe(observer);
        }

        let mut network = RoomNetwork::start(config, core.topic())?;
        network.announce(&mut core, config.announce_timeout()).await?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let topic = core.topic();
        tokio::spawn(network.run(core, command_rx));

        Ok(Self::new(room_name, topic, commands, peer_count))
    }

    fn new(
        room_name: &str,
        topic: Topic,
        commands: mpsc::UnboundedSender<SessionCommand>,
        peer_count: watch::Receiver<usize>,
    ) -> Self {
        Self {
            room_name: room_name.to_string(),
            topic,
            commands,
            peer_count,
        }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Submits a message. Never fails: with no peers the message is queued,
    /// and the local echo is always delivered to subscribers.
    pub fn send(&self, text: &str, username: &str) {
        let command = SessionCommand::Send {
            text: text.to_string(),
            username: username.to_string(),
        };
        if self.commands.send(command).is_err() {
            log::warn!("Session already destroyed; message from {username} dropped");
        }
    }

    pub fn peer_count(&self) -> usize {
        *self.peer_count.borrow()
    }

    /// Returns `None` once the session has been destroyed.
    pub async fn subscribe(&self, observer: Box<dyn SessionObserver>) -> Option<SubscriptionId> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Subscribe { observer, reply })
            .ok()?;
        response.await.ok()
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Unsubscribe { id, reply })
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Leaves the topic, closes all connections and stops the network task.
    /// Later calls return immediately.
    pub async fn destroy(&self) {
        let (done, finished) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Destroy { done })
            .is_err()
        {
            return;
        }
        let _ = finished.await;
    }

    pub fn is_destroyed(&self) -> bool {
        self.commands.is_closed()
    }
}
