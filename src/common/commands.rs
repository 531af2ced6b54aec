use std::fmt;

use tokio::sync::oneshot;

use crate::session::{SessionObserver, SubscriptionId};

/// Commands a front-end sends down to the session task.
pub enum SessionCommand {
    Send {
        text: String,
        username: String,
    },
    Subscribe {
        observer: Box<dyn SessionObserver>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    /// Leave the topic, close every connection and stop the task.
    Destroy { done: oneshot::Sender<()> },
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Send { text, username } => f
                .debug_struct("Send")
                .field("text", text)
                .field("username", username)
                .finish(),
            SessionCommand::Subscribe { .. } => f.write_str("Subscribe"),
            SessionCommand::Unsubscribe { id, .. } => {
                f.debug_struct("Unsubscribe").field("id", id).finish()
            }
            SessionCommand::Destroy { .. } => f.write_str("Destroy"),
        }
    }
}
