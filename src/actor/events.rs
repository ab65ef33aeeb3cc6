//! Structured notification stream
//!
//! Human-readable status, info and error notifications published by the broker.
//! Each one is mirrored to `tracing` and fanned out to any number of subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{Level, event};

use crate::domain::constant::broker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error
}

/// One notification: `{level, actorId, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorEvent {
    pub level:    EventLevel,
    pub actor_id: String,
    pub message:  String
}

impl ActorEvent {
    pub fn new(level: EventLevel, actor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level, actor_id: actor_id.into(), message: message.into() }
    }
}

#[derive(Debug, Clone)]
pub struct EventStream {
    sender: broadcast::Sender<ActorEvent>
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActorEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: ActorEvent) {
        match notification.level {
            EventLevel::Debug => event!(Level::DEBUG, event = broker::NOTIFICATION,
                                        actor_id = %notification.actor_id, message = %notification.message),
            EventLevel::Info => event!(Level::INFO, event = broker::NOTIFICATION,
                                       actor_id = %notification.actor_id, message = %notification.message),
            EventLevel::Warn => event!(Level::WARN, event = broker::NOTIFICATION,
                                       actor_id = %notification.actor_id, message = %notification.message),
            EventLevel::Error => event!(Level::ERROR, event = broker::NOTIFICATION,
                                        actor_id = %notification.actor_id, message = %notification.message)
        }

        // No subscribers is fine
        let _ = self.sender.send(notification);
    }
}
