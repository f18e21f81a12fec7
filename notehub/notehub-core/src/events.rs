use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Document lifecycle notifications fanned out to live subscribers.
/// Each event carries the owner so streams can be filtered per principal.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    Created { id: Uuid, owner: String },
    Updated { id: Uuid, owner: String },
    Archived { id: Uuid, owner: String },
    Restored { id: Uuid, owner: String },
    Deleted { id: Uuid, owner: String },
}

impl Event {
    pub fn owner(&self) -> &str {
        match self {
            Event::Created { owner, .. }
            | Event::Updated { owner, .. }
            | Event::Archived { owner, .. }
            | Event::Restored { owner, .. }
            | Event::Deleted { owner, .. } => owner,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
