use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use crate::action::ActionType;

/// Notification sent after every reduced action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// Action that was just reduced.
    pub action: ActionType,
    /// Store version after the action.
    pub version: u64,
}

/// Broadcast hub fanning store changes out to subscribers (e.g. the rendering layer).
pub struct EventHub {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a stream; events missed by a lagging subscriber are skipped.
    pub fn stream(&self) -> impl Stream<Item = StoreEvent> + Send + use<> {
        BroadcastStream::new(self.subscribe()).filter_map(Result::ok)
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }
}
