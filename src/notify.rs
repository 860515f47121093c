use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-resource broadcast of committed ledger events.
///
/// A subscriber sees each booking (`ReservationsCommitted`) and cancellation
/// (`ReservationCancelled`) after it reached the journal and was applied, in
/// commit order for that resource. Rejected or failed requests publish
/// nothing. A receiver that falls more than `CHANNEL_CAPACITY` events behind
/// gets `Lagged` and should re-read the resource.
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a resource's events, creating its channel on first use.
    pub fn subscribe(&self, resource_id: ResourceId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, resource_id: ResourceId, event: &Event) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a resource's channel; its receivers see the stream close.
    pub fn remove(&self, resource_id: &ResourceId) {
        self.channels.remove(resource_id);
    }
}
