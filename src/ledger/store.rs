use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::{BookingError, SharedResourceState};

/// The reservation set: one lock-guarded table per resource plus a
/// reservation id → resource index.
///
/// Tables are created lazily on first booking; a resource the store has never
/// seen simply has no reservations.
pub struct InMemoryStore {
    resources: DashMap<ResourceId, SharedResourceState>,
    reservation_to_resource: DashMap<Ulid, ResourceId>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            reservation_to_resource: DashMap::new(),
        }
    }

    // ── Resource tables ──────────────────────────────────────

    pub fn get_resource(&self, id: &ResourceId) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resource_or_insert(&self, id: ResourceId) -> SharedResourceState {
        self.resources
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceState::new(id))))
            .value()
            .clone()
    }

    /// Resource ids in ascending order.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.resources.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Snapshot of the table handles, ascending by resource id. Safe to await on.
    pub fn resource_states(&self) -> Vec<SharedResourceState> {
        self.resource_ids()
            .into_iter()
            .filter_map(|id| self.get_resource(&id))
            .collect()
    }

    // ── Reservation index ────────────────────────────────────

    pub fn get_resource_for_reservation(&self, id: &Ulid) -> Option<ResourceId> {
        self.reservation_to_resource.get(id).map(|e| *e.value())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_resource.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to a table the caller holds the write lock on.
    ///
    /// A commit that would reuse a reserved date is refused whole with
    /// `DateConflict`; the table and index are untouched on any error.
    pub fn apply_event(&self, rs: &mut ResourceState, event: &Event) -> Result<(), BookingError> {
        match event {
            Event::ReservationsCommitted { reservations, .. } => {
                rs.insert_all(reservations).map_err(BookingError::DateConflict)?;
                for r in reservations.iter().filter(|r| r.resource_id == rs.id) {
                    self.reservation_to_resource.insert(r.id, rs.id);
                }
                Ok(())
            }
            Event::ReservationCancelled { id, .. } => {
                rs.remove(*id).ok_or(BookingError::NotFound(*id))?;
                self.reservation_to_resource.remove(id);
                Ok(())
            }
        }
    }

    /// Apply a journal event during startup replay, before any other task
    /// can hold a table lock.
    pub fn replay_event(&self, event: &Event) -> Result<(), BookingError> {
        let rs = self.resource_or_insert(event.resource_id());
        let mut guard = rs
            .try_write()
            .map_err(|_| BookingError::StorageUnavailable("replay: resource table locked".into()))?;
        self.apply_event(&mut guard, event)
    }
}
