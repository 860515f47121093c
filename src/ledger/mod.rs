mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::BookingError;
pub use store::InMemoryStore;

use std::io;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::LedgerConfig;
use crate::journal::{Journal, MemoryJournal, WalJournal};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// The availability ledger: sole owner of the reservation set.
///
/// Every mutation holds its resource's write lock from the conflict check
/// through the journal append to the in-memory apply, so two bookings of the
/// same resource never interleave. Mutations also hold the commit gate for
/// reading; journal compaction takes it for writing so no event can slip
/// between its snapshot and the log swap.
pub struct Ledger {
    store: Arc<InMemoryStore>,
    journal: Arc<dyn Journal>,
    pub notify: Arc<NotifyHub>,
    commit_gate: Arc<RwLock<()>>,
}

impl Ledger {
    pub fn new(store: InMemoryStore, journal: Arc<dyn Journal>, notify: Arc<NotifyHub>) -> Self {
        Self {
            store: Arc::new(store),
            journal,
            notify,
            commit_gate: Arc::new(RwLock::new(())),
        }
    }

    /// Empty ledger whose journal lives in memory.
    pub fn in_memory() -> Self {
        Self::new(
            InMemoryStore::new(),
            Arc::new(MemoryJournal::new()),
            Arc::new(NotifyHub::new()),
        )
    }

    /// Replay the WAL under `config.data_dir` and start its group-commit writer.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(config: &LedgerConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.wal_path();
        let events = Wal::replay(&path)?;

        let store = InMemoryStore::new();
        let mut skipped = 0usize;
        for event in &events {
            if let Err(e) = store.replay_event(event) {
                skipped += 1;
                warn!("replay skipped event on resource {}: {e}", event.resource_id());
            }
        }
        info!(
            path = %path.display(),
            events = events.len(),
            skipped,
            reservations = store.reservation_count(),
            "ledger opened"
        );

        let journal = WalJournal::spawn(Wal::open(&path)?, config.wal_channel_capacity);
        Ok(Self::new(store, Arc::new(journal), Arc::new(NotifyHub::new())))
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Journal, apply, notify. The caller holds the resource's write lock.
    ///
    /// Nothing is applied if the journal append fails. Once the append has
    /// been handed to the journal it completes even if this future is
    /// dropped, so the apply runs in a spawned task rather than being left to
    /// the caller's poll: the WAL and memory never diverge on cancellation.
    pub(super) async fn persist_and_apply(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut rs: OwnedRwLockWriteGuard<ResourceState>,
        event: Event,
    ) -> Result<(), BookingError> {
        let journal = self.journal.clone();
        let store = self.store.clone();
        let notify = self.notify.clone();
        let commit = tokio::spawn(async move {
            let _gate = gate;
            journal.append(&event).await?;
            store.apply_event(&mut rs, &event)?;
            notify.send(rs.id, &event);
            Ok::<(), BookingError>(())
        });
        commit
            .await
            .map_err(|e| BookingError::StorageUnavailable(format!("commit task failed: {e}")))?
    }

    pub(super) async fn enter_commit(&self) -> OwnedRwLockReadGuard<()> {
        self.commit_gate.clone().read_owned().await
    }

    /// Lookup reservation → resource, acquire the resource's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(ResourceId, OwnedRwLockWriteGuard<ResourceState>), BookingError> {
        let resource_id = self
            .store
            .get_resource_for_reservation(reservation_id)
            .ok_or(BookingError::NotFound(*reservation_id))?;
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(BookingError::NotFound(*reservation_id))?;
        Ok((resource_id, rs.write_owned().await))
    }
}
