use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::ledger::BookingError;
use crate::model::Event;
use crate::observability;
use crate::wal::{LogFile, Wal};

/// Durability handle the ledger writes every event to before applying it.
///
/// An `Err` from `append` means the event must be treated as not written.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn append(&self, event: &Event) -> Result<(), BookingError>;

    /// Replace the journal contents with `events`.
    async fn compact(&self, events: Vec<Event>) -> Result<(), BookingError>;

    async fn appends_since_compact(&self) -> u64;
}

// ── In-memory ────────────────────────────────────────────

/// Journal that keeps events in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<Event>>,
    appends_since_compact: AtomicU64,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, event: &Event) -> Result<(), BookingError> {
        self.events.lock().await.push(event.clone());
        self.appends_since_compact.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), BookingError> {
        *self.events.lock().await = events;
        self.appends_since_compact.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact.load(Ordering::Relaxed)
    }
}

// ── WAL-backed with group commit ─────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Journal backed by a [`Wal`] owned by a background writer task.
///
/// Appends that arrive while a flush is pending share its fsync.
pub struct WalJournal {
    tx: mpsc::Sender<WalCommand>,
}

impl WalJournal {
    /// Move `wal` into a writer task. Must be called inside a tokio runtime.
    pub fn spawn<F: LogFile + 'static>(wal: Wal<F>, channel_capacity: usize) -> Self {
        tracing::debug!(synced_len = wal.synced_len(), "starting WAL writer");
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        tokio::spawn(wal_writer_loop(wal, rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WalCommand,
    ) -> Result<T, BookingError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| BookingError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::StorageUnavailable("WAL writer dropped response".into()))
    }
}

#[async_trait]
impl Journal for WalJournal {
    async fn append(&self, event: &Event) -> Result<(), BookingError> {
        let event = event.clone();
        self.request(|response| WalCommand::Append { event, response })
            .await?
            .map_err(|e| BookingError::StorageUnavailable(e.to_string()))
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), BookingError> {
        self.request(|response| WalCommand::Compact { events, response })
            .await?
            .map_err(|e| BookingError::StorageUnavailable(e.to_string()))
    }

    async fn appends_since_compact(&self) -> u64 {
        match self.request(|response| WalCommand::AppendsSinceCompact { response }).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("cannot read WAL append count: {e}");
                0
            }
        }
    }
}

/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
///
/// A non-append command found while draining closes the batch and runs after it.
async fn wal_writer_loop<F: LogFile>(mut wal: Wal<F>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush of {} events failed: {e}", batch.len());
        }
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// All of the batch reaches disk or none of it does; a failure rejects every
/// sender in the batch.
fn flush_batch<F: LogFile>(wal: &mut Wal<F>, batch: &[PendingAppend]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            wal.discard_pending();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append<F: LogFile>(wal: &mut Wal<F>, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentityId, Reservation, ResourceId};
    use crate::wal::testing::FlakyLog;
    use chrono::{Datelike, NaiveDate};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("daybook_test_journal");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn committed(rid: u64, d: u32) -> Event {
        Event::ReservationsCommitted {
            resource_id: ResourceId(rid),
            reservations: vec![Reservation::new(
                ResourceId(rid),
                IdentityId::from("u1"),
                NaiveDate::from_ymd_opt(2025, 7, d).unwrap(),
            )],
        }
    }

    #[tokio::test]
    async fn memory_journal_records_and_compacts() {
        let journal = MemoryJournal::new();
        journal.append(&committed(1, 1)).await.unwrap();
        journal.append(&committed(1, 2)).await.unwrap();
        assert_eq!(journal.appends_since_compact().await, 2);

        journal.compact(vec![committed(1, 3)]).await.unwrap();
        assert_eq!(journal.appends_since_compact().await, 0);
        assert_eq!(journal.events().await.len(), 1);
    }

    #[tokio::test]
    async fn wal_journal_concurrent_appends_all_durable() {
        let path = tmp_path("group_commit.wal");
        let journal = Arc::new(WalJournal::spawn(Wal::open(&path).unwrap(), 64));

        let mut handles = Vec::new();
        for d in 1..=20 {
            let journal = journal.clone();
            handles.push(tokio::spawn(async move { journal.append(&committed(9, d)).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(journal.appends_since_compact().await, 20);
        assert_eq!(Wal::replay(&path).unwrap().len(), 20);
    }

    #[tokio::test]
    async fn wal_journal_compact_replaces_log() {
        let path = tmp_path("journal_compact.wal");
        let journal = WalJournal::spawn(Wal::open(&path).unwrap(), 8);
        for d in 1..=5 {
            journal.append(&committed(2, d)).await.unwrap();
        }
        let snapshot = vec![committed(2, 30)];
        journal.compact(snapshot.clone()).await.unwrap();
        assert_eq!(journal.appends_since_compact().await, 0);
        assert_eq!(Wal::replay(&path).unwrap(), snapshot);
    }

    #[tokio::test]
    async fn failed_batch_is_rejected_and_not_resurrected() {
        let log = FlakyLog::default();
        let journal = WalJournal::spawn(Wal::over(log.clone(), 0), 8);
        journal.append(&committed(3, 1)).await.unwrap();

        log.set_failing(true);
        let err = journal.append(&committed(3, 2)).await.unwrap_err();
        assert!(err.is_retryable());

        log.set_failing(false);
        journal.append(&committed(3, 3)).await.unwrap();

        let dates: Vec<u32> = log
            .events()
            .iter()
            .map(|e| match e {
                Event::ReservationsCommitted { reservations, .. } => reservations[0].date.day(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(dates, [1, 3]);
        assert_eq!(journal.appends_since_compact().await, 2);
    }
}
