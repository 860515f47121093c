use crate::ledger::BookingError;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: `book` calls. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "daybook_bookings_total";

/// Histogram: `book` latency in seconds, lock wait and journal fsync included.
pub const BOOK_DURATION_SECONDS: &str = "daybook_book_duration_seconds";

/// Counter: reservations removed by `cancel`.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "daybook_reservations_cancelled_total";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "daybook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "daybook_wal_flush_batch_size";

/// Map a booking result to its `outcome` label.
pub fn outcome_label<T>(result: &Result<T, BookingError>) -> &'static str {
    match result {
        Ok(_) => "committed",
        Err(e) => e.kind(),
    }
}
