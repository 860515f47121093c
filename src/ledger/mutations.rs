use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, checked_expand, validate_identity};
use super::{BookingError, Ledger};

impl Ledger {
    /// Reserve `resource_id` for `identity_id` on every night of `[start, end]`.
    ///
    /// All-or-nothing: either one reservation per day is committed, returned in
    /// date order, or the ledger is left exactly as it was. A day held by anyone,
    /// the same identity included, fails the whole request with `DateConflict`.
    /// Of two overlapping requests racing for the same resource, the first to
    /// take the resource lock wins and the other sees `DateConflict`.
    pub async fn book(
        &self,
        resource_id: ResourceId,
        identity_id: &IdentityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, BookingError> {
        let started = Instant::now();
        let result = self.try_book(resource_id, identity_id, start, end).await;
        metrics::counter!(
            observability::BOOKINGS_TOTAL,
            "outcome" => observability::outcome_label(&result)
        )
        .increment(1);
        metrics::histogram!(observability::BOOK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn try_book(
        &self,
        resource_id: ResourceId,
        identity_id: &IdentityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, BookingError> {
        validate_identity(identity_id)?;
        let dates = checked_expand(start, end)?;

        let gate = self.enter_commit().await;
        let rs = self.store.resource_or_insert(resource_id);
        let guard = rs.write_owned().await;
        if guard.len() + dates.len() > MAX_RESERVATIONS_PER_RESOURCE {
            return Err(BookingError::LimitExceeded("too many reservations on resource"));
        }

        if let Err(e) = check_no_conflict(&guard, &dates) {
            debug!(%resource_id, identity = %identity_id, "booking {start}..={end} rejected: {e}");
            return Err(e);
        }

        let reservations: Vec<Reservation> = dates
            .into_iter()
            .map(|date| Reservation::new(resource_id, identity_id.clone(), date))
            .collect();
        let event = Event::ReservationsCommitted {
            resource_id,
            reservations: reservations.clone(),
        };
        self.persist_and_apply(gate, guard, event).await?;

        debug!(
            %resource_id,
            identity = %identity_id,
            nights = reservations.len(),
            "booked {start}..={end}"
        );
        Ok(reservations)
    }

    /// Remove a reservation, freeing its date for a later booking.
    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let gate = self.enter_commit().await;
        let (resource_id, guard) = self.resolve_reservation_write(&id).await?;
        // A concurrent cancel may have won the lock first.
        let reservation = guard.find(id).cloned().ok_or(BookingError::NotFound(id))?;

        let event = Event::ReservationCancelled { id, resource_id };
        self.persist_and_apply(gate, guard, event).await?;

        metrics::counter!(observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        debug!(%resource_id, date = %reservation.date, "cancelled reservation {id}");
        Ok(reservation)
    }

    /// Rewrite the journal as one commit event per resource holding its live
    /// reservations. Blocks mutations for the duration.
    pub async fn compact_journal(&self) -> Result<(), BookingError> {
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::new();
        for rs in self.store.resource_states() {
            let guard = rs.read().await;
            if guard.is_empty() {
                continue;
            }
            events.push(Event::ReservationsCommitted {
                resource_id: guard.id,
                reservations: guard.reservations().cloned().collect(),
            });
        }

        let resources = events.len();
        self.journal.compact(events).await?;
        info!(resources, reservations = self.store.reservation_count(), "journal compacted");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}
