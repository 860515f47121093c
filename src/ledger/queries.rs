use std::collections::BTreeSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::conflict::checked_expand;
use super::{BookingError, Ledger};

impl Ledger {
    /// The subset of `dates` already reserved on `resource_id`, by anyone.
    ///
    /// Reads under the resource lock, so it sees every commit that finished
    /// before it and none that is still in flight.
    pub async fn check_conflicts(&self, resource_id: ResourceId, dates: &[NaiveDate]) -> BTreeSet<NaiveDate> {
        let Some(rs) = self.store.get_resource(&resource_id) else {
            return BTreeSet::new();
        };
        let guard = rs.read().await;
        guard.conflicts(dates)
    }

    /// Days of `[start, end]` still open on `resource_id`.
    pub async fn free_dates(
        &self,
        resource_id: ResourceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, BookingError> {
        let mut dates = checked_expand(start, end)?;
        if let Some(rs) = self.store.get_resource(&resource_id) {
            let guard = rs.read().await;
            let taken: BTreeSet<NaiveDate> = guard.between(start, end).map(|r| r.date).collect();
            dates.retain(|d| !taken.contains(d));
        }
        Ok(dates)
    }

    /// Reservations on one resource, in date order.
    pub async fn reservations(&self, resource_id: ResourceId) -> Vec<Reservation> {
        let Some(rs) = self.store.get_resource(&resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard.reservations().cloned().collect()
    }

    /// Every reservation held by `identity_id`, ordered by date then resource.
    pub async fn reservations_for(&self, identity_id: &IdentityId) -> Vec<Reservation> {
        let mut held = Vec::new();
        for rs in self.store.resource_states() {
            let guard = rs.read().await;
            held.extend(
                guard
                    .reservations()
                    .filter(|r| &r.identity_id == identity_id)
                    .cloned(),
            );
        }
        held.sort_by_key(|r| (r.date, r.resource_id));
        held
    }

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        let resource_id = self.store.get_resource_for_reservation(&id)?;
        let rs = self.store.get_resource(&resource_id)?;
        let guard = rs.read().await;
        guard.find(id).cloned()
    }

    pub fn reservation_count(&self) -> usize {
        self.store.reservation_count()
    }
}
