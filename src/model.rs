use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque key of an allocatable unit (a room). Existence is the catalog's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key of the party holding a reservation. Carries no roles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resource held by one identity for one night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub identity_id: IdentityId,
    pub date: NaiveDate,
}

impl Reservation {
    pub fn new(resource_id: ResourceId, identity_id: IdentityId, date: NaiveDate) -> Self {
        Self {
            id: Ulid::new(),
            resource_id,
            identity_id,
            date,
        }
    }
}

/// Reservation table of a single resource, keyed by date.
///
/// The date key is the uniqueness constraint: a second reservation for a taken
/// date is refused here regardless of what the caller checked beforehand.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: ResourceId,
    reserved: BTreeMap<NaiveDate, Reservation>,
}

impl ResourceState {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            reserved: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }

    pub fn is_reserved(&self, date: &NaiveDate) -> bool {
        self.reserved.contains_key(date)
    }

    pub fn find(&self, id: Ulid) -> Option<&Reservation> {
        self.reserved.values().find(|r| r.id == id)
    }

    /// The subset of `dates` already taken, in date order.
    pub fn conflicts<'a>(&self, dates: impl IntoIterator<Item = &'a NaiveDate>) -> BTreeSet<NaiveDate> {
        dates
            .into_iter()
            .filter(|d| self.is_reserved(d))
            .copied()
            .collect()
    }

    /// Insert every reservation or none of them.
    ///
    /// Fails with the sorted dates that are taken already or repeated within
    /// `reservations`. Reservations for another resource are ignored.
    pub fn insert_all(&mut self, reservations: &[Reservation]) -> Result<(), Vec<NaiveDate>> {
        let mut seen = BTreeSet::new();
        let mut clashes = BTreeSet::new();
        for r in reservations.iter().filter(|r| r.resource_id == self.id) {
            if self.is_reserved(&r.date) || !seen.insert(r.date) {
                clashes.insert(r.date);
            }
        }
        if !clashes.is_empty() {
            return Err(clashes.into_iter().collect());
        }
        for r in reservations.iter().filter(|r| r.resource_id == self.id) {
            self.reserved.insert(r.date, r.clone());
        }
        Ok(())
    }

    /// Remove a reservation by id, freeing its date.
    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let date = self.find(id)?.date;
        self.reserved.remove(&date)
    }

    /// All reservations in date order.
    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reserved.values()
    }

    /// Reservations whose date falls in `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = &Reservation> {
        let range = if start <= end {
            Some(self.reserved.range(start..=end))
        } else {
            None
        };
        range.into_iter().flat_map(|r| r.map(|(_, v)| v))
    }
}

/// Journal record. One `ReservationsCommitted` per successful booking, so a
/// request is replayed whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationsCommitted {
        resource_id: ResourceId,
        reservations: Vec<Reservation>,
    },
    ReservationCancelled {
        id: Ulid,
        resource_id: ResourceId,
    },
}

impl Event {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Event::ReservationsCommitted { resource_id, .. }
            | Event::ReservationCancelled { resource_id, .. } => *resource_id,
        }
    }
}
