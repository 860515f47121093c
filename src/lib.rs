pub mod api;
pub mod compactor;
pub mod config;
pub mod dates;
pub mod journal;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use config::LedgerConfig;
pub use ledger::{BookingError, InMemoryStore, Ledger};
pub use model::{Event, IdentityId, Reservation, ResourceId};
