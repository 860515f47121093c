//! Request and response shapes for the boundary layer in front of the ledger.
//!
//! The caller has already authenticated the identity and confirmed the
//! resource exists in the catalog; this module only parses dates, calls
//! [`Ledger::book`] and translates the outcome.

use serde::{Deserialize, Serialize};

use crate::dates::{format_date, parse_date};
use crate::ledger::{BookingError, Ledger};
use crate::model::{IdentityId, Reservation, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub resource_id: u64,
    /// Inclusive, `YYYY-MM-DD`.
    pub start_date: String,
    /// Inclusive, `YYYY-MM-DD`.
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub id: String,
    pub resource_id: u64,
    pub date: String,
    pub identity: String,
}

impl From<&Reservation> for ReservationView {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            resource_id: r.resource_id.0,
            date: format_date(r.date),
            identity: r.identity_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub created: Vec<ReservationView>,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Name of the violated rule, e.g. `date_conflict`.
    pub error: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl ErrorResponse {
    pub fn is_retryable(&self) -> bool {
        self.error == "storage_unavailable"
    }
}

impl From<&BookingError> for ErrorResponse {
    fn from(e: &BookingError) -> Self {
        let conflicts = match e {
            BookingError::DateConflict(dates) => dates.iter().copied().map(format_date).collect(),
            _ => Vec::new(),
        };
        Self {
            error: e.kind().to_string(),
            detail: e.to_string(),
            conflicts,
        }
    }
}

/// Parse, book and translate one request on behalf of `identity`.
pub async fn book(
    ledger: &Ledger,
    identity: &IdentityId,
    request: &BookingRequest,
) -> Result<BookingResponse, ErrorResponse> {
    let parsed = parse_date(&request.start_date)
        .and_then(|start| Ok((start, parse_date(&request.end_date)?)));
    let (start, end) = parsed.map_err(|e| ErrorResponse::from(&e))?;

    let resource_id = ResourceId(request.resource_id);
    let created = ledger
        .book(resource_id, identity, start, end)
        .await
        .map_err(|e| ErrorResponse::from(&e))?;

    Ok(BookingResponse {
        count: created.len(),
        message: format!("Booked {} day(s) for room {resource_id}.", created.len()),
        created: created.iter().map(ReservationView::from).collect(),
    })
}
