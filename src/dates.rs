use chrono::NaiveDate;

use crate::ledger::BookingError;

/// Wire format of a calendar date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Every calendar day from `start` through `end`, both included.
///
/// Empty when `start > end`; callers reject that case before expanding.
pub fn expand(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Number of days `expand(start, end)` yields.
pub fn span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end.signed_duration_since(start).num_days() + 1).max(0)
}

pub fn parse_date(input: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| BookingError::MalformedDate(input.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
