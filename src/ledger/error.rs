use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    InvalidRange { start: NaiveDate, end: NaiveDate },
    MalformedDate(String),
    /// Dates already reserved on the resource, sorted ascending.
    DateConflict(Vec<NaiveDate>),
    StorageUnavailable(String),
    NotFound(Ulid),
    LimitExceeded(&'static str),
}

impl BookingError {
    /// Bad caller input about dates: inverted range or unparseable date.
    pub fn is_invalid_range(&self) -> bool {
        matches!(self, BookingError::InvalidRange { .. } | BookingError::MalformedDate(_))
    }

    /// Only infrastructure failures are worth retrying; nothing was committed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StorageUnavailable(_))
    }

    /// Short stable name of the violated rule.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidRange { .. } | BookingError::MalformedDate(_) => "invalid_range",
            BookingError::DateConflict(_) => "date_conflict",
            BookingError::StorageUnavailable(_) => "storage_unavailable",
            BookingError::NotFound(_) => "not_found",
            BookingError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidRange { start, end } => {
                write!(f, "start date {start} is after end date {end}")
            }
            BookingError::MalformedDate(input) => {
                write!(f, "malformed date {input:?}: expected YYYY-MM-DD")
            }
            BookingError::DateConflict(dates) => {
                let list: Vec<String> = dates.iter().map(|d| d.to_string()).collect();
                write!(f, "dates already booked: {}", list.join(", "))
            }
            BookingError::StorageUnavailable(e) => write!(f, "storage unavailable: {e}"),
            BookingError::NotFound(id) => write!(f, "reservation not found: {id}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}
