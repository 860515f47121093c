use chrono::NaiveDate;

use crate::dates;
use crate::limits::*;
use crate::model::*;

use super::BookingError;

pub(crate) fn validate_identity(identity: &IdentityId) -> Result<(), BookingError> {
    if identity.as_str().is_empty() {
        return Err(BookingError::LimitExceeded("empty identity"));
    }
    if identity.as_str().len() > MAX_IDENTITY_LEN {
        return Err(BookingError::LimitExceeded("identity too long"));
    }
    Ok(())
}

/// Validate an inclusive range and expand it to its days.
///
/// Any span is valid; one that could never fit on a single resource is
/// refused before its days are allocated.
pub(crate) fn checked_expand(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, BookingError> {
    if start > end {
        return Err(BookingError::InvalidRange { start, end });
    }
    if dates::span_days(start, end) > MAX_RESERVATIONS_PER_RESOURCE as i64 {
        return Err(BookingError::LimitExceeded("too many reservations on resource"));
    }
    Ok(dates::expand(start, end))
}

/// Fail with every requested date already held on the resource, by anyone.
pub(crate) fn check_no_conflict(rs: &ResourceState, dates: &[NaiveDate]) -> Result<(), BookingError> {
    let taken = rs.conflicts(dates);
    if taken.is_empty() {
        Ok(())
    } else {
        Err(BookingError::DateConflict(taken.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn inverted_range_rejected() {
        let err = checked_expand(day(2025, 6, 12), day(2025, 6, 10)).unwrap_err();
        assert_eq!(
            err,
            BookingError::InvalidRange { start: day(2025, 6, 12), end: day(2025, 6, 10) }
        );
    }

    #[test]
    fn multi_year_range_accepted() {
        let days = checked_expand(day(2024, 1, 1), day(2025, 12, 31)).unwrap();
        assert_eq!(days.len(), 731);
        assert_eq!(days[59], day(2024, 2, 29));
    }

    #[test]
    fn range_larger_than_resource_cap_rejected() {
        let start = day(1800, 1, 1);
        let end = start + chrono::Days::new(MAX_RESERVATIONS_PER_RESOURCE as u64);
        assert_eq!(
            checked_expand(start, end),
            Err(BookingError::LimitExceeded("too many reservations on resource"))
        );
    }

    #[test]
    fn identity_bounds() {
        assert!(validate_identity(&IdentityId::from("u1")).is_ok());
        assert!(validate_identity(&IdentityId::from("")).is_err());
        assert!(validate_identity(&IdentityId::new("x".repeat(MAX_IDENTITY_LEN + 1))).is_err());
    }

    #[test]
    fn conflict_lists_taken_dates_sorted() {
        let mut rs = ResourceState::new(ResourceId(1));
        rs.insert_all(&[
            Reservation::new(ResourceId(1), "u1".into(), day(2025, 6, 12)),
            Reservation::new(ResourceId(1), "u1".into(), day(2025, 6, 11)),
        ])
        .unwrap();
        let asked = dates::expand(day(2025, 6, 11), day(2025, 6, 13));
        assert_eq!(
            check_no_conflict(&rs, &asked),
            Err(BookingError::DateConflict(vec![day(2025, 6, 11), day(2025, 6, 12)]))
        );
        assert!(check_no_conflict(&rs, &[day(2025, 6, 13)]).is_ok());
    }
}
