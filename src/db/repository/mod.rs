//! Repository layer: entity-scoped database operations.
//!
//! Functions take a plain `&Connection`, so callers compose them inside a
//! `rusqlite::Transaction` (which derefs to `Connection`) when an operation
//! must be atomic.

mod dashboard;
mod referral;
mod user;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::DatabaseError;

pub use dashboard::*;
pub use referral::*;
pub use user::*;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_datetime(field: &str, raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|_| invalid(field, raw))
}

pub(crate) fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, DatabaseError> {
    raw.parse::<NaiveDate>().map_err(|_| invalid(field, raw))
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|_| invalid(field, raw))
}

pub(crate) fn parse_optional_uuid(
    field: &str,
    raw: Option<String>,
) -> Result<Option<Uuid>, DatabaseError> {
    raw.map(|s| parse_uuid(field, &s)).transpose()
}

fn invalid(field: &str, raw: &str) -> DatabaseError {
    DatabaseError::InvalidValue {
        field: field.into(),
        value: raw.into(),
    }
}

/// Current wall-clock time at the precision we persist.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_round_trips_through_text() {
        let ts = NaiveDateTime::parse_from_str("2024-03-01 09:30:15.250", DATETIME_FORMAT).unwrap();
        let text = format_datetime(&ts);
        assert_eq!(parse_datetime("created_at", &text).unwrap(), ts);
    }

    #[test]
    fn whole_second_datetime_parses() {
        assert!(parse_datetime("created_at", "2024-03-01 09:30:15").is_ok());
    }

    #[test]
    fn invalid_values_name_the_field() {
        match parse_uuid("posted_by", "nope") {
            Err(DatabaseError::InvalidValue { field, value }) => {
                assert_eq!(field, "posted_by");
                assert_eq!(value, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse_date("dob", "31/12/1990").is_err());
    }
}
