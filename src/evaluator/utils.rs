use crate::ast::Datum;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Check if two datums are equal. Numbers compare by value across integer and
/// decimal, and booleans equal the numbers 0 and 1.
pub fn datums_equal(a: &Datum, b: &Datum) -> bool {
    match (a, b) {
        (Datum::Bool(flag), other) | (other, Datum::Bool(flag)) if other.as_decimal().is_some() => {
            other.as_decimal() == Some(Decimal::from(u8::from(*flag)))
        }
        _ => match (a.as_decimal(), b.as_decimal()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
    }
}

const fn type_rank(datum: &Datum) -> u8 {
    match datum {
        Datum::Null => 0,
        Datum::Bool(_) => 1,
        Datum::Integer(_) | Datum::Decimal(_) => 2,
        Datum::String(_) => 3,
    }
}

/// Total order over optional datums: missing and null first, then booleans,
/// numbers and strings. Strings compare lexicographically.
pub fn compare_values(a: Option<&Datum>, b: Option<&Datum>) -> Ordering {
    let a = a.unwrap_or(&Datum::Null);
    let b = b.unwrap_or(&Datum::Null);

    match (a, b) {
        (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
        (Datum::String(a), Datum::String(b)) => a.cmp(b),
        _ => match (a.as_decimal(), b.as_decimal()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

/// True when a field is absent, null or an empty string.
pub fn is_blank(value: Option<&Datum>) -> bool {
    match value {
        None | Some(Datum::Null) => true,
        Some(Datum::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Formats a UTC instant with millisecond precision, e.g. `2024-05-01T09:30:00.125Z`.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Parses RFC 3339 timestamps, and `YYYY-MM-DD HH:MM:SS` as UTC.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed);
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(value, &format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
