//! Shared pieces of the date/time conversions.
//!
//! Binary `date` is a 32-bit day count from 2000-01-01. Binary `time`,
//! `timestamp` and `timestamptz` are 64-bit microseconds (from midnight or
//! from 2000-01-01 00:00 UTC), or float seconds on servers built without
//! `integer_datetimes`.

#![cfg_attr(
    not(any(feature = "with-time", feature = "with-chrono")),
    expect(dead_code, reason = "only the interval conversion needs part of it")
)]

use super::Column;
use crate::error::{Error, Result};
use crate::protocol::types::Oid;

pub(crate) const USECS_PER_DAY: i64 = 86_400_000_000;

/// 2000-01-01 as a Julian day number.
#[cfg(feature = "with-time")]
pub(crate) const PG_EPOCH_JULIAN_DAY: i32 = 2_451_545;

/// Microseconds from 1970-01-01 to 2000-01-01.
#[cfg(feature = "with-chrono")]
pub(crate) const PG_EPOCH_UNIX_USECS: i64 = 946_684_800_000_000;

/// Days from 1970-01-01 to 2000-01-01.
#[cfg(feature = "with-chrono")]
pub(crate) const PG_EPOCH_UNIX_DAYS: i64 = 10_957;

pub(crate) fn expect_type(column: &Column, accepted: &[Oid], target: &str) -> Result<()> {
    if accepted.contains(&column.type_oid()) {
        Ok(())
    } else {
        Err(super::mismatch(column, target))
    }
}

pub(crate) fn invalid(column: &Column, what: &str, detail: impl std::fmt::Display) -> Error {
    Error::Type(format!(
        "column \"{}\": invalid {}: {}",
        column.name(),
        what,
        detail
    ))
}

pub(crate) fn fixed<const N: usize>(column: &Column, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_wrong_length| {
        invalid(
            column,
            "date/time value",
            format!("{} bytes, expected {}", bytes.len(), N),
        )
    })
}

/// Day count of a binary `date` cell. Infinite dates are rejected.
pub(crate) fn binary_days(column: &Column, bytes: &[u8]) -> Result<i32> {
    match i32::from_be_bytes(fixed(column, bytes)?) {
        i32::MAX | i32::MIN => Err(invalid(column, "date", "infinity")),
        days => Ok(days),
    }
}

/// Microsecond count of a binary `time`, `timestamp` or `timestamptz` cell,
/// whichever storage the server uses. Infinite timestamps are rejected.
pub(crate) fn binary_micros(column: &Column, bytes: &[u8]) -> Result<i64> {
    let raw: [u8; 8] = fixed(column, bytes)?;
    let micros = if column.integer_datetimes() {
        i64::from_be_bytes(raw)
    } else {
        float_seconds_to_micros(column, f64::from_be_bytes(raw))?
    };
    match micros {
        i64::MAX | i64::MIN => Err(invalid(column, "timestamp", "infinity")),
        micros => Ok(micros),
    }
}

/// Float seconds of the old date/time storage, rounded to microseconds.
pub(crate) fn float_seconds_to_micros(column: &Column, seconds: f64) -> Result<i64> {
    let micros = (seconds * 1e6).round();
    // i64::MAX as f64 rounds up to 2^63, so `<` keeps the cast in range
    if micros.is_finite() && micros >= i64::MIN as f64 && micros < i64::MAX as f64 {
        Ok(micros as i64)
    } else {
        Err(invalid(column, "timestamp", "infinity"))
    }
}

/// `text` with a trailing UTC offset (`+05`, `-03:30`) split off. The date
/// part's own dashes are left alone.
pub(crate) fn split_offset(text: &str) -> (&str, Option<&str>) {
    match text.rfind(['+', '-']) {
        Some(at) if at > 10 => (text.get(..at).unwrap_or(text), text.get(at..)),
        _ => (text, None),
    }
}

/// Seconds east of UTC of an offset the server prints: `+05`, `-03:30` or
/// `+05:53:28`.
pub(crate) fn offset_seconds(text: &str) -> Option<i32> {
    let (sign, rest) = text.split_at_checked(1)?;
    let mut parts = rest.split(':').map(str::parse::<i32>);
    let hours = parts.next()?.ok()?;
    let minutes = parts.next().transpose().ok()?.unwrap_or(0);
    let seconds = parts.next().transpose().ok()?.unwrap_or(0);
    if parts.next().is_some()
        || !(0..16).contains(&hours)
        || !(0..60).contains(&minutes)
        || !(0..60).contains(&seconds)
    {
        return None;
    }
    let total = hours * 3600 + minutes * 60 + seconds;
    match sign {
        "+" => Some(total),
        "-" => Some(-total),
        _ => None,
    }
}
