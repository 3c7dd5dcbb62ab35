//! The `interval` type.

use std::fmt;

use zerocopy::byteorder::big_endian::I32 as I32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use super::datetime::{expect_type, float_seconds_to_micros, invalid};
use super::{Column, FromCell, utf8};
use crate::error::Result;
use crate::params::{Param, ToParam};
use crate::protocol::types::oid;

const USECS_PER_HOUR: i64 = 3_600_000_000;
const USECS_PER_MINUTE: i64 = 60_000_000;
const USECS_PER_SECOND: i64 = 1_000_000;

/// A PostgreSQL `interval`.
///
/// Months, days and the time part are kept apart, as the server does: a
/// month has no fixed number of days and a day has no fixed number of
/// microseconds across a DST change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

/// Binary layout: the time part, then days, then months.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct IntervalWire {
    /// int64 microseconds, or float8 seconds without `integer_datetimes`
    time: [u8; 8],
    days: I32BE,
    months: I32BE,
}

impl Interval {
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }
}

/// `[+-]HH:MM:SS[.ffffff]` as microseconds. Hours may exceed 24.
fn parse_clock(token: &str) -> Option<i64> {
    let (negative, clock) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let mut parts = clock.splitn(3, ':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds = parts.next()?;
    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: i64 = whole.parse().ok()?;
    if fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<6}", fraction).parse().ok()?
    };

    let total = hours
        .checked_mul(USECS_PER_HOUR)?
        .checked_add(minutes.checked_mul(USECS_PER_MINUTE)?)?
        .checked_add(whole.checked_mul(USECS_PER_SECOND)?)?
        .checked_add(fraction)?;
    Some(if negative { -total } else { total })
}

/// Parse the server's default `IntervalStyle` output, e.g.
/// `1 year 2 mons -3 days +04:05:06.5`.
fn parse_text(column: &Column, text: &str) -> Result<Interval> {
    let bad = || invalid(column, "interval", text);
    let mut interval = Interval::default();
    let mut tokens = text.split_ascii_whitespace();
    while let Some(token) = tokens.next() {
        if token.contains(':') {
            interval.microseconds = parse_clock(token).ok_or_else(bad)?;
            continue;
        }
        let amount: i32 = token.parse().map_err(|_not_a_number| bad())?;
        let unit = tokens.next().ok_or_else(bad)?;
        let (field, amount) = match unit.trim_end_matches('s') {
            "year" => (&mut interval.months, amount.checked_mul(12).ok_or_else(bad)?),
            "mon" => (&mut interval.months, amount),
            "day" => (&mut interval.days, amount),
            _ => return Err(bad()),
        };
        *field = field.checked_add(amount).ok_or_else(bad)?;
    }
    Ok(interval)
}

impl FromCell<'_> for Interval {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::INTERVAL], "Interval")?;
        parse_text(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::INTERVAL], "Interval")?;
        let wire = IntervalWire::read_from_bytes(bytes).map_err(|_wrong_size| {
            invalid(column, "interval", format!("{} bytes, expected 16", bytes.len()))
        })?;
        let microseconds = if column.integer_datetimes() {
            i64::from_be_bytes(wire.time)
        } else {
            float_seconds_to_micros(column, f64::from_be_bytes(wire.time))?
        };
        Ok(Self::new(wire.months.get(), wire.days.get(), microseconds))
    }
}

/// Written in the form the server reads back, e.g. `14 mons 3 days -01:02:03.5`.
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months != 0 {
            write!(f, "{} mons ", self.months)?;
        }
        if self.days != 0 {
            write!(f, "{} days ", self.days)?;
        }
        let sign = if self.microseconds < 0 { "-" } else { "" };
        let total = self.microseconds.unsigned_abs();
        let hours = total.div_euclid(USECS_PER_HOUR.unsigned_abs());
        let minutes = total
            .rem_euclid(USECS_PER_HOUR.unsigned_abs())
            .div_euclid(USECS_PER_MINUTE.unsigned_abs());
        let seconds = total
            .rem_euclid(USECS_PER_MINUTE.unsigned_abs())
            .div_euclid(USECS_PER_SECOND.unsigned_abs());
        let fraction = total.rem_euclid(USECS_PER_SECOND.unsigned_abs());
        write!(f, "{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)?;
        if fraction != 0 {
            write!(f, ".{:06}", fraction)?;
        }
        Ok(())
    }
}

impl ToParam for Interval {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(oid::INTERVAL, self.to_string())
    }
}
