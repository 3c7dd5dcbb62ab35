//! `time` crate conversions: `Date`, `Time`, `PrimitiveDateTime` and
//! `OffsetDateTime`.
//!
//! Parameters go out as typed text so they do not depend on the server's
//! date/time storage.

use time::macros::{datetime, format_description};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use super::datetime::{
    PG_EPOCH_JULIAN_DAY, USECS_PER_DAY, binary_days, binary_micros, expect_type, invalid,
    offset_seconds, split_offset,
};
use super::{Column, FromCell, utf8};
use crate::error::Result;
use crate::params::{Param, ToParam};
use crate::protocol::types::oid;

const PG_EPOCH: PrimitiveDateTime = datetime!(2000-01-01 0:00);
const PG_EPOCH_UTC: OffsetDateTime = datetime!(2000-01-01 0:00 UTC);

fn parse_date(column: &Column, text: &str) -> Result<Date> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .map_err(|e| invalid(column, "date", e))
}

fn parse_time(column: &Column, text: &str) -> Result<Time> {
    Time::parse(text, format_description!("[hour]:[minute]:[second].[subsecond]"))
        .or_else(|_no_fraction| Time::parse(text, format_description!("[hour]:[minute]:[second]")))
        .map_err(|e| invalid(column, "time", e))
}

fn parse_timestamp(column: &Column, text: &str) -> Result<PrimitiveDateTime> {
    let (date, time) = text
        .split_once(' ')
        .ok_or_else(|| invalid(column, "timestamp", text))?;
    Ok(PrimitiveDateTime::new(
        parse_date(column, date)?,
        parse_time(column, time)?,
    ))
}

fn date_text(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn time_text(time: Time) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:06}",
        time.hour(),
        time.minute(),
        time.second(),
        time.microsecond()
    )
}

impl FromCell<'_> for Date {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::DATE], "Date")?;
        parse_date(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::DATE], "Date")?;
        let days = binary_days(column, bytes)?;
        days.checked_add(PG_EPOCH_JULIAN_DAY)
            .and_then(|julian| Date::from_julian_day(julian).ok())
            .ok_or_else(|| invalid(column, "date", format!("{} days from 2000-01-01", days)))
    }
}

impl ToParam for Date {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(oid::DATE, date_text(*self))
    }
}

impl FromCell<'_> for Time {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIME], "Time")?;
        parse_time(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIME], "Time")?;
        let micros = binary_micros(column, bytes)?;
        // 24:00:00 is a valid server time but not a valid `Time`
        if !(0..USECS_PER_DAY).contains(&micros) {
            return Err(invalid(column, "time", format!("{} microseconds", micros)));
        }
        Ok(Time::MIDNIGHT + Duration::microseconds(micros))
    }
}

impl ToParam for Time {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(oid::TIME, time_text(*self))
    }
}

impl FromCell<'_> for PrimitiveDateTime {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMP], "PrimitiveDateTime")?;
        parse_timestamp(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMP], "PrimitiveDateTime")?;
        let micros = binary_micros(column, bytes)?;
        PG_EPOCH
            .checked_add(Duration::microseconds(micros))
            .ok_or_else(|| invalid(column, "timestamp", "out of range"))
    }
}

impl ToParam for PrimitiveDateTime {
    fn to_param(&self) -> Param<'_> {
        let text = format!("{} {}", date_text(self.date()), time_text(self.time()));
        Param::typed_text(oid::TIMESTAMP, text)
    }
}

impl FromCell<'_> for OffsetDateTime {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMPTZ], "OffsetDateTime")?;
        let text = utf8(column, bytes)?;
        let (local, offset) = split_offset(text);
        let offset = offset
            .and_then(offset_seconds)
            .and_then(|seconds| UtcOffset::from_whole_seconds(seconds).ok())
            .ok_or_else(|| invalid(column, "timestamptz offset", text))?;
        Ok(parse_timestamp(column, local)?.assume_offset(offset))
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMPTZ], "OffsetDateTime")?;
        let micros = binary_micros(column, bytes)?;
        PG_EPOCH_UTC
            .checked_add(Duration::microseconds(micros))
            .ok_or_else(|| invalid(column, "timestamptz", "out of range"))
    }
}

impl ToParam for OffsetDateTime {
    fn to_param(&self) -> Param<'_> {
        let (hours, minutes, seconds) = self.offset().as_hms();
        let sign = if self.offset().is_negative() { '-' } else { '+' };
        let text = format!(
            "{} {}{}{:02}:{:02}:{:02}",
            date_text(self.date()),
            time_text(self.time()),
            sign,
            hours.unsigned_abs(),
            minutes.unsigned_abs(),
            seconds.unsigned_abs()
        );
        Param::typed_text(oid::TIMESTAMPTZ, text)
    }
}
