//! `chrono` conversions: `NaiveDate`, `NaiveTime`, `NaiveDateTime` and
//! `DateTime<Utc>`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use super::datetime::{
    PG_EPOCH_UNIX_DAYS, PG_EPOCH_UNIX_USECS, USECS_PER_DAY, binary_days, binary_micros,
    expect_type, invalid, offset_seconds, split_offset,
};
use super::{Column, FromCell, utf8};
use crate::error::Result;
use crate::params::{Param, ToParam};
use crate::protocol::types::oid;

const SECS_PER_DAY: i64 = 86_400;

fn parse_date(column: &Column, text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| invalid(column, "date", e))
}

fn parse_timestamp(column: &Column, text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| invalid(column, "timestamp", e))
}

/// Microseconds since 2000-01-01 as a UTC instant.
fn from_pg_micros(column: &Column, micros: i64) -> Result<DateTime<Utc>> {
    micros
        .checked_add(PG_EPOCH_UNIX_USECS)
        .and_then(DateTime::from_timestamp_micros)
        .ok_or_else(|| invalid(column, "timestamp", "out of range"))
}

impl FromCell<'_> for NaiveDate {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::DATE], "NaiveDate")?;
        parse_date(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::DATE], "NaiveDate")?;
        let days = binary_days(column, bytes)?;
        (i64::from(days) + PG_EPOCH_UNIX_DAYS)
            .checked_mul(SECS_PER_DAY)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|midnight| midnight.date_naive())
            .ok_or_else(|| invalid(column, "date", format!("{} days from 2000-01-01", days)))
    }
}

impl ToParam for NaiveDate {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(oid::DATE, self.format("%Y-%m-%d").to_string())
    }
}

impl FromCell<'_> for NaiveTime {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIME], "NaiveTime")?;
        NaiveTime::parse_from_str(utf8(column, bytes)?, "%H:%M:%S%.f")
            .map_err(|e| invalid(column, "time", e))
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIME], "NaiveTime")?;
        let micros = binary_micros(column, bytes)?;
        if !(0..USECS_PER_DAY).contains(&micros) {
            return Err(invalid(column, "time", format!("{} microseconds", micros)));
        }
        let secs = u32::try_from(micros.div_euclid(1_000_000));
        let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000);
        secs.ok()
            .zip(nanos.ok())
            .and_then(|(secs, nanos)| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
            .ok_or_else(|| invalid(column, "time", format!("{} microseconds", micros)))
    }
}

impl ToParam for NaiveTime {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(oid::TIME, self.format("%H:%M:%S%.6f").to_string())
    }
}

impl FromCell<'_> for NaiveDateTime {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMP], "NaiveDateTime")?;
        parse_timestamp(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMP], "NaiveDateTime")?;
        from_pg_micros(column, binary_micros(column, bytes)?).map(|utc| utc.naive_utc())
    }
}

impl ToParam for NaiveDateTime {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(
            oid::TIMESTAMP,
            self.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        )
    }
}

impl FromCell<'_> for DateTime<Utc> {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMPTZ], "DateTime<Utc>")?;
        let text = utf8(column, bytes)?;
        let (local, offset) = split_offset(text);
        let offset = offset
            .and_then(offset_seconds)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| invalid(column, "timestamptz offset", text))?;
        parse_timestamp(column, local)?
            .and_local_timezone(offset)
            .single()
            .map(|instant| instant.with_timezone(&Utc))
            .ok_or_else(|| invalid(column, "timestamptz", text))
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::TIMESTAMPTZ], "DateTime<Utc>")?;
        from_pg_micros(column, binary_micros(column, bytes)?)
    }
}

impl ToParam for DateTime<Utc> {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(
            oid::TIMESTAMPTZ,
            self.format("%Y-%m-%d %H:%M:%S%.6f+00").to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::FieldInfo;
    use crate::protocol::types::{FormatCode, Oid};
    use std::borrow::Cow;

    fn column(type_oid: Oid, format: FormatCode) -> Column {
        Column::from_field(&FieldInfo::new("t", type_oid, format))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates() {
        let text = column(oid::DATE, FormatCode::Text);
        assert_eq!(NaiveDate::from_text(&text, b"2024-01-15").unwrap(), date(2024, 1, 15));
        let binary = column(oid::DATE, FormatCode::Binary);
        assert_eq!(
            NaiveDate::from_binary(&binary, &8780i32.to_be_bytes()).unwrap(),
            date(2024, 1, 15)
        );
        assert_eq!(
            NaiveDate::from_binary(&binary, &(-36_524i32).to_be_bytes()).unwrap(),
            date(1900, 1, 1)
        );
    }

    #[test]
    fn times() {
        let text = column(oid::TIME, FormatCode::Text);
        let expected = NaiveTime::from_hms_micro_opt(10, 30, 45, 123_456).unwrap();
        assert_eq!(NaiveTime::from_text(&text, b"10:30:45.123456").unwrap(), expected);
        let binary = column(oid::TIME, FormatCode::Binary);
        let micros: i64 = (10 * 3600 + 30 * 60 + 45) * 1_000_000 + 123_456;
        assert_eq!(
            NaiveTime::from_binary(&binary, &micros.to_be_bytes()).unwrap(),
            expected
        );
        assert!(NaiveTime::from_binary(&binary, &(-1i64).to_be_bytes()).is_err());
    }

    #[test]
    fn timestamps_before_and_after_the_epoch() {
        let binary = column(oid::TIMESTAMP, FormatCode::Binary);
        let at = |micros: i64| NaiveDateTime::from_binary(&binary, &micros.to_be_bytes()).unwrap();
        assert_eq!(at(0), date(2000, 1, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(
            at(-500_000),
            date(1999, 12, 31).and_hms_micro_opt(23, 59, 59, 500_000).unwrap()
        );

        let text = column(oid::TIMESTAMP, FormatCode::Text);
        assert_eq!(
            NaiveDateTime::from_text(&text, b"2024-01-15 10:30:45").unwrap(),
            date(2024, 1, 15).and_hms_opt(10, 30, 45).unwrap()
        );
    }

    #[test]
    fn timestamptz_is_normalized_to_utc() {
        let text = column(oid::TIMESTAMPTZ, FormatCode::Text);
        let value = DateTime::<Utc>::from_text(&text, b"2024-01-15 10:30:45.5+05:30").unwrap();
        assert_eq!(
            value.naive_utc(),
            date(2024, 1, 15).and_hms_micro_opt(5, 0, 45, 500_000).unwrap()
        );

        let binary = column(oid::TIMESTAMPTZ, FormatCode::Binary);
        let value = DateTime::<Utc>::from_binary(&binary, &0i64.to_be_bytes()).unwrap();
        assert_eq!(value.timestamp(), 946_684_800);
    }

    #[test]
    fn parameters_are_typed_text() {
        let param = date(2024, 1, 15).and_hms_opt(10, 30, 45).unwrap().and_utc();
        match param.to_param() {
            Param::Typed {
                oid: oid::TIMESTAMPTZ,
                format: FormatCode::Text,
                value: Some(Cow::Owned(text)),
            } => assert_eq!(text, b"2024-01-15 10:30:45.000000+00"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
