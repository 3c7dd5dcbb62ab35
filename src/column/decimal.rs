//! `rust_decimal::Decimal` for `numeric` columns.
//!
//! Binary cells are rendered to text first, so both formats go through the
//! same exact parse. `NaN` and the infinities have no `Decimal` form.

use rust_decimal::Decimal;

use super::datetime::{expect_type, invalid};
use super::numeric::numeric_text;
use super::{Column, FromCell, utf8};
use crate::error::Result;
use crate::params::{Param, ToParam};
use crate::protocol::types::oid;

fn parse(column: &Column, text: &str) -> Result<Decimal> {
    Decimal::from_str_exact(text).map_err(|e| invalid(column, "decimal", format!("{}: {}", text, e)))
}

impl FromCell<'_> for Decimal {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::NUMERIC], "Decimal")?;
        parse(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::NUMERIC], "Decimal")?;
        parse(column, &numeric_text(column, bytes)?)
    }
}

/// Sent as text, which keeps every digit.
impl ToParam for Decimal {
    fn to_param(&self) -> Param<'_> {
        Param::typed_text(oid::NUMERIC, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::FieldInfo;
    use crate::protocol::types::FormatCode;
    use std::str::FromStr;

    fn column(format: FormatCode) -> Column {
        Column::from_field(&FieldInfo::new("n", oid::NUMERIC, format))
    }

    #[test]
    fn text_cells() {
        let text = column(FormatCode::Text);
        assert_eq!(
            Decimal::from_text(&text, b"-999.999").unwrap(),
            Decimal::from_str("-999.999").unwrap()
        );
        assert_eq!(Decimal::from_text(&text, b"0").unwrap(), Decimal::ZERO);
        assert!(Decimal::from_text(&text, b"NaN").is_err());
    }

    #[test]
    fn binary_cell_keeps_its_scale() {
        // 123.4500: weight 0, dscale 4, digits [123, 4500]
        let mut bytes = Vec::new();
        for word in [2u16, 0, 0x0000, 4, 123, 4500] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        let value = Decimal::from_binary(&column(FormatCode::Binary), &bytes).unwrap();
        assert_eq!(value, Decimal::from_str("123.45").unwrap());
        assert_eq!(value.scale(), 4);
    }

    #[test]
    fn binary_nan_is_refused() {
        let mut bytes = Vec::new();
        for word in [0u16, 0, 0xC000, 0] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        assert!(Decimal::from_binary(&column(FormatCode::Binary), &bytes).is_err());
    }

    #[test]
    fn parameter_is_numeric_text() {
        let value = Decimal::from_str("-12345.6789").unwrap();
        assert_eq!(
            value.to_param(),
            Param::Typed {
                oid: oid::NUMERIC,
                format: FormatCode::Text,
                value: Some(b"-12345.6789".to_vec().into()),
            }
        );
    }
}
