//! `uuid::Uuid` for `uuid` columns.

use uuid::Uuid;

use super::datetime::{expect_type, invalid};
use super::{Column, FromCell, utf8};
use crate::error::Result;
use crate::params::{Param, ToParam};
use crate::protocol::types::oid;

impl FromCell<'_> for Uuid {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::UUID], "Uuid")?;
        Uuid::parse_str(utf8(column, bytes)?).map_err(|e| invalid(column, "uuid", e))
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        expect_type(column, &[oid::UUID], "Uuid")?;
        Uuid::from_slice(bytes).map_err(|e| invalid(column, "uuid", e))
    }
}

impl ToParam for Uuid {
    fn to_param(&self) -> Param<'_> {
        Param::binary(oid::UUID, self.as_bytes().to_vec())
    }
}
