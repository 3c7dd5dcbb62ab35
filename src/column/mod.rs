//! Column descriptors, cells and rows.
//!
//! Cells convert to Rust values through [`FromCell`]. Besides the built-in
//! scalars, [`Interval`] and binary `numeric` are always available; the
//! `with-time`, `with-chrono`, `with-rust-decimal` and `with-uuid` features add
//! conversions for those crates' types.

mod datetime;
mod interval;
mod numeric;

#[cfg(feature = "with-chrono")]
mod chrono;
#[cfg(feature = "with-rust-decimal")]
mod decimal;
#[cfg(feature = "with-time")]
mod time;
#[cfg(feature = "with-uuid")]
mod uuid;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pq::FieldInfo;
use crate::protocol::types::{FormatCode, Oid, oid};

pub use interval::Interval;

/// Metadata of one result column, shared by every cell of that column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    type_oid: Oid,
    type_modifier: i32,
    format: FormatCode,
    table_oid: Oid,
    column_id: i16,
    type_size: i16,
    integer_datetimes: bool,
}

impl Column {
    pub(crate) fn from_field(field: &FieldInfo) -> Self {
        Self {
            name: field.name.clone(),
            type_oid: field.type_oid,
            type_modifier: field.type_modifier,
            format: field.format,
            table_oid: field.table_oid,
            column_id: field.column_id,
            type_size: field.type_size,
            integer_datetimes: true,
        }
    }

    pub(crate) fn with_integer_datetimes(mut self, integer_datetimes: bool) -> Self {
        self.integer_datetimes = integer_datetimes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// Type modifier, e.g. the declared length of `varchar(n)`; -1 when none.
    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    pub fn format(&self) -> FormatCode {
        self.format
    }

    pub fn is_binary(&self) -> bool {
        self.format == FormatCode::Binary
    }

    /// OID of the table the column comes from, 0 for computed columns.
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// Attribute number within [`table_oid`](Self::table_oid), 0 for computed columns.
    pub fn column_id(&self) -> i16 {
        self.column_id
    }

    /// Size of the type in bytes; negative for variable-length types.
    pub fn type_size(&self) -> i16 {
        self.type_size
    }

    /// Whether binary date/time cells hold 64-bit integer microseconds
    /// rather than float seconds. Follows the server's `integer_datetimes`.
    pub fn integer_datetimes(&self) -> bool {
        self.integer_datetimes
    }
}

/// One decoded value of a row.
///
/// Text cells hold the server's text; text cells of byte-string columns are
/// already unescaped into raw bytes. Binary cells hold the wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    column: Arc<Column>,
    value: Option<Vec<u8>>,
}

impl Cell {
    pub(crate) fn new(column: Arc<Column>, value: Option<Vec<u8>>) -> Self {
        Self { column, value }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.value
    }

    /// Value as UTF-8 text; `None` for NULL.
    pub fn as_str(&self) -> Result<Option<&str>> {
        self.get()
    }

    /// Convert the value, see [`FromCell`].
    pub fn get<'a, T: FromCell<'a>>(&'a self) -> Result<T> {
        match &self.value {
            None => T::from_null(&self.column),
            Some(bytes) if self.column.is_binary() => T::from_binary(&self.column, bytes),
            Some(bytes) => T::from_text(&self.column, bytes),
        }
    }
}

/// A row of cells, aligned with the result's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub(crate) fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// First cell whose column has the given name.
    pub fn cell_named(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column.name == name)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Convert the cell at `index`.
    pub fn get<'a, T: FromCell<'a>>(&'a self, index: usize) -> Result<T> {
        self.cells
            .get(index)
            .ok_or_else(|| {
                Error::Interface(format!(
                    "column index {} out of range, the row has {}",
                    index,
                    self.cells.len()
                ))
            })?
            .get()
    }
}

impl IntoIterator for Row {
    type Item = Cell;
    type IntoIter = std::vec::IntoIter<Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Conversion from a cell value.
///
/// Text cells are parsed from their text form. Binary cells are accepted for
/// the types whose wire layout the conversion knows.
pub trait FromCell<'a>: Sized {
    /// Called for SQL NULL. Fails unless the target can represent NULL.
    fn from_null(column: &Column) -> Result<Self> {
        Err(Error::Type(format!(
            "column \"{}\" is NULL, use Option<T>",
            column.name()
        )))
    }

    fn from_text(column: &Column, bytes: &'a [u8]) -> Result<Self>;

    fn from_binary(column: &Column, bytes: &'a [u8]) -> Result<Self>;
}

pub(crate) fn mismatch(column: &Column, target: &str) -> Error {
    Error::Type(format!(
        "cannot convert column \"{}\" of type {} to {}",
        column.name(),
        column.type_oid(),
        target
    ))
}

pub(crate) fn utf8<'a>(column: &Column, bytes: &'a [u8]) -> Result<&'a str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| {
        Error::Type(format!(
            "column \"{}\" is not valid UTF-8: {}",
            column.name(),
            e
        ))
    })
}

impl<'a, T: FromCell<'a>> FromCell<'a> for Option<T> {
    fn from_null(_column: &Column) -> Result<Self> {
        Ok(None)
    }

    fn from_text(column: &Column, bytes: &'a [u8]) -> Result<Self> {
        T::from_text(column, bytes).map(Some)
    }

    fn from_binary(column: &Column, bytes: &'a [u8]) -> Result<Self> {
        T::from_binary(column, bytes).map(Some)
    }
}

impl<'a> FromCell<'a> for &'a str {
    fn from_text(column: &Column, bytes: &'a [u8]) -> Result<Self> {
        utf8(column, bytes)
    }

    fn from_binary(column: &Column, bytes: &'a [u8]) -> Result<Self> {
        if !matches!(
            column.type_oid(),
            oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::UNKNOWN | oid::JSON
        ) {
            return Err(mismatch(column, "str"));
        }
        utf8(column, bytes)
    }
}

impl FromCell<'_> for String {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        <&str>::from_text(column, bytes).map(str::to_owned)
    }

    /// Binary `numeric` cells are rendered like the server's text output.
    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        if column.type_oid() == oid::NUMERIC {
            return numeric::numeric_text(column, bytes);
        }
        <&str>::from_binary(column, bytes).map(str::to_owned)
    }
}

impl<'a> FromCell<'a> for &'a [u8] {
    fn from_text(_column: &Column, bytes: &'a [u8]) -> Result<Self> {
        Ok(bytes)
    }

    fn from_binary(_column: &Column, bytes: &'a [u8]) -> Result<Self> {
        Ok(bytes)
    }
}

impl FromCell<'_> for Vec<u8> {
    fn from_text(_column: &Column, bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }

    fn from_binary(_column: &Column, bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl FromCell<'_> for bool {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        match bytes {
            b"t" | b"true" => Ok(true),
            b"f" | b"false" => Ok(false),
            _ => Err(mismatch(column, "bool")),
        }
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        match (column.type_oid(), bytes) {
            (oid::BOOL, [b]) => Ok(*b != 0),
            _ => Err(mismatch(column, "bool")),
        }
    }
}

/// Binary integer of any width the server uses, widened to i64.
fn binary_integer(column: &Column, bytes: &[u8]) -> Option<i64> {
    match (column.type_oid(), bytes.len()) {
        (oid::INT2, 2) => bytes.try_into().ok().map(|b| i64::from(i16::from_be_bytes(b))),
        (oid::INT4, 4) => bytes.try_into().ok().map(|b| i64::from(i32::from_be_bytes(b))),
        (oid::OID, 4) => bytes.try_into().ok().map(|b| i64::from(u32::from_be_bytes(b))),
        (oid::INT8, 8) => bytes.try_into().ok().map(i64::from_be_bytes),
        _ => None,
    }
}

macro_rules! impl_from_cell_integer {
    ($($t:ty),+) => {
        $(
            impl FromCell<'_> for $t {
                fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
                    utf8(column, bytes)?
                        .parse()
                        .map_err(|e| Error::Type(format!(
                            "column \"{}\": invalid {}: {}",
                            column.name(),
                            stringify!($t),
                            e
                        )))
                }

                fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
                    let wide = binary_integer(column, bytes)
                        .ok_or_else(|| mismatch(column, stringify!($t)))?;
                    <$t>::try_from(wide).map_err(|_out_of_range| Error::Type(format!(
                        "column \"{}\": {} does not fit {}",
                        column.name(),
                        wide,
                        stringify!($t)
                    )))
                }
            }
        )+
    };
}

impl_from_cell_integer!(i16, i32, i64, u32);

fn parse_float(column: &Column, text: &str) -> Result<f64> {
    match text {
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        text => text.parse().map_err(|e| {
            Error::Type(format!("column \"{}\": invalid float: {}", column.name(), e))
        }),
    }
}

impl FromCell<'_> for f64 {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        parse_float(column, utf8(column, bytes)?)
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        if column.type_oid() == oid::NUMERIC {
            return parse_float(column, &numeric::numeric_text(column, bytes)?);
        }
        match column.type_oid() {
            oid::FLOAT8 => bytes.try_into().ok().map(f64::from_be_bytes),
            oid::FLOAT4 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(f32::from_be_bytes(b))),
            _ => None,
        }
        .ok_or_else(|| mismatch(column, "f64"))
    }
}

impl FromCell<'_> for f32 {
    fn from_text(column: &Column, bytes: &[u8]) -> Result<Self> {
        match utf8(column, bytes)? {
            "Infinity" => Ok(f32::INFINITY),
            "-Infinity" => Ok(f32::NEG_INFINITY),
            text => text.parse().map_err(|e| {
                Error::Type(format!("column \"{}\": invalid float: {}", column.name(), e))
            }),
        }
    }

    fn from_binary(column: &Column, bytes: &[u8]) -> Result<Self> {
        match column.type_oid() {
            oid::FLOAT4 => bytes.try_into().ok().map(f32::from_be_bytes),
            _ => None,
        }
        .ok_or_else(|| mismatch(column, "f32"))
    }
}
