//! Error and notice response messages.

use crate::pq::error::{ErrorFields, PqError, PqResult};
use crate::protocol::codec::read_cstr;

/// Error field type codes from PostgreSQL protocol.
pub mod field_type {
    pub const SEVERITY: u8 = b'S';
    /// Non-localized severity (PostgreSQL 9.6+)
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_POSITION: u8 = b'p';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// Parse error/notice fields from payload.
fn parse_fields(payload: &[u8]) -> PqResult<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut data = payload;

    while let Some((&field, rest)) = data.split_first() {
        if field == 0 {
            break;
        }
        let (value, rest) = read_cstr(rest)?;
        data = rest;

        let value_string = || Some(value.to_string());
        match field {
            field_type::SEVERITY => fields.severity = value_string(),
            field_type::SEVERITY_NON_LOCALIZED => fields.severity_non_localized = value_string(),
            field_type::CODE => fields.code = value_string(),
            field_type::MESSAGE => fields.message = value_string(),
            field_type::DETAIL => fields.detail = value_string(),
            field_type::HINT => fields.hint = value_string(),
            field_type::POSITION => fields.position = value.parse().ok(),
            field_type::INTERNAL_POSITION => fields.internal_position = value.parse().ok(),
            field_type::INTERNAL_QUERY => fields.internal_query = value_string(),
            field_type::WHERE => fields.where_ = value_string(),
            field_type::SCHEMA => fields.schema = value_string(),
            field_type::TABLE => fields.table = value_string(),
            field_type::COLUMN => fields.column = value_string(),
            field_type::DATA_TYPE => fields.data_type = value_string(),
            field_type::CONSTRAINT => fields.constraint = value_string(),
            field_type::FILE => fields.file = value_string(),
            field_type::LINE => fields.line = value.parse().ok(),
            field_type::ROUTINE => fields.routine = value_string(),
            _ => {
                tracing::debug!("unknown error field type: {}", field as char);
            }
        }
    }

    Ok(fields)
}

/// ErrorResponse message.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub fields: ErrorFields,
}

impl ErrorResponse {
    /// Parse an ErrorResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> PqResult<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }

    pub fn into_error(self) -> PqError {
        PqError::Server(self.fields)
    }

    /// SQLSTATE code.
    pub fn code(&self) -> Option<&str> {
        self.fields.code.as_deref()
    }
}

/// NoticeResponse message - non-fatal warning/info from server.
#[derive(Debug, Clone)]
pub struct NoticeResponse {
    pub fields: ErrorFields,
}

impl NoticeResponse {
    /// Parse a NoticeResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> PqResult<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }

    /// Notice text in the form it is stored on the connection.
    pub fn to_message(&self) -> String {
        self.fields.to_message()
    }
}
