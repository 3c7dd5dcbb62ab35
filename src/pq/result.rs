//! Columnar in-memory query result.
//!
//! A `PgResult` holds everything one command produced: the status, the field
//! descriptions, every cell of every row, the command tag and, for failed
//! commands, the server's error fields. Cells are stored as spans into one
//! shared data buffer, row-major; a span length of `-1` marks SQL NULL.

use crate::pq::error::{ErrorFields, PqError, PqResult};
use crate::protocol::backend::RowDescription;
use crate::protocol::types::{FormatCode, INVALID_OID, Oid};

/// Status of a completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecStatus {
    /// The query string was empty
    EmptyQuery,
    /// A command that returns no rows completed
    CommandOk,
    /// A command that returns rows completed
    TuplesOk,
    /// COPY TO STDOUT started
    CopyOut,
    /// COPY FROM STDIN started
    CopyIn,
    /// The server's response was not understood
    BadResponse,
    NonFatalError,
    FatalError,
}

impl ExecStatus {
    /// All statuses, in libpq's numeric order.
    pub const ALL: [ExecStatus; 8] = [
        ExecStatus::EmptyQuery,
        ExecStatus::CommandOk,
        ExecStatus::TuplesOk,
        ExecStatus::CopyOut,
        ExecStatus::CopyIn,
        ExecStatus::BadResponse,
        ExecStatus::NonFatalError,
        ExecStatus::FatalError,
    ];

    /// libpq's name for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            ExecStatus::EmptyQuery => "PGRES_EMPTY_QUERY",
            ExecStatus::CommandOk => "PGRES_COMMAND_OK",
            ExecStatus::TuplesOk => "PGRES_TUPLES_OK",
            ExecStatus::CopyOut => "PGRES_COPY_OUT",
            ExecStatus::CopyIn => "PGRES_COPY_IN",
            ExecStatus::BadResponse => "PGRES_BAD_RESPONSE",
            ExecStatus::NonFatalError => "PGRES_NONFATAL_ERROR",
            ExecStatus::FatalError => "PGRES_FATAL_ERROR",
        }
    }
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned description of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: FormatCode,
}

impl FieldInfo {
    /// A computed column (no table) of the given type.
    pub fn new(name: impl Into<String>, type_oid: Oid, format: FormatCode) -> Self {
        Self {
            name: name.into(),
            table_oid: INVALID_OID,
            column_id: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CellSpan {
    offset: u32,
    len: i32,
}

/// Result of one command.
#[derive(Debug, Clone)]
pub struct PgResult {
    status: ExecStatus,
    fields: Vec<FieldInfo>,
    data: Vec<u8>,
    cells: Vec<CellSpan>,
    ntuples: usize,
    cmd_status: String,
    error: Option<ErrorFields>,
    error_message: String,
}

impl PgResult {
    /// An empty result with the given status, like `PQmakeEmptyPGresult`.
    pub fn new(status: ExecStatus) -> Self {
        Self {
            status,
            fields: Vec::new(),
            data: Vec::new(),
            cells: Vec::new(),
            ntuples: 0,
            cmd_status: String::new(),
            error: None,
            error_message: String::new(),
        }
    }

    /// A failed result carrying the server's error fields.
    pub fn from_error(fields: ErrorFields) -> Self {
        let mut result = Self::new(ExecStatus::FatalError);
        result.set_error(fields);
        result
    }

    /// Set the column descriptions. Only valid before any row was added.
    pub fn set_fields(&mut self, fields: Vec<FieldInfo>) -> PqResult<()> {
        if self.ntuples > 0 {
            return Err(PqError::InvalidUsage(
                "cannot change fields of a result that holds rows".into(),
            ));
        }
        self.fields = fields;
        Ok(())
    }

    pub(crate) fn set_row_description(&mut self, desc: &RowDescription<'_>) -> PqResult<()> {
        let fields = desc
            .fields()
            .iter()
            .map(|f| FieldInfo {
                name: f.name.to_string(),
                table_oid: f.table_oid(),
                column_id: f.column_id(),
                type_oid: f.type_oid(),
                type_size: f.type_size(),
                type_modifier: f.type_modifier(),
                format: f.format(),
            })
            .collect();
        self.set_fields(fields)
    }

    /// Append one row. `values` must have one entry per field; `None` is NULL.
    pub fn push_row(&mut self, values: &[Option<&[u8]>]) -> PqResult<()> {
        if values.len() != self.fields.len() {
            return Err(PqError::Protocol(format!(
                "row has {} values but the result has {} fields",
                values.len(),
                self.fields.len()
            )));
        }

        for value in values {
            let span = match value {
                Some(bytes) => {
                    let offset = u32::try_from(self.data.len())
                        .map_err(|_too_large| PqError::Protocol("result exceeds 4 GiB".into()))?;
                    let len = i32::try_from(bytes.len())
                        .map_err(|_too_large| PqError::Protocol("cell exceeds 2 GiB".into()))?;
                    self.data.extend_from_slice(bytes);
                    CellSpan { offset, len }
                }
                None => CellSpan { offset: 0, len: -1 },
            };
            self.cells.push(span);
        }
        self.ntuples += 1;
        Ok(())
    }

    pub fn set_status(&mut self, status: ExecStatus) {
        self.status = status;
    }

    /// Set the command tag, e.g. `"INSERT 0 1"`.
    pub fn set_cmd_status(&mut self, tag: impl Into<String>) {
        self.cmd_status = tag.into();
    }

    /// Attach server error fields and mark the result failed.
    pub fn set_error(&mut self, fields: ErrorFields) {
        self.status = ExecStatus::FatalError;
        self.error_message = fields.to_message();
        self.error = Some(fields);
    }

    pub fn status(&self) -> ExecStatus {
        self.status
    }

    /// Number of rows.
    pub fn ntuples(&self) -> usize {
        self.ntuples
    }

    /// Number of columns.
    pub fn nfields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field(&self, column: usize) -> Option<&FieldInfo> {
        self.fields.get(column)
    }

    /// True if every column is in binary format (and there is at least one).
    pub fn binary_tuples(&self) -> bool {
        !self.fields.is_empty() && self.fields.iter().all(|f| f.format == FormatCode::Binary)
    }

    fn span(&self, row: usize, column: usize) -> Option<CellSpan> {
        if row >= self.ntuples || column >= self.fields.len() {
            return None;
        }
        self.cells.get(row * self.fields.len() + column).copied()
    }

    /// Cell bytes; `None` for NULL or out-of-range positions.
    pub fn get_value(&self, row: usize, column: usize) -> Option<&[u8]> {
        let span = self.span(row, column)?;
        let len = usize::try_from(span.len).ok()?;
        let start = span.offset as usize;
        self.data.get(start..start + len)
    }

    /// Cell length in bytes; 0 for NULL or out-of-range positions.
    pub fn get_length(&self, row: usize, column: usize) -> usize {
        self.span(row, column)
            .and_then(|s| usize::try_from(s.len).ok())
            .unwrap_or(0)
    }

    /// True for NULL; out-of-range positions report true as well.
    pub fn get_is_null(&self, row: usize, column: usize) -> bool {
        self.span(row, column).is_none_or(|s| s.len < 0)
    }

    /// Command tag, e.g. `"INSERT 0 1"`; empty when none was received.
    pub fn cmd_status(&self) -> &str {
        &self.cmd_status
    }

    /// Affected-row count as text, following libpq's `PQcmdTuples`.
    ///
    /// Empty for commands without a count (DDL, `BEGIN`, ...).
    pub fn cmd_tuples(&self) -> &str {
        cmd_tuples(&self.cmd_status)
    }

    /// OID of the inserted row for a single-row `INSERT` into a table with OIDs.
    pub fn oid_value(&self) -> Oid {
        let mut words = self.cmd_status.split(' ');
        match (words.next(), words.next()) {
            (Some("INSERT"), Some(oid)) => oid.parse().unwrap_or(INVALID_OID),
            _ => INVALID_OID,
        }
    }

    /// Formatted error text; empty for successful results.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn error_fields(&self) -> Option<&ErrorFields> {
        self.error.as_ref()
    }

    /// SQLSTATE of a failed result.
    pub fn sql_state(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.code.as_deref())
    }
}

/// Extract the affected-row count from a command tag.
fn cmd_tuples(tag: &str) -> &str {
    let count = if let Some(rest) = tag.strip_prefix("INSERT ") {
        // "INSERT oid count"
        rest.split_once(' ').map(|(_, count)| count)
    } else {
        match tag.split_once(' ') {
            Some((
                "DELETE" | "UPDATE" | "SELECT" | "MOVE" | "FETCH" | "COPY" | "MERGE",
                count,
            )) => Some(count),
            _ => None,
        }
    };

    match count {
        Some(count) if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) => count,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_result() -> PgResult {
        let mut result = PgResult::new(ExecStatus::TuplesOk);
        result
            .set_fields(vec![
                FieldInfo::new("id", 23, FormatCode::Text),
                FieldInfo::new("note", 25, FormatCode::Text),
            ])
            .unwrap();
        result.push_row(&[Some(&b"1"[..]), None]).unwrap();
        result.push_row(&[Some(&b"2"[..]), Some(&b""[..])]).unwrap();
        result.set_cmd_status("SELECT 2");
        result
    }

    #[test]
    fn cell_access() {
        let result = two_column_result();
        assert_eq!(result.ntuples(), 2);
        assert_eq!(result.nfields(), 2);
        assert_eq!(result.get_value(0, 0), Some(&b"1"[..]));
        assert!(result.get_is_null(0, 1));
        assert_eq!(result.get_value(0, 1), None);
        assert!(!result.get_is_null(1, 1));
        assert_eq!(result.get_value(1, 1), Some(&b""[..]));
        assert_eq!(result.get_length(1, 0), 1);
        assert!(result.get_is_null(5, 0));
        assert!(!result.binary_tuples());
    }

    #[test]
    fn row_width_must_match_fields() {
        let mut result = two_column_result();
        assert!(result.push_row(&[Some(&b"3"[..])]).is_err());
        assert!(result.set_fields(Vec::new()).is_err());
    }

    #[test]
    fn cmd_tuples_follows_tag() {
        assert_eq!(cmd_tuples("INSERT 0 1"), "1");
        assert_eq!(cmd_tuples("UPDATE 10"), "10");
        assert_eq!(cmd_tuples("SELECT 2"), "2");
        assert_eq!(cmd_tuples("COPY 3"), "3");
        assert_eq!(cmd_tuples("MERGE 4"), "4");
        assert_eq!(cmd_tuples("CREATE TABLE"), "");
        assert_eq!(cmd_tuples("BEGIN"), "");
        assert_eq!(cmd_tuples("INSERT 0"), "");
        assert_eq!(cmd_tuples("DELETE x"), "");
        assert_eq!(cmd_tuples(""), "");
    }

    #[test]
    fn oid_value_only_for_insert() {
        let mut result = PgResult::new(ExecStatus::CommandOk);
        result.set_cmd_status("INSERT 16384 1");
        assert_eq!(result.oid_value(), 16384);
        result.set_cmd_status("INSERT 0 3");
        assert_eq!(result.oid_value(), INVALID_OID);
        result.set_cmd_status("UPDATE 1");
        assert_eq!(result.oid_value(), INVALID_OID);
    }

    #[test]
    fn error_result_message() {
        let result = PgResult::from_error(ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("42P01".into()),
            message: Some("relation \"nope\" does not exist".into()),
            ..Default::default()
        });
        assert_eq!(result.status(), ExecStatus::FatalError);
        assert_eq!(result.sql_state(), Some("42P01"));
        assert_eq!(
            result.error_message(),
            "ERROR:  relation \"nope\" does not exist\n"
        );
    }

    #[test]
    fn status_names() {
        assert_eq!(ExecStatus::TuplesOk.to_string(), "PGRES_TUPLES_OK");
        assert_eq!(ExecStatus::ALL.len(), 8);
    }
}
