//! Classified results and lazy row iteration.

use std::iter::FusedIterator;
use std::sync::{Arc, Weak};

use crate::column::{Cell, Column, Row};
use crate::connection::{SessionInfo, describe_session};
use crate::error::{Error, Result, classify_failure};
use crate::params::TypeMap;
use crate::pq::{ExecStatus, PgResult, unescape_bytea};
use crate::protocol::types::{INVALID_OID, Oid};

/// What kind of command produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Rows were returned
    Query,
    /// A command without an affected-row count, typically DDL
    SchemaChange,
    /// A command that reports affected rows
    DataModification,
    /// The query string was empty
    Empty,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Query => "DQL",
            Outcome::SchemaChange => "DDL",
            Outcome::DataModification => "DML",
            Outcome::Empty => "EMPTY",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a successful status. `None` means the status is a failure.
fn classify(raw: &PgResult) -> Option<Outcome> {
    match raw.status() {
        ExecStatus::TuplesOk => Some(Outcome::Query),
        // COPY results follow the same rule, though they never carry a count
        ExecStatus::CommandOk | ExecStatus::CopyOut | ExecStatus::CopyIn => {
            if raw.cmd_tuples().is_empty() {
                Some(Outcome::SchemaChange)
            } else {
                Some(Outcome::DataModification)
            }
        }
        ExecStatus::EmptyQuery => Some(Outcome::Empty),
        ExecStatus::BadResponse | ExecStatus::NonFatalError | ExecStatus::FatalError => None,
    }
}

/// Result of one statement.
///
/// Iterating yields the rows in server order, each decoded on demand. The
/// iteration is forward-only; once it ended, or failed, it stays ended.
#[derive(Debug)]
pub struct QueryResult {
    raw: Option<PgResult>,
    session: Weak<SessionInfo>,
    outcome: Outcome,
    columns: Vec<Arc<Column>>,
    row_count: usize,
    cursor: usize,
    failed: bool,
    byte_string: Oid,
    cmd_status: String,
    affected_rows: Option<u64>,
    oid: Option<Oid>,
}

impl QueryResult {
    /// Classify `raw` and capture its metadata.
    ///
    /// `None` stands for an execute call that produced no result at all;
    /// `connection_error` is the session's error text at that point.
    /// `integer_datetimes` tells the columns how binary date/time cells are
    /// stored.
    pub(crate) fn from_raw(
        session: Weak<SessionInfo>,
        raw: Option<PgResult>,
        connection_error: &str,
        type_map: &TypeMap,
        integer_datetimes: bool,
    ) -> Result<Self> {
        let raw = raw.ok_or_else(|| {
            Error::Operational(match connection_error.trim_end() {
                "" => "no result from the server".to_string(),
                text => text.to_string(),
            })
        })?;
        let Some(outcome) = classify(&raw) else {
            return Err(classify_failure(&raw, connection_error));
        };

        let columns = raw
            .fields()
            .iter()
            .map(|field| {
                Arc::new(Column::from_field(field).with_integer_datetimes(integer_datetimes))
            })
            .collect();
        let oid = match raw.oid_value() {
            INVALID_OID => None,
            oid => Some(oid),
        };
        // a row count is not an affected-row count
        let affected_rows = match outcome {
            Outcome::Query => None,
            _ => raw.cmd_tuples().parse().ok(),
        };
        Ok(Self {
            row_count: raw.ntuples(),
            cmd_status: raw.cmd_status().to_string(),
            affected_rows,
            oid,
            raw: Some(raw),
            session,
            outcome,
            columns,
            cursor: 0,
            failed: false,
            byte_string: type_map.byte_string,
        })
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Number of rows in the result, iterated or not.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index).map(Arc::as_ref)
    }

    /// Command tag, e.g. `INSERT 0 1`.
    pub fn cmd_status(&self) -> &str {
        &self.cmd_status
    }

    /// Rows touched by the command; `None` for queries and for commands
    /// without a count.
    pub fn affected_rows(&self) -> Option<u64> {
        self.affected_rows
    }

    /// OID of the row a single-row `INSERT` created, if the table has OIDs.
    pub fn oid(&self) -> Option<Oid> {
        self.oid
    }

    /// Index of the next row [`next`](Iterator::next) returns.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Release the buffered rows. Iteration ends; metadata stays readable.
    pub fn dispose(&mut self) {
        self.raw = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.raw.is_none()
    }

    fn decode_row(&self, raw: &PgResult, row: usize) -> Result<Row> {
        let mut cells = Vec::with_capacity(self.columns.len());
        for (index, column) in self.columns.iter().enumerate() {
            let value = match raw.get_value(row, index) {
                None => None,
                Some(bytes) if column.is_binary() => Some(bytes.to_vec()),
                Some(bytes) if column.type_oid() == self.byte_string => {
                    let decoded = unescape_bytea(bytes).map_err(|e| {
                        Error::Data(format!(
                            "row {}, column \"{}\": {} ({})",
                            row,
                            column.name(),
                            e,
                            describe_session(&self.session)
                        ))
                    })?;
                    Some(decoded)
                }
                Some(bytes) => Some(bytes.to_vec()),
            };
            cells.push(Cell::new(Arc::clone(column), value));
        }
        Ok(Row::new(cells))
    }
}

impl Iterator for QueryResult {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.row_count {
            return None;
        }
        let raw = self.raw.as_ref()?;
        match self.decode_row(raw, self.cursor) {
            Ok(row) => {
                self.cursor += 1;
                Some(Ok(row))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed || self.raw.is_none() {
            return (0, Some(0));
        }
        (0, Some(self.row_count - self.cursor))
    }
}

impl FusedIterator for QueryResult {}
