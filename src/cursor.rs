//! Cursors: statements with `%s` placeholders and batched fetching.
//!
//! A plain `SELECT` runs behind a server-side cursor (`DECLARE ... CURSOR
//! WITHOUT HOLD`) inside a transaction, so rows arrive in batches of
//! [`array_size`](Cursor::array_size) instead of all at once. Every other
//! statement runs directly and its rows, if any, are buffered.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::column::{Column, Row};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::params::{Param, ToParams};
use crate::placeholder::{self, NamedParams, is_plain_select, quote_ident};
use crate::protocol::types::{Oid, TransactionStatus};
use crate::result::{Outcome, QueryResult};

const DEFAULT_ARRAY_SIZE: usize = 10;

static NEXT_CURSOR: AtomicU32 = AtomicU32::new(1);

/// A statement handle over a [`Connection`].
///
/// Created by [`Connection::cursor`] or [`Connection::named_cursor`].
#[derive(Debug)]
pub struct Cursor {
    conn: Option<Connection>,
    name: String,
    declared: bool,
    pending: Option<QueryResult>,
    description: Option<Vec<Arc<Column>>>,
    outcome: Option<Outcome>,
    row_count: Option<u64>,
    oid: Option<Oid>,
    array_size: usize,
}

impl Cursor {
    pub(crate) fn new(conn: Connection, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| {
            format!("zero_pq_{:08x}", NEXT_CURSOR.fetch_add(1, Ordering::Relaxed))
        });
        Self {
            conn: Some(conn),
            name,
            declared: false,
            pending: None,
            description: None,
            outcome: None,
            row_count: None,
            oid: None,
            array_size: DEFAULT_ARRAY_SIZE,
        }
    }

    /// Name of the server-side cursor a `SELECT` is declared as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rows [`fetch_many`](Self::fetch_many) returns when no count is given.
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn set_array_size(&mut self, array_size: usize) {
        self.array_size = array_size;
    }

    /// Columns of the last statement's rows; `None` if it returned none.
    pub fn description(&self) -> Option<&[Arc<Column>]> {
        self.description.as_deref()
    }

    /// Rows the last statement returned or touched. `None` when unknown,
    /// which includes every `SELECT` run behind a server-side cursor.
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// OID of the row the last single-row `INSERT` created, if any.
    pub fn oid(&self) -> Option<Oid> {
        self.oid
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::Programming("Cursor not open".into()))
    }

    /// Run `query` with `%s` placeholders, one per parameter.
    ///
    /// Without parameters `query` is sent unchanged.
    pub fn execute<P: ToParams + ?Sized>(&mut self, query: &str, params: &P) -> Result<&mut Self> {
        let mut list = Vec::with_capacity(params.param_count());
        params.push_params(&mut list);
        let query = if list.is_empty() {
            Cow::Borrowed(query)
        } else {
            Cow::Owned(placeholder::positional(query, list.len())?)
        };
        self.run(&query, &list)
    }

    /// Run `query` with `%(name)s` placeholders looked up in `params`.
    pub fn execute_named<N: NamedParams + ?Sized>(
        &mut self,
        query: &str,
        params: &N,
    ) -> Result<&mut Self> {
        let (query, list) = placeholder::named(query, params)?;
        self.run(&query, &list)
    }

    fn run(&mut self, query: &str, params: &[Param<'_>]) -> Result<&mut Self> {
        let conn = self.conn()?.clone();
        self.reset()?;

        let declare = is_plain_select(query);
        let result = if declare {
            conn.begin()?;
            let query = format!(
                "DECLARE {} CURSOR WITHOUT HOLD FOR {}",
                quote_ident(&self.name),
                query
            );
            conn.execute(&query, params)?
        } else {
            conn.execute(query, params)?
        };

        self.outcome = Some(result.outcome());
        match result.outcome() {
            Outcome::Query => {
                self.row_count = u64::try_from(result.row_count()).ok();
                self.description = Some(result.columns().to_vec());
                self.pending = Some(result);
            }
            Outcome::DataModification => {
                self.row_count = result.affected_rows();
                self.oid = result.oid();
            }
            Outcome::SchemaChange | Outcome::Empty if declare => {
                self.declared = true;
                // FETCH 0 moves nothing but describes the columns
                let described =
                    conn.execute(&format!("FETCH 0 FROM {}", quote_ident(&self.name)), &())?;
                self.description = Some(described.columns().to_vec());
                self.outcome = Some(described.outcome());
            }
            Outcome::SchemaChange | Outcome::Empty => {}
        }
        tracing::trace!(cursor = %self.name, declared = self.declared, "executed");
        Ok(self)
    }

    fn fetch(&mut self, count: Option<usize>) -> Result<Vec<Row>> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| Error::Programming("Cursor not open".into()))?;
        if count == Some(0) {
            return Ok(Vec::new());
        }
        if let Some(result) = self.pending.as_mut() {
            return match count {
                Some(limit) => result.by_ref().take(limit).collect(),
                None => result.collect(),
            };
        }
        if self.declared {
            let amount = count.map_or_else(|| "ALL".to_string(), |limit| limit.to_string());
            let query = format!("FETCH {} FROM {}", amount, quote_ident(&self.name));
            return conn.execute(&query, &())?.collect();
        }
        Err(Error::Programming("No results pending".into()))
    }

    /// Next row, `None` once the rows ran out.
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        Ok(self.fetch(Some(1))?.into_iter().next())
    }

    /// Up to `count` rows, [`array_size`](Self::array_size) when `None`.
    pub fn fetch_many(&mut self, count: Option<usize>) -> Result<Vec<Row>> {
        self.fetch(Some(count.unwrap_or(self.array_size)))
    }

    /// Every remaining row.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.fetch(None)
    }

    /// Forget the last statement. A server-side cursor still open in the
    /// current transaction is closed.
    pub fn reset(&mut self) -> Result<()> {
        self.pending = None;
        self.description = None;
        self.outcome = None;
        self.row_count = None;
        self.oid = None;
        if !std::mem::take(&mut self.declared) {
            return Ok(());
        }
        let Some(conn) = self.conn.as_ref().filter(|conn| !conn.closed()) else {
            return Ok(());
        };
        // the cursor is gone once its transaction ended
        if conn.transaction_status()? == TransactionStatus::InTransaction {
            conn.execute(&format!("CLOSE {}", quote_ident(&self.name)), &())?;
        }
        Ok(())
    }

    /// Reset and detach from the connection. Later calls fail.
    pub fn close(&mut self) -> Result<()> {
        let reset = self.reset();
        self.conn = None;
        reset
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.conn.is_some()
            && let Err(e) = self.close()
        {
            tracing::warn!(cursor = %self.name, "failed to close cursor: {}", e);
        }
    }
}

