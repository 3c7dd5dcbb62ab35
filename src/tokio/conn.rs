//! Connection calls moved onto Tokio's blocking pool.

use tokio::task::{JoinError, spawn_blocking};

use crate::connection::{Connection, CopyOut};
use crate::error::{Error, Result};
use crate::params::ToParams;
use crate::protocol::types::{FormatCode, TransactionStatus};
use crate::result::QueryResult;

fn join_error(error: JoinError) -> Error {
    Error::Internal(format!("blocking task failed: {}", error))
}

/// A [`Connection`] whose server round trips run on
/// [`spawn_blocking`], so they do not stall the async runtime.
///
/// Calls on one session still run one at a time. Settings fixed at connect
/// time are plain methods; everything that needs the session waits on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct AsyncConnection {
    inner: Connection,
}

impl AsyncConnection {
    pub async fn open(conninfo: impl Into<String>) -> Result<Self> {
        let conninfo = conninfo.into();
        let inner = spawn_blocking(move || Connection::open(&conninfo))
            .await
            .map_err(join_error)??;
        Ok(Self { inner })
    }

    /// The blocking handle, for row iteration and cursors. Its calls that
    /// talk to the server block; run them on the blocking pool.
    pub fn connection(&self) -> &Connection {
        &self.inner
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.inner.clone();
        spawn_blocking(move || call(conn))
            .await
            .map_err(join_error)?
    }

    pub fn closed(&self) -> bool {
        self.inner.closed()
    }

    pub fn conninfo(&self) -> &str {
        self.inner.conninfo()
    }

    pub fn host(&self) -> Result<String> {
        self.inner.host()
    }

    pub fn port(&self) -> Result<u16> {
        self.inner.port()
    }

    pub fn db(&self) -> Result<String> {
        self.inner.db()
    }

    pub fn user(&self) -> Result<String> {
        self.inner.user()
    }

    pub fn server_version(&self) -> Result<i32> {
        self.inner.server_version()
    }

    pub fn backend_pid(&self) -> Result<u32> {
        self.inner.backend_pid()
    }

    pub fn integer_datetimes(&self) -> Result<bool> {
        self.inner.integer_datetimes()
    }

    pub async fn transaction_status(&self) -> Result<TransactionStatus> {
        self.blocking(|conn| conn.transaction_status()).await
    }

    pub async fn parameter_status(&self, name: impl Into<String>) -> Result<Option<String>> {
        let name = name.into();
        self.blocking(move |conn| conn.parameter_status(&name)).await
    }

    pub async fn error_message(&self) -> Result<String> {
        self.blocking(|conn| conn.error_message()).await
    }

    pub async fn notices(&self) -> Result<Vec<String>> {
        self.blocking(|conn| conn.notices()).await
    }

    pub async fn take_notices(&self) -> Result<Vec<String>> {
        self.blocking(|conn| conn.take_notices()).await
    }

    pub async fn execute<P>(&self, query: impl Into<String>, params: P) -> Result<QueryResult>
    where
        P: ToParams + Send + 'static,
    {
        self.execute_format(query, params, FormatCode::Text).await
    }

    pub async fn execute_format<P>(
        &self,
        query: impl Into<String>,
        params: P,
        result_format: FormatCode,
    ) -> Result<QueryResult>
    where
        P: ToParams + Send + 'static,
    {
        let query = query.into();
        self.blocking(move |conn| conn.execute_format(&query, &params, result_format))
            .await
    }

    pub async fn begin(&self) -> Result<()> {
        self.blocking(|conn| conn.begin()).await
    }

    pub async fn commit(&self) -> Result<()> {
        self.blocking(|conn| conn.commit()).await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.blocking(|conn| conn.rollback()).await
    }

    pub async fn put_copy_data(&self, data: Vec<u8>) -> Result<()> {
        self.blocking(move |conn| conn.put_copy_data(&data)).await
    }

    pub async fn put_copy_end(&self, error: Option<String>) -> Result<QueryResult> {
        self.blocking(move |conn| conn.put_copy_end(error.as_deref()))
            .await
    }

    pub async fn get_copy_data(&self) -> Result<CopyOut> {
        self.blocking(|conn| conn.get_copy_data()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.close();
            Ok(())
        })
        .await
    }
}
