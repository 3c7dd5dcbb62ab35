//! The binding's connection handle.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::params::{Param, ToParams, TypeMap, bind};
use crate::pq::{ConnStatus, CopyOutput, PgConn, PqError};
use crate::protocol::types::{FormatCode, TransactionStatus};
use crate::result::QueryResult;

/// Lowest frontend/backend protocol major version a session may use.
pub const MIN_PROTOCOL_VERSION: i32 = 3;

/// State behind a [`Connection`] and its clones.
#[derive(Debug)]
struct Session {
    pq: Option<PgConn>,
    notices: Vec<String>,
    type_map: TypeMap,
}

type SessionRef = Mutex<Session>;

impl Session {
    fn collect_notices(&mut self) {
        if let Some(pq) = self.pq.as_mut() {
            self.notices.extend(pq.take_notices());
        }
    }

    fn pq(&self) -> Result<&PgConn> {
        self.pq.as_ref().ok_or_else(Error::not_open)
    }

    fn pq_mut(&mut self) -> Result<&mut PgConn> {
        self.pq.as_mut().ok_or_else(Error::not_open)
    }
}

/// Settings that stay fixed for the whole session.
///
/// They are read without the session lock, so a statement running on another
/// thread does not hold them up.
pub(crate) struct SessionInfo {
    host: String,
    port: u16,
    db: String,
    user: String,
    password: String,
    options: String,
    tty: String,
    server_version: i32,
    backend_pid: u32,
    integer_datetimes: bool,
    closed: AtomicBool,
}

impl SessionInfo {
    fn capture(pq: &PgConn) -> Self {
        Self {
            host: pq.host().to_string(),
            port: pq.port(),
            db: pq.db().to_string(),
            user: pq.user().to_string(),
            password: pq.password().to_string(),
            options: pq.options().to_string(),
            tty: pq.tty().to_string(),
            server_version: pq.server_version(),
            backend_pid: pq.backend_pid(),
            // servers before 8.4 could be built with float date/time storage
            integer_datetimes: pq.parameter_status("integer_datetimes") != Some("off"),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn read<T>(&self, f: impl FnOnce(&Self) -> T) -> Result<T> {
        if self.is_closed() {
            return Err(Error::not_open());
        }
        Ok(f(self))
    }
}

impl std::fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("user", &self.user)
            .field("backend_pid", &self.backend_pid)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Context for errors raised after the statement ran, such as a cell that
/// fails to decode.
pub(crate) fn describe_session(info: &Weak<SessionInfo>) -> String {
    match info.upgrade() {
        Some(info) if !info.is_closed() => format!(
            "connection to {}:{} as {}, database {}",
            info.host, info.port, info.user, info.db
        ),
        _ => "connection no longer available".to_string(),
    }
}

/// Text for a failure of the native layer outside of a result.
fn native_error(error: PqError) -> Error {
    match error {
        PqError::InvalidUsage(message) => Error::Programming(message),
        PqError::Unsupported(message) => Error::NotSupported(message),
        other => Error::Operational(other.to_message().trim_end().to_string()),
    }
}

/// One step of a `COPY ... TO STDOUT`.
#[derive(Debug)]
pub enum CopyOut {
    /// One row in the COPY format
    Data(Vec<u8>),
    /// The COPY is over
    Done(QueryResult),
}

/// A session with a PostgreSQL server.
///
/// Clones share the session. Calls that talk to the server block the calling
/// thread, and only one of them runs at a time per session. Settings fixed at
/// connect time (host, port, user, ...) are answered without waiting for a
/// running call. The session ends with [`close`](Self::close) or when the
/// last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    session: Arc<SessionRef>,
    info: Arc<SessionInfo>,
    conninfo: Arc<str>,
}

impl Connection {
    /// Connect with a libpq-style connection string (`host=... dbname=...`)
    /// or a `postgres://` URI. Blocks until the server accepted the session.
    pub fn open(conninfo: &str) -> Result<Self> {
        let opts = Opts::try_from(conninfo)
            .map_err(|e| Error::Operational(e.to_message().trim_end().to_string()))?
            .with_env_defaults();
        let target = if opts.hostaddr.is_none() && opts.host.starts_with('/') {
            format!("on socket \"{}/.s.PGSQL.{}\"", opts.host, opts.port)
        } else {
            let host = opts.hostaddr.as_deref().unwrap_or(match opts.host.as_str() {
                "" => "localhost",
                host => host,
            });
            format!("at \"{}\", port {}", host, opts.port)
        };

        let mut pq = PgConn::connect(opts).map_err(|e| {
            Error::Operational(format!(
                "connection to server {} failed: {}",
                target,
                e.to_message().trim_end()
            ))
        })?;
        if pq.status() != ConnStatus::Ok {
            return Err(Error::Operational(pq.error_message().trim_end().to_string()));
        }
        if pq.protocol_version() < MIN_PROTOCOL_VERSION {
            return Err(Error::Operational(format!(
                "server uses protocol version {}, at least {} is required",
                pq.protocol_version(),
                MIN_PROTOCOL_VERSION
            )));
        }

        let notices = pq.take_notices();
        let conn = Self {
            info: Arc::new(SessionInfo::capture(&pq)),
            session: Arc::new(Mutex::new(Session {
                pq: Some(pq),
                notices,
                type_map: TypeMap::default(),
            })),
            conninfo: Arc::from(conninfo),
        };
        // date/time text cells are parsed in ISO form
        conn.execute("SET datestyle TO ISO", &())?;
        tracing::debug!(pid = conn.info.backend_pid, "connection open");
        Ok(conn)
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // a panic while holding the lock leaves no half-written session state
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_pq<T>(&self, f: impl FnOnce(&PgConn) -> T) -> Result<T> {
        self.lock().pq().map(f)
    }

    /// Run one statement with text-format results.
    ///
    /// Blocks until the server answered.
    pub fn execute<P: ToParams + ?Sized>(&self, query: &str, params: &P) -> Result<QueryResult> {
        self.execute_format(query, params, FormatCode::Text)
    }

    /// Run one statement, asking for results in `result_format`.
    pub fn execute_format<P: ToParams + ?Sized>(
        &self,
        query: &str,
        params: &P,
        result_format: FormatCode,
    ) -> Result<QueryResult> {
        let mut list = Vec::with_capacity(params.param_count());
        params.push_params(&mut list);
        let mut session = self.lock();
        self.run(&mut session, query, &list, result_format)
    }

    fn run(
        &self,
        session: &mut Session,
        query: &str,
        params: &[Param<'_>],
        result_format: FormatCode,
    ) -> Result<QueryResult> {
        let type_map = session.type_map;
        let bound = bind(params, &type_map)?;
        let pq = session.pq_mut()?;
        let raw = pq.exec_params(
            query,
            &bound.types,
            &bound.values,
            &bound.lengths,
            &bound.formats,
            result_format,
        );
        let connection_error = pq.error_message().to_string();
        session.collect_notices();
        if raw.is_none() {
            tracing::debug!("execute produced no result: {}", connection_error.trim_end());
        }
        QueryResult::from_raw(
            Arc::downgrade(&self.info),
            raw,
            &connection_error,
            &type_map,
            self.info.integer_datetimes,
        )
    }

    /// A cursor over this session with a generated name.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.clone(), None)
    }

    /// A cursor whose server-side portal, if it opens one, is called `name`.
    pub fn named_cursor(&self, name: impl Into<String>) -> Cursor {
        Cursor::new(self.clone(), Some(name.into()))
    }

    /// End the session. Calling it again does nothing.
    pub fn close(&self) {
        let mut session = self.lock();
        session.collect_notices();
        if let Some(pq) = session.pq.take() {
            tracing::debug!(pid = pq.backend_pid(), "closing connection");
            self.info.closed.store(true, Ordering::Release);
            pq.finish();
        }
    }

    /// Whether [`close`](Self::close) was called. Does not wait for a
    /// running call.
    pub fn closed(&self) -> bool {
        self.info.is_closed()
    }

    /// The connection string given to [`open`](Self::open), verbatim.
    pub fn conninfo(&self) -> &str {
        &self.conninfo
    }

    /// Host name, `localhost` when none was given.
    pub fn host(&self) -> Result<String> {
        self.info.read(|info| info.host.clone())
    }

    pub fn port(&self) -> Result<u16> {
        self.info.read(|info| info.port)
    }

    pub fn db(&self) -> Result<String> {
        self.info.read(|info| info.db.clone())
    }

    pub fn user(&self) -> Result<String> {
        self.info.read(|info| info.user.clone())
    }

    pub fn password(&self) -> Result<String> {
        self.info.read(|info| info.password.clone())
    }

    pub fn options(&self) -> Result<String> {
        self.info.read(|info| info.options.clone())
    }

    /// Always empty.
    pub fn tty(&self) -> Result<String> {
        self.info.read(|info| info.tty.clone())
    }

    pub fn protocol_version(&self) -> Result<i32> {
        self.with_pq(PgConn::protocol_version)
    }

    /// Server version as an integer, e.g. 160002 for 16.2.
    pub fn server_version(&self) -> Result<i32> {
        self.info.read(|info| info.server_version)
    }

    pub fn transaction_status(&self) -> Result<TransactionStatus> {
        self.with_pq(PgConn::transaction_status)
    }

    /// Socket descriptor for readiness polling; `None` once the session broke.
    pub fn socket(&self) -> Result<Option<RawFd>> {
        self.with_pq(PgConn::socket)
    }

    /// Text of the session's most recent failure.
    pub fn error_message(&self) -> Result<String> {
        self.with_pq(|pq| pq.error_message().to_string())
    }

    /// A run-time parameter the server reported, e.g. `server_encoding`.
    pub fn parameter_status(&self, name: &str) -> Result<Option<String>> {
        self.with_pq(|pq| pq.parameter_status(name).map(str::to_string))
    }

    /// Whether the server stores date/time values as 64-bit integers.
    /// Binary date/time cells are decoded accordingly.
    pub fn integer_datetimes(&self) -> Result<bool> {
        self.info.read(|info| info.integer_datetimes)
    }

    /// Process ID of the server backend.
    pub fn backend_pid(&self) -> Result<u32> {
        self.info.read(|info| info.backend_pid)
    }

    /// Notices the server sent so far, oldest first, as
    /// `"SEVERITY:  message\n"`. The log only shrinks through
    /// [`take_notices`](Self::take_notices).
    pub fn notices(&self) -> Result<Vec<String>> {
        let mut session = self.lock();
        session.pq()?;
        session.collect_notices();
        Ok(session.notices.clone())
    }

    /// Empty the notice log and return what it held.
    pub fn take_notices(&self) -> Result<Vec<String>> {
        let mut session = self.lock();
        session.pq()?;
        session.collect_notices();
        Ok(std::mem::take(&mut session.notices))
    }

    pub fn type_map(&self) -> TypeMap {
        self.lock().type_map
    }

    /// Change how untyped parameters are typed and which result columns
    /// hold byte strings. Applies to later calls.
    pub fn set_type_map(&self, type_map: TypeMap) {
        self.lock().type_map = type_map;
    }

    /// `BEGIN WORK`, unless a transaction is already open.
    pub fn begin(&self) -> Result<()> {
        self.transaction_command("BEGIN WORK", |status| status == TransactionStatus::Idle)
    }

    /// `COMMIT WORK`, if a transaction is open.
    pub fn commit(&self) -> Result<()> {
        self.transaction_command("COMMIT WORK", |status| status != TransactionStatus::Idle)
    }

    /// `ROLLBACK WORK`, if a transaction is open.
    pub fn rollback(&self) -> Result<()> {
        self.transaction_command("ROLLBACK WORK", |status| status != TransactionStatus::Idle)
    }

    fn transaction_command(
        &self,
        query: &str,
        applies: impl FnOnce(TransactionStatus) -> bool,
    ) -> Result<()> {
        let mut session = self.lock();
        if applies(session.pq()?.transaction_status()) {
            self.run(&mut session, query, &[], FormatCode::Text)?;
        }
        Ok(())
    }

    /// Send data for a running `COPY ... FROM STDIN`.
    pub fn put_copy_data(&self, data: &[u8]) -> Result<()> {
        let mut session = self.lock();
        session.pq_mut()?.put_copy_data(data).map_err(native_error)
    }

    /// Finish a running `COPY ... FROM STDIN`. With `error`, the COPY is
    /// aborted and the server reports it as the failure reason.
    pub fn put_copy_end(&self, error: Option<&str>) -> Result<QueryResult> {
        let mut session = self.lock();
        let pq = session.pq_mut()?;
        let raw = pq.put_copy_end(error).map_err(native_error)?;
        let connection_error = pq.error_message().to_string();
        let type_map = session.type_map;
        session.collect_notices();
        QueryResult::from_raw(
            Arc::downgrade(&self.info),
            Some(raw),
            &connection_error,
            &type_map,
            self.info.integer_datetimes,
        )
    }

    /// Next row of a running `COPY ... TO STDOUT`. Blocks until it arrives.
    pub fn get_copy_data(&self) -> Result<CopyOut> {
        let mut session = self.lock();
        let pq = session.pq_mut()?;
        let output = pq.get_copy_data().map_err(native_error)?;
        let connection_error = pq.error_message().to_string();
        let type_map = session.type_map;
        session.collect_notices();
        match output {
            CopyOutput::Data(data) => Ok(CopyOut::Data(data)),
            CopyOutput::Done(raw) => QueryResult::from_raw(
                Arc::downgrade(&self.info),
                Some(raw),
                &connection_error,
                &type_map,
                self.info.integer_datetimes,
            )
            .map(CopyOut::Done),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
