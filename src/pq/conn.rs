//! Blocking session with a PostgreSQL server.

use std::os::fd::RawFd;

use crate::buffer_set::BufferSet;
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::write_terminate;
use crate::protocol::types::{FormatCode, Oid, TransactionStatus};
use crate::state::{Action, AsyncMessage, ConnectionStateMachine, ExecStateMachine, StateMachine};

use super::error::{PqError, PqResult};
use super::result::{ExecStatus, PgResult};
use super::stream::Stream;

/// Highest number of parameters one Bind message can carry.
pub const MAX_PARAMS: usize = u16::MAX as usize;

/// Frontend/backend protocol major version spoken by this client.
pub const PROTOCOL_VERSION: i32 = 3;

/// Health of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Ok,
    Bad,
}

/// One step of a COPY TO STDOUT.
#[derive(Debug)]
pub enum CopyOutput {
    /// One row of COPY data, as the server sent it.
    Data(Vec<u8>),
    /// The COPY ended; this is the final command result.
    Done(PgResult),
}

/// Read a message from the stream into the buffer set.
fn read_message_into(stream: &mut Stream, buffer_set: &mut BufferSet) -> PqResult<()> {
    let mut type_byte = [0u8; 1];
    stream.read_exact(&mut type_byte)?;
    buffer_set.type_byte = type_byte[0];

    let mut length_bytes = [0u8; 4];
    stream.read_exact(&mut length_bytes)?;
    let length = u32::from_be_bytes(length_bytes);
    if length < 4 {
        return Err(PqError::Protocol(format!("invalid message length: {}", length)));
    }

    buffer_set.read_buffer.clear();
    buffer_set.read_buffer.resize((length - 4) as usize, 0);
    stream.read_exact(&mut buffer_set.read_buffer)?;
    Ok(())
}

/// Encode a `server_version` string as libpq's integer form.
///
/// `16.2` is 160002, `9.6.24` is 90624 and `17devel` is 170000.
pub fn parse_server_version(text: &str) -> i32 {
    let version = text.split_whitespace().next().unwrap_or("");
    let mut parts = version.split('.').map(|part| {
        let digits = part.len() - part.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        part.get(..digits).and_then(|d| d.parse::<i32>().ok())
    });
    match (parts.next().flatten(), parts.next().flatten(), parts.next().flatten()) {
        (Some(major), Some(minor), Some(patch)) => major * 10000 + minor * 100 + patch,
        (Some(major), Some(minor), None) if major >= 10 => major * 10000 + minor,
        (Some(major), Some(minor), None) => major * 10000 + minor * 100,
        (Some(major), None, _) => major * 10000,
        _ => 0,
    }
}

/// A blocking session, the native counterpart of libpq's `PGconn`.
///
/// Failed operations never panic: they return an error or a `None` result and
/// leave the text in [`error_message`](Self::error_message). A session whose
/// socket failed turns [`ConnStatus::Bad`] and stays that way.
pub struct PgConn {
    stream: Option<Stream>,
    opts: Opts,
    buffer_set: BufferSet,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    transaction_status: TransactionStatus,
    error_message: String,
    notices: Vec<String>,
    copy: Option<ExecStateMachine>,
}

impl PgConn {
    /// Connect and authenticate. Blocks until the server is ready for queries.
    ///
    /// `opts` is used as given; call [`Opts::with_env_defaults`] first to
    /// fill in the `PG*` environment.
    pub fn connect(opts: Opts) -> PqResult<Self> {
        let stream = Stream::connect(&opts)?;
        let mut conn = Self {
            stream: Some(stream),
            opts,
            buffer_set: BufferSet::new(),
            backend_key: None,
            server_params: Vec::new(),
            transaction_status: TransactionStatus::Idle,
            error_message: String::new(),
            notices: Vec::new(),
            copy: None,
        };

        let mut state_machine =
            ConnectionStateMachine::new(conn.opts.clone(), cfg!(feature = "sync-tls"));
        let action = state_machine.step(&mut conn.buffer_set)?;
        conn.drive(&mut state_machine, action)?;

        conn.backend_key = state_machine.backend_key().copied();
        conn.transaction_status = state_machine.transaction_status();
        tracing::debug!(
            host = conn.host(),
            port = conn.port(),
            pid = conn.backend_pid(),
            "connected"
        );
        Ok(conn)
    }

    fn stream(&mut self) -> PqResult<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or_else(|| PqError::InvalidUsage("no connection to the server".into()))
    }

    fn send(&mut self) -> PqResult<()> {
        let Self {
            stream, buffer_set, ..
        } = self;
        let stream = stream
            .as_mut()
            .ok_or_else(|| PqError::InvalidUsage("no connection to the server".into()))?;
        stream.write_all(&buffer_set.write_buffer)?;
        stream.flush()?;
        Ok(())
    }

    fn read_message(&mut self) -> PqResult<()> {
        let Self {
            stream, buffer_set, ..
        } = self;
        let stream = stream
            .as_mut()
            .ok_or_else(|| PqError::InvalidUsage("no connection to the server".into()))?;
        read_message_into(stream, buffer_set)
    }

    /// Perform the I/O requested by `state_machine` until it finishes.
    fn drive<S: StateMachine>(&mut self, state_machine: &mut S, first: Action) -> PqResult<()> {
        let mut action = first;
        loop {
            match action {
                Action::WriteAndReadByte => {
                    self.send()?;
                    let mut byte = [0u8; 1];
                    self.stream()?.read_exact(&mut byte)?;
                    self.buffer_set.type_byte = byte[0];
                }
                Action::ReadMessage => self.read_message()?,
                Action::WriteAndReadMessage => {
                    self.send()?;
                    self.read_message()?;
                }
                Action::TlsHandshake => self.tls_handshake()?,
                Action::HandleAsyncMessageAndReadMessage(message) => {
                    self.handle_async_message(message);
                    self.read_message()?;
                }
                Action::Finished => return Ok(()),
            }
            action = state_machine.step(&mut self.buffer_set)?;
        }
    }

    #[cfg(feature = "sync-tls")]
    fn tls_handshake(&mut self) -> PqResult<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| PqError::InvalidUsage("no connection to the server".into()))?;
        let domain = match self.opts.host.as_str() {
            "" => "localhost",
            host => host,
        };
        let verify = self.opts.ssl_mode == crate::opts::SslMode::VerifyFull;
        self.stream = Some(stream.upgrade_to_tls(domain, verify)?);
        Ok(())
    }

    #[cfg(not(feature = "sync-tls"))]
    fn tls_handshake(&mut self) -> PqResult<()> {
        Err(PqError::Unsupported(format!(
            "sslmode={:?} needs the sync-tls feature",
            self.opts.ssl_mode
        )))
    }

    fn handle_async_message(&mut self, message: AsyncMessage) {
        match message {
            AsyncMessage::Notice(fields) => {
                let text = fields.to_message();
                tracing::debug!("server notice: {}", text.trim_end());
                self.notices.push(text);
            }
            AsyncMessage::ParameterChanged { name, value } => {
                match self.server_params.iter_mut().find(|(n, _)| *n == name) {
                    Some(entry) => entry.1 = value,
                    None => self.server_params.push((name, value)),
                }
            }
            AsyncMessage::Notification {
                pid,
                channel,
                payload,
            } => {
                tracing::debug!(pid, channel = %channel, payload = %payload, "notification ignored");
            }
        }
    }

    /// Drop the socket after an unrecoverable failure.
    fn mark_bad(&mut self, error: &PqError) {
        tracing::debug!("connection lost: {}", error);
        self.error_message = error.to_message();
        self.stream = None;
        self.copy = None;
        self.transaction_status = TransactionStatus::Unknown;
    }

    fn usage_error(&mut self, message: &str) -> Option<PgResult> {
        self.error_message = format!("{}\n", message);
        None
    }

    /// Execute one statement with out-of-line parameters.
    ///
    /// `param_types`, `values`, `lengths` and `formats` are parallel arrays.
    /// `lengths` is only read for binary parameters, whose value is cut to
    /// that many bytes; an OID of 0 lets the server infer the type.
    ///
    /// Returns `None` when no result could be produced at all. The reason is
    /// in [`error_message`](Self::error_message). Server-side errors come back
    /// as a result with status `FatalError`.
    pub fn exec_params(
        &mut self,
        query: &str,
        param_types: &[Oid],
        values: &[Option<&[u8]>],
        lengths: &[i32],
        formats: &[FormatCode],
        result_format: FormatCode,
    ) -> Option<PgResult> {
        self.error_message.clear();
        if self.stream.is_none() {
            return self.usage_error("no connection to the server");
        }
        if self.copy.is_some() {
            return self.usage_error("another command is already in progress");
        }
        if query.contains('\0') {
            return self.usage_error("query string contains a NUL byte");
        }
        let count = values.len();
        if param_types.len() != count || lengths.len() != count || formats.len() != count {
            return self.usage_error("parameter arrays have mismatched lengths");
        }
        if count > MAX_PARAMS {
            return self.usage_error(&format!(
                "number of parameters must be between 0 and {}",
                MAX_PARAMS
            ));
        }

        let mut sent = Vec::with_capacity(count);
        for (index, ((value, &length), &format)) in
            values.iter().zip(lengths).zip(formats).enumerate()
        {
            let value = match (value, format) {
                (Some(bytes), FormatCode::Binary) => {
                    match usize::try_from(length).ok().and_then(|n| bytes.get(..n)) {
                        Some(cut) => Some(cut),
                        None => {
                            return self.usage_error(&format!(
                                "invalid length {} for binary parameter ${}",
                                length,
                                index + 1
                            ));
                        }
                    }
                }
                (None, FormatCode::Binary) => None,
                (value, FormatCode::Text) => *value,
            };
            sent.push(value);
        }

        let mut state_machine = ExecStateMachine::new();
        let action = state_machine.start(
            &mut self.buffer_set,
            query,
            param_types,
            &sent,
            formats,
            result_format,
        );
        self.transaction_status = TransactionStatus::Active;
        if let Err(error) = self.drive(&mut state_machine, action) {
            self.mark_bad(&error);
            // a FATAL error is followed by the server closing the socket
            let collected = state_machine.result();
            if collected.status() == ExecStatus::FatalError && collected.error_fields().is_some() {
                return Some(state_machine.take_result());
            }
            return None;
        }

        if state_machine.in_copy_in() || state_machine.in_copy_out() {
            let result = state_machine.result().clone();
            self.copy = Some(state_machine);
            return Some(result);
        }
        self.transaction_status = state_machine.transaction_status();
        Some(state_machine.take_result())
    }

    /// Send one chunk of data during `COPY ... FROM STDIN`.
    pub fn put_copy_data(&mut self, data: &[u8]) -> PqResult<()> {
        let state_machine = self
            .copy
            .as_mut()
            .ok_or_else(|| PqError::InvalidUsage("no COPY in progress".into()))?;
        state_machine.put_copy_data(&mut self.buffer_set, data)?;
        if let Err(error) = self.send() {
            self.mark_bad(&error);
            return Err(error);
        }
        Ok(())
    }

    /// Finish `COPY ... FROM STDIN`, or abort it with `error` as the reason.
    ///
    /// Returns the final command result, which is `FatalError` when the
    /// server rejected the data or the COPY was aborted.
    pub fn put_copy_end(&mut self, error: Option<&str>) -> PqResult<PgResult> {
        let mut state_machine = match self.copy.take() {
            Some(sm) if sm.in_copy_in() => sm,
            other => {
                self.copy = other;
                return Err(PqError::InvalidUsage("no COPY FROM STDIN in progress".into()));
            }
        };
        let action = state_machine.put_copy_end(&mut self.buffer_set, error)?;
        if let Err(e) = self.drive(&mut state_machine, action) {
            self.mark_bad(&e);
            return Err(e);
        }
        self.transaction_status = state_machine.transaction_status();
        Ok(state_machine.take_result())
    }

    /// Receive the next row of `COPY ... TO STDOUT`. Blocks until it arrives.
    pub fn get_copy_data(&mut self) -> PqResult<CopyOutput> {
        let mut state_machine = match self.copy.take() {
            Some(sm) if sm.in_copy_out() => sm,
            other => {
                self.copy = other;
                return Err(PqError::InvalidUsage("no COPY TO STDOUT in progress".into()));
            }
        };
        if let Err(e) = self.drive(&mut state_machine, Action::ReadMessage) {
            self.mark_bad(&e);
            return Err(e);
        }
        if let Some(data) = state_machine.take_copy_data() {
            self.copy = Some(state_machine);
            return Ok(CopyOutput::Data(data));
        }
        self.transaction_status = state_machine.transaction_status();
        Ok(CopyOutput::Done(state_machine.take_result()))
    }

    pub fn status(&self) -> ConnStatus {
        if self.stream.is_some() {
            ConnStatus::Ok
        } else {
            ConnStatus::Bad
        }
    }

    /// Database name; the server defaults it to the user name.
    pub fn db(&self) -> &str {
        self.opts.database.as_deref().unwrap_or(&self.opts.user)
    }

    pub fn user(&self) -> &str {
        &self.opts.user
    }

    pub fn password(&self) -> &str {
        self.opts.password.as_deref().unwrap_or("")
    }

    /// Host as given, `localhost` when none was.
    pub fn host(&self) -> &str {
        match self.opts.host.as_str() {
            "" => self.opts.hostaddr.as_deref().unwrap_or("localhost"),
            host => host,
        }
    }

    pub fn port(&self) -> u16 {
        self.opts.port
    }

    pub fn options(&self) -> &str {
        self.opts.options.as_deref().unwrap_or("")
    }

    /// Always empty; the server ignores it since protocol 3.
    pub fn tty(&self) -> &str {
        ""
    }

    pub fn protocol_version(&self) -> i32 {
        if self.stream.is_some() { PROTOCOL_VERSION } else { 0 }
    }

    /// Server version in libpq's integer form, 0 when unknown.
    pub fn server_version(&self) -> i32 {
        self.parameter_status("server_version")
            .map_or(0, parse_server_version)
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Socket descriptor, `None` once the session is bad.
    pub fn socket(&self) -> Option<RawFd> {
        self.stream.as_ref().map(Stream::raw_fd)
    }

    /// Text of the most recent failure, newline-terminated like libpq's.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Value of a parameter the server reported with ParameterStatus.
    pub fn parameter_status(&self, name: &str) -> Option<&str> {
        self.server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Process ID of the backend serving this session, 0 when unknown.
    pub fn backend_pid(&self) -> u32 {
        self.backend_key.as_ref().map_or(0, |k| k.process_id())
    }

    /// Take the notices collected since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Send Terminate and close the socket.
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for PgConn {
    fn drop(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        self.buffer_set.write_buffer.clear();
        write_terminate(&mut self.buffer_set.write_buffer);
        if let Err(e) = stream
            .write_all(&self.buffer_set.write_buffer)
            .and_then(|()| stream.flush())
        {
            tracing::warn!("failed to send Terminate: {}", e);
        }
    }
}

impl std::fmt::Debug for PgConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConn")
            .field("host", &self.host())
            .field("port", &self.opts.port)
            .field("status", &self.status())
            .field("transaction_status", &self.transaction_status)
            .finish_non_exhaustive()
    }
}
