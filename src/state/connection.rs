//! Connection startup and authentication state machine.

use crate::buffer_set::BufferSet;
use crate::opts::{Opts, SslMode};
use crate::pq::error::{PqError, PqResult};
use crate::protocol::backend::{
    AuthenticationMessage, BackendKeyData, ErrorResponse, NegotiateProtocolVersion,
    ReadyForQuery, is_async_type, msg_type,
};
use crate::protocol::frontend::auth::{ScramClient, md5_password};
use crate::protocol::frontend::{
    write_password, write_sasl_initial_response, write_sasl_response, write_ssl_request,
    write_startup,
};
use crate::protocol::types::TransactionStatus;

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// Connection state during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    WaitingSslResponse,
    SslHandshake,
    WaitingAuth,
    SaslInProgress,
    WaitingAuthResult,
    WaitingReady,
    Ready,
    Failed,
}

/// Connection startup state machine.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    options: Opts,
    tls_available: bool,
    backend_key: Option<BackendKeyData>,
    transaction_status: TransactionStatus,
    scram_client: Option<ScramClient>,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    ///
    /// `tls_available` tells whether the caller can perform [`Action::TlsHandshake`].
    pub fn new(options: Opts, tls_available: bool) -> Self {
        Self {
            state: ConnectionState::Initial,
            options,
            tls_available,
            backend_key: None,
            transaction_status: TransactionStatus::Idle,
            scram_client: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Backend key data (process ID and cancel secret).
    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    fn start(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        buffer_set.write_buffer.clear();

        let use_tls = match self.options.ssl_mode {
            SslMode::Disable => false,
            SslMode::Prefer => self.tls_available,
            SslMode::Require | SslMode::VerifyFull => {
                if !self.tls_available {
                    return Err(PqError::Unsupported(
                        "sslmode requires TLS but the sync-tls feature is not enabled".into(),
                    ));
                }
                true
            }
        };

        if use_tls {
            write_ssl_request(&mut buffer_set.write_buffer);
            self.state = ConnectionState::WaitingSslResponse;
            Ok(Action::WriteAndReadByte)
        } else {
            self.write_startup_message(buffer_set);
            self.state = ConnectionState::WaitingAuth;
            Ok(Action::WriteAndReadMessage)
        }
    }

    fn handle_ssl_response(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        match buffer_set.type_byte {
            b'S' => {
                self.state = ConnectionState::SslHandshake;
                Ok(Action::TlsHandshake)
            }
            b'N' => {
                if self.options.ssl_mode != SslMode::Prefer {
                    return Err(PqError::Auth(
                        "server does not support SSL, but SSL was required".into(),
                    ));
                }
                buffer_set.write_buffer.clear();
                self.write_startup_message(buffer_set);
                self.state = ConnectionState::WaitingAuth;
                Ok(Action::WriteAndReadMessage)
            }
            other => Err(PqError::Protocol(format!(
                "received invalid response to SSL negotiation: {}",
                other as char
            ))),
        }
    }

    fn write_startup_message(&self, buffer_set: &mut BufferSet) {
        let mut params: Vec<(&str, &str)> = vec![
            ("user", self.options.user.as_str()),
            ("client_encoding", self.options.client_encoding.as_str()),
        ];
        if let Some(db) = &self.options.database {
            params.push(("database", db.as_str()));
        }
        if let Some(options) = &self.options.options {
            params.push(("options", options.as_str()));
        }
        if let Some(app) = &self.options.application_name {
            params.push(("application_name", app.as_str()));
        }
        write_startup(&mut buffer_set.write_buffer, &params);
    }

    fn password(&self) -> PqResult<&str> {
        self.options
            .password
            .as_deref()
            .ok_or_else(|| PqError::Auth("no password supplied".into()))
    }

    fn handle_auth_message(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        let auth = expect_auth(buffer_set.type_byte, &buffer_set.read_buffer)?;
        buffer_set.write_buffer.clear();

        match auth {
            AuthenticationMessage::Ok => {
                self.state = ConnectionState::WaitingReady;
                Ok(Action::ReadMessage)
            }
            AuthenticationMessage::CleartextPassword => {
                write_password(&mut buffer_set.write_buffer, self.password()?);
                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::Md5Password { salt } => {
                let hashed = md5_password(&self.options.user, self.password()?, &salt);
                write_password(&mut buffer_set.write_buffer, &hashed);
                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                if !mechanisms.contains(&ScramClient::MECHANISM) {
                    return Err(PqError::Auth(format!(
                        "none of the server's SASL authentication mechanisms are supported: {}",
                        mechanisms.join(", ")
                    )));
                }
                let scram = ScramClient::new(self.password()?);
                write_sasl_initial_response(
                    &mut buffer_set.write_buffer,
                    ScramClient::MECHANISM,
                    scram.client_first_message().as_bytes(),
                );
                self.scram_client = Some(scram);
                self.state = ConnectionState::SaslInProgress;
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::SaslContinue { .. } | AuthenticationMessage::SaslFinal { .. } => {
                Err(PqError::Protocol(
                    "SASL message before SASL authentication started".into(),
                ))
            }
            AuthenticationMessage::Other(code) => Err(PqError::Unsupported(format!(
                "authentication method {code} not supported"
            ))),
        }
    }

    fn handle_sasl_message(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        let auth = expect_auth(buffer_set.type_byte, &buffer_set.read_buffer)?;
        let scram = self
            .scram_client
            .as_mut()
            .ok_or_else(|| PqError::Protocol("SCRAM client not initialized".into()))?;

        match auth {
            AuthenticationMessage::SaslContinue { data } => {
                let server_first = simdutf8::compat::from_utf8(data)
                    .map_err(|e| PqError::Auth(format!("invalid server-first-message: {e}")))?;
                let client_final = scram.process_server_first(server_first)?;
                buffer_set.write_buffer.clear();
                write_sasl_response(&mut buffer_set.write_buffer, client_final.as_bytes());
                Ok(Action::WriteAndReadMessage)
            }
            AuthenticationMessage::SaslFinal { data } => {
                let server_final = simdutf8::compat::from_utf8(data)
                    .map_err(|e| PqError::Auth(format!("invalid server-final-message: {e}")))?;
                scram.verify_server_final(server_final)?;
                self.state = ConnectionState::WaitingAuthResult;
                Ok(Action::ReadMessage)
            }
            other => Err(PqError::Protocol(format!(
                "unexpected message during SASL exchange: {other:?}"
            ))),
        }
    }

    fn handle_auth_result(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        match expect_auth(buffer_set.type_byte, &buffer_set.read_buffer)? {
            AuthenticationMessage::Ok => {
                self.state = ConnectionState::WaitingReady;
                Ok(Action::ReadMessage)
            }
            other => Err(PqError::Auth(format!("unexpected auth result: {other:?}"))),
        }
    }

    fn handle_ready_message(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        let payload = &buffer_set.read_buffer;
        match buffer_set.type_byte {
            msg_type::BACKEND_KEY_DATA => {
                self.backend_key = Some(BackendKeyData::parse(payload)?);
                Ok(Action::ReadMessage)
            }
            msg_type::NEGOTIATE_PROTOCOL_VERSION => {
                let negotiate = NegotiateProtocolVersion::parse(payload)?;
                tracing::debug!(
                    "server supports protocol 3.{}, unrecognized options: {:?}",
                    negotiate.newest_minor_version,
                    negotiate.unrecognized_options
                );
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status();
                self.state = ConnectionState::Ready;
                Ok(Action::Finished)
            }
            other => Err(PqError::Protocol(format!(
                "unexpected message during startup: '{}'",
                other as char
            ))),
        }
    }

    fn step_inner(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        match self.state {
            ConnectionState::Initial => return self.start(buffer_set),
            ConnectionState::WaitingSslResponse => return self.handle_ssl_response(buffer_set),
            ConnectionState::SslHandshake => {
                buffer_set.write_buffer.clear();
                self.write_startup_message(buffer_set);
                self.state = ConnectionState::WaitingAuth;
                return Ok(Action::WriteAndReadMessage);
            }
            _ => {}
        }

        let type_byte = buffer_set.type_byte;
        if is_async_type(type_byte) {
            if let Some(msg) = AsyncMessage::parse(type_byte, &buffer_set.read_buffer)? {
                return Ok(Action::HandleAsyncMessageAndReadMessage(msg));
            }
        }
        if type_byte == msg_type::ERROR_RESPONSE {
            return Err(ErrorResponse::parse(&buffer_set.read_buffer)?.into_error());
        }

        match self.state {
            ConnectionState::WaitingAuth => self.handle_auth_message(buffer_set),
            ConnectionState::SaslInProgress => self.handle_sasl_message(buffer_set),
            ConnectionState::WaitingAuthResult => self.handle_auth_result(buffer_set),
            ConnectionState::WaitingReady => self.handle_ready_message(buffer_set),
            state => Err(PqError::Protocol(format!(
                "unexpected message in state {state:?}"
            ))),
        }
    }
}

impl StateMachine for ConnectionStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        let result = self.step_inner(buffer_set);
        if result.is_err() {
            self.state = ConnectionState::Failed;
        }
        result
    }
}

fn expect_auth(type_byte: u8, payload: &[u8]) -> PqResult<AuthenticationMessage<'_>> {
    if type_byte != msg_type::AUTHENTICATION {
        return Err(PqError::Protocol(format!(
            "expected authentication request, got '{}'",
            type_byte as char
        )));
    }
    AuthenticationMessage::parse(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(ssl_mode: SslMode) -> Opts {
        Opts {
            user: "alice".into(),
            password: Some("secret".into()),
            ssl_mode,
            ..Opts::default()
        }
    }

    fn feed(buffer_set: &mut BufferSet, type_byte: u8, payload: &[u8]) {
        buffer_set.type_byte = type_byte;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.extend_from_slice(payload);
    }

    #[test]
    fn cleartext_startup_flow() {
        let mut sm = ConnectionStateMachine::new(opts(SslMode::Disable), false);
        let mut buffers = BufferSet::new();

        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadMessage));
        assert_eq!(sm.state(), ConnectionState::WaitingAuth);

        feed(&mut buffers, b'R', &3_i32.to_be_bytes());
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadMessage));
        assert_eq!(buffers.write_buffer[0], b'p');
        assert!(buffers.write_buffer.ends_with(b"secret\0"));

        feed(&mut buffers, b'R', &0_i32.to_be_bytes());
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadMessage));

        feed(&mut buffers, b'S', b"server_version\x0016.2\0");
        assert!(matches!(
            sm.step(&mut buffers).unwrap(),
            Action::HandleAsyncMessageAndReadMessage(AsyncMessage::ParameterChanged { .. })
        ));

        let mut key = 77_u32.to_be_bytes().to_vec();
        key.extend_from_slice(&5_u32.to_be_bytes());
        feed(&mut buffers, b'K', &key);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadMessage));

        feed(&mut buffers, b'Z', b"I");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));
        assert_eq!(sm.state(), ConnectionState::Ready);
        assert_eq!(sm.backend_key().map(|k| k.process_id()), Some(77));
        assert_eq!(sm.transaction_status(), TransactionStatus::Idle);
    }

    #[test]
    fn missing_password_fails() {
        let mut options = opts(SslMode::Disable);
        options.password = None;
        let mut sm = ConnectionStateMachine::new(options, false);
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();

        feed(&mut buffers, b'R', &3_i32.to_be_bytes());
        assert!(matches!(sm.step(&mut buffers), Err(PqError::Auth(_))));
        assert_eq!(sm.state(), ConnectionState::Failed);
    }

    #[test]
    fn server_error_during_startup() {
        let mut sm = ConnectionStateMachine::new(opts(SslMode::Disable), false);
        let mut buffers = BufferSet::new();
        sm.step(&mut buffers).unwrap();

        feed(
            &mut buffers,
            b'E',
            b"SFATAL\0C3D000\0Mdatabase \"nope\" does not exist\0\0",
        );
        match sm.step(&mut buffers) {
            Err(PqError::Server(fields)) => assert_eq!(fields.code.as_deref(), Some("3D000")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prefer_without_tls_skips_negotiation() {
        let mut sm = ConnectionStateMachine::new(opts(SslMode::Prefer), false);
        let mut buffers = BufferSet::new();
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadMessage));
    }

    #[test]
    fn require_without_tls_is_unsupported() {
        let mut sm = ConnectionStateMachine::new(opts(SslMode::Require), false);
        let mut buffers = BufferSet::new();
        assert!(matches!(sm.step(&mut buffers), Err(PqError::Unsupported(_))));
    }

    #[test]
    fn ssl_refused_falls_back_when_preferred() {
        let mut sm = ConnectionStateMachine::new(opts(SslMode::Prefer), true);
        let mut buffers = BufferSet::new();
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadByte));
        buffers.type_byte = b'N';
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::WriteAndReadMessage));
        assert_eq!(sm.state(), ConnectionState::WaitingAuth);
    }
}
