//! Parameterized execution state machine.
//!
//! One request is Parse, Bind, Describe (portal), Execute and Sync on the
//! unnamed statement and portal. The machine collects everything the server
//! sends back into one [`PgResult`], and handles the COPY sub-protocol when
//! the statement turns out to be `COPY ... FROM STDIN` or `COPY ... TO STDOUT`.

use crate::buffer_set::BufferSet;
use crate::pq::error::{PqError, PqResult};
use crate::pq::result::{ExecStatus, PgResult};
use crate::protocol::backend::{
    CommandComplete, CopyResponse, DataRow, ErrorResponse, ReadyForQuery, RowDescription,
    is_async_type, msg_type,
};
use crate::protocol::frontend::{
    write_bind, write_copy_data, write_copy_done, write_copy_fail, write_describe_portal,
    write_execute, write_parse, write_sync,
};
use crate::protocol::types::{FormatCode, Oid, TransactionStatus};

use super::StateMachine;
use super::action::{Action, AsyncMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingParse,
    WaitingBind,
    WaitingDescribe,
    ProcessingRows,
    CopyIn,
    CopyOut,
    WaitingCopyComplete,
    WaitingReady,
    Finished,
}

/// Extended-protocol execution of one statement.
#[derive(Debug)]
pub struct ExecStateMachine {
    state: State,
    result: PgResult,
    described: bool,
    copy_data: Option<Vec<u8>>,
    transaction_status: TransactionStatus,
}

impl Default for ExecStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecStateMachine {
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            result: PgResult::new(ExecStatus::CommandOk),
            described: false,
            copy_data: None,
            transaction_status: TransactionStatus::Unknown,
        }
    }

    /// Write the whole request and return the first action.
    ///
    /// `param_types`, `values` and `formats` are parallel arrays of equal length.
    pub fn start(
        &mut self,
        buffer_set: &mut BufferSet,
        query: &str,
        param_types: &[Oid],
        values: &[Option<&[u8]>],
        formats: &[FormatCode],
        result_format: FormatCode,
    ) -> Action {
        buffer_set.write_buffer.clear();
        write_parse(&mut buffer_set.write_buffer, query, param_types);
        write_bind(&mut buffer_set.write_buffer, values, formats, result_format);
        write_describe_portal(&mut buffer_set.write_buffer);
        write_execute(&mut buffer_set.write_buffer);
        write_sync(&mut buffer_set.write_buffer);
        self.state = State::WaitingParse;
        Action::WriteAndReadMessage
    }

    /// True once ReadyForQuery was received.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// True while the server waits for COPY data from us.
    pub fn in_copy_in(&self) -> bool {
        self.state == State::CopyIn
    }

    /// True while the server streams COPY data to us.
    pub fn in_copy_out(&self) -> bool {
        self.state == State::CopyOut
    }

    /// Transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Snapshot of the result collected so far.
    ///
    /// At a COPY transition this is the `CopyIn`/`CopyOut` result.
    pub fn result(&self) -> &PgResult {
        &self.result
    }

    /// Take the result once the machine has finished.
    pub fn take_result(&mut self) -> PgResult {
        std::mem::replace(&mut self.result, PgResult::new(ExecStatus::CommandOk))
    }

    /// COPY OUT row received by the last step.
    pub fn take_copy_data(&mut self) -> Option<Vec<u8>> {
        self.copy_data.take()
    }

    /// Encode one CopyData message into the write buffer.
    ///
    /// The server sends nothing back; the caller only writes the buffer.
    pub fn put_copy_data(&mut self, buffer_set: &mut BufferSet, data: &[u8]) -> PqResult<()> {
        self.expect_copy_in()?;
        buffer_set.write_buffer.clear();
        write_copy_data(&mut buffer_set.write_buffer, data);
        Ok(())
    }

    /// End COPY IN: CopyDone, or CopyFail when `error` is given, then Sync.
    pub fn put_copy_end(
        &mut self,
        buffer_set: &mut BufferSet,
        error: Option<&str>,
    ) -> PqResult<Action> {
        self.expect_copy_in()?;
        buffer_set.write_buffer.clear();
        match error {
            Some(reason) => write_copy_fail(&mut buffer_set.write_buffer, reason),
            None => write_copy_done(&mut buffer_set.write_buffer),
        }
        // Sync messages sent before COPY IN started were ignored by the server
        write_sync(&mut buffer_set.write_buffer);
        self.result = PgResult::new(ExecStatus::CommandOk);
        self.state = State::WaitingCopyComplete;
        Ok(Action::WriteAndReadMessage)
    }

    fn expect_copy_in(&self) -> PqResult<()> {
        if self.state != State::CopyIn {
            return Err(PqError::InvalidUsage("no COPY FROM STDIN in progress".into()));
        }
        Ok(())
    }

    fn unexpected(&self, type_byte: u8) -> PqError {
        PqError::Protocol(format!(
            "unexpected message '{}' in state {:?}",
            type_byte as char, self.state
        ))
    }

    fn handle_rows(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        let payload = &buffer_set.read_buffer;
        match buffer_set.type_byte {
            msg_type::DATA_ROW => {
                let row = DataRow::parse(payload)?;
                self.result.push_row(&row.values()?)?;
                Ok(Action::ReadMessage)
            }
            msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(payload)?;
                self.result.set_cmd_status(complete.tag);
                self.result.set_status(if self.described {
                    ExecStatus::TuplesOk
                } else {
                    ExecStatus::CommandOk
                });
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            msg_type::EMPTY_QUERY_RESPONSE => {
                self.result.set_status(ExecStatus::EmptyQuery);
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            msg_type::COPY_IN_RESPONSE => {
                let copy = CopyResponse::parse(payload)?;
                tracing::debug!("COPY IN started, {} columns", copy.column_formats.len());
                self.result.set_status(ExecStatus::CopyIn);
                self.state = State::CopyIn;
                Ok(Action::Finished)
            }
            msg_type::COPY_OUT_RESPONSE => {
                let copy = CopyResponse::parse(payload)?;
                tracing::debug!("COPY OUT started, {} columns", copy.column_formats.len());
                self.result.set_status(ExecStatus::CopyOut);
                self.state = State::CopyOut;
                Ok(Action::Finished)
            }
            msg_type::COPY_BOTH_RESPONSE => Err(PqError::Unsupported(
                "COPY BOTH (replication) is not supported".into(),
            )),
            other => Err(self.unexpected(other)),
        }
    }

    fn handle_copy_out(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        match buffer_set.type_byte {
            msg_type::COPY_DATA => {
                self.copy_data = Some(buffer_set.read_buffer.clone());
                Ok(Action::Finished)
            }
            msg_type::COPY_DONE => Ok(Action::ReadMessage),
            msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(&buffer_set.read_buffer)?;
                self.result = PgResult::new(ExecStatus::CommandOk);
                self.result.set_cmd_status(complete.tag);
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            other => Err(self.unexpected(other)),
        }
    }

    fn step_inner(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        let type_byte = buffer_set.type_byte;

        if is_async_type(type_byte) {
            if let Some(msg) = AsyncMessage::parse(type_byte, &buffer_set.read_buffer)? {
                return Ok(Action::HandleAsyncMessageAndReadMessage(msg));
            }
        }

        // The server skips to Sync after an error; keep reading until ReadyForQuery.
        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            self.result = PgResult::from_error(error.fields);
            self.state = State::WaitingReady;
            return Ok(Action::ReadMessage);
        }

        match self.state {
            State::WaitingParse if type_byte == msg_type::PARSE_COMPLETE => {
                self.state = State::WaitingBind;
                Ok(Action::ReadMessage)
            }
            State::WaitingBind if type_byte == msg_type::BIND_COMPLETE => {
                self.state = State::WaitingDescribe;
                Ok(Action::ReadMessage)
            }
            State::WaitingDescribe if type_byte == msg_type::ROW_DESCRIPTION => {
                let desc = RowDescription::parse(&buffer_set.read_buffer)?;
                self.result.set_row_description(&desc)?;
                self.described = true;
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            State::WaitingDescribe if type_byte == msg_type::NO_DATA => {
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            State::ProcessingRows => self.handle_rows(buffer_set),
            State::CopyOut => self.handle_copy_out(buffer_set),
            State::WaitingCopyComplete if type_byte == msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(&buffer_set.read_buffer)?;
                self.result.set_cmd_status(complete.tag);
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            State::WaitingReady if type_byte == msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(&buffer_set.read_buffer)?;
                self.transaction_status = ready.transaction_status();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            _ => Err(self.unexpected(type_byte)),
        }
    }
}

impl StateMachine for ExecStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action> {
        self.step_inner(buffer_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(sm: &mut ExecStateMachine, buffers: &mut BufferSet, type_byte: u8, payload: &[u8]) -> Action {
        buffers.type_byte = type_byte;
        buffers.read_buffer.clear();
        buffers.read_buffer.extend_from_slice(payload);
        sm.step(buffers).unwrap()
    }

    fn started(buffers: &mut BufferSet) -> ExecStateMachine {
        let mut sm = ExecStateMachine::new();
        let action = sm.start(buffers, "SELECT 1 AS x", &[], &[], &[], FormatCode::Text);
        assert!(matches!(action, Action::WriteAndReadMessage));
        assert_eq!(buffers.write_buffer[0], b'P');
        sm
    }

    fn row_description_x() -> Vec<u8> {
        let mut payload = 1_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"x\0");
        payload.extend_from_slice(&0_u32.to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        payload.extend_from_slice(&23_u32.to_be_bytes());
        payload.extend_from_slice(&4_i16.to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_u16.to_be_bytes());
        payload
    }

    #[test]
    fn select_collects_rows() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);

        feed(&mut sm, &mut buffers, b'1', b"");
        feed(&mut sm, &mut buffers, b'2', b"");
        feed(&mut sm, &mut buffers, b'T', &row_description_x());
        let mut row = 1_u16.to_be_bytes().to_vec();
        row.extend_from_slice(&1_i32.to_be_bytes());
        row.push(b'1');
        feed(&mut sm, &mut buffers, b'D', &row);
        let action = feed(&mut sm, &mut buffers, b'N', b"SNOTICE\0Mhello\0\0");
        assert!(matches!(
            action,
            Action::HandleAsyncMessageAndReadMessage(AsyncMessage::Notice(_))
        ));
        feed(&mut sm, &mut buffers, b'C', b"SELECT 1\0");
        let action = feed(&mut sm, &mut buffers, b'Z', b"I");
        assert!(matches!(action, Action::Finished));
        assert!(sm.is_finished());
        assert_eq!(sm.transaction_status(), TransactionStatus::Idle);

        let result = sm.take_result();
        assert_eq!(result.status(), ExecStatus::TuplesOk);
        assert_eq!(result.ntuples(), 1);
        assert_eq!(result.fields()[0].name, "x");
        assert_eq!(result.get_value(0, 0), Some(&b"1"[..]));
        assert_eq!(result.cmd_status(), "SELECT 1");
    }

    #[test]
    fn command_without_rows() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);
        feed(&mut sm, &mut buffers, b'1', b"");
        feed(&mut sm, &mut buffers, b'2', b"");
        feed(&mut sm, &mut buffers, b'n', b"");
        feed(&mut sm, &mut buffers, b'C', b"CREATE TABLE\0");
        feed(&mut sm, &mut buffers, b'Z', b"T");
        let result = sm.take_result();
        assert_eq!(result.status(), ExecStatus::CommandOk);
        assert_eq!(result.cmd_tuples(), "");
        assert_eq!(sm.transaction_status(), TransactionStatus::InTransaction);
    }

    #[test]
    fn empty_query() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);
        feed(&mut sm, &mut buffers, b'1', b"");
        feed(&mut sm, &mut buffers, b'2', b"");
        feed(&mut sm, &mut buffers, b'n', b"");
        feed(&mut sm, &mut buffers, b'I', b"");
        feed(&mut sm, &mut buffers, b'Z', b"I");
        assert_eq!(sm.take_result().status(), ExecStatus::EmptyQuery);
    }

    #[test]
    fn error_waits_for_ready() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);
        let action = feed(
            &mut sm,
            &mut buffers,
            b'E',
            b"SERROR\0C42601\0Msyntax error at or near \"SELEC\"\0\0",
        );
        assert!(matches!(action, Action::ReadMessage));
        assert!(!sm.is_finished());
        feed(&mut sm, &mut buffers, b'Z', b"I");
        let result = sm.take_result();
        assert_eq!(result.status(), ExecStatus::FatalError);
        assert_eq!(result.sql_state(), Some("42601"));
    }

    #[test]
    fn copy_out_flow() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);
        feed(&mut sm, &mut buffers, b'1', b"");
        feed(&mut sm, &mut buffers, b'2', b"");
        feed(&mut sm, &mut buffers, b'n', b"");
        let action = feed(&mut sm, &mut buffers, b'H', &[0, 0, 1, 0, 0]);
        assert!(matches!(action, Action::Finished));
        assert!(sm.in_copy_out());
        assert_eq!(sm.result().status(), ExecStatus::CopyOut);

        let action = feed(&mut sm, &mut buffers, b'd', b"1\n");
        assert!(matches!(action, Action::Finished));
        assert_eq!(sm.take_copy_data().as_deref(), Some(&b"1\n"[..]));

        feed(&mut sm, &mut buffers, b'c', b"");
        feed(&mut sm, &mut buffers, b'C', b"COPY 1\0");
        feed(&mut sm, &mut buffers, b'Z', b"I");
        assert!(sm.is_finished());
        assert_eq!(sm.take_copy_data(), None);
        assert_eq!(sm.take_result().cmd_tuples(), "1");
    }

    #[test]
    fn copy_in_flow() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);
        feed(&mut sm, &mut buffers, b'1', b"");
        feed(&mut sm, &mut buffers, b'2', b"");
        feed(&mut sm, &mut buffers, b'n', b"");
        feed(&mut sm, &mut buffers, b'G', &[0, 0, 1, 0, 0]);
        assert!(sm.in_copy_in());

        sm.put_copy_data(&mut buffers, b"7\n").unwrap();
        assert_eq!(buffers.write_buffer[0], b'd');
        let action = sm.put_copy_end(&mut buffers, None).unwrap();
        assert!(matches!(action, Action::WriteAndReadMessage));
        assert_eq!(buffers.write_buffer[0], b'c');
        assert_eq!(buffers.write_buffer[5], b'S');

        feed(&mut sm, &mut buffers, b'C', b"COPY 1\0");
        feed(&mut sm, &mut buffers, b'Z', b"I");
        let result = sm.take_result();
        assert_eq!(result.status(), ExecStatus::CommandOk);
        assert_eq!(result.cmd_status(), "COPY 1");
        assert!(sm.put_copy_data(&mut buffers, b"x").is_err());
    }

    #[test]
    fn unexpected_message_is_protocol_error() {
        let mut buffers = BufferSet::new();
        let mut sm = started(&mut buffers);
        buffers.type_byte = b'D';
        buffers.read_buffer.clear();
        assert!(matches!(sm.step(&mut buffers), Err(PqError::Protocol(_))));
    }
}
