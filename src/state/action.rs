//! Action types for state machine I/O requests.

use crate::pq::error::ErrorFields;

/// Action requested by a state machine.
///
/// The caller performs the requested I/O and then calls `step()` again.
#[derive(Debug)]
pub enum Action {
    /// Write `buffer_set.write_buffer` to the server, then read a single byte
    /// into `buffer_set.type_byte`.
    ///
    /// Used for SSL negotiation: write SSL request, then read 'S' or 'N'.
    WriteAndReadByte,

    /// Read a message: type byte into `buffer_set.type_byte`, payload into
    /// `buffer_set.read_buffer`.
    ReadMessage,

    /// Write `buffer_set.write_buffer` to the server, then read a message.
    WriteAndReadMessage,

    /// Perform the TLS handshake on the socket.
    TlsHandshake,

    /// An asynchronous message was received. Handle it, read the next
    /// message, then call `step()` again.
    HandleAsyncMessageAndReadMessage(AsyncMessage),

    /// The state machine has finished.
    Finished,
}

/// Asynchronous message from the server.
///
/// These can arrive at any time, including between the rows of a result.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        channel: String,
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ErrorFields),

    /// Server parameter value changed.
    ParameterChanged { name: String, value: String },
}

impl AsyncMessage {
    /// Parse an asynchronous message of the given type.
    ///
    /// Returns `None` if `type_byte` is not an asynchronous message type.
    pub fn parse(type_byte: u8, payload: &[u8]) -> crate::pq::error::PqResult<Option<Self>> {
        use crate::protocol::backend::{
            NoticeResponse, NotificationResponse, ParameterStatus, msg_type,
        };

        let msg = match type_byte {
            msg_type::NOTICE_RESPONSE => {
                AsyncMessage::Notice(NoticeResponse::parse(payload)?.fields)
            }
            msg_type::PARAMETER_STATUS => {
                let param = ParameterStatus::parse(payload)?;
                AsyncMessage::ParameterChanged {
                    name: param.name.to_string(),
                    value: param.value.to_string(),
                }
            }
            msg_type::NOTIFICATION_RESPONSE => {
                let notification = NotificationResponse::parse(payload)?;
                AsyncMessage::Notification {
                    pid: notification.pid,
                    channel: notification.channel.to_string(),
                    payload: notification.payload.to_string(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}
