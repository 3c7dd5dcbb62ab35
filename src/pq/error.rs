//! Errors raised inside the native client layer.
//!
//! These never reach callers of [`crate::Connection`] directly: the native
//! layer turns them into connection status, error text and result statuses,
//! the same way libpq reports failures.

use thiserror::Error;

/// Result type for native client operations.
pub type PqResult<T> = core::result::Result<T, PqError>;

/// PostgreSQL error/notice fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Severity, preferring the non-localized form.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }

    /// Format the fields the way libpq's default message verbosity does.
    ///
    /// ```text
    /// ERROR:  relation "t" does not exist
    /// DETAIL:  ...
    /// HINT:  ...
    /// ```
    pub fn to_message(&self) -> String {
        let mut out = String::new();
        if let Some(severity) = &self.severity {
            out.push_str(severity);
            out.push_str(":  ");
        }
        if let Some(message) = &self.message {
            out.push_str(message);
        }
        out.push('\n');
        if let Some(detail) = &self.detail {
            out.push_str("DETAIL:  ");
            out.push_str(detail);
            out.push('\n');
        }
        if let Some(hint) = &self.hint {
            out.push_str("HINT:  ");
            out.push_str(hint);
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Native client layer error.
#[derive(Debug, Error)]
pub enum PqError {
    /// Server error response
    #[error("{0}")]
    Server(ErrorFields),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// TLS error
    #[cfg(feature = "sync-tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Invalid connection-info string or option value
    #[error("invalid connection option: {0}")]
    ConnInfo(String),

    /// Invalid usage of the native layer (wrong state, mismatched arrays)
    #[error("{0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Cell contents that do not follow their encoding
    #[error("invalid {0}")]
    Decode(String),
}

impl PqError {
    /// Returns true if the session cannot be used after this error.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            PqError::Io(_) | PqError::Protocol(_) => true,
            PqError::Server(fields) => matches!(fields.severity(), Some("FATAL") | Some("PANIC")),
            _ => false,
        }
    }

    /// Text used for the connection's error message.
    pub fn to_message(&self) -> String {
        match self {
            PqError::Server(fields) => fields.to_message(),
            PqError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                "server closed the connection unexpectedly\n".to_string()
            }
            other => format!("{}\n", other),
        }
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for PqError
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        PqError::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_libpq_shaped() {
        let fields = ErrorFields {
            severity: Some("ERROR".into()),
            message: Some("relation \"nope\" does not exist".into()),
            hint: Some("check the name".into()),
            ..Default::default()
        };
        assert_eq!(
            fields.to_message(),
            "ERROR:  relation \"nope\" does not exist\nHINT:  check the name\n"
        );
    }

    #[test]
    fn fatal_severity_breaks_connection() {
        let fields = ErrorFields {
            severity_non_localized: Some("FATAL".into()),
            ..Default::default()
        };
        assert!(PqError::Server(fields).is_connection_broken());
        assert!(!PqError::InvalidUsage("x".into()).is_connection_broken());
    }
}
