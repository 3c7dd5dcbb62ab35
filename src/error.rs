//! Error types for zero-pq.
//!
//! Every variant but [`Error::Memory`] and [`Error::Type`] belongs to the
//! database-error family; see [`Error::is_database_error`].

use thiserror::Error;

use crate::pq::{ExecStatus, PgResult};

/// Result type for zero-pq operations.
pub type Result<T> = core::result::Result<T, Error>;

/// SQLSTATE of `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Message fragments the server uses for referential-integrity failures.
const INTEGRITY_MARKERS: [&str; 2] = ["foreign key constraint", "referential integrity"];

/// Error type for zero-pq.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Misuse of the binding itself, independent of the database
    #[error("interface error: {0}")]
    Interface(String),

    /// Operation on a closed connection or cursor, a placeholder mismatch, or
    /// a non-fatal server error
    #[error("{0}")]
    Programming(String),

    /// Connect failure, execute without any result, or a fatal server error
    #[error("{0}")]
    Operational(String),

    /// Referential-integrity violation reported by the server
    #[error("{0}")]
    Integrity(String),

    /// Cell contents that could not be decoded
    #[error("{0}")]
    Data(String),

    /// Operation the binding does not support
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A result status that classification does not know what to do with
    #[error("internal error: {0}")]
    Internal(String),

    /// Native handle allocation failure
    #[error("out of memory: {0}")]
    Memory(String),

    /// A value that cannot be sent as a parameter, or converted from a cell
    #[error("type error: {0}")]
    Type(String),
}

/// Kind of an [`Error`], without its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Interface,
    Programming,
    Operational,
    Integrity,
    Data,
    NotSupported,
    Internal,
    Memory,
    Type,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Interface(_) => ErrorKind::Interface,
            Error::Programming(_) => ErrorKind::Programming,
            Error::Operational(_) => ErrorKind::Operational,
            Error::Integrity(_) => ErrorKind::Integrity,
            Error::Data(_) => ErrorKind::Data,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Memory(_) => ErrorKind::Memory,
            Error::Type(_) => ErrorKind::Type,
        }
    }

    /// Returns true for anything the database or the session raised.
    pub fn is_database_error(&self) -> bool {
        !matches!(self, Error::Memory(_) | Error::Type(_))
    }

    /// Error text without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Interface(m)
            | Error::Programming(m)
            | Error::Operational(m)
            | Error::Integrity(m)
            | Error::Data(m)
            | Error::NotSupported(m)
            | Error::Internal(m)
            | Error::Memory(m)
            | Error::Type(m) => m,
        }
    }

    pub(crate) fn not_open() -> Self {
        Error::Programming("Database connection not open".into())
    }
}

fn is_integrity_violation(result: &PgResult) -> bool {
    if result.sql_state() == Some(FOREIGN_KEY_VIOLATION) {
        return true;
    }
    let message = result.error_message();
    INTEGRITY_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Turn a result that did not succeed into an error.
///
/// `connection_error` is the session's own error text, used when the result
/// carries none.
pub fn classify_failure(result: &PgResult, connection_error: &str) -> Error {
    let message = match result.error_message() {
        "" => connection_error,
        message => message,
    }
    .trim_end()
    .to_string();

    match result.status() {
        ExecStatus::NonFatalError => Error::Programming(message),
        ExecStatus::FatalError if is_integrity_violation(result) => Error::Integrity(message),
        ExecStatus::FatalError => Error::Operational(message),
        status => Error::Internal(format!("unexpected result status {}", status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::ErrorFields;

    fn failed(code: &str, message: &str) -> PgResult {
        PgResult::from_error(ErrorFields {
            severity: Some("ERROR".into()),
            code: Some(code.into()),
            message: Some(message.into()),
            ..Default::default()
        })
    }

    #[test]
    fn foreign_key_is_integrity() {
        let result = failed(
            "23503",
            "insert or update on table \"child\" violates foreign key constraint \"child_p_fkey\"",
        );
        let error = classify_failure(&result, "");
        assert_eq!(error.kind(), ErrorKind::Integrity);
        assert!(error.message().contains("violates foreign key constraint"));
    }

    #[test]
    fn integrity_marker_without_sqlstate() {
        let result = failed("XX000", "referential integrity query gave unexpected result");
        assert_eq!(classify_failure(&result, "").kind(), ErrorKind::Integrity);
    }

    #[test]
    fn other_fatal_is_operational() {
        let result = failed("42P01", "relation \"nope\" does not exist");
        let error = classify_failure(&result, "");
        assert_eq!(error.kind(), ErrorKind::Operational);
        assert_eq!(error.to_string(), "ERROR:  relation \"nope\" does not exist");
    }

    #[test]
    fn non_fatal_is_programming() {
        let mut result = failed("01000", "escalated warning");
        result.set_status(ExecStatus::NonFatalError);
        assert_eq!(classify_failure(&result, "").kind(), ErrorKind::Programming);
    }

    #[test]
    fn successful_status_is_internal() {
        for status in [ExecStatus::TuplesOk, ExecStatus::BadResponse] {
            let error = classify_failure(&PgResult::new(status), "");
            assert_eq!(error.kind(), ErrorKind::Internal);
        }
    }

    #[test]
    fn connection_text_fills_in() {
        let result = PgResult::new(ExecStatus::FatalError);
        let error = classify_failure(&result, "server closed the connection unexpectedly\n");
        assert_eq!(error.message(), "server closed the connection unexpectedly");
    }

    #[test]
    fn database_family() {
        assert!(Error::not_open().is_database_error());
        assert!(Error::Data("x".into()).is_database_error());
        assert!(!Error::Memory("x".into()).is_database_error());
        assert!(!Error::Type("x".into()).is_database_error());
    }
}
