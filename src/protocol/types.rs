//! Common PostgreSQL wire protocol types.

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// The OID the server uses for "no OID".
pub const INVALID_OID: Oid = 0;

/// Built-in type OIDs (from `pg_type.dat`).
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const UNKNOWN: Oid = 705;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const INTERVAL: Oid = 1186;
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;
    pub const JSONB: Oid = 3802;
    pub const INT4_ARRAY: Oid = 1007;
    pub const TEXT_ARRAY: Oid = 1009;
}

/// Data format code in PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u16)]
pub enum FormatCode {
    /// Text format (human-readable)
    #[default]
    Text = 0,
    /// Binary format (type-specific packed representation)
    Binary = 1,
}

impl FormatCode {
    /// Create a FormatCode from a raw u16 value.
    ///
    /// Unknown values map to text, matching how the server treats them.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => FormatCode::Binary,
            _ => FormatCode::Text,
        }
    }

    /// Wire value of this format code.
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl From<u16> for FormatCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

/// Transaction status of a session.
///
/// `Idle`, `InTransaction` and `InError` come from the ReadyForQuery status
/// byte. `Active` is reported while a command (or a COPY) is in progress and
/// `Unknown` once the session is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TransactionStatus {
    /// Idle (not in transaction block)
    #[default]
    Idle,
    /// A command is in progress
    Active,
    /// In transaction block
    InTransaction,
    /// In failed transaction block (queries will be rejected until rollback)
    InError,
    /// Bad connection
    Unknown,
}

impl TransactionStatus {
    /// Create a TransactionStatus from a ReadyForQuery status byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::InError),
            _ => None,
        }
    }

    /// Returns true if currently in a transaction block (either active or failed).
    pub fn in_transaction(self) -> bool {
        matches!(
            self,
            TransactionStatus::InTransaction | TransactionStatus::InError
        )
    }

    /// Symbolic name, as exposed by the binding.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Idle => "IDLE",
            TransactionStatus::Active => "ACTIVE",
            TransactionStatus::InTransaction => "INTRANS",
            TransactionStatus::InError => "INERROR",
            TransactionStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_status_bytes() {
        assert_eq!(TransactionStatus::from_byte(b'I'), Some(TransactionStatus::Idle));
        assert_eq!(
            TransactionStatus::from_byte(b'E'),
            Some(TransactionStatus::InError)
        );
        assert_eq!(TransactionStatus::from_byte(b'?'), None);
        assert!(TransactionStatus::InError.in_transaction());
        assert!(!TransactionStatus::Active.in_transaction());
    }

    #[test]
    fn unknown_format_is_text() {
        assert_eq!(FormatCode::from_u16(7), FormatCode::Text);
        assert_eq!(FormatCode::Binary.as_i16(), 1);
    }
}
