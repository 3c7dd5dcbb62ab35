//! Native client layer, shaped after libpq.
//!
//! [`PgConn`] is a blocking session and [`PgResult`] a fully buffered,
//! columnar result. Failures are reported the way libpq reports them: as
//! connection status, error text and result status, never as panics.

pub mod bytea;
pub mod conn;
pub mod error;
pub mod result;
pub mod stream;

pub use bytea::{escape_bytea, unescape_bytea};
pub use conn::{ConnStatus, CopyOutput, MAX_PARAMS, PROTOCOL_VERSION, PgConn};
pub use error::{ErrorFields, PqError, PqResult};
pub use result::{ExecStatus, FieldInfo, PgResult};
