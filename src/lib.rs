//! A libpq-style PostgreSQL client.
//!
//! The crate has two layers:
//!
//! - [`pq`]: the native client. A blocking [`PgConn`](pq::PgConn) session and
//!   a fully buffered [`PgResult`](pq::PgResult), driven by sans-I/O protocol
//!   state machines ([`state`]).
//! - The binding on top: [`Connection`], [`QueryResult`] with its
//!   classification ([`Outcome`]) and lazily decoded [`Row`]s, parameter
//!   binding ([`ToParams`]) and the [`Error`] taxonomy.
//!
//! # Example
//!
//! ```no_run
//! use zero_pq::{Connection, Outcome};
//!
//! fn main() -> zero_pq::Result<()> {
//!     let conn = Connection::open("host=localhost dbname=postgres user=postgres")?;
//!
//!     let result = conn.execute("SELECT $1::int + 1 AS x", &(41,))?;
//!     assert_eq!(result.outcome(), Outcome::Query);
//!     for row in result {
//!         let x: i32 = row?.get(0)?;
//!         println!("x = {}", x);
//!     }
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```

pub mod buffer_set;
pub mod column;
mod connection;
pub mod cursor;
pub mod error;
pub mod opts;
pub mod params;
pub mod placeholder;
pub mod pq;
pub mod protocol;
pub mod result;
pub mod state;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use column::{Cell, Column, FromCell, Interval, Row};
pub use connection::{Connection, CopyOut, MIN_PROTOCOL_VERSION};
pub use cursor::Cursor;
pub use error::{Error, ErrorKind, Result};
pub use opts::{Opts, SslMode};
pub use params::{Param, ToParam, ToParams, TypeMap};
pub use placeholder::NamedParams;
pub use protocol::types::{FormatCode, Oid, TransactionStatus, oid};
pub use result::{Outcome, QueryResult};
