//! Tokio facade over the blocking [`Connection`](crate::Connection).

mod conn;

pub use conn::AsyncConnection;
