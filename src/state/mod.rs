//! Sans-I/O state machines for PostgreSQL protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod connection;
pub mod exec;

pub use action::{Action, AsyncMessage};
pub use connection::{ConnectionState, ConnectionStateMachine};
pub use exec::ExecStateMachine;

use crate::buffer_set::BufferSet;
use crate::pq::error::PqResult;

/// A protocol state machine driven by a blocking I/O loop.
pub trait StateMachine {
    /// Advance the machine using the message in `buffer_set`.
    ///
    /// The startup machine's first call happens before anything was read and
    /// produces the initial request.
    fn step(&mut self, buffer_set: &mut BufferSet) -> PqResult<Action>;
}
