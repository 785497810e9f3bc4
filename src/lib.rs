//! A client driver for the MySQL/MariaDB wire protocol.
//!
//! The protocol itself (framing, handshake, authentication, command
//! result sets) is implemented as sans-io state machines under
//! [`protocol`]; the [`sync`] and [`tokio`](crate::tokio) front ends own
//! sockets, buffers, timeouts and the cancellation watcher and drive
//! those machines.

pub mod auth;
mod buffer;
pub mod cancel;
pub mod constant;
pub mod error;
pub mod infile;
mod interpolate;
mod opts;
mod prepared;
pub mod protocol;
pub mod registry;
mod row;
mod value;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use buffer::BufferSet;
pub use cancel::CancelContext;
pub use error::{Error, Result};
pub use interpolate::Interpolation;
pub use opts::{Opts, TimeZone, TlsMode};
pub use prepared::PreparedStatement;
pub use protocol::handler::{
    BinaryResultSetHandler, CollectHandler, DropHandler, TextResultSetHandler,
};
pub use protocol::param::{IntoParam, ParamValue, Params};
pub use row::{BinaryRow, OwnedRow, TextRow};
pub use value::{OwnedValue, Value};
