//! Sans-io protocol core: codecs, packets, responses, and the handshake
//! and command state machines.

pub mod command;
pub mod compress;
pub mod connection;
pub mod datetime;
pub mod handler;
pub mod packet;
pub mod param;
pub mod primitive;
pub mod response;

pub use command::{Action, Column};
pub use response::{ErrPayload, OkPayload};
