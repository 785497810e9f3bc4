//! Blocking front end: socket ownership, framing, timeouts, the
//! cancellation watcher, and the [`Conn`] command surface.

mod conn;
mod stream;
mod transaction;
mod transport;
mod watcher;

pub use conn::{Conn, ServerWarning};
pub use stream::Stream;
pub use transaction::Transaction;
