//! Async (tokio) front end. Shares the sans-io protocol core with
//! [`sync`](crate::sync); deadlines and cancellation compose around each
//! socket operation instead of going through a watcher thread, with the
//! same observable semantics: a canceled command unblocks at its next
//! suspension point and poisons the connection.

mod conn;
mod stream;
mod transaction;
mod transport;

pub use conn::Conn;
pub use stream::Stream;
pub use transaction::Transaction;
