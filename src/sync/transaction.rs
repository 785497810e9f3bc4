use crate::error::{Error, Result};

use super::conn::Conn;

/// Token for an open transaction, handed to the closure of
/// [`Conn::run_transaction`]. Committing or rolling back consumes it; a
/// transaction left open when the closure returns is rolled back.
pub struct Transaction {
    connection_id: u32,
}

impl Transaction {
    pub(crate) fn new(connection_id: u32) -> Self {
        Self { connection_id }
    }

    fn check_conn(&self, conn: &Conn) -> Result<()> {
        if conn.connection_id() != self.connection_id {
            return Err(Error::ConnectionMismatch {
                expected: self.connection_id,
                actual: conn.connection_id(),
            });
        }
        Ok(())
    }

    pub fn commit(self, conn: &mut Conn) -> Result<()> {
        self.check_conn(conn)?;
        conn.query_drop("COMMIT")?;
        conn.set_in_transaction(false);
        Ok(())
    }

    pub fn rollback(self, conn: &mut Conn) -> Result<()> {
        self.check_conn(conn)?;
        conn.query_drop("ROLLBACK")?;
        conn.set_in_transaction(false);
        Ok(())
    }
}
