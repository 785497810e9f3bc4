use crate::error::{Error, Result};

use super::conn::Conn;

/// Token for an open transaction on an async connection. Committing or
/// rolling back consumes it.
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

    pub async fn commit(self, conn: &mut Conn) -> Result<()> {
        self.check_conn(conn)?;
        conn.query_drop("COMMIT").await?;
        conn.set_in_transaction(false);
        Ok(())
    }

    pub async fn rollback(self, conn: &mut Conn) -> Result<()> {
        self.check_conn(conn)?;
        conn.query_drop("ROLLBACK").await?;
        conn.set_in_transaction(false);
        Ok(())
    }
}
