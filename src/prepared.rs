/// Handle to a server-side prepared statement.
///
/// The definition packets the server sends at prepare time are consumed and
/// discarded; only the statement id and the counts matter to the driver
/// (execute responses carry their own column metadata).
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    statement_id: u32,
    num_params: u16,
    num_columns: u16,
    warning_count: u16,
}

impl PreparedStatement {
    pub(crate) fn new(
        statement_id: u32,
        num_params: u16,
        num_columns: u16,
        warning_count: u16,
    ) -> Self {
        Self {
            statement_id,
            num_params,
            num_columns,
            warning_count,
        }
    }

    pub fn id(&self) -> u32 {
        self.statement_id
    }

    pub fn num_params(&self) -> u16 {
        self.num_params
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns
    }

    /// Warnings the server reported at prepare time.
    pub fn warning_count(&self) -> u16 {
        self.warning_count
    }
}
