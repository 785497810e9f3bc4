use auto_impl::auto_impl;

use crate::error::Result;
use crate::opts::TimeZone;
use crate::protocol::command::Column;
use crate::protocol::response::OkPayload;
use crate::row::{BinaryRow, OwnedRow, TextRow, to_owned_row};

/// Event callbacks for text-protocol result sets.
///
/// Multi-resultset responses invoke `resultset_start`/`resultset_end` (or
/// `no_result_set`) once per result set, in order.
#[auto_impl(&mut)]
pub trait TextResultSetHandler {
    fn no_result_set(&mut self, ok: &OkPayload) -> Result<()>;
    fn resultset_start(&mut self, columns: &[Column]) -> Result<()>;
    fn row(&mut self, columns: &[Column], row: TextRow<'_>) -> Result<()>;
    fn resultset_end(&mut self, ok: &OkPayload) -> Result<()>;
}

/// Event callbacks for binary-protocol (prepared statement) result sets.
#[auto_impl(&mut)]
pub trait BinaryResultSetHandler {
    fn no_result_set(&mut self, ok: &OkPayload) -> Result<()>;
    fn resultset_start(&mut self, columns: &[Column]) -> Result<()>;
    fn row(&mut self, columns: &[Column], row: BinaryRow<'_>) -> Result<()>;
    fn resultset_end(&mut self, ok: &OkPayload) -> Result<()>;
}

/// Discards every result.
#[derive(Debug, Default)]
pub struct DropHandler;

impl TextResultSetHandler for DropHandler {
    fn no_result_set(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
    fn resultset_start(&mut self, _: &[Column]) -> Result<()> {
        Ok(())
    }
    fn row(&mut self, _: &[Column], _: TextRow<'_>) -> Result<()> {
        Ok(())
    }
    fn resultset_end(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
}

impl BinaryResultSetHandler for DropHandler {
    fn no_result_set(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
    fn resultset_start(&mut self, _: &[Column]) -> Result<()> {
        Ok(())
    }
    fn row(&mut self, _: &[Column], _: BinaryRow<'_>) -> Result<()> {
        Ok(())
    }
    fn resultset_end(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
}

/// Collects every row of the first result set as [`OwnedRow`]s, applying the
/// connection's `parseTime` contract.
#[derive(Debug)]
pub struct CollectHandler {
    parse_time: bool,
    loc: TimeZone,
    columns_with_alias: bool,
    columns: Vec<Column>,
    rows: Vec<OwnedRow>,
}

impl CollectHandler {
    pub fn new(parse_time: bool, loc: TimeZone) -> Self {
        Self {
            parse_time,
            loc,
            columns_with_alias: false,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Qualify aliased columns as `table.name`.
    pub fn with_column_aliases(mut self, enabled: bool) -> Self {
        self.columns_with_alias = enabled;
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names of the first result set, as presented to callers.
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.display_name(self.columns_with_alias))
            .collect()
    }

    pub fn into_rows(self) -> Vec<OwnedRow> {
        self.rows
    }
}

impl TextResultSetHandler for CollectHandler {
    fn no_result_set(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }

    fn resultset_start(&mut self, columns: &[Column]) -> Result<()> {
        if self.columns.is_empty() {
            self.columns = columns.to_vec();
        }
        Ok(())
    }

    fn row(&mut self, columns: &[Column], row: TextRow<'_>) -> Result<()> {
        use crate::constant::ColumnType;
        use crate::value::{OwnedValue, decode_text_value, parse_text_datetime};

        let raw = row.columns(columns.len())?;
        let mut owned = Vec::with_capacity(columns.len());
        for (value, column) in raw.iter().zip(columns) {
            // Text rows render temporal values as strings; the parseTime
            // contract turns them into native timestamps here.
            let temporal = matches!(
                column.column_type,
                ColumnType::MYSQL_TYPE_DATE
                    | ColumnType::MYSQL_TYPE_NEWDATE
                    | ColumnType::MYSQL_TYPE_DATETIME
                    | ColumnType::MYSQL_TYPE_TIMESTAMP
            );
            if self.parse_time && temporal {
                owned.push(match value {
                    Some(bytes) => match parse_text_datetime(bytes, self.loc) {
                        Some(ts) => OwnedValue::DateTime(ts),
                        None => OwnedValue::Null,
                    },
                    None => OwnedValue::Null,
                });
                continue;
            }
            owned.push(decode_text_value(*value, column).to_owned(self.parse_time, self.loc));
        }
        self.rows.push(owned);
        Ok(())
    }

    fn resultset_end(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
}

impl BinaryResultSetHandler for CollectHandler {
    fn no_result_set(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }

    fn resultset_start(&mut self, columns: &[Column]) -> Result<()> {
        if self.columns.is_empty() {
            self.columns = columns.to_vec();
        }
        Ok(())
    }

    fn row(&mut self, columns: &[Column], row: BinaryRow<'_>) -> Result<()> {
        let values = row.values(columns)?;
        self.rows
            .push(to_owned_row(&values, self.parse_time, self.loc));
        Ok(())
    }

    fn resultset_end(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
}

/// Forwards only the first row to the wrapped handler, dropping the rest.
pub struct FirstRowHandler<'h, H> {
    inner: &'h mut H,
    pub found_row: bool,
}

impl<'h, H> FirstRowHandler<'h, H> {
    pub fn new(inner: &'h mut H) -> Self {
        Self {
            inner,
            found_row: false,
        }
    }
}

impl<H: TextResultSetHandler> TextResultSetHandler for FirstRowHandler<'_, H> {
    fn no_result_set(&mut self, ok: &OkPayload) -> Result<()> {
        self.inner.no_result_set(ok)
    }

    fn resultset_start(&mut self, columns: &[Column]) -> Result<()> {
        self.inner.resultset_start(columns)
    }

    fn row(&mut self, columns: &[Column], row: TextRow<'_>) -> Result<()> {
        if self.found_row {
            return Ok(());
        }
        self.found_row = true;
        self.inner.row(columns, row)
    }

    fn resultset_end(&mut self, ok: &OkPayload) -> Result<()> {
        self.inner.resultset_end(ok)
    }
}

impl<H: BinaryResultSetHandler> BinaryResultSetHandler for FirstRowHandler<'_, H> {
    fn no_result_set(&mut self, ok: &OkPayload) -> Result<()> {
        self.inner.no_result_set(ok)
    }

    fn resultset_start(&mut self, columns: &[Column]) -> Result<()> {
        self.inner.resultset_start(columns)
    }

    fn row(&mut self, columns: &[Column], row: BinaryRow<'_>) -> Result<()> {
        if self.found_row {
            return Ok(());
        }
        self.found_row = true;
        self.inner.row(columns, row)
    }

    fn resultset_end(&mut self, ok: &OkPayload) -> Result<()> {
        self.inner.resultset_end(ok)
    }
}
