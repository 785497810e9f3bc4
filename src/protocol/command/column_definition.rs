use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Column definition (Protocol::ColumnDefinition41), copied out of the read
/// buffer because it outlives the next read.
#[derive(Debug, Clone)]
pub struct Column {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl Column {
    /// Name presented to callers: with `columnsWithAlias`, aliased columns
    /// are qualified as `table.name`.
    pub fn display_name(&self, columns_with_alias: bool) -> String {
        if columns_with_alias && !self.table.is_empty() && self.name != self.org_name {
            format!("{}.{}", self.table, self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Read one column definition packet.
///
/// Layout (all strings length-encoded):
/// ```text
/// catalog, schema, table, org_table, name, org_name,
/// length of fixed fields (0x0c),
/// 2  character set
/// 4  maximum column length
/// 1  type
/// 2  flags
/// 1  decimals
/// 2  filler
/// ```
pub fn read_column_definition(payload: &[u8]) -> Result<Column> {
    let (catalog, data) = read_string_lenenc(payload)?;
    let catalog = String::from_utf8_lossy(catalog).to_string();

    let (schema, data) = read_string_lenenc(data)?;
    let schema = String::from_utf8_lossy(schema).to_string();

    let (table, data) = read_string_lenenc(data)?;
    let table = String::from_utf8_lossy(table).to_string();

    let (org_table, data) = read_string_lenenc(data)?;
    let org_table = String::from_utf8_lossy(org_table).to_string();

    let (name, data) = read_string_lenenc(data)?;
    let name = String::from_utf8_lossy(name).to_string();

    let (org_name, data) = read_string_lenenc(data)?;
    let org_name = String::from_utf8_lossy(org_name).to_string();

    let (_fixed_len, data) = read_int_lenenc(data)?;
    let (charset, data) = read_int_2(data)?;
    let (column_length, data) = read_int_4(data)?;
    let (type_byte, data) = read_int_1(data)?;
    let column_type = ColumnType::from_u8(type_byte).ok_or(Error::MalformedPacket)?;
    let (flags, data) = read_int_2(data)?;
    let (decimals, _data) = read_int_1(data)?;

    Ok(Column {
        catalog,
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        column_length,
        column_type,
        flags: ColumnFlags::from_bits_truncate(flags),
        decimals,
    })
}

/// Parse the column-definition packets a transport collected as
/// `[4-byte native length][payload]...` into owned columns.
pub fn parse_column_buffer(buffer: &[u8], num_columns: usize) -> Result<Vec<Column>> {
    let mut columns = Vec::with_capacity(num_columns);
    let mut data = buffer;
    for _ in 0..num_columns {
        if data.len() < 4 {
            return Err(Error::UnexpectedEof);
        }
        let len = u32::from_ne_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let (payload, rest) = read_string_fix(&data[4..], len)?;
        columns.push(read_column_definition(payload)?);
        data = rest;
    }
    Ok(columns)
}

/// Encode a column definition packet; test scaffolding for the fake server
/// and the state-machine tests.
#[cfg(test)]
pub(crate) fn encode_column_definition(column: &Column) -> Vec<u8> {
    let mut out = Vec::new();
    for s in [
        &column.catalog,
        &column.schema,
        &column.table,
        &column.org_table,
        &column.name,
        &column.org_name,
    ] {
        write_string_lenenc(&mut out, s);
    }
    write_int_lenenc(&mut out, 0x0c);
    write_int_2(&mut out, column.charset);
    write_int_4(&mut out, column.column_length);
    write_int_1(&mut out, column.column_type as u8);
    write_int_2(&mut out, column.flags.bits());
    write_int_1(&mut out, column.decimals);
    write_int_2(&mut out, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Column {
        Column {
            catalog: "def".to_owned(),
            schema: "app".to_owned(),
            table: "t".to_owned(),
            org_table: "users".to_owned(),
            name: "n".to_owned(),
            org_name: "name".to_owned(),
            charset: 45,
            column_length: 1020,
            column_type: ColumnType::MYSQL_TYPE_VAR_STRING,
            flags: ColumnFlags::NOT_NULL_FLAG,
            decimals: 0,
        }
    }

    #[test]
    fn column_definition_round_trip() {
        let encoded = encode_column_definition(&sample());
        let column = read_column_definition(&encoded).unwrap();
        assert_eq!(column.schema, "app");
        assert_eq!(column.name, "n");
        assert_eq!(column.org_name, "name");
        assert_eq!(column.charset, 45);
        assert_eq!(column.column_length, 1020);
        assert_eq!(column.column_type, ColumnType::MYSQL_TYPE_VAR_STRING);
        assert!(column.flags.contains(ColumnFlags::NOT_NULL_FLAG));
    }

    #[test]
    fn display_name_honors_alias_flag() {
        let column = sample();
        assert_eq!(column.display_name(false), "n");
        assert_eq!(column.display_name(true), "t.n");
    }

    #[test]
    fn column_buffer_parse() {
        let encoded = encode_column_definition(&sample());
        let mut buffer = Vec::new();
        for _ in 0..2 {
            buffer.extend_from_slice(&(encoded.len() as u32).to_ne_bytes());
            buffer.extend_from_slice(&encoded);
        }
        let columns = parse_column_buffer(&buffer, 2).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].org_table, "users");
    }
}
