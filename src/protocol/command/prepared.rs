use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::buffer::BufferSet;
use crate::constant::{
    CapabilityFlags, CommandByte, MAX_PAYLOAD_LENGTH, ServerStatusFlags,
};
use crate::error::{Error, Result, eyre};
use crate::protocol::command::query::CommandResult;
use crate::protocol::command::{Action, Column, parse_column_buffer};
use crate::protocol::handler::BinaryResultSetHandler;
use crate::protocol::param::{ParamValue, encode_null_bitmap, encode_types, encode_values};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayload, OkPayloadBytes, read_eof_packet};
use crate::row::BinaryRow;

/// COM_STMT_PREPARE OK response tail (zero-copy)
///
/// Layout after the 0x00 status byte:
/// ```text
/// 4  statement id
/// 2  column count
/// 2  parameter count
/// 1  reserved
/// 2  warning count
/// ```
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

/// Write COM_STMT_PREPARE command
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Read the COM_STMT_PREPARE OK payload
pub fn read_prepare_ok(payload: &[u8]) -> Result<&PrepareOk> {
    let (status, data) = read_int_1(payload)?;
    if status != 0x00 || data.len() < 11 {
        return Err(Error::MalformedPacket);
    }
    PrepareOk::ref_from_bytes(&data[..11]).map_err(|_| Error::MalformedPacket)
}

/// Write COM_STMT_EXECUTE command.
///
/// Values already shipped through COM_STMT_SEND_LONG_DATA are marked in
/// `long_data` and encoded as zero-length placeholders.
pub fn write_execute(
    out: &mut Vec<u8>,
    statement_id: u32,
    params: &[ParamValue<'_>],
    long_data: &[bool],
) -> Result<()> {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);

    // flags (1 byte) - CURSOR_TYPE_NO_CURSOR
    write_int_1(out, 0x00);

    // iteration count (4 bytes) - always 1
    write_int_4(out, 1);

    if !params.is_empty() {
        encode_null_bitmap(out, params);

        // new-params-bound flag: types follow
        write_int_1(out, 0x01);
        encode_types(out, params);

        encode_values(out, params, long_data)?;
    }
    Ok(())
}

/// Write one COM_STMT_SEND_LONG_DATA packet. The server sends no response.
pub fn write_long_data(out: &mut Vec<u8>, statement_id: u32, param_index: u16, chunk: &[u8]) {
    write_int_1(out, CommandByte::StmtSendLongData as u8);
    write_int_4(out, statement_id);
    write_int_2(out, param_index);
    out.extend_from_slice(chunk);
}

/// Write COM_STMT_CLOSE command. The server sends no response.
pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}

/// Write COM_STMT_RESET command
pub fn write_reset_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtReset as u8);
    write_int_4(out, statement_id);
}

// ============================================================================
// Prepare state machine
// ============================================================================

enum PrepareState {
    Start,
    ReadingResponse,
    /// Parameter definition packets are read and discarded; only the counts
    /// matter to the driver.
    SkippingParams { remaining: u16 },
    ParamsEof,
    SkippingColumns { remaining: u16 },
    ColumnsEof,
    Finished,
}

/// State machine for COM_STMT_PREPARE responses.
pub struct Prepare {
    state: PrepareState,
    capabilities: CapabilityFlags,
    statement_id: u32,
    num_params: u16,
    num_columns: u16,
    warning_count: u16,
}

impl Prepare {
    pub fn new(capabilities: CapabilityFlags) -> Self {
        Self {
            state: PrepareState::Start,
            capabilities,
            statement_id: 0,
            num_params: 0,
            num_columns: 0,
            warning_count: 0,
        }
    }

    pub fn statement_id(&self) -> u32 {
        self.statement_id
    }

    pub fn num_params(&self) -> u16 {
        self.num_params
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    fn after_params(&mut self) -> PrepareState {
        if self.num_columns > 0 {
            PrepareState::SkippingColumns {
                remaining: self.num_columns,
            }
        } else {
            PrepareState::Finished
        }
    }

    pub fn step<'buf>(&mut self, buffer_set: &'buf mut BufferSet) -> Result<Action<'buf>> {
        match &mut self.state {
            PrepareState::Start => {
                self.state = PrepareState::ReadingResponse;
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            PrepareState::ReadingResponse => {
                let payload = &buffer_set.read_buffer[..];
                if payload.first() == Some(&0xFF) {
                    return Err(ErrPayloadBytes(payload).into());
                }
                let ok = read_prepare_ok(payload)?;
                self.statement_id = ok.statement_id();
                self.num_params = ok.num_params();
                self.num_columns = ok.num_columns();
                self.warning_count = ok.warning_count();

                self.state = if self.num_params > 0 {
                    PrepareState::SkippingParams {
                        remaining: self.num_params,
                    }
                } else {
                    self.after_params()
                };
                if matches!(self.state, PrepareState::Finished) {
                    Ok(Action::Finished)
                } else {
                    Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
                }
            }

            PrepareState::SkippingParams { remaining } => {
                *remaining -= 1;
                if *remaining == 0 {
                    self.state = if self.deprecate_eof() {
                        self.after_params()
                    } else {
                        PrepareState::ParamsEof
                    };
                }
                if matches!(self.state, PrepareState::Finished) {
                    Ok(Action::Finished)
                } else {
                    Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
                }
            }

            PrepareState::ParamsEof => {
                read_eof_packet(&buffer_set.read_buffer)?;
                self.state = self.after_params();
                if matches!(self.state, PrepareState::Finished) {
                    Ok(Action::Finished)
                } else {
                    Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
                }
            }

            PrepareState::SkippingColumns { remaining } => {
                *remaining -= 1;
                if *remaining == 0 {
                    if self.deprecate_eof() {
                        self.state = PrepareState::Finished;
                        return Ok(Action::Finished);
                    }
                    self.state = PrepareState::ColumnsEof;
                }
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            PrepareState::ColumnsEof => {
                read_eof_packet(&buffer_set.read_buffer)?;
                self.state = PrepareState::Finished;
                Ok(Action::Finished)
            }

            PrepareState::Finished => {
                Err(Error::Bug(eyre!("Prepare::step called after finished")))
            }
        }
    }
}

// ============================================================================
// Execute state machine
// ============================================================================

enum ExecState {
    Start,
    ReadingFirstPacket,
    ParsingColumns { num_columns: usize },
    ReadingColumnsEof,
    ReadingRows,
    Finished,
}

/// State machine for COM_STMT_EXECUTE responses (binary protocol) with
/// integrated handler.
pub struct Exec<'h, H> {
    state: ExecState,
    handler: &'h mut H,
    capabilities: CapabilityFlags,
    columns: Vec<Column>,
    result: CommandResult,
}

impl<'h, H: BinaryResultSetHandler> Exec<'h, H> {
    pub fn new(handler: &'h mut H, capabilities: CapabilityFlags) -> Self {
        Self {
            state: ExecState::Start,
            handler,
            capabilities,
            columns: Vec::new(),
            result: CommandResult::default(),
        }
    }

    pub fn into_result(self) -> CommandResult {
        self.result
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    fn finish_resultset<'buf>(
        &mut self,
        ok: OkPayload,
        had_rows: bool,
        buffer_set: &'buf mut BufferSet,
    ) -> Result<Action<'buf>> {
        let more = ok
            .status_flags
            .contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS);
        if had_rows {
            self.handler.resultset_end(&ok)?;
        } else {
            self.handler.no_result_set(&ok)?;
        }
        self.result.gtids.extend(ok.gtids.iter().cloned());
        self.result.last_ok = Some(ok);
        if more {
            self.state = ExecState::ReadingFirstPacket;
            Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
        } else {
            self.state = ExecState::Finished;
            Ok(Action::Finished)
        }
    }

    pub fn step<'buf>(&mut self, buffer_set: &'buf mut BufferSet) -> Result<Action<'buf>> {
        match &mut self.state {
            ExecState::Start => {
                self.state = ExecState::ReadingFirstPacket;
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            ExecState::ReadingFirstPacket => {
                let payload = &buffer_set.read_buffer[..];
                match payload.first() {
                    None => Err(Error::MalformedPacket),
                    Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                    Some(0x00) => {
                        let ok = OkPayload::parse(OkPayloadBytes(payload), self.capabilities)?;
                        self.finish_resultset(ok, false, buffer_set)
                    }
                    Some(_) => {
                        let (column_count, _) = read_int_lenenc(payload)?;
                        let num_columns = column_count as usize;
                        self.state = ExecState::ParsingColumns { num_columns };
                        Ok(Action::ReadColumnMetadata { num_columns })
                    }
                }
            }

            ExecState::ParsingColumns { num_columns } => {
                let num_columns = *num_columns;
                self.columns =
                    parse_column_buffer(&buffer_set.column_definition_buffer, num_columns)?;
                self.handler.resultset_start(&self.columns)?;
                if self.deprecate_eof() {
                    self.state = ExecState::ReadingRows;
                } else {
                    self.state = ExecState::ReadingColumnsEof;
                }
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            ExecState::ReadingColumnsEof => {
                read_eof_packet(&buffer_set.read_buffer)?;
                self.state = ExecState::ReadingRows;
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            ExecState::ReadingRows => {
                let payload = &buffer_set.read_buffer[..];
                match payload.first() {
                    Some(0x00) => {
                        let row = BinaryRow::parse(payload, self.columns.len())?;
                        self.handler.row(&self.columns, row)?;
                        Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
                    }
                    Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                    Some(0xFE) if payload.len() < MAX_PAYLOAD_LENGTH => {
                        let ok = if self.deprecate_eof() {
                            OkPayload::parse(OkPayloadBytes(payload), self.capabilities)?
                        } else {
                            let eof = read_eof_packet(payload)?;
                            OkPayload {
                                affected_rows: 0,
                                last_insert_id: 0,
                                status_flags: eof.status_flags(),
                                warnings: eof.warnings(),
                                gtids: Vec::new(),
                            }
                        };
                        self.finish_resultset(ok, true, buffer_set)
                    }
                    Some(header) => Err(Error::Bug(eyre!(
                        "unexpected binary row packet header: 0x{:02X}",
                        header
                    ))),
                    None => Err(Error::MalformedPacket),
                }
            }

            ExecState::Finished => Err(Error::Bug(eyre!("Exec::step called after finished"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prepare_ok_parse() {
        // status 0, id=7, columns=2, params=3, reserved, warnings=1
        let payload = [0x00, 7, 0, 0, 0, 2, 0, 3, 0, 0, 1, 0];
        let ok = read_prepare_ok(&payload).unwrap();
        assert_eq!(ok.statement_id(), 7);
        assert_eq!(ok.num_columns(), 2);
        assert_eq!(ok.num_params(), 3);
        assert_eq!(ok.warning_count(), 1);
        assert!(read_prepare_ok(&payload[..8]).is_err());
    }

    #[test]
    fn execute_payload_layout() {
        let params = [ParamValue::Int(42), ParamValue::Null];
        let mut out = Vec::new();
        write_execute(&mut out, 7, &params, &[false, false]).unwrap();
        let mut expected = vec![CommandByte::StmtExecute as u8, 7, 0, 0, 0, 0x00, 1, 0, 0, 0];
        expected.push(0b0000_0010); // NULL bitmap: param 1 is NULL
        expected.push(0x01); // new-params-bound
        expected.extend_from_slice(&[0x08, 0x00, 0x06, 0x00]); // LONGLONG, NULL
        expected.extend_from_slice(&42u64.to_le_bytes());
        assert_eq!(out, expected);
    }

    #[test]
    fn long_data_packet_layout() {
        let mut out = Vec::new();
        write_long_data(&mut out, 0x0102, 3, b"chunk");
        assert_eq!(out[0], CommandByte::StmtSendLongData as u8);
        assert_eq!(&out[1..5], &[0x02, 0x01, 0, 0]);
        assert_eq!(&out[5..7], &[3, 0]);
        assert_eq!(&out[7..], b"chunk");
    }
}
