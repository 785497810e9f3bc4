use crate::buffer::BufferSet;
use crate::constant::{
    CapabilityFlags, CommandByte, MAX_PAYLOAD_LENGTH, ServerStatusFlags,
};
use crate::error::{Error, Result, eyre};
use crate::protocol::command::{Action, Column, parse_column_buffer};
use crate::protocol::handler::TextResultSetHandler;
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayload, OkPayloadBytes, read_eof_packet};
use crate::row::TextRow;

/// Write COM_QUERY command
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Write COM_QUERY from raw bytes (interpolated queries may contain
/// `_binary` literals that are not valid UTF-8).
pub fn write_query_raw(out: &mut Vec<u8>, sql: &[u8]) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql);
}

/// What a command left behind: the last OK seen and every GTID the server
/// attached through session-state tracking.
#[derive(Debug, Default)]
pub struct CommandResult {
    pub last_ok: Option<OkPayload>,
    pub gtids: Vec<String>,
}

impl CommandResult {
    fn absorb(&mut self, ok: OkPayload) {
        self.gtids.extend(ok.gtids.iter().cloned());
        self.last_ok = Some(ok);
    }
}

/// Internal state of the Query state machine
enum QueryState {
    Start,
    ReadingFirstPacket,
    /// Column packets have been collected into the column buffer.
    ParsingColumns { num_columns: usize },
    /// Pre-deprecate-EOF servers send an EOF packet after the columns.
    ReadingColumnsEof,
    ReadingRows,
    /// An INFILE stream (data packets + empty terminator) is being sent.
    InfileSent,
    /// The INFILE stream is done; the payload read next is the final OK/ERR.
    AwaitingInfileResult,
    Finished,
}

/// State machine for COM_QUERY (text protocol) with integrated handler.
///
/// `step()` returns the I/O action the connection must perform before
/// stepping again.
pub struct Query<'h, H> {
    state: QueryState,
    handler: &'h mut H,
    capabilities: CapabilityFlags,
    columns: Vec<Column>,
    result: CommandResult,
}

impl<'h, H: TextResultSetHandler> Query<'h, H> {
    pub fn new(handler: &'h mut H, capabilities: CapabilityFlags) -> Self {
        Self {
            state: QueryState::Start,
            handler,
            capabilities,
            columns: Vec::new(),
            result: CommandResult::default(),
        }
    }

    /// The accumulated command result; meaningful once `step` returned
    /// [`Action::Finished`].
    pub fn into_result(self) -> CommandResult {
        self.result
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities
            .contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    fn parse_ok(&self, payload: &[u8]) -> Result<OkPayload> {
        OkPayload::parse(OkPayloadBytes(payload), self.capabilities)
    }

    /// Handle an OK: dispatch the callback and decide whether another result
    /// set follows.
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
        self.result.absorb(ok);
        if more {
            self.state = QueryState::ReadingFirstPacket;
            Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
        } else {
            self.state = QueryState::Finished;
            Ok(Action::Finished)
        }
    }

    pub fn step<'buf>(&mut self, buffer_set: &'buf mut BufferSet) -> Result<Action<'buf>> {
        match &mut self.state {
            QueryState::Start => {
                self.state = QueryState::ReadingFirstPacket;
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            QueryState::ReadingFirstPacket => {
                let payload = &buffer_set.read_buffer[..];
                match payload.first() {
                    None => Err(Error::MalformedPacket),
                    Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                    Some(0x00) => {
                        let ok = self.parse_ok(payload)?;
                        self.finish_resultset(ok, false, buffer_set)
                    }
                    Some(&NULL_MARKER) => {
                        // LOAD DATA LOCAL INFILE: the rest of the payload
                        // names the requested source.
                        let name = payload[1..].to_vec();
                        self.state = QueryState::InfileSent;
                        Ok(Action::SendLocalFile { name })
                    }
                    Some(_) => {
                        let (column_count, _) = read_int_lenenc(payload)?;
                        let num_columns = column_count as usize;
                        self.state = QueryState::ParsingColumns { num_columns };
                        Ok(Action::ReadColumnMetadata { num_columns })
                    }
                }
            }

            QueryState::ParsingColumns { num_columns } => {
                let num_columns = *num_columns;
                self.columns =
                    parse_column_buffer(&buffer_set.column_definition_buffer, num_columns)?;
                self.handler.resultset_start(&self.columns)?;
                if self.deprecate_eof() {
                    self.state = QueryState::ReadingRows;
                } else {
                    self.state = QueryState::ReadingColumnsEof;
                }
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            QueryState::ReadingColumnsEof => {
                read_eof_packet(&buffer_set.read_buffer)?;
                self.state = QueryState::ReadingRows;
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            QueryState::ReadingRows => {
                let payload = &buffer_set.read_buffer[..];
                // A text row starts with NULL (0xFB) or string<lenenc>, whose
                // leading int<lenenc> can never be 0xFF. 0xFE would mean a
                // string of at least 2^24 bytes, and a payload that long is
                // exactly MAX_PAYLOAD_LENGTH; shorter 0xFE payloads are the
                // terminating EOF/OK.
                match payload.first() {
                    Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                    Some(0xFE) if payload.len() < MAX_PAYLOAD_LENGTH => {
                        let ok = if self.deprecate_eof() {
                            self.parse_ok(payload)?
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
                    Some(_) => {
                        let row = TextRow(payload);
                        self.handler.row(&self.columns, row)?;
                        Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
                    }
                    None => Err(Error::MalformedPacket),
                }
            }

            QueryState::InfileSent => {
                self.state = QueryState::AwaitingInfileResult;
                Ok(Action::NeedPacket(&mut buffer_set.read_buffer))
            }

            QueryState::AwaitingInfileResult => {
                let payload = &buffer_set.read_buffer[..];
                match payload.first() {
                    Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                    Some(0x00) => {
                        let ok = self.parse_ok(payload)?;
                        self.finish_resultset(ok, false, buffer_set)
                    }
                    _ => Err(Error::MalformedPacket),
                }
            }

            QueryState::Finished => Err(Error::Bug(eyre!("Query::step called after finished"))),
        }
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
