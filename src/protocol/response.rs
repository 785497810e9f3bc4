use crate::constant::{CapabilityFlags, ServerStatusFlags, SessionStateType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::U16 as U16LE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// The payload part of an OK packet (or OK-as-EOF under deprecate-EOF)
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub &'a [u8]);

impl<'a> OkPayloadBytes<'a> {
    pub fn assert_eof(&self) -> Result<()> {
        if self.0.first() == Some(&0xFE) {
            Ok(())
        } else {
            Err(Error::MalformedPacket)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.0
    }
}

/// The OK packet parsed from [`OkPayloadBytes`]
///
/// Layout: `0x00`/`0xFE` header, then
/// - affected_rows: length-encoded integer
/// - last_insert_id: length-encoded integer
/// - status_flags: 2 bytes
/// - warnings: 2 bytes
/// - info: string<lenenc> (when session tracking is on)
/// - session state info: string<lenenc> (when SERVER_SESSION_STATE_CHANGED)
#[derive(Debug, Clone)]
pub struct OkPayload {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
    /// GTIDs delivered through session-state tracking, in server order.
    pub gtids: Vec<String>,
}

impl OkPayload {
    /// Parse an OK payload under the given negotiated capabilities.
    pub fn parse(bytes: OkPayloadBytes<'_>, capabilities: CapabilityFlags) -> Result<Self> {
        let (header, data) = read_int_1(bytes.bytes())?;
        if header != 0x00 && header != 0xFE {
            return Err(Error::MalformedPacket);
        }

        let (affected_rows, data) = read_int_lenenc(data)?;
        let (last_insert_id, data) = read_int_lenenc(data)?;
        let (status_flags, data) = read_int_2(data)?;
        let (warnings, data) = read_int_2(data)?;
        let status_flags = ServerStatusFlags::from_bits_truncate(status_flags);

        let mut ok = OkPayload {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            gtids: Vec::new(),
        };

        if capabilities.contains(CapabilityFlags::CLIENT_SESSION_TRACK)
            && status_flags.contains(ServerStatusFlags::SERVER_SESSION_STATE_CHANGED)
            && !data.is_empty()
        {
            // human-readable info
            let (_info, data) = read_string_lenenc(data)?;
            let (mut state, _) = read_string_lenenc(data)?;
            while !state.is_empty() {
                let (entry_type, rest) = read_int_1(state)?;
                let (entry, rest) = read_string_lenenc(rest)?;
                state = rest;
                if entry_type == SessionStateType::Gtids as u8 {
                    // one reserved byte, then the GTID text
                    let (_, entry) = read_int_1(entry)?;
                    let (gtid, _) = read_string_lenenc(entry)?;
                    ok.gtids
                        .push(String::from_utf8_lossy(gtid).into_owned());
                }
            }
        }

        Ok(ok)
    }
}

#[derive(Debug)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);

impl<'a> ErrPayloadBytes<'a> {
    pub fn from_payload(payload: &'a [u8]) -> Option<Self> {
        if payload.first() == Some(&0xFF) {
            Some(Self(payload))
        } else {
            None
        }
    }
}

/// The ERR packet parsed from [`ErrPayloadBytes`]
#[derive(Debug, Clone, thiserror::Error)]
#[error("ERROR {} ({}): {}", self.error_code, self.sql_state, self.message)]
pub struct ErrPayload {
    pub error_code: u16,
    /// Five characters, empty when the server omitted the `#` marker
    /// (pre-4.1 style errors inside the handshake).
    pub sql_state: String,
    pub message: String,
}

impl TryFrom<ErrPayloadBytes<'_>> for ErrPayload {
    type Error = Error;

    fn try_from(bytes: ErrPayloadBytes<'_>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        debug_assert_eq!(header, 0xFF);

        let (error_code, data) = read_int_2(data)?;

        let (sql_state, message) = if data.first() == Some(&b'#') {
            let (_, data) = read_int_1(data)?;
            let (sql_state, data) = read_string_fix(data, 5)?;
            (String::from_utf8_lossy(sql_state).to_string(), data)
        } else {
            (String::new(), data)
        };

        Ok(ErrPayload {
            error_code,
            sql_state,
            message: String::from_utf8_lossy(read_string_eof(message)).to_string(),
        })
    }
}

impl<'buf> From<ErrPayloadBytes<'buf>> for Error {
    fn from(value: ErrPayloadBytes<'buf>) -> Self {
        match ErrPayload::try_from(value) {
            Ok(err_payload) => Error::Server(err_payload),
            Err(err) => err,
        }
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct EofPacket {
    warnings: U16LE,
    status_flags: U16LE,
}

impl EofPacket {
    pub fn warnings(&self) -> u16 {
        self.warnings.get()
    }

    pub fn status_flags(&self) -> ServerStatusFlags {
        ServerStatusFlags::from_bits_truncate(self.status_flags.get())
    }
}

/// Read an EOF packet (header byte 0xFE, payload length < 9) - zero-copy
pub fn read_eof_packet(payload: &[u8]) -> Result<&EofPacket> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE || data.len() < 4 {
        return Err(Error::MalformedPacket);
    }
    EofPacket::ref_from_bytes(&data[..4]).map_err(|_| Error::MalformedPacket)
}

/// `0x01`-prefixed extra authentication data from the server.
#[derive(Debug, Clone, Copy)]
pub struct AuthMoreData<'a>(pub &'a [u8]);

impl<'a> AuthMoreData<'a> {
    pub fn from_payload(payload: &'a [u8]) -> Option<Self> {
        match payload.split_first() {
            Some((&0x01, rest)) => Some(Self(rest)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ok_payload_minimal() {
        // affected=3, insert_id=5, status=autocommit, warnings=1
        let payload = [0x00, 0x03, 0x05, 0x02, 0x00, 0x01, 0x00];
        let ok = OkPayload::parse(OkPayloadBytes(&payload), CapabilityFlags::empty()).unwrap();
        assert_eq!(ok.affected_rows, 3);
        assert_eq!(ok.last_insert_id, 5);
        assert_eq!(ok.warnings, 1);
        assert!(ok.status_flags.contains(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
        assert!(ok.gtids.is_empty());
    }

    #[test]
    fn ok_payload_with_gtid_tracking() {
        let gtid = b"3E11FA47-71CA-11E1-9E33-C80AA9429562:23";
        let mut payload = vec![0x00, 0x00, 0x00];
        // status: autocommit | session-state-changed
        payload.extend_from_slice(&(0x4002u16).to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        // info string (empty)
        payload.push(0);
        // session state: type 3, entry is [reserved][lenenc gtid]
        let mut entry = vec![0u8];
        entry.push(gtid.len() as u8);
        entry.extend_from_slice(gtid);
        let mut state = vec![SessionStateType::Gtids as u8, entry.len() as u8];
        state.extend_from_slice(&entry);
        payload.push(state.len() as u8);
        payload.extend_from_slice(&state);

        let ok = OkPayload::parse(
            OkPayloadBytes(&payload),
            CapabilityFlags::CLIENT_SESSION_TRACK,
        )
        .unwrap();
        assert_eq!(ok.gtids, vec![String::from_utf8_lossy(gtid).into_owned()]);
    }

    #[test]
    fn err_payload_with_sql_state() {
        let mut payload = vec![0xFF];
        payload.extend_from_slice(&1045u16.to_le_bytes());
        payload.push(b'#');
        payload.extend_from_slice(b"28000");
        payload.extend_from_slice(b"Access denied");
        let err = ErrPayload::try_from(ErrPayloadBytes(&payload)).unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn err_payload_without_sql_state() {
        let mut payload = vec![0xFF];
        payload.extend_from_slice(&1040u16.to_le_bytes());
        payload.extend_from_slice(b"Too many connections");
        let err = ErrPayload::try_from(ErrPayloadBytes(&payload)).unwrap();
        assert_eq!(err.error_code, 1040);
        assert_eq!(err.sql_state, "");
        assert_eq!(err.message, "Too many connections");
    }

    #[test]
    fn eof_packet_parse() {
        let payload = [0xFE, 0x01, 0x00, 0x22, 0x00];
        let eof = read_eof_packet(&payload).unwrap();
        assert_eq!(eof.warnings(), 1);
        assert!(eof.status_flags().contains(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
    }

    #[test]
    fn auth_more_data_marker() {
        assert!(AuthMoreData::from_payload(&[0x01, 0x04]).is_some());
        assert!(AuthMoreData::from_payload(&[0x00]).is_none());
        assert!(AuthMoreData::from_payload(&[]).is_none());
    }
}
