use crate::constant::CommandByte;
use crate::protocol::primitive::*;

/// Write COM_QUIT command
pub fn write_quit(out: &mut Vec<u8>) {
    write_int_1(out, CommandByte::Quit as u8);
}

/// Write COM_PING command
pub fn write_ping(out: &mut Vec<u8>) {
    write_int_1(out, CommandByte::Ping as u8);
}

/// Write COM_INIT_DB command
pub fn write_init_db(out: &mut Vec<u8>, database: &str) {
    write_int_1(out, CommandByte::InitDb as u8);
    out.extend_from_slice(database.as_bytes());
}

/// Write COM_RESET_CONNECTION command
pub fn write_reset_connection(out: &mut Vec<u8>) {
    write_int_1(out, CommandByte::ResetConnection as u8);
}

/// Multi-statement toggle carried by COM_SET_OPTION.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOption {
    MultiStatementsOn = 0,
    MultiStatementsOff = 1,
}

/// Write COM_SET_OPTION command
pub fn write_set_option(out: &mut Vec<u8>, option: SetOption) {
    write_int_1(out, CommandByte::SetOption as u8);
    write_int_2(out, option as u16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_commands() {
        let mut out = Vec::new();
        write_quit(&mut out);
        assert_eq!(out, [0x01]);
        out.clear();
        write_ping(&mut out);
        assert_eq!(out, [0x0e]);
        out.clear();
        write_reset_connection(&mut out);
        assert_eq!(out, [0x1f]);
    }

    #[test]
    fn init_db_carries_name() {
        let mut out = Vec::new();
        write_init_db(&mut out, "app");
        assert_eq!(out, [0x02, b'a', b'p', b'p']);
    }

    #[test]
    fn set_option_payload() {
        let mut out = Vec::new();
        write_set_option(&mut out, SetOption::MultiStatementsOff);
        assert_eq!(out, [0x1b, 0x01, 0x00]);
    }
}
