//! Scripted in-process server shared by the fake-server harnesses.
//!
//! Each test binds a loopback listener, scripts the server half of the
//! exchange on a thread, and drives a real connection against it.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use keel_mysql::protocol::command::Column;
use keel_mysql::protocol::response::OkPayload;
use keel_mysql::{Opts, Result, TextResultSetHandler, TextRow};

pub const MAX_PAYLOAD: usize = (1 << 24) - 1;

pub const SEED: [u8; 20] = [
    10, 47, 74, 111, 75, 73, 34, 48, 88, 76, 114, 74, 37, 13, 3, 80, 82, 2, 23, 21,
];

// PROTOCOL_41 | SECURE_CONNECTION | PLUGIN_AUTH | LENENC_CLIENT_DATA |
// DEPRECATE_EOF | SESSION_TRACK | LOCAL_FILES | CONNECT_ATTRS |
// TRANSACTIONS | MULTI_RESULTS | PS_MULTI_RESULTS | LONG_FLAG | LONG_PASSWORD
pub const SERVER_CAPS: u32 = 0x0000_0001
    | 0x0000_0004
    | 0x0000_0080
    | 0x0000_0200
    | 0x0000_2000
    | 0x0000_8000
    | 0x0002_0000
    | 0x0004_0000
    | 0x0008_0000
    | 0x0010_0000
    | 0x0020_0000
    | 0x0080_0000
    | 0x0100_0000;

/// `SERVER_MORE_RESULTS_EXISTS`
pub const STATUS_MORE_RESULTS: u16 = 0x0008;
/// `SERVER_STATUS_AUTOCOMMIT`
pub const STATUS_AUTOCOMMIT: u16 = 0x0002;

pub struct Peer {
    pub stream: TcpStream,
}

impl Peer {
    pub fn write_packet(&mut self, sequence: &mut u8, payload: &[u8]) {
        let mut offset = 0;
        loop {
            let chunk = (payload.len() - offset).min(MAX_PAYLOAD);
            let mut frame = Vec::with_capacity(chunk + 4);
            frame.extend_from_slice(&(chunk as u32).to_le_bytes()[..3]);
            frame.push(*sequence);
            frame.extend_from_slice(&payload[offset..offset + chunk]);
            self.stream.write_all(&frame).unwrap();
            *sequence = sequence.wrapping_add(1);
            offset += chunk;
            if chunk < MAX_PAYLOAD {
                break;
            }
        }
    }

    pub fn read_packet(&mut self) -> (u8, Vec<u8>) {
        let mut payload = Vec::new();
        let mut sequence = 0;
        loop {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).unwrap();
            let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            sequence = header[3];
            let start = payload.len();
            payload.resize(start + length, 0);
            self.stream.read_exact(&mut payload[start..]).unwrap();
            if length < MAX_PAYLOAD {
                return (sequence, payload);
            }
        }
    }

    /// Initial handshake, response consumption, and the closing OK.
    pub fn handshake(&mut self, plugin: &str) {
        let mut packet = vec![10];
        packet.extend_from_slice(b"8.0.36-fake\0");
        packet.extend_from_slice(&7u32.to_le_bytes());
        packet.extend_from_slice(&SEED[..8]);
        packet.push(0);
        packet.extend_from_slice(&(SERVER_CAPS as u16).to_le_bytes());
        packet.push(45);
        packet.extend_from_slice(&STATUS_AUTOCOMMIT.to_le_bytes());
        packet.extend_from_slice(&((SERVER_CAPS >> 16) as u16).to_le_bytes());
        packet.push(21);
        packet.extend_from_slice(&[0u8; 10]);
        packet.extend_from_slice(&SEED[8..]);
        packet.push(0);
        packet.extend_from_slice(plugin.as_bytes());
        packet.push(0);

        let mut sequence = 0;
        self.write_packet(&mut sequence, &packet);
        let (response_seq, _response) = self.read_packet();
        assert_eq!(response_seq, 1, "handshake response continues the sequence");
    }

    pub fn send_ok_status(&mut self, sequence: &mut u8, affected: u64, status: u16) {
        let mut payload = vec![0x00];
        payload.push(affected as u8);
        payload.push(0);
        payload.extend_from_slice(&status.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        self.write_packet(sequence, &payload);
    }

    pub fn send_ok(&mut self, sequence: &mut u8, affected: u64) {
        self.send_ok_status(sequence, affected, STATUS_AUTOCOMMIT);
    }

    pub fn send_eof_as_ok_status(&mut self, sequence: &mut u8, status: u16) {
        let mut payload = vec![0xFE, 0x00, 0x00];
        payload.extend_from_slice(&status.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        self.write_packet(sequence, &payload);
    }

    pub fn send_eof_as_ok(&mut self, sequence: &mut u8) {
        self.send_eof_as_ok_status(sequence, STATUS_AUTOCOMMIT);
    }

    pub fn send_text_column(&mut self, sequence: &mut u8, name: &str) {
        let mut payload = Vec::new();
        for field in ["def", "", "", "", name, name] {
            payload.push(field.len() as u8);
            payload.extend_from_slice(field.as_bytes());
        }
        payload.push(0x0c);
        payload.extend_from_slice(&45u16.to_le_bytes());
        payload.extend_from_slice(&1024u32.to_le_bytes());
        payload.push(0xfd); // VAR_STRING
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(0);
        payload.extend_from_slice(&0u16.to_le_bytes());
        self.write_packet(sequence, &payload);
    }
}

pub fn serve<F>(script: F) -> (std::thread::JoinHandle<()>, Opts)
where
    F: FnOnce(Peer) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(Peer { stream });
    });
    let opts = Opts {
        host: Some("127.0.0.1".to_owned()),
        port,
        user: "app".to_owned(),
        password: Some("secret".to_owned()),
        ..Opts::default()
    };
    (handle, opts)
}

/// Records everything a text query produced, across result sets.
#[derive(Default)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    pub plain_oks: usize,
    pub resultsets: usize,
}

impl TextResultSetHandler for Rows {
    fn no_result_set(&mut self, _: &OkPayload) -> Result<()> {
        self.plain_oks += 1;
        Ok(())
    }

    fn resultset_start(&mut self, columns: &[Column]) -> Result<()> {
        self.resultsets += 1;
        if self.columns.is_empty() {
            self.columns = columns.iter().map(|c| c.name.clone()).collect();
        }
        Ok(())
    }

    fn row(&mut self, columns: &[Column], row: TextRow<'_>) -> Result<()> {
        let values = row
            .columns(columns.len())?
            .into_iter()
            .map(|v| v.map(<[u8]>::to_vec))
            .collect();
        self.rows.push(values);
        Ok(())
    }

    fn resultset_end(&mut self, _: &OkPayload) -> Result<()> {
        Ok(())
    }
}
