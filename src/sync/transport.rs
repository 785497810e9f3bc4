use std::time::{Duration, Instant};

use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::constant::MAX_PAYLOAD_LENGTH;
use crate::error::{Error, Result};
use crate::protocol::compress::{compress_frames, decompress_frame};
use crate::protocol::packet::{CompressedHeader, PacketHeader};

use super::stream::Stream;

/// Framed, sequence-checked transport over one socket.
///
/// Owns the plain and compression sequence counters and enforces the
/// configured read/write timeouts plus the armed command deadline by
/// setting socket timeouts before each operation.
pub(crate) struct Transport {
    stream: Option<Stream>,
    sequence: u8,
    compress_sequence: u8,
    compression: Option<Decompressed>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    command_deadline: Option<Instant>,
    pub(crate) max_allowed_packet: usize,
}

/// Buffered plain bytes recovered from compressed frames.
#[derive(Default)]
struct Decompressed {
    data: Vec<u8>,
    pos: usize,
}

impl Transport {
    pub(crate) fn new(
        stream: Stream,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
        max_allowed_packet: usize,
    ) -> Self {
        Self {
            stream: Some(stream),
            sequence: 0,
            compress_sequence: 0,
            compression: None,
            read_timeout,
            write_timeout,
            command_deadline: None,
            max_allowed_packet,
        }
    }

    pub(crate) fn stream(&mut self) -> Result<&mut Stream> {
        self.stream.as_mut().ok_or(Error::InvalidConnection)
    }

    pub(crate) fn stream_ref(&self) -> Result<&Stream> {
        self.stream.as_ref().ok_or(Error::InvalidConnection)
    }

    /// Switch to the compressed protocol. Both counters restart.
    pub(crate) fn enable_compression(&mut self) {
        self.compression = Some(Decompressed::default());
        self.sequence = 0;
        self.compress_sequence = 0;
    }

    /// Every client command starts a fresh exchange.
    pub(crate) fn reset_sequence(&mut self) {
        self.sequence = 0;
        self.compress_sequence = 0;
    }

    pub(crate) fn set_command_deadline(&mut self, deadline: Option<Instant>) {
        self.command_deadline = deadline;
    }

    pub(crate) fn upgrade_to_tls(&mut self, mode: &crate::opts::TlsMode, host: &str) -> Result<()> {
        let stream = self.stream.take().ok_or(Error::InvalidConnection)?;
        // On failure the stream stays gone and the connection is poisoned.
        self.stream = Some(stream.upgrade_to_tls(mode, host)?);
        Ok(())
    }

    /// The timeout to install before an op: the configured per-op timeout
    /// or the armed deadline, whichever fires first.
    fn op_timeout(&self, configured: Option<Duration>) -> Result<Option<Duration>> {
        let until_deadline = match self.command_deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::ContextDeadlineExceeded);
                }
                Some(deadline - now)
            }
            None => None,
        };
        Ok(match (configured, until_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
        // a zero timeout would mean "no timeout" to the socket layer
        .map(|d| d.max(Duration::from_millis(1))))
    }

    fn before_read(&mut self) -> Result<()> {
        let timeout = self.op_timeout(self.read_timeout)?;
        self.stream()?.set_read_timeout(timeout)?;
        Ok(())
    }

    fn before_write(&mut self) -> Result<()> {
        let timeout = self.op_timeout(self.write_timeout)?;
        self.stream()?.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Read exactly `buf.len()` plain bytes, transparently pulling them out
    /// of compressed frames when compression is on.
    fn read_plain(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.compression.is_none() {
            self.stream()?.read_exact(buf)?;
            return Ok(());
        }

        let mut filled = 0;
        while filled < buf.len() {
            let available = {
                let decompressed = self.compression.as_ref().ok_or(Error::InvalidConnection)?;
                decompressed.data.len() - decompressed.pos
            };
            if available == 0 {
                self.fill_decompressed()?;
                continue;
            }
            let take = available.min(buf.len() - filled);
            let decompressed = self.compression.as_mut().ok_or(Error::InvalidConnection)?;
            buf[filled..filled + take]
                .copy_from_slice(&decompressed.data[decompressed.pos..decompressed.pos + take]);
            decompressed.pos += take;
            filled += take;
        }
        Ok(())
    }

    /// Pull one compressed frame off the socket into the plain-byte buffer.
    fn fill_decompressed(&mut self) -> Result<()> {
        let mut header = CompressedHeader::new_zeroed();
        self.stream()?.read_exact(header.as_mut_bytes())?;

        if header.sequence_id != self.compress_sequence {
            return Err(if header.sequence_id < self.compress_sequence {
                Error::OutOfSync
            } else {
                Error::OutOfSyncMultiStatements
            });
        }
        self.compress_sequence = self.compress_sequence.wrapping_add(1);

        let mut body = vec![0u8; header.compressed_length()];
        self.stream()?.read_exact(&mut body)?;

        let decompressed = self.compression.as_mut().ok_or(Error::InvalidConnection)?;
        if decompressed.pos == decompressed.data.len() {
            decompressed.data.clear();
            decompressed.pos = 0;
        }
        decompress_frame(&header, &body, &mut decompressed.data)?;
        Ok(())
    }

    /// Read one logical payload, reassembling split frames.
    pub(crate) fn read_packet(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.clear();
        self.before_read()?;

        loop {
            let mut header = PacketHeader::new_zeroed();
            self.read_plain(header.as_mut_bytes())?;

            if header.sequence_id != self.sequence {
                return Err(if header.sequence_id < self.sequence {
                    Error::OutOfSync
                } else {
                    Error::OutOfSyncMultiStatements
                });
            }
            self.sequence = self.sequence.wrapping_add(1);

            let length = header.length();
            let start = buffer.len();
            buffer.resize(start + length, 0);
            self.read_plain(&mut buffer[start..])?;

            if length < MAX_PAYLOAD_LENGTH {
                return Ok(());
            }
        }
    }

    /// Send one logical payload. `buffer` carries 4 bytes of header space
    /// before the payload; oversized payloads are split into maximum frames
    /// plus the short (possibly empty) trailer.
    pub(crate) fn write_packet(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let payload_len = buffer.len().saturating_sub(4);
        if payload_len > self.max_allowed_packet {
            return Err(Error::PacketTooLarge);
        }
        self.before_write()?;

        if self.compression.is_some() {
            return self.write_packet_compressed(buffer);
        }

        let mut offset = 0usize;
        loop {
            let chunk_size = (buffer.len() - offset - 4).min(MAX_PAYLOAD_LENGTH);
            PacketHeader::mut_from_bytes(&mut buffer[offset..offset + 4])?
                .encode_in_place(chunk_size, self.sequence);
            self.sequence = self.sequence.wrapping_add(1);
            self.stream()?
                .write_all(&buffer[offset..offset + 4 + chunk_size])?;

            if chunk_size < MAX_PAYLOAD_LENGTH {
                break;
            }
            // the last 4 bytes already sent become the next header's space
            offset += chunk_size;
        }
        self.stream()?.flush()?;
        Ok(())
    }

    /// Frame the payload into plain packets, then wrap those bytes into
    /// compressed frames.
    fn write_packet_compressed(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let mut plain = Vec::with_capacity(buffer.len() + 8);
        let payload = &buffer[4..];
        let mut offset = 0;
        loop {
            let chunk_size = (payload.len() - offset).min(MAX_PAYLOAD_LENGTH);
            let header = PacketHeader::encode(chunk_size, self.sequence);
            self.sequence = self.sequence.wrapping_add(1);
            plain.extend_from_slice(header.as_bytes());
            plain.extend_from_slice(&payload[offset..offset + chunk_size]);
            offset += chunk_size;
            if chunk_size < MAX_PAYLOAD_LENGTH {
                break;
            }
        }

        let frames = compress_frames(&plain, &mut self.compress_sequence)?;
        for frame in &frames {
            self.stream()?.write_all(frame.header.as_bytes())?;
            self.stream()?.write_all(&frame.body)?;
        }
        self.stream()?.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;
