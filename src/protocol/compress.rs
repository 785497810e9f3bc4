//! Compressed-protocol frame codec.
//!
//! Once negotiated, every byte on the wire travels inside compressed frames:
//! a 7-byte header (compressed length, compression sequence, uncompressed
//! length) followed by either a zlib stream or, for payloads below
//! [`MIN_COMPRESS_LENGTH`](crate::constant::MIN_COMPRESS_LENGTH), the bytes
//! verbatim with an uncompressed length of 0. Plain packets may span
//! compressed frames; the framing layers are independent.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::constant::{MAX_PAYLOAD_LENGTH, MIN_COMPRESS_LENGTH};
use crate::error::{Error, Result, eyre};
use crate::protocol::packet::CompressedHeader;

/// zlib level used for outgoing frames. Matches the reference clients:
/// cheap to compute, still collapses the highly repetitive resultset frames.
const COMPRESSION_LEVEL: u32 = 2;

/// Largest chunk of plain bytes wrapped into one compressed frame.
pub const MAX_COMPRESSED_CHUNK: usize = MAX_PAYLOAD_LENGTH - 4;

/// One outgoing compressed frame: header + body, ready for the socket.
pub struct CompressedFrame {
    pub header: CompressedHeader,
    pub body: Vec<u8>,
}

/// Wrap `plain` (bytes already carrying plain packet headers) into
/// compressed frames, advancing the compression sequence counter.
pub fn compress_frames(plain: &[u8], sequence: &mut u8) -> Result<Vec<CompressedFrame>> {
    let mut frames = Vec::new();
    // `chunks` never yields an empty slice, but an empty write still needs
    // a frame so the terminator of an INFILE stream survives compression.
    if plain.is_empty() {
        frames.push(CompressedFrame {
            header: CompressedHeader::encode(0, *sequence, 0),
            body: Vec::new(),
        });
        *sequence = sequence.wrapping_add(1);
        return Ok(frames);
    }

    for chunk in plain.chunks(MAX_COMPRESSED_CHUNK) {
        let frame = if chunk.len() < MIN_COMPRESS_LENGTH {
            CompressedFrame {
                header: CompressedHeader::encode(chunk.len(), *sequence, 0),
                body: chunk.to_vec(),
            }
        } else {
            let mut encoder = ZlibEncoder::new(
                Vec::with_capacity(chunk.len() / 2),
                Compression::new(COMPRESSION_LEVEL),
            );
            encoder.write_all(chunk)?;
            let compressed = encoder.finish()?;
            CompressedFrame {
                header: CompressedHeader::encode(compressed.len(), *sequence, chunk.len()),
                body: compressed,
            }
        };
        frames.push(frame);
        *sequence = sequence.wrapping_add(1);
    }
    Ok(frames)
}

/// Expand the body of one received compressed frame into `out`.
///
/// `uncompressed_length == 0` marks a verbatim frame. Inflation must produce
/// exactly the announced number of bytes; anything else poisons the
/// connection.
pub fn decompress_frame(header: &CompressedHeader, body: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let uncompressed = header.uncompressed_length();
    if uncompressed == 0 {
        out.extend_from_slice(body);
        return Ok(());
    }

    let start = out.len();
    let mut decoder = ZlibDecoder::new(body);
    // Cap the read at the announced length + 1 so an over-long stream is
    // detected without unbounded buffering.
    let read = decoder
        .by_ref()
        .take(uncompressed as u64 + 1)
        .read_to_end(out)?;
    if read != uncompressed {
        out.truncate(start);
        return Err(Error::Bug(eyre!(
            "compressed frame announced {uncompressed} bytes but inflated to {read}"
        )));
    }
    Ok(())
}
