use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::MAX_PAYLOAD_LENGTH;

/// Packet header (zero-copy)
///
/// Layout matches the wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = u32::to_le_bytes(length as u32);
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn encode_in_place(&mut self, length: usize, sequence_id: u8) {
        let len = u32::to_le_bytes(length as u32);
        self.length = [len[0], len[1], len[2]];
        self.sequence_id = sequence_id;
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Compressed packet header (zero-copy)
///
/// Layout:
/// - compressed length: 3 bytes (little-endian)
/// - compression sequence_id: 1 byte (independent of the plain sequence)
/// - uncompressed length: 3 bytes (little-endian; 0 means the payload is
///   stored verbatim)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct CompressedHeader {
    pub compressed_length: [u8; 3],
    pub sequence_id: u8,
    pub uncompressed_length: [u8; 3],
}

impl CompressedHeader {
    pub fn encode(compressed: usize, sequence_id: u8, uncompressed: usize) -> Self {
        let c = u32::to_le_bytes(compressed as u32);
        let u = u32::to_le_bytes(uncompressed as u32);
        Self {
            compressed_length: [c[0], c[1], c[2]],
            sequence_id,
            uncompressed_length: [u[0], u[1], u[2]],
        }
    }

    pub fn compressed_length(&self) -> usize {
        u32::from_le_bytes([
            self.compressed_length[0],
            self.compressed_length[1],
            self.compressed_length[2],
            0,
        ]) as usize
    }

    pub fn uncompressed_length(&self) -> usize {
        u32::from_le_bytes([
            self.uncompressed_length[0],
            self.uncompressed_length[1],
            self.uncompressed_length[2],
            0,
        ]) as usize
    }
}

/// Split an outgoing payload into frame sizes.
///
/// A payload that is an exact multiple of the frame limit is followed by an
/// empty frame so the peer knows the logical payload ended.
pub fn frame_sizes(payload_len: usize) -> impl Iterator<Item = usize> {
    let full = payload_len / MAX_PAYLOAD_LENGTH;
    let tail = payload_len % MAX_PAYLOAD_LENGTH;
    (0..full).map(|_| MAX_PAYLOAD_LENGTH).chain(std::iter::once(tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    #[test]
    fn header_round_trip() {
        let header = PacketHeader::encode(0xABCDEF, 3);
        assert_eq!(header.length(), 0xABCDEF);
        assert_eq!(header.sequence_id, 3);
        assert_eq!(header.as_bytes(), &[0xEF, 0xCD, 0xAB, 3]);

        let mut header = PacketHeader::new_zeroed();
        header.encode_in_place(5, 0);
        assert_eq!(header.as_bytes(), &[5, 0, 0, 0]);
    }

    #[test]
    fn compressed_header_round_trip() {
        let header = CompressedHeader::encode(0x123456, 2, 0x654321);
        assert_eq!(header.compressed_length(), 0x123456);
        assert_eq!(header.sequence_id, 2);
        assert_eq!(header.uncompressed_length(), 0x654321);
        assert_eq!(header.as_bytes(), &[0x56, 0x34, 0x12, 2, 0x21, 0x43, 0x65]);
    }

    #[test]
    fn frame_split() {
        assert_eq!(frame_sizes(0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(frame_sizes(10).collect::<Vec<_>>(), vec![10]);
        assert_eq!(
            frame_sizes(MAX_PAYLOAD_LENGTH).collect::<Vec<_>>(),
            vec![MAX_PAYLOAD_LENGTH, 0]
        );
        assert_eq!(
            frame_sizes(MAX_PAYLOAD_LENGTH + 1).collect::<Vec<_>>(),
            vec![MAX_PAYLOAD_LENGTH, 1]
        );
        assert_eq!(
            frame_sizes(2 * MAX_PAYLOAD_LENGTH).collect::<Vec<_>>(),
            vec![MAX_PAYLOAD_LENGTH, MAX_PAYLOAD_LENGTH, 0]
        );
    }
}
