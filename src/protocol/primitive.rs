use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};

/// Marker used in place of a length-encoded string for NULL values.
pub const NULL_MARKER: u8 = 0xFB;

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&byte, rest)) => Ok((byte, rest)),
        None => Err(Error::UnexpectedEof),
    }
}

/// Read 2-byte little-endian integer
pub fn read_int_2(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::UnexpectedEof);
    }
    let value = U16LE::ref_from_bytes(&data[..2])
        .map_err(|_| Error::MalformedPacket)?
        .get();
    Ok((value, &data[2..]))
}

/// Read 3-byte little-endian integer
pub fn read_int_3(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 3 {
        return Err(Error::UnexpectedEof);
    }
    let value = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    Ok((value, &data[3..]))
}

/// Read 4-byte little-endian integer
pub fn read_int_4(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::UnexpectedEof);
    }
    let value = U32LE::ref_from_bytes(&data[..4])
        .map_err(|_| Error::MalformedPacket)?
        .get();
    Ok((value, &data[4..]))
}

/// Read 8-byte little-endian integer
pub fn read_int_8(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::UnexpectedEof);
    }
    let value = U64LE::ref_from_bytes(&data[..8])
        .map_err(|_| Error::MalformedPacket)?
        .get();
    Ok((value, &data[8..]))
}

/// Read 4-byte little-endian IEEE float
pub fn read_float_4(data: &[u8]) -> Result<(f32, &[u8])> {
    let (bits, rest) = read_int_4(data)?;
    Ok((f32::from_bits(bits), rest))
}

/// Read 8-byte little-endian IEEE double
pub fn read_float_8(data: &[u8]) -> Result<(f64, &[u8])> {
    let (bits, rest) = read_int_8(data)?;
    Ok((f64::from_bits(bits), rest))
}

/// Read length-encoded integer (1/3/4/9-byte forms)
pub fn read_int_lenenc(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.is_empty() {
        return Err(Error::UnexpectedEof);
    }

    match data[0] {
        0xFC => {
            let (val, rest) = read_int_2(&data[1..])?;
            Ok((val as u64, rest))
        }
        0xFD => {
            let (val, rest) = read_int_3(&data[1..])?;
            Ok((val as u64, rest))
        }
        0xFE => {
            let (val, rest) = read_int_8(&data[1..])?;
            Ok((val, rest))
        }
        val => Ok((val as u64, &data[1..])),
    }
}

/// Read length-encoded integer, with `0xFB` in the integer position
/// signalling NULL (row values, INFILE paths).
pub fn read_int_lenenc_or_null(data: &[u8]) -> Result<(Option<u64>, &[u8])> {
    if data.first() == Some(&NULL_MARKER) {
        return Ok((None, &data[1..]));
    }
    let (value, rest) = read_int_lenenc(data)?;
    Ok((Some(value), rest))
}

/// Read fixed-length string
pub fn read_string_fix(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::UnexpectedEof);
    }
    Ok((&data[..len], &data[len..]))
}

/// Read null-terminated string
pub fn read_string_null(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(i) => Ok((&data[..i], &data[i + 1..])),
        None => Err(Error::UnexpectedEof),
    }
}

/// Read length-encoded string
pub fn read_string_lenenc(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_int_lenenc(data)?;
    read_string_fix(rest, len as usize)
}

/// Read length-encoded string or NULL marker
pub fn read_string_lenenc_or_null(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    if data.first() == Some(&NULL_MARKER) {
        return Ok((None, &data[1..]));
    }
    let (value, rest) = read_string_lenenc(data)?;
    Ok((Some(value), rest))
}

/// Read remaining data as string
pub fn read_string_eof(data: &[u8]) -> &[u8] {
    data
}

/// Write 1-byte integer
pub fn write_int_1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte little-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 3-byte little-endian integer
pub fn write_int_3(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Write 4-byte little-endian integer
pub fn write_int_4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 8-byte little-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 4-byte little-endian IEEE float
pub fn write_float_4(out: &mut Vec<u8>, value: f32) {
    write_int_4(out, value.to_bits());
}

/// Write 8-byte little-endian IEEE double
pub fn write_float_8(out: &mut Vec<u8>, value: f64) {
    write_int_8(out, value.to_bits());
}

/// Write length-encoded integer
pub fn write_int_lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xfc);
        write_int_2(out, value as u16);
    } else if value < (1 << 24) {
        out.push(0xfd);
        write_int_3(out, value as u32);
    } else {
        out.push(0xfe);
        write_int_8(out, value);
    }
}

/// Write fixed-length bytes
pub fn write_bytes_fix(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write null-terminated string
pub fn write_string_null(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Write length-encoded string
pub fn write_string_lenenc(out: &mut Vec<u8>, s: &str) {
    write_int_lenenc(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

/// Write length-encoded bytes
pub fn write_bytes_lenenc(out: &mut Vec<u8>, data: &[u8]) {
    write_int_lenenc(out, data.len() as u64);
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lenenc_int_round_trip_boundaries() {
        // Every encoding-form boundary of the 1/3/4/9-byte scheme.
        let cases: &[u64] = &[
            0,
            1,
            250,
            251,
            252,
            (1 << 16) - 1,
            1 << 16,
            (1 << 24) - 1,
            1 << 24,
            u32::MAX as u64,
            u64::MAX - 1,
            u64::MAX,
        ];
        for &value in cases {
            let mut out = Vec::new();
            write_int_lenenc(&mut out, value);
            let (decoded, rest) = read_int_lenenc(&out).unwrap();
            assert_eq!(decoded, value, "round trip of {value}");
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn lenenc_int_encoded_sizes() {
        for (value, size) in [(250u64, 1usize), (251, 3), (65535, 3), (65536, 4), ((1 << 24) - 1, 4), (1 << 24, 9)] {
            let mut out = Vec::new();
            write_int_lenenc(&mut out, value);
            assert_eq!(out.len(), size, "encoded size of {value}");
        }
    }

    #[test]
    fn lenenc_string_round_trip() {
        let mut out = Vec::new();
        write_string_lenenc(&mut out, "gopher");
        let (s, rest) = read_string_lenenc(&out).unwrap();
        assert_eq!(s, b"gopher");
        assert!(rest.is_empty());
    }

    #[test]
    fn null_marker_in_string_position() {
        let data = [0xFB, 0x01, b'x'];
        let (value, rest) = read_string_lenenc_or_null(&data).unwrap();
        assert_eq!(value, None);
        let (value, rest) = read_string_lenenc_or_null(rest).unwrap();
        assert_eq!(value, Some(&b"x"[..]));
        assert!(rest.is_empty());
    }

    #[test]
    fn null_terminated_string() {
        let data = b"hello\0world";
        let (s, rest) = read_string_null(data).unwrap();
        assert_eq!(s, b"hello");
        assert_eq!(rest, b"world");
        assert!(read_string_null(b"no terminator").is_err());
    }

    #[test]
    fn fixed_ints() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_int_2(&data).unwrap().0, 0x0201);
        assert_eq!(read_int_3(&data).unwrap().0, 0x030201);
        assert_eq!(read_int_4(&data).unwrap().0, 0x04030201);
        assert_eq!(read_int_8(&data).unwrap().0, 0x0807060504030201);
        assert!(read_int_8(&data[..7]).is_err());
    }

    #[test]
    fn floats_round_trip() {
        let mut out = Vec::new();
        write_float_4(&mut out, 1.25);
        write_float_8(&mut out, -2.5e100);
        let (f, rest) = read_float_4(&out).unwrap();
        assert_eq!(f, 1.25);
        let (d, rest) = read_float_8(rest).unwrap();
        assert_eq!(d, -2.5e100);
        assert!(rest.is_empty());
    }
}
