//! Read and write helpers for the notation elements of the protocol
//! ([short], [int], [string], [bytes], ...), operating on in-memory buffers.
//!
//! Reads map a premature end of the buffer to [`CqlError::FrameFormat`]:
//! response bodies are always materialized completely before parsing, so
//! running out of bytes means the frame is corrupt.

use crate::{CqlError, CqlResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub(crate) fn eof(e: &std::io::Error) -> CqlError {
    CqlError::FrameFormat(format!("response body ends prematurely: {e}"))
}

pub(crate) fn read_byte(rdr: &mut dyn std::io::Read) -> CqlResult<u8> {
    rdr.read_u8().map_err(|e| eof(&e))
}

pub(crate) fn read_short(rdr: &mut dyn std::io::Read) -> CqlResult<u16> {
    rdr.read_u16::<BigEndian>().map_err(|e| eof(&e))
}

pub(crate) fn read_int(rdr: &mut dyn std::io::Read) -> CqlResult<i32> {
    rdr.read_i32::<BigEndian>().map_err(|e| eof(&e))
}

pub(crate) fn read_raw(rdr: &mut dyn std::io::Read, len: usize) -> CqlResult<Vec<u8>> {
    let mut buf = vec![0; len];
    rdr.read_exact(&mut buf).map_err(|e| eof(&e))?;
    Ok(buf)
}

pub(crate) fn read_string(rdr: &mut dyn std::io::Read) -> CqlResult<String> {
    let len = read_short(rdr)? as usize;
    String::from_utf8(read_raw(rdr, len)?)
        .map_err(|e| CqlError::FrameFormat(format!("non-utf8 [string]: {e}")))
}

pub(crate) fn read_short_bytes(rdr: &mut dyn std::io::Read) -> CqlResult<Vec<u8>> {
    let len = read_short(rdr)? as usize;
    read_raw(rdr, len)
}

/// Reads a [bytes] element; a negative length denotes null.
pub(crate) fn read_bytes(rdr: &mut dyn std::io::Read) -> CqlResult<Option<Vec<u8>>> {
    let len = read_int(rdr)?;
    if len < 0 {
        Ok(None)
    } else {
        #[allow(clippy::cast_sign_loss)]
        Ok(Some(read_raw(rdr, len as usize)?))
    }
}

pub(crate) fn read_string_list(rdr: &mut dyn std::io::Read) -> CqlResult<Vec<String>> {
    let n = read_short(rdr)?;
    let mut list = Vec::with_capacity(n.into());
    for _ in 0..n {
        list.push(read_string(rdr)?);
    }
    Ok(list)
}

pub(crate) fn read_string_multimap(
    rdr: &mut dyn std::io::Read,
) -> CqlResult<HashMap<String, Vec<String>>> {
    let n = read_short(rdr)?;
    let mut map = HashMap::with_capacity(n.into());
    for _ in 0..n {
        let key = read_string(rdr)?;
        let values = read_string_list(rdr)?;
        map.insert(key, values);
    }
    Ok(map)
}

pub(crate) fn read_bytes_map(
    rdr: &mut dyn std::io::Read,
) -> CqlResult<HashMap<String, Option<Vec<u8>>>> {
    let n = read_short(rdr)?;
    let mut map = HashMap::with_capacity(n.into());
    for _ in 0..n {
        let key = read_string(rdr)?;
        let value = read_bytes(rdr)?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Reads an [inetaddr]: 4 or 16 raw address bytes behind a 1-byte size.
pub(crate) fn read_inetaddr(rdr: &mut dyn std::io::Read) -> CqlResult<IpAddr> {
    let size = read_byte(rdr)?;
    match size {
        4 => {
            let mut octets = [0_u8; 4];
            rdr.read_exact(&mut octets).map_err(|e| eof(&e))?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let mut octets = [0_u8; 16];
            rdr.read_exact(&mut octets).map_err(|e| eof(&e))?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        size => Err(CqlError::FrameFormat(format!(
            "illegal [inetaddr] size {size}"
        ))),
    }
}

/// Reads an [inet]: an [inetaddr] followed by an [int] port.
pub(crate) fn read_inet(rdr: &mut dyn std::io::Read) -> CqlResult<SocketAddr> {
    let addr = read_inetaddr(rdr)?;
    let port = read_int(rdr)?;
    #[allow(clippy::cast_sign_loss)]
    Ok(SocketAddr::new(addr, port as u16))
}

// --- writers; infallible on Vec targets, io errors propagate ---

pub(crate) fn write_short(v: u16, w: &mut dyn std::io::Write) -> CqlResult<()> {
    w.write_u16::<BigEndian>(v)?;
    Ok(())
}

pub(crate) fn write_int(v: i32, w: &mut dyn std::io::Write) -> CqlResult<()> {
    w.write_i32::<BigEndian>(v)?;
    Ok(())
}

pub(crate) fn write_long(v: i64, w: &mut dyn std::io::Write) -> CqlResult<()> {
    w.write_i64::<BigEndian>(v)?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_string(s: &str, w: &mut dyn std::io::Write) -> CqlResult<()> {
    if s.len() > usize::from(u16::MAX) {
        return Err(CqlError::UsageDetailed(format!(
            "[string] too long: {} bytes",
            s.len()
        )));
    }
    write_short(s.len() as u16, w)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn write_long_string(s: &str, w: &mut dyn std::io::Write) -> CqlResult<()> {
    write_int(s.len() as i32, w)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_short_bytes(b: &[u8], w: &mut dyn std::io::Write) -> CqlResult<()> {
    if b.len() > usize::from(u16::MAX) {
        return Err(CqlError::UsageDetailed(format!(
            "[short bytes] too long: {} bytes",
            b.len()
        )));
    }
    write_short(b.len() as u16, w)?;
    w.write_all(b)?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn write_bytes(b: Option<&[u8]>, w: &mut dyn std::io::Write) -> CqlResult<()> {
    match b {
        Some(b) => {
            write_int(b.len() as i32, w)?;
            w.write_all(b)?;
        }
        None => write_int(-1, w)?,
    }
    Ok(())
}

/// Writes the UNSET marker of a bind value (length -2, protocol ≥ 4).
pub(crate) fn write_unset(w: &mut dyn std::io::Write) -> CqlResult<()> {
    write_int(-2, w)
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_string_map(
    entries: &[(String, String)],
    w: &mut dyn std::io::Write,
) -> CqlResult<()> {
    write_short(entries.len() as u16, w)?;
    for (key, value) in entries {
        write_string(key, w)?;
        write_string(value, w)?;
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_string_list(list: &[String], w: &mut dyn std::io::Write) -> CqlResult<()> {
    write_short(list.len() as u16, w)?;
    for s in list {
        write_string(s, w)?;
    }
    Ok(())
}

// --- vint encoding (protocol ≥ 4; durations, vectors) ---

/// Writes an unsigned vint: the number of leading 1-bits of the first byte
/// gives the number of extra bytes; the value follows big-endian.
pub(crate) fn write_unsigned_vint(v: u64, w: &mut dyn std::io::Write) -> CqlResult<()> {
    let bits = 64 - (v | 1).leading_zeros() as usize;
    let total = (bits + 6) / 7;
    if total > 8 {
        w.write_u8(0xFF)?;
        w.write_all(&v.to_be_bytes())?;
        return Ok(());
    }
    let extra = total - 1;
    #[allow(clippy::cast_possible_truncation)]
    let first_mask = if extra == 0 {
        0
    } else {
        (0xFF_u16 << (8 - extra)) as u8
    };
    #[allow(clippy::cast_possible_truncation)]
    w.write_u8(first_mask | ((v >> (8 * extra)) as u8))?;
    for i in (0..extra).rev() {
        #[allow(clippy::cast_possible_truncation)]
        w.write_u8((v >> (8 * i)) as u8)?;
    }
    Ok(())
}

pub(crate) fn read_unsigned_vint(rdr: &mut dyn std::io::Read) -> CqlResult<u64> {
    let first = read_byte(rdr)?;
    let extra = first.leading_ones() as usize;
    let mut v = if extra >= 8 {
        0
    } else {
        u64::from(first & (0xFF >> extra))
    };
    for _ in 0..extra {
        v = (v << 8) | u64::from(read_byte(rdr)?);
    }
    Ok(v)
}

/// Writes a signed vint (zigzag over the unsigned form).
#[allow(clippy::cast_sign_loss)]
pub(crate) fn write_vint(v: i64, w: &mut dyn std::io::Write) -> CqlResult<()> {
    write_unsigned_vint(((v << 1) ^ (v >> 63)) as u64, w)
}

#[allow(clippy::cast_possible_wrap)]
pub(crate) fn read_vint(rdr: &mut dyn std::io::Read) -> CqlResult<i64> {
    let u = read_unsigned_vint(rdr)?;
    Ok(((u >> 1) as i64) ^ -((u & 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_string("sé", &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x03, 0x73, 0xC3, 0xA9]);
        assert_eq!(read_string(&mut Cursor::new(buf)).unwrap(), "sé");
    }

    #[test]
    fn bytes_null_round_trip() {
        let mut buf = Vec::new();
        write_bytes(None, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_bytes(&mut Cursor::new(buf)).unwrap(), None);
    }

    #[test]
    fn truncated_body_is_a_frame_format_error() {
        let err = read_int(&mut Cursor::new(vec![0x00, 0x01])).unwrap_err();
        assert!(matches!(err, crate::CqlError::FrameFormat(_)));
    }

    #[test]
    fn unsigned_vint_boundaries() {
        for v in [
            0_u64,
            1,
            127,
            128,
            0x3FFF,
            0x4000,
            u64::from(u32::MAX),
            u64::MAX - 1,
            u64::MAX,
        ] {
            let mut buf = Vec::new();
            write_unsigned_vint(v, &mut buf).unwrap();
            let mut rdr = Cursor::new(buf);
            assert_eq!(read_unsigned_vint(&mut rdr).unwrap(), v);
        }
        // one byte for 7 bits, two bytes with a 10xxxxxx first byte for 14
        let mut buf = Vec::new();
        write_unsigned_vint(127, &mut buf).unwrap();
        assert_eq!(buf, [0x7F]);
        buf.clear();
        write_unsigned_vint(0x3FFF, &mut buf).unwrap();
        assert_eq!(buf, [0xBF, 0xFF]);
    }

    #[test]
    fn signed_vint_zigzags() {
        let mut buf = Vec::new();
        write_vint(-1, &mut buf).unwrap();
        assert_eq!(buf, [0x01]);
        buf.clear();
        write_vint(1, &mut buf).unwrap();
        assert_eq!(buf, [0x02]);
        for v in [0_i64, -1, 1, i64::MIN, i64::MAX, -123_456_789] {
            let mut buf = Vec::new();
            write_vint(v, &mut buf).unwrap();
            assert_eq!(read_vint(&mut Cursor::new(buf)).unwrap(), v);
        }
    }
}
