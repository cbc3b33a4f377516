use crate::configuration::Compression;
use crate::protocol::{Opcode, ProtocolVersion};
use crate::{CqlError, CqlResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub(crate) const FLAG_COMPRESSION: u8 = 0x01;
pub(crate) const FLAG_TRACING: u8 = 0x02;
pub(crate) const FLAG_CUSTOM_PAYLOAD: u8 = 0x04;
pub(crate) const FLAG_WARNING: u8 = 0x08;
pub(crate) const FLAG_USE_BETA: u8 = 0x10;

const RESPONSE_BIT: u8 = 0x80;

// Frames larger than this are considered corrupt before any allocation
// happens (native_protocol_v5 limits frames to 256 MB).
const MAX_BODY_LENGTH: u32 = 256 * 1024 * 1024;

/// The fixed-size header of a protocol frame: 9 bytes from protocol 3 on,
/// 8 bytes (with a 1-byte stream id) before.
#[derive(Debug)]
pub(crate) struct FrameHeader {
    pub(crate) version: ProtocolVersion,
    pub(crate) flags: u8,
    pub(crate) stream: i16,
    pub(crate) opcode: Opcode,
    pub(crate) body_length: u32,
}

impl FrameHeader {
    pub(crate) fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Assembles a complete request frame; compresses the body when compression
/// is negotiated (every frame after STARTUP).
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub(crate) fn encode_request(
    version: ProtocolVersion,
    mut flags: u8,
    stream: i16,
    opcode: Opcode,
    mut body: Vec<u8>,
    compression: Compression,
) -> CqlResult<Vec<u8>> {
    if compression == Compression::Lz4 && !body.is_empty() {
        flags |= FLAG_COMPRESSION;
        body = compress_body(&body);
    }
    let mut frame = Vec::with_capacity(version.header_size() + body.len());
    frame.push(version.as_u8());
    frame.push(flags);
    match version {
        ProtocolVersion::V1 | ProtocolVersion::V2 => {
            let stream = i8::try_from(stream).map_err(|_| {
                CqlError::Internal("stream id beyond the 1-byte range of protocol 1/2")
            })?;
            frame.push(stream as u8);
        }
        _ => frame.extend_from_slice(&stream.to_be_bytes()),
    }
    frame.push(opcode.as_u8());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads one frame from the stream; returns the header and the
/// (decompressed) body.
pub(crate) async fn read_frame<R: AsyncReadExt + Unpin>(
    rdr: &mut R,
    version: ProtocolVersion,
) -> CqlResult<(FrameHeader, Vec<u8>)> {
    let mut header_buf = [0_u8; 9];
    let header_size = version.header_size();
    rdr.read_exact(&mut header_buf[..header_size]).await?;

    let version_byte = header_buf[0];
    if version_byte & RESPONSE_BIT == 0 {
        return Err(CqlError::FrameFormat(
            "received a request frame from the server".to_string(),
        ));
    }
    let frame_version = ProtocolVersion::try_new(version_byte & !RESPONSE_BIT)?;
    let flags = header_buf[1];
    #[allow(clippy::cast_possible_wrap)]
    let (stream, opcode_pos) = match version {
        ProtocolVersion::V1 | ProtocolVersion::V2 => (i16::from(header_buf[2] as i8), 3),
        _ => (i16::from_be_bytes([header_buf[2], header_buf[3]]), 4),
    };
    let opcode = Opcode::try_new(header_buf[opcode_pos])?;
    let body_length = u32::from_be_bytes([
        header_buf[opcode_pos + 1],
        header_buf[opcode_pos + 2],
        header_buf[opcode_pos + 3],
        header_buf[opcode_pos + 4],
    ]);
    if body_length > MAX_BODY_LENGTH {
        return Err(CqlError::FrameFormat(format!(
            "body length {body_length} exceeds the protocol limit"
        )));
    }

    let mut body = vec![0; body_length as usize];
    rdr.read_exact(&mut body).await?;

    let header = FrameHeader {
        version: frame_version,
        flags,
        stream,
        opcode,
        body_length,
    };
    if header.has_flag(FLAG_COMPRESSION) && !body.is_empty() {
        body = decompress_body(&body)?;
    }
    trace!(
        "read_frame(): opcode = {:?}, stream = {}, {} body bytes ({} on the wire, {})",
        header.opcode,
        header.stream,
        body.len(),
        header.body_length,
        header.version,
    );
    Ok((header, body))
}

/// Writes a pre-assembled frame and flushes.
pub(crate) async fn write_frame<W: AsyncWriteExt + Unpin>(
    w: &mut W,
    frame: &[u8],
) -> CqlResult<()> {
    w.write_all(frame).await?;
    w.flush().await?;
    Ok(())
}

// LZ4 block with an explicit 4-byte big-endian uncompressed-length prefix.
#[allow(clippy::cast_possible_truncation)]
fn compress_body(body: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::with_capacity(4 + body.len() / 2);
    compressed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    compressed.extend_from_slice(&lz4_flex::block::compress(body));
    compressed
}

fn decompress_body(body: &[u8]) -> CqlResult<Vec<u8>> {
    if body.len() < 4 {
        return Err(CqlError::FrameFormat(format!(
            "compressed body of {} bytes is too short",
            body.len()
        )));
    }
    let uncompressed_length = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    if uncompressed_length > MAX_BODY_LENGTH {
        return Err(CqlError::FrameFormat(format!(
            "uncompressed length {uncompressed_length} exceeds the protocol limit"
        )));
    }
    Ok(lz4_flex::block::decompress(
        &body[4..],
        uncompressed_length as usize,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Compression;

    #[tokio::test]
    async fn v4_frame_round_trip() {
        let body = b"some body".to_vec();
        let frame = encode_request(
            ProtocolVersion::V4,
            0,
            277,
            Opcode::Query,
            body.clone(),
            Compression::None,
        )
        .unwrap();
        assert_eq!(frame.len(), 9 + body.len());
        assert_eq!(frame[0], 0x04);

        // flip the response bit to read it back
        let mut response = frame.clone();
        response[0] |= 0x80;
        let (header, read_body) = read_frame(&mut response.as_slice(), ProtocolVersion::V4)
            .await
            .unwrap();
        assert_eq!(header.stream, 277);
        assert_eq!(header.opcode, Opcode::Query);
        assert_eq!(read_body, body);
    }

    #[tokio::test]
    async fn v2_uses_the_short_header() {
        let frame = encode_request(
            ProtocolVersion::V2,
            0,
            5,
            Opcode::Options,
            Vec::new(),
            Compression::None,
        )
        .unwrap();
        assert_eq!(frame.len(), 8);
        let mut response = frame.clone();
        response[0] |= 0x80;
        let (header, body) = read_frame(&mut response.as_slice(), ProtocolVersion::V2)
            .await
            .unwrap();
        assert_eq!(header.stream, 5);
        assert!(body.is_empty());

        assert!(encode_request(
            ProtocolVersion::V2,
            0,
            300,
            Opcode::Options,
            Vec::new(),
            Compression::None,
        )
        .is_err());
    }

    #[tokio::test]
    async fn compressed_round_trip() {
        let body = vec![7_u8; 4096];
        let frame = encode_request(
            ProtocolVersion::V4,
            0,
            1,
            Opcode::Query,
            body.clone(),
            Compression::Lz4,
        )
        .unwrap();
        assert!(frame.len() < 9 + body.len());
        assert_eq!(frame[1] & FLAG_COMPRESSION, FLAG_COMPRESSION);
        let mut response = frame.clone();
        response[0] |= 0x80;
        let (header, read_body) = read_frame(&mut response.as_slice(), ProtocolVersion::V4)
            .await
            .unwrap();
        assert!(header.has_flag(FLAG_COMPRESSION));
        assert_eq!(read_body, body);
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let err = read_frame(&mut [0x84_u8, 0, 0].as_slice(), ProtocolVersion::V4)
            .await
            .unwrap_err();
        assert!(matches!(err, CqlError::Io { .. }));
    }
}
