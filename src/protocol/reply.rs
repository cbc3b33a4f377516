use crate::protocol::parts::{
    parse_error_body, parse_schema_change, ErrorBody, PreparedResponse, RowsMetadataEnvelope,
    SchemaChange, ServerEvent, SupportedOptions,
};
use crate::protocol::{
    util_sync, FrameHeader, Opcode, FLAG_CUSTOM_PAYLOAD, FLAG_TRACING, FLAG_WARNING,
};
use crate::{CqlError, CqlResult, ProtocolVersion};
use std::io::Cursor;
use uuid::Uuid;

const RESULT_VOID: i32 = 0x0001;
const RESULT_ROWS: i32 = 0x0002;
const RESULT_SET_KEYSPACE: i32 = 0x0003;
const RESULT_PREPARED: i32 = 0x0004;
const RESULT_SCHEMA_CHANGE: i32 = 0x0005;

/// One page of a Rows result: the metadata envelope and the raw cells,
/// positionally aligned with the metadata.
#[derive(Debug)]
pub(crate) struct RowsPage {
    pub(crate) envelope: RowsMetadataEnvelope,
    pub(crate) rows: Vec<Vec<Option<Vec<u8>>>>,
}

/// The variants of a RESULT message.
#[derive(Debug)]
pub(crate) enum ResultKind {
    Void,
    Rows(RowsPage),
    SetKeyspace(String),
    Prepared(PreparedResponse),
    #[allow(dead_code)]
    SchemaChange(SchemaChange),
}

/// A fully decoded response message.
#[derive(Debug)]
pub(crate) enum Reply {
    Ready,
    Authenticate { authenticator: String },
    AuthChallenge { token: Option<Vec<u8>> },
    AuthSuccess,
    Supported(SupportedOptions),
    Result(ResultKind),
    Error(ErrorBody),
    Event(ServerEvent),
}

impl Reply {
    /// Parses a response body. Every body must be consumed completely;
    /// leftover bytes fail with [`CqlError::FrameFormat`].
    pub(crate) fn parse(
        header: &FrameHeader,
        body: &[u8],
        version: ProtocolVersion,
    ) -> CqlResult<(Self, Option<Uuid>)> {
        let mut rdr = Cursor::new(body);

        let tracing_id = if header.has_flag(FLAG_TRACING) {
            let mut buf = [0_u8; 16];
            std::io::Read::read_exact(&mut rdr, &mut buf).map_err(|e| util_sync::eof(&e))?;
            Some(Uuid::from_bytes(buf))
        } else {
            None
        };
        if header.has_flag(FLAG_WARNING) {
            for warning in util_sync::read_string_list(&mut rdr)? {
                warn!("server warning: {warning}");
            }
        }
        if header.has_flag(FLAG_CUSTOM_PAYLOAD) {
            let _payload = util_sync::read_bytes_map(&mut rdr)?;
        }

        let reply = match header.opcode {
            Opcode::Ready => Self::Ready,
            Opcode::Authenticate => Self::Authenticate {
                authenticator: util_sync::read_string(&mut rdr)?,
            },
            Opcode::AuthChallenge => Self::AuthChallenge {
                token: util_sync::read_bytes(&mut rdr)?,
            },
            Opcode::AuthSuccess => {
                let _token = util_sync::read_bytes(&mut rdr)?;
                Self::AuthSuccess
            }
            Opcode::Supported => Self::Supported(SupportedOptions::parse(&mut rdr)?),
            Opcode::Result => Self::Result(parse_result(&mut rdr, version)?),
            Opcode::Error => Self::Error(parse_error_body(&mut rdr, version)?),
            Opcode::Event => Self::Event(ServerEvent::parse(&mut rdr)?),
            opcode => {
                return Err(CqlError::FrameFormat(format!(
                    "{opcode:?} is not a response opcode"
                )))
            }
        };

        if rdr.position() != body.len() as u64 {
            return Err(CqlError::FrameFormat(format!(
                "{} bytes left after parsing a {:?} body",
                body.len() as u64 - rdr.position(),
                header.opcode,
            )));
        }
        Ok((reply, tracing_id))
    }
}

fn parse_result(rdr: &mut Cursor<&[u8]>, version: ProtocolVersion) -> CqlResult<ResultKind> {
    let kind = util_sync::read_int(rdr)?;
    Ok(match kind {
        RESULT_VOID => ResultKind::Void,
        RESULT_ROWS => ResultKind::Rows(parse_rows(rdr, version)?),
        RESULT_SET_KEYSPACE => ResultKind::SetKeyspace(util_sync::read_string(rdr)?),
        RESULT_PREPARED => ResultKind::Prepared(PreparedResponse::parse(rdr, version)?),
        RESULT_SCHEMA_CHANGE => ResultKind::SchemaChange(parse_schema_change(rdr)?),
        kind => {
            return Err(CqlError::FrameFormat(format!(
                "illegal RESULT kind 0x{kind:04X}"
            )))
        }
    })
}

fn parse_rows(rdr: &mut Cursor<&[u8]>, version: ProtocolVersion) -> CqlResult<RowsPage> {
    let envelope = crate::protocol::parts::ResultSetMetadata::parse_for_rows(rdr, version)?;
    let rows_count = util_sync::read_int(rdr)?;
    let rows_count = usize::try_from(rows_count)
        .map_err(|_| CqlError::FrameFormat(format!("negative row count {rows_count}")))?;
    let mut rows = Vec::with_capacity(rows_count);
    for _ in 0..rows_count {
        let mut cells = Vec::with_capacity(envelope.columns_count);
        for _ in 0..envelope.columns_count {
            cells.push(util_sync::read_bytes(rdr)?);
        }
        rows.push(cells);
    }
    trace!(
        "parse_rows(): {} rows of {} columns",
        rows.len(),
        envelope.columns_count
    );
    Ok(RowsPage { envelope, rows })
}
