use crate::cql_error::TimeoutKind;
use crate::protocol::parts::Consistency;
use crate::protocol::util_sync;
use crate::{CqlError, CqlResult, ProtocolVersion};

// Error codes of the ERROR message.
const CODE_SERVER_ERROR: i32 = 0x0000;
const CODE_PROTOCOL_ERROR: i32 = 0x000A;
const CODE_AUTH_ERROR: i32 = 0x0100;
const CODE_UNAVAILABLE: i32 = 0x1000;
const CODE_OVERLOADED: i32 = 0x1001;
const CODE_IS_BOOTSTRAPPING: i32 = 0x1002;
const CODE_TRUNCATE_ERROR: i32 = 0x1003;
const CODE_WRITE_TIMEOUT: i32 = 0x1100;
const CODE_READ_TIMEOUT: i32 = 0x1200;
const CODE_READ_FAILURE: i32 = 0x1300;
const CODE_FUNCTION_FAILURE: i32 = 0x1400;
const CODE_WRITE_FAILURE: i32 = 0x1500;
const CODE_SYNTAX_ERROR: i32 = 0x2000;
const CODE_UNAUTHORIZED: i32 = 0x2100;
const CODE_INVALID: i32 = 0x2200;
const CODE_CONFIG_ERROR: i32 = 0x2300;
const CODE_ALREADY_EXISTS: i32 = 0x2400;
const CODE_UNPREPARED: i32 = 0x2500;

/// An error reported by the database server that has no richer driver-side
/// representation; carries the server's raw error code and message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerError {
    code: i32,
    message: String,
}

impl ServerError {
    pub(crate) fn new(code: i32, message: String) -> Self {
        Self { code, message }
    }

    /// The server's raw error code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The server's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "server error 0x{:04X}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

/// The decoded body of an ERROR message.
///
/// UNPREPARED is kept apart because the request pipeline reacts to it with a
/// reprepare instead of surfacing it.
#[derive(Debug)]
pub(crate) enum ErrorBody {
    Unprepared {
        id: Vec<u8>,
        #[allow(dead_code)]
        message: String,
    },
    Failed(CqlError),
}

pub(crate) fn parse_error_body(
    rdr: &mut dyn std::io::Read,
    version: ProtocolVersion,
) -> CqlResult<ErrorBody> {
    let code = util_sync::read_int(rdr)?;
    let message = util_sync::read_string(rdr)?;
    trace!("parse_error_body(): code = 0x{code:04X}, message = {message}");
    Ok(match code {
        CODE_UNPREPARED => ErrorBody::Unprepared {
            id: util_sync::read_short_bytes(rdr)?,
            message,
        },
        code => ErrorBody::Failed(parse_failure(code, message, rdr, version)?),
    })
}

#[allow(clippy::too_many_lines)]
fn parse_failure(
    code: i32,
    message: String,
    rdr: &mut dyn std::io::Read,
    version: ProtocolVersion,
) -> CqlResult<CqlError> {
    Ok(match code {
        CODE_PROTOCOL_ERROR => CqlError::Protocol {
            version: version.as_u8(),
            message,
        },
        CODE_AUTH_ERROR => CqlError::Auth(message),
        CODE_UNAVAILABLE => {
            let consistency = Consistency::parse(rdr)?;
            let required = util_sync::read_int(rdr)?;
            let alive = util_sync::read_int(rdr)?;
            CqlError::Unavailable {
                consistency,
                required,
                alive,
            }
        }
        CODE_OVERLOADED => CqlError::Overloaded,
        CODE_IS_BOOTSTRAPPING => CqlError::IsBootstrapping,
        CODE_WRITE_TIMEOUT => {
            let consistency = Consistency::parse(rdr)?;
            let received = util_sync::read_int(rdr)?;
            let required = util_sync::read_int(rdr)?;
            let write_type = util_sync::read_string(rdr)?;
            CqlError::ServerTimeout {
                kind: TimeoutKind::Write,
                consistency,
                received,
                required,
                write_type: Some(write_type),
            }
        }
        CODE_READ_TIMEOUT => {
            let consistency = Consistency::parse(rdr)?;
            let received = util_sync::read_int(rdr)?;
            let required = util_sync::read_int(rdr)?;
            let _data_present = util_sync::read_byte(rdr)?;
            CqlError::ServerTimeout {
                kind: TimeoutKind::Read,
                consistency,
                received,
                required,
                write_type: None,
            }
        }
        CODE_READ_FAILURE => {
            let consistency = Consistency::parse(rdr)?;
            let received = util_sync::read_int(rdr)?;
            let required = util_sync::read_int(rdr)?;
            let num_failures = read_failures(rdr, version)?;
            let _data_present = util_sync::read_byte(rdr)?;
            CqlError::ReadFailure {
                consistency,
                received,
                required,
                num_failures,
            }
        }
        CODE_WRITE_FAILURE => {
            let consistency = Consistency::parse(rdr)?;
            let received = util_sync::read_int(rdr)?;
            let required = util_sync::read_int(rdr)?;
            let num_failures = read_failures(rdr, version)?;
            let write_type = util_sync::read_string(rdr)?;
            CqlError::WriteFailure {
                consistency,
                received,
                required,
                num_failures,
                write_type,
            }
        }
        CODE_ALREADY_EXISTS => {
            let keyspace = util_sync::read_string(rdr)?;
            let table = util_sync::read_string(rdr)?;
            CqlError::DbError {
                source: ServerError::new(
                    code,
                    format!("{message} (existing: {keyspace}.{table})"),
                ),
            }
        }
        CODE_SERVER_ERROR | CODE_TRUNCATE_ERROR | CODE_SYNTAX_ERROR | CODE_UNAUTHORIZED
        | CODE_INVALID | CODE_CONFIG_ERROR => CqlError::DbError {
            source: ServerError::new(code, message),
        },
        CODE_FUNCTION_FAILURE => {
            let keyspace = util_sync::read_string(rdr)?;
            let function = util_sync::read_string(rdr)?;
            let arg_types = util_sync::read_string_list(rdr)?;
            CqlError::DbError {
                source: ServerError::new(
                    code,
                    format!(
                        "{message} (function {keyspace}.{function}({}))",
                        arg_types.join(", ")
                    ),
                ),
            }
        }
        code => CqlError::DbError {
            source: ServerError::new(code, message),
        },
    })
}

// From protocol 5 on, failure counts travel as a reason map of
// (endpoint, code) pairs; before, as a plain count.
fn read_failures(rdr: &mut dyn std::io::Read, version: ProtocolVersion) -> CqlResult<i32> {
    if version >= ProtocolVersion::V5 {
        let n = util_sync::read_int(rdr)?;
        for _ in 0..n {
            let _endpoint = util_sync::read_inetaddr(rdr)?;
            let _code = util_sync::read_short(rdr)?;
        }
        Ok(n)
    } else {
        util_sync::read_int(rdr)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_error_body, ErrorBody};
    use crate::protocol::util_sync;
    use crate::{CqlError, ProtocolVersion};
    use std::io::Cursor;

    #[test]
    fn unprepared_carries_the_id() {
        let mut buf = Vec::new();
        util_sync::write_int(0x2500, &mut buf).unwrap();
        util_sync::write_string("prepare me first", &mut buf).unwrap();
        util_sync::write_short_bytes(&[0xAB, 0xCD], &mut buf).unwrap();
        match parse_error_body(&mut Cursor::new(buf), ProtocolVersion::V4).unwrap() {
            ErrorBody::Unprepared { id, .. } => assert_eq!(id, [0xAB, 0xCD]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn read_timeout_is_mapped() {
        let mut buf = Vec::new();
        util_sync::write_int(0x1200, &mut buf).unwrap();
        util_sync::write_string("timed out", &mut buf).unwrap();
        util_sync::write_short(0x0004, &mut buf).unwrap(); // QUORUM
        util_sync::write_int(1, &mut buf).unwrap();
        util_sync::write_int(2, &mut buf).unwrap();
        buf.push(0); // data_present
        match parse_error_body(&mut Cursor::new(buf), ProtocolVersion::V4).unwrap() {
            ErrorBody::Failed(CqlError::ServerTimeout {
                received, required, ..
            }) => {
                assert_eq!((received, required), (1, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
