use crate::configuration::Compression;
use crate::protocol::parts::Consistency;
use crate::protocol::{util_sync, Opcode, ProtocolVersion};
use crate::statement::BatchKind;
use crate::{CqlError, CqlResult};
use byteorder::WriteBytesExt;

const FLAG_VALUES: i32 = 0x01;
const FLAG_SKIP_METADATA: i32 = 0x02;
const FLAG_PAGE_SIZE: i32 = 0x04;
const FLAG_WITH_PAGING_STATE: i32 = 0x08;
const FLAG_WITH_SERIAL_CONSISTENCY: i32 = 0x10;
const FLAG_WITH_DEFAULT_TIMESTAMP: i32 = 0x20;
const FLAG_WITH_NAMES: i32 = 0x40;
const FLAG_WITH_KEYSPACE: i32 = 0x80;
const FLAG_WITH_NOW_IN_SECONDS: i32 = 0x100;

const PREPARE_FLAG_WITH_KEYSPACE: i32 = 0x01;

/// A bind value in its serialized form.
#[derive(Clone, Debug)]
pub(crate) enum WireValue {
    Null,
    Unset,
    Bytes(Vec<u8>),
}

impl WireValue {
    fn emit(&self, version: ProtocolVersion, w: &mut Vec<u8>) -> CqlResult<()> {
        match self {
            Self::Null => util_sync::write_bytes(None, w),
            Self::Unset => {
                if !version.supports_unset() {
                    return Err(CqlError::UsageDetailed(format!(
                        "unset values require protocol 4, connection speaks {version}"
                    )));
                }
                util_sync::write_unset(w)
            }
            Self::Bytes(bytes) => util_sync::write_bytes(Some(bytes), w),
        }
    }
}

/// The parameter block shared by QUERY and EXECUTE.
#[derive(Debug, Default)]
pub(crate) struct QueryParameters {
    pub(crate) consistency: Consistency,
    pub(crate) values: Vec<WireValue>,
    /// Bind marker names, parallel to `values` (protocol ≥ 3).
    pub(crate) names: Option<Vec<String>>,
    pub(crate) skip_metadata: bool,
    pub(crate) page_size: Option<i32>,
    pub(crate) paging_state: Option<Vec<u8>>,
    pub(crate) serial_consistency: Option<Consistency>,
    pub(crate) timestamp: Option<i64>,
    /// Per-request keyspace (protocol ≥ 5).
    pub(crate) keyspace: Option<String>,
    pub(crate) now_in_seconds: Option<i32>,
}

impl QueryParameters {
    fn flags(&self, version: ProtocolVersion) -> i32 {
        let mut flags = 0;
        if !self.values.is_empty() {
            flags |= FLAG_VALUES;
        }
        if self.skip_metadata {
            flags |= FLAG_SKIP_METADATA;
        }
        if self.page_size.is_some() {
            flags |= FLAG_PAGE_SIZE;
        }
        if self.paging_state.is_some() {
            flags |= FLAG_WITH_PAGING_STATE;
        }
        if self.serial_consistency.is_some() {
            flags |= FLAG_WITH_SERIAL_CONSISTENCY;
        }
        if self.timestamp.is_some() {
            flags |= FLAG_WITH_DEFAULT_TIMESTAMP;
        }
        if self.names.is_some() {
            flags |= FLAG_WITH_NAMES;
        }
        if version.supports_per_request_keyspace() {
            if self.keyspace.is_some() {
                flags |= FLAG_WITH_KEYSPACE;
            }
            if self.now_in_seconds.is_some() {
                flags |= FLAG_WITH_NOW_IN_SECONDS;
            }
        }
        flags
    }

    #[allow(clippy::cast_possible_truncation)]
    fn emit(&self, version: ProtocolVersion, w: &mut Vec<u8>) -> CqlResult<()> {
        if let Some(names) = &self.names {
            if !version.supports_named_values() {
                return Err(CqlError::UsageDetailed(format!(
                    "named bind values require protocol 3, connection speaks {version}"
                )));
            }
            if names.len() != self.values.len() {
                return Err(CqlError::Internal("bind names out of step with values"));
            }
        }
        self.consistency.emit(w)?;
        let flags = self.flags(version);
        if version.supports_per_request_keyspace() {
            util_sync::write_int(flags, w)?;
        } else {
            w.write_u8(flags as u8)?;
        }
        if !self.values.is_empty() {
            util_sync::write_short(self.values.len() as u16, w)?;
            for (i, value) in self.values.iter().enumerate() {
                if let Some(names) = &self.names {
                    util_sync::write_string(&names[i], w)?;
                }
                value.emit(version, w)?;
            }
        }
        if let Some(page_size) = self.page_size {
            util_sync::write_int(page_size, w)?;
        }
        if let Some(paging_state) = &self.paging_state {
            util_sync::write_bytes(Some(paging_state), w)?;
        }
        if let Some(serial_consistency) = self.serial_consistency {
            serial_consistency.emit(w)?;
        }
        if let Some(timestamp) = self.timestamp {
            util_sync::write_long(timestamp, w)?;
        }
        if version.supports_per_request_keyspace() {
            if let Some(keyspace) = &self.keyspace {
                util_sync::write_string(keyspace, w)?;
            }
            if let Some(now_in_seconds) = self.now_in_seconds {
                util_sync::write_int(now_in_seconds, w)?;
            }
        }
        Ok(())
    }
}

/// One child of a BATCH request.
#[derive(Debug)]
pub(crate) enum BatchChild {
    Query {
        cql: String,
        values: Vec<WireValue>,
    },
    Prepared {
        id: Vec<u8>,
        values: Vec<WireValue>,
    },
}

/// A request message; `emit` produces the frame body.
#[derive(Debug)]
pub(crate) enum Request {
    Options,
    Startup {
        compression: Compression,
    },
    AuthResponse {
        token: Vec<u8>,
    },
    Register {
        event_types: Vec<String>,
    },
    Query {
        cql: String,
        parameters: QueryParameters,
    },
    Prepare {
        cql: String,
        keyspace: Option<String>,
    },
    Execute {
        id: Vec<u8>,
        result_metadata_id: Option<Vec<u8>>,
        parameters: QueryParameters,
    },
    Batch {
        kind: BatchKind,
        children: Vec<BatchChild>,
        parameters: QueryParameters,
    },
}

impl Request {
    pub(crate) fn opcode(&self) -> Opcode {
        match self {
            Self::Options => Opcode::Options,
            Self::Startup { .. } => Opcode::Startup,
            Self::AuthResponse { .. } => Opcode::AuthResponse,
            Self::Register { .. } => Opcode::Register,
            Self::Query { .. } => Opcode::Query,
            Self::Prepare { .. } => Opcode::Prepare,
            Self::Execute { .. } => Opcode::Execute,
            Self::Batch { .. } => Opcode::Batch,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn emit(&self, version: ProtocolVersion) -> CqlResult<Vec<u8>> {
        let mut w = Vec::new();
        match self {
            Self::Options => {}
            Self::Startup { compression } => {
                let mut entries = vec![("CQL_VERSION".to_string(), "3.0.0".to_string())];
                if *compression == Compression::Lz4 {
                    entries.push(("COMPRESSION".to_string(), "lz4".to_string()));
                }
                util_sync::write_string_map(&entries, &mut w)?;
            }
            Self::AuthResponse { token } => {
                util_sync::write_bytes(Some(token), &mut w)?;
            }
            Self::Register { event_types } => {
                util_sync::write_string_list(event_types, &mut w)?;
            }
            Self::Query { cql, parameters } => {
                util_sync::write_long_string(cql, &mut w)?;
                if version == ProtocolVersion::V1 {
                    // protocol 1 queries carry no bind values and no flags
                    if !parameters.values.is_empty() {
                        return Err(CqlError::UsageDetailed(
                            "bind values on QUERY require protocol 2".to_string(),
                        ));
                    }
                    parameters.consistency.emit(&mut w)?;
                } else {
                    parameters.emit(version, &mut w)?;
                }
            }
            Self::Prepare { cql, keyspace } => {
                util_sync::write_long_string(cql, &mut w)?;
                if version.supports_per_request_keyspace() {
                    match keyspace {
                        Some(keyspace) => {
                            util_sync::write_int(PREPARE_FLAG_WITH_KEYSPACE, &mut w)?;
                            util_sync::write_string(keyspace, &mut w)?;
                        }
                        None => util_sync::write_int(0, &mut w)?,
                    }
                }
            }
            Self::Execute {
                id,
                result_metadata_id,
                parameters,
            } => {
                util_sync::write_short_bytes(id, &mut w)?;
                if version.supports_result_metadata_id() {
                    let result_metadata_id = result_metadata_id.as_ref().ok_or(
                        CqlError::Internal("EXECUTE on protocol 5 without a result metadata id"),
                    )?;
                    util_sync::write_short_bytes(result_metadata_id, &mut w)?;
                }
                if version == ProtocolVersion::V1 {
                    util_sync::write_short(parameters.values.len() as u16, &mut w)?;
                    for value in &parameters.values {
                        value.emit(version, &mut w)?;
                    }
                    parameters.consistency.emit(&mut w)?;
                } else {
                    parameters.emit(version, &mut w)?;
                }
            }
            Self::Batch {
                kind,
                children,
                parameters,
            } => {
                if version < ProtocolVersion::V2 {
                    return Err(CqlError::UsageDetailed(
                        "BATCH requires protocol 2".to_string(),
                    ));
                }
                w.write_u8(*kind as u8)?;
                util_sync::write_short(children.len() as u16, &mut w)?;
                for child in children {
                    match child {
                        BatchChild::Query { cql, values } => {
                            w.write_u8(0)?;
                            util_sync::write_long_string(cql, &mut w)?;
                            util_sync::write_short(values.len() as u16, &mut w)?;
                            for value in values {
                                value.emit(version, &mut w)?;
                            }
                        }
                        BatchChild::Prepared { id, values } => {
                            w.write_u8(1)?;
                            util_sync::write_short_bytes(id, &mut w)?;
                            util_sync::write_short(values.len() as u16, &mut w)?;
                            for value in values {
                                value.emit(version, &mut w)?;
                            }
                        }
                    }
                }
                parameters.consistency.emit(&mut w)?;
                if version >= ProtocolVersion::V3 {
                    let flags = parameters.flags(version)
                        & (FLAG_WITH_SERIAL_CONSISTENCY
                            | FLAG_WITH_DEFAULT_TIMESTAMP
                            | FLAG_WITH_KEYSPACE
                            | FLAG_WITH_NOW_IN_SECONDS);
                    if version.supports_per_request_keyspace() {
                        util_sync::write_int(flags, &mut w)?;
                    } else {
                        w.write_u8(flags as u8)?;
                    }
                    if let Some(serial_consistency) = parameters.serial_consistency {
                        serial_consistency.emit(&mut w)?;
                    }
                    if let Some(timestamp) = parameters.timestamp {
                        util_sync::write_long(timestamp, &mut w)?;
                    }
                    if version.supports_per_request_keyspace() {
                        if let Some(keyspace) = &parameters.keyspace {
                            util_sync::write_string(keyspace, &mut w)?;
                        }
                        if let Some(now_in_seconds) = parameters.now_in_seconds {
                            util_sync::write_int(now_in_seconds, &mut w)?;
                        }
                    }
                }
            }
        }
        Ok(w)
    }
}
