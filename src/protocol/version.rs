use crate::{CqlError, CqlResult};

/// Version of the CQL binary protocol.
///
/// The driver negotiates the highest version both sides support, starting
/// from the configured maximum. All encodings are parameterized by this type.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ProtocolVersion {
    /// Protocol version 1.
    V1 = 1,
    /// Protocol version 2.
    V2 = 2,
    /// Protocol version 3.
    V3 = 3,
    /// Protocol version 4.
    V4 = 4,
    /// Protocol version 5.
    V5 = 5,
}

impl ProtocolVersion {
    /// The highest protocol version this client can speak.
    pub const MAX: Self = Self::V5;
    /// The lowest protocol version this client can speak.
    pub const MIN: Self = Self::V1;

    pub(crate) fn try_new(v: u8) -> CqlResult<Self> {
        Ok(match v {
            1 => Self::V1,
            2 => Self::V2,
            3 => Self::V3,
            4 => Self::V4,
            5 => Self::V5,
            v => {
                return Err(CqlError::Protocol {
                    version: v,
                    message: format!("unknown protocol version {v}"),
                })
            }
        })
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    /// The next lower version, for downward negotiation.
    pub(crate) fn predecessor(self) -> Option<Self> {
        match self {
            Self::V1 => None,
            Self::V2 => Some(Self::V1),
            Self::V3 => Some(Self::V2),
            Self::V4 => Some(Self::V3),
            Self::V5 => Some(Self::V4),
        }
    }

    /// Size in bytes of the frame header.
    pub(crate) fn header_size(self) -> usize {
        match self {
            Self::V1 | Self::V2 => 8,
            _ => 9,
        }
    }

    /// Number of concurrently usable stream ids per connection.
    pub(crate) fn max_streams(self) -> usize {
        match self {
            Self::V1 | Self::V2 => 128,
            _ => 32_768,
        }
    }

    /// Named bind parameters are supported from version 3 on.
    pub(crate) fn supports_named_values(self) -> bool {
        self >= Self::V3
    }

    /// The UNSET bind value is supported from version 4 on.
    pub(crate) fn supports_unset(self) -> bool {
        self >= Self::V4
    }

    /// A per-request keyspace can be carried from version 5 on.
    pub(crate) fn supports_per_request_keyspace(self) -> bool {
        self >= Self::V5
    }

    /// Result-metadata ids rotate on schema change from version 5 on.
    pub(crate) fn supports_result_metadata_id(self) -> bool {
        self >= Self::V5
    }

    /// Collections carry 4-byte element counts and lengths from version 3 on.
    pub(crate) fn uses_int_collection_lengths(self) -> bool {
        self >= Self::V3
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "v{}", *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::ProtocolVersion;

    #[test]
    fn negotiation_walks_downward() {
        let mut v = Some(ProtocolVersion::MAX);
        let mut seen = Vec::new();
        while let Some(version) = v {
            seen.push(version.as_u8());
            v = version.predecessor();
        }
        assert_eq!(seen, [5, 4, 3, 2, 1]);
    }

    #[test]
    fn capabilities() {
        assert!(!ProtocolVersion::V2.supports_named_values());
        assert!(ProtocolVersion::V3.supports_named_values());
        assert!(!ProtocolVersion::V3.supports_unset());
        assert!(ProtocolVersion::V4.supports_unset());
        assert!(!ProtocolVersion::V4.supports_result_metadata_id());
        assert!(ProtocolVersion::V5.supports_result_metadata_id());
        assert_eq!(ProtocolVersion::V2.header_size(), 8);
        assert_eq!(ProtocolVersion::V2.max_streams(), 128);
        assert_eq!(ProtocolVersion::V4.header_size(), 9);
        assert_eq!(ProtocolVersion::V4.max_streams(), 32_768);
    }
}
