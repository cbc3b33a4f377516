use crate::protocol::util_sync;
use crate::{CqlError, CqlResult, ProtocolVersion};

// Wire codes of the type [option] in result metadata.
const CODE_CUSTOM: u16 = 0x0000;
const CODE_ASCII: u16 = 0x0001;
const CODE_BIGINT: u16 = 0x0002;
const CODE_BLOB: u16 = 0x0003;
const CODE_BOOLEAN: u16 = 0x0004;
const CODE_COUNTER: u16 = 0x0005;
const CODE_DECIMAL: u16 = 0x0006;
const CODE_DOUBLE: u16 = 0x0007;
const CODE_FLOAT: u16 = 0x0008;
const CODE_INT: u16 = 0x0009;
const CODE_TEXT: u16 = 0x000A;
const CODE_TIMESTAMP: u16 = 0x000B;
const CODE_UUID: u16 = 0x000C;
const CODE_VARCHAR: u16 = 0x000D;
const CODE_VARINT: u16 = 0x000E;
const CODE_TIMEUUID: u16 = 0x000F;
const CODE_INET: u16 = 0x0010;
const CODE_DATE: u16 = 0x0011;
const CODE_TIME: u16 = 0x0012;
const CODE_SMALLINT: u16 = 0x0013;
const CODE_TINYINT: u16 = 0x0014;
const CODE_DURATION: u16 = 0x0015;
const CODE_LIST: u16 = 0x0020;
const CODE_MAP: u16 = 0x0021;
const CODE_SET: u16 = 0x0022;
const CODE_UDT: u16 = 0x0030;
const CODE_TUPLE: u16 = 0x0031;

/// Descriptor of a CQL value type.
///
/// A composite descriptor fully determines the shapes of its children at all
/// depths; encoding and decoding of a [`CqlValue`](crate::CqlValue) are driven
/// by this tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CqlType {
    /// US-ASCII character string.
    Ascii,
    /// 64-bit signed integer.
    BigInt,
    /// Arbitrary bytes.
    Blob,
    /// true or false.
    Boolean,
    /// Distributed counter, read as a 64-bit signed integer.
    Counter,
    /// Arbitrary-precision decimal.
    Decimal,
    /// 64-bit IEEE 754 floating point number.
    Double,
    /// 32-bit IEEE 754 floating point number.
    Float,
    /// 32-bit signed integer.
    Int,
    /// UTF-8 character string.
    Text,
    /// Milliseconds since the unix epoch.
    Timestamp,
    /// Type 4 UUID.
    Uuid,
    /// Arbitrary-precision integer.
    Varint,
    /// Type 1 UUID, sortable by time.
    TimeUuid,
    /// IPv4 or IPv6 address.
    Inet,
    /// Days offset from the epoch-centered day number 2^31.
    Date,
    /// Nanoseconds since midnight.
    Time,
    /// 16-bit signed integer (protocol ≥ 3).
    SmallInt,
    /// 8-bit signed integer (protocol ≥ 3).
    TinyInt,
    /// Months, days and nanoseconds (protocol ≥ 4).
    Duration,
    /// Ordered collection of one element type.
    List(Box<CqlType>),
    /// Unordered collection of one element type.
    Set(Box<CqlType>),
    /// Key-value collection.
    Map(Box<CqlType>, Box<CqlType>),
    /// Fixed-arity heterogeneous sequence.
    Tuple(Vec<CqlType>),
    /// User-defined type with named, ordered fields.
    Udt {
        /// Keyspace the type is defined in.
        keyspace: String,
        /// Name of the type.
        name: String,
        /// Field names and types, in declaration order.
        fields: Vec<(String, CqlType)>,
    },
    /// Fixed-dimension vector of one element type.
    Vector(Box<CqlType>, usize),
    /// Server-side custom type, identified by its Java class name.
    Custom(String),
}

impl CqlType {
    /// The encoded size in bytes of a value of this type, when that size does
    /// not depend on the value. Vector packing relies on this.
    pub(crate) fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::TinyInt => Some(1),
            Self::SmallInt => Some(2),
            Self::Int | Self::Float | Self::Date => Some(4),
            Self::BigInt
            | Self::Counter
            | Self::Double
            | Self::Timestamp
            | Self::Time => Some(8),
            Self::Uuid | Self::TimeUuid => Some(16),
            _ => None,
        }
    }

    /// Parses a type [option] from result metadata.
    pub(crate) fn parse(
        rdr: &mut dyn std::io::Read,
        version: ProtocolVersion,
    ) -> CqlResult<Self> {
        let code = util_sync::read_short(rdr)?;
        Ok(match code {
            CODE_CUSTOM => Self::Custom(util_sync::read_string(rdr)?),
            CODE_ASCII => Self::Ascii,
            CODE_BIGINT => Self::BigInt,
            CODE_BLOB => Self::Blob,
            CODE_BOOLEAN => Self::Boolean,
            CODE_COUNTER => Self::Counter,
            CODE_DECIMAL => Self::Decimal,
            CODE_DOUBLE => Self::Double,
            CODE_FLOAT => Self::Float,
            CODE_INT => Self::Int,
            CODE_TEXT | CODE_VARCHAR => Self::Text,
            CODE_TIMESTAMP => Self::Timestamp,
            CODE_UUID => Self::Uuid,
            CODE_VARINT => Self::Varint,
            CODE_TIMEUUID => Self::TimeUuid,
            CODE_INET => Self::Inet,
            CODE_DATE => Self::Date,
            CODE_TIME => Self::Time,
            CODE_SMALLINT => Self::SmallInt,
            CODE_TINYINT => Self::TinyInt,
            CODE_DURATION => Self::Duration,
            CODE_LIST => Self::List(Box::new(Self::parse(rdr, version)?)),
            CODE_SET => Self::Set(Box::new(Self::parse(rdr, version)?)),
            CODE_MAP => {
                let key = Self::parse(rdr, version)?;
                let value = Self::parse(rdr, version)?;
                Self::Map(Box::new(key), Box::new(value))
            }
            CODE_TUPLE => {
                let n = util_sync::read_short(rdr)?;
                let mut elems = Vec::with_capacity(n.into());
                for _ in 0..n {
                    elems.push(Self::parse(rdr, version)?);
                }
                Self::Tuple(elems)
            }
            CODE_UDT => {
                let keyspace = util_sync::read_string(rdr)?;
                let name = util_sync::read_string(rdr)?;
                let n = util_sync::read_short(rdr)?;
                let mut fields = Vec::with_capacity(n.into());
                for _ in 0..n {
                    let field_name = util_sync::read_string(rdr)?;
                    let field_type = Self::parse(rdr, version)?;
                    fields.push((field_name, field_type));
                }
                Self::Udt {
                    keyspace,
                    name,
                    fields,
                }
            }
            code => {
                return Err(CqlError::FrameFormat(format!(
                    "illegal type option code 0x{code:04X}"
                )))
            }
        })
    }

    /// Emits this descriptor as a type [option]; the inverse of `parse`.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write) -> CqlResult<()> {
        match self {
            Self::Custom(class) => {
                util_sync::write_short(CODE_CUSTOM, w)?;
                util_sync::write_string(class, w)?;
            }
            Self::Ascii => util_sync::write_short(CODE_ASCII, w)?,
            Self::BigInt => util_sync::write_short(CODE_BIGINT, w)?,
            Self::Blob => util_sync::write_short(CODE_BLOB, w)?,
            Self::Boolean => util_sync::write_short(CODE_BOOLEAN, w)?,
            Self::Counter => util_sync::write_short(CODE_COUNTER, w)?,
            Self::Decimal => util_sync::write_short(CODE_DECIMAL, w)?,
            Self::Double => util_sync::write_short(CODE_DOUBLE, w)?,
            Self::Float => util_sync::write_short(CODE_FLOAT, w)?,
            Self::Int => util_sync::write_short(CODE_INT, w)?,
            Self::Text => util_sync::write_short(CODE_VARCHAR, w)?,
            Self::Timestamp => util_sync::write_short(CODE_TIMESTAMP, w)?,
            Self::Uuid => util_sync::write_short(CODE_UUID, w)?,
            Self::Varint => util_sync::write_short(CODE_VARINT, w)?,
            Self::TimeUuid => util_sync::write_short(CODE_TIMEUUID, w)?,
            Self::Inet => util_sync::write_short(CODE_INET, w)?,
            Self::Date => util_sync::write_short(CODE_DATE, w)?,
            Self::Time => util_sync::write_short(CODE_TIME, w)?,
            Self::SmallInt => util_sync::write_short(CODE_SMALLINT, w)?,
            Self::TinyInt => util_sync::write_short(CODE_TINYINT, w)?,
            Self::Duration => util_sync::write_short(CODE_DURATION, w)?,
            Self::List(elem) => {
                util_sync::write_short(CODE_LIST, w)?;
                elem.emit(w)?;
            }
            Self::Set(elem) => {
                util_sync::write_short(CODE_SET, w)?;
                elem.emit(w)?;
            }
            Self::Map(key, value) => {
                util_sync::write_short(CODE_MAP, w)?;
                key.emit(w)?;
                value.emit(w)?;
            }
            Self::Tuple(elems) => {
                util_sync::write_short(CODE_TUPLE, w)?;
                util_sync::write_short(elems.len() as u16, w)?;
                for elem in elems {
                    elem.emit(w)?;
                }
            }
            Self::Udt {
                keyspace,
                name,
                fields,
            } => {
                util_sync::write_short(CODE_UDT, w)?;
                util_sync::write_string(keyspace, w)?;
                util_sync::write_string(name, w)?;
                util_sync::write_short(fields.len() as u16, w)?;
                for (field_name, field_type) in fields {
                    util_sync::write_string(field_name, w)?;
                    field_type.emit(w)?;
                }
            }
            Self::Vector(elem, dimension) => {
                // vectors travel as a parameterized custom type
                util_sync::write_short(CODE_CUSTOM, w)?;
                util_sync::write_string(
                    &format!("org.apache.cassandra.db.marshal.VectorType({elem}, {dimension})"),
                    w,
                )?;
            }
        }
        Ok(())
    }

    /// The minimum protocol version this type can travel on.
    pub(crate) fn minimum_version(&self) -> ProtocolVersion {
        match self {
            Self::TinyInt | Self::SmallInt | Self::Date | Self::Time => ProtocolVersion::V3,
            Self::Duration => ProtocolVersion::V4,
            Self::List(elem) | Self::Set(elem) | Self::Vector(elem, _) => elem.minimum_version(),
            Self::Map(key, value) => key.minimum_version().max(value.minimum_version()),
            Self::Tuple(elems) => elems
                .iter()
                .map(Self::minimum_version)
                .max()
                .unwrap_or(ProtocolVersion::V1),
            Self::Udt { fields, .. } => fields
                .iter()
                .map(|(_, t)| t.minimum_version())
                .max()
                .unwrap_or(ProtocolVersion::V1),
            _ => ProtocolVersion::V1,
        }
    }
}

impl std::fmt::Display for CqlType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Ascii => write!(fmt, "ascii"),
            Self::BigInt => write!(fmt, "bigint"),
            Self::Blob => write!(fmt, "blob"),
            Self::Boolean => write!(fmt, "boolean"),
            Self::Counter => write!(fmt, "counter"),
            Self::Decimal => write!(fmt, "decimal"),
            Self::Double => write!(fmt, "double"),
            Self::Float => write!(fmt, "float"),
            Self::Int => write!(fmt, "int"),
            Self::Text => write!(fmt, "text"),
            Self::Timestamp => write!(fmt, "timestamp"),
            Self::Uuid => write!(fmt, "uuid"),
            Self::Varint => write!(fmt, "varint"),
            Self::TimeUuid => write!(fmt, "timeuuid"),
            Self::Inet => write!(fmt, "inet"),
            Self::Date => write!(fmt, "date"),
            Self::Time => write!(fmt, "time"),
            Self::SmallInt => write!(fmt, "smallint"),
            Self::TinyInt => write!(fmt, "tinyint"),
            Self::Duration => write!(fmt, "duration"),
            Self::List(elem) => write!(fmt, "list<{elem}>"),
            Self::Set(elem) => write!(fmt, "set<{elem}>"),
            Self::Map(key, value) => write!(fmt, "map<{key}, {value}>"),
            Self::Tuple(elems) => {
                write!(fmt, "tuple<")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{elem}")?;
                }
                write!(fmt, ">")
            }
            Self::Udt {
                keyspace, name, ..
            } => write!(fmt, "{keyspace}.{name}"),
            Self::Vector(elem, dimension) => write!(fmt, "vector<{elem}, {dimension}>"),
            Self::Custom(class) => write!(fmt, "'{class}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CqlType;
    use crate::ProtocolVersion;
    use std::io::Cursor;

    #[test]
    fn nested_option_round_trip() {
        let t = CqlType::Map(
            Box::new(CqlType::Text),
            Box::new(CqlType::List(Box::new(CqlType::Udt {
                keyspace: "ks".to_string(),
                name: "addr".to_string(),
                fields: vec![
                    ("street".to_string(), CqlType::Text),
                    ("zip".to_string(), CqlType::Int),
                ],
            }))),
        );
        let mut buf = Vec::new();
        t.emit(&mut buf).unwrap();
        let parsed = CqlType::parse(&mut Cursor::new(buf), ProtocolVersion::V4).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn version_floor_of_composites() {
        assert_eq!(
            CqlType::List(Box::new(CqlType::SmallInt)).minimum_version(),
            ProtocolVersion::V3
        );
        assert_eq!(
            CqlType::Tuple(vec![CqlType::Text, CqlType::Duration]).minimum_version(),
            ProtocolVersion::V4
        );
        assert_eq!(CqlType::Text.minimum_version(), ProtocolVersion::V1);
    }
}
