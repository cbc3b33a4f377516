use crate::protocol::parts::CqlType;
use crate::protocol::util_sync;
use crate::types_impl::{
    date::{CqlDate, CqlTime, CqlTimestamp},
    decimal, duration::CqlDuration,
};
use crate::{CqlError, CqlResult, ProtocolVersion};
use bigdecimal::BigDecimal;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_bigint::BigInt;
use std::io::Cursor;
use std::net::IpAddr;
use uuid::Uuid;

/// Enum for all supported CQL value types.
///
/// Values are encoded and decoded against a [`CqlType`] descriptor; the
/// descriptor drives the wire shape, the value carries the runtime payload.
#[derive(Clone, Debug, PartialEq)]
pub enum CqlValue {
    /// Representation of a database NULL value.
    Null,
    /// Leaves a bind variable unset (protocol ≥ 4).
    Unset,
    /// US-ASCII character string.
    Ascii(String),
    /// UTF-8 character string.
    Text(String),
    /// Arbitrary bytes.
    Blob(Vec<u8>),
    /// true or false.
    Boolean(bool),
    /// Stores an 8-bit signed integer (protocol ≥ 3).
    TinyInt(i8),
    /// Stores a 16-bit signed integer (protocol ≥ 3).
    SmallInt(i16),
    /// Stores a 32-bit signed integer.
    Int(i32),
    /// Stores a 64-bit signed integer.
    BigInt(i64),
    /// Reading of a distributed counter.
    Counter(i64),
    /// Stores a single-precision 32-bit floating-point number.
    Float(f32),
    /// Stores a double-precision 64-bit floating-point number.
    Double(f64),
    /// Arbitrary-precision decimal.
    Decimal(BigDecimal),
    /// Arbitrary-precision integer.
    Varint(BigInt),
    /// Milliseconds since the unix epoch.
    Timestamp(CqlTimestamp),
    /// Day number (see [`CqlDate`](crate::types::CqlDate)).
    Date(CqlDate),
    /// Nanoseconds since midnight.
    Time(CqlTime),
    /// Months, days and nanoseconds (protocol ≥ 4).
    Duration(CqlDuration),
    /// Type 4 UUID.
    Uuid(Uuid),
    /// Type 1 UUID, sortable by time.
    TimeUuid(Uuid),
    /// IPv4 or IPv6 address.
    Inet(IpAddr),
    /// Ordered collection.
    List(Vec<CqlValue>),
    /// Unordered collection; kept in decode order.
    Set(Vec<CqlValue>),
    /// Key-value collection; wire output preserves insertion order, decode
    /// order is whatever the server sent.
    Map(Vec<(CqlValue, CqlValue)>),
    /// Fixed-arity heterogeneous sequence.
    Tuple(Vec<CqlValue>),
    /// User-defined type value with named fields in declaration order.
    Udt {
        /// Keyspace of the type.
        keyspace: String,
        /// Name of the type.
        name: String,
        /// Field names and values.
        fields: Vec<(String, CqlValue)>,
    },
    /// Fixed-dimension vector.
    Vector(Vec<CqlValue>),
    /// Raw bytes of a server-side custom type.
    Custom(Vec<u8>),
}

impl CqlValue {
    /// Returns true if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(*self, CqlValue::Null)
    }

    /// Encodes the value against the given descriptor into its wire bytes
    /// (without the enclosing length prefix).
    ///
    /// Fails with [`CqlError::InvalidType`] when the runtime shape of the
    /// value does not fit the descriptor, and with
    /// [`CqlError::NullInCollection`] when a NULL sits inside a list, set or
    /// map.
    pub fn encode(&self, ty: &CqlType, version: ProtocolVersion) -> CqlResult<Vec<u8>> {
        if version < ty.minimum_version() {
            return Err(CqlError::InvalidType(format!(
                "type {ty} requires protocol {} but the connection speaks {version}",
                ty.minimum_version()
            )));
        }
        let mut buf = Vec::new();
        self.encode_into(ty, version, &mut buf)?;
        Ok(buf)
    }

    #[allow(clippy::too_many_lines)]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_possible_wrap)]
    fn encode_into(
        &self,
        ty: &CqlType,
        version: ProtocolVersion,
        w: &mut Vec<u8>,
    ) -> CqlResult<()> {
        match (self, ty) {
            (CqlValue::Ascii(s), CqlType::Ascii) => {
                if !s.is_ascii() {
                    return Err(CqlError::InvalidValue(format!(
                        "non-ASCII content in an ascii value: {s:?}"
                    )));
                }
                w.extend_from_slice(s.as_bytes());
            }
            (CqlValue::Ascii(s) | CqlValue::Text(s), CqlType::Text) => {
                w.extend_from_slice(s.as_bytes());
            }
            (CqlValue::Text(s), CqlType::Ascii) => {
                if !s.is_ascii() {
                    return Err(CqlError::InvalidValue(format!(
                        "non-ASCII content in an ascii value: {s:?}"
                    )));
                }
                w.extend_from_slice(s.as_bytes());
            }
            (CqlValue::Blob(b), CqlType::Blob) | (CqlValue::Custom(b), CqlType::Custom(_)) => {
                w.extend_from_slice(b);
            }
            (CqlValue::Boolean(b), CqlType::Boolean) => w.write_u8(u8::from(*b))?,
            (CqlValue::TinyInt(i), CqlType::TinyInt) => w.write_i8(*i)?,
            (CqlValue::SmallInt(i), CqlType::SmallInt) => w.write_i16::<BigEndian>(*i)?,
            (CqlValue::Int(i), CqlType::Int) => w.write_i32::<BigEndian>(*i)?,
            (CqlValue::BigInt(i), CqlType::BigInt)
            | (CqlValue::Counter(i) | CqlValue::BigInt(i), CqlType::Counter)
            | (CqlValue::Counter(i), CqlType::BigInt) => w.write_i64::<BigEndian>(*i)?,
            (CqlValue::Float(f), CqlType::Float) => w.write_f32::<BigEndian>(*f)?,
            (CqlValue::Double(f), CqlType::Double) => w.write_f64::<BigEndian>(*f)?,
            (CqlValue::Decimal(d), CqlType::Decimal) => decimal::emit_decimal(d, w)?,
            (CqlValue::Varint(v), CqlType::Varint) => decimal::emit_varint(v, w)?,
            (CqlValue::Timestamp(ts), CqlType::Timestamp) => {
                w.write_i64::<BigEndian>(ts.millis())?;
            }
            (CqlValue::Date(d), CqlType::Date) => w.write_u32::<BigEndian>(d.raw())?,
            (CqlValue::Time(t), CqlType::Time) => w.write_i64::<BigEndian>(t.nanos())?,
            (CqlValue::Duration(d), CqlType::Duration) => d.emit(w)?,
            (CqlValue::Uuid(u), CqlType::Uuid | CqlType::TimeUuid)
            | (CqlValue::TimeUuid(u), CqlType::TimeUuid | CqlType::Uuid) => {
                w.extend_from_slice(u.as_bytes());
            }
            (CqlValue::Inet(addr), CqlType::Inet) => match addr {
                IpAddr::V4(v4) => w.extend_from_slice(&v4.octets()),
                IpAddr::V6(v6) => w.extend_from_slice(&v6.octets()),
            },
            (CqlValue::List(elems) | CqlValue::Set(elems), CqlType::List(elem_ty))
            | (CqlValue::Set(elems) | CqlValue::List(elems), CqlType::Set(elem_ty)) => {
                write_collection_count(elems.len(), version, w)?;
                for elem in elems {
                    encode_element(elem, elem_ty, version, w)?;
                }
            }
            (CqlValue::Map(entries), CqlType::Map(key_ty, value_ty)) => {
                write_collection_count(entries.len(), version, w)?;
                for (key, value) in entries {
                    encode_element(key, key_ty, version, w)?;
                    encode_element(value, value_ty, version, w)?;
                }
            }
            (CqlValue::Tuple(elems), CqlType::Tuple(elem_tys)) => {
                if elems.len() != elem_tys.len() {
                    return Err(CqlError::InvalidType(format!(
                        "tuple arity mismatch: {} values for {} declared elements",
                        elems.len(),
                        elem_tys.len()
                    )));
                }
                for (elem, elem_ty) in elems.iter().zip(elem_tys) {
                    if elem.is_null() {
                        util_sync::write_int(-1, w)?;
                    } else {
                        let bytes = elem.encode(elem_ty, version)?;
                        util_sync::write_bytes(Some(&bytes), w)?;
                    }
                }
            }
            (
                CqlValue::Udt { fields, .. },
                CqlType::Udt {
                    fields: field_tys, ..
                },
            ) => {
                for (field_name, field_ty) in field_tys {
                    let field_value = fields
                        .iter()
                        .find(|(name, _)| name == field_name)
                        .map(|(_, v)| v);
                    match field_value {
                        None | Some(CqlValue::Null) => util_sync::write_int(-1, w)?,
                        Some(value) => {
                            let bytes = value.encode(field_ty, version)?;
                            util_sync::write_bytes(Some(&bytes), w)?;
                        }
                    }
                }
            }
            (CqlValue::Vector(elems) | CqlValue::List(elems), CqlType::Vector(elem_ty, dimension)) => {
                if elems.len() != *dimension {
                    return Err(CqlError::InvalidType(format!(
                        "vector dimension mismatch: {} values for dimension {}",
                        elems.len(),
                        dimension
                    )));
                }
                let fixed = elem_ty.fixed_size();
                for elem in elems {
                    if elem.is_null() {
                        return Err(CqlError::NullInCollection);
                    }
                    let bytes = elem.encode(elem_ty, version)?;
                    match fixed {
                        Some(size) => {
                            debug_assert_eq!(bytes.len(), size);
                            w.extend_from_slice(&bytes);
                        }
                        None => {
                            util_sync::write_unsigned_vint(bytes.len() as u64, w)?;
                            w.extend_from_slice(&bytes);
                        }
                    }
                }
            }
            (CqlValue::Null | CqlValue::Unset, _) => {
                return Err(CqlError::Internal(
                    "null and unset are written by the enclosing value serializer",
                ));
            }
            (value, ty) => {
                return Err(CqlError::InvalidType(format!(
                    "a {} value cannot be encoded as {ty}",
                    value.variant_name()
                )));
            }
        }
        Ok(())
    }

    /// Decodes wire bytes against the given descriptor.
    ///
    /// The whole input must be consumed; trailing garbage fails with
    /// [`CqlError::InvalidValue`].
    #[allow(clippy::too_many_lines)]
    pub fn decode(bytes: &[u8], ty: &CqlType, version: ProtocolVersion) -> CqlResult<CqlValue> {
        if version < ty.minimum_version() {
            return Err(CqlError::InvalidType(format!(
                "type {ty} requires protocol {} but the connection speaks {version}",
                ty.minimum_version()
            )));
        }
        let mut rdr = Cursor::new(bytes);
        let value = Self::parse(&mut rdr, bytes, ty, version)?;
        if rdr.position() != bytes.len() as u64 {
            return Err(CqlError::InvalidValue(format!(
                "{} trailing bytes after a {ty} value",
                bytes.len() as u64 - rdr.position()
            )));
        }
        Ok(value)
    }

    #[allow(clippy::too_many_lines)]
    #[allow(clippy::cast_sign_loss)]
    fn parse(
        rdr: &mut Cursor<&[u8]>,
        bytes: &[u8],
        ty: &CqlType,
        version: ProtocolVersion,
    ) -> CqlResult<CqlValue> {
        Ok(match ty {
            CqlType::Ascii => {
                let s = string_from_remainder(rdr, bytes)?;
                if !s.is_ascii() {
                    return Err(CqlError::InvalidValue(format!(
                        "non-ASCII content in an ascii value: {s:?}"
                    )));
                }
                CqlValue::Ascii(s)
            }
            CqlType::Text => CqlValue::Text(string_from_remainder(rdr, bytes)?),
            CqlType::Blob => CqlValue::Blob(take_remainder(rdr, bytes)),
            CqlType::Custom(_) => CqlValue::Custom(take_remainder(rdr, bytes)),
            CqlType::Boolean => CqlValue::Boolean(read(rdr, |r| r.read_u8())? != 0),
            CqlType::TinyInt => CqlValue::TinyInt(read(rdr, |r| r.read_i8())?),
            CqlType::SmallInt => {
                CqlValue::SmallInt(read(rdr, |r| r.read_i16::<BigEndian>())?)
            }
            CqlType::Int => CqlValue::Int(read(rdr, |r| r.read_i32::<BigEndian>())?),
            CqlType::BigInt => CqlValue::BigInt(read(rdr, |r| r.read_i64::<BigEndian>())?),
            CqlType::Counter => CqlValue::Counter(read(rdr, |r| r.read_i64::<BigEndian>())?),
            CqlType::Float => CqlValue::Float(read(rdr, |r| r.read_f32::<BigEndian>())?),
            CqlType::Double => CqlValue::Double(read(rdr, |r| r.read_f64::<BigEndian>())?),
            CqlType::Decimal => {
                let value = decimal::parse_decimal(&take_remainder(rdr, bytes))?;
                CqlValue::Decimal(value)
            }
            CqlType::Varint => {
                let value = decimal::parse_varint(&take_remainder(rdr, bytes))?;
                CqlValue::Varint(value)
            }
            CqlType::Timestamp => {
                CqlValue::Timestamp(CqlTimestamp::new(read(rdr, |r| r.read_i64::<BigEndian>())?))
            }
            CqlType::Date => {
                CqlValue::Date(CqlDate::new(read(rdr, |r| r.read_u32::<BigEndian>())?))
            }
            CqlType::Time => {
                let nanos = read(rdr, |r| r.read_i64::<BigEndian>())?;
                CqlValue::Time(CqlTime::new(nanos)?)
            }
            CqlType::Duration => CqlValue::Duration(CqlDuration::parse(rdr)?),
            CqlType::Uuid => CqlValue::Uuid(parse_uuid(rdr)?),
            CqlType::TimeUuid => CqlValue::TimeUuid(parse_uuid(rdr)?),
            CqlType::Inet => {
                let remainder = take_remainder(rdr, bytes);
                match remainder.len() {
                    4 => {
                        let mut octets = [0_u8; 4];
                        octets.copy_from_slice(&remainder);
                        CqlValue::Inet(IpAddr::from(octets))
                    }
                    16 => {
                        let mut octets = [0_u8; 16];
                        octets.copy_from_slice(&remainder);
                        CqlValue::Inet(IpAddr::from(octets))
                    }
                    n => {
                        return Err(CqlError::InvalidValue(format!(
                            "inet value must have 4 or 16 bytes, found {n}"
                        )))
                    }
                }
            }
            CqlType::List(elem_ty) => {
                CqlValue::List(parse_elements(rdr, bytes, elem_ty, version)?)
            }
            CqlType::Set(elem_ty) => CqlValue::Set(parse_elements(rdr, bytes, elem_ty, version)?),
            CqlType::Map(key_ty, value_ty) => {
                // a zero-length body is the empty map on every version
                if bytes.is_empty() {
                    return Ok(CqlValue::Map(Vec::new()));
                }
                let count = read_collection_count(rdr, version)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = parse_element(rdr, key_ty, version)?;
                    let value = parse_element(rdr, value_ty, version)?;
                    entries.push((key, value));
                }
                CqlValue::Map(entries)
            }
            CqlType::Tuple(elem_tys) => {
                let mut elems = Vec::with_capacity(elem_tys.len());
                for elem_ty in elem_tys {
                    elems.push(parse_element(rdr, elem_ty, version)?);
                }
                CqlValue::Tuple(elems)
            }
            CqlType::Udt {
                keyspace,
                name,
                fields: field_tys,
            } => {
                let mut fields = Vec::with_capacity(field_tys.len());
                for (field_name, field_ty) in field_tys {
                    // missing trailing fields decode as null (the type may
                    // have grown since the value was written)
                    let value = if rdr.position() == bytes.len() as u64 {
                        CqlValue::Null
                    } else {
                        parse_element(rdr, field_ty, version)?
                    };
                    fields.push((field_name.clone(), value));
                }
                CqlValue::Udt {
                    keyspace: keyspace.clone(),
                    name: name.clone(),
                    fields,
                }
            }
            CqlType::Vector(elem_ty, dimension) => {
                let fixed = elem_ty.fixed_size();
                let mut elems = Vec::with_capacity(*dimension);
                for _ in 0..*dimension {
                    let elem_bytes = match fixed {
                        Some(size) => {
                            let mut buf = vec![0; size];
                            rdr.read_exact(&mut buf).map_err(|e| {
                                CqlError::InvalidValue(format!("vector ends prematurely: {e}"))
                            })?;
                            buf
                        }
                        None => {
                            let len = util_sync::read_unsigned_vint(rdr)?;
                            let len = usize::try_from(len).map_err(|_| {
                                CqlError::InvalidValue(format!("vector element of {len} bytes"))
                            })?;
                            let mut buf = vec![0; len];
                            rdr.read_exact(&mut buf).map_err(|e| {
                                CqlError::InvalidValue(format!("vector ends prematurely: {e}"))
                            })?;
                            buf
                        }
                    };
                    elems.push(CqlValue::decode(&elem_bytes, elem_ty, version)?);
                }
                CqlValue::Vector(elems)
            }
        })
    }

    /// Infers a descriptor from the runtime shape of this value.
    ///
    /// Collections must be non-empty and homogeneous; fails with
    /// [`CqlError::Unencodable`] otherwise.
    pub fn infer_type(&self) -> CqlResult<CqlType> {
        Ok(match self {
            CqlValue::Null | CqlValue::Unset => {
                return Err(CqlError::Unencodable("no type can be inferred from null"))
            }
            CqlValue::Ascii(_) | CqlValue::Text(_) => CqlType::Text,
            CqlValue::Blob(_) => CqlType::Blob,
            CqlValue::Boolean(_) => CqlType::Boolean,
            CqlValue::TinyInt(_) => CqlType::TinyInt,
            CqlValue::SmallInt(_) => CqlType::SmallInt,
            CqlValue::Int(_) => CqlType::Int,
            CqlValue::BigInt(_) => CqlType::BigInt,
            CqlValue::Counter(_) => CqlType::Counter,
            CqlValue::Float(_) => CqlType::Float,
            CqlValue::Double(_) => CqlType::Double,
            CqlValue::Decimal(_) => CqlType::Decimal,
            CqlValue::Varint(_) => CqlType::Varint,
            CqlValue::Timestamp(_) => CqlType::Timestamp,
            CqlValue::Date(_) => CqlType::Date,
            CqlValue::Time(_) => CqlType::Time,
            CqlValue::Duration(_) => CqlType::Duration,
            CqlValue::Uuid(_) => CqlType::Uuid,
            CqlValue::TimeUuid(_) => CqlType::TimeUuid,
            CqlValue::Inet(_) => CqlType::Inet,
            CqlValue::List(elems) => CqlType::List(Box::new(infer_element_type(elems)?)),
            CqlValue::Set(elems) => CqlType::Set(Box::new(infer_element_type(elems)?)),
            CqlValue::Map(entries) => {
                let keys: Vec<CqlValue> = entries.iter().map(|(k, _)| k.clone()).collect();
                let values: Vec<CqlValue> = entries.iter().map(|(_, v)| v.clone()).collect();
                CqlType::Map(
                    Box::new(infer_element_type(&keys)?),
                    Box::new(infer_element_type(&values)?),
                )
            }
            CqlValue::Tuple(elems) => {
                let mut tys = Vec::with_capacity(elems.len());
                for elem in elems {
                    tys.push(elem.infer_type()?);
                }
                CqlType::Tuple(tys)
            }
            CqlValue::Udt {
                keyspace,
                name,
                fields,
            } => {
                let mut field_tys = Vec::with_capacity(fields.len());
                for (field_name, value) in fields {
                    field_tys.push((field_name.clone(), value.infer_type()?));
                }
                CqlType::Udt {
                    keyspace: keyspace.clone(),
                    name: name.clone(),
                    fields: field_tys,
                }
            }
            CqlValue::Vector(elems) => {
                CqlType::Vector(Box::new(infer_element_type(elems)?), elems.len())
            }
            CqlValue::Custom(_) => {
                return Err(CqlError::Unencodable(
                    "custom values cannot be inferred; provide a descriptor",
                ))
            }
        })
    }

    /// The canonical runtime value for a descriptor, used when the caller
    /// does not provide one.
    pub fn default_for(ty: &CqlType) -> CqlValue {
        match ty {
            CqlType::Ascii => CqlValue::Ascii(String::new()),
            CqlType::Text => CqlValue::Text(String::new()),
            CqlType::Blob => CqlValue::Blob(Vec::new()),
            CqlType::Boolean => CqlValue::Boolean(false),
            CqlType::TinyInt => CqlValue::TinyInt(0),
            CqlType::SmallInt => CqlValue::SmallInt(0),
            CqlType::Int => CqlValue::Int(0),
            CqlType::BigInt => CqlValue::BigInt(0),
            CqlType::Counter => CqlValue::Counter(0),
            CqlType::Float => CqlValue::Float(0.0),
            CqlType::Double => CqlValue::Double(0.0),
            CqlType::Decimal => CqlValue::Decimal(BigDecimal::from(0)),
            CqlType::Varint => CqlValue::Varint(BigInt::from(0)),
            CqlType::Timestamp => CqlValue::Timestamp(CqlTimestamp::new(0)),
            CqlType::Date => CqlValue::Date(CqlDate::EPOCH),
            CqlType::Time => CqlValue::Time(CqlTime::new_unchecked(0)),
            CqlType::Duration => CqlValue::Duration(CqlDuration {
                months: 0,
                days: 0,
                nanoseconds: 0,
            }),
            CqlType::Uuid => CqlValue::Uuid(Uuid::nil()),
            CqlType::TimeUuid => CqlValue::TimeUuid(Uuid::nil()),
            CqlType::Inet => CqlValue::Inet(IpAddr::from([0, 0, 0, 0])),
            CqlType::List(_) => CqlValue::List(Vec::new()),
            CqlType::Set(_) => CqlValue::Set(Vec::new()),
            CqlType::Map(_, _) => CqlValue::Map(Vec::new()),
            CqlType::Tuple(elem_tys) => {
                CqlValue::Tuple(elem_tys.iter().map(Self::default_for).collect())
            }
            CqlType::Udt {
                keyspace,
                name,
                fields,
            } => CqlValue::Udt {
                keyspace: keyspace.clone(),
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(n, t)| (n.clone(), Self::default_for(t)))
                    .collect(),
            },
            CqlType::Vector(elem_ty, dimension) => {
                CqlValue::Vector(vec![Self::default_for(elem_ty); *dimension])
            }
            CqlType::Custom(_) => CqlValue::Custom(Vec::new()),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Unset => "unset",
            CqlValue::Ascii(_) => "ascii",
            CqlValue::Text(_) => "text",
            CqlValue::Blob(_) => "blob",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::TinyInt(_) => "tinyint",
            CqlValue::SmallInt(_) => "smallint",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::Counter(_) => "counter",
            CqlValue::Float(_) => "float",
            CqlValue::Double(_) => "double",
            CqlValue::Decimal(_) => "decimal",
            CqlValue::Varint(_) => "varint",
            CqlValue::Timestamp(_) => "timestamp",
            CqlValue::Date(_) => "date",
            CqlValue::Time(_) => "time",
            CqlValue::Duration(_) => "duration",
            CqlValue::Uuid(_) => "uuid",
            CqlValue::TimeUuid(_) => "timeuuid",
            CqlValue::Inet(_) => "inet",
            CqlValue::List(_) => "list",
            CqlValue::Set(_) => "set",
            CqlValue::Map(_) => "map",
            CqlValue::Tuple(_) => "tuple",
            CqlValue::Udt { .. } => "udt",
            CqlValue::Vector(_) => "vector",
            CqlValue::Custom(_) => "custom",
        }
    }
}

fn infer_element_type(elems: &[CqlValue]) -> CqlResult<CqlType> {
    let first = elems
        .iter()
        .find(|e| !e.is_null())
        .ok_or(CqlError::Unencodable(
            "element type of an empty collection cannot be inferred",
        ))?;
    let ty = first.infer_type()?;
    for elem in elems {
        if !elem.is_null() && elem.infer_type()? != ty {
            return Err(CqlError::Unencodable("collection elements are not homogeneous"));
        }
    }
    Ok(ty)
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
fn write_collection_count(
    count: usize,
    version: ProtocolVersion,
    w: &mut Vec<u8>,
) -> CqlResult<()> {
    if version.uses_int_collection_lengths() {
        util_sync::write_int(count as i32, w)
    } else {
        if count > usize::from(u16::MAX) {
            return Err(CqlError::InvalidType(format!(
                "collection of {count} elements exceeds the 16-bit count of protocol {version}"
            )));
        }
        util_sync::write_short(count as u16, w)
    }
}

fn read_collection_count(
    rdr: &mut Cursor<&[u8]>,
    version: ProtocolVersion,
) -> CqlResult<usize> {
    if version.uses_int_collection_lengths() {
        let count = util_sync::read_int(rdr)?;
        usize::try_from(count)
            .map_err(|_| CqlError::InvalidValue(format!("negative element count {count}")))
    } else {
        Ok(usize::from(util_sync::read_short(rdr)?))
    }
}

// Writes one collection element with its length prefix; NULL is refused.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
fn encode_element(
    elem: &CqlValue,
    elem_ty: &CqlType,
    version: ProtocolVersion,
    w: &mut Vec<u8>,
) -> CqlResult<()> {
    match elem {
        CqlValue::Null => Err(CqlError::NullInCollection),
        CqlValue::Unset => Err(CqlError::InvalidType(
            "unset cannot be used inside a collection".to_string(),
        )),
        elem => {
            let bytes = elem.encode(elem_ty, version)?;
            if version.uses_int_collection_lengths() {
                util_sync::write_bytes(Some(&bytes), w)
            } else {
                util_sync::write_short_bytes(&bytes, w)
            }
        }
    }
}

// Reads one length-prefixed element; a negative length yields NULL, which the
// server legitimately produces inside lists, sets, maps, tuples, and UDTs.
fn parse_element(
    rdr: &mut Cursor<&[u8]>,
    elem_ty: &CqlType,
    version: ProtocolVersion,
) -> CqlResult<CqlValue> {
    let elem_bytes = if version.uses_int_collection_lengths() {
        util_sync::read_bytes(rdr)?
    } else {
        Some(util_sync::read_short_bytes(rdr)?)
    };
    match elem_bytes {
        None => Ok(CqlValue::Null),
        Some(bytes) => CqlValue::decode(&bytes, elem_ty, version),
    }
}

fn parse_elements(
    rdr: &mut Cursor<&[u8]>,
    bytes: &[u8],
    elem_ty: &CqlType,
    version: ProtocolVersion,
) -> CqlResult<Vec<CqlValue>> {
    // a zero-length body is the empty collection on every version
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let count = read_collection_count(rdr, version)?;
    let mut elems = Vec::with_capacity(count);
    for _ in 0..count {
        elems.push(parse_element(rdr, elem_ty, version)?);
    }
    Ok(elems)
}

fn parse_uuid(rdr: &mut Cursor<&[u8]>) -> CqlResult<Uuid> {
    let mut buf = [0_u8; 16];
    rdr.read_exact(&mut buf)
        .map_err(|e| CqlError::InvalidValue(format!("uuid value ends prematurely: {e}")))?;
    Ok(Uuid::from_bytes(buf))
}

fn read<T, R: Read>(
    rdr: &mut R,
    f: impl FnOnce(&mut R) -> std::io::Result<T>,
) -> CqlResult<T> {
    f(rdr).map_err(|e| CqlError::InvalidValue(format!("value ends prematurely: {e}")))
}

#[allow(clippy::cast_possible_truncation)]
fn take_remainder(rdr: &mut Cursor<&[u8]>, bytes: &[u8]) -> Vec<u8> {
    let pos = rdr.position() as usize;
    rdr.set_position(bytes.len() as u64);
    bytes[pos..].to_vec()
}

fn string_from_remainder(rdr: &mut Cursor<&[u8]>, bytes: &[u8]) -> CqlResult<String> {
    String::from_utf8(take_remainder(rdr, bytes))
        .map_err(|e| CqlError::InvalidValue(format!("non-utf8 text value: {e}")))
}

use std::io::Read;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    const ALL_VERSIONS: [ProtocolVersion; 5] = [
        ProtocolVersion::V1,
        ProtocolVersion::V2,
        ProtocolVersion::V3,
        ProtocolVersion::V4,
        ProtocolVersion::V5,
    ];

    fn round_trip(value: &CqlValue, ty: &CqlType, version: ProtocolVersion) {
        let bytes = value.encode(ty, version).unwrap();
        let decoded = CqlValue::decode(&bytes, ty, version).unwrap();
        assert_eq!(&decoded, value, "{ty} on {version}");
    }

    #[test]
    fn byte_stable_primitives() {
        let bytes = CqlValue::Double(1.0)
            .encode(&CqlType::Double, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);

        let bytes = CqlValue::Double(2.2)
            .encode(&CqlType::Double, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0x40, 0x01, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]);

        let bytes = CqlValue::Float(-1.0)
            .encode(&CqlType::Float, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0xBF, 0x80, 0x00, 0x00]);

        let bytes = CqlValue::Text("abc".to_string())
            .encode(&CqlType::Text, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0x61, 0x62, 0x63]);

        let bytes = CqlValue::TinyInt(-1)
            .encode(&CqlType::TinyInt, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0xFF]);
        let bytes = CqlValue::TinyInt(127)
            .encode(&CqlType::TinyInt, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0x7F]);
    }

    #[test]
    fn timestamp_decode_is_epoch_millis() {
        let bytes = [0x00, 0x00, 0x01, 0x50, 0xAC, 0xBA, 0x50, 0x00];
        let value =
            CqlValue::decode(&bytes, &CqlType::Timestamp, ProtocolVersion::V4).unwrap();
        assert_eq!(
            value,
            CqlValue::Timestamp(crate::types::CqlTimestamp::new(1_445_385_600_000))
        );
    }

    #[test]
    fn inet_v4_bytes() {
        let addr = IpAddr::V4(Ipv4Addr::new(1, 1, 5, 255));
        let bytes = CqlValue::Inet(addr)
            .encode(&CqlType::Inet, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(bytes, [0x01, 0x01, 0x05, 0xFF]);
        assert_eq!(
            CqlValue::decode(&bytes, &CqlType::Inet, ProtocolVersion::V4).unwrap(),
            CqlValue::Inet(addr)
        );
    }

    #[test]
    fn map_encoding_v3() {
        let ty = CqlType::Map(Box::new(CqlType::Text), Box::new(CqlType::Int));
        let value = CqlValue::Map(vec![
            (CqlValue::Text("key1".to_string()), CqlValue::Int(1)),
            (CqlValue::Text("key2".to_string()), CqlValue::Int(2)),
        ]);
        let bytes = value.encode(&ty, ProtocolVersion::V3).unwrap();
        assert_eq!(
            bytes,
            [
                0x00, 0x00, 0x00, 0x02, // element count
                0x00, 0x00, 0x00, 0x04, 0x6B, 0x65, 0x79, 0x31, // "key1"
                0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01, // 1
                0x00, 0x00, 0x00, 0x04, 0x6B, 0x65, 0x79, 0x32, // "key2"
                0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, // 2
            ]
        );
    }

    #[test]
    fn primitive_round_trips_on_all_versions() {
        let time_uuid = Uuid::from_str("c8d3b6f0-6f69-11ee-8c99-0242ac120002").unwrap();
        let cases: Vec<(CqlValue, CqlType)> = vec![
            (CqlValue::Ascii("plain".to_string()), CqlType::Ascii),
            (CqlValue::Text("grüße".to_string()), CqlType::Text),
            (CqlValue::Blob(vec![0, 1, 2, 255]), CqlType::Blob),
            (CqlValue::Boolean(true), CqlType::Boolean),
            (CqlValue::Int(i32::MIN), CqlType::Int),
            (CqlValue::BigInt(i64::MAX), CqlType::BigInt),
            (CqlValue::Counter(42), CqlType::Counter),
            (CqlValue::Float(3.5), CqlType::Float),
            (CqlValue::Double(-0.25), CqlType::Double),
            (
                CqlValue::Decimal(BigDecimal::from_str("-123.456").unwrap()),
                CqlType::Decimal,
            ),
            (
                CqlValue::Varint(BigInt::from_str("-98765432109876543210").unwrap()),
                CqlType::Varint,
            ),
            (
                CqlValue::Timestamp(crate::types::CqlTimestamp::new(-1)),
                CqlType::Timestamp,
            ),
            (CqlValue::Uuid(Uuid::nil()), CqlType::Uuid),
            (CqlValue::TimeUuid(time_uuid), CqlType::TimeUuid),
            (
                CqlValue::Inet(IpAddr::from([0x20, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1])),
                CqlType::Inet,
            ),
        ];
        for (value, ty) in &cases {
            for version in ALL_VERSIONS {
                round_trip(value, ty, version);
            }
        }
    }

    #[test]
    fn v3_only_types_are_gated() {
        let err = CqlValue::SmallInt(7)
            .encode(&CqlType::SmallInt, ProtocolVersion::V2)
            .unwrap_err();
        assert!(matches!(err, CqlError::InvalidType(_)));
        for version in [ProtocolVersion::V3, ProtocolVersion::V4, ProtocolVersion::V5] {
            round_trip(&CqlValue::SmallInt(-300), &CqlType::SmallInt, version);
            round_trip(&CqlValue::TinyInt(-3), &CqlType::TinyInt, version);
            round_trip(
                &CqlValue::Date(crate::types::CqlDate::from_ymd(2016, 2, 29).unwrap()),
                &CqlType::Date,
                version,
            );
            round_trip(
                &CqlValue::Time(crate::types::CqlTime::from_hms_milli(23, 59, 59, 999).unwrap()),
                &CqlType::Time,
                version,
            );
        }
        round_trip(
            &CqlValue::Duration(crate::types::CqlDuration::new(1, 2, 3).unwrap()),
            &CqlType::Duration,
            ProtocolVersion::V4,
        );
    }

    #[test]
    fn collection_round_trips() {
        let list_ty = CqlType::List(Box::new(CqlType::Text));
        let list = CqlValue::List(vec![
            CqlValue::Text("a".to_string()),
            CqlValue::Text("b".to_string()),
        ]);
        for version in ALL_VERSIONS {
            round_trip(&list, &list_ty, version);
        }

        let set_ty = CqlType::Set(Box::new(CqlType::Int));
        round_trip(
            &CqlValue::Set(vec![CqlValue::Int(3), CqlValue::Int(1)]),
            &set_ty,
            ProtocolVersion::V4,
        );

        let map_ty = CqlType::Map(Box::new(CqlType::Text), Box::new(CqlType::BigInt));
        round_trip(
            &CqlValue::Map(vec![
                (CqlValue::Text("x".to_string()), CqlValue::BigInt(-1)),
                (CqlValue::Text("y".to_string()), CqlValue::BigInt(2)),
            ]),
            &map_ty,
            ProtocolVersion::V2,
        );

        let nested_ty = CqlType::List(Box::new(CqlType::Map(
            Box::new(CqlType::Int),
            Box::new(CqlType::List(Box::new(CqlType::Text))),
        )));
        round_trip(
            &CqlValue::List(vec![CqlValue::Map(vec![(
                CqlValue::Int(1),
                CqlValue::List(vec![CqlValue::Text("deep".to_string())]),
            )])]),
            &nested_ty,
            ProtocolVersion::V5,
        );
    }

    #[test]
    fn null_in_collection_is_refused() {
        let list_ty = CqlType::List(Box::new(CqlType::Text));
        let err = CqlValue::List(vec![
            CqlValue::Text("a".to_string()),
            CqlValue::Null,
            CqlValue::Text("b".to_string()),
        ])
        .encode(&list_ty, ProtocolVersion::V4)
        .unwrap_err();
        assert!(matches!(err, CqlError::NullInCollection));

        let map_ty = CqlType::Map(Box::new(CqlType::Text), Box::new(CqlType::Text));
        let err = CqlValue::Map(vec![
            (
                CqlValue::Text("k1".to_string()),
                CqlValue::Text("v".to_string()),
            ),
            (CqlValue::Text("k2".to_string()), CqlValue::Null),
        ])
        .encode(&map_ty, ProtocolVersion::V4)
        .unwrap_err();
        assert!(matches!(err, CqlError::NullInCollection));
    }

    #[test]
    fn null_elements_from_the_server_are_accepted() {
        // count 2, one real element, one null (negative length)
        let body = [
            0x00, 0x00, 0x00, 0x02, //
            0x00, 0x00, 0x00, 0x01, 0x61, //
            0xFF, 0xFF, 0xFF, 0xFF,
        ];
        let value = CqlValue::decode(
            &body,
            &CqlType::List(Box::new(CqlType::Text)),
            ProtocolVersion::V4,
        )
        .unwrap();
        assert_eq!(
            value,
            CqlValue::List(vec![CqlValue::Text("a".to_string()), CqlValue::Null])
        );
    }

    #[test]
    fn empty_body_is_the_empty_collection() {
        for version in ALL_VERSIONS {
            assert_eq!(
                CqlValue::decode(&[], &CqlType::List(Box::new(CqlType::Int)), version).unwrap(),
                CqlValue::List(Vec::new())
            );
            assert_eq!(
                CqlValue::decode(
                    &[],
                    &CqlType::Map(Box::new(CqlType::Int), Box::new(CqlType::Int)),
                    version
                )
                .unwrap(),
                CqlValue::Map(Vec::new())
            );
        }
    }

    #[test]
    fn tuple_arity_is_enforced() {
        let ty = CqlType::Tuple(vec![CqlType::Int, CqlType::Text]);
        let value = CqlValue::Tuple(vec![
            CqlValue::Int(1),
            CqlValue::Text("one".to_string()),
        ]);
        round_trip(&value, &ty, ProtocolVersion::V4);
        // nulls are legal inside tuples
        round_trip(
            &CqlValue::Tuple(vec![CqlValue::Null, CqlValue::Text("x".to_string())]),
            &ty,
            ProtocolVersion::V4,
        );
        let err = CqlValue::Tuple(vec![CqlValue::Int(1)])
            .encode(&ty, ProtocolVersion::V4)
            .unwrap_err();
        assert!(matches!(err, CqlError::InvalidType(_)));
    }

    #[test]
    fn udt_round_trip_and_forward_compat() {
        let ty = CqlType::Udt {
            keyspace: "ks".to_string(),
            name: "address".to_string(),
            fields: vec![
                ("street".to_string(), CqlType::Text),
                ("zip".to_string(), CqlType::Int),
            ],
        };
        let value = CqlValue::Udt {
            keyspace: "ks".to_string(),
            name: "address".to_string(),
            fields: vec![
                (
                    "street".to_string(),
                    CqlValue::Text("Alte Gasse 1".to_string()),
                ),
                ("zip".to_string(), CqlValue::Int(60311)),
            ],
        };
        round_trip(&value, &ty, ProtocolVersion::V4);

        // a value written before the type gained "zip": the missing trailing
        // field decodes as null
        let short_value = CqlValue::Udt {
            keyspace: "ks".to_string(),
            name: "address".to_string(),
            fields: vec![(
                "street".to_string(),
                CqlValue::Text("Alte Gasse 1".to_string()),
            )],
        };
        let old_ty = CqlType::Udt {
            keyspace: "ks".to_string(),
            name: "address".to_string(),
            fields: vec![("street".to_string(), CqlType::Text)],
        };
        let bytes = short_value.encode(&old_ty, ProtocolVersion::V4).unwrap();
        let decoded = CqlValue::decode(&bytes, &ty, ProtocolVersion::V4).unwrap();
        assert_eq!(
            decoded,
            CqlValue::Udt {
                keyspace: "ks".to_string(),
                name: "address".to_string(),
                fields: vec![
                    (
                        "street".to_string(),
                        CqlValue::Text("Alte Gasse 1".to_string())
                    ),
                    ("zip".to_string(), CqlValue::Null),
                ],
            }
        );
    }

    #[test]
    fn vector_packs_fixed_size_elements() {
        let ty = CqlType::Vector(Box::new(CqlType::Float), 3);
        let value = CqlValue::Vector(vec![
            CqlValue::Float(1.0),
            CqlValue::Float(-2.0),
            CqlValue::Float(0.5),
        ]);
        let bytes = value.encode(&ty, ProtocolVersion::V4).unwrap();
        assert_eq!(bytes.len(), 12); // no per-element prefixes
        round_trip(&value, &ty, ProtocolVersion::V4);

        let text_ty = CqlType::Vector(Box::new(CqlType::Text), 2);
        let text_value = CqlValue::Vector(vec![
            CqlValue::Text("ab".to_string()),
            CqlValue::Text("cde".to_string()),
        ]);
        round_trip(&text_value, &text_ty, ProtocolVersion::V4);

        let err = CqlValue::Vector(vec![CqlValue::Float(1.0)])
            .encode(&ty, ProtocolVersion::V4)
            .unwrap_err();
        assert!(matches!(err, CqlError::InvalidType(_)));
    }

    #[test]
    fn type_inference() {
        assert_eq!(
            CqlValue::Text("x".to_string()).infer_type().unwrap(),
            CqlType::Text
        );
        assert_eq!(
            CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)])
                .infer_type()
                .unwrap(),
            CqlType::List(Box::new(CqlType::Int))
        );
        assert!(matches!(
            CqlValue::Null.infer_type().unwrap_err(),
            CqlError::Unencodable(_)
        ));
        assert!(matches!(
            CqlValue::List(vec![]).infer_type().unwrap_err(),
            CqlError::Unencodable(_)
        ));
        assert!(matches!(
            CqlValue::List(vec![CqlValue::Int(1), CqlValue::Text("x".to_string())])
                .infer_type()
                .unwrap_err(),
            CqlError::Unencodable(_)
        ));
    }

    #[test]
    fn shape_mismatch_is_an_invalid_type() {
        let err = CqlValue::Int(1)
            .encode(&CqlType::Text, ProtocolVersion::V4)
            .unwrap_err();
        assert!(matches!(err, CqlError::InvalidType(_)));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err =
            CqlValue::decode(&[0, 0, 0, 1, 0xFF], &CqlType::Int, ProtocolVersion::V4).unwrap_err();
        assert!(matches!(err, CqlError::InvalidValue(_)));
    }

    #[test]
    fn default_values_match_their_descriptors() {
        for ty in [
            CqlType::Text,
            CqlType::Int,
            CqlType::Uuid,
            CqlType::List(Box::new(CqlType::Int)),
            CqlType::Tuple(vec![CqlType::Int, CqlType::Boolean]),
        ] {
            let value = CqlValue::default_for(&ty);
            // every default value must be encodable against its descriptor
            value.encode(&ty, ProtocolVersion::V5).unwrap();
        }
    }
}
