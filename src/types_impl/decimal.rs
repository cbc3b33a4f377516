//! Wire form of the CQL `decimal` and `varint` types.
//!
//! A decimal travels as a 4-byte big-endian signed scale followed by an
//! arbitrary-precision two's-complement big-endian unscaled integer; the
//! value equals `unscaled · 10^(−scale)`. A varint is the bare unscaled
//! integer, minimal-length.

use crate::protocol::util_sync;
use crate::{CqlError, CqlResult};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;

pub(crate) fn emit_decimal(value: &BigDecimal, w: &mut dyn std::io::Write) -> CqlResult<()> {
    let (unscaled, exponent) = value.as_bigint_and_exponent();
    let scale = i32::try_from(exponent).map_err(|_| {
        CqlError::Overflow(format!("decimal scale {exponent} exceeds the wire's 32 bit"))
    })?;
    util_sync::write_int(scale, w)?;
    w.write_all(&unscaled.to_signed_bytes_be())?;
    Ok(())
}

pub(crate) fn parse_decimal(bytes: &[u8]) -> CqlResult<BigDecimal> {
    if bytes.len() < 4 {
        return Err(CqlError::InvalidValue(format!(
            "decimal value of {} bytes is too short",
            bytes.len()
        )));
    }
    let scale = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let unscaled = BigInt::from_signed_bytes_be(&bytes[4..]);
    Ok(BigDecimal::new(unscaled, i64::from(scale)))
}

pub(crate) fn emit_varint(value: &BigInt, w: &mut dyn std::io::Write) -> CqlResult<()> {
    w.write_all(&value.to_signed_bytes_be())?;
    Ok(())
}

pub(crate) fn parse_varint(bytes: &[u8]) -> CqlResult<BigInt> {
    if bytes.is_empty() {
        return Err(CqlError::InvalidValue(
            "varint value must have at least one byte".to_string(),
        ));
    }
    Ok(BigInt::from_signed_bytes_be(bytes))
}

#[cfg(test)]
mod tests {
    use super::{emit_decimal, emit_varint, parse_decimal, parse_varint};
    use bigdecimal::BigDecimal;
    use num_bigint::BigInt;
    use std::str::FromStr;

    #[test]
    fn scale_shifts_the_point() {
        let unscaled = BigInt::from_str("79228162514264337593543950335").unwrap();

        let plain = BigDecimal::new(unscaled.clone(), 0);
        let mut buf = Vec::new();
        emit_decimal(&plain, &mut buf).unwrap();
        assert_eq!(&buf[0..4], [0, 0, 0, 0]);
        assert_eq!(
            parse_decimal(&buf).unwrap().to_string(),
            "79228162514264337593543950335"
        );

        let shifted = BigDecimal::new(unscaled, 27);
        let mut buf = Vec::new();
        emit_decimal(&shifted, &mut buf).unwrap();
        assert_eq!(&buf[0..4], [0, 0, 0, 27]);
        assert_eq!(
            parse_decimal(&buf).unwrap().to_string(),
            "79.228162514264337593543950335"
        );
    }

    #[test]
    fn negative_scale_round_trip() {
        let value = BigDecimal::new(BigInt::from(-42), -3);
        let mut buf = Vec::new();
        emit_decimal(&value, &mut buf).unwrap();
        assert_eq!(parse_decimal(&buf).unwrap(), value);
    }

    #[test]
    fn varint_is_minimal_twos_complement() {
        let mut buf = Vec::new();
        emit_varint(&BigInt::from(-1), &mut buf).unwrap();
        assert_eq!(buf, [0xFF]);
        buf.clear();
        emit_varint(&BigInt::from(128), &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x80]);
        for v in ["0", "1", "-1", "170141183460469231731687303715884105727"] {
            let value = BigInt::from_str(v).unwrap();
            let mut buf = Vec::new();
            emit_varint(&value, &mut buf).unwrap();
            assert_eq!(parse_varint(&buf).unwrap(), value);
        }
    }

    #[test]
    fn truncated_decimal_is_rejected() {
        assert!(parse_decimal(&[0, 0]).is_err());
    }
}
