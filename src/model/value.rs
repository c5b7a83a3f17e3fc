//! Typed attribute values and their wire encodings

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;

use crate::error::{GraphError, Result};
use crate::model::descriptor::AttributeType;
use crate::wire::reader::WireReader;
use crate::wire::writer::WireWriter;

/// Date values travel as fixed-pattern strings so that encoding never
/// depends on the process locale.
pub const DATE_PATTERN: &str = "%Y-%m-%d";
pub const TIME_PATTERN: &str = "%H:%M:%S%.3f";
pub const TIMESTAMP_PATTERN: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A typed attribute value. One variant per wire type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Number(BigDecimal),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Clob(String),
    Blob(Vec<u8>),
}

impl Value {
    /// The wire type tag this value encodes as. Used to infer a descriptor
    /// for an attribute the server does not know about yet.
    pub fn attr_type(&self) -> AttributeType {
        match self {
            Value::Boolean(_) => AttributeType::Boolean,
            Value::Byte(_) => AttributeType::Byte,
            Value::Char(_) => AttributeType::Char,
            Value::Short(_) => AttributeType::Short,
            Value::Int(_) => AttributeType::Int,
            Value::Long(_) => AttributeType::Long,
            Value::Float(_) => AttributeType::Float,
            Value::Double(_) => AttributeType::Double,
            Value::Number(_) => AttributeType::Number,
            Value::String(_) => AttributeType::String,
            Value::Date(_) => AttributeType::Date,
            Value::Time(_) => AttributeType::Time,
            Value::Timestamp(_) => AttributeType::Timestamp,
            Value::Clob(_) => AttributeType::Clob,
            Value::Blob(_) => AttributeType::Blob,
        }
    }

    /// Encode the value payload. The caller has already written the
    /// descriptor reference, type tag and null flag.
    pub fn write(&self, w: &mut WireWriter) -> Result<()> {
        match self {
            Value::Boolean(v) => w.write_bool(*v),
            Value::Byte(v) => w.write_i8(*v),
            // Chars are truncated to the byte range on the wire
            Value::Char(c) => w.write_u8(*c as u32 as u8),
            Value::Short(v) => w.write_i16(*v),
            Value::Int(v) => w.write_i32(*v),
            Value::Long(v) => w.write_i64(*v),
            Value::Float(v) => w.write_f32(*v),
            Value::Double(v) => w.write_f64(*v),
            Value::Number(bd) => {
                let (unscaled, scale) = bd.as_bigint_and_exponent();
                let magnitude = unscaled.to_signed_bytes_be();
                w.write_i32(scale as i32);
                w.write_i32(magnitude.len() as i32);
                w.write_bytes(&magnitude);
            }
            Value::String(s) | Value::Clob(s) => w.write_string(s)?,
            Value::Date(d) => w.write_string(&d.format(DATE_PATTERN).to_string())?,
            Value::Time(t) => w.write_string(&t.format(TIME_PATTERN).to_string())?,
            Value::Timestamp(ts) => w.write_string(&ts.format(TIMESTAMP_PATTERN).to_string())?,
            Value::Blob(bytes) => {
                w.write_i32(bytes.len() as i32);
                w.write_bytes(bytes);
            }
        }
        Ok(())
    }

    /// Decode a value payload of the given type tag.
    pub fn read(tag: AttributeType, r: &mut WireReader) -> Result<Value> {
        let value = match tag {
            AttributeType::Boolean => Value::Boolean(r.read_bool()?),
            AttributeType::Byte => Value::Byte(r.read_i8()?),
            AttributeType::Char => Value::Char(r.read_u8()? as char),
            AttributeType::Short => Value::Short(r.read_i16()?),
            AttributeType::Int => Value::Int(r.read_i32()?),
            AttributeType::Long => Value::Long(r.read_i64()?),
            AttributeType::Float => Value::Float(r.read_f32()?),
            AttributeType::Double => Value::Double(r.read_f64()?),
            AttributeType::Number => {
                let scale = r.read_i32()?;
                let len = r.read_i32()?;
                if len < 0 {
                    return Err(GraphError::Decode(format!(
                        "negative Number magnitude length {len}"
                    )));
                }
                let magnitude = r.read_bytes(len as usize)?;
                let unscaled = BigInt::from_signed_bytes_be(magnitude);
                Value::Number(BigDecimal::new(unscaled, scale as i64))
            }
            AttributeType::String => Value::String(r.read_string()?),
            AttributeType::Clob => Value::Clob(r.read_string()?),
            AttributeType::Date => {
                let s = r.read_string()?;
                let d = NaiveDate::parse_from_str(&s, DATE_PATTERN)
                    .map_err(|e| GraphError::Decode(format!("bad Date value '{s}': {e}")))?;
                Value::Date(d)
            }
            AttributeType::Time => {
                let s = r.read_string()?;
                let t = NaiveTime::parse_from_str(&s, TIME_PATTERN)
                    .map_err(|e| GraphError::Decode(format!("bad Time value '{s}': {e}")))?;
                Value::Time(t)
            }
            AttributeType::Timestamp => {
                let s = r.read_string()?;
                let ts = NaiveDateTime::parse_from_str(&s, TIMESTAMP_PATTERN)
                    .map_err(|e| GraphError::Decode(format!("bad Timestamp value '{s}': {e}")))?;
                Value::Timestamp(ts)
            }
            AttributeType::Blob => {
                let len = r.read_i32()?;
                if len < 0 {
                    return Err(GraphError::Decode(format!("negative Blob length {len}")));
                }
                Value::Blob(r.read_bytes(len as usize)?.to_vec())
            }
            AttributeType::Invalid => {
                return Err(GraphError::TypeCoercion(
                    "cannot decode a value with the Invalid type tag".into(),
                ))
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn roundtrip(v: Value) -> Value {
        let tag = v.attr_type();
        let mut w = WireWriter::new();
        v.write(&mut w).unwrap();
        let buf = w.into_bytes();
        let mut r = WireReader::new(&buf);
        let back = Value::read(tag, &mut r).unwrap();
        assert_eq!(r.remaining(), 0, "value payload fully consumed");
        back
    }

    #[test]
    fn boundary_integers_roundtrip_exactly() {
        assert_eq!(roundtrip(Value::Int(i32::MIN)), Value::Int(i32::MIN));
        assert_eq!(roundtrip(Value::Int(i32::MAX)), Value::Int(i32::MAX));
        assert_eq!(roundtrip(Value::Long(i64::MIN)), Value::Long(i64::MIN));
        assert_eq!(roundtrip(Value::Long(i64::MAX)), Value::Long(i64::MAX));
        assert_eq!(roundtrip(Value::Short(i16::MIN)), Value::Short(i16::MIN));
    }

    #[test]
    fn empty_string_and_zero_length_blob_roundtrip() {
        assert_eq!(
            roundtrip(Value::String(String::new())),
            Value::String(String::new())
        );
        assert_eq!(roundtrip(Value::Blob(vec![])), Value::Blob(vec![]));
    }

    #[test]
    fn number_keeps_scale_and_sign() {
        let bd = BigDecimal::from_str("-12345.6789").unwrap();
        assert_eq!(roundtrip(Value::Number(bd.clone())), Value::Number(bd));

        let big = BigDecimal::from_str("99999999999999999999999999.00001").unwrap();
        assert_eq!(roundtrip(Value::Number(big.clone())), Value::Number(big));
    }

    #[test]
    fn dates_reparse_from_the_fixed_patterns() {
        let d = NaiveDate::from_ymd_opt(2019, 2, 28).unwrap();
        assert_eq!(roundtrip(Value::Date(d)), Value::Date(d));

        let t = NaiveTime::from_hms_milli_opt(23, 59, 59, 250).unwrap();
        assert_eq!(roundtrip(Value::Time(t)), Value::Time(t));

        let ts = NaiveDate::from_ymd_opt(2019, 2, 28)
            .unwrap()
            .and_hms_milli_opt(12, 0, 1, 7)
            .unwrap();
        assert_eq!(roundtrip(Value::Timestamp(ts)), Value::Timestamp(ts));
    }

    #[test]
    fn invalid_tag_fails_with_type_coercion() {
        let mut r = WireReader::new(&[0u8; 8]);
        match Value::read(AttributeType::Invalid, &mut r) {
            Err(GraphError::TypeCoercion(_)) => {}
            other => panic!("expected TypeCoercion, got {other:?}"),
        }
    }

    #[test]
    fn floats_preserve_bit_patterns() {
        assert_eq!(roundtrip(Value::Float(f32::MIN)), Value::Float(f32::MIN));
        assert_eq!(
            roundtrip(Value::Double(f64::EPSILON)),
            Value::Double(f64::EPSILON)
        );
    }
}
