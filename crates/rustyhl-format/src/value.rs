//! Native value representation.
//!
//! A closed tagged union over the canonical type vocabulary, plus the
//! little-endian wire encoding used for all stored payloads.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// A decoded native value of one of the canonical types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Schar(i8),
    Uchar(u8),
    Short(i16),
    Ushort(u16),
    Int(i32),
    Uint(u32),
    Long(i64),
    Ulong(u64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Value {
    /// The canonical type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Schar(_) => "schar",
            Value::Uchar(_) => "uchar",
            Value::Short(_) => "short",
            Value::Ushort(_) => "ushort",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Long(_) => "long",
            Value::Ulong(_) => "ulong",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
        }
    }

    /// Encode to the little-endian wire form.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::Schar(v) => vec![*v as u8],
            Value::Uchar(v) => vec![*v],
            Value::Short(v) => v.to_le_bytes().to_vec(),
            Value::Ushort(v) => v.to_le_bytes().to_vec(),
            Value::Int(v) => v.to_le_bytes().to_vec(),
            Value::Uint(v) => v.to_le_bytes().to_vec(),
            Value::Long(v) => v.to_le_bytes().to_vec(),
            Value::Ulong(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_le_bytes().to_vec(),
            Value::Double(v) => v.to_le_bytes().to_vec(),
            Value::Str(v) => v.as_bytes().to_vec(),
        }
    }

    /// Decode one value of canonical type `type_name` from `bytes`.
    ///
    /// `bytes` must be exactly one element long; strings consume the
    /// whole buffer.
    pub fn decode(type_name: &str, bytes: &[u8]) -> Result<Value, FormatError> {
        let check = |expected: usize| -> Result<(), FormatError> {
            if bytes.len() != expected {
                Err(FormatError::ValueSizeMismatch {
                    type_name: type_name.to_string(),
                    expected,
                    actual: bytes.len(),
                })
            } else {
                Ok(())
            }
        };
        match type_name {
            "schar" => {
                check(1)?;
                Ok(Value::Schar(bytes[0] as i8))
            }
            "uchar" => {
                check(1)?;
                Ok(Value::Uchar(bytes[0]))
            }
            "short" => {
                check(2)?;
                Ok(Value::Short(LittleEndian::read_i16(bytes)))
            }
            "ushort" => {
                check(2)?;
                Ok(Value::Ushort(LittleEndian::read_u16(bytes)))
            }
            "int" => {
                check(4)?;
                Ok(Value::Int(LittleEndian::read_i32(bytes)))
            }
            "uint" => {
                check(4)?;
                Ok(Value::Uint(LittleEndian::read_u32(bytes)))
            }
            "long" => {
                check(8)?;
                Ok(Value::Long(LittleEndian::read_i64(bytes)))
            }
            "ulong" => {
                check(8)?;
                Ok(Value::Ulong(LittleEndian::read_u64(bytes)))
            }
            "float" => {
                check(4)?;
                Ok(Value::Float(LittleEndian::read_f32(bytes)))
            }
            "double" => {
                check(8)?;
                Ok(Value::Double(LittleEndian::read_f64(bytes)))
            }
            "string" => Ok(Value::Str(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
            other => Err(FormatError::UnknownTypeName(other.to_string())),
        }
    }

    /// Decode `count` consecutive elements of canonical type `type_name`.
    pub fn decode_array(
        type_name: &str,
        elem_size: usize,
        count: usize,
        bytes: &[u8],
    ) -> Result<Vec<Value>, FormatError> {
        if bytes.len() != elem_size * count {
            return Err(FormatError::ValueSizeMismatch {
                type_name: type_name.to_string(),
                expected: elem_size * count,
                actual: bytes.len(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(elem_size) {
            out.push(Value::decode(type_name, chunk)?);
        }
        Ok(out)
    }

    /// Widen any integer value to `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Schar(v) => Some(*v as i64),
            Value::Uchar(v) => Some(*v as i64),
            Value::Short(v) => Some(*v as i64),
            Value::Ushort(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Uint(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            Value::Ulong(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Widen any float value to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_numeric() {
        let values = [
            Value::Schar(-5),
            Value::Uchar(200),
            Value::Short(-1234),
            Value::Ushort(54321),
            Value::Int(-100_000),
            Value::Uint(3_000_000_000),
            Value::Long(i64::MIN),
            Value::Ulong(u64::MAX),
            Value::Float(1.5),
            Value::Double(-2.25),
        ];
        for v in values {
            let bytes = v.encode();
            let back = Value::decode(v.type_name(), &bytes).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn roundtrip_string() {
        let v = Value::Str("how are you doing".to_string());
        let back = Value::decode("string", &v.encode()).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn decode_wrong_size() {
        let err = Value::decode("int", &[1, 2]).unwrap_err();
        assert!(matches!(err, FormatError::ValueSizeMismatch { .. }));
    }

    #[test]
    fn decode_array_splits_elements() {
        let mut bytes = Vec::new();
        for v in [10i32, 20, 30] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let vals = Value::decode_array("int", 4, 3, &bytes).unwrap();
        assert_eq!(vals, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn decode_array_length_mismatch() {
        let err = Value::decode_array("int", 4, 3, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, FormatError::ValueSizeMismatch { .. }));
    }

    #[test]
    fn widening_helpers() {
        assert_eq!(Value::Short(-3).as_i64(), Some(-3));
        assert_eq!(Value::Ulong(u64::MAX).as_i64(), None);
        assert_eq!(Value::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::Int(1).as_f64(), None);
        assert_eq!(Value::Str("a".into()).as_str(), Some("a"));
    }
}
