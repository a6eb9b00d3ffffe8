//! Compound type descriptors.
//!
//! A compound value travels as an opaque byte string; the descriptor is
//! what gives it shape. Layout computation lives in
//! [`crate::typereg::TypeRegistry::describe_compound`] so that two
//! descriptors built from the same field list always agree.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;
use crate::typereg::TypeRegistry;
use crate::value::Value;

/// One member of a compound layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundField {
    /// Member name.
    pub name: String,
    /// Canonical member type name (fixed-width numeric).
    pub type_name: String,
    /// Byte offset within the compound.
    pub offset: usize,
    /// Number of consecutive elements.
    pub count: usize,
}

/// An ordered compound layout with a total byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundDescriptor {
    fields: Vec<CompoundField>,
    size: usize,
}

impl CompoundDescriptor {
    /// Build from an already-computed layout.
    pub(crate) fn from_layout(fields: Vec<CompoundField>, size: usize) -> Self {
        Self { fields, size }
    }

    /// The ordered member list.
    pub fn fields(&self) -> &[CompoundField] {
        &self.fields
    }

    /// Total byte size of one compound element.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Decode one compound element into per-field value lists.
    ///
    /// Fields come back in declaration order; a field with `count` 1
    /// yields a single-element list.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<(String, Vec<Value>)>, FormatError> {
        if bytes.len() < self.size {
            return Err(FormatError::CompoundTooShort {
                expected: self.size,
                actual: bytes.len(),
            });
        }
        let reg = TypeRegistry::global();
        let mut out = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let elem = reg.size_of(&field.type_name)?;
            let slice = &bytes[field.offset..field.offset + elem * field.count];
            let values = Value::decode_array(&field.type_name, elem, field.count, slice)?;
            out.push((field.name.clone(), values));
        }
        Ok(out)
    }

    /// Encode per-field value lists into one compound element.
    ///
    /// `values` must supply the fields in declaration order with the
    /// declared element counts. Padding bytes are zeroed.
    pub fn encode(&self, values: &[(&str, &[Value])]) -> Result<Vec<u8>, FormatError> {
        let mut buf = vec![0u8; self.size];
        for (field, (name, vals)) in self.fields.iter().zip(values) {
            if field.name != *name || vals.len() != field.count {
                return Err(FormatError::ValueSizeMismatch {
                    type_name: field.type_name.clone(),
                    expected: field.count,
                    actual: vals.len(),
                });
            }
            let elem = TypeRegistry::global().size_of(&field.type_name)?;
            for (i, v) in vals.iter().enumerate() {
                let encoded = v.encode();
                if encoded.len() != elem {
                    return Err(FormatError::ValueSizeMismatch {
                        type_name: field.type_name.clone(),
                        expected: elem,
                        actual: encoded.len(),
                    });
                }
                let at = field.offset + i * elem;
                buf[at..at + elem].copy_from_slice(&encoded);
            }
        }
        Ok(buf)
    }

    /// Serialize to the wire form stored alongside committed types.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut size4 = [0u8; 4];
        LittleEndian::write_u32(&mut size4, self.size as u32);
        buf.extend_from_slice(&size4);
        let mut n2 = [0u8; 2];
        LittleEndian::write_u16(&mut n2, self.fields.len() as u16);
        buf.extend_from_slice(&n2);
        for field in &self.fields {
            buf.extend_from_slice(field.name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(field.type_name.as_bytes());
            buf.push(0);
            let mut u4 = [0u8; 4];
            LittleEndian::write_u32(&mut u4, field.offset as u32);
            buf.extend_from_slice(&u4);
            LittleEndian::write_u32(&mut u4, field.count as u32);
            buf.extend_from_slice(&u4);
        }
        buf
    }

    /// Parse the wire form. Returns the descriptor and bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(CompoundDescriptor, usize), FormatError> {
        ensure_len(data, 0, 6)?;
        let size = LittleEndian::read_u32(&data[0..4]) as usize;
        let nfields = LittleEndian::read_u16(&data[4..6]) as usize;
        let mut pos = 6;
        let mut fields = Vec::with_capacity(nfields);
        for _ in 0..nfields {
            let (name, used) = read_nul_string(data, pos)?;
            pos += used;
            let (type_name, used) = read_nul_string(data, pos)?;
            pos += used;
            ensure_len(data, pos, 8)?;
            let offset = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
            let count = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
            pos += 8;
            // Reject descriptors naming types the registry does not know.
            TypeRegistry::global().size_of(&type_name)?;
            fields.push(CompoundField {
                name,
                type_name,
                offset,
                count,
            });
        }
        Ok((CompoundDescriptor { fields, size }, pos))
    }
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    if offset + needed > data.len() {
        Err(FormatError::UnexpectedEof {
            expected: offset + needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

fn read_nul_string(data: &[u8], offset: usize) -> Result<(String, usize), FormatError> {
    let remaining = &data[offset.min(data.len())..];
    let nul = remaining
        .iter()
        .position(|&b| b == 0)
        .ok_or(FormatError::UnexpectedEof {
            expected: offset + 1,
            available: data.len(),
        })?;
    let s = String::from_utf8_lossy(&remaining[..nul]).into_owned();
    Ok((s, nul + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_descr() -> CompoundDescriptor {
        TypeRegistry::global()
            .describe_compound(&[("id", "int", 1), ("pos", "double", 2), ("flag", "uchar", 1)])
            .unwrap()
    }

    #[test]
    fn encode_decode_field_for_field() {
        let descr = sensor_descr();
        let bytes = descr
            .encode(&[
                ("id", &[Value::Int(7)]),
                ("pos", &[Value::Double(1.5), Value::Double(-2.5)]),
                ("flag", &[Value::Uchar(1)]),
            ])
            .unwrap();
        assert_eq!(bytes.len(), descr.size());

        let decoded = descr.decode(&bytes).unwrap();
        assert_eq!(decoded[0], ("id".to_string(), vec![Value::Int(7)]));
        assert_eq!(
            decoded[1],
            ("pos".to_string(), vec![Value::Double(1.5), Value::Double(-2.5)])
        );
        assert_eq!(decoded[2], ("flag".to_string(), vec![Value::Uchar(1)]));
    }

    #[test]
    fn roundtrip_independent_descriptors() {
        // A buffer written through one descriptor reads back through a
        // second descriptor built from the same field list.
        let a = sensor_descr();
        let b = sensor_descr();
        let bytes = a
            .encode(&[
                ("id", &[Value::Int(-1)]),
                ("pos", &[Value::Double(0.0), Value::Double(9.0)]),
                ("flag", &[Value::Uchar(255)]),
            ])
            .unwrap();
        let decoded = b.decode(&bytes).unwrap();
        assert_eq!(decoded[0].1, vec![Value::Int(-1)]);
        assert_eq!(decoded[2].1, vec![Value::Uchar(255)]);
    }

    #[test]
    fn wire_form_roundtrip() {
        let descr = sensor_descr();
        let wire = descr.serialize();
        let (parsed, consumed) = CompoundDescriptor::parse(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(parsed, descr);
    }

    #[test]
    fn decode_short_buffer_fails() {
        let descr = sensor_descr();
        let err = descr.decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, FormatError::CompoundTooShort { .. }));
    }

    #[test]
    fn encode_wrong_count_fails() {
        let descr = sensor_descr();
        let err = descr
            .encode(&[
                ("id", &[Value::Int(7)]),
                ("pos", &[Value::Double(1.5)]),
                ("flag", &[Value::Uchar(1)]),
            ])
            .unwrap_err();
        assert!(matches!(err, FormatError::ValueSizeMismatch { .. }));
    }

    #[test]
    fn parse_truncated_fails() {
        let descr = sensor_descr();
        let wire = descr.serialize();
        let err = CompoundDescriptor::parse(&wire[..wire.len() - 3]).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));
    }
}
