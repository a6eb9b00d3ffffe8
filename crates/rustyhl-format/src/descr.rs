//! Wire type descriptors.
//!
//! Every stored entity carries a compact self-describing type record:
//! a class tag, a flags byte and the element size, with compound
//! members appended recursively through [`CompoundDescriptor`]'s own
//! wire form.

use byteorder::{ByteOrder, LittleEndian};

use crate::compound::CompoundDescriptor;
use crate::error::FormatError;
use crate::typereg::{TypeClass, TypeRegistry};

const CLASS_FIXED: u8 = 0;
const CLASS_FLOAT: u8 = 1;
const CLASS_STRING: u8 = 2;
const CLASS_COMPOUND: u8 = 3;
const CLASS_REFERENCE: u8 = 4;
const CLASS_NONE: u8 = 5;

const FLAG_SIGNED: u8 = 0x01;

/// A parsed on-disk type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescr {
    /// Fixed-width integer.
    Fixed {
        /// Element size in bytes.
        size: u32,
        /// Whether the representation is signed.
        signed: bool,
    },
    /// IEEE 754 floating point.
    Float {
        /// Element size in bytes (4 or 8).
        size: u32,
    },
    /// Byte string of a fixed stored length.
    Str {
        /// Stored length in bytes.
        size: u32,
    },
    /// Compound, shaped by its descriptor.
    Compound(CompoundDescriptor),
    /// Path reference; the payload is the target path string.
    Reference,
    /// No stored value (groups, committed type records).
    None,
}

impl TypeDescr {
    /// Build the descriptor for a canonical type name.
    ///
    /// `payload_len` supplies the stored length for `string`; compounds
    /// are built through [`TypeDescr::Compound`] directly.
    pub fn for_type_name(name: &str, payload_len: usize) -> Result<TypeDescr, FormatError> {
        let reg = TypeRegistry::global();
        let canonical = reg.resolve(name)?;
        match reg.class_of(canonical)? {
            TypeClass::Integer { signed } => Ok(TypeDescr::Fixed {
                size: reg.size_of(canonical)? as u32,
                signed,
            }),
            TypeClass::Float => Ok(TypeDescr::Float {
                size: reg.size_of(canonical)? as u32,
            }),
            TypeClass::Str => Ok(TypeDescr::Str {
                size: payload_len as u32,
            }),
            TypeClass::Compound => Err(FormatError::UnknownTypeName(
                "compound (needs a descriptor)".to_string(),
            )),
        }
    }

    /// The canonical type name a read reports for this descriptor.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            TypeDescr::Fixed { size: 1, signed: true } => "schar",
            TypeDescr::Fixed { size: 1, signed: false } => "uchar",
            TypeDescr::Fixed { size: 2, signed: true } => "short",
            TypeDescr::Fixed { size: 2, signed: false } => "ushort",
            TypeDescr::Fixed { size: 4, signed: true } => "int",
            TypeDescr::Fixed { size: 4, signed: false } => "uint",
            TypeDescr::Fixed { size: 8, signed: true } => "long",
            TypeDescr::Fixed { signed: false, .. } => "ulong",
            TypeDescr::Fixed { .. } => "long",
            TypeDescr::Float { size: 4 } => "float",
            TypeDescr::Float { .. } => "double",
            TypeDescr::Str { .. } => "string",
            TypeDescr::Compound(_) => "compound",
            TypeDescr::Reference => "string",
            TypeDescr::None => crate::typereg::UNDEFINED,
        }
    }

    /// Size in bytes of one element of this type.
    pub fn type_size(&self) -> usize {
        match self {
            TypeDescr::Fixed { size, .. } => *size as usize,
            TypeDescr::Float { size } => *size as usize,
            TypeDescr::Str { size } => *size as usize,
            TypeDescr::Compound(descr) => descr.size(),
            TypeDescr::Reference | TypeDescr::None => 0,
        }
    }

    /// Serialize to the wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 6];
        let (class, flags, size) = match self {
            TypeDescr::Fixed { size, signed } => {
                (CLASS_FIXED, if *signed { FLAG_SIGNED } else { 0 }, *size)
            }
            TypeDescr::Float { size } => (CLASS_FLOAT, 0, *size),
            TypeDescr::Str { size } => (CLASS_STRING, 0, *size),
            TypeDescr::Compound(descr) => (CLASS_COMPOUND, 0, descr.size() as u32),
            TypeDescr::Reference => (CLASS_REFERENCE, 0, 0),
            TypeDescr::None => (CLASS_NONE, 0, 0),
        };
        buf[0] = class;
        buf[1] = flags;
        LittleEndian::write_u32(&mut buf[2..6], size);
        if let TypeDescr::Compound(descr) = self {
            buf.extend_from_slice(&descr.serialize());
        }
        buf
    }

    /// Parse the wire form. Returns the descriptor and bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(TypeDescr, usize), FormatError> {
        if data.len() < 6 {
            return Err(FormatError::UnexpectedEof {
                expected: 6,
                available: data.len(),
            });
        }
        let class = data[0];
        let flags = data[1];
        let size = LittleEndian::read_u32(&data[2..6]);
        let mut pos = 6;
        let descr = match class {
            CLASS_FIXED => TypeDescr::Fixed {
                size,
                signed: flags & FLAG_SIGNED != 0,
            },
            CLASS_FLOAT => TypeDescr::Float { size },
            CLASS_STRING => TypeDescr::Str { size },
            CLASS_COMPOUND => {
                let (inner, consumed) = CompoundDescriptor::parse(&data[pos..])?;
                pos += consumed;
                TypeDescr::Compound(inner)
            }
            CLASS_REFERENCE => TypeDescr::Reference,
            CLASS_NONE => TypeDescr::None,
            other => return Err(FormatError::InvalidTypeClass(other)),
        };
        Ok((descr, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_type_name_resolves_aliases() {
        assert_eq!(
            TypeDescr::for_type_name("char", 0).unwrap(),
            TypeDescr::Fixed { size: 1, signed: true }
        );
        assert_eq!(
            TypeDescr::for_type_name("hsize", 0).unwrap(),
            TypeDescr::Fixed { size: 8, signed: false }
        );
        assert_eq!(
            TypeDescr::for_type_name("llong", 0).unwrap(),
            TypeDescr::Fixed { size: 8, signed: true }
        );
    }

    #[test]
    fn for_type_name_rejects_unknown() {
        let err = TypeDescr::for_type_name("word", 0).unwrap_err();
        assert!(matches!(err, FormatError::UnknownTypeName(_)));
    }

    #[test]
    fn canonical_names_cover_the_vocabulary() {
        let cases = [
            (TypeDescr::Fixed { size: 1, signed: true }, "schar"),
            (TypeDescr::Fixed { size: 1, signed: false }, "uchar"),
            (TypeDescr::Fixed { size: 2, signed: true }, "short"),
            (TypeDescr::Fixed { size: 2, signed: false }, "ushort"),
            (TypeDescr::Fixed { size: 4, signed: true }, "int"),
            (TypeDescr::Fixed { size: 4, signed: false }, "uint"),
            (TypeDescr::Fixed { size: 8, signed: true }, "long"),
            (TypeDescr::Fixed { size: 8, signed: false }, "ulong"),
            (TypeDescr::Float { size: 4 }, "float"),
            (TypeDescr::Float { size: 8 }, "double"),
            (TypeDescr::Str { size: 12 }, "string"),
        ];
        for (descr, expected) in cases {
            assert_eq!(descr.canonical_name(), expected);
        }
    }

    #[test]
    fn wire_roundtrip_scalar_classes() {
        let descrs = [
            TypeDescr::Fixed { size: 4, signed: true },
            TypeDescr::Float { size: 8 },
            TypeDescr::Str { size: 32 },
            TypeDescr::Reference,
            TypeDescr::None,
        ];
        for d in descrs {
            let wire = d.serialize();
            let (parsed, consumed) = TypeDescr::parse(&wire).unwrap();
            assert_eq!(consumed, wire.len());
            assert_eq!(parsed, d);
        }
    }

    #[test]
    fn wire_roundtrip_compound() {
        let inner = TypeRegistry::global()
            .describe_compound(&[("x", "double", 1), ("y", "double", 1)])
            .unwrap();
        let d = TypeDescr::Compound(inner);
        let wire = d.serialize();
        let (parsed, consumed) = TypeDescr::parse(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(parsed, d);
    }

    #[test]
    fn parse_invalid_class() {
        let mut wire = TypeDescr::Reference.serialize();
        wire[0] = 9;
        let err = TypeDescr::parse(&wire).unwrap_err();
        assert_eq!(err, FormatError::InvalidTypeClass(9));
    }
}
