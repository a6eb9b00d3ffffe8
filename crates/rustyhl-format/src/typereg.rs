//! Canonical type-name registry.
//!
//! Maps every accepted type-name spelling onto the one canonical name
//! that a read reports back, together with the native storage width and
//! class of that category. The table is fixed at compile time and
//! read-only thereafter, so it is safe to share across trees.

use crate::compound::{CompoundDescriptor, CompoundField};
use crate::error::FormatError;

/// Class of a native storage representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Fixed-width integer, signed or unsigned.
    Integer {
        /// Whether the representation is signed.
        signed: bool,
    },
    /// IEEE 754 floating point.
    Float,
    /// Variable-length byte string.
    Str,
    /// C-struct-like compound, laid out by a [`CompoundDescriptor`].
    Compound,
}

/// One entry in the resolution table.
#[derive(Debug, Clone, Copy)]
struct TypeEntry {
    /// Accepted spelling.
    name: &'static str,
    /// Canonical name reported back from a read.
    canonical: &'static str,
    /// Element size in bytes (0 for variable-length types).
    size: usize,
    class: TypeClass,
}

/// Name reported for entities that carry no value (groups, uncommitted
/// named types).
pub const UNDEFINED: &str = "UNDEFINED";

// Aliases resolve to the category they share a representation with:
// `char` is the signed 8-bit category, `llong` collapses to `long`
// (same width on every supported platform), `hsize` is an unsigned
// 8-byte integer and `herr` a signed 4-byte one.
const TABLE: &[TypeEntry] = &[
    TypeEntry { name: "char",   canonical: "schar",  size: 1, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "schar",  canonical: "schar",  size: 1, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "uchar",  canonical: "uchar",  size: 1, class: TypeClass::Integer { signed: false } },
    TypeEntry { name: "short",  canonical: "short",  size: 2, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "ushort", canonical: "ushort", size: 2, class: TypeClass::Integer { signed: false } },
    TypeEntry { name: "int",    canonical: "int",    size: 4, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "uint",   canonical: "uint",   size: 4, class: TypeClass::Integer { signed: false } },
    TypeEntry { name: "long",   canonical: "long",   size: 8, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "ulong",  canonical: "ulong",  size: 8, class: TypeClass::Integer { signed: false } },
    TypeEntry { name: "llong",  canonical: "long",   size: 8, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "float",  canonical: "float",  size: 4, class: TypeClass::Float },
    TypeEntry { name: "double", canonical: "double", size: 8, class: TypeClass::Float },
    TypeEntry { name: "hsize",  canonical: "ulong",  size: 8, class: TypeClass::Integer { signed: false } },
    TypeEntry { name: "herr",   canonical: "int",    size: 4, class: TypeClass::Integer { signed: true } },
    TypeEntry { name: "string", canonical: "string", size: 0, class: TypeClass::Str },
    TypeEntry { name: "compound", canonical: "compound", size: 0, class: TypeClass::Compound },
];

/// The process-wide type-name registry.
#[derive(Debug)]
pub struct TypeRegistry {
    table: &'static [TypeEntry],
}

static GLOBAL: TypeRegistry = TypeRegistry { table: TABLE };

impl TypeRegistry {
    /// The shared registry instance.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    fn lookup(&self, name: &str) -> Result<&'static TypeEntry, FormatError> {
        self.table
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FormatError::UnknownTypeName(name.to_string()))
    }

    /// Resolve an accepted spelling to the canonical name a read reports.
    pub fn resolve(&self, name: &str) -> Result<&'static str, FormatError> {
        Ok(self.lookup(name)?.canonical)
    }

    /// Whether `name` is an accepted spelling.
    pub fn is_supported(&self, name: &str) -> bool {
        self.lookup(name).is_ok()
    }

    /// Element size in bytes of the named type's native representation.
    ///
    /// Returns 0 for `string` and `compound`, whose sizes are carried by
    /// the value or the descriptor.
    pub fn size_of(&self, name: &str) -> Result<usize, FormatError> {
        Ok(self.lookup(name)?.size)
    }

    /// Class of the named type's native representation.
    pub fn class_of(&self, name: &str) -> Result<TypeClass, FormatError> {
        Ok(self.lookup(name)?.class)
    }

    /// Compute a compound layout from an ordered field list.
    ///
    /// Fields are laid out contiguously in declaration order; each
    /// field's offset is aligned up to its own element size, which is
    /// the only padding ever inserted. Two descriptors built from the
    /// same field list therefore always agree byte-for-byte.
    ///
    /// Only fixed-width numeric member types are accepted.
    pub fn describe_compound(
        &self,
        fields: &[(&str, &str, usize)],
    ) -> Result<CompoundDescriptor, FormatError> {
        let mut out = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for (name, type_name, count) in fields {
            let entry = self.lookup(type_name)?;
            if !matches!(entry.class, TypeClass::Integer { .. } | TypeClass::Float) {
                return Err(FormatError::UnknownTypeName(format!(
                    "{type_name} (not usable as a compound member)"
                )));
            }
            let align = entry.size;
            offset = (offset + align - 1) / align * align;
            out.push(CompoundField {
                name: (*name).to_string(),
                type_name: entry.canonical.to_string(),
                offset,
                count: *count,
            });
            offset += entry.size * *count;
        }
        Ok(CompoundDescriptor::from_layout(out, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_resolves_to_schar() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.resolve("char").unwrap(), "schar");
        assert_eq!(reg.resolve("schar").unwrap(), "schar");
    }

    #[test]
    fn llong_collapses_to_long() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.resolve("llong").unwrap(), "long");
    }

    #[test]
    fn alias_integer_categories() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.resolve("hsize").unwrap(), "ulong");
        assert_eq!(reg.resolve("herr").unwrap(), "int");
    }

    #[test]
    fn identity_resolution() {
        let reg = TypeRegistry::global();
        for name in ["uchar", "short", "ushort", "int", "uint", "long", "ulong",
                     "float", "double", "string", "compound"] {
            assert_eq!(reg.resolve(name).unwrap(), name);
        }
    }

    #[test]
    fn unknown_name_fails() {
        let reg = TypeRegistry::global();
        let err = reg.resolve("quadword").unwrap_err();
        assert_eq!(err, FormatError::UnknownTypeName("quadword".to_string()));
    }

    #[test]
    fn sizes() {
        let reg = TypeRegistry::global();
        assert_eq!(reg.size_of("schar").unwrap(), 1);
        assert_eq!(reg.size_of("ushort").unwrap(), 2);
        assert_eq!(reg.size_of("int").unwrap(), 4);
        assert_eq!(reg.size_of("double").unwrap(), 8);
        assert_eq!(reg.size_of("string").unwrap(), 0);
    }

    #[test]
    fn compound_layout_is_contiguous_with_alignment() {
        let reg = TypeRegistry::global();
        // uchar at 0, double aligned up to 8, short at 16
        let descr = reg
            .describe_compound(&[("a", "uchar", 1), ("b", "double", 1), ("c", "short", 1)])
            .unwrap();
        let offsets: Vec<usize> = descr.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(descr.size(), 18);
    }

    #[test]
    fn compound_layout_is_reproducible() {
        let reg = TypeRegistry::global();
        let fields = [("x", "int", 1), ("y", "float", 4), ("z", "uchar", 2)];
        let a = reg.describe_compound(&fields).unwrap();
        let b = reg.describe_compound(&fields).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn compound_member_must_be_numeric() {
        let reg = TypeRegistry::global();
        let err = reg.describe_compound(&[("s", "string", 1)]).unwrap_err();
        assert!(matches!(err, FormatError::UnknownTypeName(_)));
    }

    #[test]
    fn compound_member_counts_scale_offsets() {
        let reg = TypeRegistry::global();
        let descr = reg
            .describe_compound(&[("xy", "double", 2), ("n", "int", 1)])
            .unwrap();
        assert_eq!(descr.fields()[1].offset, 16);
        assert_eq!(descr.size(), 20);
    }
}
