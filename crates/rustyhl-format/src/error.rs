//! Error types for the container format layer.

use core::fmt;

/// Errors that can occur when encoding or decoding container structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The container magic signature was not found at the start of the file.
    SignatureNotFound,
    /// The container format version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// A record carried an unknown entity kind tag.
    InvalidEntityKind(u8),
    /// A type descriptor carried an unknown class tag.
    InvalidTypeClass(u8),
    /// A type name that the registry does not know.
    UnknownTypeName(String),
    /// Record checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// A value buffer whose length does not match its declared type.
    ValueSizeMismatch {
        /// The canonical type name of the value.
        type_name: String,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// A compound buffer shorter than the descriptor's total size.
    CompoundTooShort {
        /// Total size declared by the descriptor.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },
    /// A record field longer than its wire encoding can carry.
    FieldTooLong {
        /// Which field overflowed.
        what: &'static str,
        /// Maximum encodable length.
        max: usize,
        /// Actual length.
        actual: usize,
    },
    /// Deflate compression or decompression failed.
    Filter(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "container signature not found")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported container version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidEntityKind(k) => {
                write!(f, "invalid entity kind tag: {k:#04x}")
            }
            FormatError::InvalidTypeClass(c) => {
                write!(f, "invalid type class tag: {c:#04x}")
            }
            FormatError::UnknownTypeName(name) => {
                write!(f, "unknown type name: {name}")
            }
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "record checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::ValueSizeMismatch {
                type_name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "value size mismatch for {type_name}: expected {expected} bytes, got {actual}"
                )
            }
            FormatError::CompoundTooShort { expected, actual } => {
                write!(
                    f,
                    "compound buffer too short: descriptor needs {expected} bytes, got {actual}"
                )
            }
            FormatError::FieldTooLong { what, max, actual } => {
                write!(f, "record {what} too long: {actual} exceeds the wire maximum {max}")
            }
            FormatError::Filter(msg) => {
                write!(f, "filter error: {msg}")
            }
        }
    }
}

impl std::error::Error for FormatError {}
