//! The caller-facing error taxonomy.
//!
//! Every failure carries the offending path or name so callers can
//! handle errors programmatically instead of matching on strings.

use core::fmt;

use rustyhl_format::{FormatError, StorageError};

/// Errors reported by the node/tree layer.
#[derive(Debug)]
pub enum Error {
    /// A type name the registry cannot resolve.
    UnknownType(String),
    /// An operation a node's kind or state forbids.
    InvalidOperation {
        /// Path of the node involved.
        path: String,
        /// What was attempted.
        what: &'static str,
    },
    /// Insertion at a path that already exists.
    DuplicatePath(String),
    /// Insertion under a parent that is neither the root nor a group.
    InvalidHierarchy(String),
    /// Lookup of an absent path.
    NotFound(String),
    /// Scoped open rooted at a path that cannot hold children.
    InvalidTarget(String),
    /// Materialization failure; names the first unresolvable path in
    /// path-sorted order.
    Fetch(String),
    /// Write attempted on a tree holding nothing but the implicit root.
    EmptyContainer,
    /// Operation on a tree whose container handle was already released.
    ClosedContainer,
    /// Failure crossing the storage boundary.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownType(name) => write!(f, "unknown type name: {name}"),
            Error::InvalidOperation { path, what } => {
                write!(f, "invalid operation on {path}: {what}")
            }
            Error::DuplicatePath(path) => write!(f, "path already exists: {path}"),
            Error::InvalidHierarchy(path) => {
                write!(f, "parent of {path} is not the root or a group")
            }
            Error::NotFound(path) => write!(f, "no node at {path}"),
            Error::InvalidTarget(path) => {
                write!(f, "cannot open scoped to {path}: not a group")
            }
            Error::Fetch(path) => write!(f, "fetch failed at {path}"),
            Error::EmptyContainer => write!(f, "tree holds nothing but the root group"),
            Error::ClosedContainer => write!(f, "container handle already released"),
            Error::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(path) => Error::NotFound(path),
            StorageError::Closed => Error::ClosedContainer,
            other => Error::Storage(other),
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::UnknownTypeName(name) => Error::UnknownType(name),
            other => Error::Storage(StorageError::Format(other)),
        }
    }
}
