//! The storage capability.
//!
//! The node/tree layer never touches bytes on disk directly; it
//! consumes this trait. [`crate::container::FileContainer`] is the
//! default implementation, but anything that can answer these calls
//! can back a tree.

use core::fmt;

use crate::compound::CompoundDescriptor;
use crate::descr::TypeDescr;
use crate::error::FormatError;

/// Kind tag of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A container node that can hold children.
    Group,
    /// A leaf holding scalar or array data.
    Dataset,
    /// Metadata attached to a path.
    Attribute,
    /// A committed, durable type definition.
    NamedType,
    /// An entity whose value is the path string of another entity.
    Reference,
}

impl EntityKind {
    /// The wire tag for this kind.
    pub fn tag(self) -> u8 {
        match self {
            EntityKind::Group => 0,
            EntityKind::Dataset => 1,
            EntityKind::Attribute => 2,
            EntityKind::NamedType => 3,
            EntityKind::Reference => 4,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Result<EntityKind, FormatError> {
        match tag {
            0 => Ok(EntityKind::Group),
            1 => Ok(EntityKind::Dataset),
            2 => Ok(EntityKind::Attribute),
            3 => Ok(EntityKind::NamedType),
            4 => Ok(EntityKind::Reference),
            other => Err(FormatError::InvalidEntityKind(other)),
        }
    }
}

/// Durable identity of a committed named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u64);

/// Structural listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    /// Absolute path of the entity.
    pub path: String,
    /// Its kind.
    pub kind: EntityKind,
}

/// Type information of one stored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    /// Kind of the entity.
    pub kind: EntityKind,
    /// The on-disk type descriptor.
    pub descr: TypeDescr,
    /// Array dimensions; empty for scalars.
    pub dims: Vec<u64>,
    /// The committed type this entity was written against, if any.
    pub named: Option<TypeHandle>,
}

/// Errors crossing the storage boundary.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error from the filesystem.
    Io(std::io::Error),
    /// Low-level format error.
    Format(FormatError),
    /// No entity at the given path.
    NotFound(String),
    /// No committed type under the given handle.
    UnknownHandle(TypeHandle),
    /// Operation on a container whose handle was already released.
    Closed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Format(e) => write!(f, "container format error: {e}"),
            StorageError::NotFound(path) => write!(f, "no entity at {path}"),
            StorageError::UnknownHandle(h) => write!(f, "no committed type with handle {}", h.0),
            StorageError::Closed => write!(f, "container handle already released"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for StorageError {
    fn from(e: FormatError) -> Self {
        StorageError::Format(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Byte-level storage for a persisted tree.
///
/// All calls are synchronous; blocking happens here and nowhere above.
pub trait Storage {
    /// List entities whose paths are `scope` or descendants of it.
    fn list_entities(&self, scope: &str) -> Result<Vec<EntityInfo>, StorageError>;

    /// Read the type information of the entity at `path`.
    fn read_entity_type(&self, path: &str) -> Result<EntityType, StorageError>;

    /// Read the decoded (decompressed) payload of the entity at `path`.
    fn read_entity_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Append an entity record.
    ///
    /// `compression` (0-9) applies to the payload; callers pass 0 for
    /// scalar payloads.
    #[allow(clippy::too_many_arguments)]
    fn write_entity(
        &mut self,
        path: &str,
        kind: EntityKind,
        descr: &TypeDescr,
        dims: &[u64],
        bytes: &[u8],
        named: Option<TypeHandle>,
        compression: u8,
    ) -> Result<(), StorageError>;

    /// Commit a compound type, returning its durable handle.
    fn commit_type(&mut self, path: &str, descr: &CompoundDescriptor)
        -> Result<TypeHandle, StorageError>;

    /// Look up a committed type by handle.
    fn read_committed_type(&self, handle: TypeHandle)
        -> Result<CompoundDescriptor, StorageError>;

    /// Persist pending records.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Persist and release the handle. Further calls fail with
    /// [`StorageError::Closed`].
    fn close(&mut self) -> Result<(), StorageError>;
}
