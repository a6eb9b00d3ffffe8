//! Low-level pieces of the rustyhl container format.
//!
//! This crate provides the canonical type-name registry, compound type
//! layout, wire type descriptors, the storage capability trait and the
//! default single-file container backend. The high-level node/tree API
//! lives in the `rustyhl` crate.

pub mod compound;
pub mod container;
pub mod descr;
pub mod error;
pub mod filters;
pub mod storage;
pub mod typereg;
pub mod value;

pub use compound::{CompoundDescriptor, CompoundField};
pub use container::FileContainer;
pub use descr::TypeDescr;
pub use error::FormatError;
pub use storage::{EntityInfo, EntityKind, EntityType, Storage, StorageError, TypeHandle};
pub use typereg::TypeRegistry;
pub use value::Value;
