//! Hierarchical-data marshalling layer.
//!
//! rustyhl lets a caller build, query and persist a tree of typed
//! entities (groups, attributes, datasets, named datatypes and
//! references) inside a self-describing binary container, addressed by
//! slash-separated absolute paths.
//!
//! Writing:
//!
//! ```no_run
//! use rustyhl::{NodeKind, NodeTree, Value};
//!
//! # fn main() -> Result<(), rustyhl::Error> {
//! let mut tree = NodeTree::new();
//! tree.add_node(NodeKind::Group, "/info")?;
//! tree.add_node(NodeKind::Attribute, "/info/xscale")?
//!     .set_scalar(Value::Double(10.0), "double")?;
//! tree.write("measurements.rhl", 0)?;
//! # Ok(())
//! # }
//! ```
//!
//! Reading materializes only the selected part of the tree:
//!
//! ```no_run
//! # fn main() -> Result<(), rustyhl::Error> {
//! let mut tree = rustyhl::NodeTree::open("measurements.rhl")?;
//! tree.select_node("/info/xscale")?;
//! tree.fetch()?;
//! let node = tree.get_node("/info/xscale")?;
//! assert_eq!(node.format(), "double");
//! # Ok(())
//! # }
//! ```
//!
//! The low-level pieces (type registry, compound layouts, the storage
//! trait and the default file container) live in the `rustyhl-format`
//! crate and are re-exported here where callers need them.

pub mod error;
mod fetch;
pub mod node;
pub mod nodelist;
mod writer;

pub use error::Error;
pub use node::{Node, NodeData, NodeKind, NodeMark};
pub use nodelist::{NodeTree, TreeState};

pub use rustyhl_format::{
    CompoundDescriptor, CompoundField, FileContainer, Storage, TypeHandle, TypeRegistry, Value,
};
