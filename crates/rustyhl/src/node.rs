//! A single tree entity: identity, kind, value and marshalling state.

use rustyhl_format::typereg::UNDEFINED;
use rustyhl_format::{CompoundDescriptor, TypeHandle, TypeRegistry, Value};

use crate::error::Error;

pub use rustyhl_format::EntityKind as NodeKind;

/// Provenance and pending-work state of a node.
///
/// Marks drive both the selection set and update-mode filtering: only
/// `Created` nodes are written by an update, only `Select` nodes are
/// materialized by a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMark {
    /// Read from, or already persisted to, the container.
    Original,
    /// Added in this session, not yet persisted.
    Created,
    /// Persisted node whose value was replaced in this session.
    Changed,
    /// Marked for materialization by the next fetch.
    Select,
}

/// A node's value.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// No value set or fetched yet.
    Unset,
    /// A single element.
    Scalar(Value),
    /// `dims`-shaped elements in row-major order.
    Array {
        dims: Vec<u64>,
        values: Vec<Value>,
    },
    /// Compound element(s) as opaque bytes shaped by a descriptor.
    /// `dims` is empty for a scalar compound.
    Compound {
        descr: CompoundDescriptor,
        dims: Vec<u64>,
        bytes: Vec<u8>,
    },
}

impl NodeData {
    /// Borrow the scalar value, if this is one.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            NodeData::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the array elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            NodeData::Array { values, .. } => Some(values),
            _ => None,
        }
    }
}

/// One entity in a [`crate::nodelist::NodeTree`].
///
/// Nodes are created through [`crate::nodelist::NodeTree::add_node`]
/// and owned by the tree that holds them.
#[derive(Debug, Clone)]
pub struct Node {
    path: String,
    kind: NodeKind,
    type_name: String,
    data: NodeData,
    named: Option<TypeHandle>,
    descr: Option<CompoundDescriptor>,
    mark: NodeMark,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, path: &str) -> Result<Node, Error> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(Error::InvalidHierarchy(path.to_string()));
        }
        if path != "/" && path.ends_with('/') {
            return Err(Error::InvalidHierarchy(path.to_string()));
        }
        Ok(Node {
            path: path.to_string(),
            kind,
            type_name: UNDEFINED.to_string(),
            data: NodeData::Unset,
            named: None,
            descr: None,
            mark: NodeMark::Created,
        })
    }

    /// Absolute path of this node.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Current mark.
    pub fn mark(&self) -> NodeMark {
        self.mark
    }

    /// Canonical type name of the value, or `"UNDEFINED"` when the node
    /// carries none.
    pub fn format(&self) -> &str {
        &self.type_name
    }

    /// Committed-type handle bound to this node, if any.
    pub fn named_type(&self) -> Option<TypeHandle> {
        self.named
    }

    /// The compound layout recorded for a named type, once fetched.
    pub fn descriptor(&self) -> Option<&CompoundDescriptor> {
        self.descr.as_ref()
    }

    fn reject_value_on_kind(&self) -> Result<(), Error> {
        match self.kind {
            NodeKind::Group | NodeKind::NamedType => Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "this kind carries no value",
            }),
            _ => Ok(()),
        }
    }

    fn touch(&mut self) {
        if self.mark == NodeMark::Original {
            self.mark = NodeMark::Changed;
        }
    }

    /// Set a scalar value.
    ///
    /// `type_name` may be any accepted spelling; the node reports the
    /// canonical name back. A Reference node only accepts a string
    /// value, the target path.
    pub fn set_scalar(&mut self, value: Value, type_name: &str) -> Result<(), Error> {
        self.reject_value_on_kind()?;
        let canonical = TypeRegistry::global().resolve(type_name)?;
        if value.type_name() != canonical {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "value does not match the declared type",
            });
        }
        if self.kind == NodeKind::Reference && value.as_str().is_none() {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "a reference value must be a target path string",
            });
        }
        self.type_name = canonical.to_string();
        self.data = NodeData::Scalar(value);
        self.touch();
        Ok(())
    }

    /// Set an array value; the product of `dims` must equal the number
    /// of elements supplied.
    pub fn set_array(
        &mut self,
        dims: &[u64],
        values: Vec<Value>,
        type_name: &str,
    ) -> Result<(), Error> {
        self.reject_value_on_kind()?;
        if self.kind == NodeKind::Reference {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "a reference holds a single target path",
            });
        }
        let canonical = TypeRegistry::global().resolve(type_name)?;
        let expected: u64 = dims.iter().product();
        if expected != values.len() as u64 {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "array dimensions do not match the element count",
            });
        }
        if values.iter().any(|v| v.type_name() != canonical) {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "array element does not match the declared type",
            });
        }
        // String arrays are stored as fixed-width elements; a ragged
        // list has no stored shape to come back with.
        if canonical == "string" {
            let width = values.first().map_or(0, |v| v.encode().len());
            if width == 0 || values.iter().any(|v| v.encode().len() != width) {
                return Err(Error::InvalidOperation {
                    path: self.path.clone(),
                    what: "string array elements must share one fixed nonzero length",
                });
            }
        }
        self.type_name = canonical.to_string();
        self.data = NodeData::Array {
            dims: dims.to_vec(),
            values,
        };
        self.touch();
        Ok(())
    }

    /// Set a compound value as opaque bytes shaped by `descr`.
    ///
    /// `dims` is empty for a scalar compound; the byte length must be
    /// the descriptor size times the element count. `named` binds the
    /// value to a registered type handle for durable introspection.
    pub fn set_compound(
        &mut self,
        descr: CompoundDescriptor,
        dims: &[u64],
        bytes: Vec<u8>,
        named: Option<TypeHandle>,
    ) -> Result<(), Error> {
        self.reject_value_on_kind()?;
        if self.kind == NodeKind::Reference {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "a reference holds a single target path",
            });
        }
        let count: u64 = if dims.is_empty() { 1 } else { dims.iter().product() };
        if bytes.len() as u64 != descr.size() as u64 * count {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "compound byte length does not match the descriptor",
            });
        }
        self.type_name = "compound".to_string();
        self.named = named;
        self.data = NodeData::Compound {
            descr,
            dims: dims.to_vec(),
            bytes,
        };
        self.touch();
        Ok(())
    }

    /// Bind a NamedType node to a registered type handle.
    pub fn commit(&mut self, handle: TypeHandle) -> Result<(), Error> {
        if self.kind != NodeKind::NamedType {
            return Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "only a named type can be committed",
            });
        }
        self.named = Some(handle);
        self.touch();
        Ok(())
    }

    /// The decoded value.
    pub fn data(&self) -> Result<&NodeData, Error> {
        match self.data {
            NodeData::Unset => Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "no value has been set or fetched",
            }),
            ref data => Ok(data),
        }
    }

    /// The exact encoded bytes of a scalar or attribute value.
    ///
    /// Fails for Datasets and for kinds that carry no value; array
    /// semantics make a raw byte string ill-defined there.
    pub fn rawdata(&self) -> Result<Vec<u8>, Error> {
        match self.kind {
            NodeKind::Attribute | NodeKind::Reference => {}
            _ => {
                return Err(Error::InvalidOperation {
                    path: self.path.clone(),
                    what: "raw bytes are only defined for attribute-like values",
                })
            }
        }
        match &self.data {
            NodeData::Unset => Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "no value has been set or fetched",
            }),
            NodeData::Scalar(v) => Ok(v.encode()),
            NodeData::Array { values, .. } => {
                let mut out = Vec::new();
                for v in values {
                    out.extend_from_slice(&v.encode());
                }
                Ok(out)
            }
            NodeData::Compound { bytes, .. } => Ok(bytes.clone()),
        }
    }

    /// Field-name-to-values mapping of a scalar compound value, decoded
    /// through its descriptor.
    pub fn compound_data(&self) -> Result<Vec<(String, Vec<Value>)>, Error> {
        match &self.data {
            NodeData::Compound { descr, dims, bytes } if dims.is_empty() => {
                Ok(descr.decode(bytes)?)
            }
            NodeData::Compound { .. } => Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "field decoding is defined for scalar compounds only",
            }),
            _ => Err(Error::InvalidOperation {
                path: self.path.clone(),
                what: "node value is not a compound",
            }),
        }
    }

    pub(crate) fn set_mark(&mut self, mark: NodeMark) {
        self.mark = mark;
    }

    pub(crate) fn data_ref(&self) -> &NodeData {
        &self.data
    }

    pub(crate) fn set_fetched(
        &mut self,
        type_name: String,
        data: NodeData,
        named: Option<TypeHandle>,
        descr: Option<CompoundDescriptor>,
    ) {
        self.type_name = type_name;
        self.data = data;
        self.named = named;
        self.descr = descr;
        self.mark = NodeMark::Original;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_set_resolves_alias() {
        let mut n = Node::new(NodeKind::Attribute, "/info/count").unwrap();
        n.set_scalar(Value::Schar(3), "char").unwrap();
        assert_eq!(n.format(), "schar");
        assert_eq!(n.data().unwrap().as_scalar(), Some(&Value::Schar(3)));
        assert_eq!(n.rawdata().unwrap(), vec![3]);
    }

    #[test]
    fn value_on_group_is_rejected() {
        let mut n = Node::new(NodeKind::Group, "/info").unwrap();
        let err = n.set_scalar(Value::Int(1), "int").unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert_eq!(n.format(), "UNDEFINED");
    }

    #[test]
    fn array_dims_must_match() {
        let mut n = Node::new(NodeKind::Dataset, "/data").unwrap();
        let err = n
            .set_array(&[2, 2], vec![Value::Int(1), Value::Int(2)], "int")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        n.set_array(&[2], vec![Value::Int(1), Value::Int(2)], "int")
            .unwrap();
        assert_eq!(n.format(), "int");
    }

    #[test]
    fn ragged_string_array_is_rejected() {
        let mut n = Node::new(NodeKind::Dataset, "/names").unwrap();
        let err = n
            .set_array(
                &[2],
                vec![Value::Str("ab".into()), Value::Str("cde".into())],
                "string",
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));

        let err = n
            .set_array(&[1], vec![Value::Str(String::new())], "string")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));

        n.set_array(
            &[2],
            vec![Value::Str("ab".into()), Value::Str("cd".into())],
            "string",
        )
        .unwrap();
        assert_eq!(n.format(), "string");
    }

    #[test]
    fn rawdata_rejected_on_dataset() {
        let mut n = Node::new(NodeKind::Dataset, "/data").unwrap();
        n.set_array(&[1], vec![Value::Int(1)], "int").unwrap();
        let err = n.rawdata().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn reference_value_is_the_target_path() {
        let mut n = Node::new(NodeKind::Reference, "/links/here").unwrap();
        n.set_scalar(Value::Str("/group1/data".to_string()), "string")
            .unwrap();
        assert_eq!(
            n.data().unwrap().as_scalar().unwrap().as_str(),
            Some("/group1/data")
        );
        assert_eq!(n.rawdata().unwrap(), b"/group1/data".to_vec());
    }

    #[test]
    fn reference_rejects_numeric_value() {
        let mut n = Node::new(NodeKind::Reference, "/links/here").unwrap();
        let err = n.set_scalar(Value::Int(1), "int").unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn compound_data_requires_compound_type() {
        let mut n = Node::new(NodeKind::Attribute, "/a").unwrap();
        n.set_scalar(Value::Double(1.0), "double").unwrap();
        let err = n.compound_data().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn compound_roundtrip_through_node() {
        let descr = TypeRegistry::global()
            .describe_compound(&[("x", "double", 1), ("y", "double", 1)])
            .unwrap();
        let bytes = descr
            .encode(&[("x", &[Value::Double(1.0)]), ("y", &[Value::Double(2.0)])])
            .unwrap();
        let mut n = Node::new(NodeKind::Attribute, "/pos").unwrap();
        n.set_compound(descr, &[], bytes, None).unwrap();
        assert_eq!(n.format(), "compound");
        let fields = n.compound_data().unwrap();
        assert_eq!(fields[0], ("x".to_string(), vec![Value::Double(1.0)]));
        assert_eq!(fields[1], ("y".to_string(), vec![Value::Double(2.0)]));
    }

    #[test]
    fn commit_only_on_named_type() {
        let mut n = Node::new(NodeKind::NamedType, "/types/point").unwrap();
        n.commit(TypeHandle(1)).unwrap();
        assert_eq!(n.named_type(), Some(TypeHandle(1)));

        let mut g = Node::new(NodeKind::Group, "/g").unwrap();
        assert!(matches!(
            g.commit(TypeHandle(1)),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        assert!(Node::new(NodeKind::Group, "").is_err());
        assert!(Node::new(NodeKind::Group, "relative/path").is_err());
        assert!(Node::new(NodeKind::Group, "/trailing/").is_err());
    }

    #[test]
    fn marks_track_provenance() {
        let mut n = Node::new(NodeKind::Attribute, "/a").unwrap();
        assert_eq!(n.mark(), NodeMark::Created);
        n.set_scalar(Value::Int(1), "int").unwrap();
        assert_eq!(n.mark(), NodeMark::Created);
        n.set_mark(NodeMark::Original);
        n.set_scalar(Value::Int(2), "int").unwrap();
        assert_eq!(n.mark(), NodeMark::Changed);
    }
}
