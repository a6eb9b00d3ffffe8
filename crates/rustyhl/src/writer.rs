//! Serializing a tree into a container.
//!
//! `write` persists every node into a brand-new container; `update`
//! appends the nodes added since the tree was opened, leaving existing
//! entities untouched. Both commit NamedType nodes before any value
//! that references one, in a single path-sorted pass per stage, and
//! map the tree-scoped type handles onto the durable handles the
//! container mints.

use std::collections::BTreeMap;

use rustyhl_format::{FileContainer, Storage, TypeDescr, TypeHandle, Value};

use crate::error::Error;
use crate::node::{Node, NodeData, NodeKind, NodeMark};
use crate::nodelist::{NodeTree, TreeState};

pub(crate) fn write(
    tree: &mut NodeTree,
    container_path: &str,
    compression: u8,
) -> Result<(), Error> {
    tree.ensure_live()?;
    if !tree.nodes.keys().any(|p| p != "/") {
        return Err(Error::EmptyContainer);
    }

    let mut container = FileContainer::create(container_path);
    let handles = commit_named_types(tree, &mut container)?;

    let mut written = 0usize;
    for node in tree.nodes.values() {
        if node.kind() == NodeKind::NamedType || node.name() == "/" {
            continue;
        }
        write_node(&mut container, node, &handles, compression)?;
        written += 1;
    }
    container.sync()?;
    container.close()?;
    log::debug!("wrote {written} nodes to {container_path}");

    for node in tree.nodes.values_mut() {
        node.set_mark(NodeMark::Original);
    }
    tree.state = TreeState::Written;
    Ok(())
}

pub(crate) fn update(tree: &mut NodeTree) -> Result<(), Error> {
    tree.ensure_live()?;
    if tree.storage.is_none() {
        return Err(Error::InvalidOperation {
            path: "/".to_string(),
            what: "update requires a tree opened from a container",
        });
    }

    let created: Vec<String> = tree
        .nodes
        .iter()
        .filter(|(_, n)| n.mark() == NodeMark::Created)
        .map(|(p, _)| p.clone())
        .collect();

    // Validate everything up front; storage is only touched once no
    // node can fail for a reason of its own.
    let mut named_locals = std::collections::BTreeSet::new();
    for path in &created {
        let node = &tree.nodes[path];
        if node.kind() == NodeKind::NamedType {
            named_locals.insert(named_type_layout(tree, node)?.0);
        }
    }
    for path in &created {
        let node = &tree.nodes[path];
        if node.kind() == NodeKind::NamedType {
            continue;
        }
        match node.data_ref() {
            NodeData::Unset if node.kind() != NodeKind::Group => {
                return Err(Error::InvalidOperation {
                    path: path.clone(),
                    what: "node has no value to write",
                });
            }
            NodeData::Compound { .. } => {
                if let Some(local) = node.named_type() {
                    if !named_locals.contains(&local.0) {
                        return Err(Error::InvalidOperation {
                            path: path.clone(),
                            what: "compound value bound to an uncommitted type handle",
                        });
                    }
                }
            }
            _ => {}
        }
    }

    // Commit the new named types first so dependents can bind to them.
    let mut handles = BTreeMap::new();
    for path in &created {
        let node = &tree.nodes[path];
        if node.kind() == NodeKind::NamedType {
            let local = node.named_type().unwrap();
            let storage = tree.storage.as_deref_mut().unwrap();
            let durable = storage.commit_type(path, &tree.types[&local.0])?;
            handles.insert(local.0, durable);
        }
    }
    for path in &created {
        let node = &tree.nodes[path];
        if node.kind() != NodeKind::NamedType {
            let storage = tree.storage.as_deref_mut().unwrap();
            write_node(storage, node, &handles, 0)?;
        }
    }
    let storage = tree.storage.as_deref_mut().unwrap();
    storage.sync()?;
    log::debug!("update appended {} nodes", created.len());

    for path in &created {
        if let Some(node) = tree.nodes.get_mut(path) {
            node.set_mark(NodeMark::Original);
        }
    }
    tree.state = TreeState::Written;
    Ok(())
}

fn commit_named_types(
    tree: &NodeTree,
    container: &mut FileContainer,
) -> Result<BTreeMap<u64, TypeHandle>, Error> {
    let mut handles = BTreeMap::new();
    for node in tree.nodes.values() {
        if node.kind() != NodeKind::NamedType {
            continue;
        }
        let local = named_type_layout(tree, node)?;
        let durable = container.commit_type(node.name(), &tree.types[&local.0])?;
        handles.insert(local.0, durable);
    }
    Ok(handles)
}

fn named_type_layout(tree: &NodeTree, node: &Node) -> Result<TypeHandle, Error> {
    match node.named_type() {
        Some(handle) if tree.types.contains_key(&handle.0) => Ok(handle),
        _ => Err(Error::InvalidOperation {
            path: node.name().to_string(),
            what: "named type has no registered layout",
        }),
    }
}

fn write_node(
    storage: &mut dyn Storage,
    node: &Node,
    handles: &BTreeMap<u64, TypeHandle>,
    compression: u8,
) -> Result<(), Error> {
    let path = node.name();
    match node.data_ref() {
        NodeData::Unset => {
            if node.kind() == NodeKind::Group {
                storage.write_entity(path, node.kind(), &TypeDescr::None, &[], &[], None, 0)?;
                Ok(())
            } else {
                Err(Error::InvalidOperation {
                    path: path.to_string(),
                    what: "node has no value to write",
                })
            }
        }
        NodeData::Scalar(value) => {
            let bytes = value.encode();
            let descr = if node.kind() == NodeKind::Reference {
                // Stored as the literal target path, validated lexically
                // at set time only; the target need not exist.
                TypeDescr::Reference
            } else {
                TypeDescr::for_type_name(node.format(), bytes.len())?
            };
            storage.write_entity(path, node.kind(), &descr, &[], &bytes, None, 0)?;
            Ok(())
        }
        NodeData::Array { dims, values } => {
            let mut bytes = Vec::new();
            for value in values {
                bytes.extend_from_slice(&value.encode());
            }
            let str_len = values.first().map_or(0, |v| {
                if matches!(v, Value::Str(_)) { v.encode().len() } else { 0 }
            });
            let descr = TypeDescr::for_type_name(node.format(), str_len)?;
            storage.write_entity(path, node.kind(), &descr, dims, &bytes, None, compression)?;
            Ok(())
        }
        NodeData::Compound { descr, dims, bytes } => {
            let named = match node.named_type() {
                Some(local) => {
                    Some(*handles.get(&local.0).ok_or_else(|| Error::InvalidOperation {
                        path: path.to_string(),
                        what: "compound value bound to an uncommitted type handle",
                    })?)
                }
                None => None,
            };
            let level = if dims.is_empty() { 0 } else { compression };
            storage.write_entity(
                path,
                node.kind(),
                &TypeDescr::Compound(descr.clone()),
                dims,
                bytes,
                named,
                level,
            )?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rustyhl_writer_{name}_{}", std::process::id()))
    }

    #[test]
    fn root_only_tree_is_rejected() {
        let mut tree = NodeTree::new();
        let err = tree.write("/nonexistent/never-created", 0).unwrap_err();
        assert!(matches!(err, Error::EmptyContainer));

        let mut tree = NodeTree::new();
        tree.add_node(NodeKind::Group, "/").unwrap();
        let err = tree.write("/nonexistent/never-created", 0).unwrap_err();
        assert!(matches!(err, Error::EmptyContainer));
    }

    #[test]
    fn dataset_without_value_is_rejected() {
        let path = temp_path("novalue");
        let mut tree = NodeTree::new();
        tree.add_node(NodeKind::Dataset, "/data").unwrap();
        let err = tree.write(path.to_str().unwrap(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn named_type_needs_registered_layout() {
        let path = temp_path("nolayout");
        let mut tree = NodeTree::new();
        tree.add_node(NodeKind::Group, "/types").unwrap();
        tree.add_node(NodeKind::NamedType, "/types/point").unwrap();
        let err = tree.write(path.to_str().unwrap(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn marks_reset_after_write() {
        let path = temp_path("marks");
        let mut tree = NodeTree::new();
        tree.add_node(NodeKind::Group, "/info").unwrap();
        tree.add_node(NodeKind::Attribute, "/info/n")
            .unwrap()
            .set_scalar(Value::Int(1), "int")
            .unwrap();
        tree.write(path.to_str().unwrap(), 0).unwrap();
        assert_eq!(tree.get_node("/info/n").unwrap().mark(), NodeMark::Original);
        std::fs::remove_file(&path).ok();
    }
}
