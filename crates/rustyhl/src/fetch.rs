//! Selective materialization over a persisted tree.
//!
//! The selection set (marked nodes plus deferred paths) is resolved
//! against the container in path-sorted order, decoded through the
//! registry's canonical mapping and staged off to the side; nodes are
//! only populated once every selected path resolved. A failure
//! therefore names the first unresolvable path deterministically and
//! leaves the tree exactly as it was.

use std::collections::BTreeSet;

use rustyhl_format::typereg::UNDEFINED;
use rustyhl_format::{
    CompoundDescriptor, Storage, StorageError, TypeDescr, TypeHandle, Value,
};

use crate::error::Error;
use crate::node::{Node, NodeData, NodeKind, NodeMark};
use crate::nodelist::{NodeTree, TreeState};

struct Staged {
    path: String,
    kind: NodeKind,
    type_name: String,
    data: NodeData,
    named: Option<TypeHandle>,
    descr: Option<CompoundDescriptor>,
}

pub(crate) fn fetch(tree: &mut NodeTree) -> Result<(), Error> {
    tree.ensure_live()?;
    let mut selected: BTreeSet<String> = tree.deferred.clone();
    for (path, node) in &tree.nodes {
        if node.mark() == NodeMark::Select {
            selected.insert(path.clone());
        }
    }
    if !selected.is_empty() {
        materialize(tree, &selected)?;
    }
    tree.deferred.clear();
    tree.state = TreeState::Fetched;
    Ok(())
}

pub(crate) fn fetch_node<'t>(tree: &'t mut NodeTree, path: &str) -> Result<&'t Node, Error> {
    tree.ensure_live()?;
    let mut selected = BTreeSet::new();
    selected.insert(path.to_string());
    match materialize(tree, &selected) {
        Ok(()) => {}
        Err(Error::Fetch(p)) if p == path => return Err(Error::NotFound(p)),
        Err(e) => return Err(e),
    }
    tree.get_node(path)
}

/// Resolve and decode `paths`, then commit the results atomically.
fn materialize(tree: &mut NodeTree, paths: &BTreeSet<String>) -> Result<(), Error> {
    let storage = tree.storage.as_deref().ok_or_else(|| Error::InvalidOperation {
        path: "/".to_string(),
        what: "no opened container to fetch from",
    })?;

    let mut staged = Vec::with_capacity(paths.len());
    let mut batch_parent: Option<&str> = None;
    for path in paths {
        let parent = &path[..path.rfind('/').unwrap_or(0)];
        if batch_parent != Some(parent) {
            log::debug!("fetching batch under {}", if parent.is_empty() { "/" } else { parent });
            batch_parent = Some(parent);
        }
        staged.push(resolve_one(storage, path)?);
    }

    for entry in staged {
        match tree.nodes.get_mut(&entry.path) {
            Some(node) => {
                node.set_fetched(entry.type_name, entry.data, entry.named, entry.descr)
            }
            None => {
                let mut node = Node::new(entry.kind, &entry.path)?;
                node.set_fetched(entry.type_name, entry.data, entry.named, entry.descr);
                tree.nodes.insert(entry.path, node);
            }
        }
    }
    Ok(())
}

fn resolve_one(storage: &dyn Storage, path: &str) -> Result<Staged, Error> {
    let ty = match storage.read_entity_type(path) {
        Ok(ty) => ty,
        Err(StorageError::NotFound(_)) => return Err(Error::Fetch(path.to_string())),
        Err(StorageError::Closed) => return Err(Error::ClosedContainer),
        Err(e) => return Err(e.into()),
    };
    let mut out = Staged {
        path: path.to_string(),
        kind: ty.kind,
        type_name: UNDEFINED.to_string(),
        data: NodeData::Unset,
        named: ty.named,
        descr: None,
    };
    match (ty.kind, &ty.descr) {
        (NodeKind::Group, _) => {}
        (NodeKind::NamedType, TypeDescr::Compound(descr)) => {
            out.descr = Some(descr.clone());
        }
        (NodeKind::NamedType, _) => {}
        (NodeKind::Reference, _) => {
            let bytes = read_payload(storage, path)?;
            out.type_name = "string".to_string();
            out.data = NodeData::Scalar(Value::Str(
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        (_, TypeDescr::Compound(wire)) => {
            let bytes = read_payload(storage, path)?;
            // A committed schema is authoritative over the inline one.
            let descr = match ty.named {
                Some(handle) => match storage.read_committed_type(handle) {
                    Ok(descr) => descr,
                    Err(StorageError::Closed) => return Err(Error::ClosedContainer),
                    Err(_) => wire.clone(),
                },
                None => wire.clone(),
            };
            out.type_name = "compound".to_string();
            out.data = NodeData::Compound {
                descr,
                dims: ty.dims.clone(),
                bytes,
            };
        }
        (_, TypeDescr::Str { size }) => {
            let bytes = read_payload(storage, path)?;
            out.type_name = "string".to_string();
            if ty.dims.is_empty() || *size == 0 {
                out.data = NodeData::Scalar(Value::Str(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ));
            } else {
                let count: u64 = ty.dims.iter().product();
                let values =
                    Value::decode_array("string", *size as usize, count as usize, &bytes)
                        .map_err(|_| Error::Fetch(path.to_string()))?;
                out.data = NodeData::Array {
                    dims: ty.dims.clone(),
                    values,
                };
            }
        }
        (_, descr) => {
            let bytes = read_payload(storage, path)?;
            let canonical = descr.canonical_name();
            let elem = descr.type_size();
            out.type_name = canonical.to_string();
            if ty.dims.is_empty() {
                out.data = NodeData::Scalar(
                    Value::decode(canonical, &bytes)
                        .map_err(|_| Error::Fetch(path.to_string()))?,
                );
            } else {
                let count: u64 = ty.dims.iter().product();
                let values = Value::decode_array(canonical, elem, count as usize, &bytes)
                    .map_err(|_| Error::Fetch(path.to_string()))?;
                out.data = NodeData::Array {
                    dims: ty.dims.clone(),
                    values,
                };
            }
        }
    }
    Ok(out)
}

fn read_payload(storage: &dyn Storage, path: &str) -> Result<Vec<u8>, Error> {
    match storage.read_entity_bytes(path) {
        Ok(bytes) => Ok(bytes),
        Err(StorageError::Closed) => Err(Error::ClosedContainer),
        Err(_) => Err(Error::Fetch(path.to_string())),
    }
}
