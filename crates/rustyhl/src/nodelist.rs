//! The path-indexed node collection.
//!
//! A `NodeTree` enforces path uniqueness and ancestry at insertion
//! time, carries the per-session selection state, and owns the
//! opened-container handle when the tree originated from a read.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use rustyhl_format::{CompoundDescriptor, FileContainer, Storage, TypeHandle};

use crate::error::Error;
use crate::node::{Node, NodeKind, NodeMark};

/// Lifecycle state of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// Being built in memory for a first-time write.
    Building,
    /// Opened from a persisted container, structure known, values unset.
    Opened,
    /// At least one path marked for materialization.
    Selected,
    /// Selection materialized.
    Fetched,
    /// Persisted by a write or update.
    Written,
}

/// A mapping from absolute paths to nodes, plus selection and
/// container state.
pub struct NodeTree {
    pub(crate) nodes: BTreeMap<String, Node>,
    /// Selected paths not (yet) present in the tree; resolved or
    /// reported at fetch time.
    pub(crate) deferred: BTreeSet<String>,
    pub(crate) state: TreeState,
    pub(crate) storage: Option<Box<dyn Storage>>,
    pub(crate) types: BTreeMap<u64, CompoundDescriptor>,
    next_type: u64,
    closed: bool,
}

impl NodeTree {
    /// An empty tree for a first-time write session.
    pub fn new() -> NodeTree {
        NodeTree {
            nodes: BTreeMap::new(),
            deferred: BTreeSet::new(),
            state: TreeState::Building,
            storage: None,
            types: BTreeMap::new(),
            next_type: 1,
            closed: false,
        }
    }

    /// Open a persisted container, exposing its whole structure.
    pub fn open(container_path: &str) -> Result<NodeTree, Error> {
        NodeTree::open_scoped(container_path, "/")
    }

    /// Open a persisted container scoped to `scope`: only `scope` and
    /// its descendants are visible. Trailing slashes are ignored and
    /// `/` means the whole container. Scoping to a path that cannot
    /// hold children fails with [`Error::InvalidTarget`].
    pub fn open_scoped(container_path: &str, scope: &str) -> Result<NodeTree, Error> {
        let container = FileContainer::open(container_path)?;
        NodeTree::from_storage(Box::new(container), scope)
    }

    /// Open over any storage backend.
    pub fn from_storage(storage: Box<dyn Storage>, scope: &str) -> Result<NodeTree, Error> {
        let scope = scope.trim_end_matches('/');
        let entities = storage.list_entities(if scope.is_empty() { "/" } else { scope })?;
        if !scope.is_empty() {
            let root = entities
                .iter()
                .find(|e| e.path == scope)
                .ok_or_else(|| Error::NotFound(scope.to_string()))?;
            if root.kind != NodeKind::Group {
                return Err(Error::InvalidTarget(scope.to_string()));
            }
        }
        log::debug!("opened container with {} entities under {scope:?}", entities.len());
        let mut nodes = BTreeMap::new();
        for entity in entities {
            let mut node = Node::new(entity.kind, &entity.path)?;
            node.set_mark(NodeMark::Original);
            nodes.insert(entity.path, node);
        }
        Ok(NodeTree {
            nodes,
            deferred: BTreeSet::new(),
            state: TreeState::Opened,
            storage: Some(storage),
            types: BTreeMap::new(),
            next_type: 1,
            closed: false,
        })
    }

    pub(crate) fn ensure_live(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::ClosedContainer)
        } else {
            Ok(())
        }
    }

    /// Insert a new node, returning a mutable handle to it.
    ///
    /// Fails with [`Error::DuplicatePath`] if the path exists and with
    /// [`Error::InvalidHierarchy`] if the parent is neither the root
    /// nor an existing Group.
    pub fn add_node(&mut self, kind: NodeKind, path: &str) -> Result<&mut Node, Error> {
        self.ensure_live()?;
        let node = Node::new(kind, path)?;
        if self.nodes.contains_key(path) {
            return Err(Error::DuplicatePath(path.to_string()));
        }
        let parent = &path[..path.rfind('/').unwrap_or(0)];
        if !parent.is_empty() {
            match self.nodes.get(parent) {
                Some(p) if p.kind() == NodeKind::Group => {}
                _ => return Err(Error::InvalidHierarchy(path.to_string())),
            }
        }
        self.nodes.insert(path.to_string(), node);
        Ok(self.nodes.get_mut(path).unwrap())
    }

    /// Register a compound layout with this tree, minting the handle
    /// that NamedType nodes and compound values bind to.
    ///
    /// Handles are tree-scoped; the writer maps them onto durable
    /// container handles when the tree is persisted.
    pub fn register_type(&mut self, descr: CompoundDescriptor) -> TypeHandle {
        let handle = TypeHandle(self.next_type);
        self.next_type += 1;
        self.types.insert(handle.0, descr);
        handle
    }

    /// Mark `path` for materialization by the next fetch. An unknown
    /// path is accepted here and only surfaces as a failure at fetch
    /// time if still unresolved.
    pub fn select_node(&mut self, path: &str) -> Result<(), Error> {
        self.ensure_live()?;
        match self.nodes.get_mut(path) {
            Some(node) => node.set_mark(NodeMark::Select),
            None => {
                self.deferred.insert(path.to_string());
            }
        }
        self.state = TreeState::Selected;
        Ok(())
    }

    /// Mark every known node for materialization.
    pub fn select_all(&mut self) -> Result<(), Error> {
        self.ensure_live()?;
        for node in self.nodes.values_mut() {
            node.set_mark(NodeMark::Select);
        }
        self.state = TreeState::Selected;
        Ok(())
    }

    /// Mark every known node except Dataset payloads; cheap way to
    /// materialize the structure and attributes of a large tree.
    pub fn select_metadata(&mut self) -> Result<(), Error> {
        self.ensure_live()?;
        for node in self.nodes.values_mut() {
            if node.kind() != NodeKind::Dataset {
                node.set_mark(NodeMark::Select);
            }
        }
        self.state = TreeState::Selected;
        Ok(())
    }

    /// Undo a prior selection of `path`.
    pub fn deselect_node(&mut self, path: &str) -> Result<(), Error> {
        self.ensure_live()?;
        self.deferred.remove(path);
        if let Some(node) = self.nodes.get_mut(path) {
            if node.mark() == NodeMark::Select {
                node.set_mark(NodeMark::Original);
            }
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TreeState {
        self.state
    }

    /// Look up a previously added or fetched node without touching
    /// storage.
    pub fn get_node(&self, path: &str) -> Result<&Node, Error> {
        self.nodes
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// All known paths, sorted.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Materialize every selected node's value in one pass.
    ///
    /// Either every selected node is fully populated on return, or the
    /// call fails with [`Error::Fetch`] naming the first unresolvable
    /// path in path-sorted order and the tree is left untouched.
    pub fn fetch(&mut self) -> Result<(), Error> {
        crate::fetch::fetch(self)
    }

    /// Materialize exactly `path` and return it.
    pub fn fetch_node(&mut self, path: &str) -> Result<&Node, Error> {
        crate::fetch::fetch_node(self, path)
    }

    /// Serialize the whole tree into a brand-new container at
    /// `container_path`. `compression` (0-9) applies to array payloads
    /// only.
    pub fn write(&mut self, container_path: &str, compression: u8) -> Result<(), Error> {
        crate::writer::write(self, container_path, compression)
    }

    /// Persist nodes added since this tree was opened; existing
    /// entities are left untouched.
    pub fn update(&mut self) -> Result<(), Error> {
        crate::writer::update(self)
    }

    /// Release the container handle. Further storage-crossing calls
    /// fail with [`Error::ClosedContainer`].
    pub fn close(&mut self) -> Result<(), Error> {
        self.ensure_live()?;
        if let Some(storage) = self.storage.as_mut() {
            storage.close()?;
        }
        self.closed = true;
        Ok(())
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        NodeTree::new()
    }
}

// Manual impl: the storage trait object has no Debug.
impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes)
            .field("deferred", &self.deferred)
            .field("state", &self.state)
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}

impl Drop for NodeTree {
    fn drop(&mut self) {
        if !self.closed {
            if let Some(storage) = self.storage.as_mut() {
                let _ = storage.close();
            }
        }
    }
}
