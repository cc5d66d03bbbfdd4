//! Path-addressable data tree.
//!
//! Objects and arrays live in a flat arena of nodes. Every node remembers
//! the `(parent, key)` it is reachable under, which is enough to rebuild its
//! path from the root by walking upwards. Nodes are never freed: replacing
//! or deleting a node only clears its parent link, which detaches it and
//! everything below it. Mutations on detached nodes are applied but never
//! reported.
//!
//! All mutation goes through [`DataTree`] methods. Each reported mutation
//! records the leaf path plus every ancestor path; the set is flushed as one
//! [`DataChange`] either as a microtask or when the outermost
//! [`batch`](DataTree::batch) exits.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::form::error::DataError;
use crate::form::value::{Key, Path, Value};
use crate::hooks::observable::{Listeners, Subscription};
use crate::runtime::Runtime;

/// Arena index of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
}

/// One flushed burst of mutations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChange {
    /// Changed leaf paths followed by their ancestors, without duplicates.
    pub paths: Vec<Path>,
}

impl DataChange {
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn path_strings(&self) -> Vec<String> {
        self.paths.iter().map(Path::to_string).collect()
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Leaf(Value),
    Node(NodeId),
}

#[derive(Debug)]
enum Body {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

impl Body {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Object(_) => NodeKind::Object,
            Self::Array(_) => NodeKind::Array,
        }
    }

    fn get(&self, key: &Key) -> Option<&Slot> {
        match (self, key) {
            (Self::Object(map), key) => map.get(&key.to_name()),
            (Self::Array(items), Key::Index(i)) => items.get(*i),
            (Self::Array(_), Key::Name(_)) => None,
        }
    }
}

#[derive(Debug)]
struct Node {
    uid: Uuid,
    parent: Option<(NodeId, Key)>,
    body: Body,
}

enum Container {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

impl Container {
    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(Self::Object(map)),
            Value::Array(items) => Ok(Self::Array(items)),
            other => Err(other),
        }
    }
}

fn alloc_node(nodes: &mut Vec<Node>, container: Container, parent: Option<(NodeId, Key)>) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(Node {
        uid: Uuid::new_v4(),
        parent,
        body: Body::Array(Vec::new()),
    });
    let body = match container {
        Container::Object(map) => Body::Object(
            map.into_iter()
                .map(|(name, value)| {
                    let slot = alloc_slot(nodes, value, id, Key::parse(&name));
                    (name, slot)
                })
                .collect(),
        ),
        Container::Array(items) => Body::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, value)| alloc_slot(nodes, value, id, Key::Index(i)))
                .collect(),
        ),
    };
    nodes[id.0].body = body;
    id
}

fn alloc_slot(nodes: &mut Vec<Node>, value: Value, parent: NodeId, key: Key) -> Slot {
    match Container::from_value(value) {
        Ok(container) => Slot::Node(alloc_node(nodes, container, Some((parent, key)))),
        Err(leaf) => Slot::Leaf(leaf),
    }
}

type ChangeListener = dyn Fn(&DataChange);
type MutationHook = dyn Fn(&Path);

/// Shared handle to one data tree. Cloning is cheap.
#[derive(Clone)]
pub struct DataTree {
    inner: Rc<TreeInner>,
}

struct TreeInner {
    runtime: Runtime,
    nodes: RefCell<Vec<Node>>,
    root: Cell<NodeId>,
    pending: RefCell<IndexSet<Path>>,
    batch_depth: Cell<u32>,
    flush_scheduled: Cell<bool>,
    epoch: Cell<u64>,
    listeners: Rc<Listeners<ChangeListener>>,
    hooks: Rc<Listeners<MutationHook>>,
}

impl DataTree {
    /// Create a tree rooted at `initial`, which must be an object or array.
    pub fn new(runtime: &Runtime, initial: Value) -> Result<Self, DataError> {
        let container = Container::from_value(initial).map_err(|leaf| DataError::NotContainer {
            found: leaf.type_name(),
        })?;
        let mut nodes = Vec::new();
        let root = alloc_node(&mut nodes, container, None);
        Ok(Self {
            inner: Rc::new(TreeInner {
                runtime: runtime.clone(),
                nodes: RefCell::new(nodes),
                root: Cell::new(root),
                pending: RefCell::new(IndexSet::new()),
                batch_depth: Cell::new(0),
                flush_scheduled: Cell::new(false),
                epoch: Cell::new(0),
                listeners: Listeners::new(),
                hooks: Listeners::new(),
            }),
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn root(&self) -> NodeId {
        self.inner.root.get()
    }

    /// Count of reported mutations so far.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.get()
    }

    // -- reads ---------------------------------------------------------------

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner
            .nodes
            .borrow()
            .get(node.0)
            .map(|n| n.body.kind())
    }

    pub fn unique_id(&self, node: NodeId) -> Option<Uuid> {
        self.inner.nodes.borrow().get(node.0).map(|n| n.uid)
    }

    pub fn len(&self, node: NodeId) -> usize {
        match self.inner.nodes.borrow().get(node.0).map(|n| &n.body) {
            Some(Body::Object(map)) => map.len(),
            Some(Body::Array(items)) => items.len(),
            None => 0,
        }
    }

    pub fn keys(&self, node: NodeId) -> Vec<Key> {
        match self.inner.nodes.borrow().get(node.0).map(|n| &n.body) {
            Some(Body::Object(map)) => map.keys().map(|name| Key::parse(name)).collect(),
            Some(Body::Array(items)) => (0..items.len()).map(Key::Index).collect(),
            None => Vec::new(),
        }
    }

    pub fn contains(&self, node: NodeId, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.inner
            .nodes
            .borrow()
            .get(node.0)
            .is_some_and(|n| n.body.get(&key).is_some())
    }

    /// Snapshot of the value under `key`.
    pub fn get(&self, node: NodeId, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let slot = self.slot(node, &key)?;
        Some(self.slot_value(&slot))
    }

    /// The node stored under `key`, if that slot holds a container.
    pub fn child(&self, node: NodeId, key: impl Into<Key>) -> Option<NodeId> {
        match self.slot(node, &key.into())? {
            Slot::Node(child) => Some(child),
            Slot::Leaf(_) => None,
        }
    }

    /// Deep copy of `node`.
    pub fn value(&self, node: NodeId) -> Value {
        let nodes = self.inner.nodes.borrow();
        Self::snapshot_node(&nodes, node)
    }

    /// Deep copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.value(self.root())
    }

    pub fn lookup(&self, path: &Path) -> Option<Value> {
        match path.parent() {
            None => Some(self.snapshot()),
            Some(parent) => {
                let node = self.node_at(&parent)?;
                self.get(node, path.last()?.clone())
            }
        }
    }

    /// The node at `path`, if that slot holds a container.
    pub fn node_at(&self, path: &Path) -> Option<NodeId> {
        path.segments()
            .iter()
            .try_fold(self.root(), |node, key| self.child(node, key.clone()))
    }

    /// Path from the root to `node`, or `None` once it is detached.
    pub fn path_of(&self, node: NodeId) -> Option<Path> {
        let nodes = self.inner.nodes.borrow();
        let root = self.root();
        let mut keys = Vec::new();
        let mut current = node;
        while current != root {
            let (parent, key) = nodes.get(current.0)?.parent.as_ref()?;
            keys.push(key.clone());
            current = *parent;
        }
        keys.reverse();
        Some(Path::from(keys))
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.path_of(node).is_some()
    }

    fn slot(&self, node: NodeId, key: &Key) -> Option<Slot> {
        self.inner
            .nodes
            .borrow()
            .get(node.0)
            .and_then(|n| n.body.get(key).cloned())
    }

    fn slot_value(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Leaf(value) => value.clone(),
            Slot::Node(id) => self.value(*id),
        }
    }

    fn snapshot_node(nodes: &[Node], node: NodeId) -> Value {
        let snapshot_slot = |slot: &Slot| match slot {
            Slot::Leaf(value) => value.clone(),
            Slot::Node(id) => Self::snapshot_node(nodes, *id),
        };
        match nodes.get(node.0).map(|n| &n.body) {
            Some(Body::Object(map)) => Value::Object(
                map.iter()
                    .map(|(name, slot)| (name.clone(), snapshot_slot(slot)))
                    .collect(),
            ),
            Some(Body::Array(items)) => Value::Array(items.iter().map(snapshot_slot).collect()),
            None => Value::Null,
        }
    }

    // -- writes --------------------------------------------------------------

    /// Assign `value` under `key`.
    ///
    /// A value equal to the current leaf (`SameValueZero`) is a no-op. An
    /// object written over an object node, or an array over an array node,
    /// is merged in place so the node keeps its identity. Returns whether
    /// anything changed.
    pub fn set(&self, node: NodeId, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool, DataError> {
        let key = key.into();
        self.check_key(node, &key)?;
        self.assign(node, key, value.into())
    }

    fn assign(&self, node: NodeId, key: Key, value: Value) -> Result<bool, DataError> {
        let current = self.slot(node, &key);
        match (current, Container::from_value(value)) {
            (Some(Slot::Node(child)), Ok(Container::Object(map)))
                if self.kind(child) == Some(NodeKind::Object) =>
            {
                self.merge_object(child, map)
            }
            (Some(Slot::Node(child)), Ok(Container::Array(items)))
                if self.kind(child) == Some(NodeKind::Array) =>
            {
                self.merge_array(child, items)
            }
            (Some(Slot::Leaf(old)), Err(leaf)) if old == leaf => Ok(false),
            (current, fresh) => {
                let slot = match fresh {
                    Ok(container) => {
                        let mut nodes = self.inner.nodes.borrow_mut();
                        Slot::Node(alloc_node(&mut nodes, container, Some((node, key.clone()))))
                    }
                    Err(leaf) => Slot::Leaf(leaf),
                };
                self.write_slot(node, &key, slot);
                if let Some(Slot::Node(old)) = current {
                    self.detach(old);
                }
                self.record(node, &key);
                Ok(true)
            }
        }
    }

    fn merge_object(&self, node: NodeId, map: IndexMap<String, Value>) -> Result<bool, DataError> {
        let mut changed = false;
        for key in self.keys(node) {
            if !map.contains_key(&key.to_name()) {
                changed |= self.delete(node, key)?;
            }
        }
        for (name, value) in map {
            changed |= self.assign(node, Key::parse(&name), value)?;
        }
        Ok(changed)
    }

    fn merge_array(&self, node: NodeId, items: Vec<Value>) -> Result<bool, DataError> {
        let len = items.len();
        let mut changed = false;
        for (i, value) in items.into_iter().enumerate() {
            changed |= self.assign(node, Key::Index(i), value)?;
        }
        changed |= self.set_len(node, len)?;
        Ok(changed)
    }

    /// Attach a detached node under `key`.
    ///
    /// Fails with [`DataError::TrackedNode`] if `child` is already reachable
    /// from the root.
    pub fn set_node(&self, node: NodeId, key: impl Into<Key>, child: NodeId) -> Result<bool, DataError> {
        let key = key.into();
        self.check_key(node, &key)?;
        {
            let nodes = self.inner.nodes.borrow();
            let target = nodes.get(child.0).ok_or(DataError::UnknownNode)?;
            if target.parent.is_some() || child == self.root() {
                return Err(DataError::TrackedNode);
            }
            let mut current = Some(node);
            while let Some(id) = current {
                if id == child {
                    return Err(DataError::Cycle);
                }
                current = nodes.get(id.0).and_then(|n| n.parent.as_ref().map(|(p, _)| *p));
            }
        }
        if let Some(Slot::Node(same)) = self.slot(node, &key) {
            if same == child {
                return Ok(false);
            }
        }
        let previous = self.slot(node, &key);
        self.inner.nodes.borrow_mut()[child.0].parent = Some((node, key.clone()));
        self.write_slot(node, &key, Slot::Node(child));
        if let Some(Slot::Node(old)) = previous {
            self.detach(old);
        }
        self.record(node, &key);
        Ok(true)
    }

    /// Allocate a detached node holding `value`, ready for [`set_node`](Self::set_node).
    pub fn create_detached(&self, value: Value) -> Result<NodeId, DataError> {
        let container = Container::from_value(value).map_err(|leaf| DataError::NotContainer {
            found: leaf.type_name(),
        })?;
        let mut nodes = self.inner.nodes.borrow_mut();
        Ok(alloc_node(&mut nodes, container, None))
    }

    /// Remove `key`. Array slots become `null` holes; use
    /// [`remove_at`](Self::remove_at) to shift.
    pub fn delete(&self, node: NodeId, key: impl Into<Key>) -> Result<bool, DataError> {
        let key = key.into();
        self.check_key(node, &key)?;
        let removed = {
            let mut nodes = self.inner.nodes.borrow_mut();
            match &mut nodes[node.0].body {
                Body::Object(map) => map.shift_remove(&key.to_name()),
                Body::Array(items) => match key.as_index().and_then(|i| items.get_mut(i)) {
                    Some(slot) if !matches!(slot, Slot::Leaf(Value::Null)) => {
                        Some(std::mem::replace(slot, Slot::Leaf(Value::Null)))
                    }
                    _ => None,
                },
            }
        };
        let Some(removed) = removed else {
            return Ok(false);
        };
        if let Slot::Node(old) = removed {
            self.detach(old);
        }
        self.record(node, &key);
        Ok(true)
    }

    /// Resize an array. Truncated indices are deleted one by one first.
    pub fn set_len(&self, node: NodeId, len: usize) -> Result<bool, DataError> {
        self.require_array(node)?;
        let old = self.len(node);
        if len == old {
            return Ok(false);
        }
        if len < old {
            for i in (len..old).rev() {
                self.delete(node, i)?;
            }
            if let Body::Array(items) = &mut self.inner.nodes.borrow_mut()[node.0].body {
                items.truncate(len);
            }
            for i in len..old {
                self.record(node, &Key::Index(i));
            }
        } else {
            if let Body::Array(items) = &mut self.inner.nodes.borrow_mut()[node.0].body {
                items.resize(len, Slot::Leaf(Value::Null));
            }
            for i in old..len {
                self.record(node, &Key::Index(i));
            }
        }
        Ok(true)
    }

    /// Append to an array, returning the new index.
    pub fn push(&self, node: NodeId, value: impl Into<Value>) -> Result<usize, DataError> {
        self.require_array(node)?;
        let index = self.len(node);
        self.assign(node, Key::Index(index), value.into())?;
        Ok(index)
    }

    /// Remove and return the element at `index`, shifting the rest down.
    pub fn remove_at(&self, node: NodeId, index: usize) -> Result<Option<Value>, DataError> {
        self.require_array(node)?;
        let old_len = self.len(node);
        if index >= old_len {
            return Ok(None);
        }
        let removed = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let (removed, shifted) = match &mut nodes[node.0].body {
                Body::Array(items) => {
                    let removed = items.remove(index);
                    let shifted: Vec<(usize, NodeId)> = items
                        .iter()
                        .enumerate()
                        .skip(index)
                        .filter_map(|(i, slot)| match slot {
                            Slot::Node(id) => Some((i, *id)),
                            Slot::Leaf(_) => None,
                        })
                        .collect();
                    (removed, shifted)
                }
                Body::Object(_) => return Err(DataError::NotAnArray { path: String::new() }),
            };
            for (i, id) in shifted {
                nodes[id.0].parent = Some((node, Key::Index(i)));
            }
            removed
        };
        let value = self.slot_value(&removed);
        if let Slot::Node(old) = removed {
            self.detach(old);
        }
        for i in index..old_len {
            self.record(node, &Key::Index(i));
        }
        Ok(Some(value))
    }

    /// Assign at a path from the root, creating intermediate objects.
    pub fn set_path(&self, path: &Path, value: impl Into<Value>) -> Result<bool, DataError> {
        match (path.parent(), path.last()) {
            (Some(parent), Some(key)) => {
                let node = self.ensure_container(&parent)?;
                self.set(node, key.clone(), value)
            }
            _ => self.replace_root(value.into()).map(|_| true),
        }
    }

    pub fn delete_path(&self, path: &Path) -> Result<bool, DataError> {
        let (Some(parent), Some(key)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        match self.node_at(&parent) {
            Some(node) => self.delete(node, key.clone()),
            None => Ok(false),
        }
    }

    /// The container at `path`, creating empty objects where slots are
    /// missing or `null`.
    pub fn ensure_container(&self, path: &Path) -> Result<NodeId, DataError> {
        let mut node = self.root();
        for key in path.segments() {
            node = match self.slot(node, key) {
                Some(Slot::Node(child)) => child,
                None | Some(Slot::Leaf(Value::Null)) => {
                    self.set(node, key.clone(), Value::object())?;
                    self.child(node, key.clone()).ok_or(DataError::UnknownNode)?
                }
                Some(Slot::Leaf(_)) => {
                    return Err(DataError::MissingPath {
                        path: path.to_string(),
                    })
                }
            };
        }
        Ok(node)
    }

    /// Replace the tree's contents. The root keeps its identity when the
    /// new value has the same kind.
    pub fn replace_root(&self, value: Value) -> Result<(), DataError> {
        let container = Container::from_value(value).map_err(|leaf| DataError::NotContainer {
            found: leaf.type_name(),
        })?;
        let root = self.root();
        match (self.kind(root), container) {
            (Some(NodeKind::Object), Container::Object(map)) => {
                self.merge_object(root, map)?;
            }
            (Some(NodeKind::Array), Container::Array(items)) => {
                self.merge_array(root, items)?;
            }
            (_, container) => {
                let old_keys = self.keys(root);
                let new_root = {
                    let mut nodes = self.inner.nodes.borrow_mut();
                    alloc_node(&mut nodes, container, None)
                };
                self.inner.root.set(new_root);
                let mut touched: IndexSet<Key> = old_keys.into_iter().collect();
                touched.extend(self.keys(new_root));
                for key in touched {
                    self.record(new_root, &key);
                }
            }
        }
        Ok(())
    }

    fn check_key(&self, node: NodeId, key: &Key) -> Result<(), DataError> {
        match self.kind(node) {
            None => Err(DataError::UnknownNode),
            Some(NodeKind::Array) if key.as_index().is_none() => Err(DataError::InvalidIndex {
                path: self.path_of(node).map(|p| p.to_string()).unwrap_or_default(),
                key: key.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn require_array(&self, node: NodeId) -> Result<(), DataError> {
        match self.kind(node) {
            Some(NodeKind::Array) => Ok(()),
            Some(NodeKind::Object) => Err(DataError::NotAnArray {
                path: self.path_of(node).map(|p| p.to_string()).unwrap_or_default(),
            }),
            None => Err(DataError::UnknownNode),
        }
    }

    fn write_slot(&self, node: NodeId, key: &Key, slot: Slot) {
        let mut nodes = self.inner.nodes.borrow_mut();
        match (&mut nodes[node.0].body, key) {
            (Body::Object(map), key) => {
                map.insert(key.to_name(), slot);
            }
            (Body::Array(items), Key::Index(i)) => {
                if *i >= items.len() {
                    items.resize(*i + 1, Slot::Leaf(Value::Null));
                }
                items[*i] = slot;
            }
            (Body::Array(_), Key::Name(_)) => {}
        }
    }

    fn detach(&self, node: NodeId) {
        if let Some(n) = self.inner.nodes.borrow_mut().get_mut(node.0) {
            n.parent = None;
        }
    }

    // -- change batching -----------------------------------------------------

    fn record(&self, node: NodeId, key: &Key) {
        let Some(base) = self.path_of(node) else {
            return;
        };
        let path = base.join(key.clone());
        {
            let mut pending = self.inner.pending.borrow_mut();
            pending.insert(path.clone());
            pending.extend(path.ancestors());
        }
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        for hook in self.inner.hooks.snapshot() {
            hook(&path);
        }
        if self.inner.batch_depth.get() == 0 && !self.inner.flush_scheduled.replace(true) {
            let weak = Rc::downgrade(&self.inner);
            self.inner.runtime.queue_microtask(move || {
                if let Some(inner) = weak.upgrade() {
                    DataTree { inner }.flush();
                }
            });
        }
    }

    /// Run `f` as one batch. Nested calls join the outermost batch, whose
    /// exit flushes synchronously.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
        let result = {
            let inner = Rc::clone(&self.inner);
            let _exit = scopeguard::guard((), move |_| {
                inner.batch_depth.set(inner.batch_depth.get().saturating_sub(1));
            });
            f()
        };
        if self.inner.batch_depth.get() == 0 {
            self.flush();
        }
        result
    }

    pub fn in_batch(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// Emit pending paths now.
    pub fn flush(&self) {
        self.inner.flush_scheduled.set(false);
        if self.in_batch() {
            return;
        }
        let paths: Vec<Path> = std::mem::take(&mut *self.inner.pending.borrow_mut())
            .into_iter()
            .collect();
        if paths.is_empty() {
            return;
        }
        tracing::trace!(paths = paths.len(), "data change flushed");
        let change = DataChange { paths };
        for listener in self.inner.listeners.snapshot() {
            listener(&change);
        }
    }

    /// Receive one [`DataChange`] per flushed burst.
    pub fn subscribe(&self, listener: impl Fn(&DataChange) + 'static) -> Subscription {
        self.inner.listeners.add(Rc::new(listener))
    }

    /// Called synchronously with each reported leaf path.
    pub fn on_mutation(&self, hook: impl Fn(&Path) + 'static) -> Subscription {
        self.inner.hooks.add(Rc::new(hook))
    }
}

impl fmt::Debug for DataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTree")
            .field("root", &self.root())
            .field("nodes", &self.inner.nodes.borrow().len())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(rt: &Runtime, value: serde_json::Value) -> DataTree {
        DataTree::new(rt, Value::from(value)).unwrap()
    }

    fn record_changes(tree: &DataTree) -> (Rc<RefCell<Vec<DataChange>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let sub = tree.subscribe(move |change| l.borrow_mut().push(change.clone()));
        (log, sub)
    }

    #[test]
    fn rejects_leaf_root() {
        let rt = Runtime::new();
        let err = DataTree::new(&rt, Value::from(3)).unwrap_err();
        assert_eq!(err, DataError::NotContainer { found: "number" });
    }

    #[test]
    fn object_merge_keeps_node_identity() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"address": {"street": "a", "zip": "1"}}));
        let address = t.child(t.root(), "address").unwrap();

        t.set(t.root(), "address", Value::from(json!({"street": "b"}))).unwrap();
        assert_eq!(t.child(t.root(), "address"), Some(address));
        assert_eq!(t.snapshot(), Value::from(json!({"address": {"street": "b"}})));
    }

    #[test]
    fn array_over_array_splices_in_place() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"items": [1, 2, 3]}));
        let items = t.child(t.root(), "items").unwrap();
        t.set(t.root(), "items", Value::from(json!([9]))).unwrap();
        assert_eq!(t.child(t.root(), "items"), Some(items));
        assert_eq!(t.value(items), Value::from(json!([9])));
    }

    #[test]
    fn replaced_node_is_detached_and_silent() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"a": {"b": 1}}));
        let a = t.child(t.root(), "a").unwrap();
        t.set(t.root(), "a", 5).unwrap();
        rt.run_until_idle();
        assert!(!t.is_attached(a));

        let (log, _sub) = record_changes(&t);
        let epoch = t.epoch();
        t.set(a, "b", 2).unwrap();
        rt.run_until_idle();
        assert!(log.borrow().is_empty());
        assert_eq!(t.epoch(), epoch);
    }

    #[test]
    fn tracked_node_cannot_be_reassigned() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"a": {}, "b": null}));
        let a = t.child(t.root(), "a").unwrap();
        assert_eq!(t.set_node(t.root(), "b", a), Err(DataError::TrackedNode));
    }

    #[test]
    fn detached_node_can_be_reparented() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"a": {"x": 1}}));
        let a = t.child(t.root(), "a").unwrap();
        t.delete(t.root(), "a").unwrap();
        assert!(t.set_node(t.root(), "b", a).unwrap());
        assert_eq!(t.path_of(a), Some(Path::parse("b")));
    }

    #[test]
    fn reparenting_under_own_descendant_is_a_cycle() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({}));
        let outer = t.create_detached(Value::from(json!({"inner": {}}))).unwrap();
        let inner = t.child(outer, "inner").unwrap();
        assert_eq!(t.set_node(inner, "loop", outer), Err(DataError::Cycle));
    }

    #[test]
    fn truncation_reports_each_removed_index() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"items": [{"t": 1}, {"t": 2}, {"t": 3}]}));
        let items = t.child(t.root(), "items").unwrap();
        let third = t.child(items, 2usize).unwrap();
        let (log, _sub) = record_changes(&t);

        t.set_len(items, 1).unwrap();
        rt.run_until_idle();

        assert!(!t.is_attached(third));
        let change = &log.borrow()[0];
        assert!(change.contains(&Path::parse("items.1")));
        assert!(change.contains(&Path::parse("items.2")));
        assert!(change.contains(&Path::parse("items")));
    }

    #[test]
    fn array_rejects_named_keys() {
        let rt = Runtime::new();
        let t = tree(&rt, json!([]));
        assert!(matches!(
            t.set(t.root(), "title", 1),
            Err(DataError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn remove_at_shifts_parent_links() {
        let rt = Runtime::new();
        let t = tree(&rt, json!([{"n": 0}, {"n": 1}, {"n": 2}]));
        let last = t.child(t.root(), 2usize).unwrap();
        let removed = t.remove_at(t.root(), 0).unwrap();
        assert_eq!(removed, Some(Value::from(json!({"n": 0}))));
        assert_eq!(t.path_of(last), Some(Path::parse("1")));
    }

    #[test]
    fn nested_batches_flush_once_on_outer_exit() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"a": 0, "b": 0}));
        let (log, _sub) = record_changes(&t);

        t.batch(|| {
            t.set(t.root(), "a", 1).unwrap();
            t.batch(|| t.set(t.root(), "b", 1).unwrap());
            assert!(log.borrow().is_empty());
        });
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].path_strings(), vec!["a", "b"]);
        rt.run_until_idle();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn ensure_container_creates_objects() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"a": null}));
        t.set_path(&Path::parse("a.b.c"), 1).unwrap();
        assert_eq!(t.snapshot(), Value::from(json!({"a": {"b": {"c": 1}}})));
        assert!(t.set_path(&Path::parse("a.b.c.d"), 1).is_err());
    }

    #[test]
    fn replace_root_changes_kind() {
        let rt = Runtime::new();
        let t = tree(&rt, json!({"a": 1}));
        let old_root = t.root();
        t.replace_root(Value::from(json!([1]))).unwrap();
        assert_ne!(t.root(), old_root);
        assert_eq!(t.snapshot(), Value::from(json!([1])));
    }
}
