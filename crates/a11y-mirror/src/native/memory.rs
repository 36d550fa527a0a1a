/*!
In-memory accessibility service.

A mutable accessible tree living in the same process. Mutations emit the
native notifications a real accessibility subsystem would (hide + reorder on
removal, reorder on insertion, name-change on rename). Used by tests and by
the demo server, which loads a `NodeSpec` fixture from JSON.
*/

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{AccessibilityService, NativeAccessible, NativeEvent, NativeEventKind};
use crate::types::{
  Attribute, Bounds, ForeignNodeId, MirrorError, MirrorResult, Viewport, ELEMENT_NODE,
};

const NATIVE_EVENT_CAPACITY: usize = 1024;

/// Description of a node (and its subtree) to insert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
  pub role: String,
  pub name: Option<String>,
  pub states: Vec<String>,
  pub attributes: Vec<Attribute>,
  pub bounds: Bounds,
  /// Bound DOM node, if any.
  pub foreign: Option<ForeignNodeId>,
  /// `nodeType` of the bound DOM node. Defaults to an element when `foreign` is set.
  pub dom_node_type: Option<u16>,
  pub children: Vec<NodeSpec>,
}

impl NodeSpec {
  pub fn new(role: impl Into<String>) -> Self {
    Self {
      role: role.into(),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  #[must_use]
  pub fn state(mut self, state: impl Into<String>) -> Self {
    self.states.push(state.into());
    self
  }

  #[must_use]
  pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.attributes.push(Attribute::new(key, value));
    self
  }

  #[must_use]
  pub const fn bounds(mut self, bounds: Bounds) -> Self {
    self.bounds = bounds;
    self
  }

  #[must_use]
  pub const fn foreign(mut self, node: ForeignNodeId) -> Self {
    self.foreign = Some(node);
    self
  }

  #[must_use]
  pub fn child(mut self, child: NodeSpec) -> Self {
    self.children.push(child);
    self
  }
}

#[derive(Debug)]
struct MemoryNode {
  role: String,
  name: Option<String>,
  parent: Option<u32>,
  children: Vec<u32>,
  states: Vec<String>,
  attributes: Vec<Attribute>,
  bounds: Bounds,
  foreign: Option<ForeignNodeId>,
  dom_node_type: u16,
  failing: bool,
}

#[derive(Debug)]
struct Store {
  nodes: HashMap<u32, MemoryNode>,
  next_key: u32,
  root: u32,
  document: Option<u32>,
  foreign: HashMap<ForeignNodeId, u32>,
  viewport: Viewport,
}

impl Store {
  /// Allocate a node from `spec` and return it with the spec's children.
  fn alloc(&mut self, parent: Option<u32>, spec: NodeSpec) -> (u32, Vec<NodeSpec>) {
    let key = self.next_key;
    self.next_key += 1;

    let dom_node_type = spec
      .dom_node_type
      .unwrap_or(if spec.foreign.is_some() { ELEMENT_NODE } else { 0 });
    if let Some(foreign) = spec.foreign {
      self.foreign.insert(foreign, key);
    }

    self.nodes.insert(
      key,
      MemoryNode {
        role: spec.role,
        name: spec.name,
        parent,
        children: Vec::new(),
        states: spec.states,
        attributes: spec.attributes,
        bounds: spec.bounds,
        foreign: spec.foreign,
        dom_node_type,
        failing: false,
      },
    );
    (key, spec.children)
  }

  /// Insert `spec` and its whole subtree under `parent`. Iterative.
  fn insert_subtree(&mut self, parent: Option<u32>, spec: NodeSpec) -> u32 {
    let (top, children) = self.alloc(parent, spec);
    if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
      parent.children.push(top);
    }

    let mut stack = vec![(top, children)];
    while let Some((key, children)) = stack.pop() {
      for child in children {
        let (child_key, grandchildren) = self.alloc(Some(key), child);
        if let Some(node) = self.nodes.get_mut(&key) {
          node.children.push(child_key);
        }
        stack.push((child_key, grandchildren));
      }
    }
    top
  }

  /// Unlink `key` from its parent. The subtree below `key` stays intact.
  fn detach(&mut self, key: u32) -> Option<u32> {
    let parent = self.nodes.get_mut(&key)?.parent.take()?;
    if let Some(parent_node) = self.nodes.get_mut(&parent) {
      parent_node.children.retain(|&c| c != key);
    }
    Some(parent)
  }
}

/// Handle to one node of a [`MemoryService`] tree.
#[derive(Clone)]
pub struct MemoryHandle {
  key: u32,
  store: Arc<RwLock<Store>>,
}

impl std::fmt::Debug for MemoryHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("MemoryHandle").field(&self.key).finish()
  }
}

impl PartialEq for MemoryHandle {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key && Arc::ptr_eq(&self.store, &other.store)
  }
}

impl Eq for MemoryHandle {}

impl Hash for MemoryHandle {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.key.hash(state);
  }
}

impl MemoryHandle {
  fn sibling(&self, key: u32) -> Self {
    Self {
      key,
      store: Arc::clone(&self.store),
    }
  }

  /// Read a live attribute, failing if the node is marked as failing.
  fn read<R>(&self, f: impl FnOnce(&MemoryNode) -> R) -> MirrorResult<R> {
    let store = self.store.read();
    let node = store
      .nodes
      .get(&self.key)
      .ok_or_else(|| MirrorError::Native(format!("node {} is defunct", self.key)))?;
    if node.failing {
      return Err(MirrorError::Native(format!(
        "node {} failed to answer",
        self.key
      )));
    }
    Ok(f(node))
  }

  fn navigate(&self, f: impl FnOnce(&Store, &MemoryNode) -> Option<u32>) -> Option<Self> {
    let store = self.store.read();
    let node = store.nodes.get(&self.key)?;
    f(&store, node).map(|key| self.sibling(key))
  }
}

impl NativeAccessible for MemoryHandle {
  fn role(&self) -> MirrorResult<String> {
    self.read(|n| n.role.clone())
  }

  fn name(&self) -> MirrorResult<Option<String>> {
    self.read(|n| n.name.clone())
  }

  fn child_count(&self) -> MirrorResult<u32> {
    self.read(|n| u32::try_from(n.children.len()).unwrap_or(u32::MAX))
  }

  fn first_child(&self) -> Option<Self> {
    self.navigate(|_, n| n.children.first().copied())
  }

  fn next_sibling(&self) -> Option<Self> {
    let key = self.key;
    self.navigate(|store, n| {
      let siblings = &store.nodes.get(&n.parent?)?.children;
      let index = siblings.iter().position(|&c| c == key)?;
      siblings.get(index + 1).copied()
    })
  }

  fn parent(&self) -> Option<Self> {
    self.navigate(|_, n| n.parent)
  }

  fn state(&self) -> MirrorResult<Vec<String>> {
    self.read(|n| n.states.clone())
  }

  fn attributes(&self) -> MirrorResult<Vec<Attribute>> {
    self.read(|n| n.attributes.clone())
  }

  fn bounds(&self) -> MirrorResult<Bounds> {
    self.read(|n| n.bounds)
  }

  fn dom_node_type(&self) -> MirrorResult<u16> {
    self.read(|n| n.dom_node_type)
  }
}

/// In-memory accessibility service. Clone is cheap - clones share the tree.
#[derive(Clone)]
pub struct MemoryService {
  store: Arc<RwLock<Store>>,
  events_tx: Sender<NativeEvent<MemoryHandle>>,
  events_keepalive: InactiveReceiver<NativeEvent<MemoryHandle>>,
}

impl std::fmt::Debug for MemoryService {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryService").finish_non_exhaustive()
  }
}

impl MemoryService {
  /// Create a tree with an application root whose only child is `document`.
  pub fn new(document: NodeSpec) -> Self {
    let mut store = Store {
      nodes: HashMap::new(),
      next_key: 1,
      root: 0,
      document: None,
      foreign: HashMap::new(),
      viewport: Viewport::default(),
    };
    let root = store.insert_subtree(None, NodeSpec::new("app root"));
    store.root = root;
    store.document = Some(store.insert_subtree(Some(root), document));

    let (mut tx, rx) = async_broadcast::broadcast(NATIVE_EVENT_CAPACITY);
    tx.set_overflow(true);

    Self {
      store: Arc::new(RwLock::new(store)),
      events_tx: tx,
      events_keepalive: rx.deactivate(),
    }
  }

  /// Parse a document `NodeSpec` from JSON and build a service around it.
  pub fn from_json(json: &str) -> MirrorResult<Self> {
    let document: NodeSpec = serde_json::from_str(json)?;
    Ok(Self::new(document))
  }

  fn handle(&self, key: u32) -> MemoryHandle {
    MemoryHandle {
      key,
      store: Arc::clone(&self.store),
    }
  }

  /// The application root (parent of the document).
  pub fn root(&self) -> MemoryHandle {
    let key = self.store.read().root;
    self.handle(key)
  }

  /// Children of `parent`, in order.
  pub fn children(&self, parent: &MemoryHandle) -> Vec<MemoryHandle> {
    let store = self.store.read();
    store
      .nodes
      .get(&parent.key)
      .map(|n| n.children.iter().map(|&k| self.handle(k)).collect())
      .unwrap_or_default()
  }

  /// Emit a raw native notification.
  pub fn emit(&self, kind: NativeEventKind, target: &MemoryHandle) {
    if let Err(e) = self
      .events_tx
      .try_broadcast(NativeEvent::new(kind, target.clone()))
    {
      if e.is_full() {
        log::error!("Native event channel overflow - events are being dropped");
      }
    }
  }

  /// Insert `spec` (with its subtree) as the last child of `parent`.
  pub fn append(&self, parent: &MemoryHandle, spec: NodeSpec) -> MemoryHandle {
    let key = self.store.write().insert_subtree(Some(parent.key), spec);
    let child = self.handle(key);
    self.emit(NativeEventKind::Show, &child);
    self.emit(NativeEventKind::Reorder, parent);
    child
  }

  /// Detach `node` from the tree. Emits hide on the node, then reorder on its parent.
  pub fn remove(&self, node: &MemoryHandle) {
    let parent = self.store.write().detach(node.key);
    self.emit(NativeEventKind::Hide, node);
    if let Some(parent) = parent {
      self.emit(NativeEventKind::Reorder, &self.handle(parent));
    }
  }

  /// Move `node` (keeping its identity) to the end of `new_parent`'s
  /// children. Emits reorder on the new parent, then on the old one.
  pub fn move_node(&self, node: &MemoryHandle, new_parent: &MemoryHandle) {
    let old_parent = {
      let mut store = self.store.write();
      let old = store.detach(node.key);
      if let Some(n) = store.nodes.get_mut(&node.key) {
        n.parent = Some(new_parent.key);
      }
      if let Some(p) = store.nodes.get_mut(&new_parent.key) {
        p.children.push(node.key);
      }
      old
    };
    self.emit(NativeEventKind::Reorder, new_parent);
    if let Some(old) = old_parent {
      self.emit(NativeEventKind::Reorder, &self.handle(old));
    }
  }

  pub fn rename(&self, node: &MemoryHandle, name: impl Into<String>) {
    if let Some(n) = self.store.write().nodes.get_mut(&node.key) {
      n.name = Some(name.into());
    }
    self.emit(NativeEventKind::NameChange, node);
  }

  pub fn set_states(&self, node: &MemoryHandle, states: Vec<String>) {
    if let Some(n) = self.store.write().nodes.get_mut(&node.key) {
      n.states = states;
    }
    self.emit(NativeEventKind::StateChange, node);
  }

  /// Make every attribute read on `node` fail (navigation keeps working).
  pub fn set_failing(&self, node: &MemoryHandle, failing: bool) {
    if let Some(n) = self.store.write().nodes.get_mut(&node.key) {
      n.failing = failing;
    }
  }

  pub fn set_viewport(&self, viewport: Viewport) {
    self.store.write().viewport = viewport;
  }

  /// Swap in a new document under the root (navigation). The old document
  /// subtree is detached without a hide notification; only the root reorders.
  pub fn replace_document(&self, document: NodeSpec) -> MemoryHandle {
    let (root, key) = {
      let mut store = self.store.write();
      if let Some(old) = store.document.take() {
        store.detach(old);
      }
      let root = store.root;
      let key = store.insert_subtree(Some(root), document);
      store.document = Some(key);
      (root, key)
    };
    self.emit(NativeEventKind::Reorder, &self.handle(root));
    self.handle(key)
  }
}

impl AccessibilityService for MemoryService {
  type Handle = MemoryHandle;

  fn document(&self) -> Option<MemoryHandle> {
    let key = self.store.read().document?;
    Some(self.handle(key))
  }

  fn accessible_for_foreign(&self, node: ForeignNodeId) -> Option<MemoryHandle> {
    let key = *self.store.read().foreign.get(&node)?;
    Some(self.handle(key))
  }

  fn foreign_for_accessible(&self, handle: &MemoryHandle) -> Option<ForeignNodeId> {
    self.store.read().nodes.get(&handle.key)?.foreign
  }

  fn viewport(&self) -> Viewport {
    self.store.read().viewport
  }

  fn subscribe(&self) -> Receiver<NativeEvent<MemoryHandle>> {
    self.events_keepalive.activate_cloned()
  }
}
