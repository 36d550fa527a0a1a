/*!
Client-side mirrors of node proxies.

A `Mirror` is created the first time a proxy's form crosses the wire and is
kept in step by two deltas only: name and child count. The pool is the
single owner; callers get snapshots.
*/

use std::collections::HashMap;

use crate::types::{Event, ForeignNodeId, NodeForm, ProxyId, ELEMENT_NODE};

/// Cached copy of one proxy's scalar state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
  pub id: ProxyId,
  pub role: String,
  pub name: Option<String>,
  pub child_count: u32,
  pub dom_node_type: u16,
  /// `Some` once the DOM node has been queried.
  dom_node: Option<Option<ForeignNodeId>>,
  inert: bool,
}

impl Mirror {
  pub fn from_form(form: NodeForm) -> Self {
    Self {
      id: form.id,
      role: form.role,
      name: form.name,
      child_count: form.child_count,
      dom_node_type: form.dom_node_type,
      dom_node: None,
      inert: false,
    }
  }

  /// True once the server destroyed the proxy behind this mirror.
  pub const fn is_inert(&self) -> bool {
    self.inert
  }

  pub const fn is_leaf(&self) -> bool {
    self.child_count == 0
  }

  pub const fn is_element(&self) -> bool {
    self.dom_node_type == ELEMENT_NODE
  }

  /// Memoized DOM node, if already resolved.
  pub const fn cached_dom_node(&self) -> Option<Option<ForeignNodeId>> {
    self.dom_node
  }

  fn refresh(&mut self, form: NodeForm) {
    self.role = form.role;
    self.name = form.name;
    self.child_count = form.child_count;
    self.dom_node_type = form.dom_node_type;
  }
}

/// Every live mirror, keyed by proxy id.
#[derive(Debug, Default)]
pub struct MirrorPool {
  mirrors: HashMap<ProxyId, Mirror>,
  root: Option<ProxyId>,
  document: Option<ProxyId>,
}

impl MirrorPool {
  pub fn new() -> Self {
    Self::default()
  }

  /// Mirror for `form`, created on first sight. Later forms refresh the
  /// cached scalars in place.
  pub fn adopt(&mut self, form: NodeForm) -> Mirror {
    let mirror = match self.mirrors.entry(form.id) {
      std::collections::hash_map::Entry::Occupied(entry) => {
        let mirror = entry.into_mut();
        mirror.refresh(form);
        mirror
      }
      std::collections::hash_map::Entry::Vacant(entry) => entry.insert(Mirror::from_form(form)),
    };
    mirror.clone()
  }

  pub fn get(&self, id: ProxyId) -> Option<&Mirror> {
    self.mirrors.get(&id)
  }

  pub fn len(&self) -> usize {
    self.mirrors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.mirrors.is_empty()
  }

  /// Root proxy id, once known.
  pub const fn root(&self) -> Option<ProxyId> {
    self.root
  }

  /// Current document mirror id, once known.
  pub const fn document(&self) -> Option<ProxyId> {
    self.document
  }

  pub(crate) fn set_root(&mut self, root: ProxyId, document: ProxyId) {
    self.root = Some(root);
    self.document = Some(document);
  }

  /// Replace the cached name. Returns false for unknown mirrors.
  pub fn apply_name(&mut self, id: ProxyId, name: Option<String>) -> bool {
    self.mirrors.get_mut(&id).is_some_and(|m| {
      m.name = name;
      true
    })
  }

  /// Replace the cached child count. Returns false for unknown mirrors.
  pub fn apply_child_count(&mut self, id: ProxyId, child_count: u32) -> bool {
    self.mirrors.get_mut(&id).is_some_and(|m| {
      m.child_count = child_count;
      true
    })
  }

  pub(crate) fn memoize_dom_node(&mut self, id: ProxyId, node: Option<ForeignNodeId>) {
    if let Some(mirror) = self.mirrors.get_mut(&id) {
      mirror.dom_node = Some(node);
    }
  }

  /// Remove a mirror, returning it marked inert.
  pub fn destroy(&mut self, id: ProxyId) -> Option<Mirror> {
    let mut mirror = self.mirrors.remove(&id)?;
    mirror.inert = true;
    if self.document == Some(id) {
      self.document = None;
    }
    Some(mirror)
  }

  /// Apply a protocol event. Returns the mirror it touched as it stands
  /// afterwards (inert for a destroy), or `None` for unknown mirrors.
  pub fn apply(&mut self, event: &Event) -> Option<Mirror> {
    match event {
      Event::NameChange { id, name } => {
        self.apply_name(*id, name.clone());
        self.get(*id).cloned()
      }
      Event::ChildReorder { id, child_count } => {
        self.apply_child_count(*id, *child_count);
        self.get(*id).cloned()
      }
      Event::NodeDestroyed { id } => self.destroy(*id),
      Event::DocumentChanged { root, document } => {
        let document = self.adopt(document.clone());
        self.set_root(*root, document.id);
        Some(document)
      }
    }
  }
}
