/*!
Tree view state - tree nodes, the two identity maps, selection and hover.

Everything here is synchronous and runs under the view's lock. Every
mutation keeps both maps in step:
- `nodes` (mirror id -> tree node) holds exactly one node per mirror
- `by_row` (row id -> mirror id) holds exactly the rows of live nodes

Sink calls are issued in the order the tree changes.
*/

use std::collections::HashMap;

use super::presentation::{Presentation, Row};
use crate::client::Mirror;
use crate::types::{ProxyId, RowId};

/// Expansion state of one tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Collapsed,
  /// Children requested, response pending.
  Expanding,
  Expanded,
  /// Terminal. The node is being dropped from every map.
  Destroyed,
}

impl Phase {
  const fn is_open(self) -> bool {
    matches!(self, Self::Expanding | Self::Expanded)
  }
}

pub(crate) struct TreeNode {
  pub(crate) mirror: Mirror,
  pub(crate) row: RowId,
  pub(crate) phase: Phase,
  pub(crate) parent: Option<ProxyId>,
  pub(crate) children: Vec<ProxyId>,
  /// Token of the `children()` request whose answer we still accept.
  pending: Option<u64>,
}

fn row_of(node: &TreeNode, selected: Option<ProxyId>, hovered: Option<ProxyId>) -> Row {
  Row {
    role: node.mirror.role.clone(),
    name: node.mirror.name.clone(),
    leaf: node.mirror.is_leaf(),
    expanded: node.phase.is_open(),
    selected: selected == Some(node.mirror.id),
    hovered: hovered == Some(node.mirror.id),
  }
}

pub(crate) struct TreeState<P> {
  pub(crate) sink: P,
  nodes: HashMap<ProxyId, TreeNode>,
  by_row: HashMap<RowId, ProxyId>,
  root: Option<ProxyId>,
  selected: Option<ProxyId>,
  hovered: Option<ProxyId>,
  next_request: u64,
}

impl<P: Presentation> TreeState<P> {
  pub(crate) fn new(sink: P) -> Self {
    Self {
      sink,
      nodes: HashMap::new(),
      by_row: HashMap::new(),
      root: None,
      selected: None,
      hovered: None,
      next_request: 0,
    }
  }

  // ==================== Reads ====================

  pub(crate) fn node(&self, id: ProxyId) -> Option<&TreeNode> {
    self.nodes.get(&id)
  }

  pub(crate) fn node_for_row(&self, row: RowId) -> Option<ProxyId> {
    self.by_row.get(&row).copied()
  }

  pub(crate) fn len(&self) -> usize {
    self.nodes.len()
  }

  pub(crate) fn row_count(&self) -> usize {
    self.by_row.len()
  }

  pub(crate) const fn root(&self) -> Option<ProxyId> {
    self.root
  }

  pub(crate) const fn selected(&self) -> Option<ProxyId> {
    self.selected
  }

  pub(crate) const fn hovered(&self) -> Option<ProxyId> {
    self.hovered
  }

  /// True if `id` is `ancestor` or lies below it.
  pub(crate) fn is_within(&self, id: ProxyId, ancestor: ProxyId) -> bool {
    let mut current = Some(id);
    while let Some(node) = current {
      if node == ancestor {
        return true;
      }
      current = self.nodes.get(&node).and_then(|n| n.parent);
    }
    false
  }

  /// Subtree of `id`, children before parents.
  fn post_order(&self, id: ProxyId) -> Vec<ProxyId> {
    let mut order = Vec::new();
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
      order.push(next);
      if let Some(node) = self.nodes.get(&next) {
        stack.extend(node.children.iter().copied());
      }
    }
    order.reverse();
    order
  }

  fn sibling(&self, id: ProxyId, offset: isize) -> Option<ProxyId> {
    let parent = self.nodes.get(&id)?.parent?;
    let siblings = &self.nodes.get(&parent)?.children;
    let index = siblings.iter().position(|c| *c == id)?;
    siblings.get(index.checked_add_signed(offset)?).copied()
  }

  fn is_expanded_with_children(&self, id: ProxyId) -> bool {
    self
      .nodes
      .get(&id)
      .is_some_and(|n| n.phase == Phase::Expanded && !n.children.is_empty())
  }

  /// Next visible node in document order, or `id` itself at the end.
  pub(crate) fn next_showing(&self, id: ProxyId) -> ProxyId {
    if self.is_expanded_with_children(id) {
      if let Some(first) = self.nodes.get(&id).and_then(|n| n.children.first()) {
        return *first;
      }
    }

    let mut current = Some(id);
    while let Some(node) = current {
      if let Some(next) = self.sibling(node, 1) {
        return next;
      }
      current = self.nodes.get(&node).and_then(|n| n.parent);
    }
    id
  }

  /// Previous visible node in document order, or `id` itself at the top.
  pub(crate) fn previous_showing(&self, id: ProxyId) -> ProxyId {
    let Some(mut previous) = self.sibling(id, -1) else {
      return self.nodes.get(&id).and_then(|n| n.parent).unwrap_or(id);
    };
    while self.is_expanded_with_children(previous) {
      match self.nodes.get(&previous).and_then(|n| n.children.last()) {
        Some(last) => previous = *last,
        None => break,
      }
    }
    previous
  }

  // ==================== Rendering ====================

  fn render(&mut self, id: ProxyId) {
    if let Some(node) = self.nodes.get(&id) {
      let row = row_of(node, self.selected, self.hovered);
      self.sink.update_row(node.row, &row);
    }
  }

  fn create(&mut self, mirror: Mirror, parent: Option<ProxyId>) -> RowId {
    let id = mirror.id;
    let row = self.sink.create_row(&Row {
      role: mirror.role.clone(),
      name: mirror.name.clone(),
      leaf: mirror.is_leaf(),
      ..Row::default()
    });
    self.by_row.insert(row, id);
    self.nodes.insert(
      id,
      TreeNode {
        mirror,
        row,
        phase: Phase::Collapsed,
        parent,
        children: Vec::new(),
        pending: None,
      },
    );
    row
  }

  /// Refresh a node's mirror snapshot and re-render it.
  pub(crate) fn refresh(&mut self, mirror: Mirror) {
    let id = mirror.id;
    if let Some(node) = self.nodes.get_mut(&id) {
      node.mirror = mirror;
      self.render(id);
    }
  }

  // ==================== Root ====================

  /// Throw away the whole tree and start over from `document`.
  pub(crate) fn install_root(&mut self, document: Mirror) {
    let had_selection = self.selected.take().is_some();
    let had_hover = self.hovered.take().is_some();
    self.nodes.clear();
    self.by_row.clear();
    self.sink.clear();
    if had_selection {
      self.sink.selection_cleared();
      self.sink.display_details(None);
    }
    if had_hover {
      self.sink.highlight(None);
    }

    let id = document.id;
    let row = self.create(document, None);
    self.root = Some(id);
    self.sink.set_root(Some(row));
  }

  // ==================== Expansion ====================

  /// Mark a collapsed node as expanding. Returns false for leaves and
  /// unknown nodes.
  pub(crate) fn open(&mut self, id: ProxyId) -> bool {
    let Some(node) = self.nodes.get_mut(&id) else {
      return false;
    };
    if node.mirror.is_leaf() {
      return false;
    }
    if node.phase == Phase::Collapsed {
      node.phase = Phase::Expanding;
      self.render(id);
    }
    true
  }

  /// Start a `children()` request for an open node. The returned token must
  /// be presented with the response.
  pub(crate) fn begin_fetch(&mut self, id: ProxyId) -> Option<u64> {
    let node = self.nodes.get_mut(&id)?;
    if !node.phase.is_open() {
      return None;
    }
    self.next_request += 1;
    node.pending = Some(self.next_request);
    Some(self.next_request)
  }

  /// Whether a `children()` response for `token` may still be applied.
  pub(crate) fn accepts(&self, id: ProxyId, token: u64) -> bool {
    self
      .nodes
      .get(&id)
      .is_some_and(|n| n.phase.is_open() && n.pending == Some(token))
  }

  /// A `children()` request failed. Fall back to collapsed if nothing else
  /// took over the node.
  pub(crate) fn abort_fetch(&mut self, id: ProxyId, token: u64) {
    let Some(node) = self.nodes.get_mut(&id) else {
      return;
    };
    if node.pending != Some(token) {
      return;
    }
    node.pending = None;
    if node.phase == Phase::Expanding {
      node.phase = Phase::Collapsed;
    }
    self.render(id);
  }

  /// Make the children of `parent` exactly `mirrors`, in order.
  ///
  /// Known mirrors keep their tree node, moving it here if it lived under
  /// another parent. Children no longer listed are discarded. Returns the
  /// moved nodes that were expanded; their own children need fetching again.
  pub(crate) fn reconcile(&mut self, parent: ProxyId, mirrors: Vec<Mirror>) -> Vec<ProxyId> {
    let Some(parent_row) = self.nodes.get(&parent).map(|n| n.row) else {
      return Vec::new();
    };

    let mut children: Vec<ProxyId> = Vec::with_capacity(mirrors.len());
    let mut rows: Vec<RowId> = Vec::with_capacity(mirrors.len());
    let mut moved = Vec::new();

    for mirror in mirrors {
      let id = mirror.id;
      if children.contains(&id) {
        continue;
      }
      if self.root == Some(id) || self.is_within(parent, id) {
        log::warn!("[treeview] {id} listed as a child of its own descendant {parent}, skipping");
        continue;
      }

      let row = match self.nodes.get(&id).map(|n| (n.row, n.parent, n.phase)) {
        Some((row, old_parent, phase)) => {
          if old_parent != Some(parent) {
            // Unlink from the old parent before linking here.
            if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
              old.children.retain(|c| *c != id);
            }
            self.sink.detach(row);
            if let Some(old) = old_parent {
              self.render(old);
            }
            if phase == Phase::Expanded {
              moved.push(id);
            }
          }
          if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent);
          }
          self.refresh(mirror);
          row
        }
        None => self.create(mirror, Some(parent)),
      };

      children.push(id);
      rows.push(row);
    }

    let stale: Vec<ProxyId> = self
      .nodes
      .get(&parent)
      .map(|n| {
        n.children
          .iter()
          .copied()
          .filter(|c| !children.contains(c))
          .collect()
      })
      .unwrap_or_default();
    for child in stale {
      self.clear_selection_within(child);
      self.discard(child);
    }

    if let Some(node) = self.nodes.get_mut(&parent) {
      node.children = children;
      node.phase = Phase::Expanded;
      node.pending = None;
    }
    self.sink.set_children(parent_row, &rows);
    self.render(parent);
    moved
  }

  /// Collapse a node, discarding its child tree nodes. A selection inside
  /// the discarded part moves to `id`; returns true when that happened.
  pub(crate) fn collapse(&mut self, id: ProxyId) -> bool {
    let Some(node) = self.nodes.get(&id) else {
      return false;
    };
    if node.phase == Phase::Collapsed || node.mirror.is_leaf() {
      return false;
    }
    let children = node.children.clone();

    let selection_moved = self
      .selected
      .is_some_and(|selected| selected != id && self.is_within(selected, id));
    if selection_moved {
      self.selected = Some(id);
    }

    for child in children {
      self.discard(child);
    }
    if let Some(node) = self.nodes.get_mut(&id) {
      node.phase = Phase::Collapsed;
      node.pending = None;
    }
    self.render(id);
    selection_moved
  }

  // ==================== Destruction ====================

  /// Clear the selection if it lies in the subtree of `id`.
  fn clear_selection_within(&mut self, id: ProxyId) -> bool {
    let Some(selected) = self.selected else {
      return false;
    };
    if !self.is_within(selected, id) {
      return false;
    }
    self.selected = None;
    self.render(selected);
    self.sink.selection_cleared();
    self.sink.display_details(None);
    true
  }

  /// Detach `id` from its parent (or the root container) and drop it and
  /// its subtree from both maps.
  fn discard(&mut self, id: ProxyId) {
    let Some(node) = self.nodes.get(&id) else {
      return;
    };
    let (row, parent) = (node.row, node.parent);

    let doomed = self.post_order(id);
    for n in &doomed {
      if let Some(node) = self.nodes.get_mut(n) {
        node.phase = Phase::Destroyed;
        node.pending = None;
      }
    }

    if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
      p.children.retain(|c| *c != id);
    }
    self.sink.detach(row);
    if self.root == Some(id) {
      self.root = None;
    }

    for n in doomed {
      if let Some(node) = self.nodes.remove(&n) {
        self.by_row.remove(&node.row);
        self.sink.discard(node.row);
      }
      if self.hovered == Some(n) {
        self.hovered = None;
        self.sink.highlight(None);
      }
    }

    if let Some(p) = parent {
      self.render(p);
    }
  }

  /// The mirror behind `id` was destroyed. Selection goes first, then the
  /// node's row, then the subtree.
  pub(crate) fn destroy(&mut self, id: ProxyId) -> bool {
    if !self.nodes.contains_key(&id) {
      return false;
    }
    self.clear_selection_within(id);
    self.discard(id);
    true
  }

  // ==================== Selection ====================

  /// Move the selection. Returns false if `id` has no tree node.
  pub(crate) fn set_selected(&mut self, id: Option<ProxyId>) -> bool {
    if id.is_some_and(|id| !self.nodes.contains_key(&id)) {
      return false;
    }
    let previous = std::mem::replace(&mut self.selected, id);
    if previous == id {
      return true;
    }
    if let Some(previous) = previous {
      self.render(previous);
    }
    match id {
      Some(id) => self.render(id),
      None => {
        self.sink.selection_cleared();
        self.sink.display_details(None);
      }
    }
    true
  }

  /// Move the hover. Returns false if `id` has no tree node.
  pub(crate) fn set_hovered(&mut self, id: Option<ProxyId>) -> bool {
    if id.is_some_and(|id| !self.nodes.contains_key(&id)) {
      return false;
    }
    let previous = std::mem::replace(&mut self.hovered, id);
    if previous == id {
      return true;
    }
    if let Some(previous) = previous {
      self.render(previous);
    }
    if let Some(id) = id {
      self.render(id);
    }
    true
  }
}
