/*!
TreeView - reconciles mirrors into a lazily populated, navigable tree.

Each tree node pairs one mirror with one presentation row. Children are
fetched on expansion and reconciled against the existing nodes, so a mirror
that moves keeps its node. Protocol events are fed through
[`TreeView::handle_event`].

State lives behind a lock that is never held across a request. A
`children()` answer is applied only if the node is still waiting for that
exact request; answers for nodes destroyed or collapsed meanwhile are
dropped.

# Module Structure

- `mod.rs` - `TreeView`: async operations (setup, expand, collapse, events, selection, foreign-node resolution)
- `state.rs` - `TreeState`: tree nodes, identity maps, synchronous reconciliation
- `presentation.rs` - `Presentation` sink trait and row data

# Example

```ignore
let view = TreeView::new(client, sink);
view.setup().await?;
view.resolve_foreign_node(selected_dom_node).await?;

while let Ok(event) = events.recv().await {
    view.handle_event(&event).await?;
}
```
*/

mod presentation;
mod state;

pub use presentation::{NodeDetails, Presentation, Row};
pub use state::Phase;

use parking_lot::Mutex;

use crate::client::{Client, Transport};
use crate::types::{Event, ForeignNodeId, MirrorError, MirrorResult, ProxyId, RowId};
use state::TreeState;

/// Keyboard navigation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
  /// Select the next visible node.
  Down,
  /// Select the previous visible node.
  Up,
  /// Expand the selection.
  Right,
  /// Collapse the selection.
  Left,
}

/// Incremental tree mirror rendered through a [`Presentation`] sink.
pub struct TreeView<T, P> {
  client: Client<T>,
  state: Mutex<TreeState<P>>,
}

impl<T, P> std::fmt::Debug for TreeView<T, P> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TreeView").finish_non_exhaustive()
  }
}

impl<T: Transport, P: Presentation> TreeView<T, P> {
  pub fn new(client: Client<T>, sink: P) -> Self {
    Self {
      client,
      state: Mutex::new(TreeState::new(sink)),
    }
  }

  pub const fn client(&self) -> &Client<T> {
    &self.client
  }

  /// Run `f` against the sink.
  pub fn with_presentation<R>(&self, f: impl FnOnce(&P) -> R) -> R {
    f(&self.state.lock().sink)
  }

  // ==================== Inspection ====================

  /// Mirror id of the document node.
  pub fn root(&self) -> Option<ProxyId> {
    self.state.lock().root()
  }

  pub fn selected(&self) -> Option<ProxyId> {
    self.state.lock().selected()
  }

  pub fn hovered(&self) -> Option<ProxyId> {
    self.state.lock().hovered()
  }

  pub fn phase(&self, id: ProxyId) -> Option<Phase> {
    self.state.lock().node(id).map(|n| n.phase)
  }

  /// Child node ids of `id`, in order.
  pub fn children_of(&self, id: ProxyId) -> Option<Vec<ProxyId>> {
    self.state.lock().node(id).map(|n| n.children.clone())
  }

  pub fn parent_of(&self, id: ProxyId) -> Option<ProxyId> {
    self.state.lock().node(id).and_then(|n| n.parent)
  }

  pub fn row_of(&self, id: ProxyId) -> Option<RowId> {
    self.state.lock().node(id).map(|n| n.row)
  }

  pub fn node_for_row(&self, row: RowId) -> Option<ProxyId> {
    self.state.lock().node_for_row(row)
  }

  /// Number of tree nodes. Always equal to [`Self::row_count`].
  pub fn node_count(&self) -> usize {
    self.state.lock().len()
  }

  pub fn row_count(&self) -> usize {
    self.state.lock().row_count()
  }

  // ==================== Building ====================

  /// Build the tree from the walker's current document.
  pub async fn setup(&self) -> MirrorResult<ProxyId> {
    let document = self.client.get_root().await?;
    let id = document.id;
    self.state.lock().install_root(document);
    Ok(id)
  }

  /// Expand `id`, then each node of `path` in turn.
  ///
  /// Only the nodes on the path are expanded; their siblings stay as they
  /// are. Stops with a warning if the path leaves the materialized tree.
  pub async fn expand(&self, id: ProxyId, path: &[ProxyId]) -> MirrorResult<()> {
    let mut target = id;
    let mut rest = path;
    loop {
      self.expand_one(target).await?;
      let Some((next, tail)) = rest.split_first() else {
        return Ok(());
      };
      if self.phase(*next).is_none() {
        log::warn!("[treeview] expansion path lost at {next}");
        return Ok(());
      }
      target = *next;
      rest = tail;
    }
  }

  async fn expand_one(&self, id: ProxyId) -> MirrorResult<()> {
    let needs_fetch = {
      let mut state = self.state.lock();
      if state.node(id).is_none() {
        return Err(MirrorError::NodeNotLive(id.to_string()));
      }
      state.open(id) && state.node(id).is_some_and(|n| n.phase == Phase::Expanding)
    };
    if needs_fetch {
      self.materialize(id).await?;
    }
    Ok(())
  }

  /// Fetch and reconcile the children of an open node, then of every
  /// expanded node that moved under it.
  async fn materialize(&self, id: ProxyId) -> MirrorResult<()> {
    let mut queue = vec![id];
    while let Some(next) = queue.pop() {
      let Some(token) = self.state.lock().begin_fetch(next) else {
        continue;
      };

      let children = match self.client.children(next).await {
        Ok(children) => children,
        Err(e) => {
          self.state.lock().abort_fetch(next, token);
          return Err(e);
        }
      };

      let mut state = self.state.lock();
      if !state.accepts(next, token) {
        log::debug!("[treeview] dropping late children() answer for {next}");
        continue;
      }
      queue.extend(state.reconcile(next, children));
    }
    Ok(())
  }

  /// Collapse `id`, discarding its child nodes. No-op for leaves and
  /// collapsed nodes. A selection inside the collapsed part moves to `id`.
  pub async fn collapse(&self, id: ProxyId) -> MirrorResult<()> {
    let selection_moved = self.state.lock().collapse(id);
    if selection_moved {
      self.show_details(id).await?;
    }
    Ok(())
  }

  // ==================== Events ====================

  /// Apply a protocol event to the client's mirrors and then to the tree.
  pub async fn handle_event(&self, event: &Event) -> MirrorResult<()> {
    let mirror = self.client.handle_event(event);

    match event {
      Event::NameChange { .. } => {
        if let Some(mirror) = mirror {
          self.state.lock().refresh(mirror);
        }
      }
      Event::ChildReorder { id, .. } => {
        let open = {
          let mut state = self.state.lock();
          if let Some(mirror) = mirror {
            state.refresh(mirror);
          }
          state
            .node(*id)
            .is_some_and(|n| matches!(n.phase, Phase::Expanding | Phase::Expanded))
        };
        if open {
          self.materialize(*id).await?;
        }
      }
      Event::NodeDestroyed { id } => {
        self.state.lock().destroy(*id);
      }
      Event::DocumentChanged { document, .. } => {
        let Some(mirror) = mirror else {
          log::warn!("[treeview] new document {} has no mirror", document.id);
          return Ok(());
        };
        log::debug!("[treeview] document changed, rebuilding from {}", mirror.id);
        self.state.lock().install_root(mirror);
      }
    }
    Ok(())
  }

  // ==================== Foreign nodes ====================

  /// Reveal and select the accessible bound to a foreign node.
  ///
  /// The returned path must start at the current document; anything else
  /// means the document changed under us and the answer is ignored.
  pub async fn resolve_foreign_node(&self, node: ForeignNodeId) -> MirrorResult<Option<ProxyId>> {
    let Some(resolved) = self.client.accessible_for_foreign(node).await? else {
      log::debug!("[treeview] no accessible for foreign node {node}");
      return Ok(None);
    };

    let document = self.root();
    match resolved.path.split_first() {
      Some((first, rest)) if Some(first.id) == document => {
        let rest: Vec<ProxyId> = rest.iter().map(|m| m.id).collect();
        self.expand(first.id, &rest).await?;
      }
      None if Some(resolved.node.id) == document => {}
      _ => {
        log::warn!("[treeview] resolution for {node} does not start at the document, ignoring");
        return Ok(None);
      }
    }

    let id = resolved.node.id;
    if self.phase(id).is_none() {
      log::warn!("[treeview] resolved node {id} is not in the tree");
      return Ok(None);
    }
    self.select(Some(id)).await?;
    Ok(Some(id))
  }

  // ==================== Selection & hover ====================

  /// Select a node (or nothing), highlight it unless it is hovered, and
  /// show its live details.
  pub async fn select(&self, id: Option<ProxyId>) -> MirrorResult<()> {
    let hovered = {
      let mut state = self.state.lock();
      if !state.set_selected(id) {
        log::debug!("[treeview] cannot select unknown node {id:?}");
        return Ok(());
      }
      state.hovered()
    };
    if id != hovered {
      self.highlight(id).await?;
    }
    match id {
      Some(id) => self.show_details(id).await,
      None => Ok(()),
    }
  }

  /// Push the details of `id` to the sink if it is still selected.
  /// Unreadable states or attributes show as empty.
  async fn show_details(&self, id: ProxyId) -> MirrorResult<()> {
    let states = self.client.state(id).await.unwrap_or_else(|e| {
      log::warn!("[treeview] states of {id} unavailable: {e}");
      Vec::new()
    });
    let attributes = self.client.attributes(id).await.unwrap_or_else(|e| {
      log::warn!("[treeview] attributes of {id} unavailable: {e}");
      Vec::new()
    });

    let mut state = self.state.lock();
    if state.selected() != Some(id) {
      return Ok(());
    }
    let Some(node) = state.node(id) else {
      return Ok(());
    };
    let details = NodeDetails {
      id,
      role: node.mirror.role.clone(),
      name: node.mirror.name.clone(),
      states,
      attributes,
    };
    state.sink.display_details(Some(&details));
    Ok(())
  }

  /// Hover a node (or nothing) and highlight its bounds.
  pub async fn hover(&self, id: Option<ProxyId>) -> MirrorResult<()> {
    if !self.state.lock().set_hovered(id) {
      return Ok(());
    }
    self.highlight(id).await
  }

  /// Highlight the bounds of `id` in viewport coordinates, or clear it.
  pub async fn highlight(&self, id: Option<ProxyId>) -> MirrorResult<()> {
    let rect = match id {
      Some(id) => self
        .client
        .bounds(id)
        .await?
        .map(|info| info.viewport_rect()),
      None => None,
    };
    self.state.lock().sink.highlight(rect);
    Ok(())
  }

  // ==================== Keyboard ====================

  /// Node shown after `id`.
  pub fn next_showing(&self, id: ProxyId) -> ProxyId {
    self.state.lock().next_showing(id)
  }

  /// Node shown before `id`.
  pub fn previous_showing(&self, id: ProxyId) -> ProxyId {
    self.state.lock().previous_showing(id)
  }

  /// Apply a navigation key to the selection. With nothing selected,
  /// Up/Down select the document.
  pub async fn navigate(&self, key: Key) -> MirrorResult<()> {
    let (selected, root) = {
      let state = self.state.lock();
      (state.selected(), state.root())
    };

    match (key, selected) {
      (Key::Down, Some(id)) => self.select(Some(self.next_showing(id))).await,
      (Key::Up, Some(id)) => self.select(Some(self.previous_showing(id))).await,
      (Key::Down | Key::Up, None) => self.select(root).await,
      (Key::Right, Some(id)) => self.expand(id, &[]).await,
      (Key::Left, Some(id)) => self.collapse(id).await,
      (Key::Right | Key::Left, None) => Ok(()),
    }
  }
}
