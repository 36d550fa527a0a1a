/*! The visual side of a tree view, consumed through a trait. */

use crate::types::{Attribute, Bounds, ProxyId, RowId};

/// Everything a sink needs to render one row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
  pub role: String,
  pub name: Option<String>,
  /// No children to expand.
  pub leaf: bool,
  pub expanded: bool,
  pub selected: bool,
  pub hovered: bool,
}

/// Live details of the selected node, shown in a sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDetails {
  pub id: ProxyId,
  pub role: String,
  pub name: Option<String>,
  pub states: Vec<String>,
  pub attributes: Vec<Attribute>,
}

/// Sink rendering the tree view.
///
/// Row ids are allocated by the sink. Rows form a tree: the document row sits
/// in the root container and every other row is attached under its parent
/// row. Calls arrive in the order the tree changes, so a sink can apply them
/// directly.
pub trait Presentation: Send {
  /// Create a detached row.
  fn create_row(&mut self, row: &Row) -> RowId;

  /// Re-render an existing row.
  fn update_row(&mut self, id: RowId, row: &Row);

  /// Replace the child list of `parent`, in order. A listed row attached
  /// elsewhere has already been detached.
  fn set_children(&mut self, parent: RowId, children: &[RowId]);

  /// Put `row` (or nothing) in the root container.
  fn set_root(&mut self, row: Option<RowId>);

  /// Remove `row` from its parent row or the root container.
  fn detach(&mut self, row: RowId);

  /// Forget a detached row. Its id is never used again.
  fn discard(&mut self, row: RowId);

  /// Drop every row.
  fn clear(&mut self);

  /// The selection went away without a new one being made.
  fn selection_cleared(&mut self);

  /// Show details of the selection, or nothing.
  fn display_details(&mut self, details: Option<&NodeDetails>);

  /// Draw a highlight over a viewport rectangle, or remove it.
  fn highlight(&mut self, rect: Option<Bounds>);
}
