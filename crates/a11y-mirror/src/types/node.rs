/*! Wire snapshots of node proxies. */

use super::ProxyId;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// `nodeType` value of a DOM element node.
pub const ELEMENT_NODE: u16 = 1;

/// Snapshot of a node proxy's cached scalar attributes.
///
/// Sent whenever a proxy crosses the wire. Clients build their mirrors from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NodeForm {
  pub id: ProxyId,
  pub role: String,
  pub name: Option<String>,
  pub child_count: u32,
  /// `nodeType` of the bound DOM node, 0 when there is none.
  pub dom_node_type: u16,
}

impl NodeForm {
  /// True if the node is bound to a DOM element (and can be inspected there).
  pub const fn is_element(&self) -> bool {
    self.dom_node_type == ELEMENT_NODE
  }
}

/// Snapshot of the root proxy: its own stable id plus the current document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RootForm {
  pub id: ProxyId,
  pub document: NodeForm,
}

/// One accessible object attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Attribute {
  pub key: String,
  pub value: String,
}

impl Attribute {
  pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      value: value.into(),
    }
  }
}

/// Result of resolving a foreign node to its accessible counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Resolution {
  /// The accessible bound to the foreign node.
  pub node: NodeForm,
  /// Ancestors from (excluding) the root down to (excluding) `node`.
  pub path: Vec<NodeForm>,
}
