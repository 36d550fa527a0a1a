/*!
Per-proxy queries.

Children go through `reference` so every child keeps its identity. State,
attributes and bounds are live read-throughs: never cached, each failing on
its own. Unknown proxy ids fail with `ProxyNotFound`, which the protocol
turns into a null response.
*/

use super::{native_children, HandleOf, Walker};
use crate::native::{AccessibilityService, NativeAccessible};
use crate::types::{
  Attribute, Bounds, BoundsInfo, ForeignNodeId, MirrorResult, NodeForm, ProxyId, Resolution,
};

impl<S: AccessibilityService> Walker<S> {
  /// Proxies for the native children of `id`, in sibling order.
  pub fn children(&self, id: ProxyId) -> MirrorResult<Vec<NodeForm>> {
    let handle = self.handle(id)?;
    Ok(
      native_children(&handle)
        .iter()
        .map(|child| self.reference(child))
        .collect(),
    )
  }

  /// Live state names of `id`.
  pub fn state(&self, id: ProxyId) -> MirrorResult<Vec<String>> {
    self.handle(id)?.state()
  }

  /// Live attributes of `id`, in native order.
  pub fn attributes(&self, id: ProxyId) -> MirrorResult<Vec<Attribute>> {
    self.handle(id)?.attributes()
  }

  /// Bounds of `id` plus viewport metrics. Falls back to the zero rectangle
  /// when the native bounds cannot be computed.
  pub fn bounds(&self, id: ProxyId) -> MirrorResult<BoundsInfo> {
    let handle = self.handle(id)?;
    let bounds = handle.bounds().unwrap_or_else(|e| {
      log::debug!("bounds of {id} unavailable, using zero rect: {e}");
      Bounds::ZERO
    });
    Ok(BoundsInfo::new(bounds, self.service.viewport()))
  }

  /// Foreign (DOM) node bound to `id`, if any.
  pub fn dom_node(&self, id: ProxyId) -> MirrorResult<Option<ForeignNodeId>> {
    let handle = self.handle(id)?;
    Ok(self.service.foreign_for_accessible(&handle))
  }

  /// Resolve a foreign node to its accessible and the chain of ancestors
  /// from (excluding) the root down to (excluding) the accessible.
  ///
  /// `None` when the foreign node has no accessible counterpart.
  pub fn accessible_for_foreign(&self, node: ForeignNodeId) -> MirrorResult<Option<Resolution>> {
    let Some(handle) = self.service.accessible_for_foreign(node) else {
      log::debug!("no accessible for foreign node {node}");
      return Ok(None);
    };

    let root = self.get_root()?;
    let root_handle = self.handle(root.id)?;

    let mut ancestors: Vec<HandleOf<S>> = Vec::new();
    let mut next = handle.parent();
    while let Some(parent) = next {
      if parent == root_handle {
        break;
      }
      next = parent.parent();
      ancestors.push(parent);
    }

    let path = ancestors
      .iter()
      .rev()
      .map(|ancestor| self.reference(ancestor))
      .collect();

    Ok(Some(Resolution {
      node: self.reference(&handle),
      path,
    }))
  }
}
