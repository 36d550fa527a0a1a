/*!
Wire protocol: request/response types and dispatch onto a walker.

Requests travel as `{"id": .., "method": .., "args": ..}`; replies as
`{"id": .., "result": ..}` or `{"id": .., "error": ..}`. A proxy that no
longer exists is answered with a `null` result, never an error.
*/

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use ts_rs::TS;

use crate::native::AccessibilityService;
use crate::types::{
  Attribute, BoundsInfo, ForeignNodeId, MirrorError, MirrorResult, NodeForm, ProxyId, Resolution,
  RootForm,
};
use crate::walker::Walker;

/// Protocol request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
#[ts(export)]
pub enum Request {
  /// Get the root proxy and its current document.
  GetRoot,
  /// Children of a proxy, in order.
  Children { id: ProxyId },
  /// Live state names.
  State { id: ProxyId },
  /// Live attributes.
  Attributes { id: ProxyId },
  /// Bounds plus viewport metrics.
  Bounds { id: ProxyId },
  /// Bound foreign (DOM) node.
  DomNode { id: ProxyId },
  /// Accessible (and ancestor path) for a foreign node.
  AccessibleForForeign { node: ForeignNodeId },
}

impl Request {
  /// Wire method name.
  pub const fn method(&self) -> &'static str {
    match self {
      Self::GetRoot => "get_root",
      Self::Children { .. } => "children",
      Self::State { .. } => "state",
      Self::Attributes { .. } => "attributes",
      Self::Bounds { .. } => "bounds",
      Self::DomNode { .. } => "dom_node",
      Self::AccessibleForForeign { .. } => "accessible_for_foreign",
    }
  }
}

/// Protocol response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[ts(export)]
pub enum Response {
  Root(RootForm),
  Nodes(Vec<NodeForm>),
  States(Vec<String>),
  Attributes(Vec<Attribute>),
  Bounds(BoundsInfo),
  DomNode(Option<ForeignNodeId>),
  Resolution(Option<Resolution>),
  /// Missing resolution: the proxy is gone.
  Null,
}

/// Reply envelope. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<Response>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl Reply {
  /// Unwrap the envelope into a typed result.
  pub fn into_result(self) -> MirrorResult<Response> {
    match (self.result, self.error) {
      (Some(response), _) => Ok(response),
      (None, Some(error)) => Err(MirrorError::Remote(error)),
      (None, None) => Err(MirrorError::Transport(
        "reply carries neither result nor error".to_string(),
      )),
    }
  }
}

/// Dispatch a JSON `method`/`args` pair. Always returns a reply envelope.
pub fn dispatch_json<S: AccessibilityService>(
  walker: &Walker<S>,
  method: &str,
  args: &JsonValue,
) -> JsonValue {
  let request_value = if args.is_null() {
    json!({ "method": method })
  } else {
    json!({ "method": method, "args": args })
  };

  match serde_json::from_value::<Request>(request_value) {
    Ok(request) => match dispatch(walker, request) {
      Ok(response) => json!({ "result": response }),
      Err(e) => {
        log::warn!("[rpc] {method} failed: {e}");
        json!({ "error": e.to_string() })
      }
    },
    Err(e) => {
      log::warn!("[rpc] Invalid request for {method}: {e}");
      json!({ "error": format!("Invalid request: {}", e) })
    }
  }
}

/// Dispatch a typed request.
pub fn dispatch<S: AccessibilityService>(
  walker: &Walker<S>,
  request: Request,
) -> MirrorResult<Response> {
  let result = match request {
    Request::GetRoot => walker.get_root().map(Response::Root),
    Request::Children { id } => walker.children(id).map(Response::Nodes),
    Request::State { id } => walker.state(id).map(Response::States),
    Request::Attributes { id } => walker.attributes(id).map(Response::Attributes),
    Request::Bounds { id } => walker.bounds(id).map(Response::Bounds),
    Request::DomNode { id } => walker.dom_node(id).map(Response::DomNode),
    Request::AccessibleForForeign { node } => walker
      .accessible_for_foreign(node)
      .map(Response::Resolution),
  };

  match result {
    Err(MirrorError::ProxyNotFound(id)) => {
      log::debug!("[rpc] proxy {id} is gone, answering null");
      Ok(Response::Null)
    }
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::native::memory::{MemoryService, NodeSpec};

  fn walker() -> Walker<MemoryService> {
    Walker::new(MemoryService::new(
      NodeSpec::new("document").child(NodeSpec::new("heading").name("Title")),
    ))
  }

  #[test]
  fn requests_use_method_args_shape() {
    let request = Request::Children { id: ProxyId(4) };
    assert_eq!(
      serde_json::to_value(&request).unwrap(),
      json!({ "method": "children", "args": { "id": 4 } })
    );
    assert_eq!(request.method(), "children");
  }

  #[test]
  fn get_root_without_args_dispatches() {
    let reply = dispatch_json(&walker(), "get_root", &JsonValue::Null);
    let reply: Reply = serde_json::from_value(reply).unwrap();
    let Response::Root(root) = reply.into_result().unwrap() else {
      panic!("expected root");
    };
    assert_eq!(root.document.child_count, 1);
  }

  #[test]
  fn dead_proxy_answers_null() {
    let reply = dispatch_json(&walker(), "state", &json!({ "id": 999_999 }));
    assert_eq!(reply, json!({ "result": { "type": "null" } }));
  }

  #[test]
  fn unknown_method_is_an_error_envelope() {
    let reply = dispatch_json(&walker(), "explode", &json!({}));
    let reply: Reply = serde_json::from_value(reply).unwrap();
    assert!(matches!(reply.into_result(), Err(MirrorError::Remote(_))));
  }
}
