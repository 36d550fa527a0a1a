/*!
Client side of the mirroring protocol.

`Client` issues requests through a [`Transport`] and folds every form it
receives into its [`MirrorPool`], so a proxy seen twice maps to one mirror.
Protocol events go through [`Client::handle_event`].

# Example

```ignore
let client = Client::new(LocalTransport::new(walker.clone()));
let document = client.get_root().await?;
for child in client.children(document.id).await? {
    println!("{} {:?}", child.role, child.name);
}
```
*/

mod mirror;

pub use mirror::{Mirror, MirrorPool};

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use crate::native::AccessibilityService;
use crate::protocol::{dispatch_json, Reply, Request, Response};
use crate::types::{
  Attribute, BoundsInfo, Event, ForeignNodeId, MirrorError, MirrorResult, ProxyId,
};
use crate::walker::Walker;

/// Carries requests to a walker and brings back responses.
///
/// Requests may resolve in any order and take any time. Implementations
/// surface transport failures as `MirrorError::Transport`/`Remote`.
pub trait Transport: Send + Sync {
  fn request(&self, request: Request) -> impl Future<Output = MirrorResult<Response>> + Send;
}

/// In-process transport. Round-trips every request through the JSON
/// envelope, exactly as a remote peer would see it.
#[derive(Debug)]
pub struct LocalTransport<S: AccessibilityService> {
  walker: Walker<S>,
}

impl<S: AccessibilityService> Clone for LocalTransport<S> {
  fn clone(&self) -> Self {
    Self {
      walker: self.walker.clone(),
    }
  }
}

impl<S: AccessibilityService> LocalTransport<S> {
  pub const fn new(walker: Walker<S>) -> Self {
    Self { walker }
  }

  pub const fn walker(&self) -> &Walker<S> {
    &self.walker
  }

  fn call(&self, request: &Request) -> MirrorResult<Response> {
    let mut value = serde_json::to_value(request)?;
    let args = value
      .get_mut("args")
      .map(serde_json::Value::take)
      .unwrap_or_default();
    let reply = dispatch_json(&self.walker, request.method(), &args);
    serde_json::from_value::<Reply>(reply)?.into_result()
  }
}

impl<S: AccessibilityService> Transport for LocalTransport<S> {
  fn request(&self, request: Request) -> impl Future<Output = MirrorResult<Response>> + Send {
    std::future::ready(self.call(&request))
  }
}

/// Mirrors the proxies of one walker.
#[derive(Debug)]
pub struct Client<T> {
  transport: T,
  pool: Arc<Mutex<MirrorPool>>,
}

impl<T: Clone> Clone for Client<T> {
  fn clone(&self) -> Self {
    Self {
      transport: self.transport.clone(),
      pool: Arc::clone(&self.pool),
    }
  }
}

fn unexpected(request: &str, got: &Response) -> MirrorError {
  MirrorError::UnexpectedResponse {
    request: request.to_string(),
    got: format!("{got:?}"),
  }
}

/// A foreign node resolved to mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
  pub node: Mirror,
  /// Ancestors from (excluding) the root down to (excluding) `node`.
  pub path: Vec<Mirror>,
}

impl<T: Transport> Client<T> {
  pub fn new(transport: T) -> Self {
    Self {
      transport,
      pool: Arc::new(Mutex::new(MirrorPool::new())),
    }
  }

  pub const fn transport(&self) -> &T {
    &self.transport
  }

  /// Snapshot of a live mirror.
  pub fn mirror(&self, id: ProxyId) -> Option<Mirror> {
    self.pool.lock().get(id).cloned()
  }

  /// Number of live mirrors.
  pub fn mirror_count(&self) -> usize {
    self.pool.lock().len()
  }

  /// Current document mirror id.
  pub fn document(&self) -> Option<ProxyId> {
    self.pool.lock().document()
  }

  /// Root proxy id.
  pub fn root(&self) -> Option<ProxyId> {
    self.pool.lock().root()
  }

  /// Apply a protocol event to the pool. Returns the mirror it touched,
  /// marked inert if the event destroyed it.
  pub fn handle_event(&self, event: &Event) -> Option<Mirror> {
    self.pool.lock().apply(event)
  }

  /// Fetch the root and return the current document's mirror.
  pub async fn get_root(&self) -> MirrorResult<Mirror> {
    match self.transport.request(Request::GetRoot).await? {
      Response::Root(root) => {
        let mut pool = self.pool.lock();
        let document = pool.adopt(root.document);
        pool.set_root(root.id, document.id);
        Ok(document)
      }
      Response::Null => Err(MirrorError::NoDocument),
      other => Err(unexpected("get_root", &other)),
    }
  }

  /// Children of `id`, in order. Empty once the proxy is gone.
  pub async fn children(&self, id: ProxyId) -> MirrorResult<Vec<Mirror>> {
    match self.transport.request(Request::Children { id }).await? {
      Response::Nodes(forms) => {
        let mut pool = self.pool.lock();
        Ok(forms.into_iter().map(|form| pool.adopt(form)).collect())
      }
      Response::Null => Ok(Vec::new()),
      other => Err(unexpected("children", &other)),
    }
  }

  /// Live state names. Empty once the proxy is gone.
  pub async fn state(&self, id: ProxyId) -> MirrorResult<Vec<String>> {
    match self.transport.request(Request::State { id }).await? {
      Response::States(states) => Ok(states),
      Response::Null => Ok(Vec::new()),
      other => Err(unexpected("state", &other)),
    }
  }

  /// Live attributes. Empty once the proxy is gone.
  pub async fn attributes(&self, id: ProxyId) -> MirrorResult<Vec<Attribute>> {
    match self.transport.request(Request::Attributes { id }).await? {
      Response::Attributes(attributes) => Ok(attributes),
      Response::Null => Ok(Vec::new()),
      other => Err(unexpected("attributes", &other)),
    }
  }

  /// Bounds plus viewport metrics, `None` once the proxy is gone.
  pub async fn bounds(&self, id: ProxyId) -> MirrorResult<Option<BoundsInfo>> {
    match self.transport.request(Request::Bounds { id }).await? {
      Response::Bounds(info) => Ok(Some(info)),
      Response::Null => Ok(None),
      other => Err(unexpected("bounds", &other)),
    }
  }

  /// DOM node bound to `id`. Queried once, then served from the mirror.
  pub async fn dom_node(&self, id: ProxyId) -> MirrorResult<Option<ForeignNodeId>> {
    let cached = self.pool.lock().get(id).and_then(Mirror::cached_dom_node);
    if let Some(node) = cached {
      return Ok(node);
    }

    match self.transport.request(Request::DomNode { id }).await? {
      Response::DomNode(node) => {
        self.pool.lock().memoize_dom_node(id, node);
        Ok(node)
      }
      Response::Null => Ok(None),
      other => Err(unexpected("dom_node", &other)),
    }
  }

  /// Resolve a foreign node to a mirror and its ancestor path.
  pub async fn accessible_for_foreign(
    &self,
    node: ForeignNodeId,
  ) -> MirrorResult<Option<ResolvedPath>> {
    match self
      .transport
      .request(Request::AccessibleForForeign { node })
      .await?
    {
      Response::Resolution(Some(resolution)) => {
        let mut pool = self.pool.lock();
        let path = resolution
          .path
          .into_iter()
          .map(|form| pool.adopt(form))
          .collect();
        Ok(Some(ResolvedPath {
          node: pool.adopt(resolution.node),
          path,
        }))
      }
      Response::Resolution(None) | Response::Null => Ok(None),
      other => Err(unexpected("accessible_for_foreign", &other)),
    }
  }
}
