/*!
Walker - the server side of the mirroring protocol.

Owns the identity cache of node proxies for one document, turns the single
native notification stream into typed protocol events, and answers queries.

# Module Structure

- `mod.rs` - `Walker`, builder, identity (`reference`), root tracking, event classification, purge
- `queries.rs` - per-proxy read-throughs (children, state, attributes, bounds, DOM node) and foreign-node resolution
- `registry.rs` - `ProxyRegistry` (cache) with private fields + operations + event emission

# Example

```ignore
let walker = Walker::new(service);
let root = walker.get_root()?;
let children = walker.children(root.document.id)?;

let mut events = walker.subscribe();
while let Ok(event) = events.recv().await {
    // forward to clients
}
```
*/

mod queries;
mod registry;

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::native::{AccessibilityService, NativeAccessible, NativeEvent, NativeEventKind};
use crate::types::{Event, MirrorError, MirrorResult, NodeEvent, NodeForm, ProxyId, RootForm};
use registry::{ProxyRegistry, RootEntry};

const DEFAULT_EVENT_CAPACITY: usize = 5000;
const DEFAULT_NODE_CHANNEL_CAPACITY: usize = 64;

/// Role reported when the native role cannot be read.
const UNKNOWN_ROLE: &str = "unknown";

type HandleOf<S> = <S as AccessibilityService>::Handle;

/// Builder for configuring a walker.
///
/// # Example
///
/// ```ignore
/// let walker = Walker::builder()
///     .event_capacity(10_000)
///     .node_channel_capacity(16)
///     .build(service);
/// ```
#[derive(Debug, Clone, Copy)]
#[must_use = "Builder does nothing until .build() is called"]
pub struct WalkerBuilder {
  event_capacity: usize,
  node_channel_capacity: usize,
}

impl Default for WalkerBuilder {
  fn default() -> Self {
    Self {
      event_capacity: DEFAULT_EVENT_CAPACITY,
      node_channel_capacity: DEFAULT_NODE_CHANNEL_CAPACITY,
    }
  }
}

impl WalkerBuilder {
  /// Capacity of the walker-wide event channel. Default: 5000.
  ///
  /// When full, the oldest events are dropped.
  pub const fn event_capacity(mut self, capacity: usize) -> Self {
    self.event_capacity = capacity;
    self
  }

  /// Capacity of each per-proxy channel. Default: 64.
  pub const fn node_channel_capacity(mut self, capacity: usize) -> Self {
    self.node_channel_capacity = capacity;
    self
  }

  /// Build a walker over `service`.
  pub fn build<S: AccessibilityService>(self, service: S) -> Walker<S> {
    Walker::create(Arc::new(service), self)
  }

  /// Build a walker over a service shared with other walkers.
  pub fn build_shared<S: AccessibilityService>(self, service: Arc<S>) -> Walker<S> {
    Walker::create(service, self)
  }
}

/// Server-side proxy registry over one accessibility service.
///
/// Clone is cheap (Arc bumps) - clones share the same cache.
pub struct Walker<S: AccessibilityService> {
  service: Arc<S>,
  state: Arc<RwLock<ProxyRegistry<HandleOf<S>>>>,
  events_tx: Sender<Event>,
  events_keepalive: InactiveReceiver<Event>,
}

impl<S: AccessibilityService> Clone for Walker<S> {
  fn clone(&self) -> Self {
    Self {
      service: Arc::clone(&self.service),
      state: Arc::clone(&self.state),
      events_tx: self.events_tx.clone(),
      events_keepalive: self.events_keepalive.clone(),
    }
  }
}

impl<S: AccessibilityService> std::fmt::Debug for Walker<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Walker")
      .field("proxies", &self.state.read().len())
      .finish_non_exhaustive()
  }
}

impl<S: AccessibilityService> Walker<S> {
  /// Create a walker with default options.
  pub fn new(service: S) -> Self {
    Self::builder().build(service)
  }

  /// Builder for a walker with non-default channel capacities.
  pub fn builder() -> WalkerBuilder {
    WalkerBuilder::default()
  }

  fn create(service: Arc<S>, config: WalkerBuilder) -> Self {
    let (mut tx, rx) = async_broadcast::broadcast(config.event_capacity);
    tx.set_overflow(true); // Drop oldest messages when full

    let state = ProxyRegistry::new(tx.clone(), config.node_channel_capacity);

    Self {
      service,
      state: Arc::new(RwLock::new(state)),
      events_tx: tx,
      events_keepalive: rx.deactivate(),
    }
  }

  /// The native service this walker reads.
  pub fn service(&self) -> &S {
    &self.service
  }

  /// Subscribe to every protocol event of this walker.
  pub fn subscribe(&self) -> Receiver<Event> {
    self.events_keepalive.activate_cloned()
  }

  /// Subscribe to one proxy's events. The channel closes when the proxy is destroyed.
  pub fn subscribe_node(&self, id: ProxyId) -> MirrorResult<Receiver<NodeEvent>> {
    self
      .write(|r| r.subscribe_node(id))
      .ok_or(MirrorError::ProxyNotFound(id))
  }

  /// Number of live proxies.
  pub fn proxy_count(&self) -> usize {
    self.read(ProxyRegistry::len)
  }

  /// Read state. Never call native functions inside the closure.
  #[inline]
  fn read<R>(&self, f: impl FnOnce(&ProxyRegistry<HandleOf<S>>) -> R) -> R {
    f(&self.state.read())
  }

  /// Write state. Never call native functions inside the closure.
  #[inline]
  fn write<R>(&self, f: impl FnOnce(&mut ProxyRegistry<HandleOf<S>>) -> R) -> R {
    f(&mut self.state.write())
  }

  /// Cached handle for a proxy.
  fn handle(&self, id: ProxyId) -> MirrorResult<HandleOf<S>> {
    self
      .read(|r| r.proxy(id).map(|p| p.handle.clone()))
      .ok_or(MirrorError::ProxyNotFound(id))
  }

  /// Proxy for a native object, creating and registering it on first use.
  ///
  /// Repeated calls with the same live object return the same proxy.
  pub fn reference(&self, handle: &HandleOf<S>) -> NodeForm {
    if let Some(form) = self.read(|r| r.find(handle).and_then(|id| r.form(id))) {
      return form;
    }

    // Native reads happen outside the lock.
    let form = read_form(handle, ProxyId::new());
    self.write(|r| r.insert(handle.clone(), form))
  }

  /// The root proxy and its current document, resolved lazily and cached
  /// until a document-changed transition.
  pub fn get_root(&self) -> MirrorResult<RootForm> {
    let cached = self.read(|r| {
      let root = r.root()?;
      r.form(root.document).map(|document| RootForm {
        id: root.id,
        document,
      })
    });
    if let Some(root) = cached {
      return Ok(root);
    }

    let doc_handle = self.service.document().ok_or(MirrorError::NoDocument)?;
    let root_handle = doc_handle.parent().ok_or(MirrorError::NoDocument)?;
    let document = self.reference(&doc_handle);
    let root = self.reference(&root_handle);

    self.write(|r| {
      let entry = r.set_root(RootEntry {
        id: root.id,
        document: document.id,
      });
      // The cached document was purged from under the root: adopt the live one.
      if r.form(entry.document).is_none() {
        r.set_document(document.id);
      }
      let entry = r.root()?;
      r.form(entry.document).map(|document| RootForm {
        id: entry.id,
        document,
      })
    })
    .ok_or(MirrorError::NoDocument)
  }

  /// Classify one native notification and apply it to the cache.
  pub fn handle_native_event(&self, event: NativeEvent<HandleOf<S>>) {
    let NativeEvent { kind, target } = event;
    let cached = self.read(|r| r.find(&target));

    match kind {
      NativeEventKind::NameChange => {
        let Some(id) = cached else { return };
        match target.name() {
          Ok(name) => self.write(|r| r.set_name(id, name)),
          Err(e) => log::warn!("name of {id} unavailable, name change dropped: {e}"),
        }
      }

      NativeEventKind::Reorder => {
        let Some(id) = cached else { return };
        if self.read(|r| r.is_root(id)) {
          self.refresh_document();
          return;
        }
        match target.child_count() {
          Ok(count) => self.write(|r| r.set_child_count(id, count)),
          Err(e) => log::warn!("child count of {id} unavailable, reorder dropped: {e}"),
        }
      }

      NativeEventKind::Hide => self.purge(&target),

      NativeEventKind::Show | NativeEventKind::StateChange | NativeEventKind::Focus => {}
    }
  }

  /// Apply every native event already queued on `events`. Returns how many were handled.
  pub fn drain_native_events(&self, events: &mut Receiver<NativeEvent<HandleOf<S>>>) -> usize {
    let mut handled = 0;
    loop {
      match events.try_recv() {
        Ok(event) => {
          self.handle_native_event(event);
          handled += 1;
        }
        Err(async_broadcast::TryRecvError::Overflowed(n)) => {
          log::warn!("Native event stream overflowed, {n} events lost");
        }
        Err(_) => return handled,
      }
    }
  }

  /// Feed the service's notification stream into this walker until it closes.
  pub async fn run_native_events(&self) {
    let mut events = self.service.subscribe();
    loop {
      match events.recv().await {
        Ok(event) => self.handle_native_event(event),
        Err(async_broadcast::RecvError::Overflowed(n)) => {
          log::warn!("Native event stream overflowed, {n} events lost");
        }
        Err(async_broadcast::RecvError::Closed) => break,
      }
    }
  }

  /// Re-resolve the document after the root reordered.
  fn refresh_document(&self) {
    let Some(doc_handle) = self.service.document() else {
      log::debug!("root reordered but the service has no document");
      return;
    };
    let document = self.reference(&doc_handle);
    if self.write(|r| r.set_document(document.id)) {
      log::debug!("document changed to {}", document.id);
    }
  }

  /// Destroy the proxies of `target` and every native descendant,
  /// children before parents. The root proxy is never purged.
  fn purge(&self, target: &HandleOf<S>) {
    let order = post_order(target);
    self.write(|r| {
      for handle in &order {
        let Some(id) = r.find(handle) else { continue };
        if r.is_root(id) {
          log::debug!("hide on the root proxy ignored; roots are replaced, not purged");
          continue;
        }
        r.remove(id);
      }
    });
  }

  /// Tear down the walker's cache. Every proxy dies; per-proxy channels close.
  pub fn teardown(&self) {
    let count = self.write(|r| {
      let count = r.len();
      r.clear();
      count
    });
    log::debug!("walker torn down, dropped {count} proxies");
  }
}

/// Build a proxy snapshot. Each attribute fails independently and falls back
/// to its default.
fn read_form<H: NativeAccessible>(handle: &H, id: ProxyId) -> NodeForm {
  let role = handle.role().unwrap_or_else(|e| {
    log::warn!("role of {handle:?} unavailable: {e}");
    UNKNOWN_ROLE.to_string()
  });
  let name = handle.name().unwrap_or_else(|e| {
    log::warn!("name of {handle:?} unavailable: {e}");
    None
  });
  let child_count = handle.child_count().unwrap_or_else(|e| {
    log::warn!("child count of {handle:?} unavailable: {e}");
    0
  });
  let dom_node_type = handle.dom_node_type().unwrap_or(0);

  NodeForm {
    id,
    role,
    name,
    child_count,
    dom_node_type,
  }
}

/// Native children of `handle`, in sibling order.
pub(crate) fn native_children<H: NativeAccessible>(handle: &H) -> Vec<H> {
  let mut children = Vec::new();
  let mut next = handle.first_child();
  while let Some(child) = next {
    next = child.next_sibling();
    children.push(child);
  }
  children
}

/// Subtree of `root` in post-order (children before parents, siblings in order).
/// Iterative to avoid stack overflow on deep trees.
fn post_order<H: NativeAccessible>(root: &H) -> Vec<H> {
  let mut order = Vec::new();
  let mut stack = vec![(root.clone(), false)];

  while let Some((handle, visited)) = stack.pop() {
    if visited {
      order.push(handle);
      continue;
    }
    let children = native_children(&handle);
    stack.push((handle, true));
    stack.extend(children.into_iter().rev().map(|c| (c, false)));
  }

  order
}
