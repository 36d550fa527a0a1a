/*!
Proxy registry - the identity cache behind a walker.

All fields are private. Mutations go through methods that keep both maps in
step and emit events. This guarantees:
- At most one proxy per native handle
- A removed proxy is gone from every map before anyone hears about it
- Per-proxy channels are closed when the proxy dies

Keyed by native handle (`Hash + Eq`); proxies themselves live in an arena
indexed by `ProxyId`.
*/

use async_broadcast::{Receiver, Sender};
use std::collections::HashMap;
use std::hash::Hash;

use crate::types::{Event, NodeEvent, NodeForm, ProxyId};

/// One cached native object.
pub(crate) struct NodeProxy<H> {
  pub(crate) form: NodeForm,
  pub(crate) handle: H,
  /// Per-proxy event channel, created on first subscription.
  channel: Option<Sender<NodeEvent>>,
}

impl<H> NodeProxy<H> {
  fn send(&self, event: NodeEvent) {
    if let Some(tx) = &self.channel {
      // Closed (no receivers left) is fine.
      drop(tx.try_broadcast(event));
    }
  }
}

/// The root proxy's extra state: which proxy is the current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RootEntry {
  pub(crate) id: ProxyId,
  pub(crate) document: ProxyId,
}

pub(crate) struct ProxyRegistry<H> {
  events_tx: Sender<Event>,
  node_channel_capacity: usize,

  proxies: HashMap<ProxyId, NodeProxy<H>>,
  handle_to_id: HashMap<H, ProxyId>,
  root: Option<RootEntry>,
}

impl<H: Hash + Eq + Clone> ProxyRegistry<H> {
  pub(crate) fn new(events_tx: Sender<Event>, node_channel_capacity: usize) -> Self {
    Self {
      events_tx,
      node_channel_capacity,
      proxies: HashMap::new(),
      handle_to_id: HashMap::new(),
      root: None,
    }
  }

  fn emit(&self, event: Event) {
    if let Err(e) = self.events_tx.try_broadcast(event) {
      if e.is_full() {
        log::error!(
          "Event channel overflow - events are being dropped. \
           Consider increasing the walker's event capacity or processing events faster."
        );
      }
    }
  }

  /// Find the proxy for a native handle.
  pub(crate) fn find(&self, handle: &H) -> Option<ProxyId> {
    self.handle_to_id.get(handle).copied()
  }

  pub(crate) fn proxy(&self, id: ProxyId) -> Option<&NodeProxy<H>> {
    self.proxies.get(&id)
  }

  pub(crate) fn form(&self, id: ProxyId) -> Option<NodeForm> {
    self.proxies.get(&id).map(|p| p.form.clone())
  }

  pub(crate) fn len(&self) -> usize {
    self.proxies.len()
  }

  /// Register a freshly built proxy. If another proxy won the race for the
  /// same handle, that one is kept and returned instead.
  pub(crate) fn insert(&mut self, handle: H, form: NodeForm) -> NodeForm {
    if let Some(existing) = self.find(&handle).and_then(|id| self.form(id)) {
      return existing;
    }

    self.handle_to_id.insert(handle.clone(), form.id);
    self.proxies.insert(
      form.id,
      NodeProxy {
        form: form.clone(),
        handle,
        channel: None,
      },
    );
    form
  }

  /// Update the cached name. Emits `name-change`.
  pub(crate) fn set_name(&mut self, id: ProxyId, name: Option<String>) {
    let Some(proxy) = self.proxies.get_mut(&id) else {
      return;
    };
    proxy.form.name.clone_from(&name);
    proxy.send(NodeEvent::NameChange(name.clone()));
    self.emit(Event::NameChange { id, name });
  }

  /// Update the cached child count. Emits `child-reorder`.
  pub(crate) fn set_child_count(&mut self, id: ProxyId, child_count: u32) {
    let Some(proxy) = self.proxies.get_mut(&id) else {
      return;
    };
    proxy.form.child_count = child_count;
    proxy.send(NodeEvent::ChildReorder(child_count));
    self.emit(Event::ChildReorder { id, child_count });
  }

  /// Remove a proxy from every map, then notify. Returns false if unknown.
  pub(crate) fn remove(&mut self, id: ProxyId) -> bool {
    let Some(proxy) = self.proxies.remove(&id) else {
      return false;
    };
    if self.handle_to_id.get(&proxy.handle) == Some(&id) {
      self.handle_to_id.remove(&proxy.handle);
    }

    proxy.send(NodeEvent::Destroyed);
    self.emit(Event::NodeDestroyed { id });
    true
  }

  pub(crate) const fn root(&self) -> Option<RootEntry> {
    self.root
  }

  pub(crate) fn is_root(&self, id: ProxyId) -> bool {
    self.root.is_some_and(|r| r.id == id)
  }

  /// Install the root proxy. Keeps an already installed root.
  pub(crate) fn set_root(&mut self, entry: RootEntry) -> RootEntry {
    *self.root.get_or_insert(entry)
  }

  /// Swap the root's document reference. Emits `document-changed` only if
  /// the document actually differs.
  pub(crate) fn set_document(&mut self, document: ProxyId) -> bool {
    let Some(root) = self.root.as_mut() else {
      return false;
    };
    if root.document == document {
      return false;
    }
    root.document = document;
    let root_id = root.id;

    let Some(form) = self.form(document) else {
      return false;
    };
    self.emit(Event::DocumentChanged {
      root: root_id,
      document: form,
    });
    true
  }

  /// Open a channel carrying only this proxy's events.
  pub(crate) fn subscribe_node(&mut self, id: ProxyId) -> Option<Receiver<NodeEvent>> {
    let capacity = self.node_channel_capacity;
    let proxy = self.proxies.get_mut(&id)?;
    if let Some(tx) = &proxy.channel {
      return Some(tx.new_receiver());
    }
    let (mut tx, rx) = async_broadcast::broadcast(capacity);
    tx.set_overflow(true);
    proxy.channel = Some(tx);
    Some(rx)
  }

  /// Drop every proxy and the root. Per-proxy channels close without a
  /// `Destroyed` message; the whole walker is going away.
  pub(crate) fn clear(&mut self) {
    self.proxies.clear();
    self.handle_to_id.clear();
    self.root = None;
  }
}
