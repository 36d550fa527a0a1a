/*!
Native accessibility abstraction.

These traits define the contract between the walker and an accessibility
data source. The walker never inspects native objects beyond these calls and
relies on nothing but their identity (`Hash + Eq`) for caching.

- `mod.rs` - `NativeAccessible`, `AccessibilityService`, native events
- `memory.rs` - in-memory service (tests, demo server)
*/

pub mod memory;

use std::fmt::Debug;
use std::hash::Hash;

use crate::types::{Attribute, Bounds, ForeignNodeId, MirrorResult, Viewport};

/// Kinds of native change notifications.
///
/// Only name changes, reorders and hides are acted upon by the walker;
/// everything else is filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeEventKind {
  NameChange,
  Reorder,
  Hide,
  Show,
  StateChange,
  Focus,
}

/// A change notification for one native object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent<H> {
  pub kind: NativeEventKind,
  pub target: H,
}

impl<H> NativeEvent<H> {
  pub const fn new(kind: NativeEventKind, target: H) -> Self {
    Self { kind, target }
  }
}

/// One native accessible object. Clone is expected to be cheap (reference-counted).
///
/// Every attribute read may fail independently; navigation returns `None`
/// at the edges of the tree (or if the object is defunct).
pub trait NativeAccessible: Clone + Debug + Send + Sync + Hash + Eq + 'static {
  /// Role string (e.g. `"pushbutton"`).
  fn role(&self) -> MirrorResult<String>;

  /// Accessible name, if any.
  fn name(&self) -> MirrorResult<Option<String>>;

  /// Number of children currently exposed.
  fn child_count(&self) -> MirrorResult<u32>;

  fn first_child(&self) -> Option<Self>;

  fn next_sibling(&self) -> Option<Self>;

  fn parent(&self) -> Option<Self>;

  /// Names of the states currently set.
  fn state(&self) -> MirrorResult<Vec<String>>;

  /// Object attributes in native enumeration order.
  fn attributes(&self) -> MirrorResult<Vec<Attribute>>;

  /// Bounding box in device pixels.
  fn bounds(&self) -> MirrorResult<Bounds>;

  /// `nodeType` of the bound DOM node, 0 if there is none.
  fn dom_node_type(&self) -> MirrorResult<u16>;
}

/// Document-level accessibility service.
pub trait AccessibilityService: Send + Sync + 'static {
  /// The handle type for this service.
  type Handle: NativeAccessible;

  /// Accessible object of the current document, if accessibility is available.
  fn document(&self) -> Option<Self::Handle>;

  /// Accessible counterpart of a foreign (DOM) node.
  fn accessible_for_foreign(&self, node: ForeignNodeId) -> Option<Self::Handle>;

  /// Foreign (DOM) node bound to an accessible.
  fn foreign_for_accessible(&self, handle: &Self::Handle) -> Option<ForeignNodeId>;

  /// Window metrics used to place bounds in the viewport.
  fn viewport(&self) -> Viewport;

  /// Subscribe to native change notifications for the whole tree.
  fn subscribe(&self) -> async_broadcast::Receiver<NativeEvent<Self::Handle>>;
}
