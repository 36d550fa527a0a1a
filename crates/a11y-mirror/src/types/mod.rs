/*! Core types shared by the walker, the protocol and the client.

Regenerate TypeScript types: `cargo test -p a11y-mirror export_bindings`
*/

#![allow(missing_docs)]

mod error;
mod event;
mod geometry;
mod ids;
mod node;

pub use error::{MirrorError, MirrorResult};
pub use event::{Event, NodeEvent};
pub use geometry::{Bounds, BoundsInfo, Point, Viewport};
pub use ids::{ForeignNodeId, ProxyId, RowId};
pub use node::{Attribute, NodeForm, Resolution, RootForm, ELEMENT_NODE};
