/*! Protocol events pushed from the walker to clients. */

use super::{NodeForm, ProxyId};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Events emitted by a walker when cached state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "event", content = "data")]
#[ts(export)]
pub enum Event {
  #[serde(rename = "node:name-change")]
  NameChange { id: ProxyId, name: Option<String> },

  #[serde(rename = "node:child-reorder")]
  ChildReorder { id: ProxyId, child_count: u32 },

  /// The proxy was purged. Always emitted children-first.
  #[serde(rename = "node:destroyed")]
  NodeDestroyed { id: ProxyId },

  /// The root's document was replaced. The root keeps its id.
  #[serde(rename = "document:changed")]
  DocumentChanged { root: ProxyId, document: NodeForm },
}

impl Event {
  /// The proxy this event is about.
  pub const fn target(&self) -> ProxyId {
    match self {
      Self::NameChange { id, .. } | Self::ChildReorder { id, .. } | Self::NodeDestroyed { id } => {
        *id
      }
      Self::DocumentChanged { root, .. } => *root,
    }
  }
}

/// Events delivered on a single proxy's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
  NameChange(Option<String>),
  ChildReorder(u32),
  /// Last message on the channel; the sender is dropped right after.
  Destroyed,
}
