/*! Branded ID types for type-safe references across the protocol boundary. */

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use ts_rs::TS;

/// Identifier of a server-side node proxy. This is the only handle a client
/// ever holds for a native accessible object.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct ProxyId(#[ts(type = "number")] pub u64);

/// Global counter for `ProxyId` generation. Starts at 1 (0 could be confused with "null").
/// 64 bits so ids are never reused within a process.
static PROXY_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ProxyId {
  /// Generate a new unique `ProxyId`.
  pub fn new() -> Self {
    Self(PROXY_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for ProxyId {
  fn default() -> Self {
    Self::new()
  }
}

/// Reference to a node owned by a foreign tree (e.g. a DOM inspector's node).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, From, Into,
)]
#[ts(export)]
pub struct ForeignNodeId(pub u32);

/// Presentation element identifier, allocated by a [`Presentation`](crate::Presentation) sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, Into)]
pub struct RowId(pub u32);
