/*! Error types for mirror operations. */

use super::ProxyId;

/// Errors that can occur while proxying or mirroring the accessible tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
  #[error("Proxy not found: {0}")]
  ProxyNotFound(ProxyId),

  #[error("Document has no accessible object")]
  NoDocument,

  #[error("Native accessibility call failed: {0}")]
  Native(String),

  #[error("Tree node is not live: {0}")]
  NodeNotLive(String),

  #[error("Unexpected response for {request}: {got}")]
  UnexpectedResponse { request: String, got: String },

  #[error("Remote error: {0}")]
  Remote(String),

  #[error("Transport error: {0}")]
  Transport(String),
}

impl From<serde_json::Error> for MirrorError {
  fn from(e: serde_json::Error) -> Self {
    Self::Transport(e.to_string())
  }
}

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
