/*! a11y-mirror JSON-RPC over WebSocket. */

mod server;

pub use server::{start_server, CustomRpcHandler, WebSocketState, DEFAULT_WS_PORT};
