/*!
WebSocket server implementation.

Every connection gets its own walker over the shared accessibility
service, so proxy ids are scoped to one client. The walker's protocol events
are pushed to the socket as they happen; requests are answered in order.
When the socket closes the walker is torn down.
*/

use a11y_mirror::native::AccessibilityService;
use a11y_mirror::{dispatch_json, Walker, WalkerBuilder};
use async_broadcast::RecvError;
use axum::{
  extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    State,
  },
  response::Response,
  routing::get,
  Router,
};
use log::error;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Default WebSocket server port.
pub const DEFAULT_WS_PORT: u16 = 3030;

/// Handler for app-specific RPC methods, consulted before the walker.
pub type CustomRpcHandler = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// WebSocket state.
pub struct WebSocketState<S: AccessibilityService> {
  service: Arc<S>,
  walker_builder: WalkerBuilder,
  custom_handler: Option<CustomRpcHandler>,
  port: u16,
}

impl<S: AccessibilityService> Clone for WebSocketState<S> {
  fn clone(&self) -> Self {
    Self {
      service: Arc::clone(&self.service),
      walker_builder: self.walker_builder,
      custom_handler: self.custom_handler.clone(),
      port: self.port,
    }
  }
}

impl<S: AccessibilityService> std::fmt::Debug for WebSocketState<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WebSocketState")
      .field("port", &self.port)
      .field("walker_builder", &self.walker_builder)
      .finish_non_exhaustive()
  }
}

impl<S: AccessibilityService> WebSocketState<S> {
  /// Create with default port.
  pub fn new(service: S) -> Self {
    Self::with_port(service, DEFAULT_WS_PORT)
  }

  /// Create with custom port.
  pub fn with_port(service: S, port: u16) -> Self {
    Self {
      service: Arc::new(service),
      walker_builder: WalkerBuilder::default(),
      custom_handler: None,
      port,
    }
  }

  /// Configure the walkers created for each connection.
  #[must_use]
  pub const fn with_walker_builder(mut self, builder: WalkerBuilder) -> Self {
    self.walker_builder = builder;
    self
  }

  /// Add a custom RPC handler.
  #[must_use]
  pub fn with_custom_handler(mut self, handler: CustomRpcHandler) -> Self {
    self.custom_handler = Some(handler);
    self
  }

  fn walker(&self) -> Walker<S> {
    self.walker_builder.build_shared(Arc::clone(&self.service))
  }
}

/// Start the WebSocket server.
pub async fn start_server<S: AccessibilityService>(ws_state: WebSocketState<S>) {
  let port = ws_state.port;

  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  let app = Router::new()
    .route("/ws", get(websocket_handler::<S>))
    .layer(cors)
    .with_state(ws_state);

  let addr = format!("127.0.0.1:{port}");
  let listener = match tokio::net::TcpListener::bind(&addr).await {
    Ok(l) => l,
    Err(e) => {
      error!("Failed to bind WebSocket server to {addr}: {e}");
      std::process::exit(1);
    }
  };

  log::info!("WebSocket server: ws://{addr}/ws");

  if let Err(e) = axum::serve(listener, app).await {
    error!("WebSocket server failed: {e}");
    std::process::exit(1);
  }
}

async fn websocket_handler<S: AccessibilityService>(
  ws: WebSocketUpgrade,
  State(ws_state): State<WebSocketState<S>>,
) -> Response {
  ws.on_upgrade(|socket| handle_websocket(socket, ws_state))
}

async fn handle_websocket<S: AccessibilityService>(mut socket: WebSocket, ws_state: WebSocketState<S>) {
  let walker = ws_state.walker();
  let mut events = walker.subscribe();

  let pump_walker = walker.clone();
  let pump = tokio::spawn(async move { pump_walker.run_native_events().await });

  loop {
    tokio::select! {
        msg = socket.recv() => {
            match msg {
                Some(Ok(Message::Text(text))) => {
                    let response = handle_request_async(&text, &ws_state, &walker).await;
                    // Events caused by the request go out before its answer.
                    while let Ok(event) = events.try_recv() {
                        if let Ok(json) = serde_json::to_string(&event) {
                            drop(socket.send(Message::Text(json)).await);
                        }
                    }
                    drop(socket.send(Message::Text(response)).await);
                }
                Some(Ok(Message::Close(_))) => {
                    log::info!("[client] closed connection");
                    break;
                }
                Some(Err(e)) => {
                    log::warn!("WebSocket error: {e}");
                    break;
                }
                None => {
                    log::info!("[client] disconnected");
                    break;
                }
                _ => {}
            }
        }

        event = events.recv() => {
            match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Overflowed(n)) => {
                    log::warn!("[ws] Client lagged, dropped {n} events - consider increasing event_capacity or client needs resync");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
  }

  pump.abort();
  walker.teardown();
  log::debug!("[ws] walker torn down");
}

async fn handle_request_async<S: AccessibilityService>(
  request: &str,
  ws_state: &WebSocketState<S>,
  walker: &Walker<S>,
) -> String {
  let parsed: Result<Value, _> = serde_json::from_str(request);

  let req = match parsed {
    Ok(v) => v,
    Err(e) => return json!({ "error": format!("Invalid JSON: {}", e) }).to_string(),
  };

  let id = req.get("id").cloned().unwrap_or(Value::Null);
  let method = req
    .get("method")
    .and_then(Value::as_str)
    .unwrap_or("")
    .to_string();
  let args = req.get("args").cloned().unwrap_or(Value::Null);

  if let Some(ref handler) = ws_state.custom_handler {
    if let Some(mut response) = handler(&method, &args) {
      if let Some(obj) = response.as_object_mut() {
        obj.insert("id".to_string(), id);
      }
      return response.to_string();
    }
  }

  // Native calls may block.
  let walker = walker.clone();
  let dispatch_result =
    tokio::task::spawn_blocking(move || dispatch_json(&walker, &method, &args)).await;

  let mut response = match dispatch_result {
    Ok(r) => r,
    Err(_) => json!({ "error": "RPC task panicked" }),
  };
  if let Some(obj) = response.as_object_mut() {
    obj.insert("id".to_string(), id);
  }
  response.to_string()
}
