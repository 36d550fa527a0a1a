/*!
Demo server: serves an in-memory document over WebSocket.

`A11Y_MIRROR_PORT` overrides the port, `A11Y_MIRROR_DOCUMENT` points at a
JSON document description to serve instead of the built-in one.
*/

use a11y_mirror::native::memory::{MemoryService, NodeSpec};
use a11y_mirror::{Bounds, ForeignNodeId};
use a11y_mirror_ws::{start_server, WebSocketState, DEFAULT_WS_PORT};

fn sample_document() -> NodeSpec {
  NodeSpec::new("document")
    .name("Example page")
    .foreign(ForeignNodeId(1))
    .bounds(Bounds::new(0.0, 0.0, 1280.0, 800.0))
    .child(
      NodeSpec::new("heading")
        .name("Welcome")
        .foreign(ForeignNodeId(2))
        .attribute("level", "1")
        .bounds(Bounds::new(16.0, 16.0, 400.0, 40.0))
        .child(NodeSpec::new("text leaf").name("Welcome")),
    )
    .child(
      NodeSpec::new("section")
        .foreign(ForeignNodeId(3))
        .bounds(Bounds::new(16.0, 72.0, 600.0, 200.0))
        .child(
          NodeSpec::new("link")
            .name("Read more")
            .state("focusable")
            .state("linked")
            .foreign(ForeignNodeId(4))
            .bounds(Bounds::new(16.0, 80.0, 120.0, 20.0)),
        )
        .child(
          NodeSpec::new("pushbutton")
            .name("Subscribe")
            .state("focusable")
            .foreign(ForeignNodeId(5))
            .bounds(Bounds::new(16.0, 120.0, 100.0, 32.0)),
        ),
    )
}

fn load_service() -> MemoryService {
  let Ok(path) = std::env::var("A11Y_MIRROR_DOCUMENT") else {
    return MemoryService::new(sample_document());
  };
  let loaded = std::fs::read_to_string(&path)
    .map_err(|e| e.to_string())
    .and_then(|json| MemoryService::from_json(&json).map_err(|e| e.to_string()));
  match loaded {
    Ok(service) => service,
    Err(e) => {
      log::error!("Failed to load document from {path}: {e}, serving the sample");
      MemoryService::new(sample_document())
    }
  }
}

#[tokio::main]
async fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let port = std::env::var("A11Y_MIRROR_PORT")
    .ok()
    .and_then(|p| p.parse().ok())
    .unwrap_or(DEFAULT_WS_PORT);

  start_server(WebSocketState::with_port(load_service(), port)).await;
}
