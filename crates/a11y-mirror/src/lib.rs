/*!
A11y Mirror - accessible-tree mirroring across an asynchronous boundary

The server side (`Walker`) wraps native accessibility objects in
identity-cached proxies and turns native notifications into protocol
events. The client side (`Client` + `TreeView`) rebuilds a navigable tree
from those proxies without ever touching a native object.

```ignore
use a11y_mirror::{Client, LocalTransport, TreeView, Walker};

// Server: one walker per document
let walker = Walker::new(service);
let mut events = walker.subscribe();

// Client: mirrors + tree view over any transport
let client = Client::new(LocalTransport::new(walker.clone()));
let view = TreeView::new(client, sink);
view.setup().await?;

// Feed native notifications in, protocol events out
walker.drain_native_events(&mut native_events);
while let Ok(event) = events.try_recv() {
    view.handle_event(&event).await?;
}
```
*/

mod client;
mod protocol;
mod treeview;
mod types;
mod walker;

pub mod native;

pub use types::*;

pub use crate::client::{Client, LocalTransport, Mirror, MirrorPool, ResolvedPath, Transport};
pub use crate::protocol::{dispatch, dispatch_json, Reply, Request, Response};
pub use crate::treeview::{Key, NodeDetails, Phase, Presentation, Row, TreeView};
pub use crate::walker::{Walker, WalkerBuilder};
