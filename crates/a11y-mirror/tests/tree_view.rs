//! End-to-end tree view behavior over an in-process walker.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use a11y_mirror::native::memory::{MemoryHandle, MemoryService, NodeSpec};
use a11y_mirror::native::{AccessibilityService, NativeEvent};
use a11y_mirror::{
  Bounds, Client, Event, ForeignNodeId, Key, LocalTransport, MirrorResult, NodeDetails, Phase,
  Point, Presentation, ProxyId, Request, Response, Row, RowId, TreeView, Viewport, Walker,
};
use async_broadcast::Receiver;
use parking_lot::Mutex;
use tokio::sync::oneshot;

// ==================== Test doubles ====================

#[derive(Debug, Clone, PartialEq)]
enum Op {
  Create(RowId),
  Update(RowId),
  SetChildren(RowId, Vec<RowId>),
  SetRoot(Option<RowId>),
  Detach(RowId),
  Discard(RowId),
  Clear,
  SelectionCleared,
  Details(Option<ProxyId>),
  Highlight(Option<Bounds>),
}

/// Records every sink call and keeps the latest row data.
#[derive(Debug, Default)]
struct Sink {
  next: u32,
  ops: Vec<Op>,
  rows: HashMap<RowId, Row>,
  details: Option<NodeDetails>,
}

impl Sink {
  fn position(&self, op: &Op) -> Option<usize> {
    self.ops.iter().position(|o| o == op)
  }
}

impl Presentation for Sink {
  fn create_row(&mut self, row: &Row) -> RowId {
    self.next += 1;
    let id = RowId(self.next);
    self.rows.insert(id, row.clone());
    self.ops.push(Op::Create(id));
    id
  }

  fn update_row(&mut self, id: RowId, row: &Row) {
    self.rows.insert(id, row.clone());
    self.ops.push(Op::Update(id));
  }

  fn set_children(&mut self, parent: RowId, children: &[RowId]) {
    self.ops.push(Op::SetChildren(parent, children.to_vec()));
  }

  fn set_root(&mut self, row: Option<RowId>) {
    self.ops.push(Op::SetRoot(row));
  }

  fn detach(&mut self, row: RowId) {
    self.ops.push(Op::Detach(row));
  }

  fn discard(&mut self, row: RowId) {
    self.rows.remove(&row);
    self.ops.push(Op::Discard(row));
  }

  fn clear(&mut self) {
    self.rows.clear();
    self.ops.push(Op::Clear);
  }

  fn selection_cleared(&mut self) {
    self.ops.push(Op::SelectionCleared);
  }

  fn display_details(&mut self, details: Option<&NodeDetails>) {
    self.details = details.cloned();
    self.ops.push(Op::Details(details.map(|d| d.id)));
  }

  fn highlight(&mut self, rect: Option<Bounds>) {
    self.ops.push(Op::Highlight(rect));
  }
}

/// Local transport that records requests and can hold back one answer.
#[derive(Debug, Clone)]
struct Recording {
  inner: LocalTransport<MemoryService>,
  requests: Arc<Mutex<Vec<Request>>>,
  gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
}

impl Recording {
  /// Hold the next answer until the returned sender fires.
  fn hold_next(&self) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    *self.gate.lock() = Some(rx);
    tx
  }

  fn children_requests(&self) -> Vec<ProxyId> {
    self
      .requests
      .lock()
      .iter()
      .filter_map(|r| match r {
        Request::Children { id } => Some(*id),
        _ => None,
      })
      .collect()
  }
}

impl a11y_mirror::Transport for Recording {
  fn request(&self, request: Request) -> impl Future<Output = MirrorResult<Response>> + Send {
    self.requests.lock().push(request.clone());
    // The walker answers now; delivery may be delayed.
    let answer = self.inner.request(request);
    let gate = self.gate.lock().take();
    async move {
      let answer = answer.await;
      if let Some(gate) = gate {
        drop(gate.await);
      }
      answer
    }
  }
}

struct Harness {
  service: MemoryService,
  walker: Walker<MemoryService>,
  transport: Recording,
  native: Receiver<NativeEvent<MemoryHandle>>,
  events: Receiver<Event>,
  view: TreeView<Recording, Sink>,
}

impl Harness {
  fn new(document: NodeSpec) -> Self {
    let service = MemoryService::new(document);
    let native = service.subscribe();
    let walker = Walker::new(service.clone());
    let events = walker.subscribe();
    let transport = Recording {
      inner: LocalTransport::new(walker.clone()),
      requests: Arc::new(Mutex::new(Vec::new())),
      gate: Arc::new(Mutex::new(None)),
    };
    let view = TreeView::new(Client::new(transport.clone()), Sink::default());
    Self {
      service,
      walker,
      transport,
      native,
      events,
      view,
    }
  }

  /// Native node by child indices from the document.
  fn native(&self, path: &[usize]) -> MemoryHandle {
    let mut node = self.service.document().unwrap();
    for &index in path {
      node = self.service.children(&node).remove(index);
    }
    node
  }

  /// Run pending native notifications through the walker and the view.
  async fn sync(&mut self) {
    sync(&self.walker, &mut self.native, &mut self.events, &self.view).await;
  }

  fn child(&self, parent: ProxyId, index: usize) -> ProxyId {
    self.view.children_of(parent).unwrap()[index]
  }

  fn name(&self, id: ProxyId) -> Option<String> {
    self.view.client().mirror(id).and_then(|m| m.name)
  }

  fn assert_maps_consistent(&self) {
    assert_eq!(self.view.node_count(), self.view.row_count());
  }
}

async fn sync(
  walker: &Walker<MemoryService>,
  native: &mut Receiver<NativeEvent<MemoryHandle>>,
  events: &mut Receiver<Event>,
  view: &TreeView<Recording, Sink>,
) {
  walker.drain_native_events(native);
  while let Ok(event) = events.try_recv() {
    view.handle_event(&event).await.unwrap();
  }
}

/// doc -> [A -> [C], B -> [D]]
fn page() -> NodeSpec {
  NodeSpec::new("document")
    .name("Doc")
    .foreign(ForeignNodeId(1))
    .child(
      NodeSpec::new("section")
        .name("A")
        .foreign(ForeignNodeId(2))
        .child(
          NodeSpec::new("link")
            .name("C")
            .foreign(ForeignNodeId(3))
            .state("focusable")
            .attribute("href", "#c"),
        ),
    )
    .child(
      NodeSpec::new("section")
        .name("B")
        .foreign(ForeignNodeId(4))
        .child(NodeSpec::new("text leaf").name("D")),
    )
}

// ==================== Scenarios ====================

#[tokio::test]
async fn resolving_foreign_node_expands_only_its_ancestors() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();

  let c = h
    .view
    .resolve_foreign_node(ForeignNodeId(3))
    .await
    .unwrap()
    .unwrap();

  let a = h.child(doc, 0);
  let b = h.child(doc, 1);
  assert_eq!(h.name(c).as_deref(), Some("C"));
  assert_eq!(h.view.parent_of(c), Some(a));
  assert_eq!(h.view.phase(doc), Some(Phase::Expanded));
  assert_eq!(h.view.phase(a), Some(Phase::Expanded));
  assert_eq!(h.view.phase(b), Some(Phase::Collapsed));
  assert_eq!(h.view.children_of(b), Some(vec![]));
  assert_eq!(h.transport.children_requests(), vec![doc, a]);

  assert_eq!(h.view.selected(), Some(c));
  h.view.with_presentation(|sink| {
    let details = sink.details.as_ref().unwrap();
    assert_eq!(details.id, c);
    assert_eq!(details.states, vec!["focusable"]);
    assert_eq!(details.attributes[0].value, "#c");
  });
}

#[tokio::test]
async fn resolving_the_document_selects_it_without_expanding() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();

  let resolved = h.view.resolve_foreign_node(ForeignNodeId(1)).await.unwrap();

  assert_eq!(resolved, Some(doc));
  assert_eq!(h.view.selected(), Some(doc));
  assert!(h.transport.children_requests().is_empty());
}

#[tokio::test]
async fn resolving_against_a_stale_document_is_ignored() {
  let mut h = Harness::new(page());
  h.view.setup().await.unwrap();

  // The walker moves to a new document; the view has not heard yet.
  h.service
    .replace_document(NodeSpec::new("document").child(NodeSpec::new("link").foreign(ForeignNodeId(9))));
  h.walker.drain_native_events(&mut h.native);

  assert_eq!(
    h.view.resolve_foreign_node(ForeignNodeId(9)).await.unwrap(),
    None
  );
  assert_eq!(h.view.selected(), None);
  assert_eq!(
    h.view.resolve_foreign_node(ForeignNodeId(42)).await.unwrap(),
    None,
    "no accessible at all"
  );
}

#[tokio::test]
async fn unreadable_node_is_selected_with_empty_details() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.select(Some(doc)).await.unwrap();
  h.service.set_failing(&h.native(&[0, 0]), true);

  let c = h
    .view
    .resolve_foreign_node(ForeignNodeId(3))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(h.view.selected(), Some(c));
  h.view.with_presentation(|sink| {
    let details = sink.details.as_ref().unwrap();
    assert_eq!(details.id, c);
    assert!(details.states.is_empty());
    assert!(details.attributes.is_empty());
  });
}

#[tokio::test]
async fn destroying_a_parent_clears_selection_first() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let a = h.child(doc, 0);
  h.view.expand(a, &[]).await.unwrap();
  let c = h.child(a, 0);
  h.view.select(Some(c)).await.unwrap();
  let (a_row, c_row) = (h.view.row_of(a).unwrap(), h.view.row_of(c).unwrap());

  h.view
    .handle_event(&Event::NodeDestroyed { id: a })
    .await
    .unwrap();

  assert_eq!(h.view.selected(), None);
  assert_eq!(h.view.phase(a), None);
  assert_eq!(h.view.phase(c), None);
  assert_eq!(h.view.node_for_row(c_row), None);
  assert_eq!(h.view.children_of(doc).unwrap().len(), 1);
  h.assert_maps_consistent();

  h.view.with_presentation(|sink| {
    let cleared = sink.position(&Op::SelectionCleared).unwrap();
    let detached = sink.position(&Op::Detach(a_row)).unwrap();
    assert!(cleared < detached);
    assert!(sink.position(&Op::Discard(c_row)).unwrap() < sink.position(&Op::Discard(a_row)).unwrap());
  });
}

#[tokio::test]
async fn native_hide_removes_subtree() {
  let mut h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let a = h.child(doc, 0);
  h.view.expand(a, &[]).await.unwrap();
  let c = h.child(a, 0);
  h.view.select(Some(c)).await.unwrap();

  h.service.remove(&h.native(&[0]));
  h.sync().await;

  assert_eq!(h.view.selected(), None);
  assert_eq!(h.view.children_of(doc).unwrap().len(), 1);
  assert!(h.view.client().mirror(a).is_none());
  assert!(h.view.client().mirror(c).is_none());
  assert_eq!(h.view.node_count(), 2);
}

#[tokio::test]
async fn consecutive_reorders_track_the_live_child_list() {
  let mut h = Harness::new(
    NodeSpec::new("document").child(
      NodeSpec::new("list")
        .name("A")
        .child(NodeSpec::new("listitem").name("x"))
        .child(NodeSpec::new("listitem").name("y")),
    ),
  );
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let a = h.child(doc, 0);
  h.view.expand(a, &[]).await.unwrap();
  let x = h.child(a, 0);
  let x_row = h.view.row_of(x).unwrap();

  let list = h.native(&[0]);
  h.service.append(&list, NodeSpec::new("listitem").name("z"));
  h.sync().await;
  assert_eq!(h.view.children_of(a).unwrap().len(), 3);

  h.service.remove(&h.native(&[0, 0]));
  h.sync().await;

  let children = h.view.children_of(a).unwrap();
  let names: Vec<_> = children.iter().map(|id| h.name(*id).unwrap()).collect();
  assert_eq!(names, vec!["y", "z"]);
  assert_eq!(h.view.phase(x), None);
  assert_eq!(h.view.node_for_row(x_row), None);
  assert_eq!(h.view.node_count(), 4);
  h.assert_maps_consistent();
}

#[tokio::test]
async fn reparenting_moves_the_existing_tree_node() {
  let mut h = Harness::new(
    NodeSpec::new("document")
      .child(
        NodeSpec::new("section").name("A").child(
          NodeSpec::new("list")
            .name("X")
            .child(NodeSpec::new("listitem").name("Z")),
        ),
      )
      .child(
        NodeSpec::new("section")
          .name("B")
          .child(NodeSpec::new("text leaf").name("Y")),
      ),
  );
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let (a, b) = (h.child(doc, 0), h.child(doc, 1));
  h.view.expand(a, &[]).await.unwrap();
  h.view.expand(b, &[]).await.unwrap();
  let x = h.child(a, 0);
  h.view.expand(x, &[]).await.unwrap();
  let (x_row, count) = (h.view.row_of(x).unwrap(), h.view.node_count());

  h.service.move_node(&h.native(&[0, 0]), &h.native(&[1]));
  h.sync().await;

  assert_eq!(h.view.parent_of(x), Some(b));
  assert_eq!(h.view.row_of(x), Some(x_row), "same tree node, same row");
  assert_eq!(h.view.children_of(a), Some(vec![]));
  assert_eq!(h.view.children_of(b).unwrap().last(), Some(&x));
  assert_eq!(h.view.phase(x), Some(Phase::Expanded));
  assert_eq!(h.view.children_of(x).unwrap().len(), 1);
  assert_eq!(h.view.node_count(), count);
  h.assert_maps_consistent();
  h.view.with_presentation(|sink| assert!(sink.position(&Op::Detach(x_row)).is_some()));
}

#[tokio::test]
async fn document_change_while_selected_rebuilds_the_tree() {
  let mut h = Harness::new(page());
  let old_doc = h.view.setup().await.unwrap();
  h.view.expand(old_doc, &[]).await.unwrap();
  let a = h.child(old_doc, 0);
  h.view.select(Some(a)).await.unwrap();

  h.service
    .replace_document(NodeSpec::new("document").name("Next page").child(NodeSpec::new("heading")));
  h.sync().await;

  let new_doc = h.view.root().unwrap();
  assert_ne!(new_doc, old_doc);
  assert_eq!(h.view.client().document(), Some(new_doc));
  assert_eq!(h.name(new_doc).as_deref(), Some("Next page"));
  assert_eq!(h.view.selected(), None);
  assert_eq!(h.view.phase(a), None);
  assert_eq!(h.view.phase(new_doc), Some(Phase::Collapsed));
  assert_eq!(h.view.node_count(), 1);
  h.assert_maps_consistent();
  h.view.with_presentation(|sink| {
    let clear = sink.ops.iter().rposition(|o| *o == Op::Clear).unwrap();
    let cleared = sink.ops.iter().rposition(|o| *o == Op::SelectionCleared).unwrap();
    assert!(clear < cleared);
    assert_eq!(sink.ops.last(), Some(&Op::SetRoot(h.view.row_of(new_doc))));
  });
}

// ==================== Races ====================

#[tokio::test]
async fn late_children_answer_for_destroyed_node_is_dropped() {
  let mut h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let a = h.child(doc, 0);

  let release = h.transport.hold_next();
  let a_native = h.native(&[0]);
  let Harness {
    service,
    walker,
    native,
    events,
    view,
    ..
  } = &mut h;
  let view: &TreeView<Recording, Sink> = view;

  let (expanded, ()) = tokio::join!(view.expand(a, &[]), async {
    service.remove(&a_native);
    sync(walker, native, events, view).await;
    drop(release.send(()));
  });

  expanded.unwrap();
  assert_eq!(h.view.phase(a), None);
  assert_eq!(h.view.children_of(doc).unwrap().len(), 1);
  assert_eq!(h.view.node_count(), 2);
  h.assert_maps_consistent();
}

#[tokio::test]
async fn late_children_answer_after_collapse_is_dropped() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let a = h.child(doc, 0);

  let release = h.transport.hold_next();
  let (expanded, collapsed) = tokio::join!(h.view.expand(a, &[]), async {
    assert_eq!(h.view.phase(a), Some(Phase::Expanding));
    let collapsed = h.view.collapse(a).await;
    drop(release.send(()));
    collapsed
  });

  expanded.unwrap();
  collapsed.unwrap();
  assert_eq!(h.view.phase(a), Some(Phase::Collapsed));
  assert_eq!(h.view.children_of(a), Some(vec![]));
  h.assert_maps_consistent();
}

// ==================== Expansion & navigation ====================

#[tokio::test]
async fn collapse_discards_children_but_keeps_mirrors() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let a = h.child(doc, 0);
  h.view.expand(a, &[]).await.unwrap();
  let c = h.child(a, 0);
  h.view.select(Some(c)).await.unwrap();

  h.view.collapse(a).await.unwrap();

  assert_eq!(h.view.phase(a), Some(Phase::Collapsed));
  assert_eq!(h.view.phase(c), None);
  assert!(h.view.client().mirror(c).is_some());
  assert_eq!(h.view.selected(), Some(a), "selection moves up to the collapsed node");

  // Collapsing again and collapsing a leaf change nothing.
  let ops = h.view.with_presentation(|sink| sink.ops.len());
  h.view.collapse(a).await.unwrap();
  assert_eq!(h.view.with_presentation(|sink| sink.ops.len()), ops);

  h.view.expand(a, &[]).await.unwrap();
  assert_eq!(h.view.children_of(a), Some(vec![c]), "same mirror, fresh node");
}

#[tokio::test]
async fn leaves_do_not_expand() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let b = h.child(doc, 1);
  h.view.expand(b, &[]).await.unwrap();
  let d = h.child(b, 0);
  let before = h.transport.children_requests().len();

  h.view.expand(d, &[]).await.unwrap();

  assert_eq!(h.view.phase(d), Some(Phase::Collapsed));
  assert_eq!(h.transport.children_requests().len(), before);
  h.view.with_presentation(|sink| {
    assert!(sink.rows[&h.view.row_of(d).unwrap()].leaf);
  });
}

#[tokio::test]
async fn name_change_refreshes_the_row() {
  let mut h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();

  h.service.rename(&h.native(&[]), "Renamed");
  h.sync().await;

  let row = h.view.row_of(doc).unwrap();
  h.view.with_presentation(|sink| {
    assert_eq!(sink.rows[&row].name.as_deref(), Some("Renamed"));
  });
}

#[tokio::test]
async fn keyboard_walks_visible_nodes() {
  let h = Harness::new(page());
  let doc = h.view.setup().await.unwrap();

  h.view.navigate(Key::Down).await.unwrap();
  assert_eq!(h.view.selected(), Some(doc));

  h.view.navigate(Key::Right).await.unwrap();
  let (a, b) = (h.child(doc, 0), h.child(doc, 1));
  h.view.navigate(Key::Down).await.unwrap();
  assert_eq!(h.view.selected(), Some(a));

  h.view.navigate(Key::Right).await.unwrap();
  let c = h.child(a, 0);
  h.view.navigate(Key::Down).await.unwrap();
  assert_eq!(h.view.selected(), Some(c));
  h.view.navigate(Key::Down).await.unwrap();
  assert_eq!(h.view.selected(), Some(b));
  h.view.navigate(Key::Down).await.unwrap();
  assert_eq!(h.view.selected(), Some(b), "stays at the last visible node");

  h.view.navigate(Key::Up).await.unwrap();
  assert_eq!(h.view.selected(), Some(c), "previous is the deepest visible node");
  h.view.navigate(Key::Up).await.unwrap();
  assert_eq!(h.view.selected(), Some(a));

  h.view.navigate(Key::Left).await.unwrap();
  assert_eq!(h.view.phase(a), Some(Phase::Collapsed));
  assert_eq!(h.view.next_showing(a), b);
  assert_eq!(h.view.previous_showing(a), doc);
}

#[tokio::test]
async fn hover_highlights_viewport_bounds() {
  let h = Harness::new(
    NodeSpec::new("document")
      .child(NodeSpec::new("pushbutton").bounds(Bounds::new(120.0, 60.0, 40.0, 20.0))),
  );
  h.service.set_viewport(Viewport {
    device_pixel_ratio: 2.0,
    offset: Point::new(10.0, 5.0),
  });
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let button = h.child(doc, 0);

  h.view.hover(Some(button)).await.unwrap();
  h.view.hover(None).await.unwrap();

  assert_eq!(h.view.hovered(), None);
  h.view.with_presentation(|sink| {
    let highlights: Vec<_> = sink
      .ops
      .iter()
      .filter_map(|o| match o {
        Op::Highlight(rect) => Some(*rect),
        _ => None,
      })
      .collect();
    assert_eq!(
      highlights,
      vec![Some(Bounds::new(50.0, 25.0, 20.0, 10.0)), None]
    );
  });
}

#[tokio::test]
async fn selecting_highlights_unless_hovered() {
  let h = Harness::new(
    NodeSpec::new("document")
      .child(NodeSpec::new("pushbutton").bounds(Bounds::new(120.0, 60.0, 40.0, 20.0)))
      .child(NodeSpec::new("pushbutton").bounds(Bounds::new(0.0, 0.0, 10.0, 10.0))),
  );
  let doc = h.view.setup().await.unwrap();
  h.view.expand(doc, &[]).await.unwrap();
  let (first, second) = (h.child(doc, 0), h.child(doc, 1));

  h.view.select(Some(first)).await.unwrap();
  h.view.hover(Some(second)).await.unwrap();
  h.view.select(Some(second)).await.unwrap();

  h.view.with_presentation(|sink| {
    let highlights: Vec<_> = sink
      .ops
      .iter()
      .filter_map(|o| match o {
        Op::Highlight(rect) => Some(*rect),
        _ => None,
      })
      .collect();
    assert_eq!(
      highlights,
      vec![
        Some(Bounds::new(120.0, 60.0, 40.0, 20.0)),
        Some(Bounds::new(0.0, 0.0, 10.0, 10.0)),
      ],
      "selecting the hovered node does not highlight again"
    );
  });
}
