//! End-to-end scenarios for a bridged session.
//!
//! Every test drives a [`Session`] on a manual clock with the recording
//! backend, so frame pacing and backend traffic are fully deterministic.
//!
//! Run with: cargo test --test bridge_scenarios

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use spark_tui_bridge::pipeline::{ManualClock, RenderQueue, RenderRequest};
use spark_tui_bridge::renderer::{BackendCall, RecordingBackend};
use spark_tui_bridge::state::{KeyStream, Modifiers, RawKeyEvent};
use spark_tui_bridge::{
    BridgeConfig, BridgeError, Dimension, EventKind, KeyOutcome, NodeId, Priority, Session,
    TargetKind,
};

// =============================================================================
// HELPERS
// =============================================================================

struct Harness {
    session: Session,
    backend: Rc<RefCell<RecordingBackend>>,
    clock: ManualClock,
    root: NodeId,
}

fn setup() -> Harness {
    setup_with(BridgeConfig::default())
}

fn setup_with(config: BridgeConfig) -> Harness {
    let backend = Rc::new(RefCell::new(RecordingBackend::new()));
    let clock = ManualClock::new();
    let mut session = Session::with_clock(backend.clone(), config, Rc::new(clock.clone()));
    session.set_flush_hook(|| {});
    let root = session.source_mut().create_element("root");
    Harness {
        session,
        backend,
        clock,
        root,
    }
}

impl Harness {
    fn element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.session.source_mut().create_element(tag);
        self.session.source_mut().append_child(parent, node).unwrap();
        node
    }

    fn text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self.session.source_mut().create_text(text);
        self.session.source_mut().append_child(parent, node).unwrap();
        node
    }

    /// Mount the app and drain the first frame.
    fn start(&mut self) {
        self.session.mount_app(self.root).unwrap();
        self.session.run_pending().unwrap();
    }

    fn advance(&mut self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    fn renders(&self) -> usize {
        self.backend.borrow().render_count()
    }

    fn content_of(&self, node: NodeId) -> Option<String> {
        let target = self.session.target_of(node)?;
        self.session.targets().get(target)?.props.content.clone()
    }

    fn tab(&mut self, shift: bool) -> KeyOutcome {
        let modifiers = if shift { Modifiers::SHIFT } else { Modifiers::NONE };
        let raw = RawKeyEvent::new(KeyStream::Key, "tab").with_modifiers(modifiers);
        let outcome = self.session.handle_key(&raw).unwrap();
        // Step past the de-dup window so the next press counts
        self.advance(100);
        outcome
    }
}

// =============================================================================
// MOUNTING
// =============================================================================

#[test]
fn test_container_with_two_text_leaves() {
    let mut h = setup();
    let panel = h.element(h.root, "box");
    let first = h.element(panel, "text");
    h.text(first, "  Hello  ");
    let second = h.element(panel, "text");
    h.text(second, "World\n");
    h.start();

    let targets = h.session.targets();
    assert_eq!(targets.roots().len(), 1);
    let container = targets.get(targets.roots()[0]).unwrap();
    assert_eq!(container.kind, TargetKind::Box);
    assert_eq!(container.children.len(), 2);

    let contents: Vec<_> = container
        .children
        .iter()
        .map(|&c| {
            let child = targets.get(c).unwrap();
            assert_eq!(child.kind, TargetKind::Text);
            assert!(child.children.is_empty());
            child.props.content.clone().unwrap()
        })
        .collect();
    assert_eq!(contents, vec!["Hello".to_string(), "World".to_string()]);
}

#[test]
fn test_positional_attribute_coercion() {
    let mut h = setup();
    let panel = h.element(h.root, "box");
    h.session.source_mut().set_attribute(panel, "width", "42").unwrap();
    h.session.source_mut().set_attribute(panel, "height", "42.0").unwrap();
    h.session.source_mut().set_attribute(panel, "left", "50%").unwrap();
    h.start();

    let target = h.session.target_of(panel).unwrap();
    let props = &h.session.targets().get(target).unwrap().props;
    assert_eq!(props.width, Some(Dimension::Cells(42)));
    assert_eq!(props.height, Some(Dimension::Raw("42.0".into())));
    assert_eq!(props.left, Some(Dimension::Raw("50%".into())));
}

// =============================================================================
// RENDER QUEUE AND PACING
// =============================================================================

#[test]
fn test_batch_orders_by_priority_then_age() {
    let mut queue = RenderQueue::new();
    let now = Instant::now();
    queue.add(RenderRequest::new("a", Priority::Low, now));
    queue.add(RenderRequest::new("b", Priority::Immediate, now));
    queue.add(RenderRequest::new("a", Priority::High, now));

    let ids: Vec<String> = queue
        .get_next_batch(10)
        .into_iter()
        .map(|r| r.element_id.to_string())
        .collect();
    assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    assert!(queue.is_empty());
}

#[test]
fn test_burst_of_requests_draws_one_frame() {
    let mut h = setup();
    h.start();
    h.session.set_max_fps(30);
    let frames_before = h.session.render_stats().frame_count;

    for id in ["a", "b", "c", "d", "e"] {
        h.session.schedule_render(id, Priority::Normal);
        h.advance(2);
    }
    h.session.run_pending().unwrap();
    assert_eq!(h.session.render_stats().frame_count, frames_before + 1);

    h.advance(33);
    h.session.run_pending().unwrap();
    assert_eq!(h.session.render_stats().frame_count, frames_before + 1);
    assert_eq!(h.session.render_stats().queued, 0);
}

#[test]
fn test_frames_are_paced_by_interval() {
    let mut h = setup();
    let label = h.element(h.root, "text");
    h.text(label, "x");
    h.start();
    assert_eq!(h.renders(), 1);

    h.session.schedule_render("late", Priority::Normal);
    h.session.run_pending().unwrap();
    assert_eq!(h.renders(), 1, "second frame must wait for the interval");

    h.advance(17);
    h.session.run_pending().unwrap();
    assert_eq!(h.renders(), 2);
}

#[test]
fn test_pause_holds_work_until_resume() {
    let mut h = setup();
    h.start();
    let renders = h.renders();

    h.session.pause();
    h.session.schedule_render("a", Priority::High);
    h.advance(100);
    h.session.run_pending().unwrap();
    assert_eq!(h.renders(), renders);
    assert!(h.session.render_stats().paused);

    h.session.resume();
    h.session.run_pending().unwrap();
    assert_eq!(h.renders(), renders + 1);
}

#[test]
fn test_render_error_propagates_and_scheduler_recovers() {
    let mut h = setup();
    h.start();
    h.advance(100);

    h.backend.borrow_mut().fail_renders(Some("tty gone"));
    h.session.schedule_render("a", Priority::Normal);
    let err = h.session.run_pending().unwrap_err();
    assert!(matches!(err, BridgeError::Backend(ref m) if m == "tty gone"));

    h.backend.borrow_mut().fail_renders(None);
    h.advance(100);
    h.session.schedule_render("b", Priority::Normal);
    h.session.run_pending().unwrap();
    assert_eq!(h.session.render_stats().queued, 0);
}

// =============================================================================
// MUTATION SYNC
// =============================================================================

#[test]
fn test_two_text_writes_in_one_turn_patch_once() {
    let mut h = setup();
    let label = h.element(h.root, "text");
    let leaf = h.text(label, "zero");
    h.start();
    h.advance(100);

    let target = h.session.target_of(label).unwrap();
    let handle = h.session.targets().get(target).unwrap().handle.unwrap();
    h.backend.borrow_mut().take_calls();

    h.session.source_mut().set_text(leaf, "one").unwrap();
    h.session.source_mut().set_text(leaf, "two").unwrap();
    h.session.run_pending().unwrap();

    let backend = h.backend.borrow();
    let patches = backend.patches_for(handle);
    assert_eq!(patches.len(), 1);
    assert!(patches[0].touches_content());
    assert_eq!(backend.render_count(), 1);
    drop(backend);

    assert_eq!(h.content_of(label).as_deref(), Some("two"));
    assert_eq!(h.session.target_of(label), Some(target), "text change keeps the widget");
}

#[test]
fn test_attribute_change_patches_in_place() {
    let mut h = setup();
    let panel = h.element(h.root, "box");
    h.start();
    let target = h.session.target_of(panel).unwrap();

    h.session.source_mut().set_attribute(panel, "class", "active").unwrap();
    h.session.flush_mutations().unwrap();

    assert_eq!(h.session.target_of(panel), Some(target));
    let props = &h.session.targets().get(target).unwrap().props;
    assert_eq!(props.class_name.as_deref(), Some("active"));
}

#[test]
fn test_appended_child_is_mounted() {
    let mut h = setup();
    let list = h.element(h.root, "list");
    h.start();

    let item = h.element(list, "text");
    h.text(item, "new item");
    h.session.flush_mutations().unwrap();

    let list_target = h.session.target_of(list).unwrap();
    let children = h.session.targets().children(list_target).to_vec();
    assert_eq!(children.len(), 1);
    assert_eq!(h.content_of(item).as_deref(), Some("new item"));
}

#[test]
fn test_removed_subtree_is_destroyed() {
    let mut h = setup();
    let panel = h.element(h.root, "box");
    let label = h.element(panel, "text");
    h.text(label, "bye");
    h.start();
    let handle = {
        let target = h.session.target_of(panel).unwrap();
        h.session.targets().get(target).unwrap().handle.unwrap()
    };

    let renders = h.renders();
    h.advance(100);

    let root = h.root;
    h.session.source_mut().remove_child(root, panel).unwrap();
    h.session.flush_mutations().unwrap();

    assert!(h.session.targets().is_empty());
    assert!(h.session.target_of(panel).is_none());
    assert!(h.session.target_of(label).is_none());
    assert!(h.backend.borrow().calls().contains(&BackendCall::Destroy(handle)));

    // The vacated area is repainted
    h.session.run_pending().unwrap();
    assert_eq!(h.renders(), renders + 1);
}

#[test]
fn test_root_inserted_before_sibling_keeps_order() {
    let mut h = setup();
    let a = h.element(h.root, "box");
    let b = h.element(h.root, "box");
    h.start();

    let c = h.session.source_mut().create_element("box");
    let root = h.root;
    h.session.source_mut().insert_before(root, c, Some(a)).unwrap();
    h.session.flush_mutations().unwrap();

    let order: Vec<_> = h
        .session
        .targets()
        .roots()
        .iter()
        .map(|&t| h.session.bridge().source_of(t).unwrap())
        .collect();
    assert_eq!(order, vec![c, a, b]);
}

#[test]
fn test_destroyed_nodes_leave_the_source_arena() {
    let mut h = setup();
    let list = h.element(h.root, "list");
    h.start();
    let baseline = h.session.source().len();

    for i in 0..20 {
        let item = h.element(list, "text");
        h.text(item, &format!("row {i}"));
        h.session.flush_mutations().unwrap();
        assert!(h.session.target_of(item).is_some());

        h.session.source_mut().destroy_subtree(item).unwrap();
        h.session.flush_mutations().unwrap();
        assert!(h.session.target_of(item).is_none());
    }

    assert_eq!(h.session.source().len(), baseline);
    let list_t = h.session.target_of(list).unwrap();
    assert!(h.session.targets().children(list_t).is_empty());
}

// =============================================================================
// FOCUS AND KEYBOARD
// =============================================================================

#[test]
fn test_focus_is_exclusive() {
    let mut h = setup();
    let a = h.element(h.root, "input");
    let b = h.element(h.root, "input");
    let log = Rc::new(RefCell::new(Vec::new()));
    for node in [a, b] {
        for kind in [EventKind::Focus, EventKind::Blur] {
            let log = log.clone();
            h.session
                .source_mut()
                .add_listener(node, kind, move |e| {
                    log.borrow_mut().push(format!("{}:{}", e.kind.name(), e.target));
                })
                .unwrap();
        }
    }
    h.start();

    assert!(h.session.focus_element(a).unwrap());
    assert!(!h.session.focus_element(a).unwrap());
    assert!(h.session.focus_element(b).unwrap());

    assert_eq!(h.session.focused_element(), Some(b));
    assert_eq!(
        *log.borrow(),
        vec![format!("focus:{a}"), format!("blur:{a}"), format!("focus:{b}")]
    );

    assert!(h.session.blur());
    assert!(!h.session.has_focus());
    assert!(!h.session.blur());
}

#[test]
fn test_tab_cycles_focusable_targets() {
    let mut h = setup();
    let first = h.element(h.root, "input");
    let second = h.element(h.root, "button");
    h.text(second, "OK");
    h.start();

    assert!(matches!(h.tab(false), KeyOutcome::Unfocused(_)));
    assert_eq!(h.session.focused_element(), Some(first));

    h.tab(false);
    assert_eq!(h.session.focused_element(), Some(second));

    h.tab(false);
    assert_eq!(h.session.focused_element(), Some(first), "cycling wraps");

    h.tab(true);
    assert_eq!(h.session.focused_element(), Some(second));
}

#[test]
fn test_key_reaches_focused_listener() {
    let mut h = setup();
    let input = h.element(h.root, "input");
    let typed = Rc::new(RefCell::new(String::new()));
    {
        let typed = typed.clone();
        h.session
            .source_mut()
            .add_listener(input, EventKind::Input, move |e| {
                typed.borrow_mut().push_str(e.data.as_deref().unwrap_or_default());
            })
            .unwrap();
    }
    h.start();
    h.session.focus_element(input).unwrap();

    let raw = RawKeyEvent::new(KeyStream::Keypress, "a").with_char('a');
    let outcome = h.session.handle_key(&raw).unwrap();
    assert!(matches!(outcome, KeyOutcome::Dispatched { cancelled: false, .. }));
    assert_eq!(typed.borrow().as_str(), "a");

    // Same press on the other stream inside the window is dropped
    let echo = RawKeyEvent::new(KeyStream::Key, "a").with_char('a');
    assert_eq!(h.session.handle_key(&echo).unwrap(), KeyOutcome::Duplicate);
    assert_eq!(typed.borrow().as_str(), "a");
}

fn focus_log(h: &mut Harness, node: NodeId) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for kind in [EventKind::Focus, EventKind::FocusIn, EventKind::Blur, EventKind::FocusOut] {
        let log = log.clone();
        h.session
            .source_mut()
            .add_listener(node, kind, move |e| log.borrow_mut().push(e.kind.name().to_string()))
            .unwrap();
    }
    log
}

#[test]
fn test_focus_survives_sibling_rebuild() {
    let mut h = setup();
    let list = h.element(h.root, "list");
    let field = h.element(list, "input");
    let log = focus_log(&mut h, field);
    h.start();
    h.session.focus_element(field).unwrap();
    let old_target = h.session.target_of(field).unwrap();
    log.borrow_mut().clear();

    let note = h.element(list, "text");
    h.text(note, "saved");
    h.session.run_pending().unwrap();

    let new_target = h.session.target_of(field).unwrap();
    assert_ne!(new_target, old_target, "sibling change rebuilds the list");
    assert_eq!(h.session.focused_element(), Some(field));
    assert_eq!(h.session.focus_signal().get(), Some(new_target));
    assert!(log.borrow().is_empty(), "no blur for a node that kept focus");

    let handle = h.session.targets().get(new_target).unwrap().handle.unwrap();
    assert!(h.backend.borrow().calls().contains(&BackendCall::Focus(handle)));
    assert_eq!(h.backend.borrow().store().focused(), Some(handle));
}

#[test]
fn test_unmounted_focused_node_is_blurred() {
    let mut h = setup();
    let field = h.element(h.root, "input");
    let log = focus_log(&mut h, field);
    h.start();
    h.session.focus_element(field).unwrap();
    log.borrow_mut().clear();

    let root = h.root;
    h.session.source_mut().remove_child(root, field).unwrap();
    h.session.flush_mutations().unwrap();

    assert!(!h.session.has_focus());
    assert_eq!(h.session.focus_signal().get(), None);
    assert_eq!(*log.borrow(), vec!["blur".to_string(), "focusout".to_string()]);
}

#[test]
fn test_destroyed_focused_node_releases_focus() {
    let mut h = setup();
    let field = h.element(h.root, "input");
    let log = focus_log(&mut h, field);
    h.start();
    h.session.focus_element(field).unwrap();
    log.borrow_mut().clear();

    h.session.source_mut().destroy_subtree(field).unwrap();
    h.session.flush_mutations().unwrap();

    assert!(!h.session.has_focus());
    assert!(!h.session.source().contains(field));
    assert!(log.borrow().is_empty());
}

#[test]
fn test_keystroke_drives_mutation_and_repaint() {
    let mut h = setup();
    let counter = h.element(h.root, "text");
    let count = h.text(counter, "0");
    let field = h.element(h.root, "input");

    // Listeners queue intents; the host applies them after dispatch
    let pending = Rc::new(RefCell::new(Vec::new()));
    {
        let pending = pending.clone();
        h.session
            .source_mut()
            .add_listener(field, EventKind::KeyDown, move |e| {
                if let Some(key) = &e.key {
                    pending.borrow_mut().push(key.key.clone());
                }
            })
            .unwrap();
    }
    h.start();
    h.session.focus_element(field).unwrap();
    h.advance(100);
    h.session.run_pending().unwrap();
    let renders = h.renders();

    let raw = RawKeyEvent::new(KeyStream::Key, "enter");
    h.session.handle_key(&raw).unwrap();
    let presses = pending.borrow_mut().drain(..).count();
    assert_eq!(presses, 1);
    h.session.source_mut().set_text(count, presses.to_string()).unwrap();

    h.advance(100);
    h.session.run_pending().unwrap();
    assert_eq!(h.content_of(counter).as_deref(), Some("1"));
    assert_eq!(h.renders(), renders + 1);
}

#[test]
fn test_focused_attribute_focuses_after_settle_delay() {
    let mut h = setup_with(BridgeConfig::default().with_focus_settle_delay(Duration::from_millis(10)));
    let input = h.element(h.root, "input");
    h.session.source_mut().set_attribute(input, "focused", "true").unwrap();
    h.start();
    assert!(!h.session.has_focus());

    h.advance(10);
    h.session.run_pending().unwrap();
    assert_eq!(h.session.focused_element(), Some(input));

    let target = h.session.target_of(input).unwrap();
    let handle = h.session.targets().get(target).unwrap().handle.unwrap();
    assert!(h.backend.borrow().calls().contains(&BackendCall::Focus(handle)));
}

#[test]
fn test_deferred_focus_skips_destroyed_node() {
    let mut h = setup();
    let input = h.element(h.root, "input");
    h.session.source_mut().set_attribute(input, "focused", "true").unwrap();
    h.start();

    let root = h.root;
    h.session.source_mut().remove_child(root, input).unwrap();
    h.advance(50);
    h.session.run_pending().unwrap();

    assert!(!h.session.has_focus());
    assert!(h.session.target_of(input).is_none());
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[test]
fn test_exit_key_stops_and_restores_on_drop() {
    let backend;
    {
        let mut h = setup();
        h.start();
        assert!(h.session.is_running());

        let ctrl_c = RawKeyEvent::new(KeyStream::Key, "c")
            .with_char('c')
            .with_modifiers(Modifiers::CTRL);
        assert_eq!(h.session.handle_key(&ctrl_c).unwrap(), KeyOutcome::Exit);
        assert!(!h.session.is_running());
        backend = h.backend.clone();
    }
    assert_eq!(backend.borrow().calls().last(), Some(&BackendCall::Restore));
}

#[test]
fn test_sessions_are_isolated() {
    let mut one = setup();
    let mut two = setup();
    let a = one.element(one.root, "input");
    two.element(two.root, "box");
    one.start();
    two.start();

    one.session.focus_element(a).unwrap();
    assert!(one.session.has_focus());
    assert!(!two.session.has_focus());
    assert_eq!(one.session.targets().len(), 1);
    assert_eq!(two.session.targets().len(), 1);
}
