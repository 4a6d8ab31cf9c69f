//! Session - one bridged terminal app.
//!
//! The session owns every piece of per-app state: the source tree the
//! framework mutates, the bridge and its target tree, focus and keyboard
//! state, the render scheduler with its event loop, the screen and the
//! widget backend. Every entry point is a method here; nothing is global.
//!
//! # Lifecycle
//!
//! ```text
//! Session::new → mount_app(root) → run() ─┬─ terminal events → handle_terminal_event
//!                                         ├─ due tasks       → run_pending
//!                                         └─ exit key        → destroy_screen
//! ```
//!
//! Pending mutation records are always flushed into the bridge before any
//! other task runs, so a frame never sees a half-applied batch.
//!
//! # Example
//!
//! ```ignore
//! let backend = Rc::new(RefCell::new(CrosstermBackend::stdout()));
//! let mut session = Session::new(backend, BridgeConfig::from_env());
//!
//! let root = session.source_mut().create_element("root");
//! let label = session.source_mut().create_element("text");
//! session.source_mut().append_child(root, label)?;
//!
//! session.mount_app(root)?;
//! session.run()?;
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use spark_signals::Signal;
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::engine::{SourceTree, TargetTree};
use crate::error::{BridgeError, Result};
use crate::pipeline::{
    Bridge, Clock, EventLoop, RenderScheduler, SchedulerStats, Screen, SharedBackend, SyncOutcome,
    SystemClock, Task,
};
use crate::renderer::WidgetBackend;
use crate::state::{
    FocusBridge, KeyOutcome, KeyboardBridge, Modifiers, RawKeyEvent, TerminalEvent, matches_binding,
    poll_event,
};
use crate::types::{ElementId, NodeId, Priority, TargetId, WidgetHandle};

/// Element id of whole-screen repaints.
pub const SCREEN_ELEMENT: &str = "screen";

/// Longest the run loop blocks on terminal input with nothing scheduled.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Per-app bridge context.
pub struct Session {
    config: BridgeConfig,
    source: SourceTree,
    bridge: Bridge,
    focus: FocusBridge,
    keyboard: KeyboardBridge,
    scheduler: RenderScheduler,
    ev: EventLoop,
    screen: Option<Screen>,
    backend: SharedBackend,
    running: bool,
}

impl Session {
    /// Session on the wall clock.
    pub fn new<B: WidgetBackend + 'static>(backend: Rc<RefCell<B>>, config: BridgeConfig) -> Self {
        Self::with_clock(backend, config, Rc::new(SystemClock))
    }

    /// Session on a caller-supplied clock.
    pub fn with_clock<B: WidgetBackend + 'static>(
        backend: Rc<RefCell<B>>,
        config: BridgeConfig,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            source: SourceTree::new(),
            bridge: Bridge::new(),
            focus: FocusBridge::new(),
            keyboard: KeyboardBridge::new(&config),
            scheduler: RenderScheduler::new(config.target_fps),
            ev: EventLoop::new(clock),
            screen: None,
            backend,
            running: false,
            config,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn source(&self) -> &SourceTree {
        &self.source
    }

    /// The tree the framework mutates. Changes are picked up on the next
    /// [`flush_mutations`](Self::flush_mutations).
    pub fn source_mut(&mut self) -> &mut SourceTree {
        &mut self.source
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn targets(&self) -> &TargetTree {
        self.bridge.targets()
    }

    pub fn target_of(&self, node: NodeId) -> Option<TargetId> {
        self.bridge.target_of(node)
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.ev
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Replace the pre-frame flush hook.
    pub fn set_flush_hook(&mut self, hook: impl FnMut() + 'static) {
        self.scheduler.set_flush_hook(Box::new(hook));
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Ask [`run`](Self::run) to return after the current iteration.
    pub fn stop(&mut self) {
        self.running = false;
    }

    // =========================================================================
    // Mounting and observation
    // =========================================================================

    /// Mount a source subtree under `parent` (`None` for the screen).
    ///
    /// Returns the top-level targets created.
    pub fn mount_subtree(&mut self, node: NodeId, parent: Option<TargetId>) -> Result<Vec<TargetId>> {
        self.flush_mutations()?;

        let mut out = SyncOutcome::default();
        {
            let mut backend = self.backend.borrow_mut();
            self.bridge
                .mount_subtree(&mut self.source, node, parent, &mut *backend, &mut out)?;
        }
        let roots = out.roots.clone();
        self.after_sync(&out)?;
        Ok(roots)
    }

    /// Reconcile future mutations under `root`.
    pub fn observe_subtree(&mut self, root: NodeId) {
        self.bridge.observe(root);
    }

    /// Create the screen, mount `root` and observe it.
    ///
    /// On failure the terminal is restored before the error is returned.
    pub fn mount_app(&mut self, root: NodeId) -> Result<Vec<TargetId>> {
        match self.start(root) {
            Ok(roots) => {
                self.running = true;
                Ok(roots)
            }
            Err(err) => {
                warn!(%err, "mount failed, restoring terminal");
                if let Err(restore_err) = self.destroy_screen() {
                    warn!(%restore_err, "terminal restore failed");
                }
                Err(err)
            }
        }
    }

    fn start(&mut self, root: NodeId) -> Result<Vec<TargetId>> {
        self.create_screen()?;
        // Observed only after mounting: records from building the tree predate it
        let roots = self.mount_subtree(root, None)?;
        self.observe_subtree(root);
        Ok(roots)
    }

    /// Drain pending mutation records into the bridge, then release
    /// destroyed source subtrees.
    pub fn flush_mutations(&mut self) -> Result<SyncOutcome> {
        if !self.source.has_pending_records() {
            self.source.sweep();
            return Ok(SyncOutcome::default());
        }
        let records = self.source.take_records();
        trace!(count = records.len(), "flushing mutations");
        let out = {
            let mut backend = self.backend.borrow_mut();
            self.bridge.apply_records(&mut self.source, records, &mut *backend)?
        };
        let released = self.source.sweep();
        if released > 0 {
            trace!(released, "source nodes released");
        }
        self.after_sync(&out)?;
        Ok(out)
    }

    /// Focus bookkeeping and repaint requests for what a sync changed.
    fn after_sync(&mut self, out: &SyncOutcome) -> Result<()> {
        let orphaned = if out.destroyed.is_empty() {
            None
        } else {
            self.focus.forget(&out.destroyed)
        };
        for &target in &out.focusable {
            self.focus.register(target);
        }
        if let Some(node) = orphaned {
            self.refocus_rebuilt(node)?;
        }
        for &target in &out.autofocus {
            if let Some(node) = self.bridge.source_of(target) {
                self.ev
                    .set_timeout(self.config.focus_settle_delay, Task::DeferredFocus(node));
            }
        }

        let mut dirty: Vec<ElementId> = out.dirty().into_iter().map(ElementId::from).collect();
        if dirty.is_empty() && !out.destroyed.is_empty() {
            // Only removals: nothing left to name but the vacated screen area
            dirty.push(ElementId::new(SCREEN_ELEMENT));
        }
        if !dirty.is_empty() {
            self.scheduler.schedule_batch(
                dirty.into_iter().map(|id| (id, Priority::Normal)),
                &mut self.ev,
            );
        }
        Ok(())
    }

    /// The focused node's target was destroyed. A rebuild that mounted the
    /// node again keeps focus on the new widget; otherwise the node is
    /// blurred, or dropped silently once it left the source tree.
    fn refocus_rebuilt(&mut self, node: NodeId) -> Result<()> {
        let remounted = self
            .bridge
            .target_of(node)
            .and_then(|t| self.bridge.targets().get(t))
            .map(|t| (t.id, t.handle));

        match remounted {
            Some((target, handle)) => {
                debug!(%node, %target, "focus kept across rebuild");
                if let Some(handle) = handle {
                    self.backend.borrow_mut().focus(handle)?;
                }
                self.focus.retarget(target);
                self.schedule_render(target, Priority::High);
            }
            None if self.source.contains(node) => {
                debug!(%node, "focused node unmounted");
                self.focus.blur(&self.source);
            }
            None => self.focus.release(),
        }
        Ok(())
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    pub fn schedule_render(&mut self, element_id: impl Into<ElementId>, priority: Priority) {
        self.scheduler.schedule_render(element_id, priority, &mut self.ev);
    }

    pub fn schedule_batch<I, E>(&mut self, requests: I)
    where
        I: IntoIterator<Item = (E, Priority)>,
        E: Into<ElementId>,
    {
        self.scheduler.schedule_batch(requests, &mut self.ev);
    }

    /// Draw now. Pending mutations are applied first.
    pub fn render_immediate(&mut self, element_id: Option<ElementId>) -> Result<()> {
        self.flush_mutations()?;
        self.scheduler.render_immediate(element_id, &mut self.ev)
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume(&mut self.ev);
    }

    pub fn render_stats(&self) -> SchedulerStats {
        self.scheduler.stats(self.ev.now())
    }

    pub fn set_max_fps(&mut self, fps: u32) {
        self.scheduler.set_max_fps(fps);
    }

    // =========================================================================
    // Screen
    // =========================================================================

    /// Create the screen if it does not exist yet.
    pub fn create_screen(&mut self) -> Result<&Screen> {
        if self.screen.is_none() {
            let screen = Screen::create(&self.backend, &mut self.scheduler, &self.config, self.ev.clock())?;
            self.screen = Some(screen);
        }
        self.screen
            .as_ref()
            .ok_or_else(|| BridgeError::Backend("screen unavailable".into()))
    }

    pub fn screen(&self) -> Option<&Screen> {
        self.screen.as_ref()
    }

    /// Restore the terminal, reset scheduling and forget recent keys.
    /// No-op without a screen.
    pub fn destroy_screen(&mut self) -> Result<()> {
        match self.screen.take() {
            Some(screen) => {
                self.keyboard.reset();
                screen.destroy(&self.backend, &mut self.scheduler, &mut self.ev)
            }
            None => Ok(()),
        }
    }

    /// Request a paint of `element_id` (default: the whole screen).
    ///
    /// Goes through the scheduler once the screen is wired, draws directly
    /// otherwise.
    pub fn render_screen(&mut self, priority: Priority, element_id: Option<ElementId>) -> Result<()> {
        if self.scheduler.has_render_callback() {
            let id = element_id.unwrap_or_else(|| ElementId::new(SCREEN_ELEMENT));
            self.scheduler.schedule_render(id, priority, &mut self.ev);
            Ok(())
        } else {
            self.backend.borrow_mut().render()
        }
    }

    // =========================================================================
    // Focus
    // =========================================================================

    /// Give terminal focus to a mounted node.
    ///
    /// Returns `false` if it already had focus.
    pub fn focus_element(&mut self, node: NodeId) -> Result<bool> {
        let target = self.bridge.target_of(node).ok_or(BridgeError::UnknownNode(node))?;
        let handle = self
            .bridge
            .targets()
            .get(target)
            .ok_or(BridgeError::UnknownTarget(target))?
            .handle;
        if let Some(handle) = handle {
            self.backend.borrow_mut().focus(handle)?;
        }
        let changed = self.focus.focus(&self.source, node, target);
        if changed {
            self.schedule_render(target, Priority::High);
        }
        Ok(changed)
    }

    /// Clear focus. Returns `false` if nothing was focused.
    pub fn blur(&mut self) -> bool {
        let previous = self.focus.focused_target();
        let blurred = self.focus.blur(&self.source);
        if let Some(target) = previous.filter(|_| blurred) {
            self.schedule_render(target, Priority::High);
        }
        blurred
    }

    pub fn focused_element(&self) -> Option<NodeId> {
        self.focus.focused_node()
    }

    pub fn has_focus(&self) -> bool {
        self.focus.has_focus()
    }

    /// Reactive handle on the focused target.
    pub fn focus_signal(&self) -> Signal<Option<TargetId>> {
        self.focus.focus_signal()
    }

    /// Move focus to the next (or previous) focusable target, wrapping.
    pub fn focus_next(&mut self, forward: bool) -> Result<bool> {
        let order = self.focus.cycle_order(self.bridge.targets());
        let Some(target) = self.focus.next_in(&order, forward) else {
            return Ok(false);
        };
        match self.bridge.source_of(target) {
            Some(node) => self.focus_element(node),
            None => Ok(false),
        }
    }

    // =========================================================================
    // Terminal events
    // =========================================================================

    /// React to one event from the terminal or the backend.
    pub fn handle_terminal_event(&mut self, event: TerminalEvent) -> Result<()> {
        match event {
            TerminalEvent::Key(raw) => {
                self.handle_key(&raw)?;
            }
            TerminalEvent::Resize(cols, rows) => {
                if let Some(screen) = self.screen.as_mut() {
                    screen.resize(cols, rows);
                    debug!(cols, rows, "resized");
                    self.render_screen(Priority::High, None)?;
                }
            }
            TerminalEvent::Focus(handle) => self.on_backend_focus(handle),
            TerminalEvent::Blur(handle) => {
                let focused_handle = self
                    .focus
                    .focused_target()
                    .and_then(|t| self.bridge.targets().get(t))
                    .and_then(|t| t.handle);
                if focused_handle == Some(handle) {
                    self.blur();
                }
            }
        }
        Ok(())
    }

    /// Route one raw key: exit bindings, then the focused node, then Tab
    /// cycling.
    pub fn handle_key(&mut self, raw: &RawKeyEvent) -> Result<KeyOutcome> {
        self.flush_mutations()?;

        if let Some(binding) = self.config.exit_keys.iter().find(|b| matches_binding(raw, b)) {
            debug!(binding = %binding, "exit key");
            self.stop();
            return Ok(KeyOutcome::Exit);
        }

        let now = self.ev.now();
        let outcome = self
            .keyboard
            .dispatch(raw, now, &self.source, self.focus.focused_node());

        let tab = match &outcome {
            KeyOutcome::Dispatched { key, cancelled: false } | KeyOutcome::Unfocused(key) => {
                key.code == "Tab"
            }
            _ => false,
        };
        if tab {
            self.focus_next(!raw.modifiers.contains(Modifiers::SHIFT))?;
        }
        Ok(outcome)
    }

    /// The backend moved focus by itself; mirror it without calling back.
    fn on_backend_focus(&mut self, handle: WidgetHandle) {
        let Some(target) = self.bridge.targets().find_by_handle(handle) else {
            trace!(%handle, "focus on unknown widget");
            return;
        };
        if let Some(node) = self.bridge.source_of(target) {
            if self.focus.focus(&self.source, node, target) {
                self.schedule_render(target, Priority::High);
            }
        }
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Run every task that is due, flushing mutations before each one.
    ///
    /// Returns the number of tasks run. Render errors stop the drain and
    /// propagate.
    pub fn run_pending(&mut self) -> Result<usize> {
        let mut ran = 0;
        loop {
            self.flush_mutations()?;
            let Some(task) = self.ev.next_task() else {
                break;
            };
            self.run_task(task)?;
            ran += 1;
        }
        Ok(ran)
    }

    fn run_task(&mut self, task: Task) -> Result<()> {
        match task {
            Task::FrameTimer => {
                self.scheduler.on_frame_timer(&mut self.ev);
                Ok(())
            }
            Task::ProcessFrame => self.scheduler.process_frame(&mut self.ev),
            Task::DeferredFocus(node) => {
                let live = self
                    .bridge
                    .target_of(node)
                    .is_some_and(|t| self.bridge.targets().contains(t));
                if !live {
                    trace!(%node, "deferred focus on destroyed node");
                    return Ok(());
                }
                self.focus_element(node).map(|_| ())
            }
        }
    }

    /// Blocking loop: terminal input plus scheduled tasks until an exit key
    /// or [`stop`](Self::stop). The screen is destroyed on the way out.
    pub fn run(&mut self) -> Result<()> {
        self.running = true;
        let result = self.drive();
        let restored = self.destroy_screen();
        result.and(restored)
    }

    fn drive(&mut self) -> Result<()> {
        while self.running {
            self.run_pending()?;
            if !self.running {
                break;
            }

            let now = self.ev.now();
            let timeout = self
                .ev
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL);

            if let Some(event) = poll_event(timeout)? {
                self.handle_terminal_event(event)?;
            }
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.destroy_screen() {
            warn!(%err, "terminal restore on drop failed");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
