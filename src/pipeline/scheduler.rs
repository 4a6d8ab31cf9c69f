//! Render Scheduler - frame-rate-limited drain loop over the [`RenderQueue`].
//!
//! # States
//!
//! ```text
//!            schedule_render            timer / microtask
//!   Idle ─────────────────────► Scheduled ─────────────────► Draining
//!    ▲                                                          │
//!    └──────────── re-arm if still dirty ◄──────────────────────┘
//! ```
//!
//! `paused` is orthogonal: while set no frame arms, and a frame that was
//! already armed finds nothing to do. Work accrued while paused stays queued
//! and is flushed on [`RenderScheduler::resume`].
//!
//! # Pacing
//!
//! When the last frame is at least one interval (`1000 / fps` ms) old the
//! frame runs on the next microtask. Otherwise a timer covers the remainder
//! and its expiry hops to a microtask before draining. Either way a
//! synchronous batch of mutations settles completely before the frame runs.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::{clamp_fps, frame_interval};
use crate::error::Result;
use crate::types::{ElementId, Priority};
use super::event_loop::{EventLoop, Task, TimerId};
use super::queue::{QueueStats, RenderQueue, RenderRequest};

/// Receives the element ids of each frame and performs the draw.
pub type RenderCallback = Box<dyn FnMut(&[ElementId]) -> Result<()>>;

/// Forces the host framework to apply pending state before a frame.
pub type FlushHook = Box<dyn FnMut()>;

/// Largest batch drained per frame at or below 60 FPS.
const BATCH_SIZE_STANDARD: usize = 50;
/// Largest batch drained per frame above 60 FPS.
const BATCH_SIZE_HIGH_FPS: usize = 20;

/// Window for the rolling FPS figure.
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Scheduled,
    Draining,
}

/// Performance counters for [`RenderScheduler::stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStats {
    pub frame_count: u64,
    /// Frames drawn during the last second.
    pub average_fps: f64,
    pub average_render_time: Duration,
    pub total_render_time: Duration,
    pub queued: usize,
    pub paused: bool,
    pub state: SchedulerState,
    pub target_fps: u32,
    pub queue: QueueStats,
}

/// Paced, priority-ordered render loop.
pub struct RenderScheduler {
    queue: RenderQueue,
    dirty: HashSet<ElementId>,
    state: SchedulerState,
    paused: bool,
    target_fps: u32,
    frame_interval: Duration,
    last_render: Option<Instant>,
    pending_timer: Option<TimerId>,

    frame_count: u64,
    total_render_time: Duration,
    recent_frames: VecDeque<Instant>,

    render_callback: Option<RenderCallback>,
    flush_hook: FlushHook,
}

impl RenderScheduler {
    pub fn new(target_fps: u32) -> Self {
        let target_fps = clamp_fps(target_fps);
        Self {
            queue: RenderQueue::new(),
            dirty: HashSet::new(),
            state: SchedulerState::Idle,
            paused: false,
            target_fps,
            frame_interval: frame_interval(target_fps),
            last_render: None,
            pending_timer: None,
            frame_count: 0,
            total_render_time: Duration::ZERO,
            recent_frames: VecDeque::new(),
            render_callback: None,
            flush_hook: Box::new(|| {
                spark_signals::flush_sync();
            }),
        }
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    pub fn set_render_callback(&mut self, callback: RenderCallback) {
        self.render_callback = Some(callback);
    }

    pub fn has_render_callback(&self) -> bool {
        self.render_callback.is_some()
    }

    /// Replace the pre-frame flush (defaults to `spark_signals::flush_sync`).
    pub fn set_flush_hook(&mut self, hook: FlushHook) {
        self.flush_hook = hook;
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Queue one element and arm a frame.
    pub fn schedule_render(&mut self, element_id: impl Into<ElementId>, priority: Priority, ev: &mut EventLoop) {
        let element_id = element_id.into();
        trace!(element = %element_id, %priority, "schedule render");
        self.queue
            .add(RenderRequest::new(element_id.clone(), priority, ev.now()));
        self.dirty.insert(element_id);
        self.arm_frame(ev);
    }

    /// Queue several elements and arm a single frame.
    pub fn schedule_batch<I, E>(&mut self, requests: I, ev: &mut EventLoop)
    where
        I: IntoIterator<Item = (E, Priority)>,
        E: Into<ElementId>,
    {
        let now = ev.now();
        for (element_id, priority) in requests {
            let element_id = element_id.into();
            self.queue
                .add(RenderRequest::new(element_id.clone(), priority, now));
            self.dirty.insert(element_id);
        }
        self.arm_frame(ev);
    }

    fn arm_frame(&mut self, ev: &mut EventLoop) {
        if self.paused || self.state != SchedulerState::Idle || self.dirty.is_empty() {
            return;
        }
        self.state = SchedulerState::Scheduled;

        let now = ev.now();
        match self.last_render.map(|t| now.saturating_duration_since(t)) {
            Some(elapsed) if elapsed < self.frame_interval => {
                let remaining = self.frame_interval - elapsed;
                trace!(?remaining, "frame armed on timer");
                self.pending_timer = Some(ev.set_timeout(remaining, Task::FrameTimer));
            }
            _ => {
                trace!("frame armed on microtask");
                ev.queue_microtask(Task::ProcessFrame);
            }
        }
    }

    /// Pacing timer expired: drain on the next microtask.
    pub fn on_frame_timer(&mut self, ev: &mut EventLoop) {
        self.pending_timer = None;
        ev.queue_microtask(Task::ProcessFrame);
    }

    /// Drain one batch and hand it to the render callback.
    ///
    /// Callback errors are returned after the scheduler is back to idle and
    /// the next frame is armed for whatever is still queued.
    pub fn process_frame(&mut self, ev: &mut EventLoop) -> Result<()> {
        if self.paused || self.dirty.is_empty() {
            self.state = SchedulerState::Idle;
            return Ok(());
        }
        self.state = SchedulerState::Draining;

        let ids: Vec<ElementId> = self
            .queue
            .get_next_batch(self.batch_size())
            .into_iter()
            .map(|r| r.element_id)
            .collect();

        let result = self.run_render(&ids, ev);

        for id in &ids {
            self.dirty.remove(id);
        }
        if self.queue.is_empty() {
            // Nothing left to drain for whatever is still marked.
            self.dirty.clear();
        }
        self.state = SchedulerState::Idle;
        // Leftover work gets its frame even when this one failed
        self.arm_frame(ev);
        result
    }

    /// Render now, bypassing pacing.
    ///
    /// With an id, only that element's work is drawn (and dequeued). Without
    /// one, everything queued is drained into a single forced frame.
    pub fn render_immediate(&mut self, element_id: Option<ElementId>, ev: &mut EventLoop) -> Result<()> {
        let ids = match element_id {
            Some(id) => {
                self.queue.remove(&id);
                self.dirty.remove(&id);
                vec![id]
            }
            None => {
                self.dirty.clear();
                self.queue
                    .get_next_batch(usize::MAX)
                    .into_iter()
                    .map(|r| r.element_id)
                    .collect()
            }
        };
        self.run_render(&ids, ev)
    }

    fn run_render(&mut self, ids: &[ElementId], ev: &EventLoop) -> Result<()> {
        (self.flush_hook)();

        let start = ev.now();
        let result = match self.render_callback.as_mut() {
            Some(callback) => callback(ids),
            None => Ok(()),
        };
        let end = ev.now();

        let elapsed = end.saturating_duration_since(start);
        self.frame_count += 1;
        self.total_render_time += elapsed;
        self.last_render = Some(end);
        self.recent_frames.push_back(end);
        while let Some(&oldest) = self.recent_frames.front() {
            if end.saturating_duration_since(oldest) > FPS_WINDOW {
                self.recent_frames.pop_front();
            } else {
                break;
            }
        }

        debug!(frame = self.frame_count, elements = ids.len(), ?elapsed, "frame rendered");
        result
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Stop arming frames. Queued work is kept.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Allow frames again, arming one if work accrued while paused.
    pub fn resume(&mut self, ev: &mut EventLoop) {
        self.paused = false;
        self.arm_frame(ev);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Change the frame rate (clamped to 1..=120).
    pub fn set_max_fps(&mut self, fps: u32) {
        self.target_fps = clamp_fps(fps);
        self.frame_interval = frame_interval(self.target_fps);
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_dirty(&self, element_id: &ElementId) -> bool {
        self.dirty.contains(element_id)
    }

    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    fn batch_size(&self) -> usize {
        if self.target_fps > 60 {
            BATCH_SIZE_HIGH_FPS
        } else {
            BATCH_SIZE_STANDARD
        }
    }

    pub fn stats(&self, now: Instant) -> SchedulerStats {
        let average_fps = self
            .recent_frames
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) <= FPS_WINDOW)
            .count() as f64;
        let average_render_time = if self.frame_count == 0 {
            Duration::ZERO
        } else {
            self.total_render_time / self.frame_count as u32
        };

        SchedulerStats {
            frame_count: self.frame_count,
            average_fps,
            average_render_time,
            total_render_time: self.total_render_time,
            queued: self.queue.len(),
            paused: self.paused,
            state: self.state,
            target_fps: self.target_fps,
            queue: self.queue.stats(now),
        }
    }

    /// Drop all queued work, counters and the render callback.
    pub fn reset(&mut self, ev: &mut EventLoop) {
        if let Some(timer) = self.pending_timer.take() {
            ev.clear_timeout(timer);
        }
        self.queue.clear();
        self.dirty.clear();
        self.state = SchedulerState::Idle;
        self.paused = false;
        self.last_render = None;
        self.frame_count = 0;
        self.total_render_time = Duration::ZERO;
        self.recent_frames.clear();
        self.render_callback = None;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event_loop::{Clock, ManualClock};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type Frames = Rc<RefCell<Vec<Vec<String>>>>;

    fn setup(fps: u32) -> (ManualClock, EventLoop, RenderScheduler, Frames) {
        let clock = ManualClock::new();
        let ev = EventLoop::new(Rc::new(clock.clone()));
        let mut scheduler = RenderScheduler::new(fps);
        scheduler.set_flush_hook(Box::new(|| {}));

        let frames: Frames = Rc::new(RefCell::new(Vec::new()));
        let sink = frames.clone();
        scheduler.set_render_callback(Box::new(move |ids| {
            sink.borrow_mut()
                .push(ids.iter().map(|id| id.to_string()).collect());
            Ok(())
        }));
        (clock, ev, scheduler, frames)
    }

    /// Run every task that is due right now.
    fn drive(scheduler: &mut RenderScheduler, ev: &mut EventLoop) {
        while let Some(task) = ev.next_task() {
            match task {
                Task::FrameTimer => scheduler.on_frame_timer(ev),
                Task::ProcessFrame => scheduler.process_frame(ev).unwrap(),
                Task::DeferredFocus(_) => {}
            }
        }
    }

    #[test]
    fn test_synchronous_burst_is_one_frame() {
        let (_clock, mut ev, mut scheduler, frames) = setup(30);

        for id in ["a", "b", "c", "d", "e"] {
            scheduler.schedule_render(id, Priority::Normal, &mut ev);
        }
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);
        assert!(frames.borrow().is_empty());

        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(frames.borrow()[0], vec!["a", "b", "c", "d", "e"]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_requests_inside_interval_wait_for_timer() {
        let (clock, mut ev, mut scheduler, frames) = setup(30);
        scheduler.schedule_render("warmup", Priority::Normal, &mut ev);
        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow().len(), 1);

        for (i, id) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            if i > 0 {
                clock.advance(Duration::from_millis(2));
            }
            scheduler.schedule_render(id, Priority::Normal, &mut ev);
            drive(&mut scheduler, &mut ev);
        }
        assert_eq!(frames.borrow().len(), 1);

        clock.advance(Duration::from_millis(33) - Duration::from_millis(8));
        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow().len(), 1);

        clock.advance(Duration::from_millis(1));
        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow().len(), 2);
        assert_eq!(frames.borrow()[1], vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_priority_order_within_frame() {
        let (_clock, mut ev, mut scheduler, frames) = setup(60);
        scheduler.schedule_render("a", Priority::Low, &mut ev);
        scheduler.schedule_render("b", Priority::Immediate, &mut ev);
        scheduler.schedule_render("a", Priority::High, &mut ev);

        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow()[0], vec!["b", "a"]);
    }

    #[test]
    fn test_every_request_is_eventually_rendered() {
        let (clock, mut ev, mut scheduler, frames) = setup(120);
        for i in 0..75 {
            scheduler.schedule_render(format!("e{i}"), Priority::Normal, &mut ev);
        }

        for _ in 0..10 {
            drive(&mut scheduler, &mut ev);
            clock.advance(Duration::from_millis(10));
        }

        let rendered: HashSet<String> = frames.borrow().iter().flatten().cloned().collect();
        assert_eq!(rendered.len(), 75);
        assert!(frames.borrow().iter().all(|f| f.len() <= BATCH_SIZE_HIGH_FPS));
        assert!(frames.borrow().len() >= 4);
    }

    #[test]
    fn test_pause_holds_work_until_resume() {
        let (clock, mut ev, mut scheduler, frames) = setup(60);
        scheduler.pause();

        scheduler.schedule_render("a", Priority::Immediate, &mut ev);
        scheduler.schedule_batch([("b", Priority::Low)], &mut ev);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(!ev.has_pending());

        clock.advance(Duration::from_secs(1));
        drive(&mut scheduler, &mut ev);
        assert!(frames.borrow().is_empty());
        assert_eq!(scheduler.stats(clock.now()).queued, 2);

        scheduler.resume(&mut ev);
        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow().as_slice(), &[vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_pause_after_arming_skips_frame() {
        let (_clock, mut ev, mut scheduler, frames) = setup(60);
        scheduler.schedule_render("a", Priority::Normal, &mut ev);
        scheduler.pause();

        drive(&mut scheduler, &mut ev);
        assert!(frames.borrow().is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.resume(&mut ev);
        drive(&mut scheduler, &mut ev);
        assert_eq!(frames.borrow().len(), 1);
    }

    #[test]
    fn test_resume_without_work_does_not_arm() {
        let (_clock, mut ev, mut scheduler, _frames) = setup(60);
        scheduler.pause();
        scheduler.resume(&mut ev);
        assert!(!ev.has_pending());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_render_immediate_single_element() {
        let (_clock, mut ev, mut scheduler, frames) = setup(60);
        scheduler.pause();
        scheduler.schedule_render("a", Priority::Normal, &mut ev);
        scheduler.schedule_render("b", Priority::Normal, &mut ev);

        scheduler.render_immediate(Some("a".into()), &mut ev).unwrap();
        assert_eq!(frames.borrow().as_slice(), &[vec!["a".to_string()]]);
        assert!(!scheduler.is_dirty(&"a".into()));
        assert!(scheduler.is_dirty(&"b".into()));
        assert_eq!(scheduler.queue().len(), 1);
    }

    #[test]
    fn test_render_immediate_full_frame() {
        let (_clock, mut ev, mut scheduler, frames) = setup(60);
        scheduler.render_immediate(None, &mut ev).unwrap();
        assert_eq!(frames.borrow().as_slice(), &[Vec::<String>::new()]);

        scheduler.pause();
        scheduler.schedule_render("x", Priority::Low, &mut ev);
        scheduler.render_immediate(None, &mut ev).unwrap();
        assert_eq!(frames.borrow()[1], vec!["x"]);
        assert!(scheduler.queue().is_empty());
    }

    #[test]
    fn test_set_max_fps_clamps() {
        let mut scheduler = RenderScheduler::new(60);
        scheduler.set_max_fps(0);
        assert_eq!(scheduler.target_fps(), 1);
        assert_eq!(scheduler.frame_interval(), Duration::from_secs(1));

        scheduler.set_max_fps(1000);
        assert_eq!(scheduler.target_fps(), 120);
        assert_eq!(scheduler.batch_size(), BATCH_SIZE_HIGH_FPS);

        scheduler.set_max_fps(60);
        assert_eq!(scheduler.batch_size(), BATCH_SIZE_STANDARD);
    }

    #[test]
    fn test_flush_hook_runs_before_each_frame() {
        let (_clock, mut ev, mut scheduler, _frames) = setup(60);
        let flushes = Rc::new(Cell::new(0));
        let counter = flushes.clone();
        scheduler.set_flush_hook(Box::new(move || counter.set(counter.get() + 1)));

        scheduler.schedule_render("a", Priority::Normal, &mut ev);
        drive(&mut scheduler, &mut ev);
        scheduler.render_immediate(None, &mut ev).unwrap();
        assert_eq!(flushes.get(), 2);
    }

    #[test]
    fn test_callback_error_propagates() {
        let clock = ManualClock::new();
        let mut ev = EventLoop::new(Rc::new(clock.clone()));
        let mut scheduler = RenderScheduler::new(60);
        scheduler.set_flush_hook(Box::new(|| {}));
        scheduler.set_render_callback(Box::new(|_| {
            Err(crate::error::BridgeError::Render("boom".into()))
        }));

        scheduler.schedule_render("a", Priority::Normal, &mut ev);
        assert_eq!(ev.next_task(), Some(Task::ProcessFrame));
        assert!(scheduler.process_frame(&mut ev).is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_leftover_work_drains_after_failed_frame() {
        let clock = ManualClock::new();
        let mut ev = EventLoop::new(Rc::new(clock.clone()));
        let mut scheduler = RenderScheduler::new(60);
        scheduler.set_flush_hook(Box::new(|| {}));
        let failing = Rc::new(Cell::new(true));
        let drawn = Rc::new(Cell::new(0usize));
        {
            let failing = failing.clone();
            let drawn = drawn.clone();
            scheduler.set_render_callback(Box::new(move |ids| {
                if failing.get() {
                    return Err(crate::error::BridgeError::Render("boom".into()));
                }
                drawn.set(drawn.get() + ids.len());
                Ok(())
            }));
        }

        scheduler.schedule_batch((0..60).map(|i| (format!("e{i}"), Priority::Normal)), &mut ev);
        assert_eq!(ev.next_task(), Some(Task::ProcessFrame));
        assert!(scheduler.process_frame(&mut ev).is_err());
        assert_eq!(scheduler.queue().len(), 10);
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);

        failing.set(false);
        clock.advance(Duration::from_millis(20));
        drive(&mut scheduler, &mut ev);
        assert_eq!(drawn.get(), 10);
        assert!(scheduler.queue().is_empty());
    }

    #[test]
    fn test_stats_and_reset() {
        let (clock, mut ev, mut scheduler, _frames) = setup(60);
        scheduler.schedule_render("a", Priority::Normal, &mut ev);
        drive(&mut scheduler, &mut ev);
        scheduler.schedule_render("b", Priority::High, &mut ev);

        let stats = scheduler.stats(clock.now());
        assert_eq!(stats.frame_count, 1);
        assert_eq!(stats.average_fps, 1.0);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.queue.high, 1);
        assert!(!stats.paused);

        scheduler.reset(&mut ev);
        let stats = scheduler.stats(clock.now());
        assert_eq!(stats.frame_count, 0);
        assert_eq!(stats.queued, 0);
        assert!(!scheduler.has_render_callback());
        assert!(!ev.has_pending());
    }
}
