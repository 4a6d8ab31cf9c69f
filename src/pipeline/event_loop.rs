//! Single-threaded event loop primitive.
//!
//! A monotonic [`Clock`], a min-deadline timer heap and a microtask FIFO.
//! Tasks are plain data ([`Task`]); the [`Session`](crate::session::Session)
//! owns the loop and decides what each task does.
//!
//! Ordering rules:
//! - microtasks always run before any timer,
//! - timers fire in deadline order, ties in the order they were set,
//! - a timer never fires before its deadline on the loop's clock.
//!
//! ```text
//! set_timeout(remaining, FrameTimer) ──► deadline passes ──► FrameTimer
//!                                                              │
//!                              queue_microtask(ProcessFrame) ◄─┘
//! ```

use std::cell::Cell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::types::NodeId;

// =============================================================================
// Clock
// =============================================================================

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Clones share the same time, so a test can keep one and give another to
/// the session.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Work the session can defer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// The scheduler's pacing timer expired; hop to a microtask.
    FrameTimer,
    /// Drain one frame from the render queue.
    ProcessFrame,
    /// Give terminal focus to a node once its widget has settled.
    DeferredFocus(NodeId),
}

/// Identifies a pending timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Timer {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

// =============================================================================
// Event Loop
// =============================================================================

/// Timer heap plus microtask queue over a shared clock.
pub struct EventLoop {
    clock: Rc<dyn Clock>,
    microtasks: VecDeque<Task>,
    timers: BinaryHeap<Reverse<Timer>>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl EventLoop {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            microtasks: VecDeque::new(),
            timers: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Current time on the loop's clock.
    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Shared handle to the clock.
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    /// Run `task` after everything currently executing, before any timer.
    pub fn queue_microtask(&mut self, task: Task) {
        self.microtasks.push_back(task);
    }

    /// Run `task` once `delay` has elapsed.
    pub fn set_timeout(&mut self, delay: Duration, task: Task) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Reverse(Timer {
            deadline: self.now() + delay,
            seq,
            task,
        }));
        TimerId(seq)
    }

    /// Cancel a timer. No-op if it already fired.
    pub fn clear_timeout(&mut self, id: TimerId) {
        if self.timers.iter().any(|Reverse(t)| t.seq == id.0) {
            self.cancelled.insert(id.0);
        }
    }

    /// Pop the next runnable task: microtasks first, then due timers.
    pub fn next_task(&mut self) -> Option<Task> {
        if let Some(task) = self.microtasks.pop_front() {
            return Some(task);
        }

        let now = self.now();
        while let Some(Reverse(top)) = self.timers.peek() {
            if top.deadline > now {
                return None;
            }
            let Some(Reverse(timer)) = self.timers.pop() else {
                return None;
            };
            if self.cancelled.remove(&timer.seq) {
                continue;
            }
            return Some(timer.task);
        }
        None
    }

    /// When the loop next has work: now if microtasks are queued, else the
    /// earliest timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.microtasks.is_empty() {
            return Some(self.now());
        }
        self.timers
            .iter()
            .filter(|Reverse(t)| !self.cancelled.contains(&t.seq))
            .map(|Reverse(t)| t.deadline)
            .min()
    }

    /// True if any microtask or live timer is pending.
    pub fn has_pending(&self) -> bool {
        !self.microtasks.is_empty() || self.timers.len() > self.cancelled.len()
    }

    /// Number of live timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.len() - self.cancelled.len()
    }
}
