//! Screen - the one terminal surface of a session.
//!
//! Creating the screen puts the terminal into the state the bridge needs
//! (exit bindings, mouse reporting, raw mode) and wires the scheduler's
//! render callback to [`WidgetBackend::render`]. From then on every frame
//! the scheduler drains ends in exactly one backend paint.
//!
//! # Example
//!
//! ```ignore
//! let screen = Screen::create(&backend, &mut scheduler, &config, ev.clock())?;
//! // ... frames ...
//! screen.destroy(&backend, &mut scheduler, &mut ev)?;
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{BridgeConfig, FALLBACK_SIZE};
use crate::error::Result;
use crate::renderer::WidgetBackend;

use super::event_loop::{Clock, EventLoop};
use super::scheduler::RenderScheduler;

/// Backend shared between the session and the render callback.
pub type SharedBackend = Rc<RefCell<dyn WidgetBackend>>;

/// Paint timings, recorded when perf monitoring is on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenPerf {
    pub frames: u64,
    pub total_render_time: Duration,
    pub last_render_time: Option<Duration>,
    /// Element ids in the last frame.
    pub last_batch: usize,
}

impl ScreenPerf {
    fn record(&mut self, elapsed: Duration, batch: usize) {
        self.frames += 1;
        self.total_render_time += elapsed;
        self.last_render_time = Some(elapsed);
        self.last_batch = batch;
    }

    pub fn average_render_time(&self) -> Duration {
        if self.frames == 0 {
            Duration::ZERO
        } else {
            self.total_render_time / self.frames as u32
        }
    }
}

/// Live terminal surface.
#[derive(Debug)]
pub struct Screen {
    size: (u16, u16),
    perf: Rc<RefCell<ScreenPerf>>,
}

/// Terminal size, or 80×24 when the backend cannot tell or reports zero.
fn usable_size(backend: &dyn WidgetBackend) -> (u16, u16) {
    match backend.size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => (cols, rows),
        Ok(size) => {
            warn!(?size, "degenerate terminal size, using fallback");
            FALLBACK_SIZE
        }
        Err(err) => {
            warn!(%err, "terminal size unavailable, using fallback");
            FALLBACK_SIZE
        }
    }
}

impl Screen {
    /// Prepare the terminal and wire the scheduler to it.
    pub fn create(
        backend: &SharedBackend,
        scheduler: &mut RenderScheduler,
        config: &BridgeConfig,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        let size = {
            let mut b = backend.borrow_mut();
            let size = usable_size(&*b);
            b.bind_exit_keys(&config.exit_keys)?;
            b.set_mouse(true)?;
            b.set_raw_mode(true)?;
            size
        };

        let perf = Rc::new(RefCell::new(ScreenPerf::default()));
        let monitoring = config.perf_monitoring;
        let paint_backend = Rc::clone(backend);
        let paint_perf = Rc::clone(&perf);
        scheduler.set_render_callback(Box::new(move |batch| {
            let started = clock.now();
            paint_backend.borrow_mut().render()?;
            if monitoring {
                let elapsed = clock.now().saturating_duration_since(started);
                paint_perf.borrow_mut().record(elapsed, batch.len());
            }
            Ok(())
        }));

        debug!(cols = size.0, rows = size.1, "screen created");
        Ok(Self { size, perf })
    }

    /// Cached terminal size as (columns, rows).
    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    /// Update the cached size. Zero dimensions fall back to 80×24.
    pub(crate) fn resize(&mut self, cols: u16, rows: u16) {
        self.size = if cols > 0 && rows > 0 { (cols, rows) } else { FALLBACK_SIZE };
    }

    pub fn perf(&self) -> ScreenPerf {
        self.perf.borrow().clone()
    }

    /// Unwire the scheduler and give the terminal back.
    pub fn destroy(self, backend: &SharedBackend, scheduler: &mut RenderScheduler, ev: &mut EventLoop) -> Result<()> {
        scheduler.reset(ev);
        backend.borrow_mut().restore()?;
        debug!(frames = self.perf.borrow().frames, "screen destroyed");
        Ok(())
    }
}
