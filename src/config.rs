//! Session configuration.
//!
//! Defaults match an interactive terminal session at 60 FPS. Hosts can
//! override fields with the builder methods or pick up environment
//! overrides with [`BridgeConfig::from_env`]:
//!
//! | Variable                       | Field                |
//! |--------------------------------|----------------------|
//! | `SPARK_BRIDGE_FPS`             | `target_fps`         |
//! | `SPARK_BRIDGE_PERF`            | `perf_monitoring`    |
//! | `SPARK_BRIDGE_FOCUS_DELAY_MS`  | `focus_settle_delay` |

use std::time::Duration;

use tracing::warn;

/// Lowest accepted frame rate.
pub const MIN_FPS: u32 = 1;
/// Highest accepted frame rate.
pub const MAX_FPS: u32 = 120;

/// Size used when the terminal reports zero columns or rows.
pub const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// Configuration for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Target frames per second, clamped to `MIN_FPS..=MAX_FPS`.
    pub target_fps: u32,
    /// Record per-frame draw timings on the screen.
    pub perf_monitoring: bool,
    /// Delay before a freshly mounted `focused` node takes terminal focus.
    pub focus_settle_delay: Duration,
    /// Window in which the same key from the two raw streams counts once.
    pub key_dedupe_window: Duration,
    /// De-dup table size above which stale entries are pruned.
    pub key_dedupe_capacity: usize,
    /// Age after which a de-dup entry is stale.
    pub key_dedupe_max_age: Duration,
    /// Key names that end the session.
    pub exit_keys: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            perf_monitoring: false,
            focus_settle_delay: Duration::from_millis(10),
            key_dedupe_window: Duration::from_millis(50),
            key_dedupe_capacity: 100,
            key_dedupe_max_age: Duration::from_secs(1),
            exit_keys: vec!["C-c".to_string()],
        }
    }
}

impl BridgeConfig {
    /// Defaults with environment overrides applied.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_lookup(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("SPARK_BRIDGE_FPS") {
            match raw.trim().parse::<u32>() {
                Ok(fps) => self = self.with_target_fps(fps),
                Err(_) => warn!(value = %raw, "ignoring invalid SPARK_BRIDGE_FPS"),
            }
        }
        if let Some(raw) = lookup("SPARK_BRIDGE_PERF") {
            match raw.trim() {
                "1" | "true" | "on" => self.perf_monitoring = true,
                "0" | "false" | "off" => self.perf_monitoring = false,
                _ => warn!(value = %raw, "ignoring invalid SPARK_BRIDGE_PERF"),
            }
        }
        if let Some(raw) = lookup("SPARK_BRIDGE_FOCUS_DELAY_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.focus_settle_delay = Duration::from_millis(ms),
                Err(_) => warn!(value = %raw, "ignoring invalid SPARK_BRIDGE_FOCUS_DELAY_MS"),
            }
        }
        self
    }

    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = clamp_fps(fps);
        self
    }

    pub fn with_perf_monitoring(mut self, enabled: bool) -> Self {
        self.perf_monitoring = enabled;
        self
    }

    pub fn with_focus_settle_delay(mut self, delay: Duration) -> Self {
        self.focus_settle_delay = delay;
        self
    }

    pub fn with_exit_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exit_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Clamp a requested frame rate into the supported range.
#[inline]
pub fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(MIN_FPS, MAX_FPS)
}

/// Frame interval for a frame rate (`1000 / fps` milliseconds).
#[inline]
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / clamp_fps(fps) as f64)
}
