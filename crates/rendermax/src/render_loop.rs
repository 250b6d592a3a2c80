//! # RENDERMAX Render Loop
//!
//! Drives the active chain of a `RendererSlot`, one frame at a time:
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. RESIZE (every `resize_every` frames)                             │
//! │    └─ grid_resize to the next entry of `resize_cycle`               │
//! │                                                                     │
//! │ 2. DRAW                                                             │
//! │    └─ host writes screen cells into the shared frame                │
//! │                                                                     │
//! │ 3. UPDATE                                                           │
//! │    └─ update_all through every decorator                            │
//! │                                                                     │
//! │ 4. RENDER                                                           │
//! │    └─ render (shadow commit)                                        │
//! │                                                                     │
//! │ 5. END FRAME                                                        │
//! │    └─ record stats, sleep out the frame budget                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A frame whose chain returns an error is dropped and counted. Fatal errors
//! (allocation failure, stale state, empty slot) end the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use rendermax_core::{FrameState, RenderResult, RendererSlot};

/// Frame time beyond which a frame is logged as slow.
pub const MAX_FRAME_TIME: Duration = Duration::from_millis(33);

/// `[render_loop]` configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderLoopConfig {
    /// Frames to run. 0 runs until stopped.
    pub frames: u64,
    /// Frame pacing target. 0 runs unthrottled.
    pub target_fps: u32,
    /// Resize the grid every this many frames. 0 never resizes.
    pub resize_every: u64,
    /// Grids visited by the periodic resize, in order, as `[width, height]`.
    pub resize_cycle: Vec<[i32; 2]>,
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self {
            frames: 120,
            target_fps: 60,
            resize_every: 0,
            resize_cycle: vec![[100, 30], [60, 20], [80, 25]],
        }
    }
}

impl RenderLoopConfig {
    /// Time budget of one frame, `None` when unthrottled.
    #[must_use]
    pub fn frame_budget(&self) -> Option<Duration> {
        (self.target_fps > 0).then(|| Duration::from_secs(1) / self.target_fps)
    }
}

/// Timing of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Time spent in `update_all`, microseconds.
    pub update_us: u64,
    /// Time spent in `render`, microseconds.
    pub render_us: u64,
    /// Whole frame, microseconds.
    pub total_us: u64,
    /// Tiles in the grid this frame.
    pub tiles: usize,
    /// Whether the grid was resized at the start of the frame.
    pub resized: bool,
}

/// Accumulated loop statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderLoopStats {
    /// Frames completed.
    pub frames_rendered: u64,
    /// Frames dropped because the chain returned an error.
    pub frames_dropped: u64,
    /// Grid resizes performed.
    pub resizes: u64,
    /// Sum of frame times.
    pub total_us_sum: u64,
    /// Sum of update times.
    pub update_us_sum: u64,
    /// Sum of render times.
    pub render_us_sum: u64,
    /// Fastest frame.
    pub min_frame_us: u64,
    /// Slowest frame.
    pub max_frame_us: u64,
    /// Frames slower than [`MAX_FRAME_TIME`].
    pub slow_frames: u64,
    /// Message of the most recent error.
    pub last_error: Option<String>,
}

impl RenderLoopStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_rendered: 0,
            frames_dropped: 0,
            resizes: 0,
            total_us_sum: 0,
            update_us_sum: 0,
            render_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            slow_frames: 0,
            last_error: None,
        }
    }

    /// Records a completed frame.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_rendered += 1;
        self.total_us_sum += stats.total_us;
        self.update_us_sum += stats.update_us;
        self.render_us_sum += stats.render_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        if stats.resized {
            self.resizes += 1;
        }
        if u128::from(stats.total_us) > MAX_FRAME_TIME.as_micros() {
            self.slow_frames += 1;
        }
    }

    /// Records a dropped frame.
    pub fn record_drop(&mut self, error: String) {
        self.frames_dropped += 1;
        self.last_error = Some(error);
    }

    /// Average frame time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_rendered == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_rendered as f64) / 1000.0
    }

    /// Average frames per second, from frame work alone.
    #[must_use]
    pub fn avg_fps(&self) -> f64 {
        let avg_ms = self.avg_frame_ms();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }

    /// Share of attempted frames that were dropped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_ratio(&self) -> f64 {
        let attempted = self.frames_rendered + self.frames_dropped;
        if attempted == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / attempted as f64
    }

    /// Logs a summary at info level.
    pub fn log_summary(&self) {
        tracing::info!(
            frames = self.frames_rendered,
            dropped = self.frames_dropped,
            resizes = self.resizes,
            avg_frame_ms = self.avg_frame_ms(),
            avg_fps = self.avg_fps(),
            max_frame_us = self.max_frame_us,
            slow_frames = self.slow_frames,
            "render loop summary"
        );
        if let Some(error) = &self.last_error {
            tracing::info!(error = %error, "last dropped frame");
        }
    }
}

impl Default for RenderLoopStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The frame driver.
pub struct RenderLoop<'a> {
    slot: &'a RendererSlot,
    config: RenderLoopConfig,
    frame_count: u64,
    resize_cursor: usize,
    stats: RenderLoopStats,
}

impl<'a> RenderLoop<'a> {
    /// Creates a loop over `slot`.
    #[must_use]
    pub fn new(slot: &'a RendererSlot, config: RenderLoopConfig) -> Self {
        Self {
            slot,
            config,
            frame_count: 0,
            resize_cursor: 0,
            stats: RenderLoopStats::new(),
        }
    }

    /// Frames attempted so far.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &RenderLoopStats {
        &self.stats
    }

    fn next_resize(&mut self) -> Option<[i32; 2]> {
        let every = self.config.resize_every;
        if every == 0 || self.frame_count == 0 || self.frame_count % every != 0 {
            return None;
        }
        let cycle = &self.config.resize_cycle;
        let next = cycle.get(self.resize_cursor % cycle.len().max(1)).copied()?;
        self.resize_cursor += 1;
        Some(next)
    }

    /// Runs one frame. `draw` fills the screen planes before the update.
    ///
    /// # Errors
    ///
    /// Returns the chain's error after counting the frame as dropped.
    pub fn run_frame<F>(&mut self, draw: F) -> RenderResult<FrameStats>
    where
        F: FnOnce(u64, &mut FrameState),
    {
        let frame = self.frame_count;
        let resize = self.next_resize();
        self.frame_count += 1;
        let start = Instant::now();

        let result = self.slot.with_active(|renderer| -> RenderResult<FrameStats> {
            if let Some([width, height]) = resize {
                renderer.grid_resize(width, height)?;
                tracing::debug!(frame, width, height, "grid resized");
            }
            {
                let shared = renderer.frame();
                let mut state = shared.write();
                draw(frame, &mut *state);
            }

            let update_start = Instant::now();
            renderer.update_all()?;
            let update_us = elapsed_us(update_start);

            let render_start = Instant::now();
            renderer.render()?;
            let render_us = elapsed_us(render_start);

            Ok(FrameStats {
                frame,
                update_us,
                render_us,
                total_us: 0,
                tiles: renderer.grid().tile_count(),
                resized: resize.is_some(),
            })
        });

        match result.and_then(|inner| inner) {
            Ok(mut stats) => {
                stats.total_us = elapsed_us(start);
                if u128::from(stats.total_us) > MAX_FRAME_TIME.as_micros() {
                    tracing::warn!(frame, total_us = stats.total_us, "frame exceeded budget");
                } else {
                    tracing::trace!(frame, total_us = stats.total_us, "frame complete");
                }
                self.stats.record(stats);
                Ok(stats)
            }
            Err(err) => {
                tracing::warn!(frame, error = %err, "frame dropped");
                self.stats.record_drop(err.to_string());
                Err(err)
            }
        }
    }

    /// Runs frames until the configured count is reached or `stop` is set.
    /// Non-fatal errors drop the frame and the loop carries on.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error.
    pub fn run<F>(&mut self, stop: Option<&AtomicBool>, mut draw: F) -> RenderResult<&RenderLoopStats>
    where
        F: FnMut(u64, &mut FrameState),
    {
        let budget = self.config.frame_budget();
        tracing::debug!(
            frames = self.config.frames,
            target_fps = self.config.target_fps,
            "render loop started"
        );

        loop {
            if self.config.frames > 0 && self.frame_count >= self.config.frames {
                break;
            }
            if stop.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                tracing::debug!(frame = self.frame_count, "render loop stopped");
                break;
            }

            let started = Instant::now();
            if let Err(err) = self.run_frame(&mut draw) {
                if err.is_fatal() {
                    tracing::error!(error = %err, "render loop aborted");
                    return Err(err);
                }
            }

            if let Some(budget) = budget {
                if let Some(remaining) = budget.checked_sub(started.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }

        Ok(&self.stats)
    }
}

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}
