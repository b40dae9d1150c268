//! Frame Scheduler
//!
//! Orders the work of one frame across the graphics and compute queues:
//!
//! ```text
//!  host      acquire ─ prepass ─ wait(fence) ─ reset ─ dispatch ─ main+capture ─ advance ─ present
//!                        │                              │             │
//!  graphics  ────────[prepass i]──────────────────────────────────[main i][capture i]──
//!  compute   ──────────────────────────────────────[classify i]──────────────────────
//!                                                       └─ signals fence, waited at frame i+1
//! ```
//!
//! The main pass of frame `i` binds the classification produced by dispatch
//! `i - 1`: the host only learns that a dispatch finished when it waits on
//! the fence at the start of the next frame's compute step, and only then
//! publishes its output. On the first frame after start-up or a resize no
//! dispatch is submitted and the fence is not waited on.

pub mod backend;
pub mod fence;

pub use backend::{AcquireError, FrameBackend, FrameContext};
pub use fence::CompletionToken;

use std::time::Duration;

use glam::Mat4;
use log::{debug, error, info, warn};

use crate::errors::{Result, VrsError};
use crate::resources::{Extent, TemporalTransform};
use crate::settings::{PipelineSettings, RenderVariant, ShadingToggles};

/// What happened while rendering one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub current_slot: usize,
    pub previous_slot: usize,
    /// A classifier dispatch was submitted this frame.
    pub dispatched: bool,
    pub variant: RenderVariant,
    pub visualize_rates: bool,
    /// Command streams were re-recorded before this frame.
    pub commands_rebuilt: bool,
    /// The swap chain was recreated while acquiring.
    pub surface_recreated: bool,
    /// The surface had zero area; nothing was submitted or presented.
    pub skipped: bool,
}

enum Acquired {
    Image { recreated: bool },
    Minimized,
}

pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    fence: CompletionToken,
    fence_timeout: Duration,
    max_surface_retries: u32,

    first_frame: bool,
    dispatch_in_flight: bool,
    halted: bool,
    frame_index: u64,

    toggles: ShadingToggles,
    commands_dirty: bool,
    command_rebuilds: u64,

    transform: TemporalTransform,
}

impl<B: FrameBackend> FrameScheduler<B> {
    /// Records the initial command streams and arms the fence.
    pub fn new(mut backend: B, settings: &PipelineSettings) -> Result<Self> {
        settings.validate()?;
        let toggles = settings.initial_toggles();
        backend.rebuild_commands(toggles)?;
        let extent = backend.extent();
        info!(
            "Frame scheduler ready: {}x{}, {} history slots, variant {:?}",
            extent.width,
            extent.height,
            backend.history().slot_count(),
            toggles.variant
        );
        Ok(Self {
            backend,
            fence: CompletionToken::signaled(),
            fence_timeout: settings.fence_timeout(),
            max_surface_retries: settings.max_surface_retries,
            first_frame: true,
            dispatch_in_flight: false,
            halted: false,
            frame_index: 0,
            toggles,
            commands_dirty: false,
            command_rebuilds: 0,
            transform: TemporalTransform::default(),
        })
    }

    // ─── Host Toggles ────────────────────────────────────────────────────

    pub fn set_rate_adaptive(&mut self, enabled: bool) {
        let variant = RenderVariant::from_enabled(enabled);
        if self.toggles.variant != variant {
            self.toggles.variant = variant;
            self.commands_dirty = true;
        }
    }

    pub fn set_visualize_rates(&mut self, enabled: bool) {
        if self.toggles.visualize_rates != enabled {
            self.toggles.visualize_rates = enabled;
            self.commands_dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn toggles(&self) -> ShadingToggles {
        self.toggles
    }

    // ─── Frame Loop ──────────────────────────────────────────────────────

    /// Renders one frame seen through `view_projection`.
    ///
    /// Any error halts the scheduler; later calls return
    /// [`VrsError::PipelineHalted`]. While the surface has zero area the
    /// frame is skipped instead (see [`FrameReport::skipped`]).
    pub fn render_frame(&mut self, view_projection: Mat4) -> Result<FrameReport> {
        if self.halted {
            return Err(VrsError::PipelineHalted);
        }
        let result = self.run_frame(view_projection);
        if let Err(err) = &result {
            error!("Frame {} failed, halting pipeline: {err}", self.frame_index);
            self.halted = true;
        }
        result
    }

    fn run_frame(&mut self, view_projection: Mat4) -> Result<FrameReport> {
        let commands_dirty = self.commands_dirty;
        let surface_recreated = match self.acquire_with_retry()? {
            Acquired::Image { recreated } => recreated,
            Acquired::Minimized => {
                debug!("Frame {}: surface has zero area, skipped", self.frame_index);
                return Ok(self.skipped_report());
            }
        };

        self.transform.advance(view_projection);
        self.backend.upload_transforms(&self.transform);

        if self.commands_dirty {
            self.record_commands()?;
        }

        let history = self.backend.history();
        let frame = FrameContext {
            frame_index: self.frame_index,
            current_slot: history.current_index(),
            previous_slot: history.previous_index(),
            toggles: self.toggles,
        };

        self.backend.submit_depth_prepass(&frame)?;

        let dispatched = if self.first_frame {
            debug!("Frame {}: first frame, classifier skipped", frame.frame_index);
            self.first_frame = false;
            false
        } else {
            self.backend.wait_for_fence(&self.fence, self.fence_timeout)?;
            if self.dispatch_in_flight {
                self.backend.publish_classification()?;
            }
            self.fence.reset();
            self.backend.submit_classification(&frame, &self.fence)?;
            self.dispatch_in_flight = true;
            debug!(
                "Frame {}: classifier dispatched (slots {} vs {})",
                frame.frame_index, frame.previous_slot, frame.current_slot
            );
            true
        };

        self.backend.submit_main_pass(&frame)?;
        self.backend.history_mut().advance();
        self.backend.present()?;
        self.frame_index += 1;

        Ok(FrameReport {
            frame_index: frame.frame_index,
            current_slot: frame.current_slot,
            previous_slot: frame.previous_slot,
            dispatched,
            variant: frame.toggles.variant,
            visualize_rates: frame.toggles.visualize_rates,
            commands_rebuilt: commands_dirty,
            surface_recreated,
            skipped: false,
        })
    }

    /// Report of a frame that submitted nothing.
    fn skipped_report(&self) -> FrameReport {
        let history = self.backend.history();
        FrameReport {
            frame_index: self.frame_index,
            current_slot: history.current_index(),
            previous_slot: history.previous_index(),
            dispatched: false,
            variant: self.toggles.variant,
            visualize_rates: self.toggles.visualize_rates,
            commands_rebuilt: false,
            surface_recreated: false,
            skipped: true,
        }
    }

    fn acquire_with_retry(&mut self) -> Result<Acquired> {
        let mut attempts = 0;
        loop {
            match self.backend.acquire() {
                Ok(()) => {
                    return Ok(Acquired::Image {
                        recreated: attempts > 0,
                    });
                }
                Err(reason) => {
                    let extent = self.backend.surface_extent();
                    // Minimized window: nothing to recreate at until it is
                    // restored.
                    if extent.area() == 0 {
                        return Ok(Acquired::Minimized);
                    }
                    if attempts >= self.max_surface_retries {
                        return Err(VrsError::SurfaceUnavailable { attempts });
                    }
                    attempts += 1;
                    warn!("Surface {reason:?} on acquire, recreating (attempt {attempts})");
                    self.recreate(extent)?;
                }
            }
        }
    }

    fn record_commands(&mut self) -> Result<()> {
        self.backend.rebuild_commands(self.toggles)?;
        self.commands_dirty = false;
        self.command_rebuilds += 1;
        info!(
            "Command streams re-recorded: variant {:?}, visualize {}",
            self.toggles.variant, self.toggles.visualize_rates
        );
        Ok(())
    }

    // ─── Resize ──────────────────────────────────────────────────────────

    /// Resize notification from the presentation surface.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.halted {
            return Err(VrsError::PipelineHalted);
        }
        let extent = Extent::validated(width, height)?;
        let result = self.recreate(extent);
        if let Err(err) = &result {
            error!("Resize to {width}x{height} failed, halting pipeline: {err}");
            self.halted = true;
        }
        result
    }

    fn recreate(&mut self, extent: Extent) -> Result<()> {
        if self.dispatch_in_flight {
            self.backend.wait_for_fence(&self.fence, self.fence_timeout)?;
            self.dispatch_in_flight = false;
        }
        self.backend.wait_idle()?;
        self.backend.recreate(extent)?;
        self.record_commands()?;
        self.first_frame = true;
        info!("Pipeline recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Waits for the outstanding dispatch, publishes its output and drains
    /// both queues.
    pub fn flush(&mut self) -> Result<()> {
        if self.dispatch_in_flight {
            self.backend.wait_for_fence(&self.fence, self.fence_timeout)?;
            self.backend.publish_classification()?;
            self.dispatch_in_flight = false;
        }
        self.backend.wait_idle()
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn is_first_frame(&self) -> bool {
        self.first_frame
    }

    #[inline]
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Re-records since construction, from toggles and resizes.
    #[inline]
    #[must_use]
    pub fn command_rebuilds(&self) -> u64 {
        self.command_rebuilds
    }

    #[inline]
    #[must_use]
    pub fn transform(&self) -> &TemporalTransform {
        &self.transform
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
