use std::time::Duration;

use crate::errors::Result;
use crate::resources::{Extent, HistoryStore, TemporalTransform};
use crate::settings::{RenderVariant, ShadingToggles};

use super::fence::CompletionToken;

/// Why the next surface image could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// Surface no longer matches the swap chain; recreate and retry.
    OutOfDate,
    /// Surface was lost; recreate and retry.
    Lost,
}

/// Per-frame values handed to every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    pub frame_index: u64,
    /// Depth slot the pre-pass writes this frame.
    pub current_slot: usize,
    /// Depth slot holding the previous frame.
    pub previous_slot: usize,
    pub toggles: ShadingToggles,
}

impl FrameContext {
    #[inline]
    #[must_use]
    pub fn variant(&self) -> RenderVariant {
        self.toggles.variant
    }
}

/// A device the [`FrameScheduler`](super::FrameScheduler) drives.
///
/// The scheduler owns ordering and the fence protocol; the backend owns
/// resources and executes submissions. Every `submit_*` call must return as
/// soon as the work is queued.
pub trait FrameBackend {
    type DepthSlot;
    type ColorSlot;

    /// Current swap-chain extent.
    fn extent(&self) -> Extent;

    fn history(&self) -> &HistoryStore<Self::DepthSlot, Self::ColorSlot>;

    fn history_mut(&mut self) -> &mut HistoryStore<Self::DepthSlot, Self::ColorSlot>;

    /// Extent the surface wants after an out-of-date acquire.
    fn surface_extent(&self) -> Extent {
        self.extent()
    }

    fn acquire(&mut self) -> std::result::Result<(), AcquireError>;

    /// Uploads the matrices the classifier reads this frame.
    fn upload_transforms(&mut self, transform: &TemporalTransform);

    /// Re-records the frame's command streams for `toggles`.
    fn rebuild_commands(&mut self, toggles: ShadingToggles) -> Result<()>;

    /// Graphics queue: depth-only pass into the current history slot.
    fn submit_depth_prepass(&mut self, frame: &FrameContext) -> Result<()>;

    /// Host wait on the classifier fence.
    fn wait_for_fence(&mut self, fence: &CompletionToken, timeout: Duration) -> Result<()> {
        fence.wait(timeout)
    }

    /// Makes the output of the dispatch whose fence was just observed the
    /// buffer the main pass binds.
    fn publish_classification(&mut self) -> Result<()>;

    /// Compute queue: classifier dispatch. `fence` must be signaled when the
    /// dispatch finishes.
    fn submit_classification(&mut self, frame: &FrameContext, fence: &CompletionToken)
    -> Result<()>;

    /// Graphics queue: main pass followed by the color capture.
    fn submit_main_pass(&mut self, frame: &FrameContext) -> Result<()>;

    fn present(&mut self) -> Result<()>;

    /// Blocks until both queues are idle.
    fn wait_idle(&mut self) -> Result<()>;

    /// Tears down and rebuilds history, classification and framebuffers at
    /// `extent`.
    fn recreate(&mut self, extent: Extent) -> Result<()>;
}
