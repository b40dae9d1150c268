//! Headless Backend
//!
//! A CPU device with a graphics and a compute queue, each a worker thread.
//! It runs the complete pipeline without a GPU:
//!
//! | Queue    | Work                                                   |
//! |----------|--------------------------------------------------------|
//! | graphics | depth pre-pass, main pass, color capture, present      |
//! | compute  | [`RateClassifier`] into the classification target grid |
//!
//! Device-side ordering inside a frame:
//!
//! - the classifier waits for this frame's pre-pass (it reads that depth);
//! - the color capture waits until the classifier has taken its copy of the
//!   color slot (the capture overwrites it);
//! - with only two history slots, the next pre-pass waits for the classifier
//!   to finish (it overwrites the classifier's previous depth).
//!
//! The main pass, the capture and, with three or more slots, the next
//! frame's pre-pass all run concurrently with the classifier.

pub mod capture;
pub mod commands;
pub mod queue;
pub mod raster;
pub mod surface;

pub use commands::{CommandStream, PipelineSet};
pub use queue::{DeviceQueue, Submission};
pub use raster::FrameStats;
pub use surface::HeadlessSurface;

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::errors::{Result, VrsError};
use crate::rate::{ClassifierInputs, RateClassifier};
use crate::resources::{
    ClassificationBuffer, ColorImage, DepthImage, Extent, HistoryStore, ImageLayout,
    TemporalTransform, TileGrid, TileSize,
};
use crate::scene::SceneProvider;
use crate::scheduler::{AcquireError, CompletionToken, FrameBackend, FrameContext};
use crate::settings::{PipelineSettings, ShadingToggles};
use raster::{DepthTarget, PassTargets, RasterView};

pub type SharedDepth = Arc<RwLock<DepthImage>>;
pub type SharedColor = Arc<RwLock<ColorImage>>;

/// What the headless device reports it can do.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Shading-rate texel sizes the device accepts.
    pub shading_rate_tile_sizes: Vec<TileSize>,
    /// Whether a queue separate from graphics accepts compute work.
    pub dedicated_compute_queue: bool,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            shading_rate_tile_sizes: vec![
                TileSize::square(8),
                TileSize::square(16),
                TileSize::square(32),
            ],
            dedicated_compute_queue: true,
        }
    }
}

impl DeviceInfo {
    /// Fails with [`VrsError::MissingCapability`] if the pipeline cannot run
    /// on this device.
    pub fn validate(&self, settings: &PipelineSettings) -> Result<()> {
        if !self.dedicated_compute_queue {
            return Err(VrsError::MissingCapability(
                "no queue family with compute support separate from graphics".into(),
            ));
        }
        if !self.shading_rate_tile_sizes.contains(&settings.tile_size) {
            return Err(VrsError::MissingCapability(format!(
                "shading-rate texel size {}x{} not supported",
                settings.tile_size.width, settings.tile_size.height
            )));
        }
        Ok(())
    }
}

pub struct HeadlessBackend {
    settings: PipelineSettings,
    scene: Arc<dyn SceneProvider>,
    classifier: Arc<RateClassifier>,
    pipelines: PipelineSet,

    graphics: DeviceQueue,
    compute: DeviceQueue,
    surface: HeadlessSurface,

    history: HistoryStore<SharedDepth, SharedColor>,
    color_target: SharedColor,
    presented: Arc<Mutex<ColorImage>>,
    classification: ClassificationBuffer,
    transform: TemporalTransform,

    prepass_commands: Arc<CommandStream>,
    main_commands: Arc<CommandStream>,
    stats: Arc<Mutex<FrameStats>>,

    depth_ready: Option<CompletionToken>,
    classifier_done: Option<CompletionToken>,
    color_released: Option<CompletionToken>,
}

fn alloc_depth(_slot: usize, extent: Extent) -> Result<SharedDepth> {
    Ok(Arc::new(RwLock::new(DepthImage::new(
        "depth history",
        extent,
        1.0,
        ImageLayout::Undefined,
    )?)))
}

fn alloc_color_history(extent: Extent) -> Result<SharedColor> {
    Ok(Arc::new(RwLock::new(ColorImage::new(
        "color history",
        extent,
        [0; 4],
        ImageLayout::General,
    )?)))
}

fn alloc_color_target(extent: Extent) -> Result<SharedColor> {
    Ok(Arc::new(RwLock::new(ColorImage::new(
        "color target",
        extent,
        [0; 4],
        ImageLayout::Undefined,
    )?)))
}

impl HeadlessBackend {
    pub fn new(
        settings: &PipelineSettings,
        extent: Extent,
        scene: Arc<dyn SceneProvider>,
    ) -> Result<Self> {
        Self::with_device(&DeviceInfo::default(), settings, extent, scene)
    }

    pub fn with_device(
        device: &DeviceInfo,
        settings: &PipelineSettings,
        extent: Extent,
        scene: Arc<dyn SceneProvider>,
    ) -> Result<Self> {
        settings.validate()?;
        device.validate(settings)?;
        let extent = Extent::validated(extent.width, extent.height)?;

        let device_wait = settings.fence_timeout();
        let graphics = DeviceQueue::spawn("graphics", device_wait)?;
        let compute = DeviceQueue::spawn("compute", device_wait)?;

        let history = HistoryStore::allocate(
            settings.history_slots,
            extent,
            alloc_depth,
            alloc_color_history,
        )?;
        let classification = ClassificationBuffer::new(extent, settings.tile_size)?;
        let classifier = RateClassifier::new(
            settings.thresholds.clone(),
            settings.weights,
            settings.tile_size,
        );
        let pipelines = PipelineSet::build(settings.alpha_cutoff);
        let empty = Arc::new(CommandStream {
            label: "empty",
            commands: Vec::new(),
        });

        info!(
            "Headless device ready: {}x{}, {} primitives",
            extent.width,
            extent.height,
            scene.primitives().len()
        );

        Ok(Self {
            settings: settings.clone(),
            scene,
            classifier: Arc::new(classifier),
            pipelines,
            graphics,
            compute,
            surface: HeadlessSurface::new(extent, settings.history_slots),
            history,
            color_target: alloc_color_target(extent)?,
            presented: Arc::new(Mutex::new(ColorImage::new(
                "presented",
                extent,
                [0; 4],
                ImageLayout::General,
            )?)),
            classification,
            transform: TemporalTransform::default(),
            prepass_commands: Arc::clone(&empty),
            main_commands: empty,
            stats: Arc::new(Mutex::new(FrameStats::default())),
            depth_ready: None,
            classifier_done: None,
            color_released: None,
        })
    }

    fn device_wait(&self) -> Duration {
        self.settings.fence_timeout()
    }

    fn check_faults(&self) -> Result<()> {
        match self.graphics.fault().or_else(|| self.compute.fault()) {
            Some(fault) => Err(VrsError::DeviceLost(fault)),
            None => Ok(()),
        }
    }

    // ─── Inspection ──────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn classification(&self) -> &ClassificationBuffer {
        &self.classification
    }

    /// Copy of the classification the next main pass binds.
    #[must_use]
    pub fn bound_classification(&self) -> TileGrid {
        self.classification.snapshot()
    }

    /// Counters of the most recently executed main pass.
    #[must_use]
    pub fn last_stats(&self) -> FrameStats {
        *self.stats.lock()
    }

    /// Copy of the last presented image.
    #[must_use]
    pub fn presented_image(&self) -> ColorImage {
        self.presented.lock().clone()
    }

    #[must_use]
    pub fn color_history_layout(&self) -> ImageLayout {
        self.history.color_slot().read().layout()
    }

    #[inline]
    #[must_use]
    pub fn surface(&self) -> &HeadlessSurface {
        &self.surface
    }

    #[inline]
    pub fn surface_mut(&mut self) -> &mut HeadlessSurface {
        &mut self.surface
    }

    #[inline]
    #[must_use]
    pub fn main_commands(&self) -> &CommandStream {
        &self.main_commands
    }
}

impl FrameBackend for HeadlessBackend {
    type DepthSlot = SharedDepth;
    type ColorSlot = SharedColor;

    fn extent(&self) -> Extent {
        self.surface.extent()
    }

    fn history(&self) -> &HistoryStore<SharedDepth, SharedColor> {
        &self.history
    }

    fn history_mut(&mut self) -> &mut HistoryStore<SharedDepth, SharedColor> {
        &mut self.history
    }

    fn surface_extent(&self) -> Extent {
        self.surface.desired_extent()
    }

    fn acquire(&mut self) -> std::result::Result<(), AcquireError> {
        self.surface.acquire().map(|_| ())
    }

    fn upload_transforms(&mut self, transform: &TemporalTransform) {
        self.transform = *transform;
    }

    fn rebuild_commands(&mut self, toggles: ShadingToggles) -> Result<()> {
        let light = Vec3::from_slice(&self.settings.light_position[..3]);
        self.prepass_commands = Arc::new(commands::record_depth_prepass(
            self.scene.as_ref(),
            &self.pipelines,
        ));
        self.main_commands = Arc::new(commands::record_main_pass(
            self.scene.as_ref(),
            &self.pipelines,
            toggles,
            self.settings.clear_color,
            light,
        ));
        debug!(
            "Recorded {} pre-pass draws, {} main draws",
            self.prepass_commands.draw_count(),
            self.main_commands.draw_count()
        );
        Ok(())
    }

    fn submit_depth_prepass(&mut self, frame: &FrameContext) -> Result<()> {
        let depth = Arc::clone(self.history.depth_slot(frame.current_slot));
        let stream = Arc::clone(&self.prepass_commands);
        let view = RasterView::new(self.transform.current());
        let tile = self.settings.tile_size;
        let ready = CompletionToken::new();

        let mut submission = Submission::new("depth prepass", move || {
            let mut depth = depth.write();
            let mut targets = PassTargets {
                depth: DepthTarget::Write(&mut depth),
                color: None,
                rate_image: None,
                tile,
            };
            raster::execute(&stream, view, &mut targets).map(|_| ())
        })
        .signal(ready.clone());
        // With two slots this frame's slot is the one the last dispatch
        // reads as "previous".
        if self.history.slot_count() < 3 {
            if let Some(done) = &self.classifier_done {
                submission = submission.wait_on(done.clone());
            }
        }
        self.graphics.submit(submission)?;
        self.depth_ready = Some(ready);
        self.classifier_done = None;
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: &CompletionToken, timeout: Duration) -> Result<()> {
        fence.wait(timeout)?;
        self.check_faults()
    }

    fn publish_classification(&mut self) -> Result<()> {
        self.classification.publish();
        Ok(())
    }

    fn submit_classification(
        &mut self,
        frame: &FrameContext,
        fence: &CompletionToken,
    ) -> Result<()> {
        let previous = Arc::clone(self.history.depth_slot(frame.previous_slot));
        let current = Arc::clone(self.history.depth_slot(frame.current_slot));
        let color = Arc::clone(self.history.color_slot());
        let target = self.classification.target();
        let classifier = Arc::clone(&self.classifier);
        let transform = self.transform;
        let done = CompletionToken::new();
        let released = CompletionToken::new();
        let release = released.clone();

        let mut submission = Submission::new("rate classifier", move || {
            let color = {
                let slot = color.read();
                slot.require_layout(ImageLayout::General)?;
                slot.clone()
            };
            release.signal();
            let previous = previous.read();
            let current = current.read();
            previous.require_layout(ImageLayout::ShaderRead)?;
            current.require_layout(ImageLayout::ShaderRead)?;
            let inputs = ClassifierInputs {
                previous_depth: &previous,
                current_depth: &current,
                previous_color: &color,
                transform: &transform,
            };
            classifier.classify(&inputs, &mut target.write())
        })
        .signal(released.clone())
        .signal(done.clone())
        .signal(fence.clone());
        if let Some(ready) = &self.depth_ready {
            submission = submission.wait_on(ready.clone());
        }

        self.compute.submit(submission)?;
        self.classifier_done = Some(done);
        self.color_released = Some(released);
        Ok(())
    }

    fn submit_main_pass(&mut self, frame: &FrameContext) -> Result<()> {
        let depth = Arc::clone(self.history.depth_slot(frame.current_slot));
        let color = Arc::clone(&self.color_target);
        let grid = self.classification.bound();
        let stream = Arc::clone(&self.main_commands);
        let view = RasterView::new(self.transform.current());
        let tile = self.settings.tile_size;
        let stats = Arc::clone(&self.stats);
        let frame_index = frame.frame_index;

        self.graphics.submit(Submission::new("main pass", move || {
            let depth = depth.read();
            let grid = grid.read();
            let mut color = color.write();
            let mut targets = PassTargets {
                depth: DepthTarget::ReadOnly(&depth),
                color: Some(&mut color),
                rate_image: Some(&grid),
                tile,
            };
            let mut pass_stats = raster::execute(&stream, view, &mut targets)?;
            pass_stats.frame_index = frame_index;
            *stats.lock() = pass_stats;
            Ok(())
        }))?;

        let target = Arc::clone(&self.color_target);
        let history = Arc::clone(self.history.color_slot());
        let mut capture = Submission::new("color capture", move || {
            capture::capture_color(&mut target.write(), &mut history.write())
        });
        if let Some(released) = self.color_released.take() {
            capture = capture.wait_on(released);
        }
        self.graphics.submit(capture)
    }

    fn present(&mut self) -> Result<()> {
        let color = Arc::clone(&self.color_target);
        let presented = Arc::clone(&self.presented);
        self.graphics.submit(Submission::new("present", move || {
            let mut color = color.write();
            color.transition(ImageLayout::ColorAttachment, ImageLayout::Present)?;
            presented.lock().texels_mut().copy_from_slice(color.texels());
            Ok(())
        }))?;
        self.surface.present();
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        let timeout = self.device_wait();
        self.graphics.wait_idle(timeout)?;
        self.compute.wait_idle(timeout)
    }

    fn recreate(&mut self, extent: Extent) -> Result<()> {
        let extent = Extent::validated(extent.width, extent.height)?;
        self.surface.configure(extent);
        self.history
            .reallocate(extent, alloc_depth, alloc_color_history)?;
        self.color_target = alloc_color_target(extent)?;
        *self.presented.lock() =
            ColorImage::new("presented", extent, [0; 4], ImageLayout::General)?;
        self.classification.resize(extent)?;
        self.depth_ready = None;
        self.classifier_done = None;
        self.color_released = None;
        info!("Headless swap chain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::RateClass;
    use crate::scene::{FirstPersonCamera, Scene};
    use crate::scheduler::FrameScheduler;

    fn pipeline(settings: &PipelineSettings) -> FrameScheduler<HeadlessBackend> {
        let backend =
            HeadlessBackend::new(settings, Extent::new(64, 48), Arc::new(Scene::demo())).unwrap();
        FrameScheduler::new(backend, settings).unwrap()
    }

    #[test]
    fn capture_runs_while_classifier_is_still_busy() {
        let settings = PipelineSettings::default();
        let mut p = pipeline(&settings);
        let camera = FirstPersonCamera::new(60.0, 64.0 / 48.0, 0.1, 256.0);
        p.render_frame(camera.view_projection()).unwrap();

        // Holding the output grid stalls the classifier after it has read
        // its inputs.
        let target = p.backend().classification().target();
        let output = target.write();
        let report = p.render_frame(camera.view_projection()).unwrap();
        assert!(report.dispatched);

        let backend = p.backend();
        backend.graphics.wait_idle(Duration::from_secs(5)).unwrap();
        let done = backend.classifier_done.as_ref().unwrap();
        assert!(!done.is_signaled(), "classifier finished before its output was released");
        assert_eq!(backend.last_stats().frame_index, 1);

        drop(output);
        p.flush().unwrap();
        assert!(p.backend().bound_classification().all(RateClass::PerFourByFour));
    }

    #[test]
    fn two_slot_prepass_waits_for_previous_classifier() {
        let settings = PipelineSettings {
            history_slots: 2,
            ..Default::default()
        };
        let mut p = pipeline(&settings);
        let camera = FirstPersonCamera::new(60.0, 64.0 / 48.0, 0.1, 256.0);
        p.render_frame(camera.view_projection()).unwrap();

        let target = p.backend().classification().target();
        let output = target.write();
        assert!(p.render_frame(camera.view_projection()).unwrap().dispatched);

        // The classifier of frame 1 reads slot 0 as its previous depth; the
        // pre-pass of frame 2 overwrites it.
        let frame = FrameContext {
            frame_index: 2,
            current_slot: 0,
            previous_slot: 1,
            toggles: p.toggles(),
        };
        p.backend_mut().submit_depth_prepass(&frame).unwrap();
        let ready = p.backend().depth_ready.clone().unwrap();
        assert!(
            ready.wait(Duration::from_millis(100)).is_err(),
            "pre-pass ran while the classifier still read its slot"
        );

        drop(output);
        ready.wait(Duration::from_secs(5)).unwrap();
        p.flush().unwrap();
    }
}
