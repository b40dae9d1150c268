//! wgpu Backend
//!
//! Runs the pipeline on a real GPU through wgpu. wgpu exposes a single
//! hardware queue, so the graphics and compute submissions of a frame are
//! ordered by submission order:
//!
//! ```text
//!   queue:  [prepass i] [publish i-1] [classify i] [main i + capture i]
//!                                           └─ on_submitted_work_done ─▶ fence
//! ```
//!
//! Shading-rate attachments are not part of core wgpu, so rate modulation is
//! done in `scene.wgsl`: the rate-adaptive pipelines read the bound R32Uint
//! classification texture and shade each coarse block from its anchor pixel.
//! Rendering is offscreen; [`GpuBackend::request_resize`] stands in for a
//! window-system resize.

pub mod context;
pub mod pipelines;
pub mod textures;
pub mod uniforms;

pub use context::GpuContext;
pub use pipelines::{GpuPipelines, PassKind, PipelineKey};
pub use textures::GpuImage;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::errors::{Result, VrsError};
use crate::rate::RateClass;
use crate::resources::{Extent, HistoryStore, TemporalTransform};
use crate::scene::{DrawEncoder, Material, RenderFlags, SceneProvider, Shape};
use crate::scheduler::{AcquireError, CompletionToken, FrameBackend, FrameContext};
use crate::settings::{PipelineSettings, ShadingToggles};
use context::{COLOR_FORMAT, DEPTH_FORMAT, RATE_FORMAT};
use uniforms::{ClassifyUniforms, FrameUniforms, PrimitiveUniforms};

#[derive(Debug, Clone, Copy)]
struct DrawItem {
    pipeline: PipelineKey,
    primitive: u32,
}

struct DrawCollector<'a> {
    pass: PassKind,
    alpha_mask: bool,
    items: &'a mut Vec<DrawItem>,
}

impl DrawEncoder for DrawCollector<'_> {
    // Materials live in the per-primitive uniforms.
    fn bind_material(&mut self, _material: &Material) {}

    fn draw(&mut self, primitive_index: usize, _shape: &Shape) {
        self.items.push(DrawItem {
            pipeline: PipelineKey::new(self.pass, self.alpha_mask),
            primitive: primitive_index as u32,
        });
    }
}

fn collect_draws(scene: &dyn SceneProvider, pass: PassKind, opaque_flags: RenderFlags) -> Vec<DrawItem> {
    let mut items = Vec::with_capacity(scene.primitives().len());
    scene.draw(
        &mut DrawCollector {
            pass,
            alpha_mask: false,
            items: &mut items,
        },
        opaque_flags,
    );
    scene.draw(
        &mut DrawCollector {
            pass,
            alpha_mask: true,
            items: &mut items,
        },
        RenderFlags::ALPHA_TESTED | RenderFlags::BIND_MATERIALS,
    );
    items
}

/// Classification storage: the classifier writes `target`, the main pass
/// samples `bound`. Publication copies one into the other.
struct GpuClassification {
    target: GpuImage,
    bound: GpuImage,
}

impl GpuClassification {
    fn new(ctx: &GpuContext, screen: Extent, settings: &PipelineSettings) -> Self {
        let grid = settings.tile_size.grid_for(screen);
        let target = GpuImage::new(
            &ctx.device,
            "classification target",
            grid,
            RATE_FORMAT,
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
        );
        let bound = GpuImage::new(
            &ctx.device,
            "classification bound",
            grid,
            RATE_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let finest = u32::from(RateClass::FINEST.index());
        textures::fill_u32(&ctx.queue, &target, finest);
        textures::fill_u32(&ctx.queue, &bound, finest);
        Self { target, bound }
    }
}

fn alloc_depth(device: &wgpu::Device, extent: Extent) -> GpuImage {
    GpuImage::new(
        device,
        "depth history",
        extent,
        DEPTH_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
    )
}

fn alloc_color_history(device: &wgpu::Device, extent: Extent) -> GpuImage {
    GpuImage::new(
        device,
        "color history",
        extent,
        COLOR_FORMAT,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    )
}

fn alloc_color_target(device: &wgpu::Device, extent: Extent) -> GpuImage {
    GpuImage::new(
        device,
        "color target",
        extent,
        COLOR_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
    )
}

/// Everything that is recreated with the swap chain.
struct SizedResources {
    history: HistoryStore<GpuImage, GpuImage>,
    color_target: GpuImage,
    classification: GpuClassification,
}

pub struct GpuBackend {
    ctx: GpuContext,
    settings: PipelineSettings,
    scene: Arc<dyn SceneProvider>,
    pipelines: GpuPipelines,

    extent: Extent,
    requested: Option<Extent>,
    sized: SizedResources,

    frame_buffer: wgpu::Buffer,
    classify_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    /// One per current depth slot; the previous slot is implied by the ring.
    classify_bind_groups: Vec<wgpu::BindGroup>,
    primitive_bind_group: wgpu::BindGroup,
    primitive_stride: u32,

    transform: TemporalTransform,
    toggles: ShadingToggles,
    prepass_draws: Vec<DrawItem>,
    main_draws: Vec<DrawItem>,
    presented: u64,
}

impl GpuBackend {
    pub fn new(settings: &PipelineSettings, extent: Extent, scene: Arc<dyn SceneProvider>) -> Result<Self> {
        settings.validate()?;
        let extent = Extent::validated(extent.width, extent.height)?;
        let ctx = pollster::block_on(GpuContext::new(settings))?;
        let pipelines = GpuPipelines::build(&ctx.device, settings.alpha_cutoff);

        let frame_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let classify_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Classify Uniforms"),
            size: size_of::<ClassifyUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (primitive_buffer, primitive_stride) = Self::upload_primitives(&ctx, scene.as_ref());
        let primitive_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Primitive BindGroup"),
            layout: &pipelines.primitive_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &primitive_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(size_of::<PrimitiveUniforms>() as u64),
                }),
            }],
        });

        let device = &ctx.device;
        let sized = SizedResources {
            history: HistoryStore::allocate(
                settings.history_slots,
                extent,
                |_, extent| Ok(alloc_depth(device, extent)),
                |extent| Ok(alloc_color_history(device, extent)),
            )?,
            color_target: alloc_color_target(device, extent),
            classification: GpuClassification::new(&ctx, extent, settings),
        };
        let (frame_bind_group, classify_bind_groups) =
            Self::create_bind_groups(&ctx, &pipelines, &sized, &frame_buffer, &classify_buffer);

        info!(
            "GPU backend ready on {}: {}x{}, {} primitives",
            ctx.adapter_name,
            extent.width,
            extent.height,
            scene.primitives().len()
        );

        Ok(Self {
            ctx,
            settings: settings.clone(),
            scene,
            pipelines,
            extent,
            requested: None,
            sized,
            frame_buffer,
            classify_buffer,
            frame_bind_group,
            classify_bind_groups,
            primitive_bind_group,
            primitive_stride,
            transform: TemporalTransform::default(),
            toggles: settings.initial_toggles(),
            prepass_draws: Vec::new(),
            main_draws: Vec::new(),
            presented: 0,
        })
    }

    /// One uniform block per primitive, each at a dynamic-offset-aligned
    /// stride.
    fn upload_primitives(ctx: &GpuContext, scene: &dyn SceneProvider) -> (wgpu::Buffer, u32) {
        let align = ctx.device.limits().min_uniform_buffer_offset_alignment.max(1);
        let stride = (size_of::<PrimitiveUniforms>() as u32).div_ceil(align) * align;
        let count = scene.primitives().len().max(1);

        let mut bytes = vec![0u8; stride as usize * count];
        for (i, primitive) in scene.primitives().iter().enumerate() {
            let block = PrimitiveUniforms::from(primitive);
            let offset = i * stride as usize;
            bytes[offset..offset + size_of::<PrimitiveUniforms>()].copy_from_slice(bytemuck::bytes_of(&block));
        }

        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Primitive Uniforms"),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&buffer, 0, &bytes);
        (buffer, stride)
    }

    fn create_bind_groups(
        ctx: &GpuContext,
        pipelines: &GpuPipelines,
        sized: &SizedResources,
        frame_buffer: &wgpu::Buffer,
        classify_buffer: &wgpu::Buffer,
    ) -> (wgpu::BindGroup, Vec<wgpu::BindGroup>) {
        let device = &ctx.device;
        let history = &sized.history;
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Frame BindGroup"),
            layout: &pipelines.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&sized.classification.bound.view),
                },
            ],
        });

        let slots = history.slot_count();
        let classify_bind_groups = (0..slots)
            .map(|current| {
                let previous = (current + slots - 1) % slots;
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Rate Classify BindGroup"),
                    layout: &pipelines.classify_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: classify_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&history.depth_slot(previous).view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&history.depth_slot(current).view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&history.color_slot().view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::TextureView(&sized.classification.target.view),
                        },
                    ],
                })
            })
            .collect();

        (frame_bind_group, classify_bind_groups)
    }

    fn create_encoder(&self, label: &'static str) -> wgpu::CommandEncoder {
        self.ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn write_frame_uniforms(&self) {
        let uniforms = FrameUniforms::new(
            &self.transform,
            self.settings.light_position,
            self.extent,
            self.settings.tile_size,
            self.toggles.visualize_rates,
        );
        self.ctx
            .queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    fn encode_draws(&self, pass: &mut wgpu::RenderPass<'_>, draws: &[DrawItem]) -> Result<()> {
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        let mut bound: Option<PipelineKey> = None;
        for item in draws {
            if bound != Some(item.pipeline) {
                let pipeline = self.pipelines.raster(item.pipeline).ok_or_else(|| {
                    VrsError::MissingCapability(format!("no pipeline built for {:?}", item.pipeline))
                })?;
                pass.set_pipeline(pipeline);
                bound = Some(item.pipeline);
            }
            pass.set_bind_group(1, &self.primitive_bind_group, &[item.primitive * self.primitive_stride]);
            pass.draw(0..3, 0..1);
        }
        Ok(())
    }

    /// The window system asks for a new size; the next acquire reports
    /// out-of-date.
    pub fn request_resize(&mut self, extent: Extent) {
        self.requested = Some(extent);
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    #[inline]
    #[must_use]
    pub fn color_target(&self) -> &GpuImage {
        &self.sized.color_target
    }

    #[inline]
    #[must_use]
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl FrameBackend for GpuBackend {
    type DepthSlot = GpuImage;
    type ColorSlot = GpuImage;

    fn extent(&self) -> Extent {
        self.extent
    }

    fn history(&self) -> &HistoryStore<GpuImage, GpuImage> {
        &self.sized.history
    }

    fn history_mut(&mut self) -> &mut HistoryStore<GpuImage, GpuImage> {
        &mut self.sized.history
    }

    fn surface_extent(&self) -> Extent {
        self.requested.unwrap_or(self.extent)
    }

    fn acquire(&mut self) -> std::result::Result<(), AcquireError> {
        if self.requested.is_some() {
            return Err(AcquireError::OutOfDate);
        }
        Ok(())
    }

    fn upload_transforms(&mut self, transform: &TemporalTransform) {
        self.transform = *transform;
        self.write_frame_uniforms();
    }

    fn rebuild_commands(&mut self, toggles: ShadingToggles) -> Result<()> {
        self.toggles = toggles;
        self.prepass_draws = collect_draws(self.scene.as_ref(), PassKind::DepthPrepass, RenderFlags::OPAQUE);
        self.main_draws = collect_draws(
            self.scene.as_ref(),
            PassKind::Main(toggles.variant),
            RenderFlags::OPAQUE | RenderFlags::BIND_MATERIALS,
        );
        self.write_frame_uniforms();
        debug!(
            "Collected {} pre-pass draws, {} main draws",
            self.prepass_draws.len(),
            self.main_draws.len()
        );
        Ok(())
    }

    fn submit_depth_prepass(&mut self, frame: &FrameContext) -> Result<()> {
        let depth = self.sized.history.depth_slot(frame.current_slot);
        let mut encoder = self.create_encoder("Depth Prepass Encoder");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Depth Prepass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            self.encode_draws(&mut pass, &self.prepass_draws)?;
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: &CompletionToken, timeout: Duration) -> Result<()> {
        self.ctx.poll_until(fence, timeout)
    }

    fn publish_classification(&mut self) -> Result<()> {
        let classification = &self.sized.classification;
        let mut encoder = self.create_encoder("Classification Publish Encoder");
        textures::copy_image(&mut encoder, &classification.target, &classification.bound)?;
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn submit_classification(&mut self, frame: &FrameContext, fence: &CompletionToken) -> Result<()> {
        let uniforms = ClassifyUniforms::new(
            &self.transform,
            &self.settings.thresholds,
            self.settings.weights,
            self.extent,
            self.settings.tile_size,
        );
        self.ctx
            .queue
            .write_buffer(&self.classify_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = self
            .classify_bind_groups
            .get(frame.current_slot)
            .ok_or_else(|| VrsError::QueueSubmit {
                queue: "compute",
                reason: format!("no classifier bind group for slot {}", frame.current_slot),
            })?;
        let grid = self.sized.classification.target.extent;

        let mut encoder = self.create_encoder("Rate Classify Encoder");
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Rate Classify Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.classify);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(grid.width, grid.height, 1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        self.ctx.signal_on_completion(fence);
        Ok(())
    }

    fn submit_main_pass(&mut self, frame: &FrameContext) -> Result<()> {
        let depth = self.sized.history.depth_slot(frame.current_slot);
        let [r, g, b, a] = self.settings.clear_color.map(f64::from);
        let mut encoder = self.create_encoder("Main Pass Encoder");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.sized.color_target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            self.encode_draws(&mut pass, &self.main_draws)?;
        }
        // Color capture rides in the same submission, after the main pass.
        textures::copy_image(
            &mut encoder,
            &self.sized.color_target,
            self.sized.history.color_slot(),
        )?;
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presented += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.ctx.wait_idle(self.settings.fence_timeout())
    }

    fn recreate(&mut self, extent: Extent) -> Result<()> {
        let extent = Extent::validated(extent.width, extent.height)?;
        let device = &self.ctx.device;
        self.sized.history.reallocate(
            extent,
            |_, extent| Ok(alloc_depth(device, extent)),
            |extent| Ok(alloc_color_history(device, extent)),
        )?;
        self.sized.color_target = alloc_color_target(device, extent);
        self.sized.classification = GpuClassification::new(&self.ctx, extent, &self.settings);
        (self.frame_bind_group, self.classify_bind_groups) = Self::create_bind_groups(
            &self.ctx,
            &self.pipelines,
            &self.sized,
            &self.frame_buffer,
            &self.classify_buffer,
        );
        self.extent = extent;
        self.requested = None;
        self.write_frame_uniforms();
        info!("GPU targets recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        // Textures must outlive the work that reads them.
        let _ = self.ctx.wait_idle(self.settings.fence_timeout());
    }
}
