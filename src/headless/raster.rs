//! Command-stream execution on host images.
//!
//! Primitives are rasterized by casting one ray per pixel center, which
//! gives the same coverage and depth a triangle rasterizer would for the
//! analytic shapes the scene provides.

use glam::{Mat4, Vec2, Vec3};

use super::commands::{Command, CommandStream, LoadOp, RasterPipeline, ShadingConstants};
use crate::errors::{Result, VrsError};
use crate::rate::RateClass;
use crate::resources::transform::{project, unproject};
use crate::resources::{ColorImage, DepthImage, Extent, ImageLayout, TileGrid, TileSize, pack_rgba8};
use crate::scene::{Material, Ray, Shape, SurfaceHit};

/// Slack for re-testing a fragment against depth written by the pre-pass.
const DEPTH_EQUAL_EPSILON: f32 = 1e-6;

/// Counters gathered by one main pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    /// Fragment-shader invocations issued.
    pub shaded_invocations: u64,
    /// Pixels written by any draw.
    pub covered_pixels: u64,
    /// Tiles skipped through the no-shading class.
    pub skipped_tiles: u32,
    /// Tiles per rate class as seen by the pass.
    pub class_histogram: [u32; RateClass::PALETTE.len()],
}

impl FrameStats {
    /// Invocations per covered pixel; 1.0 for full-rate shading.
    #[must_use]
    pub fn shading_ratio(&self) -> f32 {
        if self.covered_pixels == 0 {
            return 0.0;
        }
        self.shaded_invocations as f32 / self.covered_pixels as f32
    }
}

/// Camera used to turn pixels into rays and hits into depth.
#[derive(Debug, Clone, Copy)]
pub struct RasterView {
    view_projection: Mat4,
    inverse: Mat4,
}

impl RasterView {
    #[must_use]
    pub fn new(view_projection: Mat4) -> Self {
        Self {
            view_projection,
            inverse: view_projection.inverse(),
        }
    }

    fn ray(&self, extent: Extent, x: u32, y: u32) -> Ray {
        let ndc = Vec2::new(
            (x as f32 + 0.5) / extent.width as f32 * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / extent.height as f32 * 2.0,
        );
        let near = unproject(self.inverse, ndc.extend(0.0));
        let far = unproject(self.inverse, ndc.extend(1.0));
        Ray::new(near, far - near)
    }

    fn depth_of(&self, position: Vec3) -> f32 {
        let clip = project(self.view_projection, position);
        clip.z / clip.w
    }
}

/// Depth attachment as bound by a pass.
pub enum DepthTarget<'a> {
    Write(&'a mut DepthImage),
    /// Depth test only; the main pass never writes depth.
    ReadOnly(&'a DepthImage),
}

impl DepthTarget<'_> {
    fn image(&self) -> &DepthImage {
        match self {
            Self::Write(depth) => &**depth,
            Self::ReadOnly(depth) => &**depth,
        }
    }

    fn image_mut(&mut self) -> Result<&mut DepthImage> {
        match self {
            Self::Write(depth) => Ok(&mut **depth),
            Self::ReadOnly(depth) => Err(VrsError::LayoutMismatch {
                image: depth.label(),
                expected: ImageLayout::DepthAttachment.name(),
                actual: depth.layout().name(),
            }),
        }
    }
}

/// Attachments and bindable images for one stream.
pub struct PassTargets<'a> {
    pub depth: DepthTarget<'a>,
    pub color: Option<&'a mut ColorImage>,
    /// Bound only if the stream records `BindShadingRateImage`.
    pub rate_image: Option<&'a TileGrid>,
    pub tile: TileSize,
}

struct Fragment {
    hit: SurfaceHit,
    depth: f32,
}

struct Executor<'a, 'b> {
    view: RasterView,
    targets: &'b mut PassTargets<'a>,
    pipeline: Option<RasterPipeline>,
    material: Material,
    constants: ShadingConstants,
    rate_bound: bool,
    stats: FrameStats,
}

/// Runs `stream` against `targets`.
pub fn execute(stream: &CommandStream, view: RasterView, targets: &mut PassTargets<'_>) -> Result<FrameStats> {
    let mut exec = Executor {
        view,
        targets,
        pipeline: None,
        material: Material::default(),
        constants: ShadingConstants {
            light_position: Vec3::ZERO,
            visualize_rates: false,
        },
        rate_bound: false,
        stats: FrameStats::default(),
    };
    for command in &stream.commands {
        exec.run(command)?;
    }
    Ok(exec.stats)
}

impl Executor<'_, '_> {
    fn run(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::BeginPass { color, depth } => self.begin_pass(*color, *depth)?,
            Command::SetConstants(constants) => self.constants = *constants,
            Command::BindPipeline(pipeline) => self.pipeline = Some(*pipeline),
            Command::BindShadingRateImage => {
                if self.targets.rate_image.is_none() {
                    return Err(VrsError::MissingCapability(
                        "shading-rate image bound without a classification buffer".into(),
                    ));
                }
                self.rate_bound = true;
                self.record_histogram();
            }
            Command::BindMaterial(material) => self.material = *material,
            Command::Draw { shape, .. } => self.draw(shape)?,
            Command::EndPass => {
                // Depth leaves the pass read-only for the main pass and the
                // classifier.
                if let DepthTarget::Write(depth) = &mut self.targets.depth {
                    depth.transition(ImageLayout::DepthAttachment, ImageLayout::ShaderRead)?;
                }
            }
        }
        Ok(())
    }

    fn begin_pass(&mut self, color: Option<LoadOp<[f32; 4]>>, depth: LoadOp<f32>) -> Result<()> {
        match depth {
            LoadOp::Clear(value) => {
                let target = self.targets.depth.image_mut()?;
                target.transition(ImageLayout::Undefined, ImageLayout::DepthAttachment)?;
                target.fill(value);
            }
            LoadOp::Load => self.targets.depth.image().require_layout(ImageLayout::ShaderRead)?,
        }
        if let Some(load) = color {
            let target = self
                .targets
                .color
                .as_deref_mut()
                .ok_or_else(|| VrsError::MissingCapability("color pass without a color target".into()))?;
            match load {
                LoadOp::Clear(value) => {
                    target.transition(ImageLayout::Undefined, ImageLayout::ColorAttachment)?;
                    target.fill(pack_rgba8(value));
                }
                LoadOp::Load => target.require_layout(ImageLayout::ColorAttachment)?,
            }
        }
        if !self.rate_bound {
            self.stats.class_histogram[RateClass::FINEST.index() as usize] =
                self.targets.tile.grid_for(self.targets.depth.image().extent()).area() as u32;
        }
        Ok(())
    }

    fn record_histogram(&mut self) {
        if let Some(grid) = self.targets.rate_image {
            self.stats.class_histogram = grid.histogram();
        }
    }

    /// Nearest fragment of `shape` at pixel `(x, y)` that survives culling
    /// and alpha discard.
    fn fragment(&self, pipeline: &RasterPipeline, shape: &Shape, x: u32, y: u32) -> Option<Fragment> {
        let ray = self.view.ray(self.targets.depth.image().extent(), x, y);
        shape
            .intersections(&ray)
            .into_iter()
            .find(|hit| pipeline.accepts(&self.material, hit))
            .map(|hit| Fragment {
                depth: self.view.depth_of(hit.position),
                hit,
            })
            .filter(|f| (0.0..=1.0).contains(&f.depth))
    }

    fn draw(&mut self, shape: &Shape) -> Result<()> {
        let Some(pipeline) = self.pipeline else {
            return Ok(());
        };
        if pipeline.writes_color {
            self.draw_color(&pipeline, shape);
            Ok(())
        } else {
            self.draw_depth(&pipeline, shape)
        }
    }

    fn draw_depth(&mut self, pipeline: &RasterPipeline, shape: &Shape) -> Result<()> {
        let extent = self.targets.depth.image().extent();
        for y in 0..extent.height {
            for x in 0..extent.width {
                let Some(frag) = self.fragment(pipeline, shape, x, y) else {
                    continue;
                };
                let depth = self.targets.depth.image_mut()?;
                if frag.depth <= depth.get(x, y) {
                    depth.set(x, y, frag.depth);
                }
            }
        }
        Ok(())
    }

    fn tile_class(&self, pipeline: &RasterPipeline, tx: u32, ty: u32) -> RateClass {
        match self.targets.rate_image {
            Some(grid) if self.rate_bound && pipeline.rate_adaptive => grid.get(tx, ty),
            _ => RateClass::FINEST,
        }
    }

    /// Shades one invocation per coarse block of each tile and broadcasts
    /// the result to every covered pixel of the block.
    fn draw_color(&mut self, pipeline: &RasterPipeline, shape: &Shape) {
        let extent = self.targets.depth.image().extent();
        let tile = self.targets.tile;
        let grid = tile.grid_for(extent);
        let mut covered: Vec<(u32, u32)> = Vec::with_capacity(16);

        for ty in 0..grid.height {
            for tx in 0..grid.width {
                let class = self.tile_class(pipeline, tx, ty);
                if class == RateClass::NoInvocations {
                    self.stats.skipped_tiles += 1;
                    continue;
                }
                let (bw, bh) = class.coarse_block();
                let x_end = ((tx + 1) * tile.width).min(extent.width);
                let y_end = ((ty + 1) * tile.height).min(extent.height);

                for by in (ty * tile.height..y_end).step_by(bh as usize) {
                    for bx in (tx * tile.width..x_end).step_by(bw as usize) {
                        covered.clear();
                        let mut anchor = None;
                        for y in by..(by + bh).min(y_end) {
                            for x in bx..(bx + bw).min(x_end) {
                                let Some(frag) = self.fragment(pipeline, shape, x, y) else {
                                    continue;
                                };
                                if frag.depth <= self.targets.depth.image().get(x, y) + DEPTH_EQUAL_EPSILON {
                                    covered.push((x, y));
                                    anchor.get_or_insert(frag.hit);
                                }
                            }
                        }
                        let Some(hit) = anchor else {
                            continue;
                        };
                        let texel = pack_rgba8(self.shade(&hit, class));
                        if let Some(color) = self.targets.color.as_deref_mut() {
                            for (x, y) in &covered {
                                color.set(*x, *y, texel);
                            }
                        }
                        self.stats.shaded_invocations += u64::from(class.samples());
                        self.stats.covered_pixels += covered.len() as u64;
                    }
                }
            }
        }
    }

    fn shade(&self, hit: &SurfaceHit, class: RateClass) -> [f32; 4] {
        let to_light = (self.constants.light_position - hit.position).normalize_or_zero();
        let diffuse = hit.normal.dot(to_light).max(0.0);
        let base = Vec3::from(self.material.base_color) * (0.25 + 0.75 * diffuse);
        let rgb = if self.constants.visualize_rates {
            base.lerp(Vec3::from(class.debug_color()), 0.5)
        } else {
            base
        };
        rgb.extend(1.0).to_array()
    }
}
