//! Recorded command streams and the pipelines they bind.

use glam::{Vec2, Vec3};

use crate::scene::{DrawEncoder, Material, RenderFlags, SceneProvider, Shape, SurfaceHit};
use crate::settings::{RenderVariant, ShadingToggles};

// ─── Pipelines ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

/// Coverage behavior baked into a pipeline when it is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaMode {
    Opaque,
    Mask { cutoff: f32 },
}

type CoverageFn = fn(&Material, Vec2, f32) -> bool;

fn coverage<const ALPHA_MASK: bool>(material: &Material, uv: Vec2, cutoff: f32) -> bool {
    !ALPHA_MASK || material.alpha_at(uv) >= cutoff
}

/// A built raster pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RasterPipeline {
    pub label: &'static str,
    pub alpha: AlphaMode,
    pub cull: CullMode,
    /// Color writes enabled; depth-only pipelines leave this off.
    pub writes_color: bool,
    /// Shading density follows the bound shading-rate image.
    pub rate_adaptive: bool,
    coverage: CoverageFn,
    cutoff: f32,
}

impl RasterPipeline {
    /// Alpha-masked pipelines render both faces, opaque ones cull back faces.
    #[must_use]
    pub fn new(label: &'static str, alpha: AlphaMode, writes_color: bool, rate_adaptive: bool) -> Self {
        let (cull, coverage, cutoff): (CullMode, CoverageFn, f32) = match alpha {
            AlphaMode::Opaque => (CullMode::Back, coverage::<false>, 0.0),
            AlphaMode::Mask { cutoff } => (CullMode::None, coverage::<true>, cutoff),
        };
        Self {
            label,
            alpha,
            cull,
            writes_color,
            rate_adaptive,
            coverage,
            cutoff,
        }
    }

    /// Rasterizer cull plus fragment discard.
    #[must_use]
    pub fn accepts(&self, material: &Material, hit: &SurfaceHit) -> bool {
        if self.cull == CullMode::Back && !hit.front_facing {
            return false;
        }
        (self.coverage)(material, hit.uv, self.cutoff)
    }
}

/// Opaque + alpha-tested pipelines drawn one after the other.
#[derive(Debug, Clone, Copy)]
pub struct PipelinePair {
    pub opaque: RasterPipeline,
    pub alpha_tested: RasterPipeline,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSet {
    pub depth: PipelinePair,
    pub baseline: PipelinePair,
    pub rate_adaptive: PipelinePair,
}

impl PipelineSet {
    #[must_use]
    pub fn build(alpha_cutoff: f32) -> Self {
        let mask = AlphaMode::Mask {
            cutoff: alpha_cutoff,
        };
        Self {
            depth: PipelinePair {
                opaque: RasterPipeline::new("depth/opaque", AlphaMode::Opaque, false, false),
                alpha_tested: RasterPipeline::new("depth/masked", mask, false, false),
            },
            baseline: PipelinePair {
                opaque: RasterPipeline::new("baseline/opaque", AlphaMode::Opaque, true, false),
                alpha_tested: RasterPipeline::new("baseline/masked", mask, true, false),
            },
            rate_adaptive: PipelinePair {
                opaque: RasterPipeline::new("vrs/opaque", AlphaMode::Opaque, true, true),
                alpha_tested: RasterPipeline::new("vrs/masked", mask, true, true),
            },
        }
    }

    #[must_use]
    pub fn main(&self, variant: RenderVariant) -> &PipelinePair {
        match variant {
            RenderVariant::Baseline => &self.baseline,
            RenderVariant::RateAdaptive => &self.rate_adaptive,
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

/// Per-stream constants, fixed at record time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingConstants {
    pub light_position: Vec3,
    pub visualize_rates: bool,
}

#[derive(Debug, Clone)]
pub enum Command {
    BeginPass {
        /// `None` for depth-only passes.
        color: Option<LoadOp<[f32; 4]>>,
        depth: LoadOp<f32>,
    },
    SetConstants(ShadingConstants),
    BindPipeline(RasterPipeline),
    BindShadingRateImage,
    BindMaterial(Material),
    Draw {
        primitive: usize,
        shape: Shape,
    },
    EndPass,
}

#[derive(Debug, Clone)]
pub struct CommandStream {
    pub label: &'static str,
    pub commands: Vec<Command>,
}

impl CommandStream {
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }

    #[must_use]
    pub fn binds_shading_rate_image(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, Command::BindShadingRateImage))
    }
}

struct Recorder<'a> {
    commands: &'a mut Vec<Command>,
}

impl DrawEncoder for Recorder<'_> {
    fn bind_material(&mut self, material: &Material) {
        self.commands.push(Command::BindMaterial(*material));
    }

    fn draw(&mut self, primitive_index: usize, shape: &Shape) {
        self.commands.push(Command::Draw {
            primitive: primitive_index,
            shape: *shape,
        });
    }
}

fn record_partitions(
    commands: &mut Vec<Command>,
    scene: &dyn SceneProvider,
    pair: &PipelinePair,
    opaque_flags: RenderFlags,
) {
    commands.push(Command::BindPipeline(pair.opaque));
    scene.draw(&mut Recorder { commands: &mut *commands }, opaque_flags);
    commands.push(Command::BindPipeline(pair.alpha_tested));
    scene.draw(
        &mut Recorder { commands: &mut *commands },
        RenderFlags::ALPHA_TESTED | RenderFlags::BIND_MATERIALS,
    );
}

/// Depth-only traversal: opaque, then alpha-tested with materials bound for
/// the discard test.
#[must_use]
pub fn record_depth_prepass(scene: &dyn SceneProvider, pipelines: &PipelineSet) -> CommandStream {
    let mut commands = vec![Command::BeginPass {
        color: None,
        depth: LoadOp::Clear(1.0),
    }];
    record_partitions(&mut commands, scene, &pipelines.depth, RenderFlags::OPAQUE);
    commands.push(Command::EndPass);
    CommandStream {
        label: "depth prepass",
        commands,
    }
}

/// Main forward pass. Depth is loaded from the pre-pass, never cleared.
#[must_use]
pub fn record_main_pass(
    scene: &dyn SceneProvider,
    pipelines: &PipelineSet,
    toggles: ShadingToggles,
    clear_color: [f32; 4],
    light_position: Vec3,
) -> CommandStream {
    let mut commands = vec![
        Command::BeginPass {
            color: Some(LoadOp::Clear(clear_color)),
            depth: LoadOp::Load,
        },
        Command::SetConstants(ShadingConstants {
            light_position,
            visualize_rates: toggles.visualize_rates,
        }),
    ];
    if toggles.variant.binds_classification() {
        commands.push(Command::BindShadingRateImage);
    }
    record_partitions(
        &mut commands,
        scene,
        pipelines.main(toggles.variant),
        RenderFlags::OPAQUE | RenderFlags::BIND_MATERIALS,
    );
    commands.push(Command::EndPass);
    CommandStream {
        label: "main pass",
        commands,
    }
}
