//! GPU-side uniform layouts. Each struct mirrors its WGSL counterpart field
//! for field.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::rate::{DiscrepancyWeights, ThresholdTable};
use crate::resources::{Extent, TemporalTransform, TileSize};
use crate::scene::{AlphaSource, Primitive, Shape};

/// Thresholds the classifier kernel can hold.
pub const MAX_GPU_THRESHOLDS: usize = 15;

const SHAPE_SPHERE: u32 = 0;
const SHAPE_QUAD: u32 = 1;

/// `FrameUniforms` in `scene.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub light_position: Vec4,
    pub extent: [u32; 2],
    pub tile: [u32; 2],
    pub visualize_rates: u32,
    pub _pad: [u32; 3],
}

impl FrameUniforms {
    #[must_use]
    pub fn new(
        transform: &TemporalTransform,
        light_position: [f32; 4],
        extent: Extent,
        tile: TileSize,
        visualize_rates: bool,
    ) -> Self {
        Self {
            view_projection: transform.current(),
            inverse_view_projection: transform.inverse_current(),
            light_position: Vec4::from_array(light_position),
            extent: [extent.width, extent.height],
            tile: [tile.width, tile.height],
            visualize_rates: u32::from(visualize_rates),
            _pad: [0; 3],
        }
    }
}

/// `PrimitiveUniforms` in `scene.wgsl`, bound with a dynamic offset per draw.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct PrimitiveUniforms {
    pub kind: u32,
    pub alpha_cells: u32,
    pub _pad: [u32; 2],
    pub center_radius: Vec4,
    pub half_u: Vec4,
    pub half_v: Vec4,
    pub base_color: Vec4,
    pub alpha_range: Vec4,
}

impl From<&Primitive> for PrimitiveUniforms {
    fn from(primitive: &Primitive) -> Self {
        let mut out = Self::zeroed();
        match primitive.shape {
            Shape::Sphere { center, radius } => {
                out.kind = SHAPE_SPHERE;
                out.center_radius = center.extend(radius);
            }
            Shape::Quad {
                center,
                half_u,
                half_v,
            } => {
                out.kind = SHAPE_QUAD;
                out.center_radius = center.extend(0.0);
                out.half_u = half_u.extend(0.0);
                out.half_v = half_v.extend(0.0);
            }
        }
        let [r, g, b] = primitive.material.base_color;
        out.base_color = Vec4::new(r, g, b, 1.0);
        if let AlphaSource::Checker { cells, low, high } = primitive.material.alpha {
            out.alpha_cells = cells.max(1);
            out.alpha_range = Vec4::new(low, high, 0.0, 0.0);
        }
        out
    }
}

/// `ClassifyUniforms` in `rate_classify.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ClassifyUniforms {
    pub inverse_current: Mat4,
    pub previous: Mat4,
    pub inverse_previous: Mat4,
    pub weights: Vec4,
    pub thresholds: [[f32; 4]; 4],
    pub ladder: [[u32; 4]; 4],
    pub extent: [u32; 2],
    pub tile: [u32; 2],
    pub threshold_count: u32,
    pub _pad: [u32; 3],
}

impl ClassifyUniforms {
    /// `table` must hold at most [`MAX_GPU_THRESHOLDS`] thresholds.
    #[must_use]
    pub fn new(
        transform: &TemporalTransform,
        table: &ThresholdTable,
        weights: DiscrepancyWeights,
        extent: Extent,
        tile: TileSize,
    ) -> Self {
        let mut thresholds = [[0.0f32; 4]; 4];
        for (i, t) in table.thresholds().iter().take(MAX_GPU_THRESHOLDS).enumerate() {
            thresholds[i / 4][i % 4] = *t;
        }
        let mut ladder = [[0u32; 4]; 4];
        for (i, class) in table.ladder().iter().take(MAX_GPU_THRESHOLDS + 1).enumerate() {
            ladder[i / 4][i % 4] = u32::from(class.index());
        }
        Self {
            inverse_current: transform.inverse_current(),
            previous: transform.previous(),
            inverse_previous: transform.inverse_previous(),
            weights: Vec4::new(weights.depth, weights.color, weights.motion, 0.0),
            thresholds,
            ladder,
            extent: [extent.width, extent.height],
            tile: [tile.width, tile.height],
            threshold_count: table.thresholds().len().min(MAX_GPU_THRESHOLDS) as u32,
            _pad: [0; 3],
        }
    }
}
