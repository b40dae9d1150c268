//! Reprojection-driven tile classification.
//!
//! Reference implementation of the classifier compute stage. The WGSL
//! kernel of the GPU backend evaluates the same per-pixel metric; the
//! headless backend runs this code on its compute queue.
//!
//! Per pixel `p` of a tile:
//!
//! 1. Reconstruct the world position from the current depth with
//!    `inverse(current)`.
//! 2. Reproject with `previous` to pixel `p'`. Behind the previous camera or
//!    outside its viewport: fully disoccluded, discrepancy 1.
//! 3. Background on one side and geometry on the other: newly visible
//!    surface, discrepancy 1.
//! 4. Otherwise the maximum of the weighted relative view-depth error, the
//!    luma difference `prev_color[p']` vs `prev_color[p]`, and the screen
//!    motion `|p' - p|` in tile widths, clamped to `[0, 1]`.
//!
//! The tile takes the maximum over its pixels and maps it through the
//! [`ThresholdTable`].

use glam::{Vec2, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{RateClass, ThresholdTable};
use crate::errors::{Result, VrsError};
use crate::resources::transform::{project, unproject};
use crate::resources::{ColorImage, DepthImage, Extent, TemporalTransform, TileGrid, TileSize, luma};

/// Clip-space `w` at or below this counts as behind the camera.
const W_EPSILON: f32 = 1e-5;

/// Scale factors applied to each discrepancy term before taking the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyWeights {
    /// Relative view-depth error.
    pub depth: f32,
    /// Luma difference of the reprojected previous color.
    pub color: f32,
    /// Screen-space motion, in tile widths.
    pub motion: f32,
}

impl Default for DiscrepancyWeights {
    fn default() -> Self {
        Self {
            depth: 4.0,
            color: 1.0,
            motion: 0.25,
        }
    }
}

/// Images and matrices read by one classifier dispatch.
#[derive(Clone, Copy)]
pub struct ClassifierInputs<'a> {
    pub previous_depth: &'a DepthImage,
    pub current_depth: &'a DepthImage,
    pub previous_color: &'a ColorImage,
    pub transform: &'a TemporalTransform,
}

impl ClassifierInputs<'_> {
    fn extent(&self) -> Extent {
        self.current_depth.extent()
    }

    fn check_extents(&self) -> Result<()> {
        let extent = self.extent();
        for (label, other) in [
            (self.previous_depth.label(), self.previous_depth.extent()),
            (self.previous_color.label(), self.previous_color.extent()),
        ] {
            if other != extent {
                return Err(VrsError::ExtentMismatch {
                    image: label,
                    detail: format!(
                        "classifier input is {}x{}, current depth is {}x{}",
                        other.width, other.height, extent.width, extent.height
                    ),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RateClassifier {
    table: ThresholdTable,
    weights: DiscrepancyWeights,
    tile: TileSize,
}

impl RateClassifier {
    #[must_use]
    pub fn new(table: ThresholdTable, weights: DiscrepancyWeights, tile: TileSize) -> Self {
        Self {
            table,
            weights,
            tile,
        }
    }

    #[inline]
    #[must_use]
    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    #[inline]
    #[must_use]
    pub fn tile_size(&self) -> TileSize {
        self.tile
    }

    /// Discrepancy of a single pixel, in `[0, 1]`.
    #[must_use]
    pub fn pixel_discrepancy(&self, inputs: &ClassifierInputs<'_>, x: u32, y: u32) -> f32 {
        let extent = inputs.extent();
        let size = Vec2::new(extent.width as f32, extent.height as f32);
        let pixel = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
        let ndc = Vec2::new(pixel.x / size.x * 2.0 - 1.0, 1.0 - pixel.y / size.y * 2.0);

        let current_depth = inputs.current_depth.get(x, y);
        let background = current_depth >= 1.0;
        let world = unproject(
            inputs.transform.inverse_current(),
            ndc.extend(current_depth.min(1.0)),
        );

        let clip = project(inputs.transform.previous(), world);
        if clip.w <= W_EPSILON {
            return 1.0;
        }
        let prev_ndc = clip.truncate() / clip.w;
        if prev_ndc.x.abs() > 1.0 || prev_ndc.y.abs() > 1.0 {
            return 1.0;
        }

        let prev_pixel = Vec2::new(
            (prev_ndc.x + 1.0) * 0.5 * size.x,
            (1.0 - prev_ndc.y) * 0.5 * size.y,
        );
        let px = (prev_pixel.x as u32).min(extent.width - 1);
        let py = (prev_pixel.y as u32).min(extent.height - 1);

        let stored_depth = inputs.previous_depth.get(px, py);
        if (stored_depth >= 1.0) != background {
            return 1.0;
        }

        let depth_term = if background {
            0.0
        } else {
            let stored = unproject(
                inputs.transform.inverse_previous(),
                Vec3::new(prev_ndc.x, prev_ndc.y, stored_depth),
            );
            let stored_w = project(inputs.transform.previous(), stored).w;
            (clip.w - stored_w).abs() / clip.w.max(stored_w).max(W_EPSILON)
        };
        let color_term = (luma(inputs.previous_color.get(px, py))
            - luma(inputs.previous_color.get(x, y)))
        .abs();
        let motion_term = (prev_pixel - pixel).length() / self.tile.width as f32;

        let w = &self.weights;
        (w.depth * depth_term)
            .max(w.color * color_term)
            .max(w.motion * motion_term)
            .clamp(0.0, 1.0)
    }

    /// Maximum pixel discrepancy over tile `(tx, ty)`.
    #[must_use]
    pub fn tile_discrepancy(&self, inputs: &ClassifierInputs<'_>, tx: u32, ty: u32) -> f32 {
        let extent = inputs.extent();
        let x0 = tx * self.tile.width;
        let y0 = ty * self.tile.height;
        let x1 = (x0 + self.tile.width).min(extent.width);
        let y1 = (y0 + self.tile.height).min(extent.height);

        let mut worst = 0.0f32;
        for y in y0..y1 {
            for x in x0..x1 {
                worst = worst.max(self.pixel_discrepancy(inputs, x, y));
                if worst >= 1.0 {
                    return 1.0;
                }
            }
        }
        worst
    }

    #[must_use]
    pub fn classify_tile(&self, inputs: &ClassifierInputs<'_>, tx: u32, ty: u32) -> RateClass {
        self.table.classify(self.tile_discrepancy(inputs, tx, ty))
    }

    /// Classifies every tile into `out`. Rows are evaluated in parallel.
    pub fn classify(&self, inputs: &ClassifierInputs<'_>, out: &mut TileGrid) -> Result<()> {
        inputs.check_extents()?;
        let grid = self.tile.grid_for(inputs.extent());
        if out.extent() != grid {
            return Err(VrsError::ExtentMismatch {
                image: "classification grid",
                detail: format!(
                    "grid is {}x{} tiles, inputs need {}x{}",
                    out.extent().width,
                    out.extent().height,
                    grid.width,
                    grid.height
                ),
            });
        }

        out.as_bytes_mut()
            .par_chunks_mut(grid.width as usize)
            .enumerate()
            .for_each(|(ty, row)| {
                for (tx, class) in row.iter_mut().enumerate() {
                    *class = self.classify_tile(inputs, tx as u32, ty as u32).index();
                }
            });
        Ok(())
    }
}
