//! Pipeline Settings & Render Variants
//!
//! This module holds the startup configuration of the pipeline and the
//! runtime switch between the two main-pass pipeline pairs.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use temporal_vrs::settings::PipelineSettings;
//!
//! // Defaults: 16x16 tiles, triple-buffered depth history, modulation on.
//! let settings = PipelineSettings::default();
//!
//! // Skip shading entirely for tiles that did not change.
//! let settings = PipelineSettings {
//!     thresholds: ThresholdTable::default().with_skip(1e-3)?,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VrsError};
use crate::rate::{DiscrepancyWeights, ThresholdTable};
use crate::resources::TileSize;

// ---------------------------------------------------------------------------
// RenderVariant
// ---------------------------------------------------------------------------

/// Which main-pass pipeline pair command recording binds.
///
/// | Variant        | Classification buffer | Shading density       |
/// |----------------|-----------------------|-----------------------|
/// | `Baseline`     | not bound             | one invocation/pixel  |
/// | `RateAdaptive` | bound                 | per-tile rate class   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderVariant {
    Baseline,
    #[default]
    RateAdaptive,
}

impl RenderVariant {
    #[inline]
    #[must_use]
    pub fn from_enabled(rate_adaptive: bool) -> Self {
        if rate_adaptive {
            Self::RateAdaptive
        } else {
            Self::Baseline
        }
    }

    /// Returns `true` when the variant binds the classification buffer.
    #[inline]
    #[must_use]
    pub fn binds_classification(self) -> bool {
        matches!(self, Self::RateAdaptive)
    }
}

/// Host toggles baked into recorded command streams.
///
/// Any change forces exactly one re-record before the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShadingToggles {
    pub variant: RenderVariant,
    /// Tint the output with the rate class of each tile.
    pub visualize_rates: bool,
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Startup configuration of the classification pipeline.
///
/// | Field                 | Default                         |
/// |-----------------------|---------------------------------|
/// | `tile_size`           | 16 × 16                         |
/// | `history_slots`       | 3                               |
/// | `thresholds`          | `[0.02, 0.05, 0.10, 0.20]`      |
/// | `weights`             | depth 4.0, color 1.0, motion 0.25 |
/// | `rate_adaptive`       | `true`                          |
/// | `visualize_rates`     | `false`                         |
/// | `alpha_cutoff`        | 0.5                             |
/// | `clear_color`         | (0.25, 0.25, 0.25, 1.0)         |
/// | `fence_timeout_ms`    | 10 000                          |
/// | `max_surface_retries` | 3                               |
/// | `light_position`      | (0.0, 2.5, 0.0, 1.0)            |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Screen pixels per classification texel.
    pub tile_size: TileSize,
    /// Depth history ring length; normally the swap-chain image count.
    pub history_slots: u32,
    pub thresholds: ThresholdTable,
    pub weights: DiscrepancyWeights,
    /// Initial state of the rate-adaptive toggle.
    pub rate_adaptive: bool,
    /// Initial state of the rate visualization toggle.
    pub visualize_rates: bool,
    /// Alpha-test discard threshold baked into the alpha-tested pipelines.
    pub alpha_cutoff: f32,
    pub clear_color: [f32; 4],
    /// Upper bound on the host wait for the classifier fence.
    pub fence_timeout_ms: u64,
    /// Swap-chain recreations tried before a frame gives up.
    pub max_surface_retries: u32,
    pub light_position: [f32; 4],
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tile_size: TileSize::default(),
            history_slots: 3,
            thresholds: ThresholdTable::default(),
            weights: DiscrepancyWeights::default(),
            rate_adaptive: true,
            visualize_rates: false,
            alpha_cutoff: 0.5,
            clear_color: [0.25, 0.25, 0.25, 1.0],
            fence_timeout_ms: 10_000,
            max_surface_retries: 3,
            light_position: [0.0, 2.5, 0.0, 1.0],
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.tile_size.width == 0 || self.tile_size.height == 0 {
            return Err(VrsError::InvalidSettings(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_size.width, self.tile_size.height
            )));
        }
        if self.history_slots < 2 {
            return Err(VrsError::InvalidSettings(format!(
                "history_slots must be at least 2, got {}",
                self.history_slots
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha_cutoff) {
            return Err(VrsError::InvalidSettings(format!(
                "alpha_cutoff must lie in [0, 1], got {}",
                self.alpha_cutoff
            )));
        }
        if self.fence_timeout_ms == 0 {
            return Err(VrsError::InvalidSettings(
                "fence_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn initial_toggles(&self) -> ShadingToggles {
        ShadingToggles {
            variant: RenderVariant::from_enabled(self.rate_adaptive),
            visualize_rates: self.visualize_rates,
        }
    }
}
