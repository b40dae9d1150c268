//! Shading-rate model.
//!
//! A [`RateClass`] is the byte stored per tile in the classification buffer.
//! Its discriminant is the index into the shading-rate palette, so the buffer
//! can be bound as-is by a shading-rate image consumer.
//!
//! | Index | Class | Invocations / pixel |
//! |-------|-------|---------------------|
//! | 0 | `NoInvocations` | 0 |
//! | 1 | `X16PerPixel` | 16 |
//! | 2 | `X8PerPixel` | 8 |
//! | 3 | `X4PerPixel` | 4 |
//! | 4 | `X2PerPixel` | 2 |
//! | 5 | `X1PerPixel` | 1 |
//! | 6 | `PerTwoByOne` | 1/2 |
//! | 7 | `PerOneByTwo` | 1/2 |
//! | 8 | `PerTwoByTwo` | 1/4 |
//! | 9 | `PerFourByTwo` | 1/8 |
//! | 10 | `PerTwoByFour` | 1/8 |
//! | 11 | `PerFourByFour` | 1/16 |

pub mod classifier;
pub mod thresholds;

pub use classifier::{ClassifierInputs, DiscrepancyWeights, RateClassifier};
pub use thresholds::ThresholdTable;

use serde::{Deserialize, Serialize};

/// One entry of the shading-rate palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RateClass {
    /// Tile is not shaded at all.
    NoInvocations = 0,
    X16PerPixel = 1,
    X8PerPixel = 2,
    X4PerPixel = 3,
    X2PerPixel = 4,
    /// Full rate: one invocation per pixel. Finest rate the classifier emits
    /// by default and the value the buffer is initialized with.
    X1PerPixel = 5,
    PerTwoByOne = 6,
    PerOneByTwo = 7,
    PerTwoByTwo = 8,
    PerFourByTwo = 9,
    PerTwoByFour = 10,
    PerFourByFour = 11,
}

impl RateClass {
    /// The full palette in index order.
    pub const PALETTE: [RateClass; 12] = [
        Self::NoInvocations,
        Self::X16PerPixel,
        Self::X8PerPixel,
        Self::X4PerPixel,
        Self::X2PerPixel,
        Self::X1PerPixel,
        Self::PerTwoByOne,
        Self::PerOneByTwo,
        Self::PerTwoByTwo,
        Self::PerFourByTwo,
        Self::PerTwoByFour,
        Self::PerFourByFour,
    ];

    /// Value written into a freshly allocated classification buffer.
    pub const FINEST: RateClass = Self::X1PerPixel;

    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Decodes a palette index. Out-of-range bytes yield `None`.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::PALETTE.get(index as usize).copied()
    }

    /// Fragment-shader invocations per covered pixel.
    #[must_use]
    pub fn invocation_density(self) -> f32 {
        let (w, h) = self.coarse_block();
        self.samples() as f32 / (w * h) as f32
    }

    /// Pixel block `(width, height)` covered by a single invocation.
    #[must_use]
    pub const fn coarse_block(self) -> (u32, u32) {
        match self {
            Self::PerTwoByOne => (2, 1),
            Self::PerOneByTwo => (1, 2),
            Self::PerTwoByTwo => (2, 2),
            Self::PerFourByTwo => (4, 2),
            Self::PerTwoByFour => (2, 4),
            Self::PerFourByFour => (4, 4),
            _ => (1, 1),
        }
    }

    /// Invocations issued per coarse block.
    #[must_use]
    pub const fn samples(self) -> u32 {
        match self {
            Self::NoInvocations => 0,
            Self::X16PerPixel => 16,
            Self::X8PerPixel => 8,
            Self::X4PerPixel => 4,
            Self::X2PerPixel => 2,
            _ => 1,
        }
    }

    /// Tint used when rate classes are visualized on screen.
    ///
    /// Finer rates go towards red, coarser ones towards blue; skipped tiles
    /// are black.
    #[must_use]
    pub const fn debug_color(self) -> [f32; 3] {
        match self {
            Self::NoInvocations => [0.0, 0.0, 0.0],
            Self::X16PerPixel | Self::X8PerPixel => [1.0, 0.0, 1.0],
            Self::X4PerPixel | Self::X2PerPixel => [1.0, 0.4, 0.7],
            Self::X1PerPixel => [1.0, 0.1, 0.1],
            Self::PerTwoByOne | Self::PerOneByTwo => [1.0, 0.6, 0.1],
            Self::PerTwoByTwo => [0.9, 0.9, 0.1],
            Self::PerFourByTwo | Self::PerTwoByFour => [0.2, 0.8, 0.2],
            Self::PerFourByFour => [0.2, 0.4, 1.0],
        }
    }
}

impl Default for RateClass {
    fn default() -> Self {
        Self::FINEST
    }
}

impl TryFrom<u8> for RateClass {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_indices_match_discriminants() {
        for (i, class) in RateClass::PALETTE.iter().enumerate() {
            assert_eq!(class.index() as usize, i);
            assert_eq!(RateClass::from_index(i as u8), Some(*class));
        }
        assert_eq!(RateClass::from_index(12), None);
    }

    #[test]
    fn density_matches_block_and_samples() {
        assert!((RateClass::PerFourByFour.invocation_density() - 1.0 / 16.0).abs() < 1e-6);
        assert!((RateClass::X4PerPixel.invocation_density() - 4.0).abs() < 1e-6);
        assert!(RateClass::NoInvocations.invocation_density().abs() < 1e-6);
    }
}
