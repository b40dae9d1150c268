//! Discrepancy → rate-class step function.

use serde::{Deserialize, Serialize};

use super::RateClass;
use crate::errors::{Result, VrsError};

/// Ordered step function mapping a tile discrepancy in `[0, 1]` to a
/// [`RateClass`].
///
/// `ladder[0]` is the coarsest bucket. A discrepancy `d` selects
/// `ladder[n]` where `n` is the number of thresholds strictly below `d`, so a
/// value sitting exactly on a threshold stays in the coarser bucket.
///
/// ```text
///   d:   0 ──── t0 ──── t1 ──── t2 ──── t3 ────▶
///        │ 4x4  │ 4x2   │ 2x2   │ 2x1   │ 1x1
/// ```
///
/// Construction validates that thresholds strictly increase and that the
/// ladder strictly increases in invocation density, so the mapping is
/// monotonic and covers every non-negative discrepancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholdTable", into = "RawThresholdTable")]
pub struct ThresholdTable {
    thresholds: Vec<f32>,
    ladder: Vec<RateClass>,
}

#[derive(Serialize, Deserialize)]
struct RawThresholdTable {
    thresholds: Vec<f32>,
    ladder: Vec<RateClass>,
}

impl TryFrom<RawThresholdTable> for ThresholdTable {
    type Error = VrsError;

    fn try_from(raw: RawThresholdTable) -> Result<Self> {
        Self::new(raw.thresholds, raw.ladder)
    }
}

impl From<ThresholdTable> for RawThresholdTable {
    fn from(table: ThresholdTable) -> Self {
        Self {
            thresholds: table.thresholds,
            ladder: table.ladder,
        }
    }
}

impl ThresholdTable {
    pub fn new(thresholds: Vec<f32>, ladder: Vec<RateClass>) -> Result<Self> {
        if ladder.len() != thresholds.len() + 1 {
            return Err(VrsError::InvalidThresholds(format!(
                "{} thresholds need {} ladder entries, got {}",
                thresholds.len(),
                thresholds.len() + 1,
                ladder.len()
            )));
        }
        if let Some(bad) = thresholds.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(VrsError::InvalidThresholds(format!(
                "threshold {bad} is not a finite non-negative value"
            )));
        }
        for pair in thresholds.windows(2) {
            if pair[1] <= pair[0] {
                return Err(VrsError::InvalidThresholds(format!(
                    "thresholds must strictly increase ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }
        for pair in ladder.windows(2) {
            if pair[1].invocation_density() <= pair[0].invocation_density() {
                return Err(VrsError::InvalidThresholds(format!(
                    "ladder must go from coarse to fine ({:?} then {:?})",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { thresholds, ladder })
    }

    /// Prepends a "no shading" bucket: tiles whose discrepancy is at most
    /// `epsilon` are skipped entirely.
    pub fn with_skip(self, epsilon: f32) -> Result<Self> {
        if self.ladder[0] == RateClass::NoInvocations {
            return Err(VrsError::InvalidThresholds(
                "table already has a skip bucket".into(),
            ));
        }
        let mut thresholds = Vec::with_capacity(self.thresholds.len() + 1);
        thresholds.push(epsilon);
        thresholds.extend_from_slice(&self.thresholds);
        let mut ladder = Vec::with_capacity(self.ladder.len() + 1);
        ladder.push(RateClass::NoInvocations);
        ladder.extend_from_slice(&self.ladder);
        Self::new(thresholds, ladder)
    }

    #[must_use]
    pub fn classify(&self, discrepancy: f32) -> RateClass {
        // NaN lands in the coarsest bucket.
        let bucket = self.thresholds.partition_point(|t| *t < discrepancy);
        self.ladder[bucket]
    }

    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    #[inline]
    #[must_use]
    pub fn ladder(&self) -> &[RateClass] {
        &self.ladder
    }

    #[inline]
    #[must_use]
    pub fn coarsest(&self) -> RateClass {
        self.ladder[0]
    }

    #[inline]
    #[must_use]
    pub fn finest(&self) -> RateClass {
        self.ladder[self.ladder.len() - 1]
    }

    /// Coarsest bucket that still shades, i.e. skipping the sentinel.
    #[must_use]
    pub fn coarsest_shaded(&self) -> RateClass {
        self.ladder
            .iter()
            .copied()
            .find(|c| *c != RateClass::NoInvocations)
            .unwrap_or(RateClass::FINEST)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            thresholds: vec![0.02, 0.05, 0.10, 0.20],
            ladder: vec![
                RateClass::PerFourByFour,
                RateClass::PerFourByTwo,
                RateClass::PerTwoByTwo,
                RateClass::PerTwoByOne,
                RateClass::X1PerPixel,
            ],
        }
    }
}
