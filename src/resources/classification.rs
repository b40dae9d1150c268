//! Per-tile rate classification storage.

use std::sync::Arc;

use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::image::Extent;
use crate::errors::{Result, VrsError};
use crate::rate::RateClass;

/// Screen pixels covered by one classification texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    #[must_use]
    pub const fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }

    /// Tile grid covering `extent`, rounding partial tiles up.
    #[must_use]
    pub const fn grid_for(self, extent: Extent) -> Extent {
        Extent::new(
            extent.width.div_ceil(self.width),
            extent.height.div_ceil(self.height),
        )
    }

    #[inline]
    #[must_use]
    pub const fn pixels(self) -> u32 {
        self.width * self.height
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self::square(16)
    }
}

/// One byte per tile, holding a [`RateClass`] palette index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    extent: Extent,
    classes: Vec<u8>,
}

impl TileGrid {
    pub fn new(extent: Extent, fill: RateClass) -> Result<Self> {
        let mut classes = Vec::new();
        classes
            .try_reserve_exact(extent.area())
            .map_err(|e| VrsError::AllocationFailed {
                resource: "classification grid",
                reason: e.to_string(),
            })?;
        classes.resize(extent.area(), fill.index());
        Ok(Self { extent, classes })
    }

    /// Grid size in tiles.
    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class of tile `(tx, ty)`. Bytes outside the palette read as the
    /// finest rate.
    #[inline]
    #[must_use]
    pub fn get(&self, tx: u32, ty: u32) -> RateClass {
        let byte = self.classes[ty as usize * self.extent.width as usize + tx as usize];
        RateClass::from_index(byte).unwrap_or(RateClass::FINEST)
    }

    #[inline]
    pub fn set(&mut self, tx: u32, ty: u32, class: RateClass) {
        let w = self.extent.width as usize;
        self.classes[ty as usize * w + tx as usize] = class.index();
    }

    pub fn fill(&mut self, class: RateClass) {
        self.classes.fill(class.index());
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.classes
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.classes
    }

    /// `true` if every tile holds `class`.
    #[must_use]
    pub fn all(&self, class: RateClass) -> bool {
        self.classes.iter().all(|b| *b == class.index())
    }

    /// Tile count per palette index.
    #[must_use]
    pub fn histogram(&self) -> [u32; RateClass::PALETTE.len()] {
        let mut counts = [0u32; RateClass::PALETTE.len()];
        for b in &self.classes {
            if let Some(slot) = counts.get_mut(*b as usize) {
                *slot += 1;
            }
        }
        counts
    }
}

pub type SharedTileGrid = Arc<RwLock<TileGrid>>;

/// The classification buffer consumed by the rate-adaptive main pass.
///
/// Two grids are kept: the *bound* grid is what the main pass reads, the
/// *target* grid is what the classifier writes. [`publish`](Self::publish)
/// flips them once the host has observed the classifier's fence, so the main
/// pass of frame `i` always sees the result of dispatch `i - 1` while
/// dispatch `i` is still writing.
#[derive(Debug)]
pub struct ClassificationBuffer {
    grids: [SharedTileGrid; 2],
    bound: usize,
    tile: TileSize,
    screen: Extent,
}

impl ClassificationBuffer {
    /// Allocates both grids for a `screen`-sized target, filled with the
    /// finest rate.
    pub fn new(screen: Extent, tile: TileSize) -> Result<Self> {
        let grid = tile.grid_for(screen);
        let grids = [
            Arc::new(RwLock::new(TileGrid::new(grid, RateClass::FINEST)?)),
            Arc::new(RwLock::new(TileGrid::new(grid, RateClass::FINEST)?)),
        ];
        info!(
            "Classification buffer: {}x{} tiles of {}x{} px",
            grid.width, grid.height, tile.width, tile.height
        );
        Ok(Self {
            grids,
            bound: 0,
            tile,
            screen,
        })
    }

    /// Reallocates both grids for a new screen size. Contents return to
    /// the finest rate.
    pub fn resize(&mut self, screen: Extent) -> Result<()> {
        *self = Self::new(screen, self.tile)?;
        Ok(())
    }

    /// Grid the main pass binds this frame.
    #[must_use]
    pub fn bound(&self) -> SharedTileGrid {
        Arc::clone(&self.grids[self.bound])
    }

    /// Grid the next classifier dispatch writes.
    #[must_use]
    pub fn target(&self) -> SharedTileGrid {
        Arc::clone(&self.grids[1 - self.bound])
    }

    /// Makes the last completed dispatch visible to the main pass.
    pub fn publish(&mut self) {
        self.bound = 1 - self.bound;
    }

    /// Copy of the currently bound grid.
    #[must_use]
    pub fn snapshot(&self) -> TileGrid {
        self.grids[self.bound].read().clone()
    }

    #[inline]
    #[must_use]
    pub fn tile_size(&self) -> TileSize {
        self.tile
    }

    #[inline]
    #[must_use]
    pub fn grid_extent(&self) -> Extent {
        self.tile.grid_for(self.screen)
    }

    #[inline]
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.grid_extent().area()
    }
}
