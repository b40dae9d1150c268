//! Temporal history ring.
//!
//! ```text
//!   frame:      i-2      i-1       i
//!   slot:      [ 1 ]    [ 2 ]    [ 0 ]      N = 3
//!                        prev     curr
//!   color:     one shared slot, overwritten after every main pass
//! ```
//!
//! Slots are allocated up front and only ever replaced wholesale by
//! [`HistoryStore::reallocate`]; nothing is allocated per frame.

use log::info;

use super::image::Extent;
use crate::errors::{Result, VrsError};

/// Depth snapshots for the last `N` frames plus one color snapshot.
///
/// Generic over the backend's resource types so the index arithmetic is
/// shared by the headless and GPU backends.
#[derive(Debug)]
pub struct HistoryStore<D, C> {
    depth: Vec<D>,
    color: C,
    cursor: usize,
    extent: Extent,
    generation: u64,
}

impl<D, C> HistoryStore<D, C> {
    /// Allocates `slot_count` depth slots and the color slot at `extent`.
    pub fn allocate(
        slot_count: u32,
        extent: Extent,
        alloc_depth: impl FnMut(usize, Extent) -> Result<D>,
        alloc_color: impl FnOnce(Extent) -> Result<C>,
    ) -> Result<Self> {
        if slot_count < 2 {
            return Err(VrsError::InvalidSettings(format!(
                "history needs at least 2 depth slots, got {slot_count}"
            )));
        }
        let depth = Self::allocate_depth(slot_count as usize, extent, alloc_depth)?;
        let color = alloc_color(extent)?;
        info!(
            "History allocated: {} depth slots at {}x{}",
            slot_count, extent.width, extent.height
        );
        Ok(Self {
            depth,
            color,
            cursor: 0,
            extent,
            generation: 0,
        })
    }

    fn allocate_depth(
        count: usize,
        extent: Extent,
        mut alloc_depth: impl FnMut(usize, Extent) -> Result<D>,
    ) -> Result<Vec<D>> {
        (0..count).map(|i| alloc_depth(i, extent)).collect()
    }

    /// Replaces every slot with a fresh set at `extent`.
    ///
    /// The ring restarts at slot 0. The caller must treat the next frame as a
    /// first frame: no slot holds a valid previous snapshot any more. On
    /// failure the old slots are kept untouched.
    pub fn reallocate(
        &mut self,
        extent: Extent,
        alloc_depth: impl FnMut(usize, Extent) -> Result<D>,
        alloc_color: impl FnOnce(Extent) -> Result<C>,
    ) -> Result<()> {
        let depth = Self::allocate_depth(self.depth.len(), extent, alloc_depth)?;
        let color = alloc_color(extent)?;
        self.depth = depth;
        self.color = color;
        self.cursor = 0;
        self.extent = extent;
        self.generation += 1;
        info!(
            "History reallocated (generation {}): {}x{}",
            self.generation, extent.width, extent.height
        );
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.depth.len()
    }

    #[inline]
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    #[inline]
    #[must_use]
    pub fn previous_index(&self) -> usize {
        (self.cursor + self.depth.len() - 1) % self.depth.len()
    }

    /// Slot the depth pre-pass of this frame writes.
    #[inline]
    #[must_use]
    pub fn current_depth_slot(&self) -> &D {
        &self.depth[self.cursor]
    }

    /// Slot holding the previous frame's depth.
    #[inline]
    #[must_use]
    pub fn previous_depth_slot(&self) -> &D {
        &self.depth[self.previous_index()]
    }

    #[inline]
    #[must_use]
    pub fn depth_slot(&self, index: usize) -> &D {
        &self.depth[index]
    }

    #[inline]
    #[must_use]
    pub fn color_slot(&self) -> &C {
        &self.color
    }

    /// Moves to the next depth slot. Called once per frame, after every
    /// submission of the frame and before present.
    #[inline]
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.depth.len();
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of times the store has been reallocated.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
