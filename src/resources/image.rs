//! Host-side images with explicit layout tracking.
//!
//! The headless backend stores every attachment and history snapshot as an
//! [`Image`]. Each image remembers the layout it was last transitioned to,
//! and operations that need a particular layout check it, the same contract
//! a GPU image barrier enforces.

use crate::errors::{Result, VrsError};

/// Width and height in pixels (or tiles, for tile grids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Rejects zero-sized extents, which no resource can be built from.
    pub fn validated(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VrsError::ZeroExtent { width, height });
        }
        Ok(Self { width, height })
    }

    #[inline]
    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    #[must_use]
    pub fn aspect(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Layout an [`Image`] is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    /// Storage-compatible layout; readable and writable from compute.
    General,
    ColorAttachment,
    DepthAttachment,
    TransferSrc,
    TransferDst,
    ShaderRead,
    Present,
}

impl ImageLayout {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::General => "general",
            Self::ColorAttachment => "color-attachment",
            Self::DepthAttachment => "depth-attachment",
            Self::TransferSrc => "transfer-src",
            Self::TransferDst => "transfer-dst",
            Self::ShaderRead => "shader-read",
            Self::Present => "present",
        }
    }
}

/// RGBA8 unorm texel.
pub type Rgba8 = [u8; 4];

/// Depth value in `[0, 1]`, 1.0 being the cleared far plane.
pub type DepthImage = Image<f32>;
pub type ColorImage = Image<Rgba8>;

/// A 2-D image of `T` texels in row-major order.
#[derive(Debug, Clone)]
pub struct Image<T> {
    label: &'static str,
    extent: Extent,
    texels: Vec<T>,
    layout: ImageLayout,
}

impl<T: Copy> Image<T> {
    /// Allocates an image filled with `fill`, starting in `layout`.
    pub fn new(label: &'static str, extent: Extent, fill: T, layout: ImageLayout) -> Result<Self> {
        let mut texels = Vec::new();
        texels
            .try_reserve_exact(extent.area())
            .map_err(|e| VrsError::AllocationFailed {
                resource: label,
                reason: e.to_string(),
            })?;
        texels.resize(extent.area(), fill);
        Ok(Self {
            label,
            extent,
            texels,
            layout,
        })
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.texels[y as usize * self.extent.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let w = self.extent.width as usize;
        self.texels[y as usize * w + x as usize] = value;
    }

    #[inline]
    #[must_use]
    pub fn texels(&self) -> &[T] {
        &self.texels
    }

    #[inline]
    pub fn texels_mut(&mut self) -> &mut [T] {
        &mut self.texels
    }

    pub fn fill(&mut self, value: T) {
        self.texels.fill(value);
    }

    /// Fails unless the image is currently in `expected`.
    pub fn require_layout(&self, expected: ImageLayout) -> Result<()> {
        if self.layout == expected {
            Ok(())
        } else {
            Err(VrsError::LayoutMismatch {
                image: self.label,
                expected: expected.name(),
                actual: self.layout.name(),
            })
        }
    }

    /// Image barrier: moves the image from `from` to `to`.
    pub fn transition(&mut self, from: ImageLayout, to: ImageLayout) -> Result<()> {
        if from != ImageLayout::Undefined {
            self.require_layout(from)?;
        }
        self.layout = to;
        Ok(())
    }

    /// Full-extent copy. Source must be in transfer-src, destination in
    /// transfer-dst.
    pub fn copy_from(&mut self, src: &Image<T>) -> Result<()> {
        src.require_layout(ImageLayout::TransferSrc)?;
        self.require_layout(ImageLayout::TransferDst)?;
        if src.extent != self.extent {
            return Err(VrsError::ExtentMismatch {
                image: self.label,
                detail: format!(
                    "copy extent mismatch: {}x{} into {}x{}",
                    src.extent.width, src.extent.height, self.extent.width, self.extent.height
                ),
            });
        }
        self.texels.copy_from_slice(&src.texels);
        Ok(())
    }
}

/// Rec. 709 luma of an RGBA8 texel, in `[0, 1]`.
#[inline]
#[must_use]
pub fn luma(texel: Rgba8) -> f32 {
    (0.2126 * f32::from(texel[0]) + 0.7152 * f32::from(texel[1]) + 0.0722 * f32::from(texel[2]))
        / 255.0
}

/// Packs a linear `[0, 1]` color into an RGBA8 texel.
#[inline]
#[must_use]
pub fn pack_rgba8(color: [f32; 4]) -> Rgba8 {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_checks_source_layout() {
        let mut img = Image::new("test", Extent::new(2, 2), 0u8, ImageLayout::General).unwrap();
        assert!(img.transition(ImageLayout::General, ImageLayout::TransferDst).is_ok());
        let err = img
            .transition(ImageLayout::General, ImageLayout::TransferDst)
            .unwrap_err();
        assert!(matches!(err, VrsError::LayoutMismatch { actual: "transfer-dst", .. }));
    }

    #[test]
    fn zero_extent_rejected() {
        assert!(Extent::validated(0, 10).is_err());
        assert!(Extent::validated(10, 1).is_ok());
    }
}
