use crate::resources::Extent;
use crate::scheduler::AcquireError;

/// Stand-in for a window surface and its swap chain.
///
/// A window-system resize is simulated with [`request_resize`]: acquisition
/// then reports out-of-date until the swap chain is reconfigured at the new
/// size, the way a real surface does.
///
/// [`request_resize`]: HeadlessSurface::request_resize
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    extent: Extent,
    requested: Option<Extent>,
    lost: bool,
    image_count: u32,
    next_image: u32,
    presented: u64,
}

impl HeadlessSurface {
    #[must_use]
    pub fn new(extent: Extent, image_count: u32) -> Self {
        Self {
            extent,
            requested: None,
            lost: false,
            image_count: image_count.max(1),
            next_image: 0,
            presented: 0,
        }
    }

    /// Returns the index of the acquired swap-chain image.
    pub fn acquire(&mut self) -> Result<u32, AcquireError> {
        if self.lost {
            return Err(AcquireError::Lost);
        }
        if self.requested.is_some() {
            return Err(AcquireError::OutOfDate);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(index)
    }

    pub fn present(&mut self) {
        self.presented += 1;
    }

    /// Rebuilds the swap chain at `extent`.
    pub fn configure(&mut self, extent: Extent) {
        self.extent = extent;
        self.requested = None;
        self.lost = false;
        self.next_image = 0;
    }

    /// The window changed size without the pipeline being told.
    pub fn request_resize(&mut self, extent: Extent) {
        self.requested = Some(extent);
    }

    pub fn mark_lost(&mut self) {
        self.lost = true;
    }

    /// Size the swap chain should be recreated at.
    #[must_use]
    pub fn desired_extent(&self) -> Extent {
        self.requested.unwrap_or(self.extent)
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[inline]
    #[must_use]
    pub fn presented(&self) -> u64 {
        self.presented
    }
}
