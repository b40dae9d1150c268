use glam::{Mat4, Vec3, Vec4};

/// The view-projection pair the classifier reprojects between.
///
/// Rolled once per frame: the old `current` becomes `previous`. With a
/// static camera both matrices are identical after one roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalTransform {
    previous: Mat4,
    current: Mat4,
    inverse_previous: Mat4,
    inverse_current: Mat4,
}

impl TemporalTransform {
    /// Both matrices set to `view_projection`.
    #[must_use]
    pub fn new(view_projection: Mat4) -> Self {
        let inverse = view_projection.inverse();
        Self {
            previous: view_projection,
            current: view_projection,
            inverse_previous: inverse,
            inverse_current: inverse,
        }
    }

    pub fn advance(&mut self, view_projection: Mat4) {
        self.previous = self.current;
        self.inverse_previous = self.inverse_current;
        self.current = view_projection;
        self.inverse_current = view_projection.inverse();
    }

    #[inline]
    #[must_use]
    pub fn previous(&self) -> Mat4 {
        self.previous
    }

    #[inline]
    #[must_use]
    pub fn current(&self) -> Mat4 {
        self.current
    }

    #[inline]
    #[must_use]
    pub fn inverse_previous(&self) -> Mat4 {
        self.inverse_previous
    }

    #[inline]
    #[must_use]
    pub fn inverse_current(&self) -> Mat4 {
        self.inverse_current
    }

    /// `true` when the camera did not move between the two frames.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.previous == self.current
    }
}

impl Default for TemporalTransform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

/// Unprojects an NDC point (`z` in `[0, 1]`) through `inverse_view_projection`.
#[inline]
#[must_use]
pub fn unproject(inverse_view_projection: Mat4, ndc: Vec3) -> Vec3 {
    let h = inverse_view_projection * ndc.extend(1.0);
    h.truncate() / h.w
}

/// Projects a world position to clip space.
#[inline]
#[must_use]
pub fn project(view_projection: Mat4, world: Vec3) -> Vec4 {
    view_projection * world.extend(1.0)
}
