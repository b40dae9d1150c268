use glam::{Mat4, Vec3};

/// First-person camera driving the view-projection each frame.
///
/// Rotation is `(pitch, yaw, roll)` in degrees; yaw -90° looks down -Z.
#[derive(Debug, Clone)]
pub struct FirstPersonCamera {
    position: Vec3,
    rotation: Vec3,
    fov_degrees: f32,
    aspect: f32,
    near: f32,
    far: f32,
    /// Negate the projected y axis (for APIs whose NDC y points down).
    pub flip_y: bool,
}

impl FirstPersonCamera {
    #[must_use]
    pub fn new(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 0.0),
            rotation: Vec3::new(0.0, -90.0, 0.0),
            fov_degrees,
            aspect,
            near,
            far,
            flip_y: false,
        }
    }

    pub fn set_perspective(&mut self, fov_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.fov_degrees = fov_degrees;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
    }

    pub fn rotate(&mut self, delta: Vec3) {
        self.rotation += delta;
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Unit view direction.
    #[must_use]
    pub fn front(&self) -> Vec3 {
        let pitch = self.rotation.x.to_radians();
        let yaw = self.rotation.y.to_radians();
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.front(), Vec3::Y)
    }

    /// Perspective projection with depth in `[0, 1]`.
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
        if self.flip_y {
            proj.y_axis.y *= -1.0;
        }
        proj
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

impl Default for FirstPersonCamera {
    fn default() -> Self {
        Self::new(60.0, 16.0 / 9.0, 0.1, 256.0)
    }
}
