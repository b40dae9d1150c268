//! Scene provider interface and a small analytic scene.
//!
//! Passes never walk the scene themselves: they hand a [`DrawEncoder`] to
//! [`SceneProvider::draw`] together with the [`RenderFlags`] selecting which
//! partition (opaque / alpha-tested) to record.

pub mod camera;
pub mod primitives;

pub use camera::FirstPersonCamera;
pub use primitives::{AlphaSource, Material, Primitive, Ray, Shape, SurfaceHit};

use bitflags::bitflags;
use glam::Vec3;

bitflags! {
    /// Selects what a [`SceneProvider::draw`] call records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        /// Draw primitives with opaque materials.
        const OPAQUE         = 1 << 0;
        /// Draw primitives with alpha-tested materials.
        const ALPHA_TESTED   = 1 << 1;
        /// Bind each primitive's material before drawing it.
        const BIND_MATERIALS = 1 << 2;
    }
}

/// Receives the draws a scene records.
pub trait DrawEncoder {
    fn bind_material(&mut self, material: &Material);

    /// `primitive_index` is stable for the lifetime of the scene.
    fn draw(&mut self, primitive_index: usize, shape: &Shape);
}

/// A drawable scene.
pub trait SceneProvider: Send + Sync {
    fn draw(&self, encoder: &mut dyn DrawEncoder, flags: RenderFlags);

    /// Every primitive, indexed like the `primitive_index` passed to
    /// [`DrawEncoder::draw`].
    fn primitives(&self) -> &[Primitive];
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    primitives: Vec<Primitive>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, shape: Shape, material: Material) -> usize {
        self.primitives.push(Primitive { shape, material });
        self.primitives.len() - 1
    }

    #[must_use]
    pub fn with(mut self, shape: Shape, material: Material) -> Self {
        self.add(shape, material);
        self
    }

    /// Courtyard seen from the default camera pose: floor, back wall, three
    /// spheres and two alpha-tested screens.
    #[must_use]
    pub fn demo() -> Self {
        Self::new()
            .with(
                Shape::Quad {
                    center: Vec3::ZERO,
                    half_u: Vec3::new(20.0, 0.0, 0.0),
                    half_v: Vec3::new(0.0, 0.0, -20.0),
                },
                Material::opaque([0.55, 0.5, 0.45]),
            )
            .with(
                Shape::Quad {
                    center: Vec3::new(0.0, 3.0, -12.0),
                    half_u: Vec3::new(12.0, 0.0, 0.0),
                    half_v: Vec3::new(0.0, 3.0, 0.0),
                },
                Material::opaque([0.35, 0.45, 0.6]),
            )
            .with(
                Shape::Sphere {
                    center: Vec3::new(-3.0, 1.0, -6.0),
                    radius: 1.0,
                },
                Material::opaque([0.85, 0.2, 0.2]),
            )
            .with(
                Shape::Sphere {
                    center: Vec3::new(2.5, 0.75, -5.0),
                    radius: 0.75,
                },
                Material::opaque([0.2, 0.3, 0.9]),
            )
            .with(
                Shape::Sphere {
                    center: Vec3::new(0.0, 1.5, -9.0),
                    radius: 1.5,
                },
                Material::opaque([0.25, 0.8, 0.3]),
            )
            .with(
                Shape::Quad {
                    center: Vec3::new(1.0, 1.25, -3.5),
                    half_u: Vec3::new(1.5, 0.0, 0.0),
                    half_v: Vec3::new(0.0, 1.25, 0.0),
                },
                Material::checker([0.3, 0.65, 0.2], 6, 0.1, 1.0),
            )
            .with(
                Shape::Sphere {
                    center: Vec3::new(-1.5, 0.6, -3.0),
                    radius: 0.6,
                },
                Material::checker([0.9, 0.75, 0.2], 8, 0.2, 0.9),
            )
    }
}

impl SceneProvider for Scene {
    fn draw(&self, encoder: &mut dyn DrawEncoder, flags: RenderFlags) {
        for (index, primitive) in self.primitives.iter().enumerate() {
            let partition = if primitive.material.is_alpha_tested() {
                RenderFlags::ALPHA_TESTED
            } else {
                RenderFlags::OPAQUE
            };
            if !flags.contains(partition) {
                continue;
            }
            if flags.contains(RenderFlags::BIND_MATERIALS) {
                encoder.bind_material(&primitive.material);
            }
            encoder.draw(index, &primitive.shape);
        }
    }

    fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }
}
