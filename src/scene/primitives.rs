//! Analytic scene primitives and their ray intersections.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

/// Hits closer than this along a ray are ignored.
const T_MIN: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    #[inline]
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub t: f32,
    pub position: Vec3,
    /// Geometric normal, facing the ray for two-sided hits.
    pub normal: Vec3,
    pub uv: Vec2,
    /// The ray hit the outward (front) face.
    pub front_facing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { center: Vec3, radius: f32 },
    /// Parallelogram spanned by two half-axes; its front face is
    /// `half_u × half_v`.
    Quad {
        center: Vec3,
        half_u: Vec3,
        half_v: Vec3,
    },
}

impl Shape {
    /// Every intersection in front of the ray origin, nearest first.
    #[must_use]
    pub fn intersections(&self, ray: &Ray) -> SmallVec<[SurfaceHit; 2]> {
        let mut hits = SmallVec::new();
        match *self {
            Self::Sphere { center, radius } => {
                let oc = ray.origin - center;
                let b = oc.dot(ray.direction);
                let c = oc.length_squared() - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return hits;
                }
                let root = disc.sqrt();
                for t in [-b - root, -b + root] {
                    if t > T_MIN {
                        let position = ray.at(t);
                        let outward = (position - center) / radius;
                        let front_facing = outward.dot(ray.direction) < 0.0;
                        let uv = Vec2::new(
                            0.5 + outward.z.atan2(outward.x) / (2.0 * PI),
                            0.5 - outward.y.clamp(-1.0, 1.0).asin() / PI,
                        );
                        hits.push(SurfaceHit {
                            t,
                            position,
                            normal: if front_facing { outward } else { -outward },
                            uv,
                            front_facing,
                        });
                    }
                }
            }
            Self::Quad {
                center,
                half_u,
                half_v,
            } => {
                let normal = half_u.cross(half_v).normalize();
                let denom = normal.dot(ray.direction);
                if denom.abs() < 1e-8 {
                    return hits;
                }
                let t = (center - ray.origin).dot(normal) / denom;
                if t <= T_MIN {
                    return hits;
                }
                let position = ray.at(t);
                let local = position - center;
                let a = local.dot(half_u) / half_u.length_squared();
                let b = local.dot(half_v) / half_v.length_squared();
                if a.abs() > 1.0 || b.abs() > 1.0 {
                    return hits;
                }
                let front_facing = denom < 0.0;
                hits.push(SurfaceHit {
                    t,
                    position,
                    normal: if front_facing { normal } else { -normal },
                    uv: Vec2::new((a + 1.0) * 0.5, (b + 1.0) * 0.5),
                    front_facing,
                });
            }
        }
        hits
    }
}

/// Where a material's coverage comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaSource {
    Opaque,
    /// Checkerboard of `cells × cells` squares alternating `high` / `low`.
    Checker { cells: u32, low: f32, high: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: [f32; 3],
    pub alpha: AlphaSource,
}

impl Material {
    #[must_use]
    pub const fn opaque(base_color: [f32; 3]) -> Self {
        Self {
            base_color,
            alpha: AlphaSource::Opaque,
        }
    }

    #[must_use]
    pub const fn checker(base_color: [f32; 3], cells: u32, low: f32, high: f32) -> Self {
        Self {
            base_color,
            alpha: AlphaSource::Checker { cells, low, high },
        }
    }

    /// Drawn with the alpha-tested pipeline.
    #[inline]
    #[must_use]
    pub fn is_alpha_tested(&self) -> bool {
        !matches!(self.alpha, AlphaSource::Opaque)
    }

    #[must_use]
    pub fn alpha_at(&self, uv: Vec2) -> f32 {
        match self.alpha {
            AlphaSource::Opaque => 1.0,
            AlphaSource::Checker { cells, low, high } => {
                let n = cells.max(1) as f32;
                let cell = (uv.x * n).floor() as i64 + (uv.y * n).floor() as i64;
                if cell.rem_euclid(2) == 0 { high } else { low }
            }
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::opaque([0.8, 0.8, 0.8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub shape: Shape,
    pub material: Material,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_reports_both_faces_in_order() {
        let sphere = Shape::Sphere {
            center: Vec3::new(0.0, 0.0, -5.0),
            radius: 1.0,
        };
        let hits = sphere.intersections(&Ray::new(Vec3::ZERO, Vec3::NEG_Z));
        assert_eq!(hits.len(), 2);
        assert!((hits[0].t - 4.0).abs() < 1e-4);
        assert!(hits[0].front_facing);
        assert!(!hits[1].front_facing);
    }

    #[test]
    fn quad_rejects_hits_outside_its_extent() {
        let quad = Shape::Quad {
            center: Vec3::new(0.0, 0.0, -2.0),
            half_u: Vec3::X,
            half_v: Vec3::Y,
        };
        assert_eq!(quad.intersections(&Ray::new(Vec3::ZERO, Vec3::NEG_Z)).len(), 1);
        let miss = Ray::new(Vec3::ZERO, Vec3::new(2.0, 0.0, -1.0));
        assert!(quad.intersections(&miss).is_empty());
    }
}
