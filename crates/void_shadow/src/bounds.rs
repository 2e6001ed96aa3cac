//! Bounding volumes and frustum culling
//!
//! World-space boxes for casters, plus a six-plane frustum extracted from a
//! view-projection matrix for per-frame caster culling.

use glam::{Mat4, Vec3, Vec4};

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create from min/max corners (components are reordered if swapped)
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create from center and half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        let extents = extents.abs();
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half extents
    #[inline]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// The eight corners, min-x first, then y, then z
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Bounds of a point set; `None` for an empty set
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (min, max) = rest.iter().fold((*first, *first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { min, max })
    }

    /// Bounds of this box after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        // Eight corners, never empty
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Self { min, max }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Plane in 3D space (normal · p + distance = 0)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Unit normal, pointing toward the inside of the volume
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Create from an unnormalized `(a, b, c, d)` equation
    pub fn from_equation(eq: Vec4) -> Self {
        let normal = eq.truncate();
        let len = normal.length();
        if len > 1e-10 {
            Self {
                normal: normal / len,
                distance: eq.w / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: 0.0,
            }
        }
    }

    /// Signed distance; positive in front of the plane
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Result of a frustum containment test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrustumTestResult {
    Inside,
    Outside,
    Intersecting,
}

impl FrustumTestResult {
    #[inline]
    pub fn is_visible(self) -> bool {
        self != FrustumTestResult::Outside
    }
}

/// View frustum as six inward-facing planes (left, right, bottom, top, near, far)
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix (Gribb/Hartmann)
    ///
    /// Expects OpenGL-style clip space, where visible depth is `-w..=w`.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::from_equation(r3 + r0),
                Plane::from_equation(r3 - r0),
                Plane::from_equation(r3 + r1),
                Plane::from_equation(r3 - r1),
                Plane::from_equation(r3 + r2),
                Plane::from_equation(r3 - r2),
            ],
        }
    }

    /// Classify a box against the frustum using p/n-vertices
    pub fn test_aabb(&self, aabb: &Aabb) -> FrustumTestResult {
        let mut result = FrustumTestResult::Inside;

        for plane in &self.planes {
            let positive = Vec3::select(plane.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            let negative = Vec3::select(plane.normal.cmpge(Vec3::ZERO), aabb.min, aabb.max);

            if plane.distance_to_point(positive) < 0.0 {
                return FrustumTestResult::Outside;
            }
            if plane.distance_to_point(negative) < 0.0 {
                result = FrustumTestResult::Intersecting;
            }
        }

        result
    }

    #[inline]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.test_aabb(aabb).is_visible()
    }
}
