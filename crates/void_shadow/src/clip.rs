//! Triangle clipping against axis-aligned half-spaces
//!
//! Stateless primitive used by the shadow volume fitter. Clipping a triangle
//! against one half-space yields zero, one or two triangles, so a single
//! triangle pushed through `N` half-spaces never produces more than `2^N`
//! fragments. `MAX_CLIP_FRAGMENTS` covers four half-spaces.

use glam::Vec3;
use thiserror::Error;

/// Fragment capacity of a `TriangleBuffer`
pub const MAX_CLIP_FRAGMENTS: usize = 16;

/// Clip scratch errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClipError {
    #[error("Clip scratch capacity of {capacity} triangles exceeded")]
    CapacityExceeded { capacity: usize },
}

/// Triangle as three points
pub type Triangle = [Vec3; 3];

/// Clip axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    fn of(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// Axis-aligned half-space: `axis >= bound` or `axis <= bound`
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HalfSpace {
    AtLeast(Axis, f32),
    AtMost(Axis, f32),
}

impl HalfSpace {
    /// Boundary is inclusive
    #[inline]
    pub fn contains(self, point: Vec3) -> bool {
        match self {
            HalfSpace::AtLeast(axis, bound) => axis.of(point) >= bound,
            HalfSpace::AtMost(axis, bound) => axis.of(point) <= bound,
        }
    }

    /// Point where the segment `inside -> outside` crosses the boundary
    fn intersect(self, inside: Vec3, outside: Vec3) -> Vec3 {
        let (axis, bound) = match self {
            HalfSpace::AtLeast(axis, bound) | HalfSpace::AtMost(axis, bound) => (axis, bound),
        };
        let a = axis.of(inside);
        let b = axis.of(outside);
        let denom = b - a;
        if denom.abs() < f32::EPSILON {
            return inside;
        }
        let t = ((bound - a) / denom).clamp(0.0, 1.0);
        inside.lerp(outside, t)
    }
}

/// Outcome of clipping one triangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Clipped {
    /// Fully outside
    Discarded,
    One(Triangle),
    Two(Triangle, Triangle),
}

/// Clip a triangle against a half-space, preserving winding
pub fn clip_triangle(tri: &Triangle, half_space: HalfSpace) -> Clipped {
    let inside = tri.map(|v| half_space.contains(v));

    match inside.iter().filter(|i| **i).count() {
        0 => Clipped::Discarded,
        3 => Clipped::One(*tri),
        1 => {
            // Rotate so the inside vertex comes first
            let i = inside.iter().position(|v| *v).unwrap_or(0);
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            let c = tri[(i + 2) % 3];
            Clipped::One([a, half_space.intersect(a, b), half_space.intersect(a, c)])
        }
        _ => {
            // Rotate so the outside vertex comes last
            let o = inside.iter().position(|v| !*v).unwrap_or(2);
            let a = tri[(o + 1) % 3];
            let b = tri[(o + 2) % 3];
            let c = tri[o];
            let bc = half_space.intersect(b, c);
            let ca = half_space.intersect(a, c);
            Clipped::Two([a, b, bc], [a, bc, ca])
        }
    }
}

/// Fixed-capacity triangle list used as clipping scratch
#[derive(Clone, Debug)]
pub struct TriangleBuffer {
    triangles: [Triangle; MAX_CLIP_FRAGMENTS],
    len: usize,
}

impl Default for TriangleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TriangleBuffer {
    pub const fn new() -> Self {
        Self {
            triangles: [[Vec3::ZERO; 3]; MAX_CLIP_FRAGMENTS],
            len: 0,
        }
    }

    /// Buffer holding a single triangle
    pub fn from_triangle(tri: Triangle) -> Self {
        let mut buffer = Self::new();
        buffer.triangles[0] = tri;
        buffer.len = 1;
        buffer
    }

    pub fn push(&mut self, tri: Triangle) -> Result<(), ClipError> {
        if self.len == MAX_CLIP_FRAGMENTS {
            return Err(ClipError::CapacityExceeded { capacity: MAX_CLIP_FRAGMENTS });
        }
        self.triangles[self.len] = tri;
        self.len += 1;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Triangle] {
        &self.triangles[..self.len]
    }

    /// Clip every triangle against a half-space into a new buffer
    pub fn clip(&self, half_space: HalfSpace) -> Result<TriangleBuffer, ClipError> {
        let mut out = TriangleBuffer::new();
        for tri in self.as_slice() {
            match clip_triangle(tri, half_space) {
                Clipped::Discarded => {}
                Clipped::One(t) => out.push(t)?,
                Clipped::Two(t0, t1) => {
                    out.push(t0)?;
                    out.push(t1)?;
                }
            }
        }
        Ok(out)
    }

    /// Clip against several half-spaces in order
    pub fn clip_all(&self, half_spaces: &[HalfSpace]) -> Result<TriangleBuffer, ClipError> {
        let mut current = self.clone();
        for half_space in half_spaces {
            if current.is_empty() {
                break;
            }
            current = current.clip(*half_space)?;
        }
        Ok(current)
    }
}
