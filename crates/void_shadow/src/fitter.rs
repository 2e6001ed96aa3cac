//! Tight orthographic shadow volumes for per-object casters
//!
//! The caster box is expressed in a light-aligned view space, then the
//! camera frustum hull is clipped against the box's XY extent. Whatever
//! survives bounds how far away from the light a visible receiver can be,
//! which lets the far plane move in without clipping the caster itself.

use glam::{Mat4, Vec3};

use crate::bounds::Aabb;
use crate::camera::ShadowCamera;
use crate::clip::{Axis, HalfSpace, Triangle, TriangleBuffer};

/// Smallest half extent of a fitted volume
const MIN_HALF_EXTENT: f32 = 1e-4;

/// Frustum hull as 12 triangles over the corners from `ShadowCamera::frustum_corners`
const HULL_TRIANGLES: [[usize; 3]; 12] = [
    // near
    [0, 2, 1], [0, 3, 2],
    // far
    [4, 5, 6], [4, 6, 7],
    // left
    [0, 4, 7], [0, 7, 3],
    // right
    [1, 2, 6], [1, 6, 5],
    // bottom
    [0, 1, 5], [0, 5, 4],
    // top
    [3, 7, 6], [3, 6, 2],
];

/// Fitted light-space volume for one (caster, light) pair
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowVolume {
    pub view: Mat4,
    pub projection: Mat4,
    /// Width of the orthographic volume in world units
    pub width: f32,
    /// Height of the orthographic volume in world units
    pub height: f32,
    /// Distance to the near plane along the light direction
    pub near: f32,
    /// Distance to the far plane along the light direction
    pub far: f32,
}

impl ShadowVolume {
    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// World units covered by one texel on a tile of `tile_size` texels
    #[inline]
    pub fn texel_size(&self, tile_size: u32) -> f32 {
        self.width.max(self.height) / tile_size as f32
    }
}

/// Light-space box of a caster before and after frustum tightening
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitBounds {
    pub shadow_min: Vec3,
    pub shadow_max: Vec3,
}

/// Computes per-object shadow volumes
#[derive(Clone, Copy, Debug, Default)]
pub struct ShadowVolumeFitter;

impl ShadowVolumeFitter {
    /// Light view centered on the caster, looking along the light direction
    pub fn light_view(center: Vec3, light_forward: Vec3, camera_up: Vec3, caster_up: Vec3) -> Mat4 {
        let forward = light_forward.normalize_or_zero();
        let forward = if forward == Vec3::ZERO { Vec3::NEG_Y } else { forward };

        let up = [camera_up, caster_up, Vec3::Y, Vec3::Z]
            .into_iter()
            .find(|up| forward.cross(*up).length_squared() > 1e-6)
            .unwrap_or(Vec3::X);

        Mat4::look_to_rh(center, forward, up)
    }

    /// Light-space bounds, tightened against the camera frustum
    ///
    /// Returns `None` when no part of the frustum hull survives the caster's
    /// XY window, meaning nothing visible can receive this caster's shadow.
    pub fn fit_bounds(view: &Mat4, caster: &Aabb, camera: &ShadowCamera) -> Option<FitBounds> {
        let light_corners = caster.corners().map(|c| view.transform_point3(c));
        let caster_box = Aabb::from_points(&light_corners)?;
        let mut bounds = FitBounds {
            shadow_min: caster_box.min,
            shadow_max: caster_box.max,
        };

        let frustum = camera
            .frustum_corners(camera.near, camera.far)
            .map(|c| view.transform_point3(c));

        let window = [
            HalfSpace::AtLeast(Axis::X, bounds.shadow_min.x),
            HalfSpace::AtMost(Axis::X, bounds.shadow_max.x),
            HalfSpace::AtLeast(Axis::Y, bounds.shadow_min.y),
            HalfSpace::AtMost(Axis::Y, bounds.shadow_max.y),
        ];

        let mut min_z = f32::MAX;
        let mut max_z = f32::MIN;
        let mut survived = false;

        for indices in HULL_TRIANGLES {
            let tri: Triangle = indices.map(|i| frustum[i]);
            match TriangleBuffer::from_triangle(tri).clip_all(&window) {
                Ok(fragments) => {
                    for fragment in fragments.as_slice() {
                        survived = true;
                        for v in fragment {
                            min_z = min_z.min(v.z);
                            max_z = max_z.max(v.z);
                        }
                    }
                }
                Err(err) => {
                    log::warn!("Shadow volume fit: {}, keeping unclipped depth range", err);
                    return Some(bounds);
                }
            }
        }

        if !survived {
            return None;
        }

        // Depth ranges that do not overlap give no usable bound; keep the
        // caster's full depth.
        if min_z > bounds.shadow_max.z || max_z < bounds.shadow_min.z {
            return Some(bounds);
        }

        // Only the far side moves in: casters between the light and the
        // frustum must still reach receivers inside it.
        bounds.shadow_min.z = bounds.shadow_min.z.max(min_z);
        Some(bounds)
    }

    /// Fit a square orthographic volume for a caster lit by a directional light
    pub fn fit(
        caster: &Aabb,
        caster_up: Vec3,
        light_forward: Vec3,
        camera: &ShadowCamera,
    ) -> Option<ShadowVolume> {
        let view = Self::light_view(caster.center(), light_forward, camera.up(), caster_up);
        let bounds = Self::fit_bounds(&view, caster, camera)?;
        Some(Self::volume_from_bounds(view, &bounds))
    }

    /// Square orthographic projection enclosing `bounds`
    pub fn volume_from_bounds(view: Mat4, bounds: &FitBounds) -> ShadowVolume {
        let half = bounds.shadow_max.x.max(bounds.shadow_max.y).max(MIN_HALF_EXTENT);
        let near = -bounds.shadow_max.z;
        let far = (-bounds.shadow_min.z).max(near + MIN_HALF_EXTENT);

        ShadowVolume {
            view,
            projection: Mat4::orthographic_rh_gl(-half, half, -half, half, near, far),
            width: half * 2.0,
            height: half * 2.0,
            near,
            far,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> ShadowCamera {
        ShadowCamera::perspective(
            Vec3::new(0.0, 2.0, 10.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.3,
            30.0,
        )
    }

    #[test]
    fn test_light_view_axes() {
        let forward = Vec3::new(0.3, -1.0, 0.2).normalize();
        let center = Vec3::new(4.0, 1.0, -2.0);
        let view = ShadowVolumeFitter::light_view(center, forward, Vec3::Y, Vec3::Y);

        assert!(view.transform_point3(center).length() < 1e-5);
        let ahead = view.transform_point3(center + forward * 3.0);
        assert!((ahead - Vec3::new(0.0, 0.0, -3.0)).length() < 1e-4);
    }

    #[test]
    fn test_light_view_degenerate_up() {
        let view = ShadowVolumeFitter::light_view(Vec3::ZERO, Vec3::NEG_Y, Vec3::Y, Vec3::NEG_Y);
        assert!(!view.is_nan());
        let ahead = view.transform_point3(Vec3::NEG_Y);
        assert!((ahead - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_fit_contains_caster() {
        let caster = Aabb::from_center_extents(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.5));
        let light = Vec3::new(0.2, -1.0, -0.3).normalize();
        let volume = ShadowVolumeFitter::fit(&caster, Vec3::Y, light, &camera()).unwrap();

        assert!(volume.near <= volume.far);
        assert!((volume.width - volume.height).abs() < 1e-6);

        // Every caster corner projects into the XY extent of the volume
        let vp = volume.view_projection();
        for corner in caster.corners() {
            let p = vp.project_point3(corner);
            assert!(p.x.abs() <= 1.0 + 1e-4 && p.y.abs() <= 1.0 + 1e-4, "{:?}", p);
            assert!(p.z >= -1.0 - 1e-4);
        }
    }

    #[test]
    fn test_tightening_only_raises_min_z() {
        let caster = Aabb::from_center_extents(Vec3::ZERO, Vec3::new(1.0, 20.0, 1.0));
        let light = Vec3::NEG_Y;
        let cam = camera();
        let view = ShadowVolumeFitter::light_view(caster.center(), light, cam.up(), Vec3::Y);

        let corners = caster.corners().map(|c| view.transform_point3(c));
        let raw = Aabb::from_points(&corners).unwrap();
        let fitted = ShadowVolumeFitter::fit_bounds(&view, &caster, &cam).unwrap();

        assert!(fitted.shadow_min.z >= raw.min.z);
        assert_eq!(fitted.shadow_max, raw.max);
        assert_eq!(fitted.shadow_min.x, raw.min.x);
        assert_eq!(fitted.shadow_min.y, raw.min.y);
    }

    #[test]
    fn test_tall_caster_far_plane_pulled_in() {
        // A column reaching far below the ground; the camera cannot see past y = -5
        let caster = Aabb::new(Vec3::new(-0.5, -1000.0, -0.5), Vec3::new(0.5, 1.0, 0.5));
        let cam = ShadowCamera::orthographic(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 5.0, 1.0, 0.1, 20.0);
        let volume = ShadowVolumeFitter::fit(&caster, Vec3::Y, Vec3::NEG_Y, &cam).unwrap();

        let unclipped_depth = 1001.0;
        assert!(volume.far - volume.near < unclipped_depth * 0.5);
    }

    #[test]
    fn test_no_overlap_returns_none() {
        // Caster far off to the side of a narrow orthographic camera
        let cam = ShadowCamera::orthographic(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0, 0.1, 20.0);
        let caster = Aabb::from_center_extents(Vec3::new(500.0, 0.0, 0.0), Vec3::ONE);
        assert!(ShadowVolumeFitter::fit(&caster, Vec3::Y, Vec3::NEG_Y, &cam).is_none());
    }

    #[test]
    fn test_receivers_beyond_caster_keep_full_depth() {
        // Looking straight down from y = 10, every receiver lies below an overhead caster
        let cam = ShadowCamera::orthographic(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, 5.0, 1.0, 0.1, 20.0);
        let caster = Aabb::from_center_extents(Vec3::new(0.0, 12.0, 0.0), Vec3::ONE);

        let volume = ShadowVolumeFitter::fit(&caster, Vec3::Y, Vec3::NEG_Y, &cam).unwrap();
        assert!((volume.near + 1.0).abs() < 1e-4, "near {}", volume.near);
        assert!((volume.far - 1.0).abs() < 1e-4, "far {}", volume.far);

        // Receivers entirely on the light side also keep the untightened range
        let below = Aabb::from_center_extents(Vec3::new(0.0, -30.0, 0.0), Vec3::ONE);
        let view = ShadowVolumeFitter::light_view(below.center(), Vec3::NEG_Y, cam.up(), Vec3::Y);
        let fitted = ShadowVolumeFitter::fit_bounds(&view, &below, &cam).unwrap();
        assert!((fitted.shadow_min.z + 1.0).abs() < 1e-4);
        assert!((fitted.shadow_max.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_texel_size() {
        let caster = Aabb::from_center_extents(Vec3::ZERO, Vec3::ONE);
        let volume = ShadowVolumeFitter::fit(&caster, Vec3::Y, Vec3::new(0.0, -1.0, -0.5), &camera()).unwrap();
        assert!((volume.texel_size(512) - volume.width / 512.0).abs() < 1e-7);
    }
}
