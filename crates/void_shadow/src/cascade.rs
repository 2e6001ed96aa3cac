//! Cascaded Shadow Map Calculations
//!
//! Split distances come from the configured cascade ratios times the max
//! shadow distance. Each camera-frustum slice is enclosed in a bounding
//! sphere, and the light view is snapped to whole texels so shadows do not
//! swim while the camera moves.

use glam::{Mat4, Vec3};

use crate::camera::ShadowCamera;
use crate::config::ShadowSettings;

/// Maximum supported cascade count
pub const MAX_CASCADES: usize = 4;

/// Split distances for the directional cascades of one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowCascades {
    /// Number of active cascades (1-4)
    pub count: u32,

    /// View distances: [0] = camera near, [1..=count] = cascade ends
    pub splits: [f32; MAX_CASCADES + 1],
}

impl ShadowCascades {
    /// Splits for `camera`, clamped to its far plane
    pub fn new(settings: &ShadowSettings, camera: &ShadowCamera) -> Self {
        Self::with_count(settings, camera, settings.directional.cascade_count)
    }

    /// Splits for an explicit cascade count, overriding the settings
    pub fn with_count(settings: &ShadowSettings, camera: &ShadowCamera, count: u32) -> Self {
        let count = count.clamp(1, MAX_CASCADES as u32);
        let mut directional = settings.directional;
        directional.cascade_count = count;
        let ends = directional.cascade_ends();
        let max_distance = settings.max_distance.min(camera.far);

        let mut splits = [max_distance; MAX_CASCADES + 1];
        splits[0] = camera.near;
        for i in 0..count as usize {
            splits[i + 1] = (ends[i] * max_distance).max(splits[i]);
        }

        Self { count, splits }
    }

    /// Near and far view distance of a cascade
    #[inline]
    pub fn range(&self, cascade: usize) -> (f32, f32) {
        (self.splits[cascade], self.splits[cascade + 1])
    }

    /// Light view and projection for one cascade
    ///
    /// `near_plane_offset` pulls the near plane back toward the light so that
    /// casters outside the slice still land in the map.
    pub fn compute_split(
        &self,
        cascade: usize,
        camera: &ShadowCamera,
        light_forward: Vec3,
        tile_size: u32,
        near_plane_offset: f32,
    ) -> CascadeSplit {
        let (near, far) = self.range(cascade);
        let corners = camera.frustum_corners(near, far);
        let (center, radius) = bounding_sphere(&corners);
        let radius = radius.max(1e-4);

        let forward = light_forward.normalize_or_zero();
        let forward = if forward == Vec3::ZERO { Vec3::NEG_Y } else { forward };
        let up = find_up_vector(forward);

        // Only the light view is snapped; culling keeps the slice sphere
        let snapped = snap_to_texel(center, forward, up, radius, tile_size);
        let back = radius * 2.0 + near_plane_offset.max(0.0);
        let view = Mat4::look_to_rh(snapped - forward * back, forward, up);
        let projection = Mat4::orthographic_rh_gl(-radius, radius, -radius, radius, 0.0, back + radius * 2.0);

        CascadeSplit {
            index: cascade,
            view,
            projection,
            center,
            radius,
            texel_size: radius * 2.0 / tile_size.max(1) as f32,
        }
    }
}

/// Light-space frame of one cascade
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeSplit {
    pub index: usize,
    pub view: Mat4,
    pub projection: Mat4,
    /// Culling sphere center in world space, before texel snapping
    pub center: Vec3,
    /// Culling sphere radius
    pub radius: f32,
    /// World size of one shadow-map texel
    pub texel_size: f32,
}

impl CascadeSplit {
    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Centroid sphere around a point set
pub fn bounding_sphere(points: &[Vec3]) -> (Vec3, f32) {
    if points.is_empty() {
        return (Vec3::ZERO, 0.0);
    }

    let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
    let radius = points
        .iter()
        .map(|p| p.distance(center))
        .fold(0.0f32, f32::max);

    (center, radius)
}

/// Up vector that is never parallel to the light
fn find_up_vector(light_forward: Vec3) -> Vec3 {
    if light_forward.y.abs() > 0.9 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Snap the sphere center to the light-space texel grid
fn snap_to_texel(center: Vec3, forward: Vec3, up: Vec3, radius: f32, tile_size: u32) -> Vec3 {
    let texel = radius * 2.0 / tile_size.max(1) as f32;
    let rotation = Mat4::look_to_rh(Vec3::ZERO, forward, up);

    let mut light_space = rotation.transform_point3(center);
    light_space.x = (light_space.x / texel).floor() * texel;
    light_space.y = (light_space.y / texel).floor() * texel;

    rotation.inverse().transform_point3(light_space)
}
