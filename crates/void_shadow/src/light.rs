//! Visible light input
//!
//! The culling stage hands the shadow system one `VisibleLight` per light
//! that survived visibility culling. Lights are immutable for the frame.

use glam::{Mat4, Quat, Vec3};
use serde::{Serialize, Deserialize};

use crate::bounds::Aabb;

/// Smallest range squared used before reciprocating
pub const MIN_RANGE_SQUARED: f32 = 0.00001;

/// Light type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightKind {
    Directional,
    Spot,
    Point,
}

/// How a light contributes to baked lighting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightmapBakeType {
    #[default]
    Realtime,
    Mixed,
    Baked,
}

/// Mixed lighting mode for lights baked as `Mixed`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MixedLightingMode {
    #[default]
    IndirectOnly,
    Shadowmask,
    Subtractive,
}

/// Baked lighting metadata for a light
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightBaking {
    pub bake_type: LightmapBakeType,
    pub mixed_mode: MixedLightingMode,
    /// Channel of the baked shadow mask holding this light's occlusion (-1 = none)
    pub occlusion_mask_channel: i32,
}

impl Default for LightBaking {
    fn default() -> Self {
        Self {
            bake_type: LightmapBakeType::Realtime,
            mixed_mode: MixedLightingMode::IndirectOnly,
            occlusion_mask_channel: -1,
        }
    }
}

impl LightBaking {
    /// Baked shadow mask settings for a mixed light
    pub fn shadowmask(channel: i32) -> Self {
        Self {
            bake_type: LightmapBakeType::Mixed,
            mixed_mode: MixedLightingMode::Shadowmask,
            occlusion_mask_channel: channel,
        }
    }

    /// Mixed lighting in shadow-mask mode
    #[inline]
    pub fn uses_shadow_mask(&self) -> bool {
        self.bake_type == LightmapBakeType::Mixed && self.mixed_mode == MixedLightingMode::Shadowmask
    }

    /// Mask channel the lighting stage samples, or -1
    pub fn mask_channel(&self) -> f32 {
        if self.uses_shadow_mask() {
            self.occlusion_mask_channel as f32
        } else {
            -1.0
        }
    }
}

/// Per-light shadow parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightShadows {
    /// Light casts shadows at all
    pub enabled: bool,

    /// Shadow strength (0 = no shadow, 1 = full shadow)
    pub strength: f32,

    /// Slope-scaled depth bias applied while rendering the shadow map
    pub slope_scale_bias: f32,

    /// Normal offset applied when sampling, in filter-size units
    pub normal_bias: f32,

    /// Pulls the shadow near plane back toward the light
    pub near_plane_offset: f32,
}

impl Default for LightShadows {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 1.0,
            slope_scale_bias: 0.0,
            normal_bias: 0.5,
            near_plane_offset: 0.2,
        }
    }
}

impl LightShadows {
    /// Shadows switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set shadow strength
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    /// Casts a real-time or baked shadow of some kind
    #[inline]
    pub fn casts(&self) -> bool {
        self.enabled && self.strength > 0.0
    }
}

/// A light that survived visibility culling this frame
#[derive(Clone, Debug, PartialEq)]
pub struct VisibleLight {
    pub kind: LightKind,

    /// World position (ignored for directional lights)
    pub position: Vec3,

    /// World orientation; the light shines along local -Z
    pub rotation: Quat,

    /// Attenuation range (spot/point)
    pub range: f32,

    /// Full outer cone angle in radians (spot)
    pub spot_angle: f32,

    /// Full inner cone angle in radians (spot)
    pub inner_spot_angle: f32,

    pub shadows: LightShadows,

    pub baking: LightBaking,

    /// Bounds of the shadow casters this light can see, if any
    pub caster_bounds: Option<Aabb>,
}

impl VisibleLight {
    /// Directional light shining along `direction`
    pub fn directional(direction: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::ZERO,
            rotation: crate::camera::look_rotation(direction, Vec3::Y),
            range: 0.0,
            spot_angle: 0.0,
            inner_spot_angle: 0.0,
            shadows: LightShadows::default(),
            baking: LightBaking::default(),
            caster_bounds: None,
        }
    }

    /// Spot light at `position` shining along `direction`
    pub fn spot(position: Vec3, direction: Vec3, range: f32, spot_angle: f32) -> Self {
        Self {
            kind: LightKind::Spot,
            position,
            rotation: crate::camera::look_rotation(direction, Vec3::Y),
            range,
            spot_angle,
            inner_spot_angle: spot_angle * 0.8,
            ..Self::directional(direction)
        }
    }

    /// Point light at `position`
    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            rotation: Quat::IDENTITY,
            range,
            ..Self::directional(Vec3::NEG_Z)
        }
    }

    pub fn with_shadows(mut self, shadows: LightShadows) -> Self {
        self.shadows = shadows;
        self
    }

    pub fn with_baking(mut self, baking: LightBaking) -> Self {
        self.baking = baking;
        self
    }

    pub fn with_caster_bounds(mut self, bounds: Aabb) -> Self {
        self.caster_bounds = Some(bounds);
        self
    }

    /// Direction the light travels in world space
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Light-to-world transform
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// `1 / range²`, floored so zero-range lights stay finite
    pub fn inverse_range_squared(&self) -> f32 {
        1.0 / (self.range * self.range).max(MIN_RANGE_SQUARED)
    }
}

/// Source of per-light shadow caster bounds
///
/// Mirrors the culling stage's question "does this light see any shadow
/// casters?". Lights without bounds fall back to baked shadowing.
pub trait CasterBoundsQuery {
    fn shadow_caster_bounds(&self, visible_light_index: usize) -> Option<Aabb>;
}

impl CasterBoundsQuery for [VisibleLight] {
    fn shadow_caster_bounds(&self, visible_light_index: usize) -> Option<Aabb> {
        self.get(visible_light_index).and_then(|light| light.caster_bounds)
    }
}

impl<F> CasterBoundsQuery for F
where
    F: Fn(usize) -> Option<Aabb>,
{
    fn shadow_caster_bounds(&self, visible_light_index: usize) -> Option<Aabb> {
        self(visible_light_index)
    }
}
