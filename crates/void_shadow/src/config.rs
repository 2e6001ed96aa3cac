//! Shadow Configuration
//!
//! Global shadow settings with serde support for hot-reload. One settings
//! value drives every atlas: per-type sizes and filters, directional
//! cascades, distance fade and the platform depth convention.

use serde::{Serialize, Deserialize};

use crate::error::{ShadowError, ShadowResult};

/// Smallest accepted atlas dimension
pub const MIN_ATLAS_SIZE: u32 = 256;
/// Largest accepted atlas dimension
pub const MAX_ATLAS_SIZE: u32 = 8192;

/// Global shadow configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Maximum shadow distance from the camera
    pub max_distance: f32,

    /// Fraction of `max_distance` over which shadows fade out
    pub distance_fade: f32,

    /// Platform uses a reversed depth buffer
    pub reversed_z: bool,

    /// How baked shadow masks combine with real-time shadows
    pub shadow_mask_mode: ShadowMaskMode,

    /// Directional (cascaded) shadows
    pub directional: DirectionalShadowSettings,

    /// Spot light atlas
    pub spot: AtlasSettings,

    /// Point light atlas (six tiles per light)
    pub point: AtlasSettings,

    /// Per-object caster atlas
    pub per_object: AtlasSettings,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            distance_fade: 0.1,
            reversed_z: false,
            shadow_mask_mode: ShadowMaskMode::Shadowmask,
            directional: DirectionalShadowSettings::default(),
            spot: AtlasSettings::default(),
            point: AtlasSettings::default(),
            per_object: AtlasSettings::default(),
        }
    }
}

impl ShadowSettings {
    /// Create a high-quality shadow configuration
    pub fn high_quality() -> Self {
        Self {
            max_distance: 150.0,
            directional: DirectionalShadowSettings {
                atlas_size: 4096,
                filter: FilterMode::Pcf5x5,
                cascade_blend: CascadeBlendMode::Soft,
                ..Default::default()
            },
            spot: AtlasSettings::new(2048, FilterMode::Pcf5x5),
            point: AtlasSettings::new(2048, FilterMode::Pcf5x5),
            per_object: AtlasSettings::new(2048, FilterMode::Pcf5x5),
            ..Default::default()
        }
    }

    /// Create a low-quality shadow configuration for performance
    pub fn low_quality() -> Self {
        Self {
            max_distance: 50.0,
            directional: DirectionalShadowSettings {
                atlas_size: 1024,
                filter: FilterMode::Pcf2x2,
                cascade_count: 2,
                cascade_ratios: [0.3, 0.6, 0.9],
                ..Default::default()
            },
            spot: AtlasSettings::new(512, FilterMode::Pcf2x2),
            point: AtlasSettings::new(512, FilterMode::Pcf2x2),
            per_object: AtlasSettings::new(512, FilterMode::Pcf2x2),
            ..Default::default()
        }
    }

    /// Parse settings from JSON and validate them
    pub fn from_json(json: &str) -> ShadowResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to JSON
    pub fn to_json(&self) -> ShadowResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field against its supported range
    pub fn validate(&self) -> ShadowResult<()> {
        if !(self.max_distance > 0.0) {
            return Err(ShadowError::InvalidDistance(self.max_distance));
        }
        check_fade("distance", self.distance_fade)?;

        check_atlas_size("directional", self.directional.atlas_size)?;
        check_atlas_size("spot", self.spot.atlas_size)?;
        check_atlas_size("point", self.point.atlas_size)?;
        check_atlas_size("per-object", self.per_object.atlas_size)?;

        let cascades = self.directional.cascade_count;
        if !(1..=4).contains(&cascades) {
            return Err(ShadowError::InvalidCascadeCount(cascades));
        }

        let ratios = self.directional.cascade_ratios;
        let used = &ratios[..(cascades as usize - 1)];
        let in_range = used.iter().all(|r| *r > 0.0 && *r < 1.0);
        let increasing = used.windows(2).all(|w| w[0] < w[1]);
        if !in_range || !increasing {
            return Err(ShadowError::InvalidCascadeRatios(ratios));
        }

        check_fade("cascade", self.directional.cascade_fade)
    }

    /// `(1/maxDistance, 1/distanceFade, 1/(1 - f²))` with `f = 1 - cascadeFade`
    pub fn distance_fade_vector(&self) -> [f32; 4] {
        let f = 1.0 - self.directional.cascade_fade;
        [
            1.0 / self.max_distance,
            1.0 / self.distance_fade,
            1.0 / (1.0 - f * f),
            0.0,
        ]
    }
}

fn check_atlas_size(atlas: &'static str, size: u32) -> ShadowResult<()> {
    if size.is_power_of_two() && (MIN_ATLAS_SIZE..=MAX_ATLAS_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(ShadowError::InvalidAtlasSize { atlas, size })
    }
}

fn check_fade(name: &'static str, value: f32) -> ShadowResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ShadowError::InvalidFade { name, value })
    }
}

/// Atlas size and filter for one shadow type
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasSettings {
    /// Atlas dimension in texels (square, power of two)
    pub atlas_size: u32,

    /// PCF filter applied when sampling
    pub filter: FilterMode,
}

impl AtlasSettings {
    /// Create atlas settings
    pub const fn new(atlas_size: u32, filter: FilterMode) -> Self {
        Self { atlas_size, filter }
    }
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self::new(1024, FilterMode::Pcf2x2)
    }
}

/// Directional light shadow settings
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalShadowSettings {
    /// Atlas dimension in texels
    pub atlas_size: u32,

    /// PCF filter applied when sampling
    pub filter: FilterMode,

    /// Cascade count (1-4)
    pub cascade_count: u32,

    /// Cascade ends as fractions of the max distance (first `count - 1` used)
    pub cascade_ratios: [f32; 3],

    /// Relative width of the fade band at each cascade's edge
    pub cascade_fade: f32,

    /// How neighbouring cascades are blended
    pub cascade_blend: CascadeBlendMode,
}

impl Default for DirectionalShadowSettings {
    fn default() -> Self {
        Self {
            atlas_size: 1024,
            filter: FilterMode::Pcf2x2,
            cascade_count: 4,
            cascade_ratios: [0.1, 0.25, 0.5],
            cascade_fade: 0.1,
            cascade_blend: CascadeBlendMode::Hard,
        }
    }
}

impl DirectionalShadowSettings {
    /// Far end of each cascade as a fraction of the max distance
    pub fn cascade_ends(&self) -> [f32; 4] {
        let count = self.cascade_count.clamp(1, 4) as usize;
        let mut ends = [1.0f32; 4];
        ends[..count - 1].copy_from_slice(&self.cascade_ratios[..count - 1]);
        ends
    }

    /// Culling sphere shrink factor derived from the edge fade
    pub fn culling_factor(&self) -> f32 {
        (0.8 - self.cascade_fade).max(0.0)
    }
}

/// PCF filter size
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    #[default]
    Pcf2x2,
    Pcf3x3,
    Pcf5x5,
    Pcf7x7,
}

impl FilterMode {
    /// Filter width in texels used to scale biases
    pub fn filter_size(self) -> f32 {
        self as u32 as f32 + 1.0
    }

    /// Shader keyword index (-1 = default variant, no keyword)
    pub fn keyword_index(self) -> i32 {
        self as i32 - 1
    }
}

/// Cascade transition mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeBlendMode {
    #[default]
    Hard,
    Soft,
    Dither,
}

impl CascadeBlendMode {
    /// Shader keyword index (-1 = hard transitions)
    pub fn keyword_index(self) -> i32 {
        self as i32 - 1
    }
}

/// System-wide shadow mask mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowMaskMode {
    /// Baked mask replaces real-time shadows for static casters everywhere
    #[default]
    Shadowmask,
    /// Baked mask only beyond the real-time shadow distance
    DistanceShadowmask,
}

/// Shadow quality preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowQuality {
    /// Smallest atlases, minimal filtering
    Low,
    /// Balanced quality and performance
    Medium,
    /// High quality shadows
    High,
    /// Maximum quality
    Ultra,
}

impl ShadowQuality {
    /// Convert to a ShadowSettings
    pub fn to_settings(self) -> ShadowSettings {
        match self {
            Self::Low => ShadowSettings::low_quality(),
            Self::Medium => ShadowSettings::default(),
            Self::High => ShadowSettings::high_quality(),
            Self::Ultra => ShadowSettings {
                max_distance: 200.0,
                directional: DirectionalShadowSettings {
                    atlas_size: 8192,
                    filter: FilterMode::Pcf7x7,
                    cascade_blend: CascadeBlendMode::Soft,
                    ..Default::default()
                },
                spot: AtlasSettings::new(4096, FilterMode::Pcf7x7),
                point: AtlasSettings::new(4096, FilterMode::Pcf7x7),
                per_object: AtlasSettings::new(4096, FilterMode::Pcf7x7),
                ..Default::default()
            },
        }
    }
}
