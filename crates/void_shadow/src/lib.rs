//! Void Shadow - Shadow Map Atlases
//!
//! Decides which shadow-casting lights and per-object casters get a
//! real-time shadow map each frame, packs those maps into per-type atlases,
//! and produces the per-tile transform and bias rows the shading stage
//! samples them with.
//!
//! # Frame Flow
//!
//! ```text
//! visible lights ──► ShadowFrame::reserve_light_shadows ──► PackedShadowParameter
//! CasterRegistry::cull ──► ShadowFrame::reserve_per_object_caster
//!                              │
//!                              ▼
//!                  ShadowAtlasRenderer::render
//!          ┌──────────┬────────┴─┬─────────────┐
//!          ▼          ▼          ▼             ▼
//!     Directional    Spot      Point      PerObject
//!     (cascades)            (6 faces)  (ShadowVolumeFitter)
//!          │          │          │             │
//!          └──────────┴────┬─────┴─────────────┘
//!                          ▼
//!           ShadowBackend (tile draws, buffer uploads)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use void_shadow::prelude::*;
//!
//! let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default())?;
//! let mut frame = ShadowFrame::new(renderer.settings().directional.cascade_count);
//!
//! // Per frame
//! frame.setup(renderer.settings().directional.cascade_count);
//! let packed: Vec<_> = lights
//!     .iter()
//!     .enumerate()
//!     .map(|(i, light)| frame.reserve_light_shadows(light, i, &lights[..]))
//!     .collect();
//!
//! let casters = registry.cull(&camera);
//! for i in 0..casters.len() {
//!     frame.reserve_per_object_caster(i);
//! }
//!
//! let globals = renderer.render(&frame, &lights, &casters, &camera, &mut backend);
//! ```

pub mod backend;
pub mod bounds;
pub mod camera;
pub mod cascade;
pub mod caster;
pub mod clip;
pub mod config;
pub mod data;
pub mod error;
pub mod fitter;
pub mod layout;
pub mod light;
pub mod renderer;
pub mod reservation;

pub use backend::{AtlasTexture, ShadowBackend, ShadowCommand, ShadowCommandList, ShadowGlobals, ShadowKind, TileDraw, TileSource};
pub use bounds::{Aabb, Frustum, FrustumTestResult, Plane};
pub use camera::{CameraProjection, ShadowCamera};
pub use cascade::{CascadeSplit, ShadowCascades, MAX_CASCADES};
pub use caster::{BoundedShadowCaster, CasterId, CasterIdentity, CasterRegistry, ShadowCaster, VisibleCaster};
pub use clip::{ClipError, MAX_CLIP_FRAGMENTS};
pub use config::{
    AtlasSettings,
    CascadeBlendMode,
    DirectionalShadowSettings,
    FilterMode,
    ShadowMaskMode,
    ShadowQuality,
    ShadowSettings,
};
pub use data::{atlas_matrix, CascadeRow, ShadowBufferKind, ShadowBuffers, ShadowTileRow};
pub use error::{ShadowError, ShadowResult};
pub use fitter::{ShadowVolume, ShadowVolumeFitter};
pub use layout::{TileLayout, TileViewport, MAX_ATLAS_TILES, MAX_SPLIT};
pub use light::{CasterBoundsQuery, LightBaking, LightKind, LightShadows, LightmapBakeType, MixedLightingMode, VisibleLight};
pub use renderer::{ShadowAtlasRenderer, ShadowFrameStats};
pub use reservation::{
    PackedShadowParameter,
    ReservationStats,
    ShadowFrame,
    MAX_SHADOWED_CASTERS,
    MAX_SHADOWED_DIRECTIONAL_LIGHTS,
    MAX_SHADOWED_POINT_LIGHTS,
    MAX_SHADOWED_SPOT_LIGHTS,
};

pub mod prelude {
    //! Common imports for driving the shadow pass
    pub use crate::backend::{ShadowBackend, ShadowCommandList, ShadowGlobals, ShadowKind};
    pub use crate::bounds::Aabb;
    pub use crate::camera::ShadowCamera;
    pub use crate::caster::{BoundedShadowCaster, CasterRegistry, ShadowCaster, VisibleCaster};
    pub use crate::config::{ShadowQuality, ShadowSettings};
    pub use crate::error::{ShadowError, ShadowResult};
    pub use crate::light::{LightBaking, LightShadows, VisibleLight};
    pub use crate::renderer::ShadowAtlasRenderer;
    pub use crate::reservation::{PackedShadowParameter, ShadowFrame};
}
