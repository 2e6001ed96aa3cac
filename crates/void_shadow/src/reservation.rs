//! Per-frame shadow slot reservation
//!
//! Each shadow type owns a fixed number of slots. Lights and per-object
//! casters reserve slots in visibility order until a type runs out; lights
//! that do not get one keep their baked shadow mask through a negated
//! strength in the packed parameter.

use serde::{Serialize, Deserialize};

use crate::layout::MAX_ATLAS_TILES;
use crate::light::{CasterBoundsQuery, LightKind, VisibleLight};

/// Directional lights with real-time shadows per frame
pub const MAX_SHADOWED_DIRECTIONAL_LIGHTS: usize = 4;
/// Spot lights with real-time shadows per frame
pub const MAX_SHADOWED_SPOT_LIGHTS: usize = 16;
/// Point lights with real-time shadows per frame
pub const MAX_SHADOWED_POINT_LIGHTS: usize = 2;
/// Per-object casters with real-time shadows per frame
pub const MAX_SHADOWED_CASTERS: usize = 16;
/// Cube faces rendered per point light
pub const POINT_LIGHT_FACES: u32 = 6;

/// Shadow parameters folded into a light's GPU record
///
/// `(strength, tileBaseIndex, normalBias, maskChannel)`. A negative strength
/// means "no real-time slot, use only the baked mask with |strength|".
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedShadowParameter {
    pub strength: f32,
    pub tile_index: f32,
    pub normal_bias: f32,
    pub mask_channel: f32,
}

impl PackedShadowParameter {
    /// Light casts no shadow of any kind
    pub fn none(mask_channel: f32) -> Self {
        Self {
            mask_channel,
            ..Default::default()
        }
    }

    /// Baked-only fallback
    pub fn baked_only(strength: f32, mask_channel: f32) -> Self {
        Self {
            strength: -strength,
            tile_index: 0.0,
            normal_bias: 0.0,
            mask_channel,
        }
    }

    /// Sample the real-time atlas
    #[inline]
    pub fn is_realtime(&self) -> bool {
        self.strength > 0.0
    }

    /// Fell back to baked shadowing
    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.strength < 0.0
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.strength, self.tile_index, self.normal_bias, self.mask_channel]
    }
}

/// A light bound to a slot this frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShadowedLight {
    pub visible_light_index: usize,
    pub slope_scale_bias: f32,
    pub normal_bias: f32,
    pub near_plane_offset: f32,
}

/// A per-object caster bound to a slot this frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShadowedCaster {
    pub visible_caster_index: usize,
}

/// Fixed-capacity slot list for one shadow type
#[derive(Clone, Debug)]
pub struct SlotList<T, const N: usize> {
    slots: [T; N],
    count: usize,
}

impl<T: Copy + Default, const N: usize> Default for SlotList<T, N> {
    fn default() -> Self {
        Self {
            slots: [T::default(); N],
            count: 0,
        }
    }
}

impl<T: Copy + Default, const N: usize> SlotList<T, N> {
    pub const CAPACITY: usize = N;

    /// Reserve the next slot, returning its index
    fn reserve(&mut self, value: T) -> Option<usize> {
        if self.count == N {
            return None;
        }
        let index = self.count;
        self.slots[index] = value;
        self.count += 1;
        Some(index)
    }

    fn clear(&mut self) {
        self.count = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub fn as_slice(&self) -> &[T] {
        &self.slots[..self.count]
    }
}

/// Reservation counters for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStats {
    pub directional: u32,
    pub spot: u32,
    pub point: u32,
    pub casters: u32,
    /// Lights that fell back to baked shadowing
    pub fallbacks: u32,
    /// Casters refused for lack of slots or atlas tiles
    pub casters_refused: u32,
}

/// Frame-scoped shadow reservation state
///
/// Owned by the pass that drives shadows; reset with [`ShadowFrame::setup`]
/// before reserving anything for a new frame.
#[derive(Clone, Debug)]
pub struct ShadowFrame {
    cascade_count: u32,
    directional: SlotList<ShadowedLight, MAX_SHADOWED_DIRECTIONAL_LIGHTS>,
    spot: SlotList<ShadowedLight, MAX_SHADOWED_SPOT_LIGHTS>,
    point: SlotList<ShadowedLight, MAX_SHADOWED_POINT_LIGHTS>,
    casters: SlotList<ShadowedCaster, MAX_SHADOWED_CASTERS>,
    use_shadow_mask: bool,
    stats: ReservationStats,
}

impl ShadowFrame {
    /// Empty frame for the given directional cascade count
    pub fn new(cascade_count: u32) -> Self {
        Self {
            cascade_count: cascade_count.clamp(1, 4),
            directional: SlotList::default(),
            spot: SlotList::default(),
            point: SlotList::default(),
            casters: SlotList::default(),
            use_shadow_mask: false,
            stats: ReservationStats::default(),
        }
    }

    /// Reset every counter for a new frame
    pub fn setup(&mut self, cascade_count: u32) {
        self.cascade_count = cascade_count.clamp(1, 4);
        self.directional.clear();
        self.spot.clear();
        self.point.clear();
        self.casters.clear();
        self.use_shadow_mask = false;
        self.stats = ReservationStats::default();
    }

    /// Reserve a real-time shadow slot for a visible light
    pub fn reserve_light_shadows<Q>(
        &mut self,
        light: &VisibleLight,
        visible_light_index: usize,
        bounds: &Q,
    ) -> PackedShadowParameter
    where
        Q: CasterBoundsQuery + ?Sized,
    {
        let mask_channel = light.baking.mask_channel();
        if !light.shadows.casts() {
            return PackedShadowParameter::none(mask_channel);
        }

        if light.baking.uses_shadow_mask() {
            self.use_shadow_mask = true;
        }

        let strength = light.shadows.strength;
        let full = match light.kind {
            LightKind::Directional => self.directional.is_full(),
            LightKind::Spot => self.spot.is_full(),
            LightKind::Point => self.point.is_full(),
        };
        if full || bounds.shadow_caster_bounds(visible_light_index).is_none() {
            self.stats.fallbacks += 1;
            log::debug!(
                "{:?} light {} falls back to baked shadows ({})",
                light.kind,
                visible_light_index,
                if full { "no free slot" } else { "no caster bounds" },
            );
            return PackedShadowParameter::baked_only(strength, mask_channel);
        }

        let shadowed = ShadowedLight {
            visible_light_index,
            slope_scale_bias: light.shadows.slope_scale_bias,
            normal_bias: light.shadows.normal_bias,
            near_plane_offset: light.shadows.near_plane_offset,
        };

        let tile_index = match light.kind {
            LightKind::Directional => self.directional.reserve(shadowed).map(|slot| {
                self.stats.directional += 1;
                slot as u32 * self.cascade_count
            }),
            LightKind::Spot => self.spot.reserve(shadowed).map(|slot| {
                self.stats.spot += 1;
                slot as u32
            }),
            LightKind::Point => self.point.reserve(shadowed).map(|slot| {
                self.stats.point += 1;
                slot as u32 * POINT_LIGHT_FACES
            }),
        };

        if light.kind == LightKind::Directional && self.casters.len() > self.caster_tile_budget() {
            log::warn!(
                "Directional light {} reserved after {} per-object casters, only {} keep their tiles",
                visible_light_index,
                self.casters.len(),
                self.caster_tile_budget(),
            );
        }

        match tile_index {
            Some(tile_index) => PackedShadowParameter {
                strength,
                tile_index: tile_index as f32,
                normal_bias: light.shadows.normal_bias,
                mask_channel,
            },
            None => PackedShadowParameter::baked_only(strength, mask_channel),
        }
    }

    /// Reserve a slot for a per-object caster
    ///
    /// Casters are binary on/off: no strength gating, only capacity. A caster
    /// needs one tile per reserved directional light, so the slot count is
    /// also limited by what fits in one atlas grid.
    pub fn reserve_per_object_caster(&mut self, visible_caster_index: usize) -> Option<usize> {
        if self.casters.len() >= self.caster_tile_budget() {
            self.stats.casters_refused += 1;
            log::debug!("Per-object caster {} refused: atlas tiles exhausted", visible_caster_index);
            return None;
        }

        match self.casters.reserve(ShadowedCaster { visible_caster_index }) {
            Some(slot) => {
                self.stats.casters += 1;
                Some(slot)
            }
            None => {
                self.stats.casters_refused += 1;
                log::debug!("Per-object caster {} refused: no free slot", visible_caster_index);
                None
            }
        }
    }

    #[inline]
    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    pub fn directional_lights(&self) -> &[ShadowedLight] {
        self.directional.as_slice()
    }

    pub fn spot_lights(&self) -> &[ShadowedLight] {
        self.spot.as_slice()
    }

    pub fn point_lights(&self) -> &[ShadowedLight] {
        self.point.as_slice()
    }

    /// Reserved casters that fit the per-object atlas
    ///
    /// Directional lights reserved after the casters shrink the budget; the
    /// casters reserved last lose their tiles.
    pub fn casters(&self) -> &[ShadowedCaster] {
        let casters = self.casters.as_slice();
        &casters[..casters.len().min(self.caster_tile_budget())]
    }

    /// Casters that fit one atlas grid with a tile per directional light
    fn caster_tile_budget(&self) -> usize {
        MAX_ATLAS_TILES as usize / self.directional.len().max(1)
    }

    /// Some shadowed light samples the baked shadow mask
    #[inline]
    pub fn use_shadow_mask(&self) -> bool {
        self.use_shadow_mask
    }

    pub fn stats(&self) -> &ReservationStats {
        &self.stats
    }

    /// Tiles needed in the directional atlas
    pub fn directional_tile_count(&self) -> u32 {
        self.directional.len() as u32 * self.cascade_count
    }

    /// Tiles needed in the spot atlas
    pub fn spot_tile_count(&self) -> u32 {
        self.spot.len() as u32
    }

    /// Tiles needed in the point atlas
    pub fn point_tile_count(&self) -> u32 {
        self.point.len() as u32 * POINT_LIGHT_FACES
    }

    /// Tiles needed in the per-object atlas
    pub fn per_object_tile_count(&self) -> u32 {
        self.casters().len() as u32 * self.directional.len() as u32
    }
}

impl Default for ShadowFrame {
    fn default() -> Self {
        Self::new(4)
    }
}
