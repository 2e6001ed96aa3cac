//! Per-object shadow caster registry
//!
//! Casters register on enable and unregister on disable. Each receives a
//! stable identity the first time it is registered; the identity lives in
//! the caster itself, so unregistering and registering again keeps it.
//! `cull` builds the frame's visible caster list, which reservation and the
//! atlas renderer index from 0.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use crate::bounds::Aabb;
use crate::camera::ShadowCamera;
use crate::error::{ShadowError, ShadowResult};

/// Stable caster identity (never 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CasterId(u32);

impl CasterId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caster#{}", self.0)
    }
}

/// Identity slot embedded in a caster, 0 until first registration
#[derive(Debug, Default)]
pub struct CasterIdentity(AtomicU32);

impl CasterIdentity {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Assigned identity, if the caster was ever registered
    pub fn get(&self) -> Option<CasterId> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            id => Some(CasterId::from_raw(id)),
        }
    }

    /// Store `id` unless an identity is already present
    fn assign(&self, id: u32) -> CasterId {
        match self.0.compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => CasterId(id),
            Err(existing) => CasterId(existing),
        }
    }
}

/// An object that renders its own tightly fitted shadow
pub trait ShadowCaster: Send + Sync {
    /// Identity slot owned by the caster
    fn identity(&self) -> &CasterIdentity;

    /// Current world-space bounds, `None` while unavailable
    fn world_bounds(&self) -> Option<Aabb>;

    /// World up vector used to orient the shadow volume
    fn up(&self) -> Vec3 {
        Vec3::Y
    }
}

/// Caster with externally updated bounds
#[derive(Debug)]
pub struct BoundedShadowCaster {
    identity: CasterIdentity,
    bounds: RwLock<Option<Aabb>>,
    up: RwLock<Vec3>,
}

impl BoundedShadowCaster {
    pub fn new(bounds: Aabb) -> Self {
        Self {
            identity: CasterIdentity::new(),
            bounds: RwLock::new(Some(bounds)),
            up: RwLock::new(Vec3::Y),
        }
    }

    pub fn with_up(self, up: Vec3) -> Self {
        *self.up.write() = up;
        self
    }

    /// Update world bounds (`None` hides the caster from culling)
    pub fn set_bounds(&self, bounds: Option<Aabb>) {
        *self.bounds.write() = bounds;
    }

    pub fn set_up(&self, up: Vec3) {
        *self.up.write() = up;
    }
}

impl ShadowCaster for BoundedShadowCaster {
    fn identity(&self) -> &CasterIdentity {
        &self.identity
    }

    fn world_bounds(&self) -> Option<Aabb> {
        *self.bounds.read()
    }

    fn up(&self) -> Vec3 {
        *self.up.read()
    }
}

/// A caster that passed frustum culling this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleCaster {
    pub id: CasterId,
    pub bounds: Aabb,
    pub up: Vec3,
}

/// Registry of enabled per-object casters
///
/// Safe to share between threads; register and unregister may be called
/// from object lifecycle code while another thread culls.
pub struct CasterRegistry {
    casters: RwLock<BTreeMap<CasterId, Arc<dyn ShadowCaster>>>,
    next_id: AtomicU32,
}

impl CasterRegistry {
    pub fn new() -> Self {
        Self {
            casters: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Register a caster, assigning its identity on first registration
    ///
    /// Registering a caster that is already present is a no-op. A caster
    /// whose identity came from another registry keeps it; this registry's
    /// counter moves past it, and the call fails if a different caster
    /// already holds that identity here.
    pub fn register(&self, caster: Arc<dyn ShadowCaster>) -> ShadowResult<CasterId> {
        let mut casters = self.casters.write();

        let id = match caster.identity().get() {
            Some(id) => {
                self.next_id.fetch_max(id.raw().saturating_add(1), Ordering::Relaxed);
                id
            }
            None => {
                let next = self.next_id.fetch_add(1, Ordering::Relaxed);
                caster.identity().assign(next)
            }
        };

        match casters.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(caster);
            }
            Entry::Occupied(slot) if same_caster(slot.get(), &caster) => {}
            Entry::Occupied(_) => {
                log::warn!("{} is already held by another caster, registration refused", id);
                return Err(ShadowError::CasterIdentityConflict(id));
            }
        }
        Ok(id)
    }

    /// Remove a caster; no effect if it is not registered
    pub fn unregister(&self, caster: &dyn ShadowCaster) -> bool {
        caster
            .identity()
            .get()
            .map(|id| self.unregister_id(id))
            .unwrap_or(false)
    }

    /// Remove a caster by identity
    pub fn unregister_id(&self, id: CasterId) -> bool {
        self.casters.write().remove(&id).is_some()
    }

    pub fn contains(&self, id: CasterId) -> bool {
        self.casters.read().contains_key(&id)
    }

    /// Caster is currently registered
    pub fn contains_caster(&self, caster: &dyn ShadowCaster) -> bool {
        caster.identity().get().map(|id| self.contains(id)).unwrap_or(false)
    }

    pub fn get(&self, id: CasterId) -> Option<Arc<dyn ShadowCaster>> {
        self.casters.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.casters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.casters.read().is_empty()
    }

    /// Identity the next new caster will receive
    pub fn next_identity(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Casters whose bounds intersect the camera frustum, in identity order
    pub fn cull(&self, camera: &ShadowCamera) -> Vec<VisibleCaster> {
        let casters = self.casters.read();
        if casters.is_empty() {
            return Vec::new();
        }

        let frustum = camera.frustum();
        let mut visible = Vec::with_capacity(casters.len());

        for (id, caster) in casters.iter() {
            let Some(bounds) = caster.world_bounds() else {
                log::trace!("{} has no bounds, skipped", id);
                continue;
            };
            if frustum.intersects_aabb(&bounds) {
                visible.push(VisibleCaster {
                    id: *id,
                    bounds,
                    up: caster.up(),
                });
            }
        }

        log::trace!("Caster cull: {} of {} visible", visible.len(), casters.len());
        visible
    }
}

/// Both handles point at the same caster object
fn same_caster(a: &Arc<dyn ShadowCaster>, b: &Arc<dyn ShadowCaster>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl Default for CasterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CasterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CasterRegistry")
            .field("casters", &self.casters.read().keys().collect::<Vec<_>>())
            .field("next_id", &self.next_identity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caster_at(center: Vec3) -> Arc<BoundedShadowCaster> {
        Arc::new(BoundedShadowCaster::new(Aabb::from_center_extents(center, Vec3::ONE)))
    }

    fn camera() -> ShadowCamera {
        ShadowCamera::perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 60f32.to_radians(), 1.0, 0.1, 50.0)
    }

    #[test]
    fn test_identities_start_at_one() {
        let registry = CasterRegistry::new();
        let a = registry.register(caster_at(Vec3::ZERO)).unwrap();
        let b = registry.register(caster_at(Vec3::X)).unwrap();

        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(format!("{}", a), "caster#1");
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = CasterRegistry::new();
        let caster = caster_at(Vec3::ZERO);

        let first = registry.register(caster.clone()).unwrap();
        let next = registry.next_identity();
        let second = registry.register(caster.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.next_identity(), next);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_keeps_identity() {
        let registry = CasterRegistry::new();
        let caster = caster_at(Vec3::ZERO);

        let id = registry.register(caster.clone()).unwrap();
        assert!(registry.unregister(&*caster));
        assert!(!registry.contains(id));
        assert!(!registry.unregister(&*caster));

        assert_eq!(registry.register(caster.clone()).unwrap(), id);
        assert_eq!(caster.identity().get(), Some(id));
    }

    #[test]
    fn test_identity_from_another_registry() {
        let first = CasterRegistry::new();
        let a = caster_at(Vec3::ZERO);
        let b = caster_at(Vec3::X);
        first.register(a.clone()).unwrap();
        let id_b = first.register(b.clone()).unwrap();

        let second = CasterRegistry::new();
        let local = caster_at(Vec3::Y);
        let id_local = second.register(local.clone()).unwrap();
        assert_eq!(id_local.raw(), 1);

        // `a` also holds identity 1
        assert!(matches!(second.register(a.clone()), Err(ShadowError::CasterIdentityConflict(id)) if id == id_local));
        assert_eq!(second.len(), 1);
        assert!(second.contains_caster(&*local));
        assert!(!second.contains_caster(&*a));

        // A free foreign identity is kept and the counter skips past it
        assert_eq!(second.register(b.clone()).unwrap(), id_b);
        assert_eq!(second.next_identity(), 3);
        assert_eq!(second.register(caster_at(Vec3::Z)).unwrap().raw(), 3);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = CasterRegistry::new();
        let stranger = caster_at(Vec3::ZERO);
        assert!(!registry.unregister(&*stranger));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cull_filters_and_orders() {
        let registry = CasterRegistry::new();
        let behind = caster_at(Vec3::new(0.0, 0.0, 40.0));
        let visible_a = caster_at(Vec3::ZERO);
        let visible_b = caster_at(Vec3::new(1.0, 0.0, -5.0));

        let id_a = registry.register(visible_a.clone()).unwrap();
        registry.register(behind).unwrap();
        let id_b = registry.register(visible_b.clone()).unwrap();

        let visible = registry.cull(&camera());
        let ids: Vec<_> = visible.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![id_a, id_b]);
        assert_eq!(visible[1].bounds, visible_b.world_bounds().unwrap());
    }

    #[test]
    fn test_cull_skips_missing_bounds() {
        let registry = CasterRegistry::new();
        let caster = caster_at(Vec3::ZERO);
        registry.register(caster.clone()).unwrap();

        caster.set_bounds(None);
        assert!(registry.cull(&camera()).is_empty());

        caster.set_bounds(Some(Aabb::from_center_extents(Vec3::ZERO, Vec3::ONE)));
        caster.set_up(Vec3::Z);
        let visible = registry.cull(&camera());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].up, Vec3::Z);
    }

    #[test]
    fn test_concurrent_registration_unique() {
        let registry = Arc::new(CasterRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| registry.register(caster_at(Vec3::splat(i as f32))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|id| id.raw())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 100);
        assert_eq!(registry.len(), 100);
        assert_eq!(registry.next_identity(), 101);
    }
}
