use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::Profile;
use crate::session::{PROFILE_KEY, Session};

/// Clock
///
/// Time source injected into the cache service. Production uses the monotonic system
/// clock; tests substitute a manually advanced clock so time-to-live expiry is
/// exercised without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// SystemClock
///
/// The production `Clock`: a thin wrapper over `Instant::now`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// One cached profile plus the bookkeeping the freshness check needs.
struct CacheSlot {
    user_id: Uuid,
    profile: Profile,
    stored_at: Instant,
}

/// ProfileCache
///
/// The **process-tier** cache of the profile lookup: a single slot holding the most
/// recently resolved profile, valid for `ttl` after it was stored. One instance is
/// constructed at startup and shared through the application state; there is no
/// global. The slot is keyed by `user_id` on read, so an entry left behind by a
/// different user is simply a miss, never wrong data.
///
/// Concurrency note: the mutex is held only across the in-memory read/write, never
/// across an await. Two overlapping requests may both miss and both fetch; each then
/// overwrites the slot with equivalent data, which is idempotent and benign.
pub struct ProfileCache {
    slot: Mutex<Option<CacheSlot>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

/// Type alias for the shared cache handle held in `AppState`.
pub type ProfileCacheState = Arc<ProfileCache>;

impl ProfileCache {
    /// new
    ///
    /// Builds a cache with an explicit time source. Tests inject a manual clock here;
    /// everything else goes through `with_system_clock`.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
            clock,
        }
    }

    /// with_system_clock
    ///
    /// The production constructor: wall-clock time, TTL from configuration.
    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    /// get
    ///
    /// Returns the cached profile if the slot holds an entry for `user_id` that is
    /// still within the TTL. A stale or foreign entry is a miss; it is left in place
    /// (only `store` and `clear` write the slot).
    pub fn get(&self, user_id: Uuid) -> Option<Profile> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|entry| entry.user_id == user_id)
            .filter(|entry| self.clock.now().duration_since(entry.stored_at) < self.ttl)
            .map(|entry| entry.profile.clone())
    }

    /// store
    ///
    /// Replaces the slot with `profile`, stamped at the injected clock's now. Called
    /// on every remote fetch and on every session-tier fallback hit (the fallback
    /// refreshes the process tier's timestamp).
    pub fn store(&self, profile: Profile) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CacheSlot {
            user_id: profile.user_id,
            stored_at: self.clock.now(),
            profile,
        });
    }

    /// clear
    ///
    /// Empties the slot so the next gate evaluation cannot be satisfied by the
    /// process tier. The session tier is untouched; use `clear_cached_profile` to
    /// pick tiers explicitly.
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }
}

/// CacheTier
///
/// Selector for the invalidation hook. Clearing the process tier alone leaves the
/// session tier able to re-satisfy the next lookup (the historical behavior of the
/// portal's cache); callers that know the underlying row changed clear `Both`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Process,
    Session,
    Both,
}

/// clear_cached_profile
///
/// The cache invalidation hook, parameterized over which tiers to clear so each
/// profile-mutating caller chooses its own staleness trade-off. The session arm
/// removes only the profile entry of the **calling** browsing session; access
/// tokens are never touched here.
pub fn clear_cached_profile(tier: CacheTier, cache: &ProfileCache, session: &Session) {
    if matches!(tier, CacheTier::Process | CacheTier::Both) {
        cache.clear();
    }
    if matches!(tier, CacheTier::Session | CacheTier::Both) {
        session.remove(PROFILE_KEY);
    }
}
