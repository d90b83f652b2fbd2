use chem_cash::{
    AppConfig, AppState, MockIdentityProvider, MockProfileStore, ProfileCache,
    cache::{CacheTier, Clock, clear_cached_profile},
    gate::{GateOutcome, evaluate_gate},
    identity::IdentityState,
    models::{Identity, Profile, Role},
    profiles::ProfileStoreState,
    session::{PROFILE_KEY, Session, SessionStore, TOKEN_KEY},
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

// --- Test Clock ---

// Manually advanced time source so TTL expiry is exercised without sleeping.
struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

// --- Harness ---

const TTL: Duration = Duration::from_secs(300);
const TEST_TOKEN: &str = "test-access-token";

struct GateHarness {
    state: AppState,
    profiles: Arc<MockProfileStore>,
    clock: Arc<ManualClock>,
    session: Session,
}

fn teacher_profile(user_id: Uuid) -> Profile {
    Profile {
        user_id,
        first_name: "Tess".to_string(),
        last_name: "Byrne".to_string(),
        user_role: Role::Teacher,
        email: "tess@school.test".to_string(),
    }
}

fn identity_for(profile: &Profile) -> Identity {
    Identity {
        user_id: profile.user_id,
        email: Some(profile.email.clone()),
    }
}

/// Builds a gate harness around one signed-in identity and a pre-seeded profile
/// store. The session already carries the access token; both cache tiers start
/// empty unless a test populates them.
fn harness(identity: Identity, profiles: MockProfileStore) -> GateHarness {
    let profiles = Arc::new(profiles);
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(ProfileCache::new(TTL, Arc::clone(&clock) as Arc<dyn Clock>));

    let sessions = Arc::new(SessionStore::new());
    let session = sessions.create();
    session.set(TOKEN_KEY, TEST_TOKEN.to_string());

    let state = AppState {
        identity: Arc::new(MockIdentityProvider::signed_in(identity)) as IdentityState,
        profiles: Arc::clone(&profiles) as ProfileStoreState,
        cache,
        sessions,
        config: AppConfig::default(),
    };

    GateHarness {
        state,
        profiles,
        clock,
        session,
    }
}

// --- Identity Resolution (Step 1) ---

#[tokio::test]
async fn test_no_token_is_unauthenticated_without_any_fetch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );
    h.session.remove(TOKEN_KEY);

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::Unauthenticated);
    assert_eq!(h.profiles.fetches(), 0, "signed-out requests must not fetch");
}

#[tokio::test]
async fn test_rejected_token_is_unauthenticated_without_any_fetch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );
    h.session.set(TOKEN_KEY, "stale-or-forged-token".to_string());

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::Unauthenticated);
    assert_eq!(h.profiles.fetches(), 0);
}

#[tokio::test]
async fn test_identity_backend_failure_reads_as_signed_out() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let mut h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );
    h.state.identity = Arc::new(MockIdentityProvider::new_failing()) as IdentityState;

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::Unauthenticated);
    assert_eq!(h.profiles.fetches(), 0);
}

// --- Role/Path Agreement (Steps 3-4) ---

#[tokio::test]
async fn test_wrong_section_is_a_role_mismatch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );

    // A teacher deep-linking into the admin section is bounced to their own home.
    let outcome = evaluate_gate(&h.state, &h.session, "/admin/settings").await;

    assert_eq!(
        outcome,
        GateOutcome::RoleMismatch {
            target: Role::Teacher
        }
    );
    assert_eq!(Role::Teacher.home_path(), "/teacher");
}

#[tokio::test]
async fn test_root_path_is_a_role_mismatch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );

    let outcome = evaluate_gate(&h.state, &h.session, "/").await;

    assert_eq!(
        outcome,
        GateOutcome::RoleMismatch {
            target: Role::Teacher
        }
    );
}

#[tokio::test]
async fn test_unknown_prefix_is_a_role_mismatch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );

    // "/administrator" shares letters with a role name but is not a role segment.
    let outcome = evaluate_gate(&h.state, &h.session, "/administrator").await;

    assert_eq!(
        outcome,
        GateOutcome::RoleMismatch {
            target: Role::Teacher
        }
    );
}

#[tokio::test]
async fn test_matching_section_authorizes_with_untouched_payload() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let identity = identity_for(&profile);
    let h = harness(
        identity.clone(),
        MockProfileStore::with_profile(profile.clone()),
    );

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher/songs").await;

    // The pair the handler receives is exactly what the backends reported.
    assert_eq!(outcome, GateOutcome::Authorized { identity, profile });
    assert_eq!(h.profiles.fetches(), 1);
}

// --- Profile Resolution (Step 2) ---

#[tokio::test]
async fn test_remote_fetch_populates_both_cache_tiers() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile.clone()),
    );

    evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert_eq!(h.profiles.fetches(), 1);

    // Both tiers now hold the fetched row.
    assert_eq!(h.state.cache.get(user_id), Some(profile.clone()));
    let session_entry = h.session.get(PROFILE_KEY).expect("session tier not primed");
    let parsed: Profile = serde_json::from_str(&session_entry).unwrap();
    assert_eq!(parsed, profile);

    // A second evaluation is answered entirely from cache.
    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert!(matches!(outcome, GateOutcome::Authorized { .. }));
    assert_eq!(h.profiles.fetches(), 1, "warm evaluations must not re-fetch");
}

#[tokio::test]
async fn test_fresh_process_cache_answers_without_any_lookup() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile.clone()),
    );

    h.state.cache.store(profile.clone());
    // Poison the session tier: if the process tier missed, this entry would be
    // read, fail to parse, and the store would be fetched.
    h.session.set(PROFILE_KEY, "not json".to_string());

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert!(matches!(outcome, GateOutcome::Authorized { .. }));
    assert_eq!(h.profiles.fetches(), 0);
}

#[tokio::test]
async fn test_stale_process_cache_falls_back_to_session_tier() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile.clone()),
    );

    h.state.cache.store(profile.clone());
    h.session
        .set(PROFILE_KEY, serde_json::to_string(&profile).unwrap());

    // Step past the TTL: the process tier is stale, the session tier answers.
    h.clock.advance(TTL + Duration::from_secs(1));
    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert!(matches!(outcome, GateOutcome::Authorized { .. }));
    assert_eq!(h.profiles.fetches(), 0);

    // The session hit re-stamped the process tier: with the session entry gone
    // and the clock just inside a fresh TTL window, the slot still answers.
    h.session.remove(PROFILE_KEY);
    h.clock.advance(TTL - Duration::from_secs(1));
    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert!(matches!(outcome, GateOutcome::Authorized { .. }));
    assert_eq!(h.profiles.fetches(), 0);

    // Past the refreshed window, with no session entry, the store is consulted.
    h.clock.advance(Duration::from_secs(2));
    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert!(matches!(outcome, GateOutcome::Authorized { .. }));
    assert_eq!(h.profiles.fetches(), 1);
}

#[tokio::test]
async fn test_cache_slot_for_another_user_is_a_miss() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile.clone()),
    );

    h.state.cache.store(teacher_profile(Uuid::new_v4()));

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::Authorized {
        identity: identity_for(&profile),
        profile,
    });
    assert_eq!(h.profiles.fetches(), 1);
}

#[tokio::test]
async fn test_session_entry_for_another_user_falls_through_to_fetch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile.clone()),
    );

    let foreign = teacher_profile(Uuid::new_v4());
    h.session
        .set(PROFILE_KEY, serde_json::to_string(&foreign).unwrap());

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::Authorized {
        identity: identity_for(&profile),
        profile,
    });
    assert_eq!(h.profiles.fetches(), 1);
}

#[tokio::test]
async fn test_missing_profile_row_is_profile_missing() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(identity_for(&profile), MockProfileStore::new());

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::ProfileMissing);
    assert_eq!(h.profiles.fetches(), 1);
}

#[tokio::test]
async fn test_profile_fetch_failure_is_profile_missing() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(identity_for(&profile), MockProfileStore::new_failing());

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;

    assert_eq!(outcome, GateOutcome::ProfileMissing);
}

// --- Invalidation Hook ---

#[tokio::test]
async fn test_clearing_both_tiers_forces_a_refetch() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );

    evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert_eq!(h.profiles.fetches(), 1);

    clear_cached_profile(CacheTier::Both, &h.state.cache, &h.session);

    evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert_eq!(h.profiles.fetches(), 2);
}

#[tokio::test]
async fn test_clearing_process_tier_alone_is_resatisfied_by_session_tier() {
    let user_id = Uuid::new_v4();
    let profile = teacher_profile(user_id);
    let h = harness(
        identity_for(&profile),
        MockProfileStore::with_profile(profile),
    );

    evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert_eq!(h.profiles.fetches(), 1);

    // The session tier survives a process-only clear and answers the next
    // evaluation, so no new fetch happens.
    clear_cached_profile(CacheTier::Process, &h.state.cache, &h.session);

    let outcome = evaluate_gate(&h.state, &h.session, "/teacher").await;
    assert!(matches!(outcome, GateOutcome::Authorized { .. }));
    assert_eq!(h.profiles.fetches(), 1);
}
