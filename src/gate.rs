use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    models::{Identity, Profile, Role},
    session::{PROFILE_KEY, Session, TOKEN_KEY, session_id_from_headers},
};

/// Redirect target for every request the gate cannot authenticate.
pub const LOGIN_PATH: &str = "/login";

/// GateOutcome
///
/// The result of one gate evaluation, kept as a tagged variant so the distinct
/// failure causes stay diagnosable (and testable) even though the user-visible
/// behavior collapses them: `Unauthenticated` and `ProfileMissing` both bounce to
/// the login screen, `RoleMismatch` bounces to the user's own section. Only the
/// `access_gate` middleware performs that collapse.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// No identity could be resolved for this request.
    Unauthenticated,
    /// The identity is valid but no profile row exists (or the fetch failed).
    ProfileMissing,
    /// Valid identity and profile, but the path belongs to another section.
    /// `target` is the section the user should be in.
    RoleMismatch { target: Role },
    /// Role and path agree; the request may proceed with this pair attached.
    Authorized { identity: Identity, profile: Profile },
}

/// CurrentUser
///
/// The pass-through payload the gate attaches to every authorized request: the
/// resolved `{identity, profile}` pair, available to any protected handler as an
/// extractor argument. Handlers hand the pair back to the client unmutated.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub profile: Profile,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Present on every request that passed the gate; a miss means the route was
        // wired outside the protected router.
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// evaluate_gate
///
/// One full gate evaluation for a request into the protected section:
///
/// 1. Resolve the current identity from the session's access token.
/// 2. Resolve the profile through the three-tier lookup: process cache (fresh TTL),
///    session store (refreshes the process tier's timestamp), remote fetch
///    (populates both tiers).
/// 3. Check the path's role prefix against the profile's role.
///
/// Side effects are limited to cache writes; the session-tier entry is never
/// deleted here (sign-out owns that).
pub async fn evaluate_gate(state: &AppState, session: &Session, path: &str) -> GateOutcome {
    // Step 1: identity resolution. No token, a rejected token, and a provider
    // failure all look the same from here: nobody is signed in.
    let Some(token) = session.get(TOKEN_KEY) else {
        tracing::debug!("gate: no access token in session");
        return GateOutcome::Unauthenticated;
    };

    let identity = match state.identity.current_identity(&token).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            tracing::debug!("gate: access token did not resolve to an identity");
            return GateOutcome::Unauthenticated;
        }
        Err(e) => {
            tracing::warn!(error = %e, "gate: identity resolution failed");
            return GateOutcome::Unauthenticated;
        }
    };

    // Step 2: profile resolution through the cache tiers.
    let Some(profile) = resolve_profile(state, session, &identity, &token).await else {
        return GateOutcome::ProfileMissing;
    };

    // Steps 3 and 4: role/path agreement. A path with no role prefix (the root,
    // or any unknown first segment) redirects home exactly like a foreign section.
    match Role::from_path(path) {
        Some(prefix) if prefix == profile.user_role => {
            GateOutcome::Authorized { identity, profile }
        }
        _ => GateOutcome::RoleMismatch {
            target: profile.user_role,
        },
    }
}

/// resolve_profile
///
/// The three-tier profile lookup. Tier order and write-backs are load-bearing:
/// a session-store hit re-stamps the process tier to now, and a remote fetch
/// populates both tiers, so an immediately following evaluation is answered
/// without another fetch.
async fn resolve_profile(
    state: &AppState,
    session: &Session,
    identity: &Identity,
    token: &str,
) -> Option<Profile> {
    // Tier 1: process cache. `get` only answers for a matching user id within TTL.
    if let Some(profile) = state.cache.get(identity.user_id) {
        tracing::debug!(user_id = %identity.user_id, "gate: profile served from process cache");
        return Some(profile);
    }

    // Tier 2: session store.
    if let Some(raw) = session.get(PROFILE_KEY) {
        match serde_json::from_str::<Profile>(&raw) {
            Ok(profile) if profile.user_id == identity.user_id => {
                state.cache.store(profile.clone());
                tracing::debug!(user_id = %identity.user_id, "gate: profile served from session store");
                return Some(profile);
            }
            Ok(_) => {
                // Entry belongs to a different user; leave it for sign-out to clean
                // up and fall through to the fetch.
            }
            Err(e) => {
                tracing::error!(error = %e, "gate: session profile entry failed to parse");
            }
        }
    }

    // Tier 3: remote fetch.
    match state
        .profiles
        .fetch_profile_by_user_id(token, identity.user_id)
        .await
    {
        Ok(Some(profile)) => {
            state.cache.store(profile.clone());
            match serde_json::to_string(&profile) {
                Ok(serialized) => session.set(PROFILE_KEY, serialized),
                Err(e) => {
                    tracing::error!(error = %e, "gate: profile failed to serialize for session store");
                }
            }
            Some(profile)
        }
        Ok(None) => {
            tracing::warn!(user_id = %identity.user_id, "gate: authenticated user has no profile row");
            None
        }
        Err(e) => {
            tracing::warn!(user_id = %identity.user_id, error = %e, "gate: profile fetch failed");
            None
        }
    }
}

/// access_gate
///
/// The middleware guarding the protected router. It binds the request to its
/// browsing session, runs `evaluate_gate`, and collapses the outcome at this
/// presentation boundary: authorized requests proceed with `CurrentUser` and the
/// `Session` attached as extensions, everything else becomes a redirect.
pub async fn access_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = session_id_from_headers(request.headers())
        .and_then(|id| state.sessions.open(id));

    let path = request.uri().path().to_string();
    let outcome = match &session {
        Some(session) => evaluate_gate(&state, session, &path).await,
        // No cookie or an unknown session id: nothing to evaluate.
        None => GateOutcome::Unauthenticated,
    };

    match outcome {
        GateOutcome::Authorized { identity, profile } => {
            request
                .extensions_mut()
                .insert(CurrentUser { identity, profile });
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
        GateOutcome::Unauthenticated | GateOutcome::ProfileMissing => {
            Redirect::to(LOGIN_PATH).into_response()
        }
        GateOutcome::RoleMismatch { target } => Redirect::to(&target.home_path()).into_response(),
    }
}

/// signed_in_identity
///
/// Resolves the identity behind a request **outside** the protected router (the
/// login screen uses this to bounce already-signed-in visitors). Any failure along
/// the chain simply reads as "not signed in".
pub async fn signed_in_identity(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    let session = session_id_from_headers(headers).and_then(|id| state.sessions.open(id))?;
    let token = session.get(TOKEN_KEY)?;
    state.identity.current_identity(&token).await.ok().flatten()
}
