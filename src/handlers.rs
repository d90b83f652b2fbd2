use crate::{
    AppState,
    cache::{CacheTier, clear_cached_profile},
    error::ProviderError,
    gate::{CurrentUser, signed_in_identity},
    identity::NewUser,
    models::{
        CreateTeacherRequest, ErrorResponse, Identity, LoginRequest, Profile, Role, SectionPage,
        StudentSettings, THEMES, UpdateAccountRequest, UpdateStudentSettingsRequest,
    },
    session::{PROFILE_KEY, Session, TOKEN_KEY, expired_session_cookie, session_cookie,
        session_id_from_headers},
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
};

// --- Reply Helpers ---

/// Uniform error reply: status plus a message body the form layer can show.
fn reply_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Maps a backend failure to a reply. Provider rejections carry a message safe to
/// surface; infrastructure failures are logged and replaced with a generic line.
fn map_provider_error(operation: &str, e: ProviderError) -> (StatusCode, Json<ErrorResponse>) {
    let status = e.status_code();
    match e {
        ProviderError::Rejected(message) => reply_error(status, message),
        other => {
            tracing::error!(error = %other, operation, "backend call failed");
            reply_error(status, format!("{operation} is temporarily unavailable"))
        }
    }
}

/// The access token the gate stored for this session. Absent only if the route was
/// wired outside the protected router.
fn session_token(session: &Session) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    session
        .get(TOKEN_KEY)
        .ok_or_else(|| reply_error(StatusCode::UNAUTHORIZED, "Not signed in"))
}

// --- Auth Handlers ---

/// login_page
///
/// [Public Route] The login entry point. A visitor who is already signed in has no
/// business here and is bounced to `/`, where the access gate forwards them to
/// their own section; everyone else gets a plain 200 (the form itself is rendered
/// client-side).
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Login page"),
        (status = 303, description = "Already signed in, redirected to /")
    )
)]
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if signed_in_identity(&state, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }
    StatusCode::OK.into_response()
}

/// login
///
/// [Public Route] Exchanges credentials for a browsing session. On success a fresh
/// server-side session is created holding the access token, the profile row is
/// prefetched into the session-tier cache (best effort; the gate re-fetches if this
/// fails), and the client is redirected to `/` carrying the session cookie.
///
/// *Note*: The provider's rejection message is surfaced verbatim on 401, exactly
/// what the sign-in form displays.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 303, description = "Signed in, redirected to /"),
        (status = 401, description = "Credentials rejected", body = ErrorResponse),
        (status = 502, description = "Auth backend unavailable", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let tokens = match state
        .identity
        .sign_in_with_password(&payload.email, &payload.password)
        .await
    {
        Ok(tokens) => tokens,
        Err(ProviderError::Rejected(message)) => {
            return Err(reply_error(StatusCode::UNAUTHORIZED, message));
        }
        Err(e) => {
            tracing::error!(error = %e, "sign-in backend call failed");
            return Err(reply_error(
                StatusCode::BAD_GATEWAY,
                "Sign-in is temporarily unavailable",
            ));
        }
    };

    let session = state.sessions.create();
    session.set(TOKEN_KEY, tokens.access_token.clone());

    // Prime the session-tier cache so the first gate evaluation after sign-in is
    // answered without a second backend round-trip.
    if let Ok(Some(identity)) = state.identity.current_identity(&tokens.access_token).await {
        match state
            .profiles
            .fetch_profile_by_user_id(&tokens.access_token, identity.user_id)
            .await
        {
            Ok(Some(profile)) => match serde_json::to_string(&profile) {
                Ok(serialized) => session.set(PROFILE_KEY, serialized),
                Err(e) => tracing::error!(error = %e, "profile failed to serialize at sign-in"),
            },
            Ok(None) => {
                tracing::warn!(user_id = %identity.user_id, "signed-in user has no profile row");
            }
            Err(e) => {
                tracing::warn!(error = %e, "profile prefetch at sign-in failed");
            }
        }
    }

    Ok((
        [(header::SET_COOKIE, session_cookie(session.id()))],
        Redirect::to("/"),
    ))
}

/// logout
///
/// [Public Route] Ends the browsing session: revokes the token with the provider
/// (failures are logged, never surfaced), removes the session-tier entries, destroys
/// the server-side session, and expires the cookie. Always lands on `/`, which the
/// gate turns into the login screen for the now signed-out visitor.
#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 303, description = "Signed out, redirected to /"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(session) = session_id_from_headers(&headers).and_then(|id| state.sessions.open(id))
    {
        if let Some(token) = session.get(TOKEN_KEY) {
            if let Err(e) = state.identity.sign_out(&token).await {
                tracing::warn!(error = %e, "provider sign-out failed");
            }
        }
        session.remove(PROFILE_KEY);
        session.remove(TOKEN_KEY);
        state.sessions.destroy(session.id());
    }

    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Redirect::to("/"),
    )
}

// --- Section Pages ---

/// section_page
///
/// [Protected Route] The generic page handler behind every plain section route
/// (`/admin`, `/teacher/songs`, `/student/store`, ...). It returns the pass-through
/// payload the gate resolved, **unmutated**, plus the section name derived from the
/// request path. Pages with real data behavior (teachers, account, settings) have
/// dedicated handlers below.
#[utoipa::path(
    get,
    path = "/{section}",
    responses((status = 200, description = "Section page payload", body = SectionPage))
)]
pub async fn section_page(
    CurrentUser { identity, profile }: CurrentUser,
    uri: Uri,
) -> Json<SectionPage> {
    let section = uri
        .path()
        .trim_start_matches('/')
        .trim_end_matches('/')
        .to_string();
    Json(SectionPage {
        section,
        identity,
        profile,
    })
}

// --- Admin: Teacher Management ---

/// list_teachers
///
/// [Admin Route] The roster behind the teacher-management screen: every profile
/// whose role is `teacher`.
///
/// *Authorization*: The gate already pins `/admin` paths to admin profiles; the
/// explicit role check here keeps the handler safe under any future rewiring.
#[utoipa::path(
    get,
    path = "/admin/teachers",
    responses(
        (status = 200, description = "Teacher profiles", body = [Profile]),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    )
)]
pub async fn list_teachers(
    CurrentUser { profile, .. }: CurrentUser,
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<Vec<Profile>>, (StatusCode, Json<ErrorResponse>)> {
    if profile.user_role != Role::Admin {
        return Err(reply_error(StatusCode::FORBIDDEN, "Forbidden"));
    }
    let token = session_token(&session)?;

    state
        .profiles
        .list_profiles_by_role(&token, Role::Teacher)
        .await
        .map(Json)
        .map_err(|e| map_provider_error("Teacher listing", e))
}

/// create_teacher
///
/// [Admin Route] Provisions a teacher account through the Identity Provider's admin
/// surface. The payload passes through the same normalization the portal form
/// applied (trimmed lowercase email, minimum-length password, capitalized names);
/// the backend materializes the profile row from the submitted metadata, so no
/// direct profile write happens here.
#[utoipa::path(
    post,
    path = "/admin/teachers",
    request_body = CreateTeacherRequest,
    responses(
        (status = 201, description = "Teacher account created", body = Identity),
        (status = 422, description = "Validation failed", body = ErrorResponse),
        (status = 400, description = "Provider rejected the account", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    )
)]
pub async fn create_teacher(
    CurrentUser { profile, .. }: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTeacherRequest>,
) -> Result<(StatusCode, Json<Identity>), (StatusCode, Json<ErrorResponse>)> {
    if profile.user_role != Role::Admin {
        return Err(reply_error(StatusCode::FORBIDDEN, "Forbidden"));
    }

    let valid = payload
        .validate()
        .map_err(|message| reply_error(StatusCode::UNPROCESSABLE_ENTITY, message))?;

    let new_user = NewUser {
        email: valid.email,
        password: valid.password,
        first_name: valid.first_name,
        last_name: valid.last_name,
        user_role: Role::Teacher,
    };

    let created = state
        .identity
        .create_user(&new_user)
        .await
        .map_err(|e| map_provider_error("Account creation", e))?;

    tracing::info!(user_id = %created.user_id, "teacher account provisioned");
    Ok((StatusCode::CREATED, Json(created)))
}

// --- Teacher: Account Oversight ---

/// list_students
///
/// [Teacher Route] The roster behind the accounts screen: every student profile,
/// for balance and account management.
#[utoipa::path(
    get,
    path = "/teacher/accounts",
    responses((status = 200, description = "Student profiles", body = [Profile]))
)]
pub async fn list_students(
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<Vec<Profile>>, (StatusCode, Json<ErrorResponse>)> {
    let token = session_token(&session)?;

    state
        .profiles
        .list_profiles_by_role(&token, Role::Student)
        .await
        .map(Json)
        .map_err(|e| map_provider_error("Student listing", e))
}

// --- Student: Account Screen ---

/// student_account
///
/// [Student Route] The caller's own profile row, exactly as the gate resolved it.
#[utoipa::path(
    get,
    path = "/student/account",
    responses((status = 200, description = "Own profile", body = Profile))
)]
pub async fn student_account(CurrentUser { profile, .. }: CurrentUser) -> Json<Profile> {
    Json(profile)
}

/// update_student_account
///
/// [Student Route] The one profile-mutating flow in the portal. Applies the provided
/// name fields to the caller's row, then invokes the cache invalidation hook for
/// **both** tiers so the next gate evaluation re-fetches the updated row instead of
/// serving either cache.
#[utoipa::path(
    post,
    path = "/student/account",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 422, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "No profile row", body = ErrorResponse)
    )
)]
pub async fn update_student_account(
    CurrentUser { identity, .. }: CurrentUser,
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<Profile>, (StatusCode, Json<ErrorResponse>)> {
    let update = UpdateAccountRequest {
        first_name: payload.first_name.map(|v| v.trim().to_string()),
        last_name: payload.last_name.map(|v| v.trim().to_string()),
    };

    if update.first_name.as_deref() == Some("") {
        return Err(reply_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "First name cannot be empty",
        ));
    }
    if update.last_name.as_deref() == Some("") {
        return Err(reply_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Last name cannot be empty",
        ));
    }
    if update.first_name.is_none() && update.last_name.is_none() {
        return Err(reply_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Nothing to update",
        ));
    }

    let token = session_token(&session)?;

    let updated = state
        .profiles
        .update_profile_names(&token, identity.user_id, &update)
        .await
        .map_err(|e| map_provider_error("Account update", e))?
        .ok_or_else(|| reply_error(StatusCode::NOT_FOUND, "Profile not found"))?;

    // The row changed; both cache tiers are now stale by definition.
    clear_cached_profile(CacheTier::Both, &state.cache, &session);

    Ok(Json(updated))
}

// --- Student: Settings Screen ---

/// student_settings
///
/// [Student Route] The caller's settings row. A student who has never saved settings
/// gets the defaults rather than a 404, matching what the settings form renders
/// on first visit.
#[utoipa::path(
    get,
    path = "/student/settings",
    responses((status = 200, description = "Student settings", body = StudentSettings))
)]
pub async fn student_settings(
    CurrentUser { identity, .. }: CurrentUser,
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<StudentSettings>, (StatusCode, Json<ErrorResponse>)> {
    let token = session_token(&session)?;

    let settings = state
        .profiles
        .fetch_student_settings(&token, identity.user_id)
        .await
        .map_err(|e| map_provider_error("Settings lookup", e))?
        .unwrap_or_else(|| StudentSettings::for_user(identity.user_id));

    Ok(Json(settings))
}

/// update_student_settings
///
/// [Student Route] Partial settings update: merges the provided fields over the
/// stored row (or the defaults) and upserts the result. The theme name is
/// re-checked server-side against the known set; the form constrains it
/// client-side only.
#[utoipa::path(
    post,
    path = "/student/settings",
    request_body = UpdateStudentSettingsRequest,
    responses(
        (status = 200, description = "Stored settings", body = StudentSettings),
        (status = 422, description = "Unknown theme", body = ErrorResponse)
    )
)]
pub async fn update_student_settings(
    CurrentUser { identity, .. }: CurrentUser,
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<UpdateStudentSettingsRequest>,
) -> Result<Json<StudentSettings>, (StatusCode, Json<ErrorResponse>)> {
    if let Some(theme) = &payload.theme {
        if !THEMES.contains(&theme.as_str()) {
            return Err(reply_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Unknown theme: {theme}"),
            ));
        }
    }

    let token = session_token(&session)?;

    let mut settings = state
        .profiles
        .fetch_student_settings(&token, identity.user_id)
        .await
        .map_err(|e| map_provider_error("Settings lookup", e))?
        .unwrap_or_else(|| StudentSettings::for_user(identity.user_id));

    if let Some(theme) = payload.theme {
        settings.theme = theme;
    }
    if let Some(anonymous) = payload.anonymous_song_requests {
        settings.anonymous_song_requests = anonymous;
    }

    let stored = state
        .profiles
        .upsert_student_settings(&token, &settings)
        .await
        .map_err(|e| map_provider_error("Settings update", e))?;

    Ok(Json(stored))
}
