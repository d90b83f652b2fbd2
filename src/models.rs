use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Backend Rows) ---

/// Role
///
/// The portal's access-control domain: every signed-in user is exactly one of these,
/// and each role owns one section of the URL space (`/admin`, `/teacher`, `/student`).
/// This enum is the **single authoritative mapping** between role names and path
/// prefixes; nothing else in the codebase derives one from the other ad hoc.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Teacher,
    #[default]
    Student,
}

impl Role {
    /// Every role, in the order the sections appear in the navigation.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Teacher, Role::Student];

    /// The lowercase name stored in `profiles.user_role` and used as the URL segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// parse
    ///
    /// Inverse of `as_str`. Unknown names resolve to `None` rather than an error;
    /// callers treat them exactly like a path with no role prefix.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    /// home_path
    ///
    /// The landing path for a role's section. This is the redirect target whenever a
    /// request is misrouted (wrong section or no section at all).
    pub fn home_path(&self) -> String {
        format!("/{}", self.as_str())
    }

    /// from_path
    ///
    /// Resolves the role prefix of a request path: the **first path segment**, if and
    /// only if it names a known role. Segment matching is deliberate; `/administrator`
    /// has no role prefix even though it starts with the letters of one.
    pub fn from_path(path: &str) -> Option<Role> {
        let first_segment = path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();
        Role::parse(first_segment)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity
///
/// The authenticated subject as reported by the Identity Provider: an opaque external
/// `user_id` plus the email claim carried in the access token. Owned and issued entirely
/// by the provider; this application only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Identity {
    // Subject id, mapped to auth.users.id and profiles.user_id.
    pub user_id: Uuid,
    // Email claim, when the token carries one.
    pub email: Option<String>,
}

/// Profile
///
/// The application-level record describing a user, one row per identity in the backend's
/// `public.profiles` table. Created externally at account-creation time; the access gate
/// never mutates it, only reads and caches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Profile {
    // FK to auth.users.id; the lookup key for every cache tier.
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    // The RBAC field: decides which section of the portal this user may access.
    pub user_role: Role,
    pub email: String,
}

// --- Student Settings ---

/// Theme names the settings screen offers. The backend stores the raw string, so the
/// server re-checks membership before writing.
pub const THEMES: [&str; 5] = ["chem-cash-light", "retro", "cyberpunk", "valentine", "aqua"];

/// The theme applied to accounts that have never saved settings.
pub const DEFAULT_THEME: &str = "chem-cash-light";

/// StudentSettings
///
/// One row per student in the backend's `student_settings` table. Absent rows are
/// reported to the client as this struct's defaults rather than a 404.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StudentSettings {
    pub user_id: Uuid,
    pub theme: String,
    pub anonymous_song_requests: bool,
}

impl Default for StudentSettings {
    fn default() -> Self {
        Self {
            user_id: Uuid::default(),
            theme: DEFAULT_THEME.to_string(),
            anonymous_song_requests: false,
        }
    }
}

impl StudentSettings {
    /// The defaults handed out when a student has never saved settings.
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }
}

/// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for the sign-in endpoint (POST /login).
/// Note: The password is only passed through to the external Auth provider (Supabase) and never
/// persisted or logged internally by this application.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CreateTeacherRequest
///
/// Input payload for the admin teacher-provisioning endpoint (POST /admin/teachers).
/// `validate` applies the same normalization the portal's form schema applied:
/// trimmed lowercase email, trimmed password with a minimum length, and trimmed
/// names with the first letter capitalized.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTeacherRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl CreateTeacherRequest {
    /// validate
    ///
    /// Normalizes the payload and checks every field, returning the normalized request
    /// or the first violation's message (surfaced to the form as-is).
    pub fn validate(self) -> Result<Self, String> {
        let email = self.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err("Invalid email address".to_string());
        }

        let password = self.password.trim().to_string();
        if password.chars().count() < 6 {
            return Err("Password must be at least 6 characters".to_string());
        }

        let first_name = capitalize(self.first_name.trim());
        if first_name.is_empty() {
            return Err("First name is required".to_string());
        }

        let last_name = capitalize(self.last_name.trim());
        if last_name.is_empty() {
            return Err("Last name is required".to_string());
        }

        Ok(Self {
            email,
            password,
            first_name,
            last_name,
        })
    }
}

/// UpdateAccountRequest
///
/// Partial update payload for the account screen (POST /student/account).
///
/// *Optimization*: Uses `Option<T>` for all fields and `#[serde(skip_serializing_if = "Option::is_none")]`
/// to efficiently handle partial updates, ensuring only provided fields are included in the JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAccountRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// UpdateStudentSettingsRequest
///
/// Partial update payload for the student settings screen (POST /student/settings).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateStudentSettingsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_song_requests: Option<bool>,
}

/// --- Page & Error Schemas (Output) ---

/// SectionPage
///
/// The pass-through payload every protected page renders from: the section it belongs
/// to plus the `{identity, profile}` pair the access gate resolved. Handlers receive
/// the pair already attached to the request and must hand it back **unmutated**.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SectionPage {
    pub section: String,
    pub identity: Identity,
    pub profile: Profile,
}

/// ErrorResponse
///
/// Uniform error body for endpoints that surface a human-readable message
/// (e.g. the sign-in form shows the provider's rejection text verbatim).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
}

// --- Normalization Helpers ---

/// Uppercases the first letter, leaving the rest untouched (matches the form schema's
/// display normalization for names).
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// A deliberately modest address check: one `@`, a non-empty local part, and a domain
/// with at least one interior dot. The Auth provider performs the authoritative check.
fn is_plausible_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
