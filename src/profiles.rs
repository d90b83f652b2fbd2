use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ProviderError,
    models::{Profile, Role, StudentSettings, UpdateAccountRequest},
};

/// ProfileStore
///
/// The external row-access surface the portal consumes. The one operation the access
/// gate depends on is `fetch_profile_by_user_id`; the remaining operations back the
/// account, settings, and admin screens. Every call forwards the caller's access
/// token so the backend's row-level security decides what each user may read or
/// write; this service adds no second authorization layer over row data.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The profile row for `user_id`, or `None` when no row exists (e.g. an account
    /// whose profile was never provisioned).
    async fn fetch_profile_by_user_id(
        &self,
        access_token: &str,
        user_id: Uuid,
    ) -> Result<Option<Profile>, ProviderError>;

    /// All profiles carrying `role`, for the admin roster screens.
    async fn list_profiles_by_role(
        &self,
        access_token: &str,
        role: Role,
    ) -> Result<Vec<Profile>, ProviderError>;

    /// Applies the provided name fields to the caller's profile row.
    /// Returns the updated row, or `None` when the row does not exist.
    async fn update_profile_names(
        &self,
        access_token: &str,
        user_id: Uuid,
        update: &UpdateAccountRequest,
    ) -> Result<Option<Profile>, ProviderError>;

    /// The caller's `student_settings` row, or `None` when never saved.
    async fn fetch_student_settings(
        &self,
        access_token: &str,
        user_id: Uuid,
    ) -> Result<Option<StudentSettings>, ProviderError>;

    /// Inserts or replaces the caller's `student_settings` row and returns the
    /// stored state.
    async fn upsert_student_settings(
        &self,
        access_token: &str,
        settings: &StudentSettings,
    ) -> Result<StudentSettings, ProviderError>;
}

/// Type alias for the shared store handle held in `AppState`.
pub type ProfileStoreState = Arc<dyn ProfileStore>;

// --- Production Implementation (Supabase PostgREST) ---

/// SupabaseProfileStore
///
/// Production `ProfileStore` backed by Supabase's PostgREST API. Requests carry the
/// project's `apikey` plus the calling user's bearer token; PostgREST applies the
/// `profiles` / `student_settings` row-level security policies exactly as they apply
/// to the browser client.
pub struct SupabaseProfileStore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

/// PostgREST error body; `message` carries the human-readable reason.
#[derive(Deserialize, Default)]
struct PostgrestErrorBody {
    message: Option<String>,
}

impl SupabaseProfileStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn rest_url(&self, resource: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, resource)
    }

    /// Decodes a PostgREST response into rows, converting non-2xx statuses into
    /// `Rejected` with the backend's own message.
    async fn decode_rows<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Vec<T>, ProviderError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .json::<PostgrestErrorBody>()
                .await
                .unwrap_or_default();
            return Err(ProviderError::Rejected(
                body.message
                    .unwrap_or_else(|| format!("profile store rejected with status {status}")),
            ));
        }
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| ProviderError::Payload(e.to_string()))
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn fetch_profile_by_user_id(
        &self,
        access_token: &str,
        user_id: Uuid,
    ) -> Result<Option<Profile>, ProviderError> {
        let response = self
            .http
            .get(self.rest_url("profiles"))
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".into())])
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        // Zero rows is a legitimate answer (profile not yet provisioned), so the
        // lookup asks for the unadorned array representation rather than PostgREST's
        // exactly-one object mode.
        let rows: Vec<Profile> = Self::decode_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_profiles_by_role(
        &self,
        access_token: &str,
        role: Role,
    ) -> Result<Vec<Profile>, ProviderError> {
        let response = self
            .http
            .get(self.rest_url("profiles"))
            .query(&[
                ("user_role", format!("eq.{role}")),
                ("select", "*".into()),
                ("order", "last_name.asc".into()),
            ])
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::decode_rows(response).await
    }

    async fn update_profile_names(
        &self,
        access_token: &str,
        user_id: Uuid,
        update: &UpdateAccountRequest,
    ) -> Result<Option<Profile>, ProviderError> {
        let response = self
            .http
            .patch(self.rest_url("profiles"))
            .query(&[("user_id", format!("eq.{user_id}"))])
            .header("apikey", &self.anon_key)
            // return=representation makes PostgREST echo the updated rows back,
            // saving a second round-trip.
            .header("Prefer", "return=representation")
            .bearer_auth(access_token)
            .json(update)
            .send()
            .await?;

        let rows: Vec<Profile> = Self::decode_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_student_settings(
        &self,
        access_token: &str,
        user_id: Uuid,
    ) -> Result<Option<StudentSettings>, ProviderError> {
        let response = self
            .http
            .get(self.rest_url("student_settings"))
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".into())])
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let rows: Vec<StudentSettings> = Self::decode_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_student_settings(
        &self,
        access_token: &str,
        settings: &StudentSettings,
    ) -> Result<StudentSettings, ProviderError> {
        let response = self
            .http
            .post(self.rest_url("student_settings"))
            .header("apikey", &self.anon_key)
            // merge-duplicates turns the insert into an upsert on the user_id key.
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .bearer_auth(access_token)
            .json(settings)
            .send()
            .await?;

        let rows: Vec<StudentSettings> = Self::decode_rows(response).await?;
        rows.into_iter().next().ok_or_else(|| {
            ProviderError::Payload("upsert returned no representation".to_string())
        })
    }
}

// --- Mock Implementation (Testing) ---

/// MockProfileStore
///
/// Network-free store for tests, holding pre-canned rows behind mutexes so the
/// account and settings flows observe their own writes. `fetch_calls` counts
/// `fetch_profile_by_user_id` invocations; the cache-coherency tests assert on it.
#[derive(Default)]
pub struct MockProfileStore {
    /// Row returned by `fetch_profile_by_user_id` when the user id matches.
    pub profile: Mutex<Option<Profile>>,
    /// Rows returned by `list_profiles_by_role` (filtered by the requested role).
    pub roster: Vec<Profile>,
    /// Row returned by `fetch_student_settings`; written by the upsert.
    pub settings: Mutex<Option<StudentSettings>>,
    /// When set, every operation reports a backend failure.
    pub should_fail: bool,
    /// Number of profile fetches observed, including failing ones.
    pub fetch_calls: AtomicUsize,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding exactly one profile row.
    pub fn with_profile(profile: Profile) -> Self {
        Self {
            profile: Mutex::new(Some(profile)),
            ..Self::default()
        }
    }

    /// A store where every operation fails at the transport/backend level.
    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Profile fetches observed so far.
    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn failure() -> ProviderError {
        ProviderError::Payload("mock profile backend unavailable".to_string())
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn fetch_profile_by_user_id(
        &self,
        _access_token: &str,
        user_id: Uuid,
    ) -> Result<Option<Profile>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(Self::failure());
        }
        let profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(profile.clone().filter(|p| p.user_id == user_id))
    }

    async fn list_profiles_by_role(
        &self,
        _access_token: &str,
        role: Role,
    ) -> Result<Vec<Profile>, ProviderError> {
        if self.should_fail {
            return Err(Self::failure());
        }
        Ok(self
            .roster
            .iter()
            .filter(|p| p.user_role == role)
            .cloned()
            .collect())
    }

    async fn update_profile_names(
        &self,
        _access_token: &str,
        user_id: Uuid,
        update: &UpdateAccountRequest,
    ) -> Result<Option<Profile>, ProviderError> {
        if self.should_fail {
            return Err(Self::failure());
        }
        let mut profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(row) = profile.as_mut().filter(|p| p.user_id == user_id) else {
            return Ok(None);
        };
        if let Some(first_name) = &update.first_name {
            row.first_name = first_name.clone();
        }
        if let Some(last_name) = &update.last_name {
            row.last_name = last_name.clone();
        }
        Ok(Some(row.clone()))
    }

    async fn fetch_student_settings(
        &self,
        _access_token: &str,
        user_id: Uuid,
    ) -> Result<Option<StudentSettings>, ProviderError> {
        if self.should_fail {
            return Err(Self::failure());
        }
        let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(settings.clone().filter(|s| s.user_id == user_id))
    }

    async fn upsert_student_settings(
        &self,
        _access_token: &str,
        settings: &StudentSettings,
    ) -> Result<StudentSettings, ProviderError> {
        if self.should_fail {
            return Err(Self::failure());
        }
        let mut stored = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = Some(settings.clone());
        Ok(settings.clone())
    }
}
