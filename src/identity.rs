use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ProviderError,
    models::{Identity, Role},
};

/// Claims
///
/// Represents the payload structure inside a Supabase-issued access token (JWT).
/// These claims are signed with the project's JWT secret and validated locally on
/// every gate evaluation; no network round-trip is needed to answer "who is this".
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): The UUID of the user. This is the key used to resolve
    /// the user's profile row from the public.profiles table.
    pub sub: Uuid,
    /// Email claim carried by GoTrue for password-based accounts.
    pub email: Option<String>,
    /// Expiration Time (exp): Timestamp after which the token must not be accepted.
    /// This is crucial for preventing replay attacks and maintaining session freshness.
    pub exp: usize,
    /// Issued At (iat): Timestamp when the token was issued.
    pub iat: usize,
    /// Audience (aud): GoTrue stamps signed-in users with "authenticated".
    pub aud: String,
    /// Postgres role the token maps to; informational here.
    #[serde(default)]
    pub role: String,
}

/// AuthTokens
///
/// The token bundle GoTrue returns from the password grant. Only `access_token` is
/// retained by the sign-in flow; refresh is client-library infrastructure this
/// service does not reimplement.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

/// NewUser
///
/// Input to the admin account-provisioning operation. The metadata fields are passed
/// to GoTrue as `user_metadata`; the backend's trigger materializes the profile row
/// from them, so this service never writes `public.profiles` directly on creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub user_role: Role,
}

/// IdentityProvider
///
/// The external authentication surface the portal consumes: resolve the identity
/// behind an access token, exchange credentials for tokens, revoke tokens, and
/// (admin only) provision accounts. Implementations must be thread-safe as the
/// trait object is shared across all request handlers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the authenticated identity carried by `access_token`.
    /// `Ok(None)` means "not signed in" (expired, malformed, or revoked token);
    /// `Err` is reserved for backend trouble distinct from a plain rejection.
    async fn current_identity(&self, access_token: &str)
    -> Result<Option<Identity>, ProviderError>;

    /// Exchanges credentials for a token bundle. A provider denial surfaces as
    /// `ProviderError::Rejected` carrying the provider's own message.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthTokens, ProviderError>;

    /// Revokes the token's session on the provider side.
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    /// Provisions a confirmed account through the admin surface (service-role
    /// credential). Returns the created identity.
    async fn create_user(&self, new_user: &NewUser) -> Result<Identity, ProviderError>;
}

/// Type alias for the shared provider handle held in `AppState`.
pub type IdentityState = Arc<dyn IdentityProvider>;

// --- Production Implementation (Supabase GoTrue) ---

/// SupabaseIdentity
///
/// Production `IdentityProvider` backed by Supabase GoTrue. Token validation happens
/// locally (HS256 against the project JWT secret, expiry enforced, audience pinned to
/// "authenticated"); sign-in, sign-out, and account provisioning are HTTP calls to
/// the auth API.
pub struct SupabaseIdentity {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_key: String,
    decoding_key: DecodingKey,
}

impl SupabaseIdentity {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        }
    }
}

/// Error body shapes GoTrue has used across versions; whichever field is present
/// carries the human-readable reason.
#[derive(Deserialize, Default)]
struct GoTrueErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

impl GoTrueErrorBody {
    fn message(self, fallback: &str) -> String {
        self.error_description
            .or(self.msg)
            .or(self.error)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Minimal struct to deserialize the GoTrue admin create-user response,
/// specifically capturing the newly created user's UUID.
#[derive(Deserialize)]
struct AdminUserResponse {
    id: Uuid,
    email: Option<String>,
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn current_identity(
        &self,
        access_token: &str,
    ) -> Result<Option<Identity>, ProviderError> {
        let mut validation = Validation::default();
        // Ensure expiration time validation is always active.
        validation.validate_exp = true;
        // GoTrue stamps signed-in users with this audience.
        validation.set_audience(&["authenticated"]);

        let token_data = match decode::<Claims>(access_token, &self.decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                // Detailed error inspection: an expired signature is routine churn,
                // anything else is worth a closer look in the logs.
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        tracing::debug!("access token expired");
                    }
                    kind => {
                        tracing::debug!(?kind, "access token rejected");
                    }
                }
                return Ok(None);
            }
        };

        Ok(Some(Identity {
            user_id: token_data.claims.sub,
            email: token_data.claims.email,
        }))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthTokens, ProviderError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            // GoTrue rejections (wrong password, unconfirmed email) come with a
            // message the sign-in form shows verbatim.
            let body = response.json::<GoTrueErrorBody>().await.unwrap_or_default();
            return Err(ProviderError::Rejected(
                body.message("Invalid login credentials"),
            ));
        }

        response
            .json::<AuthTokens>()
            .await
            .map_err(|e| ProviderError::Payload(e.to_string()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let url = format!("{}/auth/v1/logout", self.base_url);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "sign-out rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<Identity, ProviderError> {
        let url = format!("{}/auth/v1/admin/users", self.base_url);

        // email_confirm skips the confirmation mail; accounts provisioned by an
        // admin are usable immediately. The backend's trigger turns user_metadata
        // into the profiles row.
        let response = self
            .http
            .post(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({
                "email": new_user.email,
                "password": new_user.password,
                "email_confirm": true,
                "user_metadata": {
                    "first_name": new_user.first_name,
                    "last_name": new_user.last_name,
                    "user_role": new_user.user_role,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.json::<GoTrueErrorBody>().await.unwrap_or_default();
            return Err(ProviderError::Rejected(
                body.message("Account creation rejected"),
            ));
        }

        let created = response
            .json::<AdminUserResponse>()
            .await
            .map_err(|e| ProviderError::Payload(e.to_string()))?;

        Ok(Identity {
            user_id: created.id,
            email: created.email,
        })
    }
}

// --- Mock Implementation (Testing) ---

/// MockIdentityProvider
///
/// Network-free provider for tests: one configured identity reachable through one
/// valid token and one credential pair. `new_failing` simulates a backend outage
/// for every operation.
pub struct MockIdentityProvider {
    /// Identity resolved for `valid_token`; `None` behaves as a signed-out provider.
    pub identity: Option<Identity>,
    /// The only access token `current_identity` accepts.
    pub valid_token: String,
    /// Credentials `sign_in_with_password` accepts.
    pub email: String,
    pub password: String,
    /// When set, every operation reports a backend failure.
    pub should_fail: bool,
}

impl MockIdentityProvider {
    /// A provider with nobody signed in.
    pub fn new() -> Self {
        Self {
            identity: None,
            valid_token: "test-access-token".to_string(),
            email: String::new(),
            password: String::new(),
            should_fail: false,
        }
    }

    /// A provider that knows one signed-in user, reachable with the default
    /// test token and the `password123` credential.
    pub fn signed_in(identity: Identity) -> Self {
        let email = identity
            .email
            .clone()
            .unwrap_or_else(|| "user@example.com".to_string());
        Self {
            identity: Some(identity),
            valid_token: "test-access-token".to_string(),
            email,
            password: "password123".to_string(),
            should_fail: false,
        }
    }

    /// A provider where every operation fails at the transport/backend level.
    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn current_identity(
        &self,
        access_token: &str,
    ) -> Result<Option<Identity>, ProviderError> {
        if self.should_fail {
            return Err(ProviderError::Payload(
                "mock identity backend unavailable".to_string(),
            ));
        }
        Ok(self
            .identity
            .clone()
            .filter(|_| access_token == self.valid_token))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthTokens, ProviderError> {
        if self.should_fail {
            return Err(ProviderError::Payload(
                "mock identity backend unavailable".to_string(),
            ));
        }
        if self.identity.is_some() && email == self.email && password == self.password {
            Ok(AuthTokens {
                access_token: self.valid_token.clone(),
                token_type: "bearer".to_string(),
                expires_in: 3600,
                refresh_token: None,
            })
        } else {
            Err(ProviderError::Rejected(
                "Invalid login credentials".to_string(),
            ))
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), ProviderError> {
        if self.should_fail {
            return Err(ProviderError::Payload(
                "mock identity backend unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<Identity, ProviderError> {
        if self.should_fail {
            return Err(ProviderError::Payload(
                "mock identity backend unavailable".to_string(),
            ));
        }
        Ok(Identity {
            user_id: Uuid::new_v4(),
            email: Some(new_user.email.clone()),
        })
    }
}
