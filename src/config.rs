use std::env;
use std::time::Duration;

/// AppConfig
///
/// Holds the application's entire configuration state. This struct is designed to be
/// immutable once loaded, ensuring consistency across all threads and services (e.g., Identity,
/// Profile Store, Cache). It is pulled into the application state via FromRef, embodying the
/// "immutable AppConfig" part of the Unified State Pattern.
#[derive(Clone)]
pub struct AppConfig {
    // Base URL of the Supabase project (GoTrue auth + PostgREST row access).
    pub supabase_url: String,
    // Publishable API key sent as the `apikey` header on every backend call.
    pub supabase_anon_key: String,
    // Privileged key for the GoTrue admin surface (account provisioning only).
    pub supabase_service_key: String,
    // Secret key used to decode and validate incoming access tokens (Supabase-managed).
    pub jwt_secret: String,
    // Freshness bound for the process-tier profile cache, in seconds.
    pub profile_cache_ttl_secs: u64,
    // Runtime environment marker. Controls log format and local fallbacks.
    pub env: Env,
}

/// Env
///
/// Defines the runtime context, used to switch between development conveniences
/// (local Supabase stack defaults, pretty logs) and secure, production-grade
/// infrastructure (hosted Supabase, JSON logs, Hardened Auth).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Provides a safe, non-panicking AppConfig instance primarily used for test setup.
    /// This allows us to instantiate the configuration without needing to set environment
    /// variables for lightweight unit or integration testing state scaffolding.
    fn default() -> Self {
        // Provide safe, non-panicking dummy values for test state setup
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "local-anon-key".to_string(),
            supabase_service_key: "local-service-role-key".to_string(),
            env: Env::Local,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            profile_cache_ttl_secs: 300,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// The canonical function for initializing the application configuration at startup.
    /// It reads all parameters from environment variables and implements the **fail-fast** principle.
    ///
    /// # Panics
    /// Panics if a critical environment variable required for the current runtime environment
    /// (especially Production) is not found. This prevents the application from starting
    /// with an incomplete or insecure configuration.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        // JWT Secret Resolution
        // The production secret is mandatory and must be explicitly set.
        let jwt_secret = match env {
            Env::Production => env::var("SUPABASE_JWT_SECRET")
                .expect("FATAL: SUPABASE_JWT_SECRET must be set in production."),
            // In local, we provide a fallback, though the developer should ideally use the actual secret.
            _ => env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| "super-secure-test-secret-value-local".to_string()),
        };

        // Profile Cache TTL Resolution
        // Optional in every environment; the 5-minute freshness bound of the portal's
        // profile cache is the default when unset or unparsable.
        let profile_cache_ttl_secs = env::var("PROFILE_CACHE_TTL_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(300);

        match env {
            Env::Local => Self {
                env: Env::Local,
                // Local development runs against the Supabase CLI stack on its stock port.
                supabase_url: env::var("SUPABASE_URL")
                    .unwrap_or_else(|_| "http://localhost:54321".to_string()),
                supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                    .unwrap_or_else(|_| "local-anon-key".to_string()),
                supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                    .unwrap_or_else(|_| "local-service-role-key".to_string()),
                jwt_secret,
                profile_cache_ttl_secs,
            },
            Env::Production => {
                // Production environment demands explicit setting of all infrastructure secrets.
                Self {
                    env: Env::Production,
                    supabase_url: env::var("SUPABASE_URL")
                        .expect("FATAL: SUPABASE_URL required in prod"),
                    supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                        .expect("FATAL: SUPABASE_ANON_KEY required in prod"),
                    supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                        .expect("FATAL: SUPABASE_SERVICE_ROLE_KEY required in prod"),
                    jwt_secret,
                    profile_cache_ttl_secs,
                }
            }
        }
    }

    /// profile_cache_ttl
    ///
    /// The process-tier cache freshness bound as a `Duration`, ready to hand to the
    /// cache service at startup.
    pub fn profile_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_cache_ttl_secs)
    }
}
