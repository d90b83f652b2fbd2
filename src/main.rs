use chem_cash::{
    AppState,
    cache::ProfileCache,
    config::{AppConfig, Env},
    create_router,
    identity::{IdentityState, SupabaseIdentity},
    profiles::{ProfileStoreState, SupabaseProfileStore},
    session::SessionStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point for the application, responsible for initializing
/// all core components: Configuration, Logging, Identity, Profiles, and the HTTP Server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    // Loads .env file settings before configuration can be read.
    dotenv::dotenv().ok();
    // AppConfig::load() implements the fail-fast principle for missing Production secrets.
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // Sets the default log level. It prioritizes the RUST_LOG environment variable,
    // falling back to sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chem_cash=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment (Production Observability)
    // The structured logging format is dynamically selected based on the APP_ENV.
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability during local debugging.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON format output for ingestion by centralized log aggregators
            // (e.g., Datadog, AWS CloudWatch). This is essential for monitoring.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Identity Provider Initialization (Supabase GoTrue)
    // Tokens are validated locally with the project JWT secret; sign-in, sign-out
    // and user provisioning go over HTTP to the auth endpoint.
    let identity = Arc::new(SupabaseIdentity::new(&config)) as IdentityState;

    // 5. Profile Store Initialization (Supabase PostgREST)
    // Row access runs with the caller's access token so row level security applies.
    let profiles = Arc::new(SupabaseProfileStore::new(&config)) as ProfileStoreState;

    // 6. Cache and Session Stores
    // The process-tier profile cache holds one profile at a time, bounded by the
    // configured TTL. The session store backs the browser session cookie.
    let cache = Arc::new(ProfileCache::with_system_clock(config.profile_cache_ttl()));
    let sessions = Arc::new(SessionStore::new());

    tracing::info!(
        "Profile cache TTL set to {}s",
        config.profile_cache_ttl_secs
    );

    // 7. Unified State Assembly
    // Bundles all initialized dependencies into the shared AppState.
    let app_state = AppState {
        identity,
        profiles,
        cache,
        sessions,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    // Binds the TCP listener and initiates the HTTP server.
    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on 0.0.0.0:3000");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:3000/swagger-ui");

    // The long-running Axum server process.
    axum::serve(listener, app).await.unwrap();
}
