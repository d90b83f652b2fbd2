use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod profiles;
pub mod session;

// Module for routing segregation (Public plus the three role sections).
pub mod routes;
use routes::{admin, public, student, teacher};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs).
pub use cache::{ProfileCache, ProfileCacheState};
pub use config::AppConfig;
pub use identity::{IdentityState, MockIdentityProvider, SupabaseIdentity};
pub use profiles::{MockProfileStore, ProfileStoreState, SupabaseProfileStore};
pub use session::{SessionStore, SessionStoreState};

/// ApiDoc
///
/// This struct auto-generates the OpenAPI documentation (Swagger JSON) for the application.
/// It aggregates all API paths and data schemas that have been decorated with
/// the `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]` macros.
/// The resulting JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    // List all public handler functions here for documentation generation.
    paths(
        handlers::login_page, handlers::login, handlers::logout,
        handlers::section_page, handlers::list_teachers, handlers::create_teacher,
        handlers::list_students, handlers::student_account, handlers::update_student_account,
        handlers::student_settings, handlers::update_student_settings
    ),
    // List all models (schemas) used in the request/response bodies.
    components(
        schemas(
            models::Role, models::Identity, models::Profile, models::SectionPage,
            models::LoginRequest, models::CreateTeacherRequest, models::UpdateAccountRequest,
            models::StudentSettings, models::UpdateStudentSettingsRequest, models::ErrorResponse,
        )
    ),
    tags(
        (name = "chem-cash", description = "Chem Cash Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Implements the **Unified State Pattern**. This is the single, thread-safe, and immutable
/// container holding all essential application services and configuration.
/// The application state is shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Identity Provider: authenticates tokens and drives sign-in/out/provisioning.
    pub identity: IdentityState,
    /// Profile Store: row access for profiles and student settings.
    pub profiles: ProfileStoreState,
    /// Process-tier profile cache, TTL-bounded, shared by every gate evaluation.
    pub cache: ProfileCacheState,
    /// Server-side browsing-session store addressed by the session cookie.
    pub sessions: SessionStoreState,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These implementations allow handlers to selectively pull components from the shared AppState.
// This is critical for dependency injection and keeping service boundaries clean.

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for ProfileStoreState {
    fn from_ref(app_state: &AppState) -> ProfileStoreState {
        app_state.profiles.clone()
    }
}

impl FromRef<AppState> for ProfileCacheState {
    fn from_ref(app_state: &AppState) -> ProfileCacheState {
        app_state.cache.clone()
    }
}

impl FromRef<AppState> for SessionStoreState {
    fn from_ref(app_state: &AppState) -> SessionStoreState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and scoped middleware,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected Section Assembly
    // The root path plus the three role sections, all behind the access gate.
    // The gate runs once per request here: it authenticates, resolves the profile
    // through the cache tiers, and redirects misrouted requests before any handler.
    let protected = Router::new()
        .route("/", axum::routing::get(handlers::section_page))
        .merge(admin::admin_routes())
        .merge(teacher::teacher_routes())
        .merge(student::student_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::access_gate,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))

        // Public Routes: No middleware applied.
        .merge(public::public_routes())

        // Protected Routes: every page of the portal.
        .merge(protected)

        // Apply the Unified State to all routes.
        .with_state(state);

    // 4. Observability and Correlation Layers (Applied outermost/first)
    // This section implements the Production Observability Stack.
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: Generates a unique UUID for every incoming request.
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                // 4b. Request Tracing: Wraps the entire request/response lifecycle in a tracing span.
                // Uses the `trace_span_logger` to include the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: Ensures the generated x-request-id header is
                // returned to the client and injected into subsequent service calls.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer (Applied last, allowing all traffic in/out after processing)
        .layer(cors)
}

/// trace_span_logger
///
/// Helper function used by `TraceLayer` to customize the tracing span creation.
/// It extracts the `x-request-id` header (if present) and includes it in the
/// structured logging metadata alongside the HTTP method and URI.
///
/// *Goal*: Ensure every log line for a single request is correlated by a unique ID.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    // The structured log format used by the tracing macros.
    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
