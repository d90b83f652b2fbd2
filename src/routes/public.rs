use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client
/// (anonymous or signed-in). This is the portal's entire public surface: the
/// health probe and the sign-in/sign-out flows. Every page route lives behind
/// the access gate instead.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load balancer checks.
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
        // GET /login
        // The login entry point and the target of every gate redirect for requests
        // without a resolvable identity. Already-signed-in visitors are bounced to "/".
        // POST /login
        // Exchanges credentials for a browsing session via the external Auth provider,
        // sets the session cookie, and redirects to "/".
        .route("/login", get(handlers::login_page).post(handlers::login))
        // GET /logout
        // Ends the browsing session: revokes the token, clears the session-tier
        // entries, expires the cookie, and redirects to "/".
        .route("/logout", get(handlers::logout))
}
