use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Student Router Module
///
/// The `/student` section of the portal. The access gate pins every route here to
/// profiles with the `student` role. The account and settings screens carry real
/// read/write behavior; the rest are plain section payloads.
pub fn student_routes() -> Router<AppState> {
    Router::new()
        // GET /student
        // The student dashboard landing page.
        .route("/student", get(handlers::section_page))
        // GET /student/account
        // The caller's own profile row.
        // POST /student/account
        // Updates the caller's name fields and invalidates both cache tiers.
        .route(
            "/student/account",
            get(handlers::student_account).post(handlers::update_student_account),
        )
        // GET /student/passes
        // Hall pass screen (page payload only).
        .route("/student/passes", get(handlers::section_page))
        // GET /student/settings
        // The caller's settings row, defaults when never saved.
        // POST /student/settings
        // Partial settings update; the theme name is re-checked server-side.
        .route(
            "/student/settings",
            get(handlers::student_settings).post(handlers::update_student_settings),
        )
        // GET /student/songs
        // Song request screen (page payload only).
        .route("/student/songs", get(handlers::section_page))
        // GET /student/store
        // The point-of-sale store screen (page payload only).
        .route("/student/store", get(handlers::section_page))
}
