use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Teacher Router Module
///
/// The `/teacher` section of the portal. The access gate pins every route here to
/// profiles with the `teacher` role. Most pages are plain section payloads; the
/// accounts screen additionally serves the student roster it manages.
pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        // GET /teacher
        // The teacher dashboard landing page.
        .route("/teacher", get(handlers::section_page))
        // GET /teacher/accounts
        // Student account oversight: the roster of student profiles.
        .route("/teacher/accounts", get(handlers::list_students))
        // GET /teacher/courses
        // Course management screen (page payload only).
        .route("/teacher/courses", get(handlers::section_page))
        // GET /teacher/settings
        // Teacher-side settings screen (page payload only).
        .route("/teacher/settings", get(handlers::section_page))
        // GET /teacher/songs
        // The song request board (page payload only).
        .route("/teacher/songs", get(handlers::section_page))
        // GET /teacher/store
        // The point-of-sale store screen (page payload only).
        .route("/teacher/store", get(handlers::section_page))
}
