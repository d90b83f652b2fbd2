use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// The `/admin` section of the portal. Reaching any of these routes requires the
/// access gate to have resolved a profile whose role is `admin`; a teacher or
/// student requesting them is redirected to their own section before a handler
/// ever runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin
        // The admin dashboard landing page.
        .route("/admin", get(handlers::section_page))
        // GET /admin/settings
        // Admin-side settings screen (page payload only).
        .route("/admin/settings", get(handlers::section_page))
        // GET /admin/teachers
        // The teacher-management roster: all profiles with the 'teacher' role.
        // POST /admin/teachers
        // Provisions a teacher account through the Auth provider's admin surface.
        .route(
            "/admin/teachers",
            get(handlers::list_teachers).post(handlers::create_teacher),
        )
}
