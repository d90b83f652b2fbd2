//! Router Module Index
//!
//! Organizes the application's routing logic into access-segregated modules.
//! The split mirrors the portal's URL space: one public module for the
//! sign-in/sign-out surface, and one module per role section, all of which
//! live behind the access gate layer applied in `create_router`.
//!
//! Access control is applied once, at the router level, never per handler:
//! the gate both authenticates the request and pins each section to its role.

/// Routes accessible to any visitor: health probe, login, logout.
pub mod public;

/// The `/admin` section: dashboard, settings, teacher management.
pub mod admin;

/// The `/teacher` section: dashboard, accounts, courses, settings, songs, store.
pub mod teacher;

/// The `/student` section: dashboard, account, passes, settings, songs, store.
pub mod student;
