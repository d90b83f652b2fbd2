use axum::http::{HeaderMap, header};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Name of the cookie carrying the opaque session id. No `Max-Age` is ever set on it,
/// so its lifetime is the browsing session.
pub const SESSION_COOKIE: &str = "cc_session";

/// Session-store key holding the serialized `Profile` (the session-tier cache slot).
pub const PROFILE_KEY: &str = "userProfile";

/// Session-store key holding the access token issued at sign-in.
pub const TOKEN_KEY: &str = "accessToken";

/// SessionStore
///
/// Server-side rendition of the browser's session storage: one string map per
/// browsing session, addressed by the opaque id in the session cookie. Sessions are
/// created at sign-in, destroyed at sign-out, and lost on process restart (a stale
/// cookie then simply fails to open and the gate treats the request as signed out).
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, HashMap<String, String>>>,
}

/// Type alias for the shared store handle held in `AppState`.
pub type SessionStoreState = Arc<SessionStore>;

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// create
    ///
    /// Registers a fresh, empty session and returns a handle bound to it.
    pub fn create(self: &Arc<Self>) -> Session {
        let id = Uuid::new_v4();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, HashMap::new());
        Session {
            store: Arc::clone(self),
            id,
        }
    }

    /// open
    ///
    /// Binds a handle to an existing session. Unknown ids (expired cookie, server
    /// restart) resolve to `None`; callers treat that exactly like no cookie at all.
    pub fn open(self: &Arc<Self>, id: Uuid) -> Option<Session> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.contains_key(&id).then(|| Session {
            store: Arc::clone(self),
            id,
        })
    }

    /// destroy
    ///
    /// Drops the session and everything stored under it. Sign-out calls this after
    /// clearing the individual keys; handles bound to the id become inert.
    pub fn destroy(&self, id: Uuid) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Session
///
/// A handle scoped to one browsing session, exposing the synchronous `get`/`set`/
/// `remove` interface the session-tier cache is written against. Cloning the handle
/// is cheap; all clones address the same underlying map.
#[derive(Clone)]
pub struct Session {
    store: Arc<SessionStore>,
    id: Uuid,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let sessions = self
            .store
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.get(&self.id).and_then(|map| map.get(key).cloned())
    }

    /// Writes are dropped if the session was destroyed underneath the handle.
    pub fn set(&self, key: &str, value: String) {
        let mut sessions = self
            .store
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = sessions.get_mut(&self.id) {
            map.insert(key.to_string(), value);
        }
    }

    pub fn remove(&self, key: &str) {
        let mut sessions = self
            .store
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = sessions.get_mut(&self.id) {
            map.remove(key);
        }
    }
}

// --- Cookie Plumbing ---

/// session_id_from_headers
///
/// Extracts the session id from the request's `Cookie` header, tolerating the usual
/// browser formatting (multiple cookies, surrounding whitespace). Anything that does
/// not parse as a UUID is ignored.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name == SESSION_COOKIE {
                return Uuid::parse_str(value).ok();
            }
        }
    }
    None
}

/// session_cookie
///
/// `Set-Cookie` value establishing the session: HttpOnly so scripts never read the
/// id, and intentionally without `Max-Age` so the cookie dies with the browsing
/// session.
pub fn session_cookie(id: Uuid) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; Secure; SameSite=Strict")
}

/// expired_session_cookie
///
/// `Set-Cookie` value that immediately expires the session cookie (sign-out).
pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0")
}
