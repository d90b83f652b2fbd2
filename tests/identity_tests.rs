use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, request::Parts},
};
use chem_cash::{
    AppConfig,
    gate::CurrentUser,
    identity::{Claims, IdentityProvider, SupabaseIdentity},
    models::{Identity, Profile, Role},
    session::{Session, SessionStore},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

// --- Helper Functions ---

const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn test_provider() -> SupabaseIdentity {
    SupabaseIdentity::new(&AppConfig::default())
}

/// Signs a token the way GoTrue does: HS256 over the project secret, with the
/// "authenticated" audience unless a test overrides it.
fn create_token(user_id: Uuid, exp_offset: i64, audience: &str, secret: &str) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        email: Some("user@school.test".to_string()),
        iat: now as usize,
        exp: (now + exp_offset) as usize,
        aud: audience.to_string(),
        role: "authenticated".to_string(),
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn signed_token(user_id: Uuid, exp_offset: i64) -> String {
    create_token(
        user_id,
        exp_offset,
        "authenticated",
        &AppConfig::default().jwt_secret,
    )
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

// --- Token Validation ---

#[tokio::test]
async fn test_valid_token_resolves_identity() {
    let provider = test_provider();
    let token = signed_token(TEST_USER_ID, 3600);

    let identity = provider.current_identity(&token).await.unwrap();

    let identity = identity.expect("valid token should resolve");
    assert_eq!(identity.user_id, TEST_USER_ID);
    assert_eq!(identity.email.as_deref(), Some("user@school.test"));
}

#[tokio::test]
async fn test_expired_token_reads_as_signed_out() {
    let provider = test_provider();
    // Expired well past the validation leeway.
    let token = signed_token(TEST_USER_ID, -3600);

    let identity = provider.current_identity(&token).await.unwrap();

    assert!(identity.is_none());
}

#[tokio::test]
async fn test_garbage_token_reads_as_signed_out() {
    let provider = test_provider();

    let identity = provider.current_identity("not-a-jwt").await.unwrap();

    assert!(identity.is_none());
}

#[tokio::test]
async fn test_wrong_audience_reads_as_signed_out() {
    let provider = test_provider();
    // Anonymous-audience tokens exist in the backend's world; they are not
    // signed-in users and must not pass the gate.
    let token = create_token(TEST_USER_ID, 3600, "anon", &AppConfig::default().jwt_secret);

    let identity = provider.current_identity(&token).await.unwrap();

    assert!(identity.is_none());
}

#[tokio::test]
async fn test_forged_signature_reads_as_signed_out() {
    let provider = test_provider();
    let token = create_token(TEST_USER_ID, 3600, "authenticated", "some-other-secret");

    let identity = provider.current_identity(&token).await.unwrap();

    assert!(identity.is_none());
}

// --- Pass-Through Extractors ---

#[tokio::test]
async fn test_current_user_extractor_reads_the_gate_payload() {
    let profile = Profile {
        user_id: TEST_USER_ID,
        first_name: "Tess".to_string(),
        last_name: "Byrne".to_string(),
        user_role: Role::Teacher,
        email: "tess@school.test".to_string(),
    };
    let current = CurrentUser {
        identity: Identity {
            user_id: TEST_USER_ID,
            email: Some("tess@school.test".to_string()),
        },
        profile: profile.clone(),
    };

    let mut parts = get_request_parts(Method::GET, "/teacher".parse().unwrap());
    parts.extensions.insert(current);

    let extracted = CurrentUser::from_request_parts(&mut parts, &()).await;

    let extracted = extracted.expect("extension should extract");
    assert_eq!(extracted.profile, profile);
    assert_eq!(extracted.identity.user_id, TEST_USER_ID);
}

#[tokio::test]
async fn test_current_user_extractor_rejects_ungated_requests() {
    let mut parts = get_request_parts(Method::GET, "/teacher".parse().unwrap());

    let extracted = CurrentUser::from_request_parts(&mut parts, &()).await;

    assert_eq!(extracted.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_extractor_reads_the_gate_extension() {
    let sessions = Arc::new(SessionStore::new());
    let session = sessions.create();
    session.set("k", "v".to_string());

    let mut parts = get_request_parts(Method::GET, "/teacher".parse().unwrap());
    parts.extensions.insert(session.clone());

    let extracted = Session::from_request_parts(&mut parts, &())
        .await
        .expect("extension should extract");

    assert_eq!(extracted.id(), session.id());
    assert_eq!(extracted.get("k"), Some("v".to_string()));
}
