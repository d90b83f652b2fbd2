use axum::http::StatusCode;
use thiserror::Error;

/// ProviderError
///
/// Failure taxonomy shared by the two external backend surfaces (Identity Provider and
/// Profile Store). The split matters for mapping to HTTP statuses and for logging:
/// a `Rejected` carries the provider's own message (safe to surface to the form),
/// while `Transport`/`Payload` describe infrastructure trouble the user never sees.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP call itself failed (connect, timeout, TLS).
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a rejection and a human-readable reason
    /// (bad credentials, duplicate email, row-level security denial).
    #[error("{0}")]
    Rejected(String),

    /// The provider answered 2xx but the body did not decode into the expected shape.
    #[error("unexpected backend response: {0}")]
    Payload(String),
}

impl ProviderError {
    /// status_code
    ///
    /// Default HTTP mapping for handlers that do not need a bespoke one.
    /// Sign-in overrides `Rejected` to 401 at its own call site.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProviderError::Rejected(_) => StatusCode::BAD_REQUEST,
            ProviderError::Transport(_) | ProviderError::Payload(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
