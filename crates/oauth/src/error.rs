use reqwest::StatusCode;

/// Failures surfaced by the OAuth session lifecycle.
///
/// Nothing here is retried internally; callers decide whether to prompt the
/// user again.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("client registration failed: {0}")]
    ClientRegistrationFailed(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("authorization callback state does not match the request")]
    StateMismatch,

    #[error("token exchange failed (HTTP {status}): {body}")]
    TokenExchangeFailed { status: StatusCode, body: String },

    #[error("token refresh failed (HTTP {status}): {body}; sign in again")]
    RefreshFailed { status: StatusCode, body: String },

    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authorization callback failed: {0}")]
    Callback(String),

    #[error("token store error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl OAuthError {
    /// Whether the caller should send the user through interactive sign-in.
    pub fn is_reauthorization_required(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationDenied(_)
                | Self::StateMismatch
                | Self::TokenExchangeFailed { .. }
                | Self::RefreshFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_failure_asks_for_reauthorization() {
        let err = OAuthError::RefreshFailed {
            status: StatusCode::BAD_REQUEST,
            body: "invalid_grant".into(),
        };
        assert!(err.is_reauthorization_required());
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("sign in again"));
    }

    #[test]
    fn registration_failure_is_not_a_reauthorization() {
        let err = OAuthError::ClientRegistrationFailed("HTTP 500".into());
        assert!(!err.is_reauthorization_required());
    }
}
