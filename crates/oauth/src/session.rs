//! Per-provider session lifecycle: load, check freshness, refresh or
//! authorize, persist.

use std::{sync::Arc, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    error::OAuthError,
    flow::OAuthFlow,
    prompt::AuthorizationPrompt,
    registration::resolve_registration,
    storage::TokenStore,
    types::{OAuthConfig, OAuthTokens, SessionStatus, unix_now},
};

/// What the stored credential allows us to do without asking the user.
enum CredentialState {
    Missing,
    Fresh(OAuthTokens),
    Refreshable(Secret<String>),
    Stale,
}

fn classify(stored: Option<OAuthTokens>, now: u64, skew: u64) -> CredentialState {
    match stored {
        None => CredentialState::Missing,
        Some(tokens) if !tokens.is_expired_at(now, skew) => CredentialState::Fresh(tokens),
        Some(OAuthTokens {
            refresh_token: Some(refresh),
            ..
        }) => CredentialState::Refreshable(refresh),
        Some(_) => CredentialState::Stale,
    }
}

/// Hands out a valid access token for one provider, authorizing or
/// refreshing as needed.
///
/// Construct one per provider and share it by reference; concurrent callers
/// on the same manager are serialized so at most one refresh or interactive
/// authorization runs at a time.
pub struct OAuthSessionManager {
    provider: String,
    flow: OAuthFlow,
    store: Arc<dyn TokenStore>,
    prompt: Arc<dyn AuthorizationPrompt>,
    static_token: Option<Secret<String>>,
    refresh_skew: u64,
    lock: Mutex<()>,
}

impl OAuthSessionManager {
    pub fn new(
        provider: impl Into<String>,
        config: OAuthConfig,
        store: Arc<dyn TokenStore>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Self {
        Self {
            provider: provider.into(),
            flow: OAuthFlow::new(config),
            store,
            prompt,
            static_token: None,
            refresh_skew: 0,
            lock: Mutex::new(()),
        }
    }

    /// Use a personal access token instead of OAuth.
    pub fn with_static_token(mut self, token: Option<Secret<String>>) -> Self {
        self.static_token = token;
        self
    }

    /// Treat tokens as expired `skew` early.
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew.as_secs();
        self
    }

    /// Timeout for token and registration endpoint calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.flow = OAuthFlow::with_timeout(self.flow.config().clone(), timeout);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Return a currently valid access token.
    pub async fn ensure_authorized(&self) -> Result<Secret<String>, OAuthError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let _guard = self.lock.lock().await;
        let stored = self.store.load(&self.provider).await?;

        match classify(stored, unix_now(), self.refresh_skew) {
            CredentialState::Fresh(tokens) => Ok(tokens.access_token),
            CredentialState::Refreshable(refresh) => self.refresh(&refresh).await,
            CredentialState::Missing => {
                debug!(provider = %self.provider, "no stored credential");
                self.authorize().await
            },
            CredentialState::Stale => {
                info!(provider = %self.provider, "access token expired and cannot be refreshed, signing in again");
                self.authorize().await
            },
        }
    }

    /// Recover after the API rejected `rejected` as expired or invalid.
    ///
    /// This is the only refresh path for tokens without expiry information.
    pub async fn handle_unauthorized(
        &self,
        rejected: &Secret<String>,
    ) -> Result<Secret<String>, OAuthError> {
        if self.static_token.is_some() {
            return Err(OAuthError::AuthorizationDenied(format!(
                "configured access token for {} was rejected",
                self.provider
            )));
        }

        let _guard = self.lock.lock().await;
        let stored = self.store.load(&self.provider).await?;

        match stored {
            Some(tokens) if tokens.access_token.expose_secret() != rejected.expose_secret() => {
                debug!(provider = %self.provider, "credential already replaced by another caller");
                Ok(tokens.access_token)
            },
            Some(OAuthTokens {
                refresh_token: Some(refresh),
                ..
            }) => self.refresh(&refresh).await,
            _ => self.authorize().await,
        }
    }

    /// Force a full interactive authorization, replacing any stored credential.
    pub async fn sign_in(&self) -> Result<Secret<String>, OAuthError> {
        let _guard = self.lock.lock().await;
        self.authorize().await
    }

    /// Report the stored credential's state without touching the network.
    pub async fn status(&self) -> Result<SessionStatus, OAuthError> {
        if self.static_token.is_some() {
            return Ok(SessionStatus::Valid { expires_at: None });
        }
        let stored = self.store.load(&self.provider).await?;
        Ok(match classify(stored, unix_now(), self.refresh_skew) {
            CredentialState::Missing => SessionStatus::NotAuthorized,
            CredentialState::Fresh(tokens) => SessionStatus::Valid {
                expires_at: tokens.expires_at,
            },
            CredentialState::Refreshable(_) => SessionStatus::Expired { refreshable: true },
            CredentialState::Stale => SessionStatus::Expired { refreshable: false },
        })
    }

    /// Forget the stored credential.
    pub async fn sign_out(&self) -> Result<(), OAuthError> {
        let _guard = self.lock.lock().await;
        self.store.delete(&self.provider).await?;
        info!(provider = %self.provider, "signed out");
        Ok(())
    }

    /// Interactive Authorization Code + PKCE flow. Caller holds the lock.
    async fn authorize(&self) -> Result<Secret<String>, OAuthError> {
        let registration =
            resolve_registration(self.flow.http_client(), self.flow.config()).await?;
        let request = self.flow.start(&registration)?;

        info!(provider = %self.provider, "starting interactive authorization");
        let callback = self
            .prompt
            .authorize(&request.url, &request.redirect_uri)
            .await?;

        if let Some(error) = callback.error {
            let detail = callback
                .error_description
                .map(|d| format!("{error}: {d}"))
                .unwrap_or(error);
            return Err(OAuthError::AuthorizationDenied(detail));
        }

        if callback.state.as_deref() != Some(request.state.as_str()) {
            warn!(provider = %self.provider, "authorization callback state mismatch, discarding request");
            return Err(OAuthError::StateMismatch);
        }

        let code = callback.code.filter(|c| !c.is_empty()).ok_or_else(|| {
            OAuthError::AuthorizationDenied("callback carried no authorization code".into())
        })?;

        let tokens = self.flow.exchange(request, &code, &registration).await?;
        self.store.save(&self.provider, &tokens).await?;
        info!(provider = %self.provider, expires_at = ?tokens.expires_at, "authorized");
        Ok(tokens.access_token)
    }

    /// Non-interactive refresh. Caller holds the lock.
    ///
    /// A rejected refresh deletes the stored credential so the next call goes
    /// through interactive authorization instead of retrying a dead token.
    async fn refresh(&self, refresh_token: &Secret<String>) -> Result<Secret<String>, OAuthError> {
        debug!(provider = %self.provider, "refreshing access token");
        let registration =
            resolve_registration(self.flow.http_client(), self.flow.config()).await?;

        match self.flow.refresh(refresh_token, &registration).await {
            Ok(tokens) => {
                self.store.save(&self.provider, &tokens).await?;
                debug!(provider = %self.provider, expires_at = ?tokens.expires_at, "refreshed");
                Ok(tokens.access_token)
            },
            Err(err @ OAuthError::RefreshFailed { .. }) => {
                warn!(
                    provider = %self.provider,
                    error = %err,
                    "refresh token rejected, clearing stored credential; next request will ask the user to sign in"
                );
                self.store.delete(&self.provider).await?;
                Err(err)
            },
            Err(err) => Err(err),
        }
    }
}
