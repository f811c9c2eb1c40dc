use std::time::Duration;

use {
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
    url::Url,
};

use crate::{
    error::OAuthError,
    pkce::{generate_pkce, generate_state},
    types::{
        AuthorizationRequest, ClientRegistration, OAuthConfig, OAuthTokens, TokenRequestFormat,
        TokenResponse, unix_now,
    },
};

/// Token endpoint calls are plain request/response; keep the wait short.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(8);

/// Authorization Code + PKCE flow against a single provider.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    config: OAuthConfig,
    client: Client,
}

/// Outcome of a token endpoint call that reached the provider.
enum TokenCall {
    Issued(OAuthTokens),
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_timeout(config, DEFAULT_TOKEN_TIMEOUT)
    }

    pub fn with_timeout(config: OAuthConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default http client");
                Client::new()
            });
        Self { config, client }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Build a fresh authorization request. Only the challenge is placed in
    /// the URL; the verifier stays in the returned request.
    pub fn start(
        &self,
        registration: &ClientRegistration,
    ) -> Result<AuthorizationRequest, OAuthError> {
        let pkce = generate_pkce();
        let state = generate_state();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| OAuthError::Config(format!("auth_url: {e}")))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("response_type", "code")
                .append_pair("client_id", &registration.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256")
                .append_pair("state", &state);
            if !self.config.scopes.is_empty() {
                q.append_pair("scope", &self.config.scopes.join(" "));
            }
            if self.config.client_secret_in_auth_url
                && let Some(secret) = &registration.client_secret
            {
                q.append_pair("client_secret", secret.expose_secret());
            }
            for (k, v) in &self.config.extra_auth_params {
                q.append_pair(k, v);
            }
        }

        Ok(AuthorizationRequest {
            url,
            state,
            redirect_uri: self.config.redirect_uri.clone(),
            pkce,
        })
    }

    /// Exchange an authorization code, consuming the request it belongs to.
    pub async fn exchange(
        &self,
        request: AuthorizationRequest,
        code: &str,
        registration: &ClientRegistration,
    ) -> Result<OAuthTokens, OAuthError> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            (
                "code_verifier",
                request.pkce.verifier.expose_secret().clone(),
            ),
            ("redirect_uri", request.redirect_uri),
        ];
        self.push_client_params(&mut params, registration)?;

        match self.call_token_endpoint(&params).await? {
            TokenCall::Issued(tokens) => Ok(tokens),
            TokenCall::Rejected { status, body } => {
                Err(OAuthError::TokenExchangeFailed { status, body })
            },
        }
    }

    /// Trade a refresh token for a new credential. When the provider does not
    /// rotate refresh tokens, the one passed in is carried forward.
    pub async fn refresh(
        &self,
        refresh_token: &Secret<String>,
        registration: &ClientRegistration,
    ) -> Result<OAuthTokens, OAuthError> {
        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.expose_secret().clone()),
        ];
        self.push_client_params(&mut params, registration)?;

        match self.call_token_endpoint(&params).await? {
            TokenCall::Issued(mut tokens) => {
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token.clone());
                }
                Ok(tokens)
            },
            TokenCall::Rejected { status, body } => Err(OAuthError::RefreshFailed { status, body }),
        }
    }

    fn push_client_params(
        &self,
        params: &mut Vec<(&'static str, String)>,
        registration: &ClientRegistration,
    ) -> Result<(), OAuthError> {
        params.push(("client_id", registration.client_id.clone()));
        if self.config.requires_client_secret {
            let secret = registration.client_secret.as_ref().ok_or_else(|| {
                OAuthError::ClientRegistrationFailed(
                    "provider requires a client secret but none is configured".into(),
                )
            })?;
            params.push(("client_secret", secret.expose_secret().clone()));
        }
        Ok(())
    }

    async fn call_token_endpoint(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<TokenCall, OAuthError> {
        let grant = params
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();
        debug!(token_url = %self.config.token_url, grant, "calling token endpoint");

        let req = self.client.post(&self.config.token_url);
        let req = match self.config.token_request_format {
            TokenRequestFormat::Form => req.form(params),
            TokenRequestFormat::Json => {
                let body: serde_json::Map<String, serde_json::Value> = params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                req.json(&body)
            },
        };

        let resp = req
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            warn!(%status, grant, "token endpoint rejected request");
            return Ok(TokenCall::Rejected { status, body });
        }

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(parsed) => Ok(TokenCall::Issued(parsed.into_tokens(unix_now()))),
            Err(e) => {
                warn!(error = %e, grant, "token endpoint returned an unreadable body");
                Ok(TokenCall::Rejected {
                    status,
                    body: format!("invalid token response: {e}"),
                })
            },
        }
    }
}
