//! OAuth 2.0 Authorization Code + PKCE sessions for launcher extensions.
//!
//! [`OAuthSessionManager::ensure_authorized`] is the entry point: it returns a
//! valid bearer token, refreshing or running the interactive browser flow
//! when the stored credential is missing or expired.

pub mod callback_server;
mod config_dir;
pub mod defaults;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod prompt;
pub mod registration;
pub mod session;
pub mod storage;
pub mod types;

pub use {
    callback_server::CallbackServer,
    defaults::load_oauth_config,
    error::OAuthError,
    flow::OAuthFlow,
    prompt::{AuthorizationPrompt, BrowserPrompt},
    session::OAuthSessionManager,
    storage::{FileTokenStore, MemoryTokenStore, TokenStore},
    types::{
        AuthorizationRequest, CallbackParams, ClientRegistration, OAuthConfig, OAuthTokens,
        PkceChallenge, SessionStatus, TokenRequestFormat, serialize_option_secret,
        serialize_secret,
    },
};
