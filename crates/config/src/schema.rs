//! Config schema: session timing knobs and per-provider overrides.

use std::{collections::HashMap, path::PathBuf};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TollgateConfig {
    pub session: SessionConfig,
    /// Per-provider settings keyed by provider id (e.g. "notion").
    pub providers: HashMap<String, ProviderEntry>,
}

/// Timing and storage settings shared by every OAuth session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for token and client-registration endpoint calls.
    pub token_timeout_secs: u64,
    /// How long to wait for the browser redirect before giving up.
    pub authorize_timeout_secs: u64,
    /// Treat access tokens as expired this many seconds early.
    pub refresh_skew_secs: u64,
    /// Override the token file location.
    pub token_store_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_timeout_secs: 8,
            authorize_timeout_secs: 300,
            refresh_skew_secs: 0,
            token_store_path: None,
        }
    }
}

/// Configuration for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    /// Whether this provider is enabled. Defaults to true.
    pub enabled: bool,

    /// Personal access token; when set, OAuth is skipped entirely.
    #[serde(skip_serializing)]
    pub access_token: Option<Secret<String>>,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            access_token: None,
        }
    }
}

impl TollgateConfig {
    /// Check if a provider is enabled (defaults to true if not configured).
    pub fn is_enabled(&self, name: &str) -> bool {
        self.providers.get(name).is_none_or(|e| e.enabled)
    }

    /// The static access token configured for a provider, if any.
    pub fn access_token(&self, name: &str) -> Option<&Secret<String>> {
        self.providers
            .get(name)
            .and_then(|e| e.access_token.as_ref())
    }
}
