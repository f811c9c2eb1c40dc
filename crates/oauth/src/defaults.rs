use std::{collections::HashMap, path::Path};

use {secrecy::Secret, tracing::warn};

use crate::{
    config_dir::tollgate_config_dir,
    types::{OAuthConfig, TokenRequestFormat},
};

const DEFAULT_CALLBACK_PORT: u16 = 8787;

/// Default OAuth configurations for known providers.
fn builtin_defaults() -> HashMap<String, OAuthConfig> {
    let mut m = HashMap::new();
    m.insert("notion".into(), OAuthConfig {
        client_id: Some("c843219a-d93c-403c-8e4d-e8aa9a987494".into()),
        client_secret: None,
        auth_url: "https://notion.oauth-proxy.raycast.com/authorize".into(),
        token_url: "https://notion.oauth-proxy.raycast.com/token".into(),
        redirect_uri: format!("http://127.0.0.1:{DEFAULT_CALLBACK_PORT}/auth/callback"),
        scopes: vec![],
        extra_auth_params: vec![("owner".into(), "user".into())],
        requires_client_secret: false,
        client_secret_in_auth_url: false,
        registration_url: None,
        app_name: None,
        website: None,
        token_request_format: TokenRequestFormat::Json,
    });
    m
}

/// Load the OAuth config for a provider.
///
/// Priority:
/// 1. Environment variables (`TOLLGATE_OAUTH_{PROVIDER}_CLIENT_ID`, etc.)
/// 2. User config file (`~/.config/tollgate/oauth_providers.json`)
/// 3. Built-in defaults
///
/// The config file may define providers that have no built-in entry, e.g. a
/// Mastodon instance using dynamic client registration.
pub fn load_oauth_config(provider: &str) -> Option<OAuthConfig> {
    load_oauth_config_from(&tollgate_config_dir().join("oauth_providers.json"), provider)
}

pub(crate) fn load_oauth_config_from(path: &Path, provider: &str) -> Option<OAuthConfig> {
    let from_file = std::fs::read_to_string(path).ok().and_then(|data| {
        serde_json::from_str::<HashMap<String, OAuthConfig>>(&data)
            .map_err(|e| warn!(path = %path.display(), error = %e, "ignoring invalid provider file"))
            .ok()
    });

    let mut config = from_file
        .and_then(|mut configs| configs.remove(provider))
        .or_else(|| builtin_defaults().remove(provider))?;

    apply_env_overrides(&mut config, provider, |key| std::env::var(key).ok());
    Some(config)
}

fn apply_env_overrides(
    config: &mut OAuthConfig,
    provider: &str,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let prefix = format!(
        "TOLLGATE_OAUTH_{}_",
        provider.to_uppercase().replace('-', "_")
    );
    let var = |name: &str| lookup(&format!("{prefix}{name}"));

    if let Some(v) = var("CLIENT_ID") {
        config.client_id = Some(v);
    }
    if let Some(v) = var("CLIENT_SECRET") {
        config.client_secret = Some(Secret::new(v));
    }
    if let Some(v) = var("AUTH_URL") {
        config.auth_url = v;
    }
    if let Some(v) = var("TOKEN_URL") {
        config.token_url = v;
    }
    if let Some(v) = var("REDIRECT_URI") {
        config.redirect_uri = v;
    }
    if let Some(v) = var("REGISTRATION_URL") {
        config.registration_url = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn builtin_notion_uses_json_token_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_oauth_config_from(&dir.path().join("missing.json"), "notion").unwrap();
        assert_eq!(cfg.token_request_format, TokenRequestFormat::Json);
        assert!(cfg.client_id.is_some());
        assert_eq!(cfg.redirect_uri, "http://127.0.0.1:8787/auth/callback");
    }

    #[test]
    fn unknown_provider_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_oauth_config_from(&dir.path().join("missing.json"), "nope").is_none());
    }

    #[test]
    fn file_defines_extra_providers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_providers.json");
        std::fs::write(
            &path,
            r#"{
                "mastodon": {
                    "auth_url": "https://mastodon.example/oauth/authorize",
                    "token_url": "https://mastodon.example/oauth/token",
                    "redirect_uri": "http://127.0.0.1:9123/auth/callback",
                    "scopes": ["read", "write"],
                    "requires_client_secret": true,
                    "registration_url": "https://mastodon.example/api/v1/apps",
                    "app_name": "Launcher"
                }
            }"#,
        )
        .unwrap();

        let cfg = load_oauth_config_from(&path, "mastodon").unwrap();
        assert!(cfg.client_id.is_none());
        assert!(cfg.requires_client_secret);
        assert!(cfg.redirect_uri.contains(":9123"));
        // Builtins still resolve when the file does not mention them.
        assert!(load_oauth_config_from(&path, "notion").is_some());
    }

    #[test]
    fn env_overrides_individual_fields() {
        let mut cfg = builtin_defaults().remove("notion").unwrap();
        apply_env_overrides(&mut cfg, "notion", |key| match key {
            "TOLLGATE_OAUTH_NOTION_CLIENT_ID" => Some("env-id".into()),
            "TOLLGATE_OAUTH_NOTION_CLIENT_SECRET" => Some("env-secret".into()),
            "TOLLGATE_OAUTH_NOTION_REDIRECT_URI" => Some("http://127.0.0.1:9999/cb".into()),
            _ => None,
        });
        assert_eq!(cfg.client_id.as_deref(), Some("env-id"));
        assert_eq!(
            cfg.client_secret.as_ref().map(|s| s.expose_secret().as_str()),
            Some("env-secret")
        );
        assert_eq!(cfg.redirect_uri, "http://127.0.0.1:9999/cb");
        assert!(cfg.auth_url.contains("notion"));
    }
}
