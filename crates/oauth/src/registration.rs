//! Client credential resolution, including dynamic "create app" registration
//! for providers that do not hand out long-lived client ids.

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    error::OAuthError,
    types::{ClientRegistration, OAuthConfig},
};

const DEFAULT_APP_NAME: &str = "Tollgate";

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: &'a str,
    scopes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    website: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(default)]
    client_secret: Option<Secret<String>>,
}

/// Resolve client credentials for one authorization or refresh.
///
/// Static config wins. Otherwise a fresh app is registered on every call;
/// results are never cached.
pub async fn resolve_registration(
    client: &reqwest::Client,
    config: &OAuthConfig,
) -> Result<ClientRegistration, OAuthError> {
    if let Some(client_id) = &config.client_id {
        return Ok(ClientRegistration {
            client_id: client_id.clone(),
            client_secret: config.client_secret.clone(),
        });
    }

    let Some(url) = config.registration_url.as_deref() else {
        return Err(OAuthError::ClientRegistrationFailed(
            "no client id configured and no registration endpoint".into(),
        ));
    };

    register_client(client, url, config).await
}

async fn register_client(
    client: &reqwest::Client,
    url: &str,
    config: &OAuthConfig,
) -> Result<ClientRegistration, OAuthError> {
    let body = RegistrationRequest {
        client_name: config.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME),
        redirect_uris: &config.redirect_uri,
        scopes: config.scopes.join(" "),
        website: config.website.as_deref(),
    };

    debug!(url, "registering oauth client");
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| OAuthError::ClientRegistrationFailed(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!(url, %status, "client registration rejected");
        return Err(OAuthError::ClientRegistrationFailed(format!(
            "HTTP {status}: {text}"
        )));
    }

    let parsed: RegistrationResponse = resp
        .json()
        .await
        .map_err(|e| OAuthError::ClientRegistrationFailed(format!("bad response: {e}")))?;

    if config.requires_client_secret && parsed.client_secret.is_none() {
        return Err(OAuthError::ClientRegistrationFailed(
            "registration response has no client_secret".into(),
        ));
    }

    Ok(ClientRegistration {
        client_id: parsed.client_id,
        client_secret: parsed.client_secret,
    })
}

#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher, secrecy::ExposeSecret};

    fn config(registration_url: Option<String>) -> OAuthConfig {
        OAuthConfig {
            client_id: None,
            client_secret: None,
            auth_url: "https://social.example/oauth/authorize".into(),
            token_url: "https://social.example/oauth/token".into(),
            redirect_uri: "http://127.0.0.1:8787/auth/callback".into(),
            scopes: vec!["read".into(), "write".into()],
            extra_auth_params: vec![],
            requires_client_secret: true,
            client_secret_in_auth_url: false,
            registration_url,
            app_name: Some("Launcher".into()),
            website: None,
            token_request_format: Default::default(),
        }
    }

    #[tokio::test]
    async fn static_client_id_skips_network() {
        let mut cfg = config(Some("http://127.0.0.1:1/never".into()));
        cfg.client_id = Some("static-id".into());
        cfg.client_secret = Some(Secret::new("static-secret".into()));

        let reg = resolve_registration(&reqwest::Client::new(), &cfg)
            .await
            .unwrap();
        assert_eq!(reg.client_id, "static-id");
        assert_eq!(
            reg.client_secret.as_ref().map(|s| s.expose_secret().as_str()),
            Some("static-secret")
        );
    }

    #[tokio::test]
    async fn registers_app_with_name_redirect_and_scopes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/apps")
            .match_body(Matcher::Json(serde_json::json!({
                "client_name": "Launcher",
                "redirect_uris": "http://127.0.0.1:8787/auth/callback",
                "scopes": "read write",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"1","client_id":"dyn-id","client_secret":"dyn-secret"}"#)
            .create_async()
            .await;

        let cfg = config(Some(format!("{}/api/v1/apps", server.url())));
        let reg = resolve_registration(&reqwest::Client::new(), &cfg)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reg.client_id, "dyn-id");
        assert_eq!(
            reg.client_secret.as_ref().map(|s| s.expose_secret().as_str()),
            Some("dyn-secret")
        );
    }

    #[tokio::test]
    async fn website_is_sent_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/apps")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "client_name": "Launcher",
                "website": "https://launcher.example",
            })))
            .with_status(200)
            .with_body(r#"{"client_id":"dyn-id","client_secret":"dyn-secret"}"#)
            .create_async()
            .await;

        let mut cfg = config(Some(format!("{}/api/v1/apps", server.url())));
        cfg.website = Some("https://launcher.example".into());
        resolve_registration(&reqwest::Client::new(), &cfg)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_registration_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/apps")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let cfg = config(Some(format!("{}/api/v1/apps", server.url())));
        let err = resolve_registration(&reqwest::Client::new(), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::ClientRegistrationFailed(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn missing_secret_fails_when_required() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/apps")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"client_id":"dyn-id"}"#)
            .create_async()
            .await;

        let cfg = config(Some(format!("{}/api/v1/apps", server.url())));
        let err = resolve_registration(&reqwest::Client::new(), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::ClientRegistrationFailed(_)));
    }

    #[tokio::test]
    async fn no_client_id_and_no_endpoint_fails() {
        let err = resolve_registration(&reqwest::Client::new(), &config(None))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::ClientRegistrationFailed(_)));
    }
}
