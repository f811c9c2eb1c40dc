use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    url::Url,
};

use crate::{callback_server::CallbackServer, error::OAuthError, types::CallbackParams};

pub const DEFAULT_AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(300);

/// The interactive half of the flow: show the authorize page to the user and
/// hand back whatever arrives at the redirect URI.
///
/// Implementations must return `AuthorizationDenied` on cancellation or
/// timeout. State validation is left to the caller.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn authorize(
        &self,
        authorize_url: &Url,
        redirect_uri: &str,
    ) -> Result<CallbackParams, OAuthError>;
}

/// Opens the system browser and listens on the redirect URI's loopback port.
#[derive(Debug, Clone)]
pub struct BrowserPrompt {
    timeout: Duration,
    cancel: CancellationToken,
}

impl BrowserPrompt {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            timeout: DEFAULT_AUTHORIZE_TIMEOUT,
            cancel,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Loopback address and path the redirect URI points at.
pub(crate) fn listen_target(redirect_uri: &str) -> Result<(SocketAddr, String), OAuthError> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| OAuthError::Config(format!("redirect_uri: {e}")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| OAuthError::Config(format!("redirect_uri has no port: {redirect_uri}")))?;
    let ip = match url.host_str() {
        Some("localhost") | None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| {
                OAuthError::Config(format!(
                    "redirect_uri must point at a loopback address: {redirect_uri}"
                ))
            })?,
    };
    Ok((SocketAddr::new(ip, port), url.path().to_string()))
}

#[async_trait]
impl AuthorizationPrompt for BrowserPrompt {
    async fn authorize(
        &self,
        authorize_url: &Url,
        redirect_uri: &str,
    ) -> Result<CallbackParams, OAuthError> {
        let (addr, path) = listen_target(redirect_uri)?;
        let server = CallbackServer::bind(addr, &path).await?;

        info!(%addr, "waiting for authorization callback");
        if let Err(e) = open::that(authorize_url.as_str()) {
            warn!(error = %e, url = %authorize_url, "could not open browser, visit the URL manually");
        }

        server.wait(self.timeout, self.cancel.clone()).await
    }
}
