use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    clap::Subcommand,
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tollgate_config::TollgateConfig,
    tollgate_oauth::{
        BrowserPrompt, FileTokenStore, OAuthSessionManager, SessionStatus, TokenStore,
        load_oauth_config,
    },
    tracing::warn,
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Log in to a provider via OAuth.
    Login {
        /// Provider name (e.g. "notion").
        #[arg(long)]
        provider: String,
    },
    /// Show authentication status for all providers.
    Status,
    /// Log out from a provider.
    Logout {
        /// Provider name (e.g. "notion").
        #[arg(long)]
        provider: String,
    },
    /// Print a valid access token, refreshing or signing in first if needed.
    Token {
        /// Provider name (e.g. "notion").
        #[arg(long)]
        provider: String,
    },
}

pub async fn handle_auth(action: AuthAction) -> Result<()> {
    let config = tollgate_config::discover_and_load();
    match action {
        AuthAction::Login { provider } => login(&config, &provider).await,
        AuthAction::Status => status(&config).await,
        AuthAction::Logout { provider } => logout(&config, &provider).await,
        AuthAction::Token { provider } => token(&config, &provider).await,
    }
}

fn token_store(config: &TollgateConfig) -> FileTokenStore {
    match &config.session.token_store_path {
        Some(path) => FileTokenStore::with_path(path.clone()),
        None => FileTokenStore::new(),
    }
}

/// Cancels pending browser authorization on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, abandoning authorization");
            trigger.cancel();
        }
    });
    cancel
}

fn session_for(config: &TollgateConfig, provider: &str) -> Result<OAuthSessionManager> {
    if !config.is_enabled(provider) {
        anyhow::bail!("provider {provider} is disabled in config");
    }
    let oauth = load_oauth_config(provider)
        .ok_or_else(|| anyhow::anyhow!("unknown OAuth provider: {provider}"))?;

    let session = &config.session;
    let prompt = BrowserPrompt::new(cancel_on_ctrl_c())
        .with_timeout(Duration::from_secs(session.authorize_timeout_secs));

    Ok(OAuthSessionManager::new(
        provider,
        oauth,
        Arc::new(token_store(config)),
        Arc::new(prompt),
    )
    .with_static_token(config.access_token(provider).cloned())
    .with_refresh_skew(Duration::from_secs(session.refresh_skew_secs))
    .with_timeout(Duration::from_secs(session.token_timeout_secs)))
}

async fn login(config: &TollgateConfig, provider: &str) -> Result<()> {
    let session = session_for(config, provider)?;
    println!("Opening browser for authentication...");
    session.sign_in().await?;
    println!("Successfully logged in to {provider}");
    Ok(())
}

async fn token(config: &TollgateConfig, provider: &str) -> Result<()> {
    let session = session_for(config, provider)?;
    let token = session.ensure_authorized().await?;
    println!("{}", token.expose_secret());
    Ok(())
}

async fn status(config: &TollgateConfig) -> Result<()> {
    let mut providers = token_store(config).list().await?;
    providers.extend(
        config
            .providers
            .keys()
            .filter(|name| config.access_token(name).is_some())
            .cloned(),
    );
    providers.sort();
    providers.dedup();

    if providers.is_empty() {
        println!("No authenticated providers.");
        return Ok(());
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    for provider in providers {
        match session_for(config, &provider) {
            Ok(session) => {
                let state = session.status().await?;
                println!("{provider} [{}]", describe_status(state, now));
            },
            Err(e) => println!("{provider} [{e}]"),
        }
    }
    Ok(())
}

fn describe_status(status: SessionStatus, now: u64) -> String {
    match status {
        SessionStatus::NotAuthorized => "not authorized".to_string(),
        SessionStatus::Valid { expires_at: None } => "valid (no expiry)".to_string(),
        SessionStatus::Valid {
            expires_at: Some(ts),
        } => {
            let remaining = ts.saturating_sub(now);
            let hours = remaining / 3600;
            let mins = (remaining % 3600) / 60;
            format!("valid ({hours}h {mins}m remaining)")
        },
        SessionStatus::Expired { refreshable: true } => "expired (refreshable)".to_string(),
        SessionStatus::Expired { refreshable: false } => "expired".to_string(),
    }
}

async fn logout(config: &TollgateConfig, provider: &str) -> Result<()> {
    session_for(config, provider)?.sign_out().await?;
    println!("Logged out from {provider}");
    Ok(())
}
