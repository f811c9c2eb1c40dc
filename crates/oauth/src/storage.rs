use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    tempfile::NamedTempFile,
    tokio::sync::{Mutex, RwLock},
    tracing::{debug, warn},
};

use crate::{config_dir::tollgate_config_dir, types::OAuthTokens};

type TokenMap = HashMap<String, OAuthTokens>;

/// Persistent credential storage keyed by provider id.
///
/// Every write replaces the whole credential for that provider; readers never
/// observe a partially updated value.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self, provider: &str) -> Result<Option<OAuthTokens>>;
    async fn save(&self, provider: &str, tokens: &OAuthTokens) -> Result<()>;
    async fn delete(&self, provider: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<String>>;
}

/// File-based token storage at `~/.config/tollgate/oauth_tokens.json`.
///
/// Writes go to a uniquely named sibling temp file that is renamed over the
/// target, so other processes see either the old or the new file.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new() -> Self {
        Self::with_path(tollgate_config_dir().join("oauth_tokens.json"))
    }

    /// Create a token store at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<TokenMap> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_map(&path))
            .await
            .context("token file read task failed")?
    }

    async fn modify(&self, f: impl FnOnce(&mut TokenMap) + Send + 'static) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut map = read_map(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable token file");
                TokenMap::new()
            });
            f(&mut map);
            write_map(&path, &map)
        })
        .await
        .context("token file write task failed")?
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read_map(path: &Path) -> Result<TokenMap> {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data)
            .with_context(|| format!("corrupt token file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TokenMap::new()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Write the whole map to a fresh temp file in the same directory, then
/// rename it into place.
fn write_map(path: &Path, map: &TokenMap) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let data = serde_json::to_string_pretty(map)?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data.as_bytes())?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, provider: &str) -> Result<Option<OAuthTokens>> {
        Ok(self.read().await?.remove(provider))
    }

    async fn save(&self, provider: &str, tokens: &OAuthTokens) -> Result<()> {
        let (key, tokens) = (provider.to_string(), tokens.clone());
        self.modify(move |map| {
            map.insert(key, tokens);
        })
        .await?;
        debug!(provider, path = %self.path.display(), "saved oauth tokens");
        Ok(())
    }

    async fn delete(&self, provider: &str) -> Result<()> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        let key = provider.to_string();
        self.modify(move |map| {
            map.remove(&key);
        })
        .await?;
        debug!(provider, "deleted oauth tokens");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut providers: Vec<String> = self.read().await?.into_keys().collect();
        providers.sort();
        Ok(providers)
    }
}

/// In-memory token storage for hosts that persist credentials themselves.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, OAuthTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, provider: &str) -> Result<Option<OAuthTokens>> {
        Ok(self.tokens.read().await.get(provider).cloned())
    }

    async fn save(&self, provider: &str, tokens: &OAuthTokens) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(provider.to_string(), tokens.clone());
        Ok(())
    }

    async fn delete(&self, provider: &str) -> Result<()> {
        self.tokens.write().await.remove(provider);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut providers: Vec<String> = self.tokens.read().await.keys().cloned().collect();
        providers.sort();
        Ok(providers)
    }
}
