use std::path::PathBuf;

/// Directory holding `oauth_tokens.json` and `oauth_providers.json`.
pub(crate) fn tollgate_config_dir() -> PathBuf {
    tollgate_config::config_dir().unwrap_or_else(|| PathBuf::from(".tollgate"))
}
