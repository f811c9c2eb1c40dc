use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::TollgateConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "tollgate.toml",
    "tollgate.yaml",
    "tollgate.yml",
    "tollgate.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory, and token/provider files are read from and written to it.
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<TollgateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tollgate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tollgate/tollgate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TollgateConfig::default()` if no config file is found or the
/// file fails to parse.
pub fn discover_and_load() -> TollgateConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return TollgateConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        TollgateConfig::default()
    })
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    first_existing(Path::new(".")).or_else(|| user_config_dir().and_then(|d| first_existing(&d)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/tollgate/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(user_config_dir)
}

fn user_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("tollgate"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<TollgateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_supported_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("tollgate.toml");
        std::fs::write(&toml_path, "[session]\nrefresh_skew_secs = 30\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().session.refresh_skew_secs, 30);

        let yaml_path = dir.path().join("tollgate.yaml");
        std::fs::write(&yaml_path, "session:\n  token_timeout_secs: 5\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().session.token_timeout_secs, 5);

        let json_path = dir.path().join("tollgate.json");
        std::fs::write(&json_path, r#"{"providers":{"notion":{"enabled":false}}}"#).unwrap();
        assert!(!load_config(&json_path).unwrap().is_enabled("notion"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tollgate.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn fallback_applies_inside_config_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tollgate.toml");
        std::fs::write(
            &path,
            "[session]\nauthorize_timeout_secs = ${TOLLGATE_LOADER_UNSET_XYZ:-42}\n",
        )
        .unwrap();
        assert_eq!(load_config(&path).unwrap().session.authorize_timeout_secs, 42);
    }

    #[test]
    fn override_dir_controls_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tollgate.toml"),
            "[session]\ntoken_timeout_secs = 3\n",
        )
        .unwrap();

        set_config_dir(dir.path().to_path_buf());
        let cfg = discover_and_load();
        let resolved = config_dir();
        clear_config_dir();

        assert_eq!(cfg.session.token_timeout_secs, 3);
        assert_eq!(resolved.as_deref(), Some(dir.path()));
    }
}
