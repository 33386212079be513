//! Configuration loading.
//!
//! QMD is configured via a small TOML file (default: `$QMD_CONFIG_DIR/config.toml`,
//! falling back to the OS config directory) naming the index's database path
//! and its collections, plus the environment variables `spec.md` §6
//! enumerates for Gateway backend selection. The config file owns structure
//! (index path, collection roots/patterns/context); the environment owns
//! credentials and Gateway endpoint selection, and always overrides the file.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    config_dir().join("index.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    pub root: PathBuf,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_pattern() -> String {
    "**/*.md".to_string()
}

/// `QMD_CONFIG_DIR`, falling back to the OS config directory (e.g.
/// `~/.config/qmd` on Linux) the way `dirs::config_dir()` resolves it.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var("QMD_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qmd")
}

/// Load `config.toml` from `path`, or return defaults if it doesn't exist.
/// An empty/missing config is valid: `qmd init` can create the index at the
/// default path with zero configured collections.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config {
            index: IndexConfig::default(),
            collections: BTreeMap::new(),
        });
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| "failed to parse config file")?;
    Ok(config)
}

/// The default config file path: `$QMD_CONFIG_DIR/config.toml`.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Gateway endpoint/credential settings read from the environment
/// (`spec.md` §6). Env vars always win; there is no file-based override for
/// credentials (out of scope per `spec.md` §1).
#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    pub backend: GatewayBackendSetting,
    pub embed_base_url: Option<String>,
    pub embed_model: Option<String>,
    pub embed_api_key: Option<String>,
    pub chat_base_url: Option<String>,
    pub chat_model: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_strict_json_output: bool,
    pub rerank_base_url: Option<String>,
    pub rerank_model: Option<String>,
    pub rerank_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayBackendSetting {
    #[default]
    Local,
    Api,
    Unknown,
}

impl GatewaySettings {
    pub fn from_env() -> Self {
        let backend = match env::var("QMD_LLM_BACKEND").as_deref() {
            Ok("local") => GatewayBackendSetting::Local,
            Ok("api") => GatewayBackendSetting::Api,
            Ok(_) => GatewayBackendSetting::Unknown,
            Err(_) => GatewayBackendSetting::Local,
        };

        Self {
            backend,
            embed_base_url: env::var("QMD_EMBED_BASE_URL").ok(),
            embed_model: env::var("QMD_EMBED_MODEL").ok(),
            embed_api_key: env::var("QMD_EMBED_API_KEY").ok(),
            chat_base_url: env::var("QMD_CHAT_BASE_URL").ok(),
            chat_model: env::var("QMD_CHAT_MODEL").ok(),
            chat_api_key: env::var("QMD_CHAT_API_KEY").ok(),
            chat_strict_json_output: env::var("QMD_CHAT_STRICT_JSON_OUTPUT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            rerank_base_url: env::var("QMD_RERANK_BASE_URL").ok(),
            rerank_model: env::var("QMD_RERANK_MODEL").ok(),
            rerank_api_key: env::var("QMD_RERANK_API_KEY").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/does-not-exist.toml")).unwrap();
        assert!(config.collections.is_empty());
    }

    #[test]
    fn parses_collections_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [index]
            path = "index.db"

            [collections.notes]
            root = "./notes"
            pattern = "**/*.md"
            context = "personal notes"
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.index.path, PathBuf::from("index.db"));
        let notes = config.collections.get("notes").unwrap();
        assert_eq!(notes.root, PathBuf::from("./notes"));
        assert_eq!(notes.context.as_deref(), Some("personal notes"));
    }
}
