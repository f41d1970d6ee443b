//! Tunables for the browser core.
//!
//! Loaded from a JSON file; every field has a default so a partial file, or
//! no file at all, is valid.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Include dot-prefixed entries in listings and search results.
    pub show_hidden: bool,
    /// Upper bound on bytes read for a file preview.
    pub preview_max_bytes: u64,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Depth below the search root; `None` walks the whole subtree.
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_hidden: true,
            preview_max_bytes: 1024 * 1024,
            search: SearchConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_symlinks: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from the per-user config directory, falling back to defaults when
    /// the file does not exist.
    pub fn load_default() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "filedash")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_show_everything() {
        let config = Config::default();
        assert!(config.show_hidden);
        assert_eq!(config.preview_max_bytes, 1024 * 1024);
        assert_eq!(config.search.max_depth, None);
        assert!(config.search.follow_symlinks);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "show_hidden": false, "search": { "max_depth": 3 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.show_hidden);
        assert_eq!(config.preview_max_bytes, 1024 * 1024);
        assert_eq!(config.search.max_depth, Some(3));
        assert!(config.search.follow_symlinks);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            preview_max_bytes: 10,
            ..Config::default()
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }

    #[test]
    fn missing_file_is_an_error_for_explicit_load() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(&dir.path().join("absent.json")).is_err());
    }
}
