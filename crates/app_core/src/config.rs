//! ShellMeta configuration

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellMetaConfig {
    pub cache: CacheConfig,
    pub icons: IconsConfig,
}

/// Icon cache policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub policy: CachePolicy,
    /// Entries per cache instance; only used by the LRU policy
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::Unbounded,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Entries live for the life of the process
    #[serde(rename = "unbounded")]
    Unbounded,
    /// Least recently used entries are evicted past `capacity`
    #[serde(rename = "lru")]
    Lru,
}

/// Icon resolution defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconsConfig {
    /// Size used when the caller does not ask for one
    pub default_size: i32,
    /// Library holding the generic folder icon, relative to the system directory
    pub folder_library: String,
    pub folder_index: i32,
    /// Library holding the generic file icon, relative to the system directory
    pub file_library: String,
    pub file_index: i32,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            default_size: 48,
            folder_library: "imageres.dll".to_string(),
            folder_index: 2,
            file_library: "shell32.dll".to_string(),
            file_index: 1,
        }
    }
}

impl ShellMetaConfig {
    /// Load configuration from the per-user config file
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::info!("Configuration loaded from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Save configuration to the per-user config file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "ShellMeta", "ShellMeta")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ShellMetaConfig = toml::from_str(
            r#"
            [cache]
            policy = "lru"
            capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.policy, CachePolicy::Lru);
        assert_eq!(config.cache.capacity, 16);
        assert_eq!(config.icons, IconsConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ShellMetaConfig::default();
        config.icons.default_size = 256;
        config.save_to(&path).unwrap();

        assert_eq!(ShellMetaConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShellMetaConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ShellMetaConfig::default());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let parsed: Result<ShellMetaConfig, _> = toml::from_str("[cache]\npolicy = \"fifo\"\n");
        assert!(parsed.is_err());
    }
}
