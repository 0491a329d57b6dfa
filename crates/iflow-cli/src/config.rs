//! Application configuration: optional TOML file, then environment overrides.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use iflow_core::IsolationGranularity;
use iflow_graph::GraphConfig;

pub const DEFAULT_CONFIG_FILE: &str = "iflow-kg.toml";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub neo4j: GraphConfig,
    pub upload: UploadConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted archive, also applied to the total uncompressed size.
    pub max_bytes: u64,
    /// `upload` or `folder`.
    pub isolation: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            isolation: IsolationGranularity::PerUpload.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Load `path` (or `iflow-kg.toml` in the working directory when present),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(p) => {
                let text = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Invalid config file {}", p.display()))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `NEO4J_*` and `IFLOW_*` variables looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(uri) = get("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(user) = get("NEO4J_USER").or_else(|| get("NEO4J_USERNAME")) {
            self.neo4j.user = user;
        }
        if let Some(password) = get("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Some(database) = get("NEO4J_DATABASE") {
            self.neo4j.database = database;
        }
        if let Some(bytes) = get("IFLOW_MAX_UPLOAD_BYTES") {
            self.upload.max_bytes = parse_number("IFLOW_MAX_UPLOAD_BYTES", &bytes)?;
        }
        if let Some(secs) = get("IFLOW_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_number("IFLOW_STORE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(isolation) = get("IFLOW_ISOLATION") {
            self.upload.isolation = isolation;
        }
        Ok(())
    }

    pub fn granularity(&self) -> IsolationGranularity {
        IsolationGranularity::from_str(&self.upload.isolation)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs.max(1))
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => bail!("{name} must be a positive integer, got '{value}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.upload.max_bytes, 100 * 1024 * 1024);
        assert_eq!(config.store_timeout(), Duration::from_secs(30));
        assert_eq!(config.granularity(), IsolationGranularity::PerUpload);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [neo4j]
            uri = "bolt://graph:7687"

            [upload]
            isolation = "folder"
            "#,
        )
        .unwrap();
        assert_eq!(config.neo4j.uri, "bolt://graph:7687");
        assert_eq!(config.neo4j.database, "neo4j");
        assert_eq!(config.granularity(), IsolationGranularity::PerTopLevelFolder);
        assert_eq!(config.store.timeout_secs, DEFAULT_STORE_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = AppConfig::from_toml("[neo4j]\nuser = \"file-user\"\n").unwrap();
        config
            .apply_overrides(env(&[
                ("NEO4J_USERNAME", "env-user"),
                ("NEO4J_PASSWORD", "secret"),
                ("IFLOW_STORE_TIMEOUT_SECS", "5"),
                ("NEO4J_DATABASE", "  "),
            ]))
            .unwrap();
        assert_eq!(config.neo4j.user, "env-user");
        assert_eq!(config.neo4j.password, "secret");
        assert_eq!(config.neo4j.database, "neo4j");
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_neo4j_user_wins_over_username() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[("NEO4J_USER", "a"), ("NEO4J_USERNAME", "b")]))
            .unwrap();
        assert_eq!(config.neo4j.user, "a");
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("IFLOW_MAX_UPLOAD_BYTES", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("IFLOW_MAX_UPLOAD_BYTES"));
    }
}
