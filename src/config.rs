//! Configuration file parsing (`fake.toml`).
//!
//! Every section is optional. Values from the file are overridden by
//! `FAKE_*` environment variables, which are in turn overridden by CLI flags.

use crate::error::{BuildError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CONFIG_FILE: &str = "fake.toml";
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2/";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct FakeConfig {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BuildConfig {
    pub rule_file: String,
    pub parallel: Option<usize>,
    pub rebuild_if_definitions_changed: bool,
    pub compiler: String,
    pub source_extension: String,
    pub output_extension: String,
    pub build_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            rule_file: "Fakefile".to_string(),
            parallel: None,
            rebuild_if_definitions_changed: true,
            compiler: "javac".to_string(),
            source_extension: "java".to_string(),
            output_extension: "class".to_string(),
            build_dir: "build".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub local_repository: Option<PathBuf>,
    pub repositories: Vec<String>,
    pub offline: bool,
    pub download: bool,
    pub update_interval_minutes: u64,
    pub project_roots: Vec<PathBuf>,
    pub fallback_versions: BTreeMap<String, String>,
    pub active_profiles: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
    pub properties: BTreeMap<String, String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let mut fallback_versions = BTreeMap::new();
        fallback_versions.insert("scifio".to_string(), "4.4-SNAPSHOT".to_string());
        fallback_versions.insert("jai_imageio".to_string(), "4.4-SNAPSHOT".to_string());
        let active_profiles = if cfg!(target_os = "macos") {
            Vec::new()
        } else {
            vec!["javac".to_string()]
        };
        Self {
            local_repository: None,
            repositories: vec![MAVEN_CENTRAL.to_string()],
            offline: false,
            download: true,
            update_interval_minutes: 24 * 60,
            project_roots: Vec::new(),
            fallback_versions,
            active_profiles,
            system_properties: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl ResolverConfig {
    /// Local repository root, `~/.m2/repository` unless configured.
    pub fn local_repository(&self) -> PathBuf {
        if let Some(path) = &self.local_repository {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".m2")
            .join("repository")
    }

    pub fn update_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.update_interval_minutes * 60)
    }
}

impl FakeConfig {
    /// Loads `fake.toml` from `dir` if present, then applies environment overrides.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BuildError::Config(e.to_string()))
    }

    /// Applies `FAKE_OFFLINE`, `FAKE_UPDATE_INTERVAL` and `FAKE_REPOSITORIES`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("FAKE_OFFLINE") {
            self.resolver.offline = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Some(value) = lookup("FAKE_UPDATE_INTERVAL") {
            match value.trim().parse::<u64>() {
                Ok(minutes) => self.resolver.update_interval_minutes = minutes,
                Err(_) => warn!("ignoring invalid update interval: {}", value),
            }
        }
        if lookup("FAKE_REPOSITORIES").as_deref() == Some("ignore") {
            self.resolver.repositories.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FakeConfig::default();
        assert_eq!(config.build.rule_file, "Fakefile");
        assert_eq!(config.resolver.update_interval_minutes, 1440);
        assert_eq!(config.resolver.repositories, vec![MAVEN_CENTRAL.to_string()]);
        assert!(!config.resolver.offline);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FakeConfig::parse(
            r#"
[build]
parallel = 4
compiler = "mock"

[resolver]
offline = true
repositories = ["file:///tmp/repo/"]
"#,
        )
        .unwrap();
        assert_eq!(config.build.parallel, Some(4));
        assert_eq!(config.build.compiler, "mock");
        assert_eq!(config.build.source_extension, "java");
        assert!(config.resolver.offline);
        assert_eq!(config.resolver.repositories.len(), 1);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FakeConfig::default();
        config.apply_env(|key| match key {
            "FAKE_OFFLINE" => Some("true".into()),
            "FAKE_UPDATE_INTERVAL" => Some("15".into()),
            "FAKE_REPOSITORIES" => Some("ignore".into()),
            _ => None,
        });
        assert!(config.resolver.offline);
        assert_eq!(config.resolver.update_interval_minutes, 15);
        assert!(config.resolver.repositories.is_empty());
    }

    #[test]
    fn test_invalid_interval_is_ignored() {
        let mut config = FakeConfig::default();
        config.apply_env(|key| (key == "FAKE_UPDATE_INTERVAL").then(|| "soon".to_string()));
        assert_eq!(config.resolver.update_interval_minutes, 1440);
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            FakeConfig::parse("[build\n"),
            Err(BuildError::Config(_))
        ));
    }
}
