// src/server/config.rs
//! Configuration file parsing for a package repository
//!
//! Supports TOML configuration files with the following sections:
//! - [repository] - Root directory, default publisher
//! - [digest] - Extra emitted and ranked hash attributes
//! - [updatelog] - Update log retention

use crate::digest::{DigestSection, HashKind, HashPolicy};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct RepositoryConfig {
    /// Repository settings
    #[serde(default)]
    pub repository: RepositorySection,

    /// Hash attribute policy
    #[serde(default)]
    pub digest: DigestSection,

    /// Update log settings
    #[serde(default)]
    pub updatelog: UpdateLogSection,
}

/// Repository configuration section
#[derive(Debug, Deserialize)]
pub struct RepositorySection {
    /// Root directory holding catalog, manifests, payloads and transactions
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Publisher applied to FMRIs that name none
    #[serde(default)]
    pub publisher: Option<String>,
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            root: default_root(),
            publisher: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/pkg/repo")
}

/// Update log configuration section
#[derive(Debug, Deserialize)]
pub struct UpdateLogSection {
    /// Number of hourly log files kept (two weeks by default)
    #[serde(default = "default_maxfiles")]
    pub maxfiles: usize,
}

impl Default for UpdateLogSection {
    fn default() -> Self {
        Self {
            maxfiles: default_maxfiles(),
        }
    }
}

fn default_maxfiles() -> usize {
    336
}

impl RepositoryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RepositoryConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.repository.root = root.into();
        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.repository.root.as_os_str().is_empty() {
            anyhow::bail!("repository.root must not be empty");
        }

        if let Some(publisher) = &self.repository.publisher
            && (publisher.is_empty() || publisher.contains('/'))
        {
            anyhow::bail!("repository.publisher is not a valid publisher name: '{}'", publisher);
        }

        if self.updatelog.maxfiles == 0 {
            anyhow::bail!("updatelog.maxfiles must be at least 1");
        }

        // Every configured attribute has to name an algorithm we can compute
        let policy = self.hash_policy();
        for attr in self
            .digest
            .hash_attrs
            .iter()
            .chain(&self.digest.ranked_hash_attrs)
        {
            if policy.algorithm_for(HashKind::Hash, attr).is_none() {
                anyhow::bail!("digest: unsupported hash attribute '{}'", attr);
            }
        }
        for name in &self.digest.ranked_content_hash_types {
            if policy.algorithm_for(HashKind::ContentHash, name).is_none() {
                anyhow::bail!("digest: unsupported content hash type '{}'", name);
            }
        }

        Ok(())
    }

    /// Hash policy described by the `[digest]` section
    pub fn hash_policy(&self) -> HashPolicy {
        HashPolicy::from_config(&self.digest)
    }

    /// Get the repository root directory
    pub fn root(&self) -> &Path {
        &self.repository.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepositoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.root(), Path::new("/var/pkg/repo"));
        assert_eq!(config.updatelog.maxfiles, 336);
        assert!(config.repository.publisher.is_none());
        assert_eq!(config.hash_policy(), HashPolicy::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[repository]
root = "/srv/repo"
publisher = "example.com"

[digest]
hash_attrs = ["pkg.hash.sha256"]

[updatelog]
maxfiles = 48
"#;
        let config: RepositoryConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.root(), Path::new("/srv/repo"));
        assert_eq!(config.repository.publisher.as_deref(), Some("example.com"));
        assert_eq!(config.updatelog.maxfiles, 48);

        let policy = config.hash_policy();
        assert!(policy.defaults(HashKind::Hash).contains(&"pkg.hash.sha256".to_string()));
        assert_eq!(policy.ranked(HashKind::Hash)[0], "pkg.hash.sha256");
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("repo.toml");
        std::fs::write(&path, "[repository]\nroot = \"/tmp/r\"\n").unwrap();
        let config = RepositoryConfig::load(&path).unwrap();
        assert_eq!(config.root(), Path::new("/tmp/r"));

        assert!(RepositoryConfig::load(&temp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_invalid_maxfiles() {
        let toml_str = r#"
[updatelog]
maxfiles = 0
"#;
        let config: RepositoryConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_hash_attr() {
        let toml_str = r#"
[digest]
hash_attrs = ["pkg.hash.md5"]
"#;
        let config: RepositoryConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_publisher() {
        let toml_str = r#"
[repository]
publisher = "a/b"
"#;
        let config: RepositoryConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
