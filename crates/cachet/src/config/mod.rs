//! Configuration types for cachet.

mod cache;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use cache::{BackendType, CacheConfig, RedisConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Serve every cache from the test-isolation simulator instead of its
    /// configured backend.
    #[serde(default)]
    pub sandbox: bool,

    pub caches: Vec<CacheConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.caches.is_empty() {
            anyhow::bail!("At least one cache must be configured under 'caches'");
        }

        let mut seen = HashSet::new();
        for cache in &self.caches {
            if cache.name.trim().is_empty() {
                anyhow::bail!("Cache names must not be empty");
            }
            if !seen.insert(cache.name.as_str()) {
                anyhow::bail!("Duplicate cache name: '{}'", cache.name);
            }
            if cache.backend == BackendType::Redis && cache.redis.is_none() {
                anyhow::bail!(
                    "Cache '{}' uses the redis backend but has no 'redis' section",
                    cache.name
                );
            }
            if cache.ttl_seconds == Some(0) {
                anyhow::bail!("Cache '{}': ttl_seconds must be greater than 0", cache.name);
            }
        }

        Ok(())
    }

    pub fn cache(&self, name: &str) -> Option<&CacheConfig> {
        self.caches.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config_with_defaults() {
        let file = write_config(
            r#"
caches:
  - name: sessions
    ttl_seconds: 300
  - name: documents
    backend: redis
    redis:
      url: redis://localhost:6379
"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.sandbox);
        assert_eq!(config.caches.len(), 2);

        let sessions = config.cache("sessions").unwrap();
        assert_eq!(sessions.backend, BackendType::Memory);
        assert_eq!(sessions.default_ttl(), Some(std::time::Duration::from_secs(300)));

        let redis = config.cache("documents").unwrap().redis.as_ref().unwrap();
        assert_eq!(redis.pool_size, 10);
        assert_eq!(redis.key_prefix, "cachet:");
    }

    #[test]
    fn test_sandbox_flag() {
        let file = write_config("sandbox: true\ncaches:\n  - name: a\n");
        assert!(Config::from_file(file.path()).unwrap().sandbox);
    }

    #[test]
    fn test_missing_file_fails() {
        let err = Config::from_file("/nonexistent/cachet.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_no_caches_fails() {
        let file = write_config("caches: []\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("At least one cache"));
    }

    #[test]
    fn test_duplicate_names_fail() {
        let file = write_config("caches:\n  - name: a\n  - name: a\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate cache name"));
    }

    #[test]
    fn test_redis_section_required() {
        let file = write_config("caches:\n  - name: a\n    backend: redis\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("no 'redis' section"));
    }

    #[test]
    fn test_unknown_backend_fails_to_parse() {
        let file = write_config("caches:\n  - name: a\n    backend: disk\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let file = write_config("caches:\n  - name: a\n    ttl_seconds: 0\n");
        assert!(Config::from_file(file.path()).is_err());
    }
}
