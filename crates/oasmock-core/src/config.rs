//! Project configuration for mock services

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service locations: directories holding one document per service,
    /// or individual OpenAPI files
    #[serde(default = "default_services")]
    pub services: Vec<PathBuf>,

    /// Sampler seed (random per run when absent)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Sampler limits
    #[serde(default)]
    pub sampler: SamplerConfig,
}

/// Limits applied by the default schema sampler.
///
/// ```toml
/// [sampler]
/// max_items = 3
/// max_string_len = 20
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Upper bound for generated arrays when the schema sets no `maxItems`
    #[serde(default = "default_max_items")]
    pub max_items: u32,

    /// Upper bound for generated strings when the schema sets no `maxLength`
    #[serde(default = "default_max_string_len")]
    pub max_string_len: u32,
}

fn default_services() -> Vec<PathBuf> {
    vec![PathBuf::from("__oasmock__")]
}

const fn default_max_items() -> u32 {
    3
}

const fn default_max_string_len() -> u32 {
    20
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_string_len: default_max_string_len(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: default_services(),
            seed: None,
            sampler: SamplerConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from default location (.oasmock.toml)
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load the first default-named config file inside `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".oasmock.toml", ".oasmock.json", "oasmock.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# oasmock configuration

# Service locations: each directory holds one OpenAPI document per service
# (file name = service name), or list individual files
services = ["__oasmock__"]

# Fixed sampler seed for reproducible bodies (random per run when unset)
# seed = 42

# Default sampler limits
[sampler]
max_items = 3
max_string_len = 20
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.services, vec![PathBuf::from("__oasmock__")]);
        assert_eq!(config.seed, None);
        assert_eq!(config.sampler.max_items, 3);
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
services = ["mocks", "extra/petstore.yaml"]
seed = 7

[sampler]
max_items = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.services,
            vec![PathBuf::from("mocks"), PathBuf::from("extra/petstore.yaml")]
        );
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.sampler.max_items, 5);
        assert_eq!(config.sampler.max_string_len, 20);
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.services, vec![PathBuf::from("__oasmock__")]);
        assert_eq!(config.sampler, SamplerConfig::default());
    }

    #[test]
    fn example_config_parses() {
        let config: Config = toml::from_str(Config::example()).unwrap();
        assert_eq!(config.services, vec![PathBuf::from("__oasmock__")]);
    }

    #[test]
    fn load_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".oasmock.json");
        std::fs::write(&path, r#"{"services": ["specs"], "seed": 1}"#).unwrap();

        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.services, vec![PathBuf::from("specs")]);
        assert_eq!(config.seed, Some(1));
    }

    #[test]
    fn load_missing_dir_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.seed, None);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oasmock.toml");
        std::fs::write(&path, "services = 12").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
