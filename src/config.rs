//! Configuration Management
//!
//! [`ClientConfig`] is everything a [`Client`](crate::Client) is built from.
//! [`ConfigFile`] is the serializable subset of it, read from JSON or YAML.

use crate::client::auth::{AuthConfig, Authorization};
use crate::client::executor::DEFAULT_MAX_RETRIES;
use crate::client::http::HttpTransport;
use crate::client::middleware::{CacheStrategy, CachingTransport, Logger, LoggingTransport, MemoryCacheStrategy};
use crate::client::transport::Transport;
use crate::error::{Error, Result};
use crate::resource::{ResourceDef, ResourceSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parameters for building the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportParams {
    /// Base every relative request URI is resolved against
    #[serde(default)]
    pub base_uri: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Per-request timeout, `timeout` is accepted as well
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
    /// Headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Wrap the default transport in the caching middleware
    #[serde(default)]
    pub cache: bool,
    /// Wrap the default transport in the logging middleware
    #[serde(default)]
    pub log: bool,
    /// Keys this crate does not know, kept so custom transport factories can read them
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Builds a transport from the params
pub type TransportFactory = Box<dyn FnOnce(&TransportParams) -> Result<Arc<dyn Transport>> + Send>;

/// A caller-supplied transport
pub enum CustomTransport {
    /// Used as is, the `cache`/`log` params don't apply to it
    Instance(Arc<dyn Transport>),
    /// Invoked once with the params while the client is built
    Factory(TransportFactory),
}

/// Everything a client is built from
pub struct ClientConfig {
    pub resources: HashMap<String, ResourceSource>,
    pub custom: Option<CustomTransport>,
    pub params: TransportParams,
    pub logger: Option<Logger>,
    pub cache_strategy: Option<Arc<dyn CacheStrategy>>,
    pub authorization: Option<Arc<dyn Authorization>>,
    pub max_retries: u32,
    pub retry_non_idempotent: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resources: HashMap::new(),
            custom: None,
            params: TransportParams::default(),
            logger: None,
            cache_strategy: None,
            authorization: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_non_idempotent: true,
        }
    }
}

impl ClientConfig {
    /// Resolve the transport, following the rules:
    /// - a custom instance is passed through
    /// - a custom factory is invoked with the params
    /// - otherwise the default HTTP transport is built, wrapped in the
    ///   caching and logging middleware when `cache`/`log` are set
    pub(crate) fn build_transport(&mut self) -> Result<Arc<dyn Transport>> {
        match self.custom.take() {
            Some(CustomTransport::Instance(transport)) => Ok(transport),
            Some(CustomTransport::Factory(factory)) => factory(&self.params),
            None => {
                let http = HttpTransport::from_params(&self.params)?;
                let base_uri = http.base_uri().cloned();
                let mut transport: Arc<dyn Transport> = Arc::new(http);

                if self.params.cache {
                    let strategy = self
                        .cache_strategy
                        .clone()
                        .unwrap_or_else(|| Arc::new(MemoryCacheStrategy::new()) as Arc<dyn CacheStrategy>);
                    transport = Arc::new(CachingTransport::new(transport, strategy));
                }

                if self.params.log {
                    let logger = self.logger.unwrap_or_default();
                    transport = Arc::new(LoggingTransport::new(transport, logger).with_base_uri(base_uri));
                }

                Ok(transport)
            },
        }
    }
}

/// Client configuration as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
    #[serde(default)]
    pub params: TransportParams,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl ConfigFile {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("restkit").join("config.json"))
    }

    /// Load a config file; `.yaml`/`.yml` files are read as YAML, anything else as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(format!("Invalid YAML config: {}", e)))
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))
    }

    pub fn into_client_config(self) -> ClientConfig {
        ClientConfig {
            resources: self
                .resources
                .into_iter()
                .map(|(name, def)| (name, ResourceSource::Definition(def)))
                .collect(),
            params: self.params,
            authorization: self.auth.map(AuthConfig::into_provider),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            ..ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    const JSON_CONFIG: &str = r#"{
        "resources": {
            "pokemons": {
                "base_uri": "pokemons",
                "actions": {
                    "get": {"method": "GET", "path": "/{0}"}
                }
            }
        },
        "params": {"base_uri": "https://pokeapi.example/", "cache": true},
        "max_retries": 5,
        "auth": {"bearer": "tok"}
    }"#;

    #[test]
    fn test_parse_json_config() {
        let file = ConfigFile::from_json(JSON_CONFIG).unwrap();
        assert_eq!(file.max_retries, Some(5));
        assert!(file.params.cache);
        assert!(!file.params.log);
        assert_eq!(
            file.resources["pokemons"].actions["get"].method,
            Method::GET
        );

        let config = file.into_client_config();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.authorization.unwrap().header_value(), "Bearer tok");
        assert!(config.resources.contains_key("pokemons"));
    }

    #[test]
    fn test_parse_yaml_config() {
        let file = ConfigFile::from_yaml(
            r#"
resources:
  pokemons:
    base_uri: pokemons
    actions:
      attack:
        method: PATCH
        path: "/{0}/{1}/{2}"
params:
  log: true
"#,
        )
        .unwrap();

        assert!(file.params.log);
        assert_eq!(file.resources["pokemons"].actions["attack"].path, "/{0}/{1}/{2}");
        assert_eq!(file.into_client_config().max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        assert!(matches!(ConfigFile::from_json("{not json"), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let file = ConfigFile::from_json(JSON_CONFIG).unwrap();
        file.save(&path).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();

        assert_eq!(loaded.resources, file.resources);
        assert_eq!(loaded.params, file.params);
    }

    #[test]
    fn test_params_keep_unknown_keys() {
        let file = ConfigFile::from_json(
            r#"{"params": {"base_uri": "https://pokeapi.example/", "timeout": 5, "proxy": "socks5://localhost"}}"#,
        )
        .unwrap();

        assert_eq!(file.params.timeout_secs, Some(5));
        assert!(!file.params.extra.contains_key("timeout"));
        assert_eq!(
            file.params.extra.get("proxy"),
            Some(&serde_json::json!("socks5://localhost"))
        );
    }

    #[test]
    fn test_default_transport_with_middleware_builds() {
        let mut config = ClientConfig {
            params: TransportParams {
                base_uri: Some("https://pokeapi.example/".to_string()),
                cache: true,
                log: true,
                ..TransportParams::default()
            },
            ..ClientConfig::default()
        };
        assert!(config.build_transport().is_ok());
    }
}
