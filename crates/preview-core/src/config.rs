use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// `common` config section: node identity and defaults shared across
/// collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

fn default_node_id() -> String {
    "node-1".to_string()
}

fn default_base_path() -> PathBuf {
    PathBuf::from("/tmp/preview")
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            base_path: default_base_path(),
        }
    }
}

/// `http` config section: the bind address for the (externally implemented)
/// HTTP surface. Carried through so a real HTTP layer can read it from the
/// same document; the core never binds a socket itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_listen")]
    pub listen: String,
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
        }
    }
}

/// `storage` config section: in-memory vs sled-backed durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the sled-backed durable backend.
    pub sled_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sled_path: None,
        }
    }
}

/// Shared shape for a render-agent config section (`imageMagickRenderAgent`,
/// `documentRenderAgent`): spec §6 "Each agent section carries `enabled:
/// bool`, `count: int`, and agent-specific fields."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderAgentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_max_work_increase")]
    pub max_work_increase: usize,
    /// Per-invocation timeout for the external converter (spec §5 "add a
    /// per-kind timeout").
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Path to the external tool binary (`convert` or `soffice`).
    #[serde(default = "default_tool_path")]
    pub tool_path: String,
}

fn default_count() -> usize {
    1
}

fn default_max_work_increase() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_tool_path() -> String {
    String::new()
}

impl Default for RenderAgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            count: default_count(),
            max_work_increase: default_max_work_increase(),
            timeout_secs: default_timeout_secs(),
            tool_path: default_tool_path(),
        }
    }
}

/// `simpleApi` config section: limits for the text-payload ingest route
/// (external collaborator — these just carry the bounds it would read).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleApiConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

impl Default for SimpleApiConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

/// `assetApi` config section: TTL and signing defaults for the asset-serving
/// route (external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetApiConfig {
    #[serde(default = "default_signature_ttl_secs")]
    pub signature_ttl_secs: i64,
    #[serde(default = "default_signing_key")]
    pub signing_key: String,
}

fn default_signature_ttl_secs() -> i64 {
    300
}

fn default_signing_key() -> String {
    "foo".to_string()
}

impl Default for AssetApiConfig {
    fn default() -> Self {
        Self {
            signature_ttl_secs: default_signature_ttl_secs(),
            signing_key: default_signing_key(),
        }
    }
}

/// `uploader` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    #[serde(default = "default_asset_root")]
    pub local_asset_root: PathBuf,
    #[serde(default)]
    pub s3_buckets: Vec<String>,
    #[serde(default)]
    pub s3_endpoints: Vec<String>,
}

fn default_asset_root() -> PathBuf {
    PathBuf::from("/tmp/preview/assets")
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            local_asset_root: default_asset_root(),
            s3_buckets: Vec::new(),
            s3_endpoints: Vec::new(),
        }
    }
}

/// `downloader` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_local_storage_root")]
    pub local_storage_root: PathBuf,
    #[serde(default)]
    pub tram_enabled: bool,
    #[serde(default)]
    pub tram_hosts: Vec<String>,
}

fn default_local_storage_root() -> PathBuf {
    PathBuf::from("/tmp/preview/local")
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            local_storage_root: default_local_storage_root(),
            tram_enabled: false,
            tram_hosts: Vec::new(),
        }
    }
}

/// Top-level configuration document (spec §6 "Config"). Sections mirror the
/// original JSON document; field names are snake_case Rust convention with
/// `#[serde(rename)]` where the wire form differs, so both TOML and the
/// spec's documented JSON sections parse via the `config` crate's format
/// auto-detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(rename = "imageMagickRenderAgent", default)]
    pub image_magick_render_agent: RenderAgentConfig,
    #[serde(rename = "documentRenderAgent", default)]
    pub document_render_agent: RenderAgentConfig,
    #[serde(rename = "simpleApi", default)]
    pub simple_api: SimpleApiConfig,
    #[serde(rename = "assetApi", default)]
    pub asset_api: AssetApiConfig,
    #[serde(default)]
    pub uploader: UploaderConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
}

impl AppConfig {
    /// Parse a config document from its text content (TOML or JSON, format
    /// auto-detected by the `config` crate).
    pub fn from_str(content: &str, format: config::FileFormat) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, format))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Load configuration, preferring an explicit path, then `./config.toml`,
    /// then built-in defaults.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Self {
        if let Some(path) = explicit_path
            && let Ok(config) = Self::from_file(path)
        {
            return config;
        }

        let local_config = std::path::PathBuf::from("config.toml");
        if local_config.exists()
            && let Ok(config) = Self::from_file(&local_config)
        {
            return config;
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let format = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            config::FileFormat::Json
        } else {
            config::FileFormat::Toml
        };
        Self::from_str(&content, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert!(!config.image_magick_render_agent.enabled);
        assert_eq!(config.asset_api.signature_ttl_secs, 300);
    }

    #[test]
    fn parses_toml_with_camel_case_sections() {
        let toml = r#"
            [imageMagickRenderAgent]
            enabled = true
            count = 4
        "#;
        let config = AppConfig::from_str(toml, config::FileFormat::Toml).unwrap();
        assert!(config.image_magick_render_agent.enabled);
        assert_eq!(config.image_magick_render_agent.count, 4);
    }

    #[test]
    fn parses_json_document() {
        let json = r#"{"documentRenderAgent": {"enabled": true, "count": 2}}"#;
        let config = AppConfig::from_str(json, config::FileFormat::Json).unwrap();
        assert!(config.document_render_agent.enabled);
        assert_eq!(config.document_render_agent.count, 2);
    }
}
