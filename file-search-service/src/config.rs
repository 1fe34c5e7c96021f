use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Environment variable holding the API credential
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable selecting the model identifier
pub const MODEL_VAR: &str = "USE_MODEL";
/// Environment variable naming the file search store
pub const STORE_VAR: &str = "FILE_SEARCH_STORE";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "default_gemini")]
    pub gemini: GeminiConfig,

    #[serde(default = "default_polling")]
    pub polling: PollingConfig,

    #[serde(default = "default_batch")]
    pub batch: BatchConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Local storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory for the per-upload temporary files. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

/// Remote File Search API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_store_display_name")]
    pub store_display_name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Operation polling schedule
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Give up on an operation after this long
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Emit a progress event every this many seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// First sleep between polls
    #[serde(default = "default_initial_wait_secs")]
    pub initial_wait_secs: u64,

    /// Sleep cap; the wait doubles until it reaches this
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn initial_wait(&self) -> Duration {
        Duration::from_secs(self.initial_wait_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        default_polling()
    }
}

/// Batch upload configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        default_batch()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: StorageConfig::default(),
            gemini: default_gemini(),
            polling: default_polling(),
            batch: default_batch(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config.*`, `FILE_SEARCH__*` variables and the
    /// conventional `GEMINI_API_KEY` / `USE_MODEL` / `FILE_SEARCH_STORE` variables.
    pub fn load() -> ServiceResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("FILE_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder, |key| std::env::var(key).ok())
    }

    /// Finish loading from a prepared builder, applying the conventional variables
    /// through `lookup`.
    pub fn from_builder(
        builder: ConfigBuilder<DefaultState>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ServiceResult<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config: AppConfig = builder
            .set_override_option("gemini.api_key", non_empty(API_KEY_VAR))
            .and_then(|b| b.set_override_option("gemini.model", non_empty(MODEL_VAR)))
            .and_then(|b| {
                b.set_override_option("gemini.store_display_name", non_empty(STORE_VAR))
            })
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to apply environment overrides: {}", e),
            })?
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Presence checks only; the remote API is the authority on validity.
    pub fn validate(&self) -> ServiceResult<()> {
        let required = [
            (API_KEY_VAR, &self.gemini.api_key),
            (MODEL_VAR, &self.gemini.model),
            (STORE_VAR, &self.gemini.store_display_name),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ServiceError::Config {
                    message: format!("Set {} in your environment before running the service", name),
                });
            }
        }

        if self.batch.max_concurrent == 0 {
            return Err(ServiceError::Config {
                message: "batch.max_concurrent must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
        max_upload_bytes: default_max_upload_bytes(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_gemini() -> GeminiConfig {
    GeminiConfig {
        api_key: String::new(),
        model: default_model(),
        store_display_name: default_store_display_name(),
        base_url: default_base_url(),
        upload_base_url: default_upload_base_url(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_store_display_name() -> String {
    "demo_filesearch_store".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_upload_base_url() -> String {
    "https://generativelanguage.googleapis.com/upload/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_polling() -> PollingConfig {
    PollingConfig {
        timeout_secs: default_timeout_secs(),
        report_interval_secs: default_report_interval_secs(),
        initial_wait_secs: default_initial_wait_secs(),
        max_wait_secs: default_max_wait_secs(),
    }
}

fn default_timeout_secs() -> u64 {
    15 * 60
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_initial_wait_secs() -> u64 {
    2
}

fn default_max_wait_secs() -> u64 {
    32
}

fn default_batch() -> BatchConfig {
    BatchConfig {
        max_concurrent: default_max_concurrent(),
        skip_duplicates: default_skip_duplicates(),
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_skip_duplicates() -> bool {
    true
}
