use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Generative backend configuration: one shared API surface, several
/// interchangeable models (the fallback chain, in order) and several API
/// keys (the credential pool).
#[derive(Clone, Debug, Deserialize)]
pub struct GenerationConfig {
    pub api_base: String,
    pub api_keys: Vec<String>,
    /// Ordered fallback chain; the first model is tried first.
    pub models: Vec<String>,
    /// Per-credential steady-state budget. Burst capacity is twice this.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Per-credential max concurrent calls, independent of rate.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Binary resumes up to this many bytes are embedded inline; larger ones
    /// go through the backend's file store.
    #[serde(default = "default_inline_attachment_limit")]
    pub inline_attachment_limit: usize,
}

/// Scholarly-works directory (institution resolution + works search).
#[derive(Clone, Debug, Deserialize)]
pub struct DirectoryConfig {
    pub api_base: String,
    /// Contact address sent with directory queries, as the polite-pool
    /// convention asks.
    #[serde(default)]
    pub mailto: Option<String>,
}

/// Mail provider HTTP API plus the OAuth token endpoint used for refreshes.
#[derive(Clone, Debug, Deserialize)]
pub struct MailConfig {
    pub api_base: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Resume storage service (path -> signed URL resolution).
#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub api_base: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// How many pending records one sweep claims at most.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_send_interval_secs")]
    pub send_interval_secs: u64,
    #[serde(default = "default_reply_sweep_interval_secs")]
    pub reply_sweep_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            send_interval_secs: default_send_interval_secs(),
            reply_sweep_interval_secs: default_reply_sweep_interval_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL the tracking-pixel links point back at.
    pub tracking_base_url: String,
    pub generation: GenerationConfig,
    pub directory: DirectoryConfig,
    pub mail: MailConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_max_in_flight() -> usize {
    3
}

fn default_inline_attachment_limit() -> usize {
    // Past this the backend wants the file-store path anyway.
    15 * 1024 * 1024
}

fn default_batch_size() -> u64 {
    10
}

fn default_send_interval_secs() -> u64 {
    300
}

fn default_reply_sweep_interval_secs() -> u64 {
    3600
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.api_keys.is_empty() {
            return Err(ConfigError::Validation(
                "generation.api_keys must not be empty".into(),
            ));
        }
        if self.generation.models.is_empty() {
            return Err(ConfigError::Validation(
                "generation.models must not be empty".into(),
            ));
        }
        if self.generation.requests_per_minute == 0 {
            return Err(ConfigError::Validation(
                "generation.requests_per_minute must be > 0".into(),
            ));
        }
        if self.generation.max_in_flight == 0 {
            return Err(ConfigError::Validation(
                "generation.max_in_flight must be > 0".into(),
            ));
        }
        if self.tracking_base_url.is_empty() {
            return Err(ConfigError::Validation(
                "tracking_base_url must be set".into(),
            ));
        }
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::Validation(
                "pipeline.batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `GENERATION__REQUESTS_PER_MINUTE`)
/// overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
