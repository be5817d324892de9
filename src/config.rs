use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the clipcast service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hosted transcription model settings
    pub transcription: TranscriptionConfig,

    /// Render and encode settings
    pub render: RenderConfig,

    /// Durable storage settings
    pub storage: StorageConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Performance and resource settings
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of the prediction API
    pub api_url: String,

    /// Model endpoint in `owner/name:version` form
    pub endpoint: Option<String>,

    /// API token for the prediction service
    pub api_token: Option<String>,

    /// Maximum attempts for a failed transcription
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub backoff_base_ms: u64,

    /// Backoff multiplier applied per attempt
    pub backoff_factor: u32,

    /// Connection timeout for API calls (seconds)
    pub connection_timeout: u64,

    /// Overall deadline for one model invocation (seconds)
    pub request_timeout: u64,

    /// Poll interval while a prediction is running (milliseconds)
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// ffmpeg executable
    pub ffmpeg_path: String,

    /// ffprobe executable
    pub ffprobe_path: String,

    /// Caption font file written into the engine working area
    pub font_path: PathBuf,

    /// x264 encoder preset
    pub x264_preset: String,

    /// Encode timeout (seconds)
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket receiving rendered videos
    pub bucket: String,

    /// Storage API base URL
    pub api_base: String,

    /// Public URL base for uploaded objects
    pub public_base: String,

    /// Bearer token for the storage API
    pub auth_token: Option<String>,

    /// Cache-control metadata applied to uploads
    pub cache_control: String,

    /// Upload timeout (seconds)
    pub upload_timeout: u64,

    /// Local directory store; overrides the cloud bucket when set
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub port: u16,

    /// Render function URL used by the forwarding route
    pub render_function_url: String,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum concurrent server-side renders
    pub max_concurrent_renders: usize,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "clipcast.toml",
            "config/clipcast.toml",
            "~/.config/clipcast/config.toml",
            "/etc/clipcast/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Ok(Self::default().with_env_overrides())
    }

    /// Apply environment-variable overrides
    ///
    /// Service credentials are usually injected through the environment
    /// rather than checked into a config file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("REPLICATE_API_TOKEN") {
            self.transcription.api_token = Some(token);
        }

        if let Ok(endpoint) = std::env::var("REPLICATE_ENDPOINT") {
            self.transcription.endpoint = Some(endpoint);
        }

        if let Ok(token) = std::env::var("CLIPCAST_STORAGE_TOKEN") {
            self.storage.auth_token = Some(token);
        }

        if let Ok(bucket) = std::env::var("CLIPCAST_BUCKET") {
            self.storage.bucket = bucket;
        }

        if let Ok(port) = std::env::var("CLIPCAST_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(url) = std::env::var("CLIPCAST_RENDER_FUNCTION_URL") {
            self.server.render_function_url = url;
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.transcription.endpoint {
            let well_formed = endpoint
                .split_once(':')
                .and_then(|(path, version)| {
                    path.split_once('/').map(|(owner, name)| {
                        !owner.is_empty() && !name.is_empty() && !version.is_empty()
                    })
                })
                .unwrap_or(false);
            if !well_formed {
                return Err(anyhow!(
                    "Invalid transcription endpoint '{}'. Expected owner/name:version",
                    endpoint
                ));
            }
        }

        if self.transcription.max_retries == 0 {
            return Err(anyhow!("max_retries must be greater than 0"));
        }

        if self.transcription.backoff_factor < 2 {
            return Err(anyhow!("backoff_factor must be at least 2"));
        }

        if self.performance.max_concurrent_renders == 0 {
            return Err(anyhow!("max_concurrent_renders must be greater than 0"));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than 0"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Clipcast Configuration:\n\
            - Transcription API: {}\n\
            - Model Endpoint: {}\n\
            - Storage Bucket: {}\n\
            - Server Port: {}\n\
            - Max Concurrent Renders: {}\n\
            - Font: {}",
            self.transcription.api_url,
            self.transcription.endpoint.as_deref().unwrap_or("(unset)"),
            self.storage.bucket,
            self.server.port,
            self.performance.max_concurrent_renders,
            self.render.font_path.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcription: TranscriptionConfig::default(),
            render: RenderConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.replicate.com/v1".to_string(),
            endpoint: None,
            api_token: None,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_factor: 2,
            connection_timeout: 30,
            request_timeout: 600, // 10 minutes for long audio
            poll_interval_ms: 2000,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            font_path: PathBuf::from("assets/fonts/Arial.ttf"),
            x264_preset: "ultrafast".to_string(),
            timeout: 600, // 10 minutes per encode
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "clipcast-videos".to_string(),
            api_base: "https://storage.googleapis.com".to_string(),
            public_base: "https://storage.googleapis.com".to_string(),
            auth_token: None,
            cache_control: "public, max-age=31536000".to_string(),
            upload_timeout: 300,
            local_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            render_function_url: "http://127.0.0.1:8080/render".to_string(),
            max_upload_bytes: 50 * 1024 * 1024, // 50MB uploads
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: num_cpus::get().min(4),
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.config.transcription.api_token = Some(token.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.transcription.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.transcription.max_retries = max_retries;
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = bucket.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_font_path(mut self, path: PathBuf) -> Self {
        self.config.render.font_path = path;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transcription.max_retries, 3);
        assert_eq!(config.transcription.backoff_factor, 2);
        assert_eq!(config.render.x264_preset, "ultrafast");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_api_token("r8_test")
            .with_endpoint("acme/whisper:v1")
            .with_bucket("my-videos")
            .with_port(9000)
            .build();

        assert_eq!(config.transcription.api_token.as_deref(), Some("r8_test"));
        assert_eq!(config.storage.bucket, "my-videos");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let bad_endpoint = ConfigBuilder::new().with_endpoint("not-a-model").build();
        assert!(bad_endpoint.validate().is_err());

        let no_retries = ConfigBuilder::new().with_max_retries(0).build();
        assert!(no_retries.validate().is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.storage.bucket, config.storage.bucket);
    }
}
