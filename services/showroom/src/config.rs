use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the showroom service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// API configuration
    pub api: ApiConfig,
    /// Document store configuration
    pub database: DatabaseConfig,
    /// Collection ids within the document store
    #[serde(default)]
    pub collections: CollectionsConfig,
    /// File storage configuration
    pub storage: StorageConfig,
    /// Media validation limits
    #[serde(default)]
    pub media: MediaConfig,
    /// Dashboard session configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum request body size (multipart uploads included)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Collection ids. A missing id makes every operation on that
/// collection fail instead of writing somewhere unexpected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionsConfig {
    pub products: Option<String>,
    pub portfolio: Option<String>,
    pub testimonials: Option<String>,
    pub hero_media: Option<String>,
    pub featured: Option<String>,
    pub company_info: Option<String>,
    pub team_members: Option<String>,
}

/// File storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket name for uploaded media
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Base URL that public media URLs are built on. The bucket name and
    /// file id are appended, so a URL can be parsed back into a file id.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Upload objects with the public-read canned ACL
    #[serde(default)]
    pub public_read: bool,
}

/// Media validation limits
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Maximum length of any media URL
    #[serde(default = "default_max_url_len")]
    pub max_url_len: usize,
    /// Time allowed for an external URL load test
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Maximum image upload size in bytes
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    /// Maximum video upload size in bytes
    #[serde(default = "default_max_video_bytes")]
    pub max_video_bytes: usize,
}

/// Dashboard session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Session token accepted for protected routes. When unset every
    /// protected route is rejected.
    pub admin_token: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "showroom".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    60 * 1024 * 1024 // 60MB
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_max_url_len() -> usize {
    512
}

fn default_probe_timeout_secs() -> u64 {
    8
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_video_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

fn default_session_cookie() -> String {
    "atelier_session".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "showroom")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .set_default("api.port", 8080)?
            // Add config file if present
            .add_source(config::File::with_name("config/showroom").required(false))
            .add_source(config::File::with_name("/etc/atelier/showroom").required(false))
            // Override with environment variables
            // SHOWROOM__STORAGE__BUCKET -> storage.bucket
            .add_source(
                config::Environment::with_prefix("SHOWROOM")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins"),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// Get pool acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get pool idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl MediaConfig {
    /// Get the URL load-test timeout as Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_url_len: default_max_url_len(),
            probe_timeout_secs: default_probe_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
            max_video_bytes: default_max_video_bytes(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            admin_token: None,
        }
    }
}
