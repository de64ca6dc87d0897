use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the listings service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Admin surface configuration
    #[serde(default)]
    pub admin: AdminConfig,
    /// Media host configuration (absent means inline uploads are rejected)
    pub media: Option<MediaConfig>,
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

/// Database configuration
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

/// API configuration
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
}

/// Admin surface configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Shared admin secret checked against the x-admin-key header.
    /// When unset the admin surface answers 503.
    pub secret: Option<String>,
}

/// Media host configuration (Cloudinary-compatible REST API)
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Account identifier in the media host URL space
    pub cloud_name: String,
    /// Admin API key
    pub api_key: String,
    /// Admin API secret
    pub api_secret: String,
    /// Unsigned upload preset name
    pub upload_preset: String,
    /// Base URL of the media host API
    #[serde(default = "default_media_api_base")]
    pub api_base_url: String,
    /// Hostname suffix of delivery URLs; other hosts yield no asset id
    #[serde(default = "default_delivery_host_suffix")]
    pub delivery_host_suffix: String,
    /// Folder uploads land in and the garbage collector sweeps
    #[serde(default = "default_media_folder")]
    pub folder: String,
    /// Page size for asset listing
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
    /// Batch size for bulk deletions
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

// Default value functions
fn default_service_name() -> String {
    "listings-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
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

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_media_api_base() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_delivery_host_suffix() -> String {
    "cloudinary.com".to_string()
}

fn default_media_folder() -> String {
    "listings".to_string()
}

fn default_list_page_size() -> u32 {
    500
}

fn default_delete_batch_size() -> usize {
    100
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "listings-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/listings").required(false))
            .add_source(config::File::with_name("/etc/listings/listings").required(false))
            // Override with environment variables
            // LISTINGS__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("LISTINGS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get database connection timeout as Duration
    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    /// Get database idle timeout as Duration
    pub fn db_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.database.idle_timeout_secs)
    }

    /// Hostname suffix recognized when deriving asset ids from delivery
    /// URLs, whether or not media credentials are configured
    pub fn delivery_host_suffix(&self) -> String {
        self.media
            .as_ref()
            .map(|media| media.delivery_host_suffix.clone())
            .unwrap_or_else(default_delivery_host_suffix)
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

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_api_port(), 8080);
        assert_eq!(default_media_folder(), "listings");
        assert_eq!(default_list_page_size(), 500);
        assert_eq!(default_delete_batch_size(), 100);
    }

    #[test]
    fn test_admin_config_defaults_to_unconfigured() {
        let admin = AdminConfig::default();
        assert!(admin.secret.is_none());
    }
}
