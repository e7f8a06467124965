//! API configuration.

/// Room for the non-file multipart fields on top of the upload itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Largest accepted upload
    pub max_file_size: usize,
    /// Prefix every route is mounted under, e.g. `/pptx2mp4`
    pub base_path: String,
    /// Environment (development/production)
    pub environment: String,
    /// Expose Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            max_file_size: 100 * 1024 * 1024, // 100MB
            base_path: "/pptx2mp4".to_string(),
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            max_file_size: std::env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_file_size),
            base_path: std::env::var("BASE_PATH")
                .map(|s| normalize_base_path(&s))
                .unwrap_or(defaults.base_path),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Request body limit: the upload plus its form fields.
    pub fn max_body_size(&self) -> usize {
        self.max_file_size.saturating_add(FORM_OVERHEAD_BYTES)
    }

    /// Route prefix of the versioned API, e.g. `/pptx2mp4/api/v1`.
    pub fn api_prefix(&self) -> String {
        format!("{}/api/v1", self.base_path)
    }
}

/// `pptx2mp4/` -> `/pptx2mp4`; an empty or `/` value mounts at the root.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path("/pptx2mp4"), "/pptx2mp4");
        assert_eq!(normalize_base_path("pptx2mp4/"), "/pptx2mp4");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path(""), "");
    }

    #[test]
    fn test_api_prefix() {
        let mut config = ApiConfig::default();
        assert_eq!(config.api_prefix(), "/pptx2mp4/api/v1");
        config.base_path = String::new();
        assert_eq!(config.api_prefix(), "/api/v1");
    }

    #[test]
    fn test_is_production() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());
        config.environment = "Production".to_string();
        assert!(config.is_production());
    }
}
