//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use axum::http::HeaderValue;
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub github: GitHubApiConfig,
    pub repository: RepositoryConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Origin of the admin tool allowed to call us with credentials
    /// (e.g., "https://admin.example.com"). Permissive CORS when unset.
    pub allowed_origin: Option<String>,
    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
    /// Maximum accepted request body size in bytes
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    /// Address to bind the listener to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication configuration (GitHub OAuth + sessions)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    pub github: GitHubOAuthConfig,
}

/// GitHub OAuth application credentials
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// GitHub endpoints and client tuning
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubApiConfig {
    /// REST API base (default: "https://api.github.com")
    pub api_url: String,
    /// OAuth host serving `/login/oauth/access_token` (default: "https://github.com")
    pub oauth_url: String,
    /// User-Agent header, required by the GitHub API
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

/// Target repository for published files
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    /// Branch that receives direct commits and pull requests (default: "main")
    pub default_branch: String,
}

impl RepositoryConfig {
    /// "owner/name"
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Defaults applied to save requests
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    pub default_path: String,
    pub default_commit_message: String,
    /// Prefix for branches created when the default branch is protected
    pub branch_prefix: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (ADMIN_BRIDGE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.secure_cookies", false)?
            .set_default("server.body_limit_bytes", 1024 * 1024)?
            .set_default("auth.session_max_age", 604800)?
            .set_default("github.api_url", "https://api.github.com")?
            .set_default("github.oauth_url", "https://github.com")?
            .set_default("github.user_agent", concat!("admin-bridge/", env!("CARGO_PKG_VERSION")))?
            .set_default("github.timeout_seconds", 30)?
            .set_default("repository.default_branch", "main")?
            .set_default("publish.default_path", "config.json")?
            .set_default("publish.default_commit_message", "Update config via admin")?
            .set_default("publish.branch_prefix", "admin-save-")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("ADMIN_BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Parsed CORS origin, if one is configured
    pub fn allowed_origin(&self) -> Option<HeaderValue> {
        self.server
            .allowed_origin
            .as_deref()
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .and_then(|origin| HeaderValue::from_str(origin.trim_end_matches('/')).ok())
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        let required = [
            ("auth.github.client_id", &self.auth.github.client_id),
            ("auth.github.client_secret", &self.auth.github.client_secret),
            ("repository.owner", &self.repository.owner),
            ("repository.name", &self.repository.name),
            ("repository.default_branch", &self.repository.default_branch),
            ("publish.default_path", &self.publish.default_path),
            ("publish.branch_prefix", &self.publish.branch_prefix),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(crate::error::AppError::Config(format!(
                    "{key} must not be empty"
                )));
            }
        }

        for (key, value) in [
            ("github.api_url", &self.github.api_url),
            ("github.oauth_url", &self.github.oauth_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| crate::error::AppError::Config(format!("{key} is invalid: {e}")))?;
        }

        let origin_configured = self
            .server
            .allowed_origin
            .as_deref()
            .is_some_and(|origin| !origin.trim().is_empty());
        if origin_configured && self.allowed_origin().is_none() {
            return Err(crate::error::AppError::Config(
                "server.allowed_origin is not a valid header value".to_string(),
            ));
        }

        if !self.server.secure_cookies {
            tracing::warn!(
                host = %self.server.host,
                "Using insecure session cookies; enable server.secure_cookies behind https"
            );
        }

        Ok(())
    }
}
