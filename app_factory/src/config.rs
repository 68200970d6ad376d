//! App factory configuration: loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// GitHub personal access token for repository creation and uploads.
    pub github_token: String,
    /// Codemagic API token; builds are skipped when empty.
    pub codemagic_token: String,
    /// Amazon Appstore OAuth client id.
    pub amazon_client_id: String,
    /// Amazon Appstore OAuth client secret.
    pub amazon_client_secret: String,
    /// Directory holding the persisted JSON documents.
    pub data_dir: PathBuf,
    /// Seconds between two status polls of one build.
    pub poll_interval_secs: u64,
    /// Poll ticks before a build is declared timed out (0 disables the cap).
    pub max_poll_attempts: u32,
    /// Per-request timeout for outbound HTTP calls.
    pub request_timeout_secs: u64,
    /// GitHub REST base URL.
    pub github_api_url: String,
    /// Codemagic REST base URL.
    pub codemagic_api_url: String,
    /// Amazon Appstore REST base URL.
    pub appstore_api_url: String,
    /// Amazon OAuth token endpoint.
    pub amazon_token_url: String,
    /// Prometheus exporter listen address; metrics stay in-process when unset.
    pub metrics_addr: Option<String>,
}

impl FactoryConfig {
    pub fn from_env() -> Self {
        let github_token = std::env::var("APP_FACTORY_GITHUB_TOKEN").unwrap_or_default();
        let codemagic_token = std::env::var("APP_FACTORY_CODEMAGIC_TOKEN").unwrap_or_default();
        let amazon_client_id = std::env::var("APP_FACTORY_AMAZON_CLIENT_ID").unwrap_or_default();
        let amazon_client_secret =
            std::env::var("APP_FACTORY_AMAZON_CLIENT_SECRET").unwrap_or_default();
        let data_dir = std::env::var("APP_FACTORY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".app-factory"));
        let poll_interval_secs = std::env::var("APP_FACTORY_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(45);
        let max_poll_attempts = std::env::var("APP_FACTORY_MAX_POLL_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(480);
        let request_timeout_secs = std::env::var("APP_FACTORY_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let github_api_url = std::env::var("APP_FACTORY_GITHUB_API")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let codemagic_api_url = std::env::var("APP_FACTORY_CODEMAGIC_API")
            .unwrap_or_else(|_| "https://api.codemagic.io".to_string());
        let appstore_api_url = std::env::var("APP_FACTORY_APPSTORE_API")
            .unwrap_or_else(|_| "https://developer.amazon.com/api/appstore".to_string());
        let amazon_token_url = std::env::var("APP_FACTORY_AMAZON_TOKEN_URL")
            .unwrap_or_else(|_| "https://api.amazon.com/auth/o2/token".to_string());
        let metrics_addr = std::env::var("APP_FACTORY_METRICS_ADDR")
            .ok()
            .filter(|s| !s.is_empty());

        if github_token.is_empty() {
            tracing::warn!("APP_FACTORY_GITHUB_TOKEN not set -- repository push disabled");
        }
        if codemagic_token.is_empty() {
            tracing::debug!("APP_FACTORY_CODEMAGIC_TOKEN not set -- CI builds disabled");
        }

        Self {
            github_token,
            codemagic_token,
            amazon_client_id,
            amazon_client_secret,
            data_dir,
            poll_interval_secs,
            max_poll_attempts,
            request_timeout_secs,
            github_api_url,
            codemagic_api_url,
            appstore_api_url,
            amazon_token_url,
            metrics_addr,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Shared `reqwest` client carrying the configured timeout and user agent.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout())
            .user_agent(concat!("cordova-app-factory/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}
