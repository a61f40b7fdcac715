//! Common test utilities for E2E tests

#![allow(dead_code)]

pub mod fake_github;

use admin_bridge::{AppState, config};
use tokio::net::TcpListener;

pub use fake_github::FakeGitHub;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: FakeGitHub,
    /// Cookie-keeping client, behaves like the admin tool's browser
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance backed by a fresh fake GitHub
    pub async fn new() -> Self {
        let github = FakeGitHub::start().await;
        Self::with_github(github).await
    }

    pub async fn with_github(github: FakeGitHub) -> Self {
        let config = test_config(&github.addr);
        Self::with_config(github, config).await
    }

    /// Start with a customised configuration (see `test_config`)
    pub async fn with_config(github: FakeGitHub, config: config::AppConfig) -> Self {
        admin_bridge::metrics::init_metrics();

        // Initialize app state
        let state = AppState::new(config).unwrap();

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = admin_bridge::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Run the code exchange for `code` with the server's client
    pub async fn exchange(&self, code: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/exchange"))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .unwrap()
    }

    /// Log in as octocat
    pub async fn login(&self) {
        let response = self.exchange(FakeGitHub::VALID_CODE).await;
        assert_eq!(response.status(), 200, "login should succeed");
    }

    pub async fn save_config(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/save-config"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn status(&self) -> serde_json::Value {
        self.client
            .get(self.url("/auth/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

/// Configuration pointing every GitHub endpoint at the fake server
pub fn test_config(github_addr: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            allowed_origin: Some("https://admin.example.com".to_string()),
            secure_cookies: false,
            body_limit_bytes: 1024 * 1024,
        },
        auth: config::AuthConfig {
            session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
            session_max_age: 3600,
            github: config::GitHubOAuthConfig {
                client_id: FakeGitHub::CLIENT_ID.to_string(),
                client_secret: FakeGitHub::CLIENT_SECRET.to_string(),
            },
        },
        github: config::GitHubApiConfig {
            api_url: github_addr.to_string(),
            oauth_url: github_addr.to_string(),
            user_agent: "admin-bridge-tests".to_string(),
            timeout_seconds: 10,
        },
        repository: config::RepositoryConfig {
            owner: "acme".to_string(),
            name: "site".to_string(),
            default_branch: "main".to_string(),
        },
        publish: config::PublishConfig {
            default_path: "config.json".to_string(),
            default_commit_message: "Update config via admin".to_string(),
            branch_prefix: "admin-save-".to_string(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}
