//! GitHub OAuth flow
//!
//! Implements the code-for-token step of the OAuth 2.0 authorization code
//! flow. The browser-side redirect to GitHub is owned by the admin tool.

use reqwest::header;
use serde::Deserialize;
use url::Url;

use super::{AccessToken, GitHubClient, GitHubError};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::metrics::GITHUB_REQUESTS_TOTAL;

/// GitHub token endpoint response
///
/// GitHub answers 200 even for rejected codes, carrying `error` instead of
/// `access_token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Entry point for everything GitHub
///
/// Holds the shared HTTP client and OAuth application credentials;
/// hands out per-token REST clients.
pub struct GitHub {
    http: reqwest::Client,
    api_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl GitHub {
    /// Build from configuration
    ///
    /// # Errors
    /// Returns error if the endpoints are not valid URLs or the HTTP
    /// client cannot be constructed
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let api_url = Url::parse(&config.github.api_url)
            .map_err(|e| AppError::Config(format!("github.api_url is invalid: {e}")))?;
        let token_url = Url::parse(&config.github.oauth_url)
            .and_then(|base| base.join("login/oauth/access_token"))
            .map_err(|e| AppError::Config(format!("github.oauth_url is invalid: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(config.github.user_agent.clone())
            .timeout(std::time::Duration::from_secs(config.github.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http,
            api_url,
            token_url,
            client_id: config.auth.github.client_id.clone(),
            client_secret: config.auth.github.client_secret.clone(),
        })
    }

    /// Exchange an authorization code for an access token
    ///
    /// # Errors
    /// `GitHubError::OAuth` with GitHub's description when the code is
    /// rejected; transport/decode errors otherwise
    pub async fn exchange_code(&self, code: &str) -> Result<AccessToken, GitHubError> {
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "code": code,
        });

        let response = self
            .http
            .post(self.token_url.clone())
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .inspect_err(|_| {
                GITHUB_REQUESTS_TOTAL
                    .with_label_values(&["exchange_code", "error"])
                    .inc();
            })?;

        let status = response.status();
        GITHUB_REQUESTS_TOTAL
            .with_label_values(&["exchange_code", status.as_str()])
            .inc();

        let text = response.text().await?;
        let parsed = serde_json::from_str::<TokenResponse>(&text);

        match parsed {
            Ok(TokenResponse {
                error: Some(error),
                error_description,
                ..
            }) => {
                tracing::warn!(%error, "GitHub rejected authorization code");
                Err(GitHubError::OAuth(error_description.unwrap_or(error)))
            }
            _ if !status.is_success() => Err(GitHubError::Api {
                status,
                message: if text.trim().is_empty() {
                    "Token exchange failed".to_string()
                } else {
                    text
                },
            }),
            Ok(TokenResponse {
                access_token: Some(token),
                ..
            }) if !token.is_empty() => Ok(AccessToken::new(token)),
            Ok(_) => Err(GitHubError::Decode(
                "token response has no access_token".to_string(),
            )),
            Err(e) => Err(GitHubError::Decode(e.to_string())),
        }
    }

    /// REST client acting as the owner of `token`
    pub fn client(&self, token: &AccessToken) -> GitHubClient {
        GitHubClient::new(self.http.clone(), self.api_url.clone(), token.clone())
    }
}
