//! GitHub integration
//!
//! Handles:
//! - OAuth authorization code exchange
//! - The REST calls needed to publish a file (contents, refs, pulls)
//!
//! `GitHubApi` is the seam the publisher talks through; `GitHubClient`
//! is the reqwest-backed implementation bound to one access token.

mod client;
mod oauth;

use axum::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RepositoryConfig;

pub use client::GitHubClient;
pub use oauth::GitHub;

/// Opaque OAuth access token
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Identity of the authenticated GitHub user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// Outcome of a probe where 404 means "absent" rather than failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Branch protection settings (only existence matters to us)
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct BranchProtection {
    #[serde(default)]
    pub url: Option<String>,
}

/// Create-or-update request for a file in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutFile {
    #[serde(skip)]
    pub path: String,
    pub message: String,
    /// Base64-encoded file body
    pub content: String,
    pub branch: String,
    /// Blob SHA of the file being replaced; omitted when creating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Pull request to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// Opened pull request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Errors talking to GitHub
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Network or TLS failure
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success response from the REST API
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    /// OAuth endpoint rejected the authorization code
    #[error("{0}")]
    OAuth(String),

    /// Response body did not have the expected shape
    #[error("Unexpected GitHub response: {0}")]
    Decode(String),
}

impl GitHubError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GitHubError::Transport(e) => e.status(),
            GitHubError::Api { status, .. } => Some(*status),
            GitHubError::OAuth(_) | GitHubError::Decode(_) => None,
        }
    }
}

/// Operations on the hosting service used by the handlers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// GET /user
    async fn authenticated_user(&self) -> Result<GitHubUser, GitHubError>;

    /// GET /repos/{owner}/{repo}/branches/{branch}/protection
    async fn branch_protection(
        &self,
        repo: &RepositoryConfig,
        branch: &str,
    ) -> Result<Lookup<BranchProtection>, GitHubError>;

    /// Blob SHA of `path` on `branch`, via GET /repos/{owner}/{repo}/contents/{path}
    async fn file_sha(
        &self,
        repo: &RepositoryConfig,
        path: &str,
        branch: &str,
    ) -> Result<Lookup<String>, GitHubError>;

    /// PUT /repos/{owner}/{repo}/contents/{path}
    async fn put_file(&self, repo: &RepositoryConfig, file: &PutFile) -> Result<(), GitHubError>;

    /// Commit SHA `refs/heads/{branch}` points at
    async fn branch_head(&self, repo: &RepositoryConfig, branch: &str)
    -> Result<String, GitHubError>;

    /// POST /repos/{owner}/{repo}/git/refs
    async fn create_branch(
        &self,
        repo: &RepositoryConfig,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError>;

    /// POST /repos/{owner}/{repo}/pulls
    async fn create_pull_request(
        &self,
        repo: &RepositoryConfig,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError>;
}
