//! Config publishing
//!
//! Writes a JSON document into the configured repository. Unprotected
//! default branches get a direct commit; protected ones get a fresh
//! branch plus a pull request.
//!
//! ```text
//! Start -> CheckProtection -> DirectWrite -> Done
//!                          \-> CreateBranch -> WriteOnBranch -> OpenPR -> Done
//! ```
//!
//! Any step may fail; the request aborts without undoing earlier steps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::RepositoryConfig;
use crate::error::{AppError, Result};
use crate::github::{GitHubApi, GitHubError, Lookup, NewPullRequest, PutFile};

/// A validated save request
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub json: Map<String, Value>,
    pub path: String,
    pub commit_message: String,
    pub prefer_pr_when_protected: bool,
}

/// How the file reached the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum PublishResult {
    DirectCommit {
        branch: String,
    },
    BranchPr {
        branch: String,
        #[serde(rename = "prUrl")]
        pr_url: String,
    },
}

impl PublishResult {
    pub fn method(&self) -> &'static str {
        match self {
            PublishResult::DirectCommit { .. } => "direct-commit",
            PublishResult::BranchPr { .. } => "branch-pr",
        }
    }

    pub fn branch(&self) -> &str {
        match self {
            PublishResult::DirectCommit { branch } | PublishResult::BranchPr { branch, .. } => {
                branch
            }
        }
    }
}

/// Publishes config files through one authenticated GitHub client
pub struct ConfigPublisher<'a, A: GitHubApi + ?Sized> {
    api: &'a A,
    repo: &'a RepositoryConfig,
    branch_prefix: &'a str,
}

impl<'a, A: GitHubApi + ?Sized> ConfigPublisher<'a, A> {
    pub fn new(api: &'a A, repo: &'a RepositoryConfig, branch_prefix: &'a str) -> Self {
        Self {
            api,
            repo,
            branch_prefix,
        }
    }

    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResult> {
        self.publish_at(request, Utc::now()).await
    }

    /// Publish using `now` for the new branch name
    pub async fn publish_at(
        &self,
        request: PublishRequest,
        now: DateTime<Utc>,
    ) -> Result<PublishResult> {
        let content = encode_content(&request.json)?;
        let default_branch = self.repo.default_branch.as_str();

        let protected = self.is_protected(default_branch).await?;
        tracing::debug!(
            repository = %self.repo.full_name(),
            branch = default_branch,
            protected,
            "Checked branch protection"
        );

        if !protected || !request.prefer_pr_when_protected {
            self.upsert(default_branch, &request, content).await?;
            tracing::info!(
                repository = %self.repo.full_name(),
                branch = default_branch,
                path = %request.path,
                "Committed config directly"
            );
            return Ok(PublishResult::DirectCommit {
                branch: default_branch.to_string(),
            });
        }

        let branch = format!("{}{}", self.branch_prefix, now.timestamp_millis());
        let head = self.api.branch_head(self.repo, default_branch).await?;
        self.api.create_branch(self.repo, &branch, &head).await?;
        tracing::debug!(%branch, base = %head, "Created branch");

        self.upsert(&branch, &request, content).await?;
        tracing::debug!(%branch, path = %request.path, "Wrote config on branch");

        let pull = self
            .api
            .create_pull_request(
                self.repo,
                &NewPullRequest {
                    title: request.commit_message.clone(),
                    head: branch.clone(),
                    base: default_branch.to_string(),
                    body: format!("Automated config update from branch `{branch}`."),
                },
            )
            .await?;
        tracing::info!(
            repository = %self.repo.full_name(),
            %branch,
            pr = pull.number,
            "Opened pull request for protected branch"
        );

        Ok(PublishResult::BranchPr {
            branch,
            pr_url: pull.html_url,
        })
    }

    /// 404 means unprotected; 401/403 get their own error kind
    async fn is_protected(&self, branch: &str) -> Result<bool> {
        match self.api.branch_protection(self.repo, branch).await {
            Ok(lookup) => Ok(lookup.is_found()),
            Err(GitHubError::Api { status, message })
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN =>
            {
                Err(AppError::UpstreamForbidden { status, message })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create the file, or update it in place when it already exists
    async fn upsert(&self, branch: &str, request: &PublishRequest, content: String) -> Result<()> {
        let sha = match self.api.file_sha(self.repo, &request.path, branch).await? {
            Lookup::Found(sha) => Some(sha),
            Lookup::NotFound => None,
        };

        let file = PutFile {
            path: request.path.clone(),
            message: request.commit_message.clone(),
            content,
            branch: branch.to_string(),
            sha,
        };
        self.api.put_file(self.repo, &file).await?;
        Ok(())
    }
}

/// Pretty-print with two-space indentation, then base64 for the contents API
pub fn encode_content(json: &Map<String, Value>) -> Result<String> {
    use base64::{Engine as _, engine::general_purpose};

    let text = serde_json::to_string_pretty(json).map_err(|e| AppError::Internal(e.into()))?;
    Ok(general_purpose::STANDARD.encode(text))
}
