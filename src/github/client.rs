//! REST client bound to one access token

use axum::async_trait;
use reqwest::{RequestBuilder, Response, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    AccessToken, BranchProtection, GitHubApi, GitHubError, GitHubUser, Lookup, NewPullRequest,
    PullRequest, PutFile,
};
use crate::config::RepositoryConfig;
use crate::metrics::{GITHUB_REQUEST_DURATION_SECONDS, GITHUB_REQUESTS_TOTAL};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Authenticated GitHub REST client
///
/// Cheap to construct: shares the connection pool of the `reqwest::Client`
/// it was built from.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: AccessToken,
}

/// Error body returned by the REST API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_url: Url, token: AccessToken) -> Self {
        Self {
            http,
            api_url,
            token,
        }
    }

    /// Build an API URL from path segments
    ///
    /// Each segment may itself contain `/` (file paths, branch names);
    /// the pieces are percent-encoded individually.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GitHubError> {
        let mut url = self.api_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| GitHubError::Decode(format!("invalid API base {}", self.api_url)))?;
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|part| !part.is_empty()));
            }
        }
        Ok(url)
    }

    fn repo_endpoint(
        &self,
        repo: &RepositoryConfig,
        segments: &[&str],
    ) -> Result<Url, GitHubError> {
        let mut all = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.token.secret())
            .header(header::ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, GitHubError> {
        let timer = GITHUB_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .start_timer();
        let result = self.authorized(request).send().await;
        timer.observe_duration();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                GITHUB_REQUESTS_TOTAL
                    .with_label_values(&[operation, "error"])
                    .inc();
                return Err(GitHubError::Transport(e));
            }
        };

        GITHUB_REQUESTS_TOTAL
            .with_label_values(&[operation, response.status().as_str()])
            .inc();
        tracing::debug!(operation, status = %response.status(), "GitHub API call");

        Ok(response)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GitHubError> {
        let response = self.execute(operation, request).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        decode(response).await
    }

    /// Like `send`, but a 404 becomes `Lookup::NotFound`
    async fn probe<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Lookup<T>, GitHubError> {
        let response = self.execute(operation, request).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        decode(response).await.map(Lookup::Found)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GitHubError> {
    response
        .json::<T>()
        .await
        .map_err(|e| GitHubError::Decode(e.to_string()))
}

async fn api_error(response: Response) -> GitHubError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("GitHub request failed")
                    .to_string()
            } else {
                text
            }
        });
    GitHubError::Api { status, message }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn authenticated_user(&self) -> Result<GitHubUser, GitHubError> {
        let url = self.endpoint(&["user"])?;
        self.send("get_user", self.http.get(url)).await
    }

    async fn branch_protection(
        &self,
        repo: &RepositoryConfig,
        branch: &str,
    ) -> Result<Lookup<BranchProtection>, GitHubError> {
        let url = self.repo_endpoint(repo, &["branches", branch, "protection"])?;
        self.probe("get_branch_protection", self.http.get(url))
            .await
    }

    async fn file_sha(
        &self,
        repo: &RepositoryConfig,
        path: &str,
        branch: &str,
    ) -> Result<Lookup<String>, GitHubError> {
        let mut url = self.repo_endpoint(repo, &["contents", path])?;
        url.query_pairs_mut().append_pair("ref", branch);
        let entry: Lookup<ContentEntry> = self.probe("get_content", self.http.get(url)).await?;
        Ok(match entry {
            Lookup::Found(entry) => Lookup::Found(entry.sha),
            Lookup::NotFound => Lookup::NotFound,
        })
    }

    async fn put_file(&self, repo: &RepositoryConfig, file: &PutFile) -> Result<(), GitHubError> {
        let url = self.repo_endpoint(repo, &["contents", &file.path])?;
        let _: serde_json::Value = self
            .send("put_content", self.http.put(url).json(file))
            .await?;
        Ok(())
    }

    async fn branch_head(
        &self,
        repo: &RepositoryConfig,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let url = self.repo_endpoint(repo, &["git", "ref", "heads", branch])?;
        let git_ref: GitRef = self.send("get_ref", self.http.get(url)).await?;
        Ok(git_ref.object.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepositoryConfig,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let url = self.repo_endpoint(repo, &["git", "refs"])?;
        let body = serde_json::json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": sha,
        });
        let _: serde_json::Value = self
            .send("create_ref", self.http.post(url).json(&body))
            .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryConfig,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let url = self.repo_endpoint(repo, &["pulls"])?;
        self.send("create_pull", self.http.post(url).json(pull))
            .await
    }
}
