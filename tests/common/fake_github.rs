//! In-process stand-in for the GitHub OAuth and REST endpoints
//!
//! Serves just enough of the API for the bridge and records every
//! write so tests can assert on what reached "GitHub".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// How the fake answers the branch-protection probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    Unprotected,
    Protected,
    /// Respond with this status and an error body
    Fail(u16),
}

/// A recorded `PUT /contents/{path}`
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub path: String,
    pub body: Value,
}

pub struct FakeState {
    pub protection: Protection,
    /// (branch, path) -> blob sha
    pub files: HashMap<(String, String), String>,
    /// branch -> commit sha
    pub heads: HashMap<String, String>,
    pub puts: Vec<RecordedPut>,
    pub created_refs: Vec<Value>,
    pub pulls: Vec<Value>,
    pub protection_checks: Vec<String>,
    pub fail_pulls: bool,
    next_id: u64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            protection: Protection::Unprotected,
            files: HashMap::new(),
            heads: HashMap::from([("main".to_string(), FakeGitHub::MAIN_HEAD.to_string())]),
            puts: Vec::new(),
            created_refs: Vec::new(),
            pulls: Vec::new(),
            protection_checks: Vec::new(),
            fail_pulls: false,
            next_id: 1,
        }
    }
}

impl FakeState {
    fn next_sha(&mut self, prefix: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("{prefix}-{id}")
    }
}

type Shared = Arc<Mutex<FakeState>>;

#[derive(Clone)]
pub struct FakeGitHub {
    pub addr: String,
    state: Shared,
}

impl FakeGitHub {
    pub const CLIENT_ID: &'static str = "test-client-id";
    pub const CLIENT_SECRET: &'static str = "test-client-secret";
    pub const VALID_CODE: &'static str = "abc";
    /// Code for which the token endpoint answers 502
    pub const BROKEN_CODE: &'static str = "explode";
    pub const TOKEN: &'static str = "tok1";
    pub const LOGIN: &'static str = "octocat";
    pub const MAIN_HEAD: &'static str = "main-head-sha";

    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState::default()));

        let app = Router::new()
            .route("/login/oauth/access_token", post(access_token))
            .route("/user", get(user))
            .route(
                "/repos/:owner/:repo/branches/:branch/protection",
                get(branch_protection),
            )
            .route(
                "/repos/:owner/:repo/contents/*path",
                get(get_content).put(put_content),
            )
            .route("/repos/:owner/:repo/git/ref/heads/:branch", get(get_ref))
            .route("/repos/:owner/:repo/git/refs", post(create_ref))
            .route("/repos/:owner/:repo/pulls", post(create_pull))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_protection(&self, protection: Protection) {
        self.state().protection = protection;
    }

    /// Seed an existing file on `branch`
    pub fn add_file(&self, branch: &str, path: &str, sha: &str) {
        self.state()
            .files
            .insert((branch.to_string(), path.to_string()), sha.to_string());
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.state().puts.clone()
    }

    pub fn created_refs(&self) -> Vec<Value> {
        self.state().created_refs.clone()
    }

    pub fn pulls(&self) -> Vec<Value> {
        self.state().pulls.clone()
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", FakeGitHub::TOKEN);
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

fn known_repo(owner: &str, repo: &str) -> bool {
    owner == "acme" && repo == "site"
}

macro_rules! guard {
    ($headers:expr, $owner:expr, $repo:expr) => {
        if !authorized(&$headers) {
            return error(StatusCode::UNAUTHORIZED, "Bad credentials");
        }
        if !known_repo(&$owner, &$repo) {
            return error(StatusCode::NOT_FOUND, "Not Found");
        }
    };
}

async fn access_token(Json(body): Json<Value>) -> Response {
    if body["client_id"] != FakeGitHub::CLIENT_ID
        || body["client_secret"] != FakeGitHub::CLIENT_SECRET
    {
        return Json(json!({
            "error": "incorrect_client_credentials",
            "error_description": "The client_id and/or client_secret passed are incorrect."
        }))
        .into_response();
    }

    match body["code"].as_str() {
        Some(FakeGitHub::VALID_CODE) => Json(json!({
            "access_token": FakeGitHub::TOKEN,
            "token_type": "bearer",
            "scope": "repo"
        }))
        .into_response(),
        Some(FakeGitHub::BROKEN_CODE) => {
            (StatusCode::BAD_GATEWAY, "upstream exploded").into_response()
        }
        _ => Json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }))
        .into_response(),
    }
}

async fn user(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    Json(json!({ "login": FakeGitHub::LOGIN, "id": 1 })).into_response()
}

async fn branch_protection(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, repo, branch)): Path<(String, String, String)>,
) -> Response {
    guard!(headers, owner, repo);

    let mut state = state.lock().unwrap();
    state.protection_checks.push(branch.clone());

    match state.protection {
        Protection::Unprotected => error(StatusCode::NOT_FOUND, "Branch not protected"),
        Protection::Protected => Json(json!({
            "url": format!("https://api.github.com/repos/{owner}/{repo}/branches/{branch}/protection"),
            "required_pull_request_reviews": { "required_approving_review_count": 1 }
        }))
        .into_response(),
        Protection::Fail(code) => {
            let status = StatusCode::from_u16(code).unwrap();
            error(status, "Protection lookup failed")
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefQuery {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

async fn get_content(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, repo, path)): Path<(String, String, String)>,
    Query(query): Query<RefQuery>,
) -> Response {
    guard!(headers, owner, repo);

    let branch = query.git_ref.unwrap_or_else(|| "main".to_string());
    let state = state.lock().unwrap();
    match state.files.get(&(branch, path.clone())) {
        Some(sha) => Json(json!({
            "type": "file",
            "path": path,
            "sha": sha,
            "encoding": "base64",
            "content": ""
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn put_content(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, repo, path)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    guard!(headers, owner, repo);

    let mut state = state.lock().unwrap();
    let branch = body["branch"].as_str().unwrap_or("main").to_string();
    if !state.heads.contains_key(&branch) {
        return error(StatusCode::NOT_FOUND, "Branch not found");
    }

    let key = (branch, path.clone());
    let existing = state.files.get(&key).cloned();
    match (existing.as_deref(), body["sha"].as_str()) {
        (Some(_), None) => {
            return error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid request.\n\n\"sha\" wasn't supplied.",
            );
        }
        (Some(current), Some(given)) if current != given => {
            return error(StatusCode::CONFLICT, "does not match");
        }
        _ => {}
    }

    state.puts.push(RecordedPut {
        path: path.clone(),
        body: body.clone(),
    });
    let blob = state.next_sha("blob");
    let commit = state.next_sha("commit");
    state.files.insert(key, blob.clone());

    let status = if existing.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (
        status,
        Json(json!({
            "content": { "path": path, "sha": blob },
            "commit": { "sha": commit }
        })),
    )
        .into_response()
}

async fn get_ref(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, repo, branch)): Path<(String, String, String)>,
) -> Response {
    guard!(headers, owner, repo);

    let state = state.lock().unwrap();
    match state.heads.get(&branch) {
        Some(sha) => Json(json!({
            "ref": format!("refs/heads/{branch}"),
            "object": { "type": "commit", "sha": sha }
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn create_ref(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    guard!(headers, owner, repo);

    let mut state = state.lock().unwrap();
    let Some(branch) = body["ref"]
        .as_str()
        .and_then(|r| r.strip_prefix("refs/heads/"))
        .map(ToString::to_string)
    else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Reference name is invalid");
    };
    if state.heads.contains_key(&branch) {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Reference already exists");
    }

    let sha = body["sha"].as_str().unwrap_or_default().to_string();
    state.heads.insert(branch, sha);
    state.created_refs.push(body.clone());

    (StatusCode::CREATED, Json(body)).into_response()
}

async fn create_pull(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    guard!(headers, owner, repo);

    let mut state = state.lock().unwrap();
    if state.fail_pulls {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Validation Failed");
    }

    state.pulls.push(body);
    let number = state.pulls.len();
    (
        StatusCode::CREATED,
        Json(json!({
            "number": number,
            "html_url": format!("https://github.com/{owner}/{repo}/pull/{number}")
        })),
    )
        .into_response()
}
