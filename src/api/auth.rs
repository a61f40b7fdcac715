//! Authentication endpoints
//!
//! The admin tool sends the user through GitHub's authorize page itself
//! and posts the returned code here.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::Session;
use crate::error::AppError;
use crate::github::{GitHubApi, GitHubUser};

/// Create authentication router
///
/// Routes:
/// - POST /auth/exchange - Trade an OAuth code for a session token
/// - GET /auth/status - Report session state
/// - POST /auth/logout - Drop the session
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/exchange", post(exchange))
        .route("/auth/status", get(status))
        .route("/auth/logout", post(logout))
}

/// Exchange request body
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub ok: bool,
    pub user: GitHubUser,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Option<GitHubUser>>,
}

/// POST /auth/exchange
///
/// # Steps
/// 1. Exchange the code for an access token
/// 2. Store the token in the session
/// 3. Fetch the user's login and cache it in the session
async fn exchange(
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let code = payload
        .code
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing code".to_string()))?;

    let token = state.github.exchange_code(&code).await?;
    session.set_token(token.clone()).await;

    let user = state.github.client(&token).authenticated_user().await?;
    session.set_user(user.clone()).await?;

    tracing::info!(login = %user.login, "GitHub user authenticated");

    Ok(Json(ExchangeResponse { ok: true, user }))
}

/// GET /auth/status
async fn status(session: Session) -> Json<StatusResponse> {
    let data = session.data().await;

    let response = if data.is_authenticated() {
        StatusResponse {
            authenticated: true,
            user: Some(data.user().cloned()),
        }
    } else {
        StatusResponse {
            authenticated: false,
            user: None,
        }
    };

    Json(response)
}

/// POST /auth/logout
async fn logout(session: Session) -> Json<serde_json::Value> {
    session.destroy().await;
    Json(serde_json::json!({ "ok": true }))
}
