//! Config save endpoint

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use crate::auth::Authenticated;
use crate::config::PublishConfig;
use crate::error::AppError;
use crate::metrics::PUBLISH_TOTAL;
use crate::service::{ConfigPublisher, PublishRequest, PublishResult};

/// Create save router
///
/// Routes:
/// - POST /save-config - Publish a JSON config file to the repository
pub fn save_router() -> Router<AppState> {
    Router::new().route("/save-config", post(save_config))
}

/// Save request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigRequest {
    pub json: Option<Value>,
    pub path: Option<String>,
    pub commit_message: Option<String>,
    #[serde(rename = "preferPRWhenProtected")]
    pub prefer_pr_when_protected: Option<bool>,
}

impl SaveConfigRequest {
    /// Validate and fill in defaults
    ///
    /// # Errors
    /// `Validation` when `json` is missing or not an object
    pub fn into_publish_request(self, defaults: &PublishConfig) -> Result<PublishRequest, AppError> {
        let json = match self.json {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AppError::Validation(
                    "json must be an object".to_string(),
                ));
            }
            None => return Err(AppError::Validation("Missing json".to_string())),
        };

        let path = self
            .path
            .map(|path| path.trim().trim_start_matches('/').to_string())
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| defaults.default_path.clone());

        let commit_message = self
            .commit_message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| defaults.default_commit_message.clone());

        Ok(PublishRequest {
            json,
            path,
            commit_message,
            prefer_pr_when_protected: self.prefer_pr_when_protected.unwrap_or(true),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SaveConfigResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub result: PublishResult,
}

/// POST /save-config
///
/// Requires an authenticated session.
async fn save_config(
    State(state): State<AppState>,
    Authenticated { session, token }: Authenticated,
    payload: Result<Json<SaveConfigRequest>, JsonRejection>,
) -> Result<Json<SaveConfigResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let request = payload.into_publish_request(&state.config.publish)?;

    let login = session.user().await.map(|user| user.login);
    tracing::info!(
        login = login.as_deref().unwrap_or("unknown"),
        path = %request.path,
        prefer_pr = request.prefer_pr_when_protected,
        "Publishing config"
    );

    let client = state.github.client(&token);
    let publisher = ConfigPublisher::new(
        &client,
        &state.config.repository,
        &state.config.publish.branch_prefix,
    );
    let result = publisher.publish(request).await?;

    PUBLISH_TOTAL.with_label_values(&[result.method()]).inc();

    Ok(Json(SaveConfigResponse { ok: true, result }))
}
