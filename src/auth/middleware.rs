//! Session and authentication middleware
//!
//! `session_layer` attaches a `Session` to every request; the extractors
//! below read it back in handlers.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::session::{SESSION_COOKIE, Session, sign_session_id, verify_session_id};
use crate::AppState;
use crate::error::AppError;
use crate::github::AccessToken;

/// Middleware attaching the browser's session
///
/// Resumes the session named by a validly signed cookie, or starts an
/// empty one. After the handler runs, the cookie is (re)issued if the
/// session was written to and removed if it was destroyed; untouched
/// fresh sessions never reach the browser.
pub async fn session_layer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let secret = &state.config.auth.session_secret;

    let session = match jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| verify_session_id(cookie.value(), secret).ok())
    {
        Some(id) => state.sessions.resume(id).await,
        None => state.sessions.start(),
    };

    request.extensions_mut().insert(session.clone());
    let response = next.run(request).await;

    if session.is_destroyed() {
        return (jar.remove(removal_cookie()), response).into_response();
    }

    if session.is_modified() {
        match sign_session_id(session.id(), secret) {
            Ok(value) => {
                let cookie = session_cookie(value, state.config.server.secure_cookies);
                return (jar.add(cookie), response).into_response();
            }
            Err(error) => {
                tracing::error!(%error, "Failed to sign session cookie");
            }
        }
    }

    response
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    // Cross-origin admin tools only send the cookie with SameSite=None,
    // which browsers accept on secure cookies only.
    let same_site = if secure {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .build()
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session layer is not installed")))
    }
}

/// Extractor for a session holding an access token
///
/// Rejects with 401 when the browser has not completed the exchange.
///
/// # Usage
/// ```ignore
/// async fn handler(Authenticated { token, .. }: Authenticated) -> impl IntoResponse {
///     // call GitHub with `token`
/// }
/// ```
#[derive(Clone)]
pub struct Authenticated {
    pub session: Session,
    pub token: AccessToken,
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let token = session.token().await.ok_or(AppError::Unauthorized)?;
        Ok(Authenticated { session, token })
    }
}

/// Middleware to require an authenticated session
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/metrics", ...)
///     .route_layer(middleware::from_fn(require_auth));
/// ```
pub async fn require_auth(
    _auth: Authenticated,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    Ok(next.run(request).await)
}
