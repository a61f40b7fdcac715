//! Session management
//!
//! Session data lives server-side in a TTL cache keyed by a random id.
//! The browser only holds the id, signed with HMAC so forged ids are
//! rejected before touching the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::github::{AccessToken, GitHubUser};
use crate::metrics::SESSIONS_ACTIVE;

/// Name of the cookie carrying the signed session id
pub const SESSION_COOKIE: &str = "admin_bridge_session";

/// Per-browser session state
///
/// A cached user is only observable while a token is present, and
/// storing a new token drops the previous identity.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    token: Option<AccessToken>,
    user: Option<GitHubUser>,
}

impl SessionData {
    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    pub fn user(&self) -> Option<&GitHubUser> {
        self.token.as_ref().and(self.user.as_ref())
    }

    pub fn set_token(&mut self, token: AccessToken) {
        self.token = Some(token);
        self.user = None;
    }

    /// # Errors
    /// `Unauthorized` if no token has been stored yet
    pub fn set_user(&mut self, user: GitHubUser) -> Result<(), AppError> {
        if self.token.is_none() {
            return Err(AppError::Unauthorized);
        }
        self.user = Some(user);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Server-side session store
///
/// Entries expire `max_age` after their last write.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, SessionData>,
}

impl SessionStore {
    pub fn new(max_age: Duration) -> Self {
        let sessions = Cache::builder().time_to_live(max_age).build();
        Self { sessions }
    }

    /// Begin a fresh, empty session with a new random id
    pub fn start(&self) -> Session {
        Session::new(generate_session_id(), self.clone(), SessionData::default())
    }

    /// Resume the session for `id`
    ///
    /// An expired or unknown id resumes as an empty session under the
    /// same id.
    pub async fn resume(&self, id: String) -> Session {
        let data = self.sessions.get(&id).await.unwrap_or_default();
        Session::new(id, self.clone(), data)
    }

    async fn save(&self, id: &str, data: SessionData) {
        self.sessions.insert(id.to_string(), data).await;
        SESSIONS_ACTIVE.set(self.active().await as i64);
    }

    async fn remove(&self, id: &str) {
        self.sessions.invalidate(id).await;
        SESSIONS_ACTIVE.set(self.active().await as i64);
    }

    /// Number of live sessions
    ///
    /// Flushes moka's pending maintenance first; `entry_count` alone lags
    /// behind recent inserts and invalidations.
    pub async fn active(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }
}

/// Handle to the current request's session
///
/// Inserted into request extensions by `session_layer`. Writes go
/// through to the store immediately.
#[derive(Clone)]
pub struct Session {
    id: Arc<str>,
    store: SessionStore,
    data: Arc<RwLock<SessionData>>,
    modified: Arc<AtomicBool>,
    destroyed: Arc<AtomicBool>,
}

impl Session {
    fn new(id: String, store: SessionStore, data: SessionData) -> Self {
        Self {
            id: id.into(),
            store,
            data: Arc::new(RwLock::new(data)),
            modified: Arc::new(AtomicBool::new(false)),
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn token(&self) -> Option<AccessToken> {
        self.data.read().await.token().cloned()
    }

    pub async fn user(&self) -> Option<GitHubUser> {
        self.data.read().await.user().cloned()
    }

    /// Snapshot of the whole session
    pub async fn data(&self) -> SessionData {
        self.data.read().await.clone()
    }

    pub async fn set_token(&self, token: AccessToken) {
        let snapshot = {
            let mut data = self.data.write().await;
            data.set_token(token);
            data.clone()
        };
        self.persist(snapshot).await;
    }

    pub async fn set_user(&self, user: GitHubUser) -> Result<(), AppError> {
        let snapshot = {
            let mut data = self.data.write().await;
            data.set_user(user)?;
            data.clone()
        };
        self.persist(snapshot).await;
        Ok(())
    }

    /// Forget everything and drop the entry from the store
    pub async fn destroy(&self) {
        *self.data.write().await = SessionData::default();
        self.store.remove(&self.id).await;
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    async fn persist(&self, snapshot: SessionData) {
        self.store.save(&self.id, snapshot).await;
        self.modified.store(true, Ordering::SeqCst);
        self.destroyed.store(false, Ordering::SeqCst);
    }
}

fn generate_session_id() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Sign a session id for the cookie
///
/// Cookie format: {id}.base64(hmac_sha256(id))
pub fn sign_session_id(id: &str, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::Mac;

    let signature = session_mac(id, secret)?.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", id, signature_b64))
}

/// Verify a signed cookie value and return the session id
///
/// # Errors
/// `Unauthorized` if the value is malformed or the signature does not match
pub fn verify_session_id(value: &str, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::Mac;

    let (id, signature_b64) = value.split_once('.').ok_or(AppError::Unauthorized)?;
    if id.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    session_mac(id, secret)?
        .verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized)?;

    Ok(id.to_string())
}

fn session_mac(id: &str, secret: &str) -> Result<hmac::Hmac<sha2::Sha256>, AppError> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session secret: {e}")))?;
    mac.update(id.as_bytes());
    Ok(mac)
}
