//! Browser sessions
//!
//! Handles:
//! - Server-side session storage
//! - Signed session cookies
//! - Authentication middleware

mod middleware;
pub mod session;

pub use middleware::{Authenticated, require_auth, session_layer};
pub use session::{Session, SessionData, SessionStore};
