//! Service layer
//!
//! Business logic that sits between the HTTP handlers and GitHub.

mod publish;

pub use publish::{ConfigPublisher, PublishRequest, PublishResult, encode_content};
