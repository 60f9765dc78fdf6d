//! Authentication service seam
//!
//! Credential checks on CONNECT go through [`AuthService`]. The reply is a
//! structured payload: a login is accepted iff the `data` field is present.
//! Backends that cannot be reached report [`AuthError`]; the processor
//! treats that the same as a rejection and never leaks backend detail onto
//! the wire.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Auth error types
#[derive(Debug)]
pub enum AuthError {
    /// The backing service could not be reached
    Unavailable(String),
    /// Internal backend error
    Internal(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unavailable(msg) => write!(f, "auth service unavailable: {}", msg),
            AuthError::Internal(msg) => write!(f, "auth internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Structured login reply. `data` carries backend account detail on
/// success; its absence denotes rejected credentials.
#[derive(Debug, Clone)]
pub struct LoginReply {
    pub data: Option<Value>,
}

impl LoginReply {
    pub fn accepted(data: Value) -> Self {
        Self { data: Some(data) }
    }

    pub fn rejected() -> Self {
        Self { data: None }
    }

    pub fn is_accepted(&self) -> bool {
        self.data.is_some()
    }
}

/// Credential check capability.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, username: &str, password: &[u8]) -> Result<LoginReply, AuthError>;
}

/// In-memory credential map with plaintext passwords.
#[derive(Default)]
pub struct StaticAuth {
    users: HashMap<String, String>,
}

impl StaticAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

#[async_trait]
impl AuthService for StaticAuth {
    async fn login(&self, username: &str, password: &[u8]) -> Result<LoginReply, AuthError> {
        let Some(stored) = self.users.get(username) else {
            return Ok(LoginReply::rejected());
        };
        match std::str::from_utf8(password) {
            Ok(given) if given == stored.as_str() => {
                Ok(LoginReply::accepted(json!({ "user": username })))
            }
            _ => Ok(LoginReply::rejected()),
        }
    }
}
