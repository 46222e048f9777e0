//! Operator authentication for the HTTP surface.
//!
//! Every mutating call carries the operator key and the acting identity.
//! The engine itself never checks rights; it records whatever actor the
//! caller vouched for.

mod extractor;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

pub use extractor::{AuthError, OperatorAuth};

/// Longest accepted `X-Actor` value.
pub const MAX_ACTOR_LEN: usize = 128;

/// Configured operator key. `Debug` never prints the value.
#[derive(Clone)]
pub struct AdminKey(Option<SecretString>);

impl AdminKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(SecretString::from))
    }

    /// Constant-time comparison against the configured key.
    /// Always false when no key is configured.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            Some(secret) => secret
                .expose_secret()
                .as_bytes()
                .ct_eq(provided.as_bytes())
                .into(),
            None => false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "AdminKey([REDACTED])"),
            None => write!(f, "AdminKey(None)"),
        }
    }
}

/// Actor names are free-form but must be printable and bounded.
pub fn validate_actor(actor: &str) -> Result<&str, String> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err("actor must not be empty".to_string());
    }
    if actor.len() > MAX_ACTOR_LEN {
        return Err(format!("actor must be at most {} bytes", MAX_ACTOR_LEN));
    }
    if actor.chars().any(char::is_control) {
        return Err("actor must not contain control characters".to_string());
    }
    Ok(actor)
}
