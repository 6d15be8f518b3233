// Access-control gate for admin actions.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// Username/password pair presented by an admin client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Decode an HTTP `Authorization: Basic <base64(user:pass)>` value.
    /// Returns `None` for any other scheme or a malformed payload.
    pub fn from_basic_header(header: &str) -> Option<Self> {
        let encoded = header.trim().strip_prefix("Basic ")?;
        let decoded = BASE64.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Credentials::new(username, password))
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// No credentials were presented.
    Missing,
    /// Credentials were presented but did not match.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admit,
    Deny(DenyReason),
}

/// Decides whether an admin action may proceed.
pub trait AccessGate: Send + Sync {
    fn authorize(&self, credentials: Option<&Credentials>) -> Access;
}

/// Gate admitting a single fixed admin account.
#[derive(Debug, Clone)]
pub struct StaticGate {
    expected: Credentials,
}

impl StaticGate {
    pub fn new(expected: Credentials) -> Self {
        StaticGate { expected }
    }
}

impl AccessGate for StaticGate {
    fn authorize(&self, credentials: Option<&Credentials>) -> Access {
        match credentials {
            None => Access::Deny(DenyReason::Missing),
            Some(c) if *c == self.expected => Access::Admit,
            Some(_) => Access::Deny(DenyReason::Invalid),
        }
    }
}
