//! Claims carried by a Security Event Token.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// The `aud` claim: a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// Returns `true` if `expected` is (one of) the audience(s).
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Self::Single(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(aud) => f.write_str(aud),
            Self::Many(auds) => f.write_str(&auds.join(",")),
        }
    }
}

/// The `iat` claim as sent, either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssuedAt {
    Number(Number),
    Text(String),
}

impl fmt::Display for IssuedAt {
    /// Numbers render with their JSON text, strings verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Verified claims of a Security Event Token.
///
/// Only constructed after the signature, issuer and audience checks pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEventClaims {
    pub iss: String,
    pub aud: Audience,
    pub iat: IssuedAt,
    pub jti: String,
    /// FxA user id.
    pub sub: String,
    /// Event type URI to event attributes.
    pub events: Map<String, Value>,
}

impl SecurityEventClaims {
    /// The `iat` claim as stored text.
    #[must_use]
    pub fn issued_at_text(&self) -> String {
        self.iat.to_string()
    }
}
