//! Error types for Security Event Token verification.

use std::fmt;

use crate::jwks::JwksError;

/// Reasons an inbound token is rejected.
///
/// Variants are ordered by the pipeline stage that produces them.
#[derive(Debug, thiserror::Error)]
pub enum SetError {
    /// The request or token is structurally invalid.
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// The token header names an algorithm outside the allow-list.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// No verification key could be obtained.
    #[error("Key resolution failed: {0}")]
    KeyResolution(#[from] JwksError),

    /// No candidate key verifies the signature.
    #[error("Invalid token signature")]
    SignatureInvalid,

    /// `iss` or `aud` does not match configuration.
    #[error("Claim mismatch for '{claim}': expected {expected}, got {actual}")]
    ClaimMismatch {
        claim: &'static str,
        expected: String,
        actual: String,
    },
}

impl SetError {
    /// Creates a new `MalformedRequest` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(algorithm: impl fmt::Debug) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: format!("{algorithm:?}"),
        }
    }

    /// Creates a new `ClaimMismatch` error.
    #[must_use]
    pub fn claim_mismatch(
        claim: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ClaimMismatch {
            claim,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns `true` for rejections caused by a malformed request (HTTP 400).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest { .. } | Self::UnsupportedAlgorithm { .. }
        )
    }

    /// Returns `true` if a fresh key set could change the outcome.
    #[must_use]
    pub fn is_retryable_with_fresh_keys(&self) -> bool {
        match self {
            Self::SignatureInvalid => true,
            Self::KeyResolution(e) => e.is_missing_key(),
            _ => false,
        }
    }

    /// Returns the error category for logging and metrics.
    #[must_use]
    pub fn category(&self) -> SetErrorCategory {
        match self {
            Self::MalformedRequest { .. } | Self::UnsupportedAlgorithm { .. } => {
                SetErrorCategory::Malformed
            }
            Self::KeyResolution(_) => SetErrorCategory::KeyResolution,
            Self::SignatureInvalid => SetErrorCategory::Signature,
            Self::ClaimMismatch { .. } => SetErrorCategory::Claims,
        }
    }
}

/// Categories of verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetErrorCategory {
    Malformed,
    KeyResolution,
    Signature,
    Claims,
}

impl SetErrorCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::KeyResolution => "key_resolution",
            Self::Signature => "signature",
            Self::Claims => "claims",
        }
    }
}

impl fmt::Display for SetErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
