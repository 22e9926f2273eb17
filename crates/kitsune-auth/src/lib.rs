//! Security Event Token verification for Kitsune.
//!
//! Firefox Accounts notifies relying parties about account changes by
//! POSTing a signed JWT (a Security Event Token) as a Bearer credential.
//! This crate turns such a credential into trusted [`SecurityEventClaims`]:
//!
//! - [`jwks`]: fetches and caches the provider's published key set
//! - [`verifier`]: the verification pipeline
//! - [`claims`]: the verified claim set
//! - [`config`]: provider settings
//!
//! # Example
//!
//! ```ignore
//! use kitsune_auth::{FxaConfig, SetVerifier, bearer_token};
//!
//! let verifier = SetVerifier::from_config(&config)?;
//! let token = bearer_token(headers.get("authorization"))?;
//! let claims = verifier.verify(token).await?;
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod jwks;
pub mod verifier;

pub use claims::{Audience, IssuedAt, SecurityEventClaims};
pub use config::{ConfigError, FxaConfig};
pub use error::{SetError, SetErrorCategory};
pub use jwks::{JwksCacheConfig, JwksError, KeySetCache};
pub use verifier::{SetVerifier, bearer_token};
