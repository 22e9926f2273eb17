//! Security Event Token verification pipeline.
//!
//! A token passes these stages in order, stopping at the first failure:
//!
//! 1. structure: three non-empty dot-separated segments
//! 2. header: decodes, and `alg` is allow-listed
//! 3. key resolution from the [`KeySetCache`]
//! 4. signature, with one forced key-set refresh if a cached set fails and
//!    no other forced refresh happened within the cooldown
//! 5. `iss` and `aud` against configuration
//! 6. remaining claims deserialize into [`SecurityEventClaims`]
//!
//! Nothing in the payload is trusted before stage 4 succeeds.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use serde_json::Value;
use tracing::{debug, trace};

use crate::claims::{Audience, SecurityEventClaims};
use crate::config::{ConfigError, FxaConfig};
use crate::error::SetError;
use crate::jwks::{KeySetCache, select_keys};

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns `SetError::MalformedRequest` if the header is absent, uses another
/// scheme, or carries an empty token.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, SetError> {
    let value = authorization.ok_or_else(|| SetError::malformed("missing Authorization header"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| SetError::malformed("Authorization header is not a Bearer credential"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(SetError::malformed(
            "Authorization header is not a Bearer credential",
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(SetError::malformed("empty Bearer token"));
    }
    Ok(token)
}

/// Verifies Security Event Tokens against the provider's published keys.
#[derive(Debug, Clone)]
pub struct SetVerifier {
    issuer: String,
    audience: String,
    algorithms: Vec<Algorithm>,
    keys: Arc<KeySetCache>,
}

impl SetVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        algorithms: Vec<Algorithm>,
        keys: Arc<KeySetCache>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithms,
            keys,
        }
    }

    /// Builds a verifier and its key-set cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn from_config(config: &FxaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let url = config.parsed_jwks_url()?;
        let cache = KeySetCache::new(url, config.jwks.clone())
            .map_err(|e| ConfigError::InvalidValue(format!("fxa.jwks_url: {e}")))?;

        Ok(Self::new(
            config.issuer.clone(),
            config.client_id.clone(),
            config.allowed_algorithms()?,
            Arc::new(cache),
        ))
    }

    /// The key-set cache used by this verifier.
    #[must_use]
    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Runs the full verification pipeline on a compact token.
    ///
    /// # Errors
    ///
    /// Returns the `SetError` of the first stage that fails.
    pub async fn verify(&self, token: &str) -> Result<SecurityEventClaims, SetError> {
        check_structure(token)?;

        let header = decode_header(token)
            .map_err(|e| SetError::malformed(format!("invalid token header: {e}")))?;
        if !self.algorithms.contains(&header.alg) {
            return Err(SetError::unsupported_algorithm(header.alg));
        }

        let payload = self.verify_signature(token, &header).await?;
        self.check_issuer_and_audience(&payload)?;

        let claims: SecurityEventClaims = serde_json::from_value(payload)
            .map_err(|e| SetError::malformed(format!("invalid claims: {e}")))?;

        debug!(
            sub = %claims.sub,
            jti = %claims.jti,
            events = claims.events.len(),
            "Security event token verified"
        );
        Ok(claims)
    }

    async fn verify_signature(&self, token: &str, header: &Header) -> Result<Value, SetError> {
        let snapshot = self.keys.keys().await?;

        match verify_with_key_set(token, header, &snapshot.jwks) {
            Err(err) if snapshot.from_cache && err.is_retryable_with_fresh_keys() => {
                debug!(error = %err, "Cached key set rejected token, refreshing once");
                match self.keys.refresh_after_rejection().await? {
                    Some(fresh) => verify_with_key_set(token, header, &fresh),
                    None => Err(err),
                }
            }
            result => result,
        }
    }

    fn check_issuer_and_audience(&self, payload: &Value) -> Result<(), SetError> {
        let iss = payload.get("iss").and_then(Value::as_str);
        if iss != Some(self.issuer.as_str()) {
            return Err(SetError::claim_mismatch(
                "iss",
                &self.issuer,
                describe(payload.get("iss")),
            ));
        }

        let aud = payload
            .get("aud")
            .cloned()
            .and_then(|v| serde_json::from_value::<Audience>(v).ok());
        if !aud.is_some_and(|aud| aud.contains(&self.audience)) {
            return Err(SetError::claim_mismatch(
                "aud",
                &self.audience,
                describe(payload.get("aud")),
            ));
        }

        Ok(())
    }
}

/// Tries each candidate key; the first one that verifies wins.
fn verify_with_key_set(token: &str, header: &Header, jwks: &JwkSet) -> Result<Value, SetError> {
    let candidates = select_keys(jwks, header.kid.as_deref(), header.alg)?;

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    for candidate in &candidates {
        match decode::<Value>(token, &candidate.key, &validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => {
                    return Err(SetError::malformed(format!("invalid token: {e}")));
                }
                _ => trace!(kid = ?candidate.kid, error = %e, "Key did not verify token"),
            },
        }
    }

    Err(SetError::SignatureInvalid)
}

fn check_structure(token: &str) -> Result<(), SetError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(SetError::malformed(
            "token is not a compact JWS (header.payload.signature)",
        ));
    }
    Ok(())
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "<missing>".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
