//! Identity provider configuration.

use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::jwks::JwksCacheConfig;

/// Settings for accepting Security Event Tokens from Firefox Accounts.
///
/// # Example (TOML)
///
/// ```toml
/// [fxa]
/// issuer = "https://accounts.firefox.com/"
/// client_id = "12345"
/// jwks_url = "https://oauth.accounts.firefox.com/v1/jwks"
/// algorithms = ["RS256"]
///
/// [fxa.jwks]
/// default_ttl = "1h"
/// request_timeout = "10s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FxaConfig {
    /// Expected `iss` claim, compared exactly.
    pub issuer: String,

    /// Relying-party client id; the expected `aud` claim.
    pub client_id: String,

    /// Where the provider publishes its signing keys.
    pub jwks_url: String,

    /// Accepted header `alg` values.
    pub algorithms: Vec<String>,

    /// Key-set cache behavior.
    pub jwks: JwksCacheConfig,
}

impl Default for FxaConfig {
    fn default() -> Self {
        Self {
            issuer: "https://accounts.firefox.com/".to_string(),
            client_id: String::new(),
            jwks_url: "https://oauth.accounts.firefox.com/v1/jwks".to_string(),
            algorithms: vec!["RS256".to_string()],
            jwks: JwksCacheConfig::default(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl FxaConfig {
    /// Parses the JWKS URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the URL does not parse.
    pub fn parsed_jwks_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.jwks_url).map_err(|e| {
            ConfigError::InvalidValue(format!("fxa.jwks_url '{}': {e}", self.jwks_url))
        })
    }

    /// Parses the algorithm allow-list.
    ///
    /// Only asymmetric algorithms are accepted; a key set never holds HMAC
    /// secrets.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unknown or symmetric algorithms.
    pub fn allowed_algorithms(&self) -> Result<Vec<Algorithm>, ConfigError> {
        self.algorithms
            .iter()
            .map(|name| {
                let alg = Algorithm::from_str(name).map_err(|_| {
                    ConfigError::InvalidValue(format!("Unknown algorithm: '{name}'"))
                })?;
                match alg {
                    Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                        Err(ConfigError::InvalidValue(format!(
                            "Symmetric algorithm '{name}' cannot be verified with a JWKS"
                        )))
                    }
                    _ => Ok(alg),
                }
            })
            .collect()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `issuer` or `client_id` is empty
    /// - `jwks_url` does not parse or uses a disallowed scheme
    /// - `algorithms` is empty or contains an unusable algorithm
    /// - the cache TTL bounds are inverted
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("fxa.issuer".to_string()));
        }

        if self.client_id.is_empty() {
            return Err(ConfigError::Missing("fxa.client_id".to_string()));
        }

        let url = self.parsed_jwks_url()?;
        match url.scheme() {
            "https" => {}
            "http" if self.jwks.allow_http => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "fxa.jwks_url scheme '{other}' is not allowed"
                )));
            }
        }

        if self.algorithms.is_empty() {
            return Err(ConfigError::Missing("fxa.algorithms".to_string()));
        }
        self.allowed_algorithms()?;

        if self.jwks.min_ttl > self.jwks.max_ttl {
            return Err(ConfigError::InvalidValue(
                "fxa.jwks.min_ttl must not exceed fxa.jwks.max_ttl".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn valid() -> FxaConfig {
        FxaConfig {
            issuer: "http://example.com".into(),
            client_id: "12345".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = FxaConfig::default();
        assert_eq!(config.algorithms, vec!["RS256"]);
        assert!(config.client_id.is_empty());
        assert!(!config.jwks.allow_http);
    }

    #[test]
    fn test_default_config_needs_client_id() {
        assert!(matches!(
            FxaConfig::default().validate(),
            Err(ConfigError::Missing(field)) if field == "fxa.client_id"
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = valid();
        config.issuer.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jwks_url_validation() {
        let mut config = valid();
        config.jwks_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        config.jwks_url = "http://localhost:9000/jwks".into();
        assert!(config.validate().is_err());

        config.jwks.allow_http = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_algorithm_validation() {
        let mut config = valid();
        config.algorithms = vec!["RS256".into(), "ES256".into()];
        assert_eq!(
            config.allowed_algorithms().unwrap(),
            vec![Algorithm::RS256, Algorithm::ES256]
        );

        config.algorithms = vec!["HS256".into()];
        assert!(config.validate().is_err());

        config.algorithms = vec!["none".into()];
        assert!(config.validate().is_err());

        config.algorithms.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_ttl_bounds_fail_validation() {
        let mut config = valid();
        config.jwks.min_ttl = Duration::from_secs(7200);
        config.jwks.max_ttl = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }
}
