#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use kitsune_auth::{JwksCacheConfig, KeySetCache, SetVerifier};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROVIDER_PRIVATE: &str = include_str!("../fixtures/provider_private.pem");
pub const PROVIDER_PUBLIC: &str = include_str!("../fixtures/provider_public.pem");
pub const ROGUE_PRIVATE: &str = include_str!("../fixtures/rogue_private.pem");
pub const ROGUE_PUBLIC: &str = include_str!("../fixtures/rogue_public.pem");

pub const ISSUER: &str = "http://example.com";
pub const CLIENT_ID: &str = "12345";
pub const JWKS_PATH: &str = "/v1/jwks";

/// Claims from the FxA password-change example.
pub fn example_claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": "54321",
        "aud": CLIENT_ID,
        "iat": 1565720808,
        "jti": "e19ed6c5-4816-4171-aa43-56ffe80dbda1",
        "events": {
            "https://schemas.accounts.firefox.com/event/password-change": {
                "changeTime": 1565721242227_i64
            }
        }
    })
}

/// Builds an RSA JWK from a public key PEM.
pub fn rsa_jwk(public_pem: &str, kid: Option<&str>) -> Value {
    let key = RsaPublicKey::from_public_key_pem(public_pem).unwrap();
    let mut jwk = json!({
        "kty": "RSA",
        "use": "sig",
        "alg": "RS256",
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    });
    if let Some(kid) = kid {
        jwk["kid"] = json!(kid);
    }
    jwk
}

pub fn jwks(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

/// Signs `claims` with an RS256 private key PEM.
pub fn mint(private_pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Replaces the payload segment of a signed token, keeping its signature.
pub fn with_payload(token: &str, claims: &Value) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{}.{}.{}", parts[0], payload, parts[2])
}

/// Starts a JWKS endpoint that always serves `body`.
pub async fn jwks_server(body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

pub fn verifier_for(server: &MockServer) -> SetVerifier {
    verifier_with(server, JwksCacheConfig::default())
}

pub fn verifier_with(server: &MockServer, config: JwksCacheConfig) -> SetVerifier {
    let url = url::Url::parse(&format!("{}{JWKS_PATH}", server.uri())).unwrap();
    let cache = KeySetCache::new(url, config.with_allow_http(true)).unwrap();
    SetVerifier::new(ISSUER, CLIENT_ID, vec![Algorithm::RS256], Arc::new(cache))
}
