mod common;

use common::*;
use std::time::Duration;

use kitsune_auth::{Audience, FxaConfig, JwksCacheConfig, JwksError, SetError, SetVerifier};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn valid_token_is_verified() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    let claims = verifier.verify(&token).await.unwrap();

    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.aud, Audience::Single(CLIENT_ID.into()));
    assert_eq!(claims.sub, "54321");
    assert_eq!(claims.jti, "e19ed6c5-4816-4171-aa43-56ffe80dbda1");
    assert_eq!(claims.issued_at_text(), "1565720808");
    assert_eq!(
        claims.events["https://schemas.accounts.firefox.com/event/password-change"]["changeTime"],
        json!(1565721242227_i64)
    );
    assert_eq!(verifier.key_set().fetch_count(), 1);
}

#[tokio::test]
async fn token_signed_by_unpublished_key_is_rejected() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let token = mint(ROGUE_PRIVATE, Some("k1"), &example_claims());

    // Fresh fetch: no retry.
    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, SetError::SignatureInvalid));
    assert_eq!(verifier.key_set().fetch_count(), 1);

    // Cached set: exactly one refresh, then give up.
    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, SetError::SignatureInvalid));
    assert_eq!(verifier.key_set().fetch_count(), 2);

    // Within the cooldown: rejected without another fetch.
    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, SetError::SignatureInvalid));
    assert_eq!(verifier.key_set().fetch_count(), 2);
}

#[tokio::test]
async fn made_up_kids_do_not_refetch_within_cooldown() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let valid = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    verifier.verify(&valid).await.unwrap();
    assert_eq!(verifier.key_set().fetch_count(), 1);

    for n in 0..10 {
        let token = mint(PROVIDER_PRIVATE, Some(&format!("made-up-{n}")), &example_claims());
        assert!(matches!(
            verifier.verify(&token).await.unwrap_err(),
            SetError::KeyResolution(JwksError::KeyNotFound(_))
        ));
    }
    assert_eq!(verifier.key_set().fetch_count(), 2);

    // Cached keys keep working for valid tokens.
    verifier.verify(&valid).await.unwrap();
    assert_eq!(verifier.key_set().fetch_count(), 2);
}

#[tokio::test]
async fn forced_refresh_allowed_again_after_cooldown() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_with(
        &server,
        JwksCacheConfig::default().with_refresh_cooldown(Duration::from_millis(50)),
    );

    let valid = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    verifier.verify(&valid).await.unwrap();

    let unknown = mint(PROVIDER_PRIVATE, Some("k2"), &example_claims());
    assert!(verifier.verify(&unknown).await.is_err());
    assert!(verifier.verify(&unknown).await.is_err());
    assert_eq!(verifier.key_set().fetch_count(), 2);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(verifier.verify(&unknown).await.is_err());
    assert_eq!(verifier.key_set().fetch_count(), 3);
}

#[tokio::test]
async fn tampered_payload_is_rejected() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    let mut forged = example_claims();
    forged["sub"] = json!("attacker");
    let tampered = with_payload(&token, &forged);

    let err = verifier.verify(&tampered).await.unwrap_err();
    assert!(matches!(err, SetError::SignatureInvalid));
}

#[tokio::test]
async fn issuer_and_audience_must_match_exactly() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let mut claims = example_claims();
    claims["iss"] = json!("http://example.com/");
    let token = mint(PROVIDER_PRIVATE, Some("k1"), &claims);
    assert!(matches!(
        verifier.verify(&token).await.unwrap_err(),
        SetError::ClaimMismatch { claim: "iss", .. }
    ));

    let mut claims = example_claims();
    claims["aud"] = json!("54321");
    let token = mint(PROVIDER_PRIVATE, Some("k1"), &claims);
    assert!(matches!(
        verifier.verify(&token).await.unwrap_err(),
        SetError::ClaimMismatch { claim: "aud", .. }
    ));

    let mut claims = example_claims();
    claims["aud"] = json!(["other-rp", CLIENT_ID]);
    let token = mint(PROVIDER_PRIVATE, Some("k1"), &claims);
    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn missing_events_claim_is_malformed() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let mut claims = example_claims();
    claims.as_object_mut().unwrap().remove("events");
    let token = mint(PROVIDER_PRIVATE, Some("k1"), &claims);

    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, SetError::MalformedRequest { .. }));
}

#[tokio::test]
async fn rotated_key_is_picked_up_with_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(jwks(vec![rsa_jwk(ROGUE_PUBLIC, Some("old"))])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("new"))])),
        )
        .mount(&server)
        .await;

    let verifier = verifier_for(&server);

    let old = mint(ROGUE_PRIVATE, Some("old"), &example_claims());
    verifier.verify(&old).await.unwrap();
    assert_eq!(verifier.key_set().fetch_count(), 1);

    let new = mint(PROVIDER_PRIVATE, Some("new"), &example_claims());
    verifier.verify(&new).await.unwrap();
    assert_eq!(verifier.key_set().fetch_count(), 2);

    verifier.verify(&new).await.unwrap();
    assert_eq!(verifier.key_set().fetch_count(), 2);
}

#[tokio::test]
async fn token_without_kid_tries_every_signing_key() {
    let server = jwks_server(jwks(vec![
        rsa_jwk(ROGUE_PUBLIC, None),
        rsa_jwk(PROVIDER_PUBLIC, None),
    ]))
    .await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, None, &example_claims());
    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.sub, "54321");
}

#[tokio::test]
async fn unknown_kid_is_key_resolution_failure() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, Some("k2"), &example_claims());
    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(
        err,
        SetError::KeyResolution(JwksError::KeyNotFound(kid)) if kid == "k2"
    ));
}

#[tokio::test]
async fn unavailable_jwks_endpoint_is_key_resolution_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(
        err,
        SetError::KeyResolution(JwksError::HttpError(500))
    ));
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn non_json_jwks_is_key_resolution_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    assert!(matches!(
        verifier.verify(&token).await.unwrap_err(),
        SetError::KeyResolution(JwksError::ParseError(_))
    ));
}

#[tokio::test]
async fn key_set_is_cached_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "public, max-age=3600")
                .set_body_json(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);

    let token = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    for _ in 0..3 {
        verifier.verify(&token).await.unwrap();
    }
    assert_eq!(verifier.key_set().fetch_count(), 1);
    assert!(verifier.key_set().is_cached().await);
}

#[tokio::test]
async fn verifier_from_config() {
    let server = jwks_server(jwks(vec![rsa_jwk(PROVIDER_PUBLIC, Some("k1"))])).await;

    let mut config = FxaConfig {
        issuer: ISSUER.into(),
        client_id: CLIENT_ID.into(),
        jwks_url: format!("{}{JWKS_PATH}", server.uri()),
        ..Default::default()
    };
    assert!(SetVerifier::from_config(&config).is_err());

    config.jwks.allow_http = true;
    let verifier = SetVerifier::from_config(&config).unwrap();

    let token = mint(PROVIDER_PRIVATE, Some("k1"), &example_claims());
    assert!(verifier.verify(&token).await.is_ok());
}
