#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use kitsune_auth::{FxaConfig, SetVerifier};
use kitsune_db_memory::InMemoryStorage;
use kitsune_server::{AppConfig, AppState, build_router};
use kitsune_storage::{
    AccountEvent, AccountEventStatus, AccountEventStorage, AccountStorage, DynAccountStorage,
    EventType, NewAccountEvent, NewProfile, Profile, ProfileStorage, StorageError,
};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROVIDER_PRIVATE: &str = include_str!("../fixtures/provider_private.pem");
pub const PROVIDER_PUBLIC: &str = include_str!("../fixtures/provider_public.pem");
pub const ROGUE_PRIVATE: &str = include_str!("../fixtures/rogue_private.pem");
pub const ROGUE_PUBLIC: &str = include_str!("../fixtures/rogue_public.pem");

pub const ISSUER: &str = "http://example.com";
pub const CLIENT_ID: &str = "12345";
pub const JWKS_PATH: &str = "/v1/jwks";
pub const SUBSCRIPTION_EVENT: &str =
    "https://schemas.accounts.firefox.com/event/subscription-state-change";

pub fn example_claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": "54321",
        "aud": CLIENT_ID,
        "iat": 1565720808,
        "jti": "e19ed6c5-4816-4171-aa43-56ffe80dbda1",
        "events": {
            SUBSCRIPTION_EVENT: {
                "capabilities": ["capability_1", "capability_2"],
                "isActive": true,
                "changeTime": 1565721242227_i64
            }
        }
    })
}

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

/// Signs `claims` with RS256; the header carries only `alg` (and `kid` if given).
pub fn mint(private_pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.typ = None;
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn with_payload(token: &str, claims: &Value) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{}.{}.{}", parts[0], payload, parts[2])
}

pub async fn jwks_server(keys: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
        .mount(&server)
        .await;
    server
}

pub fn test_config(jwks: &MockServer) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.fxa = FxaConfig {
        issuer: ISSUER.into(),
        client_id: CLIENT_ID.into(),
        jwks_url: format!("{}{JWKS_PATH}", jwks.uri()),
        ..Default::default()
    };
    cfg.fxa.jwks.allow_http = true;
    cfg
}

pub struct TestServer {
    pub base: String,
    pub verifier: Arc<SetVerifier>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn webhook_url(&self) -> String {
        format!("{}/fxa/events", self.base)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

pub async fn start_server(cfg: &AppConfig, storage: DynAccountStorage) -> TestServer {
    let verifier = SetVerifier::from_config(&cfg.fxa).expect("verifier");
    let state = AppState::new(storage, verifier);
    let verifier = state.verifier.clone();
    let app = build_router(cfg, state);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        verifier,
        shutdown: Some(tx),
        handle,
    }
}

pub async fn start_memory_server(jwks: &MockServer) -> (TestServer, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    let server = start_server(&test_config(jwks), storage.clone()).await;
    (server, storage)
}

pub async fn post_token(server: &TestServer, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.webhook_url())
        .bearer_auth(token)
        .body(token.to_string())
        .send()
        .await
        .unwrap()
}

/// Storage whose every operation fails, as if the database were down.
pub struct UnavailableStorage;

fn down() -> StorageError {
    StorageError::connection_error("database unavailable")
}

#[async_trait]
impl AccountEventStorage for UnavailableStorage {
    async fn create_event(&self, _event: NewAccountEvent) -> Result<AccountEvent, StorageError> {
        Err(down())
    }

    async fn get_event(&self, _id: i64) -> Result<Option<AccountEvent>, StorageError> {
        Err(down())
    }

    async fn find_by_jwt_id(&self, _jwt_id: &str) -> Result<Vec<AccountEvent>, StorageError> {
        Err(down())
    }

    async fn list_events(
        &self,
        _status: Option<AccountEventStatus>,
        _limit: usize,
    ) -> Result<Vec<AccountEvent>, StorageError> {
        Err(down())
    }

    async fn transition(
        &self,
        _id: i64,
        _status: AccountEventStatus,
        _event_type: Option<EventType>,
    ) -> Result<AccountEvent, StorageError> {
        Err(down())
    }

    async fn count_events(&self) -> Result<u64, StorageError> {
        Err(down())
    }
}

#[async_trait]
impl ProfileStorage for UnavailableStorage {
    async fn create_profile(&self, _profile: NewProfile) -> Result<Profile, StorageError> {
        Err(down())
    }

    async fn get_profile(&self, _id: i64) -> Result<Option<Profile>, StorageError> {
        Err(down())
    }

    async fn find_profile_by_fxa_uid(
        &self,
        _fxa_uid: &str,
    ) -> Result<Option<Profile>, StorageError> {
        Err(down())
    }
}

#[async_trait]
impl AccountStorage for UnavailableStorage {
    fn backend_name(&self) -> &'static str {
        "unavailable"
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Err(down())
    }
}
