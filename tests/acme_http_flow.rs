//! End-to-end HTTP tests against the assembled `Router`, using
//! `tower::ServiceExt::oneshot` the way axum applications are conventionally
//! tested. Walks the directory -> nonce -> newAccount -> re-registration
//! path (spec §8 scenario 1) and a rejected-nonce path (scenario 2).

use std::sync::Arc;

use acme_server::app::AppState;
use acme_server::ca::LocalCa;
use acme_server::config::Config;
use acme_server::store::memory::InMemoryStore;
use acme_server::{handlers, wire};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::rand_core::OsRng;
use serde_json::Value;
use tower::ServiceExt;
use wire::account::NewAccountPayload;
use wire::jose::{FlattenedJws, Jwk, ProtectedHeader};

fn test_app() -> (axum::Router, String) {
    let config = Config::default();
    let base_url = config.base_url.clone();
    let store = Arc::new(InMemoryStore::new());
    let ca = Arc::new(LocalCa::new().unwrap());
    let state = AppState::new(config, store, ca).unwrap();
    (handlers::routes(state), base_url)
}

fn jwk_for(signing_key: &SigningKey) -> Jwk {
    let point = signing_key.verifying_key().to_encoded_point(false);
    Jwk {
        kty: "EC".into(),
        crv: Some("P-256".into()),
        x: Some(URL_SAFE_NO_PAD.encode(point.x().unwrap())),
        y: Some(URL_SAFE_NO_PAD.encode(point.y().unwrap())),
        n: None,
        e: None,
    }
}

fn sign(header: &ProtectedHeader, payload: &str, signing_key: &SigningKey) -> FlattenedJws {
    let protected_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
    let payload_b64 = if payload.is_empty() { String::new() } else { URL_SAFE_NO_PAD.encode(payload.as_bytes()) };
    let signing_input = format!("{protected_b64}.{payload_b64}");
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    FlattenedJws {
        protected: protected_b64,
        payload: payload_b64,
        signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
    }
}

async fn fetch_nonce(app: &axum::Router) -> String {
    let request = Request::builder().method("HEAD").uri("/acme/newnonce").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.headers().get("replay-nonce").unwrap().to_str().unwrap().to_string()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn directory_lists_the_resource_urls() {
    let (app, base_url) = test_app();
    let request = Request::builder().uri("/directory").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["newNonce"], format!("{base_url}/acme/newnonce"));
    assert_eq!(body["newAccount"], format!("{base_url}/acme/newaccount"));
    assert_eq!(body["newOrder"], format!("{base_url}/acme/neworders"));
}

#[tokio::test]
async fn new_account_then_reregistration_is_idempotent() {
    let (app, base_url) = test_app();
    let signing_key = SigningKey::random(&mut OsRng);
    let jwk = jwk_for(&signing_key);
    let url = format!("{base_url}/acme/newaccount");

    let payload = NewAccountPayload {
        contact: vec!["mailto:ops@example.org".into()],
        terms_of_service_agreed: true,
        ..Default::default()
    };
    let payload_json = serde_json::to_string(&payload).unwrap();

    let nonce = fetch_nonce(&app).await;
    let header = ProtectedHeader { alg: "ES256".into(), nonce, url: url.clone(), jwk: Some(jwk.clone()), kid: None };
    let jws = sign(&header, &payload_json, &signing_key);

    let request = Request::builder()
        .method("POST")
        .uri("/acme/newaccount")
        .header("content-type", "application/jose+json")
        .body(Body::from(serde_json::to_vec(&jws).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers().get("location").unwrap().to_str().unwrap().to_string();

    let body = body_json(response).await;
    assert_eq!(body["status"], "valid");

    // Re-registering the same key (RFC 8555 §7.3.1) returns the existing
    // account with 200, not another 201.
    let nonce = fetch_nonce(&app).await;
    let header = ProtectedHeader { alg: "ES256".into(), nonce, url, jwk: Some(jwk), kid: None };
    let jws = sign(&header, &payload_json, &signing_key);

    let request = Request::builder()
        .method("POST")
        .uri("/acme/newaccount")
        .header("content-type", "application/jose+json")
        .body(Body::from(serde_json::to_vec(&jws).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("location").unwrap().to_str().unwrap(), location);
}

#[tokio::test]
async fn reused_nonce_is_rejected_with_bad_nonce() {
    let (app, base_url) = test_app();
    let signing_key = SigningKey::random(&mut OsRng);
    let jwk = jwk_for(&signing_key);
    let url = format!("{base_url}/acme/newaccount");
    let payload_json = serde_json::to_string(&NewAccountPayload {
        terms_of_service_agreed: true,
        ..Default::default()
    })
    .unwrap();

    let nonce = fetch_nonce(&app).await;
    let header = ProtectedHeader { alg: "ES256".into(), nonce, url, jwk: Some(jwk), kid: None };
    let jws = sign(&header, &payload_json, &signing_key);
    let body = Body::from(serde_json::to_vec(&jws).unwrap());

    let first = Request::builder().method("POST").uri("/acme/newaccount").body(body).unwrap();
    let response = app.clone().oneshot(first).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same JWS (and therefore the same already-consumed nonce) replayed.
    let second_body = Body::from(serde_json::to_vec(&jws).unwrap());
    let second = Request::builder().method("POST").uri("/acme/newaccount").body(second_body).unwrap();
    let response = app.oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let problem = body_json(response).await;
    assert_eq!(problem["type"], "urn:ietf:params:acme:error:badNonce");
}
