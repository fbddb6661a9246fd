//! HTTP endpoints implemented by the ACME server (RFC 8555 §7.1).
//!
//! This is a thin dispatcher: every handler's job is to pull the JWS
//! envelope (or, for `/directory` and `/acme/newnonce`, nothing at all) out
//! of the request, hand it to [`crate::envelope::Envelope`] and the
//! relevant `domain` service, and translate the result back into an HTTP
//! response. No protocol state machine logic lives here.
//!
//! Every response — success or error — carries a fresh `Replay-Nonce` and a
//! `Link: <directory>; rel="index"` header (RFC 8555 §6.5, §7.1); that's
//! applied once, globally, by [`nonce_and_link_middleware`], rather than
//! repeated in each handler.

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::app::AppState;
use crate::domain::RevokeAuthorization;
use crate::envelope::VerifiedRequest;
use crate::error::{AcmeError, AcmeResult};
use crate::trigger::TriggerPayload;
use crate::util::Name;
use crate::wire::account::{AccountUpdatePayload, NewAccountPayload};
use crate::wire::authorization::AuthorizationUpdatePayload;
use crate::wire::certificate::RevokeCertPayload;
use crate::wire::challenge::ChallengeResponsePayload;
use crate::wire::common::LocationResource;
use crate::wire::jose::FlattenedJws;
use crate::wire::order::{FinalizePayload, NewOrderPayload};

/// Assembles the full ACME HTTP surface over `state`.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/directory", get(get_directory))
        .route("/acme/newnonce", get(new_nonce).head(new_nonce))
        .route("/acme/newaccount", post(new_account))
        .route("/acme/acct/{name}", post(update_account))
        .route("/acme/neworders", post(new_order))
        .route("/acme/order/{name}", post(get_order))
        .route("/acme/order/{name}/finalize", post(finalize_order))
        .route("/acme/authz/{name}", post(authz_handler))
        .route("/acme/chall/{name}", post(chall_handler))
        .route("/acme/cert/{name}", post(cert_handler))
        .route("/acme/revokecert", post(revoke_cert))
        .route("/acme/keychange", post(key_change))
        .route("/trigger", post(trigger_handler))
        .layer(axum::middleware::from_fn_with_state(state.clone(), nonce_and_link_middleware))
        .with_state(state)
}

/// Stamps every response with a fresh anti-replay nonce and the directory
/// link, regardless of whether the inner handler succeeded. Centralizing
/// this here is also why
/// `/acme/newnonce` itself needs no special-cased nonce-issuing logic below.
async fn nonce_and_link_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    if let Ok(nonce) = state.nonces().issue().await {
        if let Ok(value) = nonce.to_string().parse() {
            response.headers_mut().insert("replay-nonce", value);
        }
    }
    let link = format!("<{}/directory>; rel=\"index\"", state.config().base_url);
    if let Ok(value) = link.parse() {
        response.headers_mut().insert(header::LINK, value);
    }
    response
}

/// `GET /directory` (RFC 8555 §7.1.1).
#[instrument(skip_all)]
async fn get_directory(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.directory().resource())
}

/// `HEAD`/`GET /acme/newnonce` (RFC 8555 §7.2). The nonce itself
/// is stamped on by [`nonce_and_link_middleware`]; this handler only picks
/// the status code the RFC's example exchange uses: `200 OK` for `HEAD`,
/// `204 No Content` for `GET`.
#[instrument(skip_all)]
async fn new_nonce(method: Method) -> StatusCode {
    if method == Method::HEAD {
        StatusCode::OK
    } else {
        StatusCode::NO_CONTENT
    }
}

/// `POST /acme/newaccount` (RFC 8555 §7.3).
#[instrument(skip_all)]
async fn new_account(State(state): State<AppState>, body: Bytes) -> AcmeResult<Response> {
    let url = format!("{}/acme/newaccount", state.config().base_url);
    let verified = verify_envelope(&state, url, body).await?;
    let payload: NewAccountPayload = parse_or_default(&verified.payload)?;
    let (resource, created) = state
        .accounts()
        .register(&verified.jwk, payload, state.config().terms_of_service_required)
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(resource_response(status, resource))
}

/// `POST /acme/acct/{name}` (RFC 8555 §7.3.2/§7.3.6): a
/// POST-as-GET views the account, a `status: "deactivated"` payload
/// deactivates it.
#[instrument(skip_all)]
async fn update_account(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> AcmeResult<Response> {
    let name = Name::from(name);
    let url = state.accounts().location(&name);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_account(&verified, &name)?;

    let update: AccountUpdatePayload = parse_or_default(&verified.payload)?;
    let resource = match update.status {
        None => state.accounts().get(&account.name).await?,
        Some(crate::wire::account::AccountStatus::Deactivated) => state.accounts().deactivate(&account.name).await?,
        Some(_) => return Err(AcmeError::malformed("the only supported account update is deactivation")),
    };
    Ok(resource_response(StatusCode::OK, resource))
}

/// `POST /acme/neworders` (RFC 8555 §7.4).
#[instrument(skip_all)]
async fn new_order(State(state): State<AppState>, body: Bytes) -> AcmeResult<Response> {
    let url = format!("{}/acme/neworders", state.config().base_url);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_kid_account(&verified)?;
    let payload: NewOrderPayload = parse_required(&verified.payload)?;
    let resource = state.orders().create(&account.name, payload).await?;
    Ok(resource_response(StatusCode::CREATED, resource))
}

/// `POST /acme/order/{name}` (RFC 8555 §7.4): POST-as-GET view of an order.
#[instrument(skip_all)]
async fn get_order(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> AcmeResult<Response> {
    let name = Name::from(name);
    let url = state.orders().location(&name);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_kid_account(&verified)?;
    let resource = state.orders().get(&account.name, &name).await?;
    Ok(resource_response(StatusCode::OK, resource))
}

/// `POST /acme/order/{name}/finalize` (RFC 8555 §7.4): submits
/// the CSR once the order is `ready`.
#[instrument(skip_all)]
async fn finalize_order(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> AcmeResult<Response> {
    let name = Name::from(name);
    let url = state.orders().finalize_url(&name);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_kid_account(&verified)?;
    let payload: FinalizePayload = parse_required(&verified.payload)?;
    let order = state.orders().begin_finalization(&account.name, &name).await?;
    let resource = state.certificates().finalize(state.orders(), order, &payload.csr).await?;
    Ok(resource_response(StatusCode::OK, resource))
}

/// `POST /acme/authz/{name}` (RFC 8555 §7.5): POST-as-GET view,
/// or client-initiated deactivation.
#[instrument(skip_all)]
async fn authz_handler(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> AcmeResult<Response> {
    let name = Name::from(name);
    let url = state.authorizations().location(&name);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_kid_account(&verified)?;

    let update: AuthorizationUpdatePayload = parse_or_default(&verified.payload)?;
    let resource = match update.status {
        None => state.authorizations().get(&account.name, &name).await?,
        Some(crate::wire::authorization::AuthorizationStatus::Deactivated) => {
            state.authorizations().deactivate(&account.name, &name).await?
        }
        Some(_) => return Err(AcmeError::malformed("the only supported authorization update is deactivation")),
    };
    Ok(resource_response(StatusCode::OK, resource))
}

/// `POST /acme/chall/{name}` (RFC 8555 §7.5.1): triggers
/// out-of-band validation.
#[instrument(skip_all)]
async fn chall_handler(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> AcmeResult<Response> {
    let name = Name::from(name);
    let url = state.challenges().location(&name);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_kid_account(&verified)?;
    let _: ChallengeResponsePayload = parse_or_default(&verified.payload)?;

    let (resource, job) = state.challenges().begin_validation(&account.name, &name).await?;
    if let Some(job) = job {
        state.validator().spawn(job);
    }
    Ok((StatusCode::OK, Json(resource)).into_response())
}

/// `POST /acme/cert/{name}` (RFC 8555 §7.4.2): POST-as-GET
/// retrieval of the issued chain.
#[instrument(skip_all)]
async fn cert_handler(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> AcmeResult<Response> {
    let name = Name::from(name);
    let url = state.certificates().location(&name);
    let verified = verify_envelope(&state, url, body).await?;
    let account = require_kid_account(&verified)?;
    let chain_pem = state.certificates().get_chain(&account.name, &name).await?;

    let mut response = (StatusCode::OK, chain_pem).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, "application/pem-certificate-chain".parse().unwrap());
    Ok(response)
}

/// `POST /acme/revokecert` (RFC 8555 §7.6). Accepts either
/// account (`kid`) or certificate-key (`jwk`) authorization.
#[instrument(skip_all)]
async fn revoke_cert(State(state): State<AppState>, body: Bytes) -> AcmeResult<Response> {
    let url = format!("{}/acme/revokecert", state.config().base_url);
    let verified = verify_envelope(&state, url, body).await?;
    let payload: RevokeCertPayload = parse_required(&verified.payload)?;

    let authorization = match &verified.account {
        Some(account) => RevokeAuthorization::Account(&account.name),
        None => RevokeAuthorization::CertificateKey(&verified.jwk),
    };
    state.certificates().revoke(authorization, &payload.certificate, payload.reason).await?;
    Ok(StatusCode::OK.into_response())
}

/// `POST /acme/keychange` (RFC 8555 §7.3.5): key rollover is not
/// implemented, so the advertised URL resolves and reports it unsupported
/// rather than 404ing as an unknown route.
#[instrument(skip_all)]
async fn key_change() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// `POST /trigger`: the CA's asynchronous callback. Not an ACME client
/// request, so it carries no JWS envelope — it's an internal webhook from
/// the CA handler announcing a signed chain.
#[instrument(skip_all)]
async fn trigger_handler(State(state): State<AppState>, Json(payload): Json<TriggerPayload>) -> AcmeResult<StatusCode> {
    state.trigger().apply(payload).await?;
    Ok(StatusCode::OK)
}

/// Parses the raw request body as a flattened JWS and runs it through the
/// envelope verifier against `expected_url` (RFC 8555 §6.2-§6.4).
async fn verify_envelope(state: &AppState, expected_url: String, body: Bytes) -> AcmeResult<VerifiedRequest> {
    let jws: FlattenedJws =
        serde_json::from_slice(&body).map_err(|_| AcmeError::malformed("request body is not a valid flattened JWS"))?;
    state.envelope().verify(&jws, &expected_url).await
}

/// Requires the envelope resolved to an account (i.e. the request was
/// signed with `kid`, not an embedded `jwk`) and that it matches `name`.
/// Used by account-scoped POSTs where the URL path segment must agree with
/// who signed the request.
fn require_account<'a>(verified: &'a VerifiedRequest, name: &Name) -> AcmeResult<&'a crate::store::AccountRecord> {
    let account = require_kid_account(verified)?;
    if &account.name != name {
        return Err(AcmeError::unauthorized("the signing account does not match the request path"));
    }
    Ok(account)
}

/// Requires the envelope resolved to an account at all (i.e. `kid`, not
/// `jwk`). Every protected ACME resource other than `newAccount` and
/// `revokeCert`'s certificate-key path requires this.
fn require_kid_account(verified: &VerifiedRequest) -> AcmeResult<&crate::store::AccountRecord> {
    verified
        .account
        .as_ref()
        .ok_or_else(|| AcmeError::malformed("this endpoint requires a request signed with an account kid"))
}

fn parse_required<T: DeserializeOwned>(payload: &[u8]) -> AcmeResult<T> {
    serde_json::from_slice(payload).map_err(|_| AcmeError::malformed("the request payload is not valid JSON for this operation"))
}

fn parse_or_default<T: DeserializeOwned + Default>(payload: &[u8]) -> AcmeResult<T> {
    if payload.is_empty() {
        Ok(T::default())
    } else {
        parse_required(payload)
    }
}

/// Serializes a `LocationResource` wire resource, promoting its location
/// field to a `Location` response header rather than a body field (RFC 8555
/// resources carry their own URL only in the header, never in the JSON).
fn resource_response<T: serde::Serialize + LocationResource>(status: StatusCode, mut resource: T) -> Response {
    let location = resource.location_mut().take();
    let mut response = (status, Json(resource)).into_response();
    if let Some(location) = location {
        if let Ok(value) = location.parse() {
            response.headers_mut().insert(header::LOCATION, value);
        }
    }
    response
}
