//! The ACME problem-document error type (RFC 8555 §6.7, RFC 7807).
//!
//! Every component returns a `(code, errorUrn, detail)` triple on failure;
//! this type is that triple. At the HTTP boundary it serializes as
//! `application/problem+json` via its own `IntoResponse` impl.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AcmeResult<T> = Result<T, AcmeError>;

/// ACME error kinds, one per `urn:ietf:params:acme:error:*` type (ACME §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcmeErrorKind {
    #[error("malformed")]
    Malformed,
    #[error("badNonce")]
    BadNonce,
    #[error("badSignatureAlgorithm")]
    BadSignatureAlgorithm,
    #[error("unauthorized")]
    Unauthorized,
    #[error("accountDoesNotExist")]
    AccountDoesNotExist,
    #[error("invalidContact")]
    InvalidContact,
    #[error("userActionRequired")]
    UserActionRequired,
    #[error("orderNotReady")]
    OrderNotReady,
    #[error("badCSR")]
    BadCsr,
    #[error("rejectedIdentifier")]
    RejectedIdentifier,
    #[error("connection")]
    Connection,
    #[error("dns")]
    Dns,
    #[error("tls")]
    Tls,
    #[error("incorrectResponse")]
    IncorrectResponse,
    #[error("caa")]
    Caa,
    #[error("serverInternal")]
    ServerInternal,
    #[error("alreadyRevoked")]
    AlreadyRevoked,
    #[error("badRevocationReason")]
    BadRevocationReason,
}

impl AcmeErrorKind {
    /// The `urn:ietf:params:acme:error:*` suffix, per RFC 8555 §6.7.
    pub fn urn(&self) -> String {
        let suffix = match self {
            AcmeErrorKind::Malformed => "malformed",
            AcmeErrorKind::BadNonce => "badNonce",
            AcmeErrorKind::BadSignatureAlgorithm => "badSignatureAlgorithm",
            AcmeErrorKind::Unauthorized => "unauthorized",
            AcmeErrorKind::AccountDoesNotExist => "accountDoesNotExist",
            AcmeErrorKind::InvalidContact => "invalidContact",
            AcmeErrorKind::UserActionRequired => "userActionRequired",
            AcmeErrorKind::OrderNotReady => "orderNotReady",
            AcmeErrorKind::BadCsr => "badCSR",
            AcmeErrorKind::RejectedIdentifier => "rejectedIdentifier",
            AcmeErrorKind::Connection => "connection",
            AcmeErrorKind::Dns => "dns",
            AcmeErrorKind::Tls => "tls",
            AcmeErrorKind::IncorrectResponse => "incorrectResponse",
            AcmeErrorKind::Caa => "caa",
            AcmeErrorKind::ServerInternal => "serverInternal",
            AcmeErrorKind::AlreadyRevoked => "alreadyRevoked",
            AcmeErrorKind::BadRevocationReason => "badRevocationReason",
        };
        format!("urn:ietf:params:acme:error:{suffix}")
    }

    /// Default HTTP status for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            AcmeErrorKind::AccountDoesNotExist => StatusCode::BAD_REQUEST,
            AcmeErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            AcmeErrorKind::ServerInternal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A fully-formed ACME error: kind, HTTP status override, and human-readable
/// detail. No error is ever silently swallowed — every fallible path in this
/// crate returns `AcmeResult<T>` rather than panicking or logging-and-continuing.
#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct AcmeError {
    pub kind: AcmeErrorKind,
    pub detail: String,
    status_override: Option<StatusCode>,
}

impl AcmeError {
    pub fn new(kind: AcmeErrorKind, detail: impl Into<String>) -> Self {
        AcmeError {
            kind,
            detail: detail.into(),
            status_override: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status_override.unwrap_or_else(|| self.kind.status())
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(AcmeErrorKind::Malformed, detail)
    }

    pub fn bad_nonce() -> Self {
        Self::new(AcmeErrorKind::BadNonce, "nonce is invalid or already used")
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(AcmeErrorKind::Unauthorized, detail)
    }

    pub fn server_internal(detail: impl Into<String>) -> Self {
        Self::new(AcmeErrorKind::ServerInternal, detail).with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// RFC 7807 problem-document wire format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemDocument {
    #[serde(rename = "type")]
    pub type_: String,
    pub detail: String,
}

impl From<&AcmeError> for ProblemDocument {
    fn from(err: &AcmeError) -> Self {
        ProblemDocument {
            type_: err.kind.urn(),
            detail: err.detail.clone(),
        }
    }
}

impl IntoResponse for AcmeError {
    fn into_response(self) -> Response {
        if matches!(self.kind, AcmeErrorKind::ServerInternal) {
            tracing::error!(detail = %self.detail, "internal error");
        }
        let status = self.status();
        let problem: ProblemDocument = (&self).into();
        let mut response = (status, Json(problem)).into_response();
        response
            .headers_mut()
            .insert("content-type", "application/problem+json".parse().unwrap());
        response
    }
}
