//! Persisted entity shapes. These are the crate's
//! internal representation; the `wire::*` types are the RFC 8555 JSON
//! projections built from them by the `domain` services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProblemDocument;
use crate::util::Name;
use crate::wire::account::AccountStatus;
use crate::wire::authorization::AuthorizationStatus;
use crate::wire::challenge::ChallengeStatus;
use crate::wire::identifier::AcmeIdentifier;
use crate::wire::jose::Jwk;
use crate::wire::order::OrderStatus;

#[derive(Clone, Debug)]
pub struct NonceRecord {
    pub name: Name,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: Name,
    pub jwk: Jwk,
    pub thumbprint: String,
    pub contact: Vec<String>,
    pub terms_of_service_agreed: bool,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderRecord {
    pub name: Name,
    pub account: Name,
    pub identifiers: Vec<AcmeIdentifier>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub expires: DateTime<Utc>,
    pub authorizations: Vec<Name>,
    /// Set once the client has POSTed to the order's `finalize` URL.
    /// Combined with the authorizations' statuses, this lets the order's
    /// wire status be derived on read rather than stored directly (spec
    /// §4.4: "order status is a pure function of authorization statuses").
    pub finalizing: bool,
    pub certificate: Option<Name>,
    pub error: Option<ProblemDocumentRecord>,
}

/// `ProblemDocument` doesn't derive `Clone`/`(De)Serialize`; this is the
/// persisted equivalent, converted at the `wire` boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProblemDocumentRecord {
    pub type_: String,
    pub detail: String,
}

impl From<&ProblemDocument> for ProblemDocumentRecord {
    fn from(doc: &ProblemDocument) -> Self {
        ProblemDocumentRecord { type_: doc.type_.clone(), detail: doc.detail.clone() }
    }
}

impl From<&ProblemDocumentRecord> for ProblemDocument {
    fn from(rec: &ProblemDocumentRecord) -> Self {
        ProblemDocument { type_: rec.type_.clone(), detail: rec.detail.clone() }
    }
}

impl OrderRecord {
    /// Derives the RFC 8555 order status from the authorization statuses and
    /// the finalize/issuance flags.
    pub fn derive_status(&self, authz_statuses: &[AuthorizationStatus]) -> OrderStatus {
        if self.certificate.is_some() {
            return OrderStatus::Valid;
        }
        if self.error.is_some() {
            return OrderStatus::Invalid;
        }
        if authz_statuses
            .iter()
            .any(|s| matches!(s, AuthorizationStatus::Invalid | AuthorizationStatus::Expired | AuthorizationStatus::Revoked))
        {
            return OrderStatus::Invalid;
        }
        if self.finalizing {
            return OrderStatus::Processing;
        }
        if !authz_statuses.is_empty() && authz_statuses.iter().all(|s| matches!(s, AuthorizationStatus::Valid)) {
            return OrderStatus::Ready;
        }
        OrderStatus::Pending
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub name: Name,
    pub order: Name,
    pub account: Name,
    pub identifier: AcmeIdentifier,
    pub status: AuthorizationStatus,
    pub expires: DateTime<Utc>,
    pub wildcard: bool,
    pub challenges: Vec<Name>,
}

impl AuthorizationRecord {
    /// The status as it should be reported to a client: `expires` is a
    /// soft deadline (spec §3, "lifecycles") — an authorization still
    /// sitting in `pending` or `valid` past its expiry must be reported as
    /// `expired` on read, even though housekeeping hasn't swept it yet. A
    /// `deactivated`/`invalid`/`revoked` authorization is already terminal
    /// and isn't reclassified.
    pub fn effective_status(&self) -> AuthorizationStatus {
        if matches!(self.status, AuthorizationStatus::Pending | AuthorizationStatus::Valid) && self.expires < Utc::now() {
            AuthorizationStatus::Expired
        } else {
            self.status
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub name: Name,
    pub authorization: Name,
    pub account: Name,
    #[serde(rename = "type")]
    pub type_: String,
    pub token: String,
    pub status: ChallengeStatus,
    pub validated: Option<DateTime<Utc>>,
    pub error: Option<ProblemDocumentRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub name: Name,
    pub order: Name,
    pub account: Name,
    /// PEM-encoded leaf + chain, as returned by the `CaHandler`.
    pub chain_pem: String,
    /// DER-encoded leaf certificate, indexed for `revokeCert` lookups (ACME
    /// §7.6 identifies the certificate to revoke by its DER bytes, not by
    /// this crate's opaque name).
    pub leaf_der: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub revoked: bool,
    pub revocation_reason: Option<u8>,
}
