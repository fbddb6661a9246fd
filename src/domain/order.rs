//! Order service (RFC 8555 §7.4): order creation and status derivation.
//!
//! Creating an order eagerly creates one authorization per identifier, each
//! pre-populated with one challenge per configured challenge type (RFC 8555
//! §7.4). Order status is never stored directly; it is recomputed on every
//! read from the authorizations' statuses and the order's finalize/issuance
//! flags (`OrderRecord::derive_status`).

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;

use crate::error::{AcmeError, AcmeErrorKind, AcmeResult};
use crate::store::{AuthorizationRecord, ChallengeRecord, OrderRecord, Store};
use crate::util::{b64, Name};
use crate::wire::authorization::AuthorizationStatus;
use crate::wire::challenge::ChallengeStatus;
use crate::wire::identifier::AcmeIdentifier;
use crate::wire::order::{NewOrderPayload, OrderResource, OrderStatus};

pub struct OrderService {
    store: Arc<dyn Store>,
    base_url: String,
    order_ttl: Duration,
    challenge_types: Vec<String>,
    allow_wildcard: bool,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        base_url: impl Into<String>,
        order_ttl_secs: i64,
        challenge_types: Vec<String>,
        allow_wildcard: bool,
    ) -> Self {
        OrderService {
            store,
            base_url: base_url.into(),
            order_ttl: Duration::seconds(order_ttl_secs),
            challenge_types,
            allow_wildcard,
        }
    }

    pub fn location(&self, name: &Name) -> String {
        format!("{}/acme/order/{name}", self.base_url)
    }

    pub fn finalize_url(&self, name: &Name) -> String {
        format!("{}/acme/order/{name}/finalize", self.base_url)
    }

    fn authz_location(&self, name: &Name) -> String {
        format!("{}/acme/authz/{name}", self.base_url)
    }

    fn chall_location(&self, name: &Name) -> String {
        format!("{}/acme/chall/{name}", self.base_url)
    }

    /// Handles `POST /acme/neworders` (RFC 8555 §7.4).
    pub async fn create(&self, account: &Name, payload: NewOrderPayload) -> AcmeResult<OrderResource> {
        if payload.identifiers.is_empty() {
            return Err(AcmeError::malformed("an order must name at least one identifier"));
        }
        for identifier in &payload.identifiers {
            self.validate_identifier(identifier)?;
        }

        let now = Utc::now();
        let order_name = Name::generate();
        let expires = now + self.order_ttl;

        let mut authz_names = Vec::with_capacity(payload.identifiers.len());
        for identifier in &payload.identifiers {
            let wildcard = identifier.dns_name().is_some_and(|n| n.starts_with("*."));
            let authz_name = Name::generate();
            let mut challenge_names = Vec::with_capacity(self.challenge_types.len());
            for challenge_type in &self.challenge_types {
                let challenge_name = Name::generate();
                self.store
                    .put_challenge(ChallengeRecord {
                        name: challenge_name.clone(),
                        authorization: authz_name.clone(),
                        account: account.clone(),
                        type_: challenge_type.clone(),
                        token: generate_token(),
                        status: ChallengeStatus::Pending,
                        validated: None,
                        error: None,
                    })
                    .await?;
                challenge_names.push(challenge_name);
            }
            self.store
                .put_authorization(AuthorizationRecord {
                    name: authz_name.clone(),
                    order: order_name.clone(),
                    account: account.clone(),
                    identifier: identifier.clone(),
                    status: AuthorizationStatus::Pending,
                    expires,
                    wildcard,
                    challenges: challenge_names,
                })
                .await?;
            authz_names.push(authz_name);
        }

        let record = OrderRecord {
            name: order_name.clone(),
            account: account.clone(),
            identifiers: payload.identifiers,
            not_before: payload.not_before,
            not_after: payload.not_after,
            expires,
            authorizations: authz_names,
            finalizing: false,
            certificate: None,
            error: None,
        };
        self.store.put_order(record.clone()).await?;
        self.to_resource(&record).await
    }

    pub async fn get(&self, account: &Name, name: &Name) -> AcmeResult<OrderResource> {
        let record = self.lookup(account, name).await?;
        self.to_resource(&record).await
    }

    /// Handles `POST /acme/order/{name}/finalize` (RFC 8555 §7.4): marks the
    /// order processing. The caller (the certificate service) performs CSR
    /// validation and CA enrollment; this only enforces the `ready`
    /// precondition and flips the processing flag.
    pub async fn begin_finalization(&self, account: &Name, name: &Name) -> AcmeResult<OrderRecord> {
        let record = self.lookup(account, name).await?;
        let statuses = self.authorization_statuses(&record).await?;
        if record.derive_status(&statuses) != OrderStatus::Ready {
            return Err(AcmeError::new(AcmeErrorKind::OrderNotReady, "order is not ready to be finalized"));
        }
        let mut record = record;
        record.finalizing = true;
        self.store.update_order(record.clone()).await?;
        Ok(record)
    }

    async fn lookup(&self, account: &Name, name: &Name) -> AcmeResult<OrderRecord> {
        let record = self
            .store
            .get_order(name)
            .await?
            .ok_or_else(|| AcmeError::malformed("no such order"))?;
        if &record.account != account {
            return Err(AcmeError::unauthorized("order does not belong to this account"));
        }
        Ok(record)
    }

    async fn authorization_statuses(&self, order: &OrderRecord) -> AcmeResult<Vec<AuthorizationStatus>> {
        let mut statuses = Vec::with_capacity(order.authorizations.len());
        for name in &order.authorizations {
            let authz = self
                .store
                .get_authorization(name)
                .await?
                .ok_or_else(|| AcmeError::server_internal("order references a missing authorization"))?;
            statuses.push(authz.effective_status());
        }
        Ok(statuses)
    }

    pub async fn to_resource(&self, record: &OrderRecord) -> AcmeResult<OrderResource> {
        let statuses = self.authorization_statuses(record).await?;
        let status = record.derive_status(&statuses);
        Ok(OrderResource {
            status,
            expires: Some(record.expires),
            identifiers: record.identifiers.clone(),
            not_before: record.not_before,
            not_after: record.not_after,
            error: record.error.as_ref().map(|e| e.into()),
            authorizations: record.authorizations.iter().map(|n| self.authz_location(n)).collect(),
            finalize: Some(self.finalize_url(&record.name)),
            certificate: record.certificate.as_ref().map(|name| format!("{}/acme/cert/{name}", self.base_url)),
            location: Some(self.location(&record.name)),
        })
    }

    fn validate_identifier(&self, identifier: &AcmeIdentifier) -> AcmeResult<()> {
        if !identifier.is_dns() {
            return Err(AcmeError::new(
                AcmeErrorKind::RejectedIdentifier,
                format!("unsupported identifier type: {}", identifier.type_),
            ));
        }
        let name = identifier.value.as_str();
        if name.starts_with("*.") && !self.allow_wildcard {
            return Err(AcmeError::new(AcmeErrorKind::RejectedIdentifier, "wildcard identifiers are not supported"));
        }
        let unwrapped = name.strip_prefix("*.").unwrap_or(name);
        validate_dns_name(unwrapped)?;
        Ok(())
    }
}

/// Validates `name` is a syntactically well-formed DNS name per RFC 1035
/// §2.3.1/§2.3.4: 1-63 octets per label, 1-253 octets overall, each label
/// `[a-zA-Z0-9-]` with no leading or trailing hyphen, at least two labels.
fn validate_dns_name(name: &str) -> AcmeResult<()> {
    if name.is_empty() {
        return Err(AcmeError::new(AcmeErrorKind::RejectedIdentifier, "empty identifier value"));
    }
    if name.len() > 253 {
        return Err(AcmeError::new(AcmeErrorKind::RejectedIdentifier, "identifier exceeds 253 octets"));
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(AcmeError::new(AcmeErrorKind::RejectedIdentifier, "identifier must have at least two labels"));
    }
    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return Err(AcmeError::new(
                AcmeErrorKind::RejectedIdentifier,
                "each label must be between 1 and 63 octets",
            ));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(AcmeError::new(
                AcmeErrorKind::RejectedIdentifier,
                format!("label '{label}' contains characters outside [a-zA-Z0-9-]"),
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(AcmeError::new(
                AcmeErrorKind::RejectedIdentifier,
                format!("label '{label}' cannot start or end with a hyphen"),
            ));
        }
    }
    if labels.last().is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_digit())) {
        return Err(AcmeError::new(AcmeErrorKind::RejectedIdentifier, "top-level label cannot be all-numeric"));
    }
    Ok(())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    b64::encode(bytes)
}
