//! Certificate service (RFC 8555 §7.4.2, §7.6): order finalization and
//! revocation.
//!
//! Finalization is the one place the CA handler is invoked synchronously:
//! the CSR is decoded, its DNS SANs are checked against the order's
//! identifiers, and only then is it handed to [`CaHandler::enroll`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME;
use x509_parser::traits::FromDer;

use crate::ca::{CaHandler, EnrollRequest, EnrollResult};
use crate::crypto;
use crate::domain::OrderService;
use crate::error::{AcmeError, AcmeErrorKind, AcmeResult};
use crate::store::{CertificateRecord, OrderRecord, Store};
use crate::util::Name;
use crate::wire::jose::Jwk;
use crate::wire::order::OrderResource;

pub struct CertificateService {
    store: Arc<dyn Store>,
    ca: Arc<dyn CaHandler>,
    base_url: String,
    ca_timeout: Duration,
}

/// Who is asking for a certificate to be revoked (RFC 8555 §7.6): either
/// the account that owns the order, or the holder of the certificate's own
/// private key proven via an embedded `jwk`.
pub enum RevokeAuthorization<'a> {
    Account(&'a Name),
    CertificateKey(&'a Jwk),
}

impl CertificateService {
    pub fn new(store: Arc<dyn Store>, ca: Arc<dyn CaHandler>, base_url: impl Into<String>, ca_timeout_secs: u64) -> Self {
        CertificateService { store, ca, base_url: base_url.into(), ca_timeout: Duration::from_secs(ca_timeout_secs) }
    }

    pub fn location(&self, name: &Name) -> String {
        format!("{}/acme/cert/{name}", self.base_url)
    }

    /// Finalizes an order already confirmed `ready` by the order service
    /// (RFC 8555 §7.4). Validates the CSR's identifiers match the order's,
    /// enrolls through the CA handler, and transitions the order to `valid`.
    pub async fn finalize(
        &self,
        orders: &OrderService,
        mut order: OrderRecord,
        csr_b64: &str,
    ) -> AcmeResult<OrderResource> {
        let csr_der = URL_SAFE_NO_PAD
            .decode(csr_b64)
            .map_err(|_| AcmeError::new(AcmeErrorKind::BadCsr, "csr is not valid base64url"))?;

        let requested: BTreeSet<String> = csr_dns_names(&csr_der)?.into_iter().map(|n| n.to_lowercase()).collect();
        let ordered: BTreeSet<String> = order.identifiers.iter().filter_map(|i| i.dns_name()).map(|n| n.to_lowercase()).collect();
        if requested != ordered {
            return Err(AcmeError::new(
                AcmeErrorKind::BadCsr,
                "CSR subject alternative names do not match the order's identifiers",
            ));
        }

        let result = match self.enroll_with_timeout(csr_der).await {
            Ok(result) => result,
            Err(err) => {
                let problem = crate::error::ProblemDocument::from(&err);
                order.error = Some((&problem).into());
                order.finalizing = false;
                self.store.update_order(order).await?;
                return Err(err);
            }
        };

        let cert_name = Name::generate();
        self.store
            .put_certificate(CertificateRecord {
                name: cert_name.clone(),
                order: order.name.clone(),
                account: order.account.clone(),
                chain_pem: result.chain_pem,
                leaf_der: result.leaf_der,
                issued_at: Utc::now(),
                revoked: false,
                revocation_reason: None,
            })
            .await?;

        order.certificate = Some(cert_name);
        order.finalizing = false;
        self.store.update_order(order.clone()).await?;

        orders.to_resource(&order).await
    }

    /// Handles `GET /acme/cert/{name}` (RFC 8555 §7.4.2).
    pub async fn get_chain(&self, account: &Name, name: &Name) -> AcmeResult<String> {
        let record = self
            .store
            .get_certificate(name)
            .await?
            .ok_or_else(|| AcmeError::malformed("no such certificate"))?;
        if &record.account != account {
            return Err(AcmeError::unauthorized("certificate does not belong to this account"));
        }
        Ok(record.chain_pem)
    }

    /// Handles `POST /acme/revokecert` (RFC 8555 §7.6). Authorization is
    /// satisfied either by the account that owns the certificate's order, or
    /// by proving possession of the certificate's own private key (an
    /// embedded `jwk` matching the leaf's public key).
    pub async fn revoke(&self, authorization: RevokeAuthorization<'_>, certificate_der_b64: &str, reason: Option<u8>) -> AcmeResult<()> {
        if let Some(code) = reason {
            if code == 7 || code > 10 {
                return Err(AcmeError::new(AcmeErrorKind::BadRevocationReason, format!("unsupported reason code: {code}")));
            }
        }
        let der = URL_SAFE_NO_PAD
            .decode(certificate_der_b64)
            .map_err(|_| AcmeError::malformed("certificate is not valid base64url"))?;

        let record = self
            .store
            .find_certificate_by_der(&der)
            .await?
            .ok_or_else(|| AcmeError::malformed("unknown certificate"))?;

        let authorized = match authorization {
            RevokeAuthorization::Account(account) => &record.account == account,
            RevokeAuthorization::CertificateKey(jwk) => crypto::jwk_matches_certificate_key(jwk, &record.leaf_der),
        };
        if !authorized {
            return Err(AcmeError::unauthorized("caller is not authorized to revoke this certificate"));
        }
        if record.revoked {
            return Err(AcmeError::new(AcmeErrorKind::AlreadyRevoked, "certificate is already revoked"));
        }

        tokio::time::timeout(self.ca_timeout, self.ca.revoke(&der, reason))
            .await
            .map_err(|_| AcmeError::new(AcmeErrorKind::Connection, "CA revocation timed out"))??;

        let mut record = record;
        record.revoked = true;
        record.revocation_reason = reason;
        self.store.update_certificate(record).await
    }

    /// Enrolls through the CA handler, bounded by the configured CA
    /// timeout (spec §5: "CA calls have their own timeout (default 120 s).
    /// Timeouts surface as invalid with a descriptive error record").
    async fn enroll_with_timeout(&self, csr_der: Vec<u8>) -> AcmeResult<EnrollResult> {
        tokio::time::timeout(self.ca_timeout, self.ca.enroll(EnrollRequest { csr_der }))
            .await
            .map_err(|_| AcmeError::new(AcmeErrorKind::Connection, "CA enrollment timed out"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rcgen::{CertificateParams, KeyPair};

    use crate::domain::OrderService;
    use crate::store::memory::InMemoryStore;
    use crate::wire::identifier::AcmeIdentifier;
    use crate::wire::order::NewOrderPayload;

    struct StubCa;

    #[async_trait]
    impl CaHandler for StubCa {
        async fn enroll(&self, _request: EnrollRequest) -> AcmeResult<EnrollResult> {
            Ok(EnrollResult { chain_pem: "stub-chain".into(), leaf_der: vec![1, 2, 3] })
        }
        async fn revoke(&self, _certificate_der: &[u8], _reason: Option<u8>) -> AcmeResult<()> {
            Ok(())
        }
    }

    fn csr_der_for(names: &[&str]) -> Vec<u8> {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params.serialize_request(&key_pair).unwrap().der().to_vec()
    }

    async fn ready_order(orders: &OrderService, store: &Arc<dyn Store>, domain: &str) -> (Name, OrderRecord) {
        let account = Name::generate();
        let payload = NewOrderPayload { identifiers: vec![AcmeIdentifier::dns(domain)], not_before: None, not_after: None };
        let resource = orders.create(&account, payload).await.unwrap();
        let order_name: Name = resource.location.unwrap().rsplit('/').next().unwrap().into();

        let mut order = store.get_order(&order_name).await.unwrap().unwrap();
        for authz_name in order.authorizations.clone() {
            let mut authz = store.get_authorization(&authz_name).await.unwrap().unwrap();
            authz.status = crate::wire::authorization::AuthorizationStatus::Valid;
            store.update_authorization(authz).await.unwrap();
        }
        order.finalizing = true;
        store.update_order(order.clone()).await.unwrap();
        (account, order)
    }

    fn services() -> (OrderService, CertificateService, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let orders = OrderService::new(
            store.clone(),
            "https://acme.example.org",
            7 * 24 * 3600,
            vec!["http-01".to_string()],
            false,
        );
        let certs = CertificateService::new(store.clone(), Arc::new(StubCa), "https://acme.example.org", 120);
        (orders, certs, store)
    }

    #[tokio::test]
    async fn finalize_rejects_csr_whose_sans_dont_match_the_order() {
        let (orders, certs, store) = services();
        let (_account, order) = ready_order(&orders, &store, "example.org").await;

        let csr = csr_der_for(&["not-example.org"]);
        let csr_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(csr);

        let err = certs.finalize(&orders, order.clone(), &csr_b64).await.unwrap_err();
        assert_eq!(err.kind, AcmeErrorKind::BadCsr);

        let stored = store.get_order(&order.name).await.unwrap().unwrap();
        assert!(stored.finalizing, "a badCSR rejection must not consume the finalization attempt");
        assert!(stored.certificate.is_none());
    }

    #[tokio::test]
    async fn revoking_an_already_revoked_certificate_is_rejected() {
        let (orders, certs, store) = services();
        let (account, order) = ready_order(&orders, &store, "example.org").await;

        let csr = csr_der_for(&["example.org"]);
        let csr_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(csr);
        certs.finalize(&orders, order.clone(), &csr_b64).await.unwrap();

        let stored = store.get_order(&order.name).await.unwrap().unwrap();
        let cert = store.get_certificate(stored.certificate.as_ref().unwrap()).await.unwrap().unwrap();
        let cert_der_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&cert.leaf_der);

        certs.revoke(RevokeAuthorization::Account(&account), &cert_der_b64, None).await.unwrap();
        let err = certs.revoke(RevokeAuthorization::Account(&account), &cert_der_b64, None).await.unwrap_err();
        assert_eq!(err.kind, AcmeErrorKind::AlreadyRevoked);
    }
}

fn csr_dns_names(der: &[u8]) -> AcmeResult<Vec<String>> {
    let (_, csr) = X509CertificationRequest::from_der(der)
        .map_err(|e| AcmeError::new(AcmeErrorKind::BadCsr, format!("invalid CSR: {e}")))?;

    let Some(extensions) = csr.requested_extensions() else {
        return Err(AcmeError::new(AcmeErrorKind::BadCsr, "CSR carries no subject alternative names"));
    };

    for ext in extensions {
        if ext.oid == OID_X509_EXT_SUBJECT_ALT_NAME {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                return Ok(san
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect());
            }
        }
    }
    Err(AcmeError::new(AcmeErrorKind::BadCsr, "CSR carries no subject alternative names"))
}
