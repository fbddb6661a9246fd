//! Asynchronous CA callback webhook.
//!
//! `LocalCa` signs synchronously inside `finalize`, but a real CA backend
//! (an HSM queue, a manual approval step, a remote signing service) often
//! can't answer inline. This endpoint is the other half of that story: the
//! external CA calls back once it has a chain ready, naming the order it's
//! for, and this service attaches the chain and flips the order to `valid`
//! the same way `CertificateService::finalize` does for the synchronous
//! path.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::error::{AcmeError, AcmeResult};
use crate::store::{CertificateRecord, Store};
use crate::util::Name;

/// `POST /trigger` request body.
#[derive(Debug, Deserialize)]
pub struct TriggerPayload {
    /// The order this callback concludes.
    pub order: Name,
    /// base64url-encoded PEM certificate chain, leaf first.
    pub payload: String,
}

pub struct TriggerService {
    store: Arc<dyn Store>,
}

impl TriggerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        TriggerService { store }
    }

    pub async fn apply(&self, payload: TriggerPayload) -> AcmeResult<()> {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let mut order = self
            .store
            .get_order(&payload.order)
            .await?
            .ok_or_else(|| AcmeError::malformed("no such order"))?;
        if !order.finalizing || order.certificate.is_some() {
            return Err(AcmeError::malformed("order is not awaiting a CA callback"));
        }

        let chain_pem_bytes = URL_SAFE_NO_PAD
            .decode(&payload.payload)
            .map_err(|_| AcmeError::malformed("payload is not valid base64url"))?;
        let chain_pem = String::from_utf8(chain_pem_bytes)
            .map_err(|_| AcmeError::malformed("payload is not valid UTF-8 PEM"))?;
        let leaf_der = leaf_der_from_pem(&chain_pem)?;

        let cert_name = Name::generate();
        self.store
            .put_certificate(CertificateRecord {
                name: cert_name.clone(),
                order: order.name.clone(),
                account: order.account.clone(),
                chain_pem,
                leaf_der,
                issued_at: Utc::now(),
                revoked: false,
                revocation_reason: None,
            })
            .await?;

        order.certificate = Some(cert_name);
        order.finalizing = false;
        self.store.update_order(order).await
    }
}

fn leaf_der_from_pem(chain_pem: &str) -> AcmeResult<Vec<u8>> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(chain_pem.as_bytes())
        .map_err(|_| AcmeError::malformed("payload did not contain a parseable PEM certificate"))?;
    Ok(pem.contents)
}
