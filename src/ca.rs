//! The certificate-authority backend contract (RFC 8555 §7.4.2, §7.6) and a
//! self-signing reference implementation.
//!
//! `CaHandler` is deliberately narrow: given a validated order's CSR, hand
//! back a certificate chain, or later revoke one. Everything about how a
//! certificate actually gets signed — HSM, offline root, remote CA protocol —
//! is the implementor's business. `LocalCa` is a reference implementation
//! good enough to drive the whole pipeline end to end without external
//! infrastructure. The CSR's own subject alternative names carry through
//! unmodified; matching them against the order's identifiers is the
//! certificate service's job, not this trait's.

use async_trait::async_trait;
use rcgen::{
    CertificateParams, CertificateSigningRequestParams, DistinguishedName, DnType, Issuer, KeyPair,
};
use tracing::instrument;

use crate::error::{AcmeError, AcmeErrorKind, AcmeResult};

/// A request to enroll a certificate for a finalized order. `csr_der` is
/// assumed already checked for a well-formed signature by the caller.
pub struct EnrollRequest {
    pub csr_der: Vec<u8>,
}

/// The result of a successful enrollment: a PEM chain, leaf first, plus the
/// leaf's own DER so the caller can index it for later revocation lookups.
pub struct EnrollResult {
    pub chain_pem: String,
    pub leaf_der: Vec<u8>,
}

#[async_trait]
pub trait CaHandler: Send + Sync + 'static {
    /// Issues a certificate for the given CSR.
    async fn enroll(&self, request: EnrollRequest) -> AcmeResult<EnrollResult>;

    /// Revokes a previously issued certificate (RFC 8555 §7.6). `reason` is
    /// an RFC 5280 CRLReason code.
    async fn revoke(&self, certificate_der: &[u8], reason: Option<u8>) -> AcmeResult<()>;
}

/// Self-signs leaf certificates from an in-memory CA key, generated fresh
/// each time the server starts. Good for exercising the full pipeline; not a
/// trust root anyone outside this process should honor.
pub struct LocalCa {
    ca_cert_pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl LocalCa {
    pub fn new() -> AcmeResult<Self> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "acmed reference CA");
        params.distinguished_name = dn;
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);

        let key_pair = KeyPair::generate()
            .map_err(|e| AcmeError::server_internal(format!("CA key generation failed: {e}")))?;
        let ca_cert = params
            .self_signed(&key_pair)
            .map_err(|e| AcmeError::server_internal(format!("CA self-signing failed: {e}")))?;
        let ca_cert_pem = ca_cert.pem();
        let issuer = Issuer::new(params, key_pair);
        Ok(LocalCa { ca_cert_pem, issuer })
    }
}

#[async_trait]
impl CaHandler for LocalCa {
    #[instrument(skip_all)]
    async fn enroll(&self, request: EnrollRequest) -> AcmeResult<EnrollResult> {
        let csr_params = CertificateSigningRequestParams::from_der(&request.csr_der)
            .map_err(|e| AcmeError::new(AcmeErrorKind::BadCsr, format!("invalid CSR: {e}")))?;
        let leaf = csr_params
            .signed_by(&self.issuer)
            .map_err(|e| AcmeError::new(AcmeErrorKind::BadCsr, format!("signing failed: {e}")))?;

        let chain_pem = format!("{}{}", leaf.pem(), self.ca_cert_pem);
        let leaf_der = leaf.der().to_vec();
        Ok(EnrollResult { chain_pem, leaf_der })
    }

    #[instrument(skip_all)]
    async fn revoke(&self, _certificate_der: &[u8], _reason: Option<u8>) -> AcmeResult<()> {
        // The reference CA keeps no CRL/OCSP responder; revocation is
        // reflected purely in this server's own certificate record.
        Ok(())
    }
}
