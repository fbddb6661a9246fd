//! Challenge validation backends and the single-flight job runner.
//!
//! Each [`crate::domain::challenge::ValidationJob`] produced by
//! `ChallengeService::begin_validation` is handed to [`Validator::spawn`],
//! which runs it on its own `tokio::spawn`ed task, guarded by an in-flight
//! `DashMap` so a second request for the same challenge never runs a
//! redundant probe.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use dashmap::DashMap;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tracing::{instrument, warn};
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::{FromDer, Oid, X509Certificate};

use crate::crypto::digest_key_authorization;
use crate::domain::challenge::ValidationJob;
use crate::domain::{AuthorizationService, ChallengeService};
use crate::error::{AcmeError, AcmeErrorKind, AcmeResult, ProblemDocument};
use crate::util::Name;
use crate::wire::challenge::{CHALLENGE_TYPE_DNS_01, CHALLENGE_TYPE_HTTP_01, CHALLENGE_TYPE_TLS_ALPN_01};

/// id-pe-acmeIdentifier, RFC 8737 §3.
const ACME_IDENTIFIER_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 31];

pub struct Validator {
    challenges: Arc<ChallengeService>,
    authorizations: Arc<AuthorizationService>,
    http_client: reqwest::Client,
    dns_resolver: hickory_resolver::TokioAsyncResolver,
    validation_timeout: Duration,
    in_flight: DashMap<Name, ()>,
}

impl Validator {
    pub fn new(
        challenges: Arc<ChallengeService>,
        authorizations: Arc<AuthorizationService>,
        http01_redirect_limit: usize,
        validation_timeout_secs: u64,
    ) -> AcmeResult<Self> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(http01_redirect_limit))
            .build()
            .map_err(|e| AcmeError::server_internal(format!("failed to build http-01 client: {e}")))?;
        let dns_resolver = hickory_resolver::TokioAsyncResolver::tokio(
            hickory_resolver::config::ResolverConfig::default(),
            hickory_resolver::config::ResolverOpts::default(),
        );
        Ok(Validator {
            challenges,
            authorizations,
            http_client,
            dns_resolver,
            validation_timeout: Duration::from_secs(validation_timeout_secs),
            in_flight: DashMap::new(),
        })
    }

    /// Runs `job` on a background task, skipping it entirely if a job for
    /// the same challenge is already running (belt-and-suspenders: the
    /// challenge service's pending-to-processing transition already
    /// guarantees at most one caller reaches here per challenge).
    pub fn spawn(self: &Arc<Self>, job: ValidationJob) {
        if self.in_flight.insert(job.challenge.clone(), ()).is_some() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let challenge = job.challenge.clone();
            this.run(job).await;
            this.in_flight.remove(&challenge);
        });
    }

    #[instrument(skip_all, fields(challenge = %job.challenge, kind = %job.challenge_type))]
    async fn run(&self, job: ValidationJob) {
        let outcome = tokio::time::timeout(self.validation_timeout, self.probe(&job))
            .await
            .unwrap_or_else(|_| Err(AcmeError::new(AcmeErrorKind::Connection, "validation timed out")));

        match outcome {
            Ok(()) => {
                if let Err(err) = self.challenges.mark_valid(&job.challenge).await {
                    warn!(%err, "failed to record successful validation");
                    return;
                }
                if let Err(err) = self.authorizations.mark_valid(&job.authorization).await {
                    warn!(%err, "failed to mark authorization valid");
                }
            }
            Err(err) => {
                let problem = ProblemDocument { type_: err.kind.urn(), detail: err.detail.clone() };
                if let Err(store_err) = self.challenges.mark_invalid(&job.challenge, problem).await {
                    warn!(%store_err, "failed to record failed validation");
                    return;
                }
                if let Err(store_err) = self.authorizations.mark_invalid(&job.authorization).await {
                    warn!(%store_err, "failed to mark authorization invalid");
                }
            }
        }
    }

    async fn probe(&self, job: &ValidationJob) -> AcmeResult<()> {
        let Some(domain) = job.identifier.dns_name() else {
            return Err(AcmeError::new(AcmeErrorKind::RejectedIdentifier, "non-dns identifiers are not supported"));
        };
        match job.challenge_type.as_str() {
            t if t == CHALLENGE_TYPE_HTTP_01 => self.probe_http01(domain, &job.token, &job.key_authorization).await,
            t if t == CHALLENGE_TYPE_DNS_01 => self.probe_dns01(domain, &job.key_authorization).await,
            t if t == CHALLENGE_TYPE_TLS_ALPN_01 => self.probe_tls_alpn01(domain, &job.key_authorization).await,
            other => Err(AcmeError::new(AcmeErrorKind::Malformed, format!("unsupported challenge type: {other}"))),
        }
    }

    /// RFC 8555 §8.3. Fetches the well-known path over plain HTTP on port 80
    /// and checks the body is exactly the key authorization.
    async fn probe_http01(&self, domain: &str, token: &str, key_authorization: &str) -> AcmeResult<()> {
        let url = format!("http://{domain}/.well-known/acme-challenge/{token}");
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AcmeError::new(AcmeErrorKind::Connection, format!("http-01 request to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AcmeError::new(
                AcmeErrorKind::IncorrectResponse,
                format!("http-01 endpoint returned status {}", response.status()),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AcmeError::new(AcmeErrorKind::Connection, format!("failed to read http-01 response body: {e}")))?;
        if body.trim() == key_authorization {
            Ok(())
        } else {
            Err(AcmeError::new(AcmeErrorKind::IncorrectResponse, "http-01 response body did not match the key authorization"))
        }
    }

    /// RFC 8555 §8.4. Looks up `_acme-challenge.<domain>` TXT records and
    /// checks one of them equals `base64url(SHA-256(keyAuthorization))`.
    async fn probe_dns01(&self, domain: &str, key_authorization: &str) -> AcmeResult<()> {
        let expected = digest_key_authorization(key_authorization);
        let query = format!("_acme-challenge.{domain}.");
        let lookup = self
            .dns_resolver
            .txt_lookup(query)
            .await
            .map_err(|e| AcmeError::new(AcmeErrorKind::Dns, format!("dns-01 TXT lookup failed: {e}")))?;
        let matched = lookup.iter().any(|record| record.to_string().trim_matches('"') == expected);
        if matched {
            Ok(())
        } else {
            Err(AcmeError::new(AcmeErrorKind::IncorrectResponse, "no _acme-challenge TXT record matched the expected digest"))
        }
    }

    /// RFC 8737. Opens a raw TLS connection to the identifier on port 443
    /// with the `acme-tls/1` ALPN protocol, captures the server's
    /// certificate without validating its trust chain (the challenge lives
    /// entirely in the certificate's content, not in who signed it), and
    /// checks the acmeIdentifier extension against the expected digest.
    async fn probe_tls_alpn01(&self, domain: &str, key_authorization: &str) -> AcmeResult<()> {
        let expected = digest_key_authorization(key_authorization);
        let captured = Arc::new(std::sync::Mutex::new(None));

        let mut client_config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CapturingVerifier { captured: Arc::clone(&captured) }))
            .with_no_client_auth();
        client_config.alpn_protocols = vec![b"acme-tls/1".to_vec()];

        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| AcmeError::new(AcmeErrorKind::Malformed, "invalid dns identifier for tls-alpn-01"))?;

        let tcp = TcpStream::connect((domain, 443))
            .await
            .map_err(|e| AcmeError::new(AcmeErrorKind::Connection, format!("tls-alpn-01 TCP connect to {domain}:443 failed: {e}")))?;
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| AcmeError::new(AcmeErrorKind::Tls, format!("tls-alpn-01 handshake failed: {e}")))?;

        let der = captured
            .lock()
            .expect("capturing verifier mutex is never poisoned")
            .take()
            .ok_or_else(|| AcmeError::new(AcmeErrorKind::Tls, "server presented no certificate"))?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| AcmeError::new(AcmeErrorKind::Tls, format!("failed to parse peer certificate: {e}")))?;

        let acme_identifier_oid = Oid::from(ACME_IDENTIFIER_OID).expect("valid static OID");
        let digest = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid == acme_identifier_oid)
            .and_then(|ext| match ext.parsed_extension() {
                ParsedExtension::UnsupportedExtension { .. } => Some(ext.value),
                _ => None,
            })
            .ok_or_else(|| AcmeError::new(AcmeErrorKind::Tls, "peer certificate carries no acmeIdentifier extension"))?;

        // The extension value is the raw 32-byte digest wrapped in an
        // OCTET STRING; the inner content is the last 32 bytes.
        let inner = if digest.len() >= 32 { &digest[digest.len() - 32..] } else { digest };
        let expected_raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&expected)
            .map_err(|_| AcmeError::server_internal("computed digest was not valid base64url"))?;

        if inner == expected_raw.as_slice() {
            Ok(())
        } else {
            Err(AcmeError::new(AcmeErrorKind::IncorrectResponse, "acmeIdentifier extension did not match the expected digest"))
        }
    }
}

#[derive(Debug)]
struct CapturingVerifier {
    captured: Arc<std::sync::Mutex<Option<Vec<u8>>>>,
}

impl ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        *self.captured.lock().expect("capturing verifier mutex is never poisoned") = Some(end_entity.to_vec());
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
