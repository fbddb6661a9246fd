//! JWS request envelope verification (RFC 8555 §6.2-§6.4).
//!
//! Every mutating request is a flattened JWS: `protected` names the `alg`,
//! the replay nonce, the binding `url`, and either an embedded `jwk` (only
//! valid for `newAccount` and `revokeCert`) or a `kid` pointing at an
//! existing account. This is the one gate every handler funnels its request
//! body through before touching a domain service.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::crypto::VerifyingKey;
use crate::domain::NoncePool;
use crate::error::{AcmeError, AcmeErrorKind, AcmeResult};
use crate::store::{AccountRecord, Store};
use crate::util::Name;
use crate::wire::jose::{FlattenedJws, Jwk, ProtectedHeader};

/// A JWS that passed signature, nonce, and URL-binding checks.
pub struct VerifiedRequest {
    /// The account the request was signed as, when the protected header
    /// carried a `kid`. `None` for requests signed with an embedded `jwk`
    /// that don't (yet) correspond to an account, e.g. `newAccount`.
    pub account: Option<AccountRecord>,
    pub jwk: Jwk,
    /// The decoded payload bytes. Empty for a POST-as-GET request.
    pub payload: Vec<u8>,
}

pub struct Envelope {
    store: std::sync::Arc<dyn Store>,
    nonces: std::sync::Arc<NoncePool>,
    allowed_algs: Vec<String>,
}

impl Envelope {
    pub fn new(store: std::sync::Arc<dyn Store>, nonces: std::sync::Arc<NoncePool>, allowed_algs: Vec<String>) -> Self {
        Envelope { store, nonces, allowed_algs }
    }

    /// Verifies `jws` was meant for `expected_url` and is validly signed,
    /// consuming its nonce in the process (ACME §6.4-§6.5).
    pub async fn verify(&self, jws: &FlattenedJws, expected_url: &str) -> AcmeResult<VerifiedRequest> {
        let header_bytes = URL_SAFE_NO_PAD
            .decode(&jws.protected)
            .map_err(|_| AcmeError::malformed("protected header is not valid base64url"))?;
        let header: ProtectedHeader = serde_json::from_slice(&header_bytes)
            .map_err(|_| AcmeError::malformed("protected header is not valid JSON"))?;

        if header.jwk.is_some() == header.kid.is_some() {
            return Err(AcmeError::malformed("protected header must carry exactly one of jwk or kid"));
        }

        if !self.allowed_algs.iter().any(|alg| alg == &header.alg) {
            return Err(AcmeError::new(AcmeErrorKind::BadSignatureAlgorithm, format!("alg {} is not accepted", header.alg)));
        }
        if header.url != expected_url {
            return Err(AcmeError::malformed("the JWS url header does not match the request URL"));
        }

        self.nonces.consume(&Name::from(header.nonce.as_str())).await?;

        let (jwk, account) = match (&header.jwk, &header.kid) {
            (Some(jwk), None) => (jwk.clone(), None),
            (None, Some(kid)) => {
                let name = kid_to_name(kid)?;
                let account = self
                    .store
                    .get_account(&name)
                    .await?
                    .ok_or_else(|| AcmeError::new(AcmeErrorKind::AccountDoesNotExist, "no account exists for this kid"))?;
                if !matches!(account.status, crate::wire::account::AccountStatus::Valid) {
                    return Err(AcmeError::unauthorized("account is deactivated or revoked"));
                }
                (account.jwk.clone(), Some(account))
            }
            // Unreachable: the exclusivity check above already rejected every
            // other combination of jwk/kid presence.
            _ => unreachable!("jwk/kid exclusivity already checked"),
        };

        let verifying_key = VerifyingKey::from_jwk(&jwk, &header.alg)?;
        let signing_input = format!("{}.{}", jws.protected, jws.payload);
        let signature = URL_SAFE_NO_PAD
            .decode(&jws.signature)
            .map_err(|_| AcmeError::malformed("signature is not valid base64url"))?;
        verifying_key.verify(signing_input.as_bytes(), &signature)?;

        let payload = if jws.payload.is_empty() {
            Vec::new()
        } else {
            URL_SAFE_NO_PAD
                .decode(&jws.payload)
                .map_err(|_| AcmeError::malformed("payload is not valid base64url"))?
        };

        Ok(VerifiedRequest { account, jwk, payload })
    }
}

fn kid_to_name(kid: &str) -> AcmeResult<Name> {
    kid.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(Name::from)
        .ok_or_else(|| AcmeError::malformed("kid is not a well-formed account URL"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};
    use p256::elliptic_curve::rand_core::OsRng;

    use super::*;
    use crate::store::memory::InMemoryStore;

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

    #[tokio::test]
    async fn verifies_a_jwk_signed_request() {
        let store = Arc::new(InMemoryStore::new());
        let nonces = Arc::new(NoncePool::new(store.clone()));
        let envelope = Envelope::new(store, nonces.clone(), vec!["ES256".into()]);

        let signing_key = SigningKey::random(&mut OsRng);
        let nonce = nonces.issue().await.unwrap();
        let header = ProtectedHeader {
            alg: "ES256".into(),
            nonce: nonce.to_string(),
            url: "https://acme.example.org/acme/newaccount".into(),
            jwk: Some(jwk_for(&signing_key)),
            kid: None,
        };
        let jws = sign(&header, "{}", &signing_key);

        let verified = envelope.verify(&jws, "https://acme.example.org/acme/newaccount").await.unwrap();
        assert!(verified.account.is_none());
        assert_eq!(verified.payload, b"{}");
    }

    #[tokio::test]
    async fn rejects_mismatched_url() {
        let store = Arc::new(InMemoryStore::new());
        let nonces = Arc::new(NoncePool::new(store.clone()));
        let envelope = Envelope::new(store, nonces.clone(), vec!["ES256".into()]);

        let signing_key = SigningKey::random(&mut OsRng);
        let nonce = nonces.issue().await.unwrap();
        let header = ProtectedHeader {
            alg: "ES256".into(),
            nonce: nonce.to_string(),
            url: "https://acme.example.org/acme/newaccount".into(),
            jwk: Some(jwk_for(&signing_key)),
            kid: None,
        };
        let jws = sign(&header, "{}", &signing_key);

        let err = envelope.verify(&jws, "https://acme.example.org/acme/neworders").await.unwrap_err();
        assert_eq!(err.kind, AcmeErrorKind::Malformed);
    }

    #[tokio::test]
    async fn rejects_disallowed_alg() {
        let store = Arc::new(InMemoryStore::new());
        let nonces = Arc::new(NoncePool::new(store.clone()));
        let envelope = Envelope::new(store, nonces.clone(), vec!["ES384".into()]);

        let signing_key = SigningKey::random(&mut OsRng);
        let nonce = nonces.issue().await.unwrap();
        let header = ProtectedHeader {
            alg: "ES256".into(),
            nonce: nonce.to_string(),
            url: "https://acme.example.org/acme/newaccount".into(),
            jwk: Some(jwk_for(&signing_key)),
            kid: None,
        };
        let jws = sign(&header, "{}", &signing_key);

        let err = envelope.verify(&jws, "https://acme.example.org/acme/newaccount").await.unwrap_err();
        assert_eq!(err.kind, AcmeErrorKind::BadSignatureAlgorithm);
    }
}
