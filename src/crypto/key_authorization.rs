//! Key authorization computation (RFC 8555 §8.1).
//!
//! `keyAuthorization = token || '.' || base64url(SHA-256(accountKey JWK thumbprint))`

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::wire::jose::Jwk;

pub fn key_authorization(token: &str, account_jwk: &Jwk) -> String {
    let thumbprint_digest = Sha256::digest(
        serde_json::to_vec(&account_jwk.canonical_json())
            .expect("canonical JWK JSON always serializes"),
    );
    let thumbprint_b64 = URL_SAFE_NO_PAD.encode(thumbprint_digest);
    format!("{token}.{thumbprint_b64}")
}

/// `base64url(SHA-256(keyAuthorization))`, used by the `dns-01` and
/// `tls-alpn-01` validators.
pub fn digest_key_authorization(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
