//! JWS envelope and JWK wire types (RFC 7515 / RFC 7517).
//!
//! The server only ever receives a flattened JWS serialization — `protected`,
//! `payload`, and `signature`, each base64url — never the general (multi-
//! signature) serialization, matching RFC 8555 §6.2.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub static JOSE_CONTENT_TYPE: &str = "application/jose+json";

/// The flattened JWS serialization a client POSTs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlattenedJws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

/// The decoded JWS protected header (RFC 7515 §4.1, RFC 8555 §6.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtectedHeader {
    pub alg: String,
    pub nonce: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A JSON Web Key, as embedded in a protected header or an account record.
///
/// Only the key types this server's JWS allow-list supports are modeled:
/// RSA (for RS256) and the EC curves P-256/P-384 (for ES256/ES384).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Canonical JSON per RFC 7638 §3: the required members only, lexically
    /// ordered by member name, with no insignificant whitespace. Used as the
    /// SHA-256 thumbprint input.
    pub fn canonical_json(&self) -> Value {
        match self.kty.as_str() {
            "RSA" => serde_json::json!({
                "e": self.e,
                "kty": "RSA",
                "n": self.n,
            }),
            "EC" => serde_json::json!({
                "crv": self.crv,
                "kty": "EC",
                "x": self.x,
                "y": self.y,
            }),
            _ => serde_json::json!({ "kty": self.kty }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec_jwk_canonical_json_is_lexically_ordered() {
        let jwk = Jwk {
            kty: "EC".to_string(),
            crv: Some("P-256".to_string()),
            x: Some("f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU".to_string()),
            y: Some("x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0".to_string()),
            n: None,
            e: None,
        };
        let canonical = jwk.canonical_json();
        let keys: Vec<_> = canonical.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["crv", "kty", "x", "y"]);
    }

    #[test]
    fn protected_header_roundtrip() {
        let header = ProtectedHeader {
            alg: "ES256".to_string(),
            nonce: "abc123".to_string(),
            url: "https://example.org/acme/new-account".to_string(),
            jwk: None,
            kid: Some("https://example.org/acme/acct/1".to_string()),
        };
        let json = serde_json::to_string(&header).unwrap();
        let parsed: ProtectedHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.alg, "ES256");
        assert_eq!(parsed.kid.as_deref(), Some("https://example.org/acme/acct/1"));
    }
}
