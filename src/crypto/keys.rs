//! Resolving a [`Jwk`] into a verifying key and checking a JWS signature
//! against it.
//!
//! Only the algorithms in the server's default allow-list are supported:
//! RS256 (RSASSA-PKCS1-v1_5 with SHA-256), ES256 (ECDSA P-256 with SHA-256),
//! and ES384 (ECDSA P-384 with SHA-384). `none` and every other curve are
//! rejected outright (ACME §4.2, step 2).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::signature::Verifier as _;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::traits::PublicKeyParts;
use rsa::BigUint;
use sha2::{Digest, Sha256};

use crate::error::{AcmeError, AcmeErrorKind};
use crate::wire::jose::Jwk;

/// A resolved verifying key, wrapping whichever key type the JWK described.
pub enum VerifyingKey {
    Rs256(Box<rsa::RsaPublicKey>),
    Es256(Box<p256::ecdsa::VerifyingKey>),
    Es384(Box<p384::ecdsa::VerifyingKey>),
}

impl VerifyingKey {
    /// Resolves a [`Jwk`] into a verifying key for the given JWS `alg`.
    /// Fails with `badSignatureAlgorithm` if the key type and `alg` don't
    /// correspond to one another (e.g. an RSA key presented under `ES256`).
    pub fn from_jwk(jwk: &Jwk, alg: &str) -> Result<Self, AcmeError> {
        match alg {
            "RS256" => {
                let n = decode_uint(jwk.n.as_deref(), "n")?;
                let e = decode_uint(jwk.e.as_deref(), "e")?;
                let key = rsa::RsaPublicKey::new(n, e).map_err(|err| {
                    AcmeError::new(
                        AcmeErrorKind::Malformed,
                        format!("invalid RSA public key: {err}"),
                    )
                })?;
                Ok(VerifyingKey::Rs256(Box::new(key)))
            }
            "ES256" => {
                let point = encoded_point(jwk, "P-256")?;
                let key = p256::ecdsa::VerifyingKey::from_encoded_point(&point).map_err(|err| {
                    AcmeError::new(
                        AcmeErrorKind::Malformed,
                        format!("invalid P-256 public key: {err}"),
                    )
                })?;
                Ok(VerifyingKey::Es256(Box::new(key)))
            }
            "ES384" => {
                let point = encoded_point_p384(jwk)?;
                let key = p384::ecdsa::VerifyingKey::from_encoded_point(&point).map_err(|err| {
                    AcmeError::new(
                        AcmeErrorKind::Malformed,
                        format!("invalid P-384 public key: {err}"),
                    )
                })?;
                Ok(VerifyingKey::Es384(Box::new(key)))
            }
            other => Err(AcmeError::new(
                AcmeErrorKind::BadSignatureAlgorithm,
                format!("unsupported alg: {other}"),
            )),
        }
    }

    /// Verifies `signature` over `signing_input` (`protected || '.' || payload`).
    pub fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<(), AcmeError> {
        let bad_signature = || {
            AcmeError::new(AcmeErrorKind::Malformed, "JWS signature verification failed")
        };
        match self {
            VerifyingKey::Rs256(key) => {
                let verifying_key = RsaVerifyingKey::<Sha256>::new((**key).clone());
                let sig = RsaSignature::try_from(signature).map_err(|_| bad_signature())?;
                verifying_key
                    .verify(signing_input, &sig)
                    .map_err(|_| bad_signature())
            }
            VerifyingKey::Es256(key) => {
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| bad_signature())?;
                key.verify(signing_input, &sig).map_err(|_| bad_signature())
            }
            VerifyingKey::Es384(key) => {
                let sig = p384::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| bad_signature())?;
                key.verify(signing_input, &sig).map_err(|_| bad_signature())
            }
        }
    }
}

fn decode_uint(field: Option<&str>, name: &'static str) -> Result<BigUint, AcmeError> {
    let encoded = field.ok_or_else(|| {
        AcmeError::new(AcmeErrorKind::Malformed, format!("JWK missing field '{name}'"))
    })?;
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| AcmeError::new(AcmeErrorKind::Malformed, format!("JWK field '{name}' is not valid base64url")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encoded_point(jwk: &Jwk, expected_crv: &str) -> Result<p256::EncodedPoint, AcmeError> {
    if jwk.crv.as_deref() != Some(expected_crv) {
        return Err(AcmeError::new(
            AcmeErrorKind::BadSignatureAlgorithm,
            format!("JWK crv does not match alg (expected {expected_crv})"),
        ));
    }
    let x = decode_coord(jwk.x.as_deref(), "x")?;
    let y = decode_coord(jwk.y.as_deref(), "y")?;
    Ok(p256::EncodedPoint::from_affine_coordinates(
        x.as_slice().into(),
        y.as_slice().into(),
        false,
    ))
}

fn encoded_point_p384(jwk: &Jwk) -> Result<p384::EncodedPoint, AcmeError> {
    if jwk.crv.as_deref() != Some("P-384") {
        return Err(AcmeError::new(
            AcmeErrorKind::BadSignatureAlgorithm,
            "JWK crv does not match alg (expected P-384)",
        ));
    }
    let x = decode_coord(jwk.x.as_deref(), "x")?;
    let y = decode_coord(jwk.y.as_deref(), "y")?;
    Ok(p384::EncodedPoint::from_affine_coordinates(
        x.as_slice().into(),
        y.as_slice().into(),
        false,
    ))
}

fn decode_coord(field: Option<&str>, name: &'static str) -> Result<Vec<u8>, AcmeError> {
    let encoded = field.ok_or_else(|| {
        AcmeError::new(AcmeErrorKind::Malformed, format!("JWK missing field '{name}'"))
    })?;
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| AcmeError::new(AcmeErrorKind::Malformed, format!("JWK field '{name}' is not valid base64url")))
}

/// SHA-256 JWK thumbprint per RFC 7638, base64url-encoded.
pub fn thumbprint(jwk: &Jwk) -> String {
    let canonical = jwk.canonical_json();
    let bytes = serde_json::to_vec(&canonical).expect("canonical JWK JSON always serializes");
    let digest = Sha256::digest(&bytes);
    URL_SAFE_NO_PAD.encode(digest)
}

/// Checks whether `jwk` describes the same public key as the leaf
/// certificate `leaf_der`. Used for `revokeCert`'s "signed by the
/// certificate's own key" authorization path (RFC 8555 §7.6): a request
/// embeds a `jwk` instead of a `kid`, and that key must match the
/// certificate being revoked rather than any stored account.
pub fn jwk_matches_certificate_key(jwk: &Jwk, leaf_der: &[u8]) -> bool {
    use x509_parser::prelude::{FromDer, X509Certificate};
    use x509_parser::public_key::PublicKey;

    let Ok((_, cert)) = X509Certificate::from_der(leaf_der) else {
        return false;
    };
    let Ok(public_key) = cert.public_key().parsed() else {
        return false;
    };

    match public_key {
        PublicKey::EC(point) if jwk.kty == "EC" => {
            let data = point.data();
            let Some(coord_len) = data.len().checked_sub(1).map(|n| n / 2) else {
                return false;
            };
            if data.first() != Some(&0x04) || data.len() != 1 + 2 * coord_len {
                return false;
            }
            let (x, y) = (&data[1..1 + coord_len], &data[1 + coord_len..]);
            let Ok(jwk_x) = decode_coord(jwk.x.as_deref(), "x") else { return false };
            let Ok(jwk_y) = decode_coord(jwk.y.as_deref(), "y") else { return false };
            x == jwk_x.as_slice() && y == jwk_y.as_slice()
        }
        PublicKey::RSA(rsa_key) if jwk.kty == "RSA" => {
            let Ok(jwk_n) = decode_uint(jwk.n.as_deref(), "n") else { return false };
            let Ok(jwk_e) = decode_uint(jwk.e.as_deref(), "e") else { return false };
            BigUint::from_bytes_be(trim_leading_zero(rsa_key.modulus)) == jwk_n
                && BigUint::from_bytes_be(trim_leading_zero(rsa_key.exponent)) == jwk_e
        }
        _ => false,
    }
}

fn trim_leading_zero(bytes: &[u8]) -> &[u8] {
    match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    }
}
