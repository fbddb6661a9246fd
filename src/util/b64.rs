//! base64url (no padding) encoding, per RFC 7515 §2 / RFC 4648 §5.
//!
//! JWS protected headers, payloads, signatures, and key-authorization
//! digests all use this alphabet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub fn encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

pub fn decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"hello world, this is an acme key authorization";
        let encoded = encode(data);
        assert!(!encoded.contains('='));
        assert_eq!(decode(&encoded).unwrap(), data);
    }
}
