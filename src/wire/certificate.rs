//! `revokeCert` request payload (RFC 8555 §7.6).

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct RevokeCertPayload {
    /// base64url-encoded DER certificate.
    pub certificate: String,
    /// RFC 5280 §5.3.1 CRL reason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<u8>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn revoke_payload_parses_reason() {
        let payload: RevokeCertPayload = serde_json::from_value(json!({
            "certificate": "TGV0cyBFbmNyeXB0",
            "reason": 1
        }))
        .unwrap();
        assert_eq!(payload.reason, Some(1));
    }

    #[test]
    fn revoke_payload_reason_optional() {
        let payload: RevokeCertPayload = serde_json::from_value(json!({
            "certificate": "TGV0cyBFbmNyeXB0"
        }))
        .unwrap();
        assert_eq!(payload.reason, None);
    }
}
