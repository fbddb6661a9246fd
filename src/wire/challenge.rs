//! ACME Challenge resource (RFC 8555 §8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::ResourceStatus;
use crate::error::ProblemDocument;

pub static CHALLENGE_TYPE_HTTP_01: &str = "http-01";
pub static CHALLENGE_TYPE_DNS_01: &str = "dns-01";
pub static CHALLENGE_TYPE_TLS_ALPN_01: &str = "tls-alpn-01";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResource {
    #[serde(rename = "type")]
    pub type_: String,
    pub url: String,
    pub status: ChallengeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProblemDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// POST to `/acme/chall/{name}`: client signals readiness for validation.
/// RFC 8555 requires an empty JSON object; this server also tolerates the
/// legacy `keyAuthorization` field some older clients still send.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_authorization: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

impl ResourceStatus for ChallengeStatus {
    fn is_failure(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rfc8555_challenge_example() {
        let chal: ChallengeResource = serde_json::from_value(json!({
            "url": "https://example.com/acme/chall/prV_B7yEyA4",
            "type": "http-01",
            "status": "valid",
            "token": "DGyRejmCefe7v4NfDGDKfA"
        }))
        .unwrap();

        assert_eq!(chal.type_, "http-01");
        assert_eq!(chal.status, ChallengeStatus::Valid);
        assert_eq!(chal.token.as_deref(), Some("DGyRejmCefe7v4NfDGDKfA"));
    }

    #[test]
    fn empty_response_payload_parses() {
        let payload: ChallengeResponsePayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.key_authorization.is_none());
    }
}
