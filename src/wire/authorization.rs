//! ACME Authorization resource (RFC 8555 §7.1.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::challenge::ChallengeResource;
use super::common::{is_false, LocationResource, ResourceStatus};
use super::identifier::AcmeIdentifier;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResource {
    pub identifier: AcmeIdentifier,
    pub status: AuthorizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    pub challenges: Vec<ChallengeResource>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub wildcard: bool,
    #[serde(skip)]
    pub location: Option<String>,
}

impl LocationResource for AuthorizationResource {
    fn location_mut(&mut self) -> &mut Option<String> {
        &mut self.location
    }
}

/// POST to `/acme/authz/{name}`: the only recognized mutation is client
/// deactivation (RFC 8555 §7.5.2).
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationUpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AuthorizationStatus>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

impl ResourceStatus for AuthorizationStatus {
    fn is_failure(&self) -> bool {
        !matches!(self, Self::Pending | Self::Valid)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rfc8555_authorization_example() {
        let authz: AuthorizationResource = serde_json::from_value(json!({
            "status": "valid",
            "expires": "2015-03-01T14:09:07.99Z",
            "identifier": { "type": "dns", "value": "www.example.org" },
            "challenges": [
              {
                "url": "https://example.com/acme/chall/prV_B7yEyA4",
                "type": "http-01",
                "status": "valid",
                "token": "DGyRejmCefe7v4NfDGDKfA"
              }
            ],
            "wildcard": false
        }))
        .unwrap();

        assert_eq!(authz.status, AuthorizationStatus::Valid);
        assert_eq!(authz.identifier, AcmeIdentifier::dns("www.example.org"));
        assert_eq!(authz.challenges.len(), 1);
        assert!(!authz.wildcard);
    }
}
