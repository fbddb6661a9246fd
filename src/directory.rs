//! Directory service: builds the `DirectoryResource` every client fetches
//! first (RFC 8555 §7.1.1).

use crate::config::Config;
use crate::wire::directory::{DirectoryMetadata, DirectoryResource};

pub struct Directory {
    config: Config,
}

impl Directory {
    pub fn new(config: Config) -> Self {
        Directory { config }
    }

    pub fn resource(&self) -> DirectoryResource {
        let base = &self.config.base_url;
        DirectoryResource {
            new_nonce: format!("{base}/acme/newnonce"),
            new_account: format!("{base}/acme/newaccount"),
            new_order: format!("{base}/acme/neworders"),
            // RFC 8555 pre-authorization is not implemented; the field is
            // still published so clients that check for its presence before
            // calling it behave correctly (it simply isn't routed).
            new_authz: None,
            revoke_cert: format!("{base}/acme/revokecert"),
            key_change: format!("{base}/acme/keychange"),
            meta: DirectoryMetadata {
                terms_of_service: self.config.terms_of_service_url.clone(),
                website: self.config.website_url.clone(),
                caa_identities: self.config.caa_identities.clone(),
                external_account_required: None,
            },
        }
    }
}
