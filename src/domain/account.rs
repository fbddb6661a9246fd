//! Account service (RFC 8555 §7.3): registration, lookup, and deactivation.
//!
//! Accounts are keyed by the thumbprint of the JWK that signed their
//! `newAccount` request: at most one non-revoked account per key.
//! Registering with a key that already owns an account is not an error —
//! RFC 8555 §7.3.1 requires returning the existing account instead.

use std::sync::Arc;

use chrono::Utc;

use crate::crypto;
use crate::error::{AcmeError, AcmeErrorKind, AcmeResult};
use crate::store::{AccountRecord, Store};
use crate::util::Name;
use crate::wire::account::{AccountResource, AccountStatus, NewAccountPayload};
use crate::wire::jose::Jwk;

pub struct AccountService {
    store: Arc<dyn Store>,
    base_url: String,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, base_url: impl Into<String>) -> Self {
        AccountService { store, base_url: base_url.into() }
    }

    pub fn location(&self, name: &Name) -> String {
        format!("{}/acme/acct/{name}", self.base_url)
    }

    /// Handles `POST /acme/newaccount` (RFC 8555 §7.3). Returns the resolved
    /// account and whether it was freshly created (determines 201 vs 200 at
    /// the handler layer).
    pub async fn register(
        &self,
        jwk: &Jwk,
        payload: NewAccountPayload,
        terms_of_service_required: bool,
    ) -> AcmeResult<(AccountResource, bool)> {
        let thumbprint = crypto::thumbprint(jwk);
        let existing = self.store.find_account_by_thumbprint(&thumbprint).await?;

        if payload.only_return_existing {
            // A pure lookup: any account that ever owned this key answers it,
            // deactivated or not.
            return match existing {
                Some(account) => Ok((self.to_resource(&account), false)),
                None => Err(AcmeError::new(AcmeErrorKind::AccountDoesNotExist, "no account exists for the given key")),
            };
        }

        // A deactivated/revoked account's key is free to be claimed by a
        // fresh registration (spec §3 invariant 1 scopes uniqueness to
        // non-deactivated accounts); only a still-valid owner short-circuits
        // registration here.
        if let Some(existing) = existing {
            if !matches!(existing.status, AccountStatus::Deactivated | AccountStatus::Revoked) {
                return Ok((self.to_resource(&existing), false));
            }
        }

        if terms_of_service_required && !payload.terms_of_service_agreed {
            return Err(AcmeError::new(
                AcmeErrorKind::UserActionRequired,
                "the terms of service must be agreed to",
            ));
        }

        if payload.contact.is_empty() {
            return Err(AcmeError::new(
                AcmeErrorKind::InvalidContact,
                "at least one contact URI is required",
            ));
        }
        validate_contacts(&payload.contact)?;

        let record = AccountRecord {
            name: Name::generate(),
            jwk: jwk.clone(),
            thumbprint,
            contact: payload.contact,
            terms_of_service_agreed: payload.terms_of_service_agreed,
            status: AccountStatus::Valid,
            created_at: Utc::now(),
        };
        let winner = self.store.insert_account_if_absent(record.clone()).await?;
        let created = winner.name == record.name;
        Ok((self.to_resource(&winner), created))
    }

    pub async fn get(&self, name: &Name) -> AcmeResult<AccountResource> {
        let record = self.lookup(name).await?;
        Ok(self.to_resource(&record))
    }

    /// Handles `POST /acme/acct/{name}` with `{"status": "deactivated"}`
    /// (RFC 8555 §7.3.6). Deactivation is one-way: an already-deactivated or
    /// revoked account cannot be reactivated.
    pub async fn deactivate(&self, name: &Name) -> AcmeResult<AccountResource> {
        let mut record = self.lookup(name).await?;
        if matches!(record.status, AccountStatus::Deactivated | AccountStatus::Revoked) {
            return Ok(self.to_resource(&record));
        }
        record.status = AccountStatus::Deactivated;
        self.store.update_account(record.clone()).await?;
        Ok(self.to_resource(&record))
    }

    async fn lookup(&self, name: &Name) -> AcmeResult<AccountRecord> {
        self.store
            .get_account(name)
            .await?
            .ok_or_else(|| AcmeError::new(AcmeErrorKind::AccountDoesNotExist, "no such account"))
    }

    fn to_resource(&self, record: &AccountRecord) -> AccountResource {
        AccountResource {
            status: record.status,
            contact: record.contact.clone(),
            terms_of_service_agreed: Some(record.terms_of_service_agreed),
            orders: Some(format!("{}/acme/acct/{}/orders", self.base_url, record.name)),
            location: Some(self.location(&record.name)),
        }
    }
}

/// Checks each contact is a `mailto:` URI wrapping a minimally-shaped
/// RFC 5322 address. This isn't a full RFC 5322 parser, just enough to
/// reject the obviously-malformed addresses clients sometimes send.
fn validate_contacts(contacts: &[String]) -> AcmeResult<()> {
    for contact in contacts {
        let Some(address) = contact.strip_prefix("mailto:") else {
            return Err(AcmeError::new(
                AcmeErrorKind::InvalidContact,
                format!("unsupported contact URI scheme: {contact}"),
            ));
        };
        if !is_plausible_mailbox(address) {
            return Err(AcmeError::new(
                AcmeErrorKind::InvalidContact,
                format!("malformed mailto contact: {contact}"),
            ));
        }
    }
    Ok(())
}

fn is_plausible_mailbox(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn jwk() -> Jwk {
        Jwk {
            kty: "EC".into(),
            crv: Some("P-256".into()),
            x: Some("f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU".into()),
            y: Some("x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0".into()),
            n: None,
            e: None,
        }
    }

    #[tokio::test]
    async fn new_account_is_created_once_and_returned_on_replay() {
        let svc = AccountService::new(Arc::new(InMemoryStore::new()), "https://acme.example.org");
        let payload = NewAccountPayload {
            contact: vec!["mailto:admin@example.org".into()],
            terms_of_service_agreed: true,
            ..Default::default()
        };
        let (first, created) = svc.register(&jwk(), payload, true).await.unwrap();
        assert!(created);
        assert_eq!(first.status, AccountStatus::Valid);

        let (second, created_again) =
            svc.register(&jwk(), NewAccountPayload::default(), true).await.unwrap();
        assert!(!created_again);
        assert_eq!(second.location, first.location);
    }

    #[tokio::test]
    async fn only_return_existing_fails_for_unknown_key() {
        let svc = AccountService::new(Arc::new(InMemoryStore::new()), "https://acme.example.org");
        let payload = NewAccountPayload { only_return_existing: true, ..Default::default() };
        let err = svc.register(&jwk(), payload, true).await.unwrap_err();
        assert_eq!(err.kind, AcmeErrorKind::AccountDoesNotExist);
    }

    #[tokio::test]
    async fn missing_terms_agreement_is_rejected_when_required() {
        let svc = AccountService::new(Arc::new(InMemoryStore::new()), "https://acme.example.org");
        let err = svc.register(&jwk(), NewAccountPayload::default(), true).await.unwrap_err();
        assert_eq!(err.kind, AcmeErrorKind::UserActionRequired);
    }

    #[tokio::test]
    async fn deactivation_is_one_way() {
        let svc = AccountService::new(Arc::new(InMemoryStore::new()), "https://acme.example.org");
        let payload = NewAccountPayload { terms_of_service_agreed: true, ..Default::default() };
        let (account, _) = svc.register(&jwk(), payload, true).await.unwrap();
        let name: Name = account.location.unwrap().rsplit('/').next().unwrap().into();

        let deactivated = svc.deactivate(&name).await.unwrap();
        assert_eq!(deactivated.status, AccountStatus::Deactivated);
        let still_deactivated = svc.deactivate(&name).await.unwrap();
        assert_eq!(still_deactivated.status, AccountStatus::Deactivated);
    }

    #[tokio::test]
    async fn a_deactivated_accounts_key_can_be_reclaimed_by_a_fresh_registration() {
        let svc = AccountService::new(Arc::new(InMemoryStore::new()), "https://acme.example.org");
        let payload = NewAccountPayload { terms_of_service_agreed: true, ..Default::default() };
        let (first, _) = svc.register(&jwk(), payload.clone(), true).await.unwrap();
        let first_name: Name = first.location.clone().unwrap().rsplit('/').next().unwrap().into();
        svc.deactivate(&first_name).await.unwrap();

        let (second, created) = svc.register(&jwk(), payload, true).await.unwrap();
        assert!(created, "the same key must be free to register a brand new account once its old owner is deactivated");
        assert_ne!(second.location, first.location);
        assert_eq!(second.status, AccountStatus::Valid);
    }
}
