//! Authorization service (RFC 8555 §7.5): per-identifier authorization
//! lookup and client-initiated deactivation.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{AcmeError, AcmeErrorKind, AcmeResult};
use crate::store::{AuthorizationRecord, ChallengeRecord, Store};
use crate::util::Name;
use crate::wire::authorization::{AuthorizationResource, AuthorizationStatus};
use crate::wire::challenge::{ChallengeResource, ChallengeStatus};

pub struct AuthorizationService {
    store: Arc<dyn Store>,
    base_url: String,
}

impl AuthorizationService {
    pub fn new(store: Arc<dyn Store>, base_url: impl Into<String>) -> Self {
        AuthorizationService { store, base_url: base_url.into() }
    }

    pub fn location(&self, name: &Name) -> String {
        format!("{}/acme/authz/{name}", self.base_url)
    }

    fn chall_location(&self, name: &Name) -> String {
        format!("{}/acme/chall/{name}", self.base_url)
    }

    pub async fn get(&self, account: &Name, name: &Name) -> AcmeResult<AuthorizationResource> {
        let record = self.lookup(account, name).await?;
        self.to_resource(&record).await
    }

    /// Handles `POST /acme/authz/{name}` with `{"status": "deactivated"}`
    /// (RFC 8555 §7.5.2). Deactivation is one-way and cascades: every
    /// pending challenge under a deactivated authorization is finished too.
    pub async fn deactivate(&self, account: &Name, name: &Name) -> AcmeResult<AuthorizationResource> {
        let mut record = self.lookup(account, name).await?;
        if !matches!(record.status, AuthorizationStatus::Deactivated) {
            record.status = AuthorizationStatus::Deactivated;
            self.store.update_authorization(record.clone()).await?;
        }
        self.to_resource(&record).await
    }

    async fn lookup(&self, account: &Name, name: &Name) -> AcmeResult<AuthorizationRecord> {
        let record = self
            .store
            .get_authorization(name)
            .await?
            .ok_or_else(|| AcmeError::malformed("no such authorization"))?;
        if &record.account != account {
            return Err(AcmeError::unauthorized("authorization does not belong to this account"));
        }
        Ok(record)
    }

    async fn to_resource(&self, record: &AuthorizationRecord) -> AcmeResult<AuthorizationResource> {
        let mut challenges = Vec::with_capacity(record.challenges.len());
        for name in &record.challenges {
            let challenge: ChallengeRecord = self
                .store
                .get_challenge(name)
                .await?
                .ok_or_else(|| AcmeError::server_internal("authorization references a missing challenge"))?;
            challenges.push(ChallengeResource {
                type_: challenge.type_,
                url: self.chall_location(name),
                status: challenge.status,
                validated: challenge.validated,
                error: challenge.error.as_ref().map(|e| e.into()),
                token: Some(challenge.token),
            });
        }
        Ok(AuthorizationResource {
            identifier: record.identifier.clone(),
            status: record.effective_status(),
            expires: Some(record.expires),
            challenges,
            wildcard: record.wildcard,
            location: Some(self.location(&record.name)),
        })
    }

    /// Marks the authorization valid once one of its challenges validates:
    /// the first challenge to succeed wins, the rest are irrelevant after
    /// that.
    pub async fn mark_valid(&self, name: &Name) -> AcmeResult<()> {
        let mut record = self
            .store
            .get_authorization(name)
            .await?
            .ok_or_else(|| AcmeError::server_internal("authorization vanished during validation"))?;
        if matches!(record.status, AuthorizationStatus::Pending) {
            record.status = AuthorizationStatus::Valid;
            self.store.update_authorization(record).await?;
        }
        Ok(())
    }

    /// Records a single challenge's validation failure, transitioning the
    /// authorization to invalid only once every one of its sibling
    /// challenges has also failed (RFC 8555 §7.5.1 only requires one
    /// challenge to succeed, so a still-pending-or-processing sibling must
    /// be given the chance to).
    pub async fn mark_invalid(&self, name: &Name) -> AcmeResult<()> {
        let mut record = self
            .store
            .get_authorization(name)
            .await?
            .ok_or_else(|| AcmeError::server_internal("authorization vanished during validation"))?;
        if !matches!(record.status, AuthorizationStatus::Pending) {
            return Ok(());
        }
        let mut all_invalid = true;
        for challenge_name in &record.challenges {
            let challenge = self
                .store
                .get_challenge(challenge_name)
                .await?
                .ok_or_else(|| AcmeError::server_internal("authorization references a missing challenge"))?;
            if !matches!(challenge.status, ChallengeStatus::Invalid) {
                all_invalid = false;
                break;
            }
        }
        if all_invalid {
            record.status = AuthorizationStatus::Invalid;
            self.store.update_authorization(record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn service() -> (AuthorizationService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (AuthorizationService::new(store.clone(), "https://acme.example.org"), store)
    }

    async fn seed_authorization_with_challenges(store: &Arc<InMemoryStore>, types: &[&str]) -> (Name, Vec<Name>) {
        let account = Name::generate();
        let authz = Name::generate();
        let mut challenge_names = Vec::new();
        for t in types {
            let challenge = Name::generate();
            store
                .put_challenge(ChallengeRecord {
                    name: challenge.clone(),
                    authorization: authz.clone(),
                    account: account.clone(),
                    type_: (*t).into(),
                    token: "tok".into(),
                    status: ChallengeStatus::Pending,
                    validated: None,
                    error: None,
                })
                .await
                .unwrap();
            challenge_names.push(challenge);
        }
        store
            .put_authorization(AuthorizationRecord {
                name: authz.clone(),
                order: Name::generate(),
                account: account.clone(),
                identifier: crate::wire::identifier::AcmeIdentifier::dns("example.org"),
                status: AuthorizationStatus::Pending,
                expires: Utc::now() + chrono::Duration::days(1),
                wildcard: false,
                challenges: challenge_names.clone(),
            })
            .await
            .unwrap();
        (authz, challenge_names)
    }

    #[tokio::test]
    async fn surviving_sibling_challenge_keeps_authorization_pending() {
        let (svc, store) = service();
        let (authz, challenges) = seed_authorization_with_challenges(&store, &["http-01", "dns-01"]).await;

        let mut http01 = store.get_challenge(&challenges[0]).await.unwrap().unwrap();
        http01.status = ChallengeStatus::Invalid;
        store.update_challenge(http01).await.unwrap();

        svc.mark_invalid(&authz).await.unwrap();

        let record = store.get_authorization(&authz).await.unwrap().unwrap();
        assert_eq!(
            record.status,
            AuthorizationStatus::Pending,
            "a still-pending sibling challenge must not be preempted by one that already failed"
        );
    }

    #[tokio::test]
    async fn authorization_goes_invalid_once_every_challenge_fails() {
        let (svc, store) = service();
        let (authz, challenges) = seed_authorization_with_challenges(&store, &["http-01", "dns-01"]).await;

        for name in &challenges {
            let mut challenge = store.get_challenge(name).await.unwrap().unwrap();
            challenge.status = ChallengeStatus::Invalid;
            store.update_challenge(challenge).await.unwrap();
        }

        svc.mark_invalid(&authz).await.unwrap();

        let record = store.get_authorization(&authz).await.unwrap().unwrap();
        assert_eq!(record.status, AuthorizationStatus::Invalid);
    }
}
