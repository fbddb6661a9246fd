//! Challenge service (RFC 8555 §7.5.1): challenge lookup and validation
//! triggering.
//!
//! The single-flight guarantee ("at most one in-flight validation per
//! challenge") is enforced here at the state-transition level: a challenge
//! only moves `pending -> processing` once, and only the caller that wins
//! that transition receives a [`ValidationJob`] to run. A second POST to an
//! already-processing challenge is a no-op that just returns the current
//! resource, the same idempotent-retry shape RFC 8555 §7.5.1 describes.

use std::sync::Arc;

use chrono::Utc;

use crate::crypto;
use crate::error::{AcmeError, AcmeResult};
use crate::store::{ChallengeRecord, Store};
use crate::util::Name;
use crate::wire::challenge::{ChallengeResource, ChallengeStatus};
use crate::wire::identifier::AcmeIdentifier;

pub struct ChallengeService {
    store: Arc<dyn Store>,
    base_url: String,
}

/// Everything a validator backend needs to probe a single challenge,
/// produced once a caller wins the pending-to-processing transition.
pub struct ValidationJob {
    pub challenge: Name,
    pub authorization: Name,
    pub identifier: AcmeIdentifier,
    pub challenge_type: String,
    pub token: String,
    pub key_authorization: String,
}

impl ChallengeService {
    pub fn new(store: Arc<dyn Store>, base_url: impl Into<String>) -> Self {
        ChallengeService { store, base_url: base_url.into() }
    }

    pub fn location(&self, name: &Name) -> String {
        format!("{}/acme/chall/{name}", self.base_url)
    }

    pub async fn get(&self, account: &Name, name: &Name) -> AcmeResult<ChallengeResource> {
        let record = self.lookup(account, name).await?;
        Ok(self.to_resource(&record))
    }

    /// Handles `POST /acme/chall/{name}` (RFC 8555 §7.5.1): if the challenge
    /// is still pending, transitions it to `processing` and returns a
    /// [`ValidationJob`] for the caller to hand to the validator backend. If
    /// it's already processing or terminal, returns the current resource
    /// with no job — the validation is already underway or decided.
    pub async fn begin_validation(
        &self,
        account: &Name,
        name: &Name,
    ) -> AcmeResult<(ChallengeResource, Option<ValidationJob>)> {
        let mut record = self.lookup(account, name).await?;
        if !matches!(record.status, ChallengeStatus::Pending) {
            return Ok((self.to_resource(&record), None));
        }

        let authz = self
            .store
            .get_authorization(&record.authorization)
            .await?
            .ok_or_else(|| AcmeError::server_internal("challenge references a missing authorization"))?;
        if !matches!(authz.effective_status(), crate::wire::authorization::AuthorizationStatus::Pending) {
            return Ok((self.to_resource(&record), None));
        }
        let account_record = self
            .store
            .get_account(account)
            .await?
            .ok_or_else(|| AcmeError::server_internal("challenge references a missing account"))?;

        record.status = ChallengeStatus::Processing;
        self.store.update_challenge(record.clone()).await?;

        let key_authorization = crypto::key_authorization(&record.token, &account_record.jwk);
        let job = ValidationJob {
            challenge: record.name.clone(),
            authorization: record.authorization.clone(),
            identifier: authz.identifier,
            challenge_type: record.type_.clone(),
            token: record.token.clone(),
            key_authorization,
        };
        Ok((self.to_resource(&record), Some(job)))
    }

    /// Records a successful validation. Called by the validator job runner,
    /// not directly by a handler.
    pub async fn mark_valid(&self, name: &Name) -> AcmeResult<()> {
        let mut record = self.fetch(name).await?;
        if matches!(record.status, ChallengeStatus::Valid) {
            return Ok(());
        }
        record.status = ChallengeStatus::Valid;
        record.validated = Some(Utc::now());
        record.error = None;
        self.store.update_challenge(record).await
    }

    /// Records a failed validation, with the problem document describing
    /// why. A no-op once the challenge already reached `valid` — that
    /// transition is one-way.
    pub async fn mark_invalid(&self, name: &Name, error: crate::error::ProblemDocument) -> AcmeResult<()> {
        let mut record = self.fetch(name).await?;
        if matches!(record.status, ChallengeStatus::Valid) {
            return Ok(());
        }
        record.status = ChallengeStatus::Invalid;
        record.error = Some((&error).into());
        self.store.update_challenge(record).await
    }

    async fn fetch(&self, name: &Name) -> AcmeResult<ChallengeRecord> {
        self.store
            .get_challenge(name)
            .await?
            .ok_or_else(|| AcmeError::server_internal("challenge vanished during validation"))
    }

    async fn lookup(&self, account: &Name, name: &Name) -> AcmeResult<ChallengeRecord> {
        let record = self.fetch(name).await?;
        if &record.account != account {
            return Err(AcmeError::unauthorized("challenge does not belong to this account"));
        }
        Ok(record)
    }

    fn to_resource(&self, record: &ChallengeRecord) -> ChallengeResource {
        ChallengeResource {
            type_: record.type_.clone(),
            url: self.location(&record.name),
            status: record.status,
            validated: record.validated,
            error: record.error.as_ref().map(|e| e.into()),
            token: Some(record.token.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::{AccountRecord, AuthorizationRecord};
    use crate::wire::authorization::AuthorizationStatus;
    use crate::wire::jose::Jwk;

    fn service() -> (ChallengeService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (ChallengeService::new(store.clone(), "https://acme.example.org"), store)
    }

    async fn seed_pending_challenge(store: &Arc<InMemoryStore>) -> (Name, Name, Name) {
        let account = Name::generate();
        store
            .put_account(AccountRecord {
                name: account.clone(),
                jwk: Jwk { kty: "EC".into(), crv: Some("P-256".into()), x: Some("x".into()), y: Some("y".into()), n: None, e: None },
                thumbprint: "tp".into(),
                contact: vec![],
                terms_of_service_agreed: true,
                status: crate::wire::account::AccountStatus::Valid,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let authz = Name::generate();
        let challenge = Name::generate();
        store
            .put_challenge(ChallengeRecord {
                name: challenge.clone(),
                authorization: authz.clone(),
                account: account.clone(),
                type_: "http-01".into(),
                token: "tok".into(),
                status: ChallengeStatus::Pending,
                validated: None,
                error: None,
            })
            .await
            .unwrap();
        store
            .put_authorization(AuthorizationRecord {
                name: authz.clone(),
                order: Name::generate(),
                account: account.clone(),
                identifier: AcmeIdentifier::dns("example.org"),
                status: AuthorizationStatus::Pending,
                expires: Utc::now() + chrono::Duration::days(1),
                wildcard: false,
                challenges: vec![challenge.clone()],
            })
            .await
            .unwrap();
        (account, authz, challenge)
    }

    #[tokio::test]
    async fn second_begin_validation_is_a_single_flight_no_op() {
        let (svc, store) = service();
        let (account, _authz, challenge) = seed_pending_challenge(&store).await;

        let (_, job) = svc.begin_validation(&account, &challenge).await.unwrap();
        assert!(job.is_some(), "first caller must win the pending-to-processing transition");

        let (resource, job) = svc.begin_validation(&account, &challenge).await.unwrap();
        assert!(job.is_none(), "a second caller against an already-processing challenge gets no job");
        assert_eq!(resource.status, ChallengeStatus::Processing);
    }

    #[tokio::test]
    async fn mark_invalid_is_a_no_op_once_challenge_is_valid() {
        let (svc, store) = service();
        let (_account, _authz, challenge) = seed_pending_challenge(&store).await;

        svc.mark_valid(&challenge).await.unwrap();
        let error = crate::error::ProblemDocument { type_: "urn:ietf:params:acme:error:connection".into(), detail: "late failure".into() };
        svc.mark_invalid(&challenge, error).await.unwrap();

        let record = store.get_challenge(&challenge).await.unwrap().unwrap();
        assert_eq!(record.status, ChallengeStatus::Valid, "a validated challenge must never revert to invalid");
    }
}
