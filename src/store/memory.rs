//! In-memory reference [`Store`] implementation, built on `dashmap`.

use chrono::Utc;
use dashmap::DashMap;

use crate::error::AcmeResult;
use crate::util::Name;
use crate::wire::account::AccountStatus;

use super::records::*;
use super::{Store, SCHEMA_VERSION};

/// An in-memory `Store`. Data does not survive a restart; this is the
/// reference implementation the server runs with out of the box, not a
/// production persistence layer.
#[derive(Default)]
pub struct InMemoryStore {
    nonces: DashMap<Name, NonceRecord>,
    accounts: DashMap<Name, AccountRecord>,
    accounts_by_thumbprint: DashMap<String, Name>,
    orders: DashMap<Name, OrderRecord>,
    authorizations: DashMap<Name, AuthorizationRecord>,
    challenges: DashMap<Name, ChallengeRecord>,
    certificates: DashMap<Name, CertificateRecord>,
    certificates_by_order: DashMap<Name, Name>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn schema_version(&self) -> AcmeResult<u32> {
        Ok(SCHEMA_VERSION)
    }

    async fn put_nonce(&self, record: NonceRecord) -> AcmeResult<()> {
        self.nonces.insert(record.name.clone(), record);
        Ok(())
    }

    async fn check_and_consume_nonce(&self, name: &Name) -> AcmeResult<Option<NonceRecord>> {
        // `remove` is dashmap's atomic check-and-delete: a concurrent caller
        // presenting the same nonce races on the same shard lock, so exactly
        // one `remove` call observes `Some`.
        Ok(self.nonces.remove(name).map(|(_, record)| record))
    }

    async fn put_account(&self, record: AccountRecord) -> AcmeResult<()> {
        self.accounts_by_thumbprint.insert(record.thumbprint.clone(), record.name.clone());
        self.accounts.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_account(&self, name: &Name) -> AcmeResult<Option<AccountRecord>> {
        Ok(self.accounts.get(name).map(|r| r.clone()))
    }

    async fn find_account_by_thumbprint(&self, thumbprint: &str) -> AcmeResult<Option<AccountRecord>> {
        let Some(name) = self.accounts_by_thumbprint.get(thumbprint).map(|r| r.clone()) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&name).map(|r| r.clone()))
    }

    async fn insert_account_if_absent(&self, record: AccountRecord) -> AcmeResult<AccountRecord> {
        // `entry` on the thumbprint index is the linearization point: under
        // concurrent registration with the same key, exactly one caller's
        // record wins and every caller observes the same winner. A key that
        // only maps to a deactivated/revoked account is free to be reclaimed
        // (spec §3 invariant 1: the JWK is unique only across *non-deactivated*
        // accounts), so that case retries a compare-and-swap rebind rather
        // than treating the stale entry as a permanent block.
        loop {
            let name = self
                .accounts_by_thumbprint
                .entry(record.thumbprint.clone())
                .or_insert_with(|| record.name.clone())
                .clone();
            if name == record.name {
                self.accounts.insert(record.name.clone(), record.clone());
                return Ok(record);
            }

            let existing = self
                .accounts
                .get(&name)
                .map(|r| r.clone())
                .expect("thumbprint index entry always has a backing account record");
            if !matches!(existing.status, AccountStatus::Deactivated | AccountStatus::Revoked) {
                return Ok(existing);
            }

            let mut rebound = false;
            self.accounts_by_thumbprint.entry(record.thumbprint.clone()).and_modify(|current| {
                if *current == name {
                    *current = record.name.clone();
                    rebound = true;
                }
            });
            if rebound {
                self.accounts.insert(record.name.clone(), record.clone());
                return Ok(record);
            }
            // Someone else rebound the thumbprint between our read and our
            // write; loop and re-evaluate against whatever they left behind.
        }
    }

    async fn update_account(&self, record: AccountRecord) -> AcmeResult<()> {
        self.accounts.insert(record.name.clone(), record);
        Ok(())
    }

    async fn put_order(&self, record: OrderRecord) -> AcmeResult<()> {
        self.orders.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_order(&self, name: &Name) -> AcmeResult<Option<OrderRecord>> {
        Ok(self.orders.get(name).map(|r| r.clone()))
    }

    async fn update_order(&self, record: OrderRecord) -> AcmeResult<()> {
        self.orders.insert(record.name.clone(), record);
        Ok(())
    }

    async fn put_authorization(&self, record: AuthorizationRecord) -> AcmeResult<()> {
        self.authorizations.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_authorization(&self, name: &Name) -> AcmeResult<Option<AuthorizationRecord>> {
        Ok(self.authorizations.get(name).map(|r| r.clone()))
    }

    async fn update_authorization(&self, record: AuthorizationRecord) -> AcmeResult<()> {
        self.authorizations.insert(record.name.clone(), record);
        Ok(())
    }

    async fn list_authorizations_for_order(&self, order: &Name) -> AcmeResult<Vec<AuthorizationRecord>> {
        Ok(self
            .authorizations
            .iter()
            .filter(|r| &r.order == order)
            .map(|r| r.clone())
            .collect())
    }

    async fn put_challenge(&self, record: ChallengeRecord) -> AcmeResult<()> {
        self.challenges.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_challenge(&self, name: &Name) -> AcmeResult<Option<ChallengeRecord>> {
        Ok(self.challenges.get(name).map(|r| r.clone()))
    }

    async fn update_challenge(&self, record: ChallengeRecord) -> AcmeResult<()> {
        self.challenges.insert(record.name.clone(), record);
        Ok(())
    }

    async fn list_challenges_for_authorization(&self, authz: &Name) -> AcmeResult<Vec<ChallengeRecord>> {
        Ok(self
            .challenges
            .iter()
            .filter(|r| &r.authorization == authz)
            .map(|r| r.clone())
            .collect())
    }

    async fn put_certificate(&self, record: CertificateRecord) -> AcmeResult<()> {
        self.certificates_by_order.insert(record.order.clone(), record.name.clone());
        self.certificates.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get_certificate(&self, name: &Name) -> AcmeResult<Option<CertificateRecord>> {
        Ok(self.certificates.get(name).map(|r| r.clone()))
    }

    async fn update_certificate(&self, record: CertificateRecord) -> AcmeResult<()> {
        self.certificates.insert(record.name.clone(), record);
        Ok(())
    }

    async fn find_certificate_for_order(&self, order: &Name) -> AcmeResult<Option<CertificateRecord>> {
        let Some(name) = self.certificates_by_order.get(order).map(|r| r.clone()) else {
            return Ok(None);
        };
        Ok(self.certificates.get(&name).map(|r| r.clone()))
    }

    async fn find_certificate_by_der(&self, leaf_der: &[u8]) -> AcmeResult<Option<CertificateRecord>> {
        Ok(self.certificates.iter().find(|r| r.leaf_der == leaf_der).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::jose::Jwk;

    fn jwk() -> Jwk {
        Jwk { kty: "EC".into(), crv: Some("P-256".into()), x: Some("x".into()), y: Some("y".into()), n: None, e: None }
    }

    fn account(name: Name, thumbprint: &str) -> AccountRecord {
        AccountRecord {
            name,
            jwk: jwk(),
            thumbprint: thumbprint.to_string(),
            contact: vec![],
            terms_of_service_agreed: true,
            status: crate::wire::account::AccountStatus::Valid,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn nonce_is_consumed_exactly_once() {
        let store = InMemoryStore::new();
        let name = Name::generate();
        store.put_nonce(NonceRecord { name: name.clone(), issued_at: Utc::now() }).await.unwrap();
        assert!(store.check_and_consume_nonce(&name).await.unwrap().is_some());
        assert!(store.check_and_consume_nonce(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn account_insertion_is_idempotent_by_thumbprint() {
        let store = InMemoryStore::new();
        let first = account(Name::generate(), "tp-1");
        let winner = store.insert_account_if_absent(first.clone()).await.unwrap();
        assert_eq!(winner.name, first.name);

        let second = account(Name::generate(), "tp-1");
        let winner2 = store.insert_account_if_absent(second).await.unwrap();
        assert_eq!(winner2.name, first.name, "second registration with same thumbprint must resolve to the first");
    }

    #[tokio::test]
    async fn order_status_is_derived_not_stored() {
        use crate::wire::authorization::AuthorizationStatus;
        use crate::wire::order::OrderStatus;

        let order = OrderRecord {
            name: Name::generate(),
            account: Name::generate(),
            identifiers: vec![],
            not_before: None,
            not_after: None,
            expires: Utc::now(),
            authorizations: vec![],
            finalizing: false,
            certificate: None,
            error: None,
        };
        assert_eq!(order.derive_status(&[AuthorizationStatus::Pending]), OrderStatus::Pending);
        assert_eq!(order.derive_status(&[AuthorizationStatus::Valid]), OrderStatus::Ready);
        assert_eq!(order.derive_status(&[AuthorizationStatus::Invalid]), OrderStatus::Invalid);
    }
}
