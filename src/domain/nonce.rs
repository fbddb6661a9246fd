//! The replay-nonce pool (RFC 8555 §7.2).
//!
//! Every mutating request must carry a nonce this pool issued, and that
//! nonce is consumed exactly once. Nonces are not tied to any account; they
//! exist purely to give the envelope verifier a freshness token.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::{AcmeError, AcmeResult};
use crate::store::{NonceRecord, Store};
use crate::util::Name;

pub struct NoncePool {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl NoncePool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_ttl(store, 300)
    }

    /// Builds a pool with a configurable TTL (RFC 8555 §7.2, default 300s).
    pub fn with_ttl(store: Arc<dyn Store>, ttl_secs: u64) -> Self {
        NoncePool { store, ttl: Duration::seconds(ttl_secs as i64) }
    }

    /// Issues a fresh nonce and persists it, ready to be consumed by exactly
    /// one subsequent request.
    pub async fn issue(&self) -> AcmeResult<Name> {
        let name = Name::generate();
        self.store
            .put_nonce(NonceRecord { name: name.clone(), issued_at: Utc::now() })
            .await?;
        Ok(name)
    }

    /// Consumes `name`, failing with `badNonce` if it was never issued, has
    /// already been consumed, or outlived the configured TTL — an expired
    /// nonce is removed just the same (it must not be consumable twice) but
    /// is reported as absent.
    pub async fn consume(&self, name: &Name) -> AcmeResult<()> {
        match self.store.check_and_consume_nonce(name).await? {
            Some(record) if Utc::now() - record.issued_at <= self.ttl => Ok(()),
            _ => Err(AcmeError::bad_nonce()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn issued_nonce_consumes_exactly_once() {
        let pool = NoncePool::new(Arc::new(InMemoryStore::new()));
        let nonce = pool.issue().await.unwrap();
        pool.consume(&nonce).await.unwrap();
        let err = pool.consume(&nonce).await.unwrap_err();
        assert_eq!(err.kind, crate::error::AcmeErrorKind::BadNonce);
    }

    #[tokio::test]
    async fn unknown_nonce_is_rejected() {
        let pool = NoncePool::new(Arc::new(InMemoryStore::new()));
        let err = pool.consume(&Name::generate()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::AcmeErrorKind::BadNonce);
    }

    #[tokio::test]
    async fn expired_nonce_is_treated_as_absent() {
        let store = Arc::new(InMemoryStore::new());
        let pool = NoncePool::with_ttl(store.clone(), 1);
        let name = Name::generate();
        store
            .put_nonce(NonceRecord { name: name.clone(), issued_at: Utc::now() - chrono::Duration::seconds(5) })
            .await
            .unwrap();

        let err = pool.consume(&name).await.unwrap_err();
        assert_eq!(err.kind, crate::error::AcmeErrorKind::BadNonce);
        // Even though it was expired, it's gone now — consumed exactly once.
        let err_again = pool.consume(&name).await.unwrap_err();
        assert_eq!(err_again.kind, crate::error::AcmeErrorKind::BadNonce);
    }
}
