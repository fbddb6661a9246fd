//! The persistence contract.
//!
//! The choice of underlying database is external to this crate; [`Store`] is
//! the abstract interface every component talks to. [`memory::InMemoryStore`]
//! is the reference implementation this server runs with out of the box.

pub mod memory;
pub mod records;

use async_trait::async_trait;

use crate::error::AcmeResult;
use crate::util::Name;
pub use records::*;

/// Schema version this crate's entity shapes correspond to. A `Store`
/// implementation backed by a real database should refuse to start against
/// an incompatible on-disk schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Record CRUD, keyed by entity name, plus the two operations the data
/// model's invariants require atomicity for: nonce compare-and-delete, and
/// account lookup by JWK thumbprint.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Returns the schema version of the underlying storage, checked once at
    /// startup.
    async fn schema_version(&self) -> AcmeResult<u32>;

    // -- Nonces --------------------------------------------------------

    /// Persists a freshly generated nonce.
    async fn put_nonce(&self, record: NonceRecord) -> AcmeResult<()>;

    /// Atomically checks a nonce is present, then deletes it, returning the
    /// removed record. This is the linearization point replay protection
    /// requires: under concurrent callers presenting the same nonce, exactly one
    /// observes `Some`. TTL expiry is judged by the caller against
    /// `NonceRecord::issued_at`, not here — removal itself must stay
    /// unconditional so a second consumer of an expired-but-present nonce
    /// still finds it gone.
    async fn check_and_consume_nonce(&self, name: &Name) -> AcmeResult<Option<NonceRecord>>;

    // -- Accounts --------------------------------------------------------

    async fn put_account(&self, record: AccountRecord) -> AcmeResult<()>;
    async fn get_account(&self, name: &Name) -> AcmeResult<Option<AccountRecord>>;
    async fn find_account_by_thumbprint(&self, thumbprint: &str) -> AcmeResult<Option<AccountRecord>>;
    /// Inserts a new account only if no non-deactivated account with the
    /// same thumbprint already exists. Returns the account that ends up
    /// owning that thumbprint — the freshly inserted one, or the one a
    /// concurrent caller won the race to insert.
    async fn insert_account_if_absent(&self, record: AccountRecord) -> AcmeResult<AccountRecord>;
    async fn update_account(&self, record: AccountRecord) -> AcmeResult<()>;

    // -- Orders --------------------------------------------------------

    async fn put_order(&self, record: OrderRecord) -> AcmeResult<()>;
    async fn get_order(&self, name: &Name) -> AcmeResult<Option<OrderRecord>>;
    async fn update_order(&self, record: OrderRecord) -> AcmeResult<()>;

    // -- Authorizations --------------------------------------------------

    async fn put_authorization(&self, record: AuthorizationRecord) -> AcmeResult<()>;
    async fn get_authorization(&self, name: &Name) -> AcmeResult<Option<AuthorizationRecord>>;
    async fn update_authorization(&self, record: AuthorizationRecord) -> AcmeResult<()>;
    async fn list_authorizations_for_order(&self, order: &Name) -> AcmeResult<Vec<AuthorizationRecord>>;

    // -- Challenges --------------------------------------------------------

    async fn put_challenge(&self, record: ChallengeRecord) -> AcmeResult<()>;
    async fn get_challenge(&self, name: &Name) -> AcmeResult<Option<ChallengeRecord>>;
    async fn update_challenge(&self, record: ChallengeRecord) -> AcmeResult<()>;
    async fn list_challenges_for_authorization(&self, authz: &Name) -> AcmeResult<Vec<ChallengeRecord>>;

    // -- Certificates --------------------------------------------------------

    async fn put_certificate(&self, record: CertificateRecord) -> AcmeResult<()>;
    async fn get_certificate(&self, name: &Name) -> AcmeResult<Option<CertificateRecord>>;
    async fn update_certificate(&self, record: CertificateRecord) -> AcmeResult<()>;
    async fn find_certificate_for_order(&self, order: &Name) -> AcmeResult<Option<CertificateRecord>>;
    async fn find_certificate_by_der(&self, leaf_der: &[u8]) -> AcmeResult<Option<CertificateRecord>>;
}
