//! Shared application state, assembled once at startup and cloned cheaply
//! into every Axum handler via `State`.

use std::sync::Arc;

use crate::ca::CaHandler;
use crate::config::Config;
use crate::directory::Directory;
use crate::domain::{AccountService, AuthorizationService, CertificateService, ChallengeService, NoncePool, OrderService};
use crate::envelope::Envelope;
use crate::error::AcmeResult;
use crate::store::Store;
use crate::trigger::TriggerService;
use crate::validator::Validator;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    pub config: Config,
    pub directory: Directory,
    pub envelope: Envelope,
    pub nonces: Arc<NoncePool>,
    pub accounts: AccountService,
    pub orders: OrderService,
    pub authorizations: Arc<AuthorizationService>,
    pub challenges: Arc<ChallengeService>,
    pub certificates: CertificateService,
    pub validator: Arc<Validator>,
    pub trigger: TriggerService,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, ca: Arc<dyn CaHandler>) -> AcmeResult<Self> {
        let nonces = Arc::new(NoncePool::with_ttl(store.clone(), config.nonce_ttl_secs));
        let envelope = Envelope::new(store.clone(), nonces.clone(), config.allowed_algs.clone());
        let accounts = AccountService::new(store.clone(), config.base_url.clone());
        let orders = OrderService::new(
            store.clone(),
            config.base_url.clone(),
            config.order_ttl_secs,
            config.challenge_types.clone(),
            config.allow_wildcard,
        );
        let authorizations = Arc::new(AuthorizationService::new(store.clone(), config.base_url.clone()));
        let challenges = Arc::new(ChallengeService::new(store.clone(), config.base_url.clone()));
        let certificates = CertificateService::new(store.clone(), ca, config.base_url.clone(), config.ca_timeout_secs);
        let validator = Arc::new(Validator::new(
            challenges.clone(),
            authorizations.clone(),
            config.http01_redirect_limit,
            config.validation_timeout_secs,
        )?);
        let directory = Directory::new(config.clone());
        let trigger = TriggerService::new(store);

        Ok(AppState(Arc::new(Inner {
            config,
            directory,
            envelope,
            nonces,
            accounts,
            orders,
            authorizations,
            challenges,
            certificates,
            validator,
            trigger,
        })))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn directory(&self) -> &Directory {
        &self.0.directory
    }

    pub fn envelope(&self) -> &Envelope {
        &self.0.envelope
    }

    pub fn nonces(&self) -> &NoncePool {
        &self.0.nonces
    }

    pub fn accounts(&self) -> &AccountService {
        &self.0.accounts
    }

    pub fn orders(&self) -> &OrderService {
        &self.0.orders
    }

    pub fn authorizations(&self) -> &AuthorizationService {
        &self.0.authorizations
    }

    pub fn challenges(&self) -> &ChallengeService {
        &self.0.challenges
    }

    pub fn certificates(&self) -> &CertificateService {
        &self.0.certificates
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.0.validator
    }

    pub fn trigger(&self) -> &TriggerService {
        &self.0.trigger
    }
}
