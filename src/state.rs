use crate::auth::TokenService;
use crate::config::{Config, ReferencePolicy};
use crate::repository::Repositories;
use uuid::Uuid;

/// Shared application state, registered once as `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub tokens: TokenService,
    pub bcrypt_cost: u32,
    pub reference_policy: ReferencePolicy,
}

impl AppState {
    pub fn new(repos: Repositories, config: &Config) -> Self {
        Self {
            repos,
            tokens: TokenService::new(&config.jwt_secret, config.jwt_ttl_seconds),
            bcrypt_cost: config.bcrypt_cost,
            reference_policy: config.reference_policy,
        }
    }

    /// The owner a record referenced by `owner_id`'s writes must belong to, if any.
    pub fn refs_owner(&self, owner_id: Uuid) -> Option<Uuid> {
        match self.reference_policy {
            ReferencePolicy::Existence => None,
            ReferencePolicy::Owner => Some(owner_id),
        }
    }
}
