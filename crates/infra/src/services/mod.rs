//! Application services: the operations the HTTP layer exposes, composed
//! from the domain model, the store, the blob store and the notifier.

pub mod accounts;
pub mod applications;
pub mod properties;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use campusstay_auth::{
    AuthError, BoxError, CredentialStore, IdentityResolver, IdentityStore, PasswordError,
    TokenError, TokenService,
};
use campusstay_core::DomainError;
use campusstay_housing::{Admin, Student, TokenCheck};

use crate::blob::{BlobError, BlobStore};
use crate::config::AppConfig;
use crate::mail::{Mailer, Notifier};
use crate::store::{Repository, StoreError};

pub use accounts::{AccountService, ProfileUpdate, Session, VerifyOutcome};
pub use applications::{AdminStats, ApplicationService};
pub use properties::{ImageUpload, PropertyChanges, PropertyService};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(domain) => ServiceError::Domain(domain),
            StoreError::Conflict(msg) => ServiceError::Domain(DomainError::Conflict(msg)),
            StoreError::TokenRejected(TokenCheck::Expired) => {
                ServiceError::Token(TokenError::Expired)
            }
            StoreError::TokenRejected(_) => ServiceError::Token(TokenError::Invalid),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    /// Stable snake_case code, also used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Domain(e) => match e {
                DomainError::Validation(_) | DomainError::InvalidId(_) => "validation_error",
                DomainError::NotFound(_) => "not_found",
                DomainError::Conflict(_) => "conflict",
                DomainError::InvalidState(_) => "invalid_state",
                DomainError::Unverified => "unverified",
                DomainError::Exhausted => "exhausted",
                DomainError::InvalidDocument(_) => "invalid_document",
            },
            ServiceError::Auth(e) => e.kind(),
            ServiceError::Token(e) => e.kind(),
            ServiceError::Password(_) => "internal",
            ServiceError::Store(_) | ServiceError::Blob(_) => "storage",
        }
    }
}

/// Adapts a [`Repository`] to the identity lookups the resolver needs.
struct StoreIdentity(Arc<dyn Repository>);

#[async_trait]
impl IdentityStore for StoreIdentity {
    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, BoxError> {
        self.0.admin_by_email(email).await.map_err(Into::into)
    }

    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, BoxError> {
        self.0.student_by_email(email).await.map_err(Into::into)
    }
}

/// Everything the HTTP layer needs, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub resolver: IdentityResolver,
    pub accounts: AccountService,
    pub applications: ApplicationService,
    pub properties: PropertyService,
    pub blobs: Arc<dyn BlobStore>,
}

impl Services {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Repository>,
        blobs: Arc<dyn BlobStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tokens = TokenService::new(
            config.secret_key.as_bytes(),
            config.algorithm,
            config.access_token_ttl,
        );
        let resolver = IdentityResolver::new(
            Arc::new(StoreIdentity(store.clone())),
            tokens,
            CredentialStore::new(config.bcrypt_cost),
        );
        let notifier = Notifier::new(mailer, &config.frontend_url);

        Self {
            accounts: AccountService::new(store.clone(), resolver.clone(), notifier.clone()),
            applications: ApplicationService::new(store.clone(), blobs.clone(), notifier),
            properties: PropertyService::new(store, blobs.clone()),
            resolver,
            blobs,
        }
    }
}
