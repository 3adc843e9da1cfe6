//! Identity Resolver: credentials or a session token in, [`Principal`] out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use campusstay_housing::{Admin, Student};

use crate::{AuthError, BoxError, CredentialStore, Principal, Role, TokenPurpose, TokenService};

/// Account lookups by normalized (trimmed, lowercase) email.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, BoxError>;
    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, BoxError>;
}

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
    credentials: CredentialStore,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        tokens: TokenService,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            store,
            tokens,
            credentials,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Password login.
    ///
    /// Admins are looked up first: the two account tables have independent
    /// email uniqueness, so an address present in both logs in as the admin.
    #[instrument(skip(self, password), err)]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let email = email.trim().to_lowercase();

        if let Some(admin) = self
            .store
            .admin_by_email(&email)
            .await
            .map_err(AuthError::Store)?
        {
            if !self.credentials.verify(password, &admin.password_hash) {
                return Err(AuthError::BadCredentials);
            }
            if !admin.is_active {
                return Err(AuthError::AccountDisabled);
            }
            return Ok(Principal::Admin(admin));
        }

        let Some(student) = self
            .store
            .student_by_email(&email)
            .await
            .map_err(AuthError::Store)?
        else {
            return Err(AuthError::UnknownAccount);
        };

        // Checked before the password so the answer is the same either way.
        if !student.email_verified {
            return Err(AuthError::EmailNotVerified);
        }
        if !self.credentials.verify(password, &student.password_hash) {
            return Err(AuthError::BadCredentials);
        }
        Ok(Principal::Student(student))
    }

    /// Resolve a bearer session token to the principal it names.
    #[instrument(skip_all, err)]
    pub async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self
            .tokens
            .verify(token, TokenPurpose::Session)
            .map_err(|e| {
                debug!(reason = %e, "session token rejected");
                AuthError::InvalidSession
            })?;

        match claims.role {
            Some(Role::Admin) => {
                let admin = self
                    .store
                    .admin_by_email(&claims.sub)
                    .await
                    .map_err(AuthError::Store)?
                    .ok_or(AuthError::InvalidSession)?;
                if !admin.is_active {
                    return Err(AuthError::AccountDisabled);
                }
                Ok(Principal::Admin(admin))
            }
            Some(Role::Student) => self
                .store
                .student_by_email(&claims.sub)
                .await
                .map_err(AuthError::Store)?
                .map(Principal::Student)
                .ok_or(AuthError::InvalidSession),
            None => Err(AuthError::InvalidSession),
        }
    }
}
