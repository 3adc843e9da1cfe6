//! `campusstay-auth`: credentials, purpose-typed tokens and principals.
//!
//! No HTTP and no storage: account lookups go through [`IdentityStore`], which
//! the infra crate implements for its stores.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod password;
pub mod principal;
pub mod resolver;
pub mod roles;
pub mod token;

pub use claims::{Claims, TokenPurpose};
pub use error::{AuthError, BoxError};
pub use password::{BCRYPT_MAX_BYTES, CredentialStore, PasswordError};
pub use principal::Principal;
pub use resolver::{IdentityResolver, IdentityStore};
pub use roles::Role;
pub use token::{
    EMAIL_VERIFICATION_TTL_HOURS, PASSWORD_RESET_TTL_HOURS, SigningAlgorithm, TokenError,
    TokenService,
};
