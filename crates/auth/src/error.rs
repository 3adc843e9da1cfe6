use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No account with this email. Reported exactly like `BadCredentials`.
    #[error("incorrect email or password")]
    UnknownAccount,

    #[error("incorrect email or password")]
    BadCredentials,

    #[error("please verify your email before logging in")]
    EmailNotVerified,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("could not validate credentials")]
    InvalidSession,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("identity store failure: {0}")]
    Store(#[source] BoxError),
}

impl AuthError {
    /// Stable snake_case code for transport layers.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::UnknownAccount | AuthError::BadCredentials => "bad_credentials",
            AuthError::EmailNotVerified => "email_not_verified",
            AuthError::AccountDisabled | AuthError::Forbidden(_) => "forbidden",
            AuthError::InvalidSession => "invalid_session",
            AuthError::Store(_) => "storage",
        }
    }
}
