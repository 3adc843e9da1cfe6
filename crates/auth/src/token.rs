//! Token Service: signed, expiring, purpose-typed tokens.
//!
//! Verification errors are checked in this order: signature/shape, expiry,
//! purpose. A token that is both expired and of the wrong purpose reports
//! `Expired`.

use core::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use campusstay_housing::IssuedToken;

use crate::{Claims, Role, TokenPurpose};

pub const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;
pub const PASSWORD_RESET_TTL_HOURS: i64 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,

    #[error("token has expired")]
    Expired,

    #[error("token was issued for {actual}, expected {expected}")]
    WrongPurpose {
        expected: TokenPurpose,
        actual: TokenPurpose,
    },

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Invalid => "invalid_token",
            TokenError::Expired => "expired_token",
            TokenError::WrongPurpose { .. } => "wrong_purpose",
            TokenError::Signing(_) => "internal",
        }
    }
}

/// HMAC algorithms accepted for the process-wide signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    fn jwt(&self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::Hs256),
            "HS384" => Ok(SigningAlgorithm::Hs384),
            "HS512" => Ok(SigningAlgorithm::Hs512),
            other => Err(format!("unsupported signing algorithm '{other}'")),
        }
    }
}

/// Issues and verifies tokens with one key and algorithm for the whole process.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: SigningAlgorithm,
    session_ttl: Duration,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], algorithm: SigningAlgorithm, session_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Sign a token for `subject`. The returned value carries its absolute expiry
    /// so callers can persist it next to the account.
    pub fn issue(
        &self,
        subject: &str,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        self.sign(subject, purpose, None, ttl, Utc::now())
    }

    pub fn issue_session(&self, email: &str, role: Role) -> Result<IssuedToken, TokenError> {
        self.sign(
            email,
            TokenPurpose::Session,
            Some(role),
            self.session_ttl,
            Utc::now(),
        )
    }

    pub fn issue_email_verification(&self, email: &str) -> Result<IssuedToken, TokenError> {
        self.issue(
            email,
            TokenPurpose::EmailVerification,
            Duration::hours(EMAIL_VERIFICATION_TTL_HOURS),
        )
    }

    pub fn issue_password_reset(&self, email: &str) -> Result<IssuedToken, TokenError> {
        self.issue(
            email,
            TokenPurpose::PasswordReset,
            Duration::hours(PASSWORD_RESET_TTL_HOURS),
        )
    }

    fn sign(
        &self,
        subject: &str,
        purpose: TokenPurpose,
        role: Option<Role>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now + ttl;
        let claims = Claims {
            sub: subject.to_string(),
            purpose,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::now_v7().simple().to_string(),
        };
        let value = jsonwebtoken::encode(&Header::new(self.algorithm.jwt()), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        // Stored expiry is second-aligned so it agrees with the signed `exp`.
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expires_at);
        Ok(IssuedToken { value, expires_at })
    }

    pub fn verify(&self, token: &str, expected: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm.jwt());
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;

        let claims = data.claims;
        if claims.purpose != expected {
            return Err(TokenError::WrongPurpose {
                expected,
                actual: claims.purpose,
            });
        }
        if claims.purpose == TokenPurpose::Session && claims.role.is_none() {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}
