use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusstay_core::{DomainError, DomainResult, StudentId};

use crate::campus::Campus;
use crate::document::DocumentSlots;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const STUDENT_NUMBER_LEN: usize = 9;

/// A one-time token value persisted alongside the account it was issued for.
///
/// Presented tokens must match this value exactly, so issuing a new token or
/// completing the action invalidates any older one regardless of its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of comparing a presented token against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Match,
    Mismatch,
    Expired,
}

impl IssuedToken {
    pub fn check(&self, presented: &str, now: DateTime<Utc>) -> TokenCheck {
        if self.value != presented {
            TokenCheck::Mismatch
        } else if now >= self.expires_at {
            TokenCheck::Expired
        } else {
            TokenCheck::Match
        }
    }
}

/// Registration input, validated by [`NewStudent::validate`].
///
/// Deserialize-only: it carries a plaintext password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct NewStudent {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub student_number: String,
    pub campus: String,
    pub password: String,
}

impl core::fmt::Debug for NewStudent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewStudent")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("student_number", &self.student_number)
            .field("campus", &self.campus)
            .finish_non_exhaustive()
    }
}

impl NewStudent {
    /// Validate and normalize registration input.
    ///
    /// Returns the parsed campus and the normalized email.
    pub fn validate(&self) -> DomainResult<(Campus, String)> {
        if self.full_name.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }
        let email = normalize_email(&self.email)?;
        if self.phone_number.trim().is_empty() {
            return Err(DomainError::validation("phone number cannot be empty"));
        }
        validate_student_number(&self.student_number)?;
        let campus = self.campus.parse::<Campus>()?;
        validate_password(&self.password)?;
        Ok((campus, email))
    }
}

/// Student account.
///
/// # Invariants
/// - `email` and `student_number` are unique among students.
/// - `student_number` is exactly nine ASCII digits.
/// - Document URLs live here, not on applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub student_number: String,
    pub campus: Campus,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification: Option<IssuedToken>,
    #[serde(skip_serializing)]
    pub password_reset: Option<IssuedToken>,
    pub documents: DocumentSlots,
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// Create an unverified student from validated registration input.
    pub fn register(
        input: &NewStudent,
        password_hash: String,
        verification: IssuedToken,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let (campus, email) = input.validate()?;
        Ok(Self {
            id: StudentId::new(),
            full_name: input.full_name.trim().to_string(),
            email,
            phone_number: input.phone_number.trim().to_string(),
            student_number: input.student_number.clone(),
            campus,
            password_hash,
            email_verified: false,
            verification: Some(verification),
            password_reset: None,
            documents: DocumentSlots::default(),
            created_at: now,
        })
    }

    pub fn ensure_verified(&self) -> DomainResult<()> {
        if self.email_verified {
            Ok(())
        } else {
            Err(DomainError::Unverified)
        }
    }

    /// Replace the stored verification token (resend).
    pub fn reissue_verification(&mut self, token: IssuedToken) -> DomainResult<()> {
        if self.email_verified {
            return Err(DomainError::invalid_state("email is already verified"));
        }
        self.verification = Some(token);
        Ok(())
    }

    /// Consume the verification token. The caller has already checked the
    /// token's signature and purpose.
    pub fn confirm_email(&mut self, presented: &str, now: DateTime<Utc>) -> TokenCheck {
        let check = match &self.verification {
            Some(stored) => stored.check(presented, now),
            None => TokenCheck::Mismatch,
        };
        if check == TokenCheck::Match {
            self.email_verified = true;
            self.verification = None;
        }
        check
    }

    pub fn issue_password_reset(&mut self, token: IssuedToken) {
        self.password_reset = Some(token);
    }

    /// Consume the reset token and install `new_hash` on success.
    pub fn reset_password(
        &mut self,
        presented: &str,
        new_hash: String,
        now: DateTime<Utc>,
    ) -> TokenCheck {
        let check = match &self.password_reset {
            Some(stored) => stored.check(presented, now),
            None => TokenCheck::Mismatch,
        };
        if check == TokenCheck::Match {
            self.password_hash = new_hash;
            self.password_reset = None;
        }
        check
    }
}

pub fn validate_student_number(value: &str) -> DomainResult<()> {
    if value.len() != STUDENT_NUMBER_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::validation(
            "student number must be exactly 9 digits",
        ));
    }
    Ok(())
}

/// Minimum length is counted in characters, not bytes.
pub fn validate_password(value: &str) -> DomainResult<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn normalize_email(value: &str) -> DomainResult<String> {
    let email = value.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input(student_number: &str) -> NewStudent {
        NewStudent {
            full_name: "Thandi Mokoena".to_string(),
            email: "Thandi@Example.com".to_string(),
            phone_number: "0820000000".to_string(),
            student_number: student_number.to_string(),
            campus: "Soshanguve South".to_string(),
            password: "secret1".to_string(),
        }
    }

    fn token(value: &str, now: DateTime<Utc>) -> IssuedToken {
        IssuedToken {
            value: value.to_string(),
            expires_at: now + Duration::hours(24),
        }
    }

    #[test]
    fn registration_input_debug_omits_password() {
        let rendered = format!("{:?}", input("123456789"));
        assert!(rendered.contains("Thandi@Example.com"));
        assert!(!rendered.contains("secret1"));
    }

    #[test]
    fn register_with_nine_digits_starts_unverified() {
        let now = Utc::now();
        let student = Student::register(&input("123456789"), "hash".into(), token("t", now), now)
            .unwrap();
        assert!(!student.email_verified);
        assert_eq!(student.email, "thandi@example.com");
        assert_eq!(student.campus, Campus::SoshanguveSouth);
        assert_eq!(
            student.verification.as_ref().unwrap().expires_at,
            now + Duration::hours(24)
        );
    }

    #[test]
    fn student_number_must_be_nine_digits() {
        for bad in ["12345678", "1234567890", "12345678a", "", "１２３４５６７８９"] {
            let err = input(bad).validate().unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{bad:?} accepted");
        }
    }

    #[test]
    fn short_password_is_rejected() {
        let mut i = input("123456789");
        i.password = "12345".to_string();
        assert!(i.validate().is_err());
    }

    #[test]
    fn malformed_email_is_rejected() {
        for bad in ["plain", "a@b", "@example.com", "a b@example.com"] {
            assert!(normalize_email(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn confirm_email_requires_exact_stored_token() {
        let now = Utc::now();
        let mut student =
            Student::register(&input("123456789"), "hash".into(), token("current", now), now)
                .unwrap();

        assert_eq!(student.confirm_email("stale", now), TokenCheck::Mismatch);
        assert!(!student.email_verified);

        assert_eq!(student.confirm_email("current", now), TokenCheck::Match);
        assert!(student.email_verified);
        assert!(student.verification.is_none());

        // Consumed: the same value no longer matches anything.
        assert_eq!(student.confirm_email("current", now), TokenCheck::Mismatch);
    }

    #[test]
    fn reissue_invalidates_previous_token() {
        let now = Utc::now();
        let mut student =
            Student::register(&input("123456789"), "hash".into(), token("first", now), now)
                .unwrap();
        student.reissue_verification(token("second", now)).unwrap();
        assert_eq!(student.confirm_email("first", now), TokenCheck::Mismatch);
        assert_eq!(student.confirm_email("second", now), TokenCheck::Match);
    }

    #[test]
    fn expired_stored_token_is_reported() {
        let now = Utc::now();
        let mut student =
            Student::register(&input("123456789"), "hash".into(), token("t", now), now).unwrap();
        student.issue_password_reset(IssuedToken {
            value: "reset".into(),
            expires_at: now - Duration::seconds(1),
        });
        assert_eq!(
            student.reset_password("reset", "new".into(), now),
            TokenCheck::Expired
        );
        assert_eq!(student.password_hash, "hash");
    }

    #[test]
    fn reset_password_installs_hash_once() {
        let now = Utc::now();
        let mut student =
            Student::register(&input("123456789"), "hash".into(), token("t", now), now).unwrap();
        student.issue_password_reset(IssuedToken {
            value: "reset".into(),
            expires_at: now + Duration::hours(1),
        });
        assert_eq!(student.reset_password("reset", "new".into(), now), TokenCheck::Match);
        assert_eq!(student.password_hash, "new");
        assert_eq!(
            student.reset_password("reset", "newer".into(), now),
            TokenCheck::Mismatch
        );
    }
}
