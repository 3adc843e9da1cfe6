//! Student account flows and admin bootstrap.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use campusstay_auth::{IdentityResolver, Principal, TokenError, TokenPurpose};
use campusstay_core::{DomainError, StudentId};
use campusstay_housing::{
    Admin, IssuedToken, NewStudent, Student, normalize_email, validate_password,
    validate_student_number,
};

use super::ServiceError;
use crate::config::BootstrapAdmin;
use crate::mail::{Notifier, templates};
use crate::store::{Repository, StoreError, StudentLookup};

/// Result of presenting an email verification token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub token: IssuedToken,
}

/// Optional profile changes; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub phone_number: Option<String>,
    pub student_number: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Repository>,
    resolver: IdentityResolver,
    notifier: Notifier,
}

impl AccountService {
    pub fn new(store: Arc<dyn Repository>, resolver: IdentityResolver, notifier: Notifier) -> Self {
        Self {
            store,
            resolver,
            notifier,
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Create an unverified student and mail the verification link.
    #[instrument(skip(self, input), fields(email = %input.email), err)]
    pub async fn register(&self, input: NewStudent) -> Result<Student, ServiceError> {
        let (_, email) = input.validate()?;
        if self.store.student_by_email(&email).await?.is_some() {
            return Err(DomainError::conflict("email already registered").into());
        }
        if self
            .store
            .student_by_number(&input.student_number)
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("student number already registered").into());
        }

        let hash = self.resolver.credentials().hash(&input.password)?;
        let token = self.resolver.tokens().issue_email_verification(&email)?;
        let student = Student::register(&input, hash, token.clone(), Utc::now())?;
        self.store.insert_student(&student).await?;

        self.send_verification(&student, &token);
        info!(student_id = %student.id, "student registered");
        Ok(student)
    }

    #[instrument(skip_all, err)]
    pub async fn verify_email(&self, token: &str) -> Result<VerifyOutcome, ServiceError> {
        let claims = self
            .resolver
            .tokens()
            .verify(token, TokenPurpose::EmailVerification)?;
        let now = Utc::now();
        let mut already_verified = false;
        let student = self
            .store
            .edit_student(
                StudentLookup::Email(&claims.sub),
                Box::new(|student: &mut Student| -> Result<(), StoreError> {
                    if student.email_verified {
                        already_verified = true;
                        return Ok(());
                    }
                    StoreError::check_token(student.confirm_email(token, now))
                }),
            )
            .await?
            .ok_or(TokenError::Invalid)?;

        if already_verified {
            return Ok(VerifyOutcome::AlreadyVerified);
        }
        info!(student_id = %student.id, "email verified");
        Ok(VerifyOutcome::Verified)
    }

    /// Reissue the verification token. Unknown and already verified
    /// addresses are accepted silently.
    #[instrument(skip(self), err)]
    pub async fn resend_verification(&self, email: &str) -> Result<(), ServiceError> {
        let Some(email) = normalized(email) else {
            debug!("verification resend for malformed address");
            return Ok(());
        };

        let token = self.resolver.tokens().issue_email_verification(&email)?;
        let issued = token.clone();
        let mut already_verified = false;
        let found = self
            .store
            .edit_student(
                StudentLookup::Email(&email),
                Box::new(|student: &mut Student| -> Result<(), StoreError> {
                    if student.email_verified {
                        already_verified = true;
                        return Ok(());
                    }
                    student.reissue_verification(issued)?;
                    Ok(())
                }),
            )
            .await?;

        let Some(student) = found else {
            debug!("verification resend for unknown address");
            return Ok(());
        };
        if already_verified {
            debug!(student_id = %student.id, "verification resend for verified student");
            return Ok(());
        }
        self.send_verification(&student, &token);
        Ok(())
    }

    /// Issue and mail a password reset token. Always succeeds for unknown
    /// addresses so the response does not reveal which accounts exist.
    #[instrument(skip(self), err)]
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let Some(email) = normalized(email) else {
            debug!("password reset requested for malformed address");
            return Ok(());
        };

        let token = self.resolver.tokens().issue_password_reset(&email)?;
        let issued = token.clone();
        let found = self
            .store
            .edit_student(
                StudentLookup::Email(&email),
                Box::new(move |student: &mut Student| -> Result<(), StoreError> {
                    student.issue_password_reset(issued);
                    Ok(())
                }),
            )
            .await?;
        let Some(student) = found else {
            debug!("password reset requested for unknown address");
            return Ok(());
        };

        let link = format!(
            "{}/reset-password?token={}",
            self.notifier.frontend_url(),
            token.value
        );
        self.notifier.dispatch(templates::password_reset(
            &student.email,
            &student.full_name,
            &link,
        ));
        info!(student_id = %student.id, "password reset issued");
        Ok(())
    }

    /// Install a new password if `token` is the reset token currently on
    /// file. The check and the write happen under one row lock.
    #[instrument(skip_all, err)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        let claims = self
            .resolver
            .tokens()
            .verify(token, TokenPurpose::PasswordReset)?;
        validate_password(new_password)?;
        let hash = self.resolver.credentials().hash(new_password)?;
        let now = Utc::now();

        let student = self
            .store
            .edit_student(
                StudentLookup::Email(&claims.sub),
                Box::new(move |student: &mut Student| -> Result<(), StoreError> {
                    StoreError::check_token(student.reset_password(token, hash, now))
                }),
            )
            .await?
            .ok_or(TokenError::Invalid)?;

        info!(student_id = %student.id, "password reset");
        Ok(())
    }

    #[instrument(skip(self, password), err)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let principal = self.resolver.authenticate(email, password).await?;
        let token = self
            .resolver
            .tokens()
            .issue_session(principal.email(), principal.role())?;
        info!(role = %principal.role(), "login");
        Ok(Session { principal, token })
    }

    #[instrument(skip(self, update), err)]
    pub async fn update_profile(
        &self,
        student_id: StudentId,
        update: ProfileUpdate,
    ) -> Result<Student, ServiceError> {
        let phone = update.phone_number.map(|p| p.trim().to_string());
        if phone.as_deref().is_some_and(str::is_empty) {
            return Err(DomainError::validation("phone number cannot be empty").into());
        }
        if let Some(number) = &update.student_number {
            validate_student_number(number)?;
        }

        let credentials = *self.resolver.credentials();
        let password = match update.new_password {
            Some(new_password) => {
                let current = update
                    .current_password
                    .ok_or_else(|| DomainError::validation("current password is required"))?;
                validate_password(&new_password)?;
                Some((current, credentials.hash(&new_password)?))
            }
            None => None,
        };
        let number = update.student_number;

        // Number uniqueness is enforced by the store on write-back.
        let student = self
            .store
            .edit_student(
                StudentLookup::Id(student_id),
                Box::new(move |student: &mut Student| -> Result<(), StoreError> {
                    if let Some((current, hash)) = password {
                        if !credentials.verify(&current, &student.password_hash) {
                            return Err(
                                DomainError::validation("current password is incorrect").into()
                            );
                        }
                        student.password_hash = hash;
                    }
                    if let Some(phone) = phone {
                        student.phone_number = phone;
                    }
                    if let Some(number) = number {
                        student.student_number = number;
                    }
                    Ok(())
                }),
            )
            .await?
            .ok_or(DomainError::not_found("student"))?;

        info!(student_id = %student.id, "profile updated");
        Ok(student)
    }

    /// Create the configured admin unless an admin with that email exists.
    #[instrument(skip(self, bootstrap), fields(email = %bootstrap.email), err)]
    pub async fn bootstrap_admin(&self, bootstrap: &BootstrapAdmin) -> Result<Admin, ServiceError> {
        let email = normalize_email(&bootstrap.email)?;
        if let Some(existing) = self.store.admin_by_email(&email).await? {
            debug!(admin_id = %existing.id, "bootstrap admin already present");
            return Ok(existing);
        }

        validate_password(&bootstrap.password)?;
        let hash = self.resolver.credentials().hash(&bootstrap.password)?;
        let admin = Admin::new(&bootstrap.full_name, &email, hash, Utc::now())?;
        self.store.insert_admin(&admin).await?;
        info!(admin_id = %admin.id, "bootstrap admin created");
        Ok(admin)
    }

    fn send_verification(&self, student: &Student, token: &IssuedToken) {
        let link = format!(
            "{}/verify-email?token={}",
            self.notifier.frontend_url(),
            token.value
        );
        self.notifier.dispatch(templates::verification(
            &student.email,
            &student.full_name,
            &link,
        ));
    }
}

/// Malformed addresses are treated like unknown ones.
fn normalized(email: &str) -> Option<String> {
    normalize_email(email).ok()
}
