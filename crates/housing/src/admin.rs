use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusstay_core::{AdminId, DomainError, DomainResult};

/// Administrator account. Owns zero or more properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub id: AdminId,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Admin {
    /// Build a new, active admin. The password must already be hashed.
    pub fn new(
        full_name: &str,
        email: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let email = crate::student::normalize_email(email)?;
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }

        Ok(Self {
            id: AdminId::new(),
            full_name: full_name.to_string(),
            email,
            password_hash,
            is_active: true,
            created_at: now,
        })
    }
}

