//! Application lifecycle.
//!
//! ```text
//! pending ──approve──▶ approved   (terminal)
//!    │
//!    └────reject────▶ rejected   (terminal)
//! ```
//!
//! Deletion is a side exit, not a state: students may delete only while
//! pending, admins only after deciding.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusstay_core::{AdminId, ApplicationId, DomainError, DomainResult, PropertyId, StudentId};

use crate::document::DocumentKind;
use crate::property::{Property, Reservation};
use crate::student::Student;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ApplicationStatus::Pending => false,
            ApplicationStatus::Approved | ApplicationStatus::Rejected => true,
        }
    }
}

impl core::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown application status '{other}'"
            ))),
        }
    }
}

/// Admin outcome for a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target(&self) -> ApplicationStatus {
        match self {
            Decision::Approve => ApplicationStatus::Approved,
            Decision::Reject => ApplicationStatus::Rejected,
        }
    }
}

/// Result of a successful decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub status: ApplicationStatus,
    /// `Some` for approvals; `AlreadyExhausted` means the capacity check at
    /// submission was overtaken by a concurrent approval.
    pub reservation: Option<Reservation>,
}

/// Who is asking to delete an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionActor {
    Student(StudentId),
    Admin(AdminId),
}

/// An accommodation application.
///
/// # Invariants
/// - At most one application per (student, property) pair.
/// - Once `status` is terminal, nothing but deletion by the owning admin changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub student_id: StudentId,
    pub property_id: PropertyId,
    pub status: ApplicationStatus,
    pub notes: String,
    pub funding_approved: bool,
    pub applied_at: DateTime<Utc>,
}

impl Application {
    /// Submit a new pending application.
    ///
    /// Duplicate detection needs the store and is done by the caller.
    pub fn submit(
        student: &Student,
        property: &Property,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        student.ensure_verified()?;
        property.capacity.ensure_capacity()?;

        Ok(Self {
            id: ApplicationId::new(),
            student_id: student.id,
            property_id: property.id,
            status: ApplicationStatus::Pending,
            notes: notes.trim().to_string(),
            funding_approved: false,
            applied_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }

    /// Applications of other students are reported as missing.
    pub fn ensure_belongs_to(&self, student_id: StudentId) -> DomainResult<()> {
        if self.student_id == student_id {
            Ok(())
        } else {
            Err(DomainError::not_found("application"))
        }
    }

    pub fn ensure_pending(&self, action: &str) -> DomainResult<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!(
                "cannot {action} an application that is {}",
                self.status
            )))
        }
    }

    /// Record newly stored documents on the student and set the funding flag.
    ///
    /// `stored` holds the URLs of documents that were already written to the
    /// blob store. Returns the URLs they replaced, which are no longer
    /// referenced once this change is committed.
    pub fn attach_documents(
        &mut self,
        student: &mut Student,
        stored: &[(DocumentKind, String)],
        funding_approved: bool,
    ) -> DomainResult<Vec<String>> {
        self.ensure_belongs_to(student.id)?;
        self.ensure_pending("update")?;

        let replaced = stored
            .iter()
            .filter_map(|(kind, url)| student.documents.replace(*kind, url.clone()))
            .collect();
        self.funding_approved = funding_approved;
        Ok(replaced)
    }

    /// Decide a pending application on behalf of the admin owning `property`.
    pub fn decide(
        &mut self,
        property: &mut Property,
        admin_id: AdminId,
        decision: Decision,
    ) -> DomainResult<DecisionOutcome> {
        if property.id != self.property_id {
            return Err(DomainError::invalid_state(
                "application does not belong to this property",
            ));
        }
        if !property.is_owned_by(admin_id) {
            return Err(DomainError::not_found("application"));
        }
        self.ensure_pending(match decision {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        })?;

        let reservation = match decision {
            Decision::Approve => Some(property.capacity.reserve()),
            Decision::Reject => None,
        };
        self.status = decision.target();

        Ok(DecisionOutcome {
            status: self.status,
            reservation,
        })
    }

    /// Deletion gate. `property_owner` is the admin owning the property the
    /// application targets.
    pub fn ensure_deletable_by(
        &self,
        actor: DeletionActor,
        property_owner: AdminId,
    ) -> DomainResult<()> {
        match actor {
            DeletionActor::Student(student_id) => {
                self.ensure_belongs_to(student_id)?;
                if !self.is_pending() {
                    return Err(DomainError::invalid_state(
                        "cannot delete an application that has been processed; contact administration",
                    ));
                }
            }
            DeletionActor::Admin(admin_id) => {
                if admin_id != property_owner {
                    return Err(DomainError::not_found("application"));
                }
                if self.is_pending() {
                    return Err(DomainError::invalid_state(
                        "pending applications must be approved or rejected before deletion",
                    ));
                }
            }
        }
        Ok(())
    }
}
