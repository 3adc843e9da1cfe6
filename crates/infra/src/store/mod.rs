//! Persistent store for accounts, properties and applications.
//!
//! Multi-record transitions (`attach_documents`, `decide_application`,
//! `delete_application`) and student edits (`edit_student`) run the housing
//! rules inside one store transaction, so the rules live in the domain and
//! atomicity lives here.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use campusstay_core::{AdminId, ApplicationId, DomainError, PropertyId, StudentId};
use campusstay_housing::{
    Admin, Application, Campus, Decision, DecisionOutcome, DeletionActor, DocumentKind,
    DocumentSlots, Property, Student, TokenCheck,
};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was hit.
    #[error("{0}")]
    Conflict(String),

    /// The domain refused the transition.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    #[error("storage failure during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// The stored one-time token refused the presented value.
    #[error("stored token rejected: {0:?}")]
    TokenRejected(TokenCheck),

    #[error("stored row is unreadable: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Lift a token comparison into the edit result; `Match` passes.
    pub fn check_token(check: TokenCheck) -> Result<(), StoreError> {
        match check {
            TokenCheck::Match => Ok(()),
            refused => Err(StoreError::TokenRejected(refused)),
        }
    }

    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// Student contact details plus their current document slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentSummary {
    pub id: StudentId,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub student_number: String,
    pub campus: Campus,
    pub documents: DocumentSlots,
}

impl From<&Student> for StudentSummary {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            full_name: s.full_name.clone(),
            email: s.email.clone(),
            phone_number: s.phone_number.clone(),
            student_number: s.student_number.clone(),
            campus: s.campus,
            documents: s.documents.clone(),
        }
    }
}

/// An application joined with its property and the student's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationView {
    pub application: Application,
    pub property_title: String,
    pub property_address: String,
    pub property_owner: AdminId,
    pub student: StudentSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentLookup<'a> {
    Id(StudentId),
    /// Normalized email.
    Email(&'a str),
}

/// Runs against the current row while it is locked. Returning an error
/// leaves the row untouched.
pub type StudentEdit<'a> = Box<dyn FnOnce(&mut Student) -> Result<(), StoreError> + Send + 'a>;

/// Capacity change applied together with a property update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityEdit {
    Keep,
    SetAvailable(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationScope {
    Student(StudentId),
    /// Applications on properties owned by this admin.
    Admin(AdminId),
    One(ApplicationId),
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn insert_student(&self, student: &Student) -> Result<(), StoreError>;
    /// Read, edit and write back one student atomically. Document slots are
    /// not written here. `Ok(None)` when no student matches.
    async fn edit_student(
        &self,
        lookup: StudentLookup<'_>,
        edit: StudentEdit<'_>,
    ) -> Result<Option<Student>, StoreError>;
    async fn student_by_id(&self, id: StudentId) -> Result<Option<Student>, StoreError>;
    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError>;
    async fn student_by_number(&self, number: &str) -> Result<Option<Student>, StoreError>;

    async fn insert_admin(&self, admin: &Admin) -> Result<(), StoreError>;
    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError>;

    async fn insert_property(&self, property: &Property) -> Result<(), StoreError>;
    /// Save descriptive fields and the image list, plus an optional
    /// capacity edit bounded by `total_units`, in one transaction. The
    /// stored ledger is used, not the one carried by `property`.
    async fn update_property(
        &self,
        property: &Property,
        capacity: CapacityEdit,
    ) -> Result<(), StoreError>;
    /// Remove a property together with its images and applications.
    async fn delete_property(&self, id: PropertyId) -> Result<(), StoreError>;
    async fn property_by_id(&self, id: PropertyId) -> Result<Option<Property>, StoreError>;
    async fn list_properties(&self, owner: Option<AdminId>) -> Result<Vec<Property>, StoreError>;

    /// Insert a pending application; a second one for the same pair is a `Conflict`.
    async fn insert_application(&self, application: &Application) -> Result<(), StoreError>;
    async fn application_by_id(&self, id: ApplicationId) -> Result<Option<Application>, StoreError>;
    async fn find_application(
        &self,
        student_id: StudentId,
        property_id: PropertyId,
    ) -> Result<Option<Application>, StoreError>;
    /// Newest first.
    async fn application_views(
        &self,
        scope: ApplicationScope,
    ) -> Result<Vec<ApplicationView>, StoreError>;

    /// Point the student's slots at already-stored documents and set the
    /// funding flag, atomically. Returns the URLs that were replaced.
    async fn attach_documents(
        &self,
        student_id: StudentId,
        application_id: ApplicationId,
        stored: &[(DocumentKind, String)],
        funding_approved: bool,
    ) -> Result<Vec<String>, StoreError>;

    /// Status change and capacity decrement commit together or not at all.
    async fn decide_application(
        &self,
        application_id: ApplicationId,
        admin_id: AdminId,
        decision: Decision,
    ) -> Result<DecisionOutcome, StoreError>;

    async fn delete_application(
        &self,
        application_id: ApplicationId,
        actor: DeletionActor,
    ) -> Result<Application, StoreError>;
}
