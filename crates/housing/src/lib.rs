//! `campusstay-housing`: the accommodation domain model.
//!
//! Students, administrators, properties (with their capacity ledger) and the
//! application lifecycle. Everything here is deterministic and IO-free; the
//! infra crate persists these types and drives the transitions.

pub mod admin;
pub mod application;
pub mod campus;
pub mod document;
pub mod property;
pub mod student;

pub use admin::Admin;
pub use application::{Application, ApplicationStatus, Decision, DecisionOutcome, DeletionActor};
pub use campus::Campus;
pub use document::{DocumentKind, DocumentSlots, DocumentUpload, PDF_CONTENT_TYPE, validate_batch};
pub use property::{
    CapacityLedger, MAX_PROPERTY_IMAGES, NewProperty, Property, PropertyImage, Reservation,
    validate_image,
};
pub use student::{
    IssuedToken, MIN_PASSWORD_LEN, NewStudent, Student, TokenCheck, normalize_email,
    validate_password, validate_student_number,
};
