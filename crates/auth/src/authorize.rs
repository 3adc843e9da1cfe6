//! Role-gated accessors on a resolved [`Principal`].

use campusstay_housing::{Admin, Student};

use crate::{AuthError, Principal};

impl Principal {
    pub fn require_admin(&self) -> Result<&Admin, AuthError> {
        match self {
            Principal::Admin(admin) => Ok(admin),
            Principal::Student(_) => Err(AuthError::Forbidden("admin access required")),
        }
    }

    pub fn require_student(&self) -> Result<&Student, AuthError> {
        match self {
            Principal::Student(student) => Ok(student),
            Principal::Admin(_) => Err(AuthError::Forbidden("student access required")),
        }
    }

    pub fn into_admin(self) -> Result<Admin, AuthError> {
        match self {
            Principal::Admin(admin) => Ok(admin),
            Principal::Student(_) => Err(AuthError::Forbidden("admin access required")),
        }
    }

    pub fn into_student(self) -> Result<Student, AuthError> {
        match self {
            Principal::Student(student) => Ok(student),
            Principal::Admin(_) => Err(AuthError::Forbidden("student access required")),
        }
    }
}
