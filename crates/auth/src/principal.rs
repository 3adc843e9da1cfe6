use campusstay_housing::{Admin, Student};

use crate::Role;

/// An authenticated identity. Every authorization boundary matches on this
/// exhaustively rather than probing for fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Student(Student),
    Admin(Admin),
}

impl Principal {
    pub fn role(&self) -> Role {
        match self {
            Principal::Student(_) => Role::Student,
            Principal::Admin(_) => Role::Admin,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Principal::Student(s) => &s.email,
            Principal::Admin(a) => &a.email,
        }
    }

    pub fn full_name(&self) -> &str {
        match self {
            Principal::Student(s) => &s.full_name,
            Principal::Admin(a) => &a.full_name,
        }
    }
}
