use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusstay_auth::{Principal, Role};
use campusstay_core::{AdminId, ApplicationId, PropertyId, StudentId};
use campusstay_housing::{
    Admin, ApplicationStatus, Campus, DocumentSlots, Property, Student,
};
use campusstay_infra::services::{ProfileUpdate, Session};
use campusstay_infra::store::{ApplicationView, StudentSummary};

// -------------------------
// Request DTOs
// -------------------------

/// OAuth2 password-grant style form: `username` carries the email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub phone_number: Option<String>,
    pub student_number: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(r: UpdateProfileRequest) -> Self {
        ProfileUpdate {
            phone_number: r.phone_number,
            student_number: r.student_number,
            current_password: r.current_password,
            new_password: r.new_password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub property_id: String,
    #[serde(default)]
    pub notes: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub role: Role,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

impl From<Session> for LoginResponse {
    fn from(session: Session) -> Self {
        let (student_id, email_verified) = match &session.principal {
            Principal::Student(s) => (Some(s.id), Some(s.email_verified)),
            Principal::Admin(_) => (None, None),
        };
        Self {
            access_token: session.token.value,
            token_type: "bearer",
            role: session.principal.role(),
            email: session.principal.email().to_string(),
            full_name: session.principal.full_name().to_string(),
            student_id,
            email_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub student_number: String,
    pub campus: Campus,
    pub email_verified: bool,
    pub documents: DocumentsResponse,
    pub created_at: DateTime<Utc>,
}

impl From<&Student> for StudentProfile {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            role: Role::Student,
            full_name: s.full_name.clone(),
            email: s.email.clone(),
            phone_number: s.phone_number.clone(),
            student_number: s.student_number.clone(),
            campus: s.campus,
            email_verified: s.email_verified,
            documents: (&s.documents).into(),
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminProfile {
    pub id: AdminId,
    pub role: Role,
    pub full_name: String,
    pub email: String,
}

impl From<&Admin> for AdminProfile {
    fn from(a: &Admin) -> Self {
        Self {
            id: a.id,
            role: Role::Admin,
            full_name: a.full_name.clone(),
            email: a.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProfileResponse {
    Student(StudentProfile),
    Admin(AdminProfile),
}

impl From<&Principal> for ProfileResponse {
    fn from(p: &Principal) -> Self {
        match p {
            Principal::Student(s) => ProfileResponse::Student(s.into()),
            Principal::Admin(a) => ProfileResponse::Admin(a.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentsResponse {
    pub id_copy: Option<String>,
    pub proof_of_registration: Option<String>,
}

impl From<&DocumentSlots> for DocumentsResponse {
    fn from(d: &DocumentSlots) -> Self {
        Self {
            id_copy: d.id_document_url.clone(),
            proof_of_registration: d.proof_of_registration_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StudentContact {
    pub id: StudentId,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub student_number: String,
    pub campus: Campus,
}

impl From<&StudentSummary> for StudentContact {
    fn from(s: &StudentSummary) -> Self {
        Self {
            id: s.id,
            full_name: s.full_name.clone(),
            email: s.email.clone(),
            phone_number: s.phone_number.clone(),
            student_number: s.student_number.clone(),
            campus: s.campus,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApplicationResponse {
    pub id: ApplicationId,
    pub property_id: PropertyId,
    pub property_title: String,
    pub property_address: String,
    pub status: ApplicationStatus,
    pub notes: String,
    pub funding_approved: bool,
    pub applied_at: DateTime<Utc>,
    /// Always the student's current uploads.
    pub documents: DocumentsResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentContact>,
}

impl ApplicationResponse {
    /// Student-facing shape: no contact block.
    pub fn for_student(view: &ApplicationView) -> Self {
        Self::build(view, false)
    }

    /// Admin-facing shape, including the student's contact details.
    pub fn for_admin(view: &ApplicationView) -> Self {
        Self::build(view, true)
    }

    fn build(view: &ApplicationView, with_student: bool) -> Self {
        let app = &view.application;
        Self {
            id: app.id,
            property_id: app.property_id,
            property_title: view.property_title.clone(),
            property_address: view.property_address.clone(),
            status: app.status,
            notes: app.notes.clone(),
            funding_approved: app.funding_approved,
            applied_at: app.applied_at,
            documents: (&view.student.documents).into(),
            student: with_student.then(|| (&view.student).into()),
        }
    }
}

/// `GET /admin/applications/{id}/documents`.
#[derive(Debug, Serialize)]
pub struct ApplicationDocuments {
    pub application_id: ApplicationId,
    pub student_name: String,
    pub funding_approved: bool,
    pub documents: DocumentsResponse,
}

impl From<&ApplicationView> for ApplicationDocuments {
    fn from(view: &ApplicationView) -> Self {
        Self {
            application_id: view.application.id,
            student_name: view.student.full_name.clone(),
            funding_approved: view.application.funding_approved,
            documents: (&view.student.documents).into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    pub id: PropertyId,
    pub title: String,
    pub address: String,
    pub is_bachelor: bool,
    pub available_units: u32,
    pub total_units: u32,
    pub space_per_student: f64,
    pub campus_intake: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Property> for PropertyResponse {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            address: p.address.clone(),
            is_bachelor: p.is_bachelor,
            available_units: p.capacity.available(),
            total_units: p.capacity.total(),
            space_per_student: p.space_per_student,
            campus_intake: p.campus_intake.clone(),
            images: p.image_urls(),
            created_at: p.created_at,
        }
    }
}

pub fn properties(list: &[Property]) -> Vec<PropertyResponse> {
    list.iter().map(PropertyResponse::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusstay_housing::NewProperty;

    #[test]
    fn property_response_reports_both_counters() {
        let property = Property::create(
            AdminId::new(),
            NewProperty {
                title: "Loft".into(),
                address: "1 Main Rd".into(),
                is_bachelor: false,
                available_units: 4,
                space_per_student: 12.0,
                campus_intake: "Arts Campus".into(),
            },
            Utc::now(),
        )
        .unwrap();
        let json = serde_json::to_value(PropertyResponse::from(&property)).unwrap();
        assert_eq!(json["available_units"], 4);
        assert_eq!(json["total_units"], 4);
    }

    #[test]
    fn admin_login_omits_student_fields() {
        let admin = Admin::new("Root", "root@uni.ac.za", "hash".into(), Utc::now()).unwrap();
        let session = Session {
            principal: Principal::Admin(admin),
            token: campusstay_housing::IssuedToken {
                value: "t".into(),
                expires_at: Utc::now(),
            },
        };
        let json = serde_json::to_value(LoginResponse::from(session)).unwrap();
        assert_eq!(json["role"], "admin");
        assert_eq!(json["token_type"], "bearer");
        assert!(json.get("student_id").is_none());
    }
}
