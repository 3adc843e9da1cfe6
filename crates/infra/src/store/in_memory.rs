use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use campusstay_core::{AdminId, ApplicationId, DomainError, PropertyId, StudentId};
use campusstay_housing::{
    Admin, Application, Decision, DecisionOutcome, DeletionActor, DocumentKind, Property, Student,
};

use super::{
    ApplicationScope, ApplicationView, CapacityEdit, Repository, StoreError, StudentEdit,
    StudentLookup, StudentSummary,
};

#[derive(Debug, Default)]
struct Tables {
    students: HashMap<StudentId, Student>,
    admins: HashMap<AdminId, Admin>,
    properties: HashMap<PropertyId, Property>,
    applications: HashMap<ApplicationId, Application>,
}

impl Tables {
    fn student_conflict(&self, candidate: &Student) -> Option<StoreError> {
        self.students
            .values()
            .filter(|s| s.id != candidate.id)
            .find_map(|s| {
                if s.email == candidate.email {
                    Some(StoreError::Conflict("email already registered".into()))
                } else if s.student_number == candidate.student_number {
                    Some(StoreError::Conflict("student number already registered".into()))
                } else {
                    None
                }
            })
    }

    fn view(&self, application: &Application) -> Result<ApplicationView, StoreError> {
        let property = self.properties.get(&application.property_id).ok_or_else(|| {
            StoreError::Corrupt(format!("application {} has no property", application.id))
        })?;
        let student = self.students.get(&application.student_id).ok_or_else(|| {
            StoreError::Corrupt(format!("application {} has no student", application.id))
        })?;
        Ok(ApplicationView {
            application: application.clone(),
            property_title: property.title.clone(),
            property_address: property.address.clone(),
            property_owner: property.admin_id,
            student: StudentSummary::from(student),
        })
    }
}

/// Store kept entirely in process memory.
///
/// Every multi-record operation holds the single write lock for its whole
/// duration, which gives it the same all-or-nothing behaviour as a database
/// transaction. Intended for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::backend("read", "lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::backend("write", "lock poisoned"))
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if let Some(conflict) = t.student_conflict(student) {
            return Err(conflict);
        }
        t.students.insert(student.id, student.clone());
        Ok(())
    }

    async fn edit_student(
        &self,
        lookup: StudentLookup<'_>,
        edit: StudentEdit<'_>,
    ) -> Result<Option<Student>, StoreError> {
        // The write guard is held from lookup to write-back.
        let mut t = self.write()?;
        let found = match lookup {
            StudentLookup::Id(id) => t.students.get(&id),
            StudentLookup::Email(email) => t.students.values().find(|s| s.email == email),
        };
        let Some(mut student) = found.cloned() else {
            return Ok(None);
        };
        edit(&mut student)?;
        if let Some(conflict) = t.student_conflict(&student) {
            return Err(conflict);
        }
        let stored = t
            .students
            .get_mut(&student.id)
            .ok_or(DomainError::not_found("student"))?;
        // Document slots are only written by `attach_documents`.
        student.documents = stored.documents.clone();
        *stored = student.clone();
        Ok(Some(student))
    }

    async fn student_by_id(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        Ok(self.read()?.students.get(&id).cloned())
    }

    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        Ok(self
            .read()?
            .students
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn student_by_number(&self, number: &str) -> Result<Option<Student>, StoreError> {
        Ok(self
            .read()?
            .students
            .values()
            .find(|s| s.student_number == number)
            .cloned())
    }

    async fn insert_admin(&self, admin: &Admin) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.admins.values().any(|a| a.email == admin.email) {
            return Err(StoreError::Conflict("admin email already registered".into()));
        }
        t.admins.insert(admin.id, admin.clone());
        Ok(())
    }

    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError> {
        Ok(self
            .read()?
            .admins
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn insert_property(&self, property: &Property) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if !t.admins.contains_key(&property.admin_id) {
            return Err(DomainError::not_found("admin").into());
        }
        t.properties.insert(property.id, property.clone());
        Ok(())
    }

    async fn update_property(
        &self,
        property: &Property,
        capacity: CapacityEdit,
    ) -> Result<(), StoreError> {
        let mut t = self.write()?;
        let stored = t
            .properties
            .get_mut(&property.id)
            .ok_or(DomainError::not_found("property"))?;
        let mut ledger = stored.capacity;
        if let CapacityEdit::SetAvailable(available) = capacity {
            ledger.set_available(available)?;
        }
        *stored = property.clone();
        stored.capacity = ledger;
        Ok(())
    }

    async fn delete_property(&self, id: PropertyId) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.properties.remove(&id).is_none() {
            return Err(DomainError::not_found("property").into());
        }
        t.applications.retain(|_, a| a.property_id != id);
        Ok(())
    }

    async fn property_by_id(&self, id: PropertyId) -> Result<Option<Property>, StoreError> {
        Ok(self.read()?.properties.get(&id).cloned())
    }

    async fn list_properties(&self, owner: Option<AdminId>) -> Result<Vec<Property>, StoreError> {
        let t = self.read()?;
        let mut out: Vec<Property> = t
            .properties
            .values()
            .filter(|p| owner.is_none_or(|o| p.admin_id == o))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn insert_application(&self, application: &Application) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if !t.students.contains_key(&application.student_id) {
            return Err(DomainError::not_found("student").into());
        }
        if !t.properties.contains_key(&application.property_id) {
            return Err(DomainError::not_found("property").into());
        }
        let duplicate = t.applications.values().any(|a| {
            a.student_id == application.student_id && a.property_id == application.property_id
        });
        if duplicate {
            return Err(StoreError::Conflict(
                "you have already applied to this property".into(),
            ));
        }
        t.applications.insert(application.id, application.clone());
        Ok(())
    }

    async fn application_by_id(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok(self.read()?.applications.get(&id).cloned())
    }

    async fn find_application(
        &self,
        student_id: StudentId,
        property_id: PropertyId,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self
            .read()?
            .applications
            .values()
            .find(|a| a.student_id == student_id && a.property_id == property_id)
            .cloned())
    }

    async fn application_views(
        &self,
        scope: ApplicationScope,
    ) -> Result<Vec<ApplicationView>, StoreError> {
        let t = self.read()?;
        let mut views = Vec::new();
        for application in t.applications.values() {
            let included = match scope {
                ApplicationScope::Student(id) => application.student_id == id,
                ApplicationScope::One(id) => application.id == id,
                ApplicationScope::Admin(admin_id) => t
                    .properties
                    .get(&application.property_id)
                    .is_some_and(|p| p.admin_id == admin_id),
            };
            if included {
                views.push(t.view(application)?);
            }
        }
        views.sort_by(|a, b| {
            b.application
                .applied_at
                .cmp(&a.application.applied_at)
                .then(b.application.id.cmp(&a.application.id))
        });
        Ok(views)
    }

    async fn attach_documents(
        &self,
        student_id: StudentId,
        application_id: ApplicationId,
        stored: &[(DocumentKind, String)],
        funding_approved: bool,
    ) -> Result<Vec<String>, StoreError> {
        let mut t = self.write()?;
        let mut application = t
            .applications
            .get(&application_id)
            .cloned()
            .ok_or(DomainError::not_found("application"))?;
        let mut student = t
            .students
            .get(&student_id)
            .cloned()
            .ok_or(DomainError::not_found("student"))?;

        let replaced = application.attach_documents(&mut student, stored, funding_approved)?;

        t.applications.insert(application.id, application);
        t.students.insert(student.id, student);
        Ok(replaced)
    }

    async fn decide_application(
        &self,
        application_id: ApplicationId,
        admin_id: AdminId,
        decision: Decision,
    ) -> Result<DecisionOutcome, StoreError> {
        let mut t = self.write()?;
        let mut application = t
            .applications
            .get(&application_id)
            .cloned()
            .ok_or(DomainError::not_found("application"))?;
        let mut property = t
            .properties
            .get(&application.property_id)
            .cloned()
            .ok_or(DomainError::not_found("application"))?;

        let outcome = application.decide(&mut property, admin_id, decision)?;

        t.applications.insert(application.id, application);
        t.properties.insert(property.id, property);
        Ok(outcome)
    }

    async fn delete_application(
        &self,
        application_id: ApplicationId,
        actor: DeletionActor,
    ) -> Result<Application, StoreError> {
        let mut t = self.write()?;
        let application = t
            .applications
            .get(&application_id)
            .ok_or(DomainError::not_found("application"))?;
        let owner = t
            .properties
            .get(&application.property_id)
            .map(|p| p.admin_id)
            .ok_or(DomainError::not_found("application"))?;

        application.ensure_deletable_by(actor, owner)?;

        t.applications
            .remove(&application_id)
            .ok_or_else(|| DomainError::not_found("application").into())
    }
}
