//! Student and admin operations on applications.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use campusstay_core::{AdminId, ApplicationId, DomainError, PropertyId, StudentId};
use campusstay_housing::{
    Application, ApplicationStatus, Decision, DeletionActor, DocumentKind, DocumentUpload,
    PDF_CONTENT_TYPE, Reservation, Student, validate_batch,
};

use super::ServiceError;
use crate::blob::{BlobStore, release};
use crate::mail::{Notifier, templates};
use crate::store::{ApplicationScope, ApplicationView, Repository};

/// Dashboard figures for one admin's properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminStats {
    pub total_properties: usize,
    pub total_applications: usize,
    pub pending_applications: usize,
    pub approved_applications: usize,
    pub rejected_applications: usize,
    /// Occupied share of all units, in percent, two decimals.
    pub occupancy_rate: f64,
}

#[derive(Clone)]
pub struct ApplicationService {
    store: Arc<dyn Repository>,
    blobs: Arc<dyn BlobStore>,
    notifier: Notifier,
}

impl ApplicationService {
    pub fn new(store: Arc<dyn Repository>, blobs: Arc<dyn BlobStore>, notifier: Notifier) -> Self {
        Self {
            store,
            blobs,
            notifier,
        }
    }

    /// Submit a pending application and mail a confirmation.
    #[instrument(skip(self, student, notes), fields(student_id = %student.id), err)]
    pub async fn create(
        &self,
        student: &Student,
        property_id: PropertyId,
        notes: &str,
    ) -> Result<ApplicationView, ServiceError> {
        student.ensure_verified()?;
        if self
            .store
            .find_application(student.id, property_id)
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("you have already applied for this property").into());
        }
        let property = self
            .store
            .property_by_id(property_id)
            .await?
            .ok_or(DomainError::not_found("property"))?;

        let application = Application::submit(student, &property, notes, Utc::now())?;
        self.store.insert_application(&application).await?;

        self.notifier.dispatch(templates::application_submitted(
            &student.email,
            &student.full_name,
            &property.title,
            &property.address,
        ));
        info!(application_id = %application.id, "application submitted");
        self.load_view(application.id).await
    }

    pub async fn list_mine(&self, student_id: StudentId) -> Result<Vec<ApplicationView>, ServiceError> {
        Ok(self
            .store
            .application_views(ApplicationScope::Student(student_id))
            .await?)
    }

    pub async fn get_mine(
        &self,
        student_id: StudentId,
        id: ApplicationId,
    ) -> Result<ApplicationView, ServiceError> {
        let view = self.load_view(id).await?;
        view.application.ensure_belongs_to(student_id)?;
        Ok(view)
    }

    /// Store the uploaded documents, point the student's slots at them and
    /// set the funding flag.
    ///
    /// New blobs are written first, then the database reference is
    /// committed, then replaced blobs are released. A failure before the
    /// commit releases whatever this call already wrote.
    #[instrument(skip(self, student, uploads), fields(student_id = %student.id, documents = uploads.len()), err)]
    pub async fn attach_documents(
        &self,
        student: &Student,
        id: ApplicationId,
        uploads: Vec<DocumentUpload>,
        funding_approved: bool,
    ) -> Result<ApplicationView, ServiceError> {
        let application = self
            .store
            .application_by_id(id)
            .await?
            .ok_or(DomainError::not_found("application"))?;
        application.ensure_belongs_to(student.id)?;
        application.ensure_pending("update")?;
        validate_batch(&uploads)?;

        let mut stored: Vec<(DocumentKind, String)> = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let nonce = Uuid::now_v7().simple().to_string();
            let key = upload.kind.blob_key(student.id, &nonce);
            match self.blobs.put(&key, upload.bytes, PDF_CONTENT_TYPE).await {
                Ok(url) => stored.push((upload.kind, url)),
                Err(err) => {
                    self.discard(&stored).await;
                    return Err(err.into());
                }
            }
        }

        let replaced = match self
            .store
            .attach_documents(student.id, id, &stored, funding_approved)
            .await
        {
            Ok(replaced) => replaced,
            Err(err) => {
                error!(application_id = %id, error = %err, "document commit failed; releasing new blobs");
                self.discard(&stored).await;
                return Err(err.into());
            }
        };

        for url in replaced {
            if !stored.iter().any(|(_, new)| *new == url) {
                let _ = release(self.blobs.as_ref(), &url).await;
            }
        }

        info!(application_id = %id, funding_approved, "documents attached");
        self.load_view(id).await
    }

    #[instrument(skip(self), err)]
    pub async fn delete_as_student(
        &self,
        student_id: StudentId,
        id: ApplicationId,
    ) -> Result<(), ServiceError> {
        self.store
            .delete_application(id, DeletionActor::Student(student_id))
            .await?;
        info!(application_id = %id, "application withdrawn");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn delete_as_admin(&self, admin_id: AdminId, id: ApplicationId) -> Result<(), ServiceError> {
        self.store
            .delete_application(id, DeletionActor::Admin(admin_id))
            .await?;
        info!(application_id = %id, "application deleted");
        Ok(())
    }

    /// Approve or reject, then notify the student.
    #[instrument(skip(self), err)]
    pub async fn decide(
        &self,
        admin_id: AdminId,
        id: ApplicationId,
        decision: Decision,
    ) -> Result<ApplicationView, ServiceError> {
        let outcome = self
            .store
            .decide_application(id, admin_id, decision)
            .await?;
        if outcome.reservation == Some(Reservation::AlreadyExhausted) {
            warn!(application_id = %id, "approved with no units left; capacity unchanged");
        }

        let view = self.load_view(id).await?;
        let email = match decision {
            Decision::Approve => templates::application_approved(
                &view.student.email,
                &view.student.full_name,
                &view.property_title,
                &view.property_address,
            ),
            Decision::Reject => templates::application_rejected(
                &view.student.email,
                &view.student.full_name,
                &view.property_title,
            ),
        };
        self.notifier.dispatch(email);

        info!(application_id = %id, status = %outcome.status, "application decided");
        Ok(view)
    }

    /// Applications on the admin's properties, optionally by status.
    pub async fn admin_list(
        &self,
        admin_id: AdminId,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationView>, ServiceError> {
        let views = self
            .store
            .application_views(ApplicationScope::Admin(admin_id))
            .await?;
        Ok(views
            .into_iter()
            .filter(|v| status.is_none_or(|s| v.application.status == s))
            .collect())
    }

    pub async fn admin_get(
        &self,
        admin_id: AdminId,
        id: ApplicationId,
    ) -> Result<ApplicationView, ServiceError> {
        let view = self.load_view(id).await?;
        if view.property_owner != admin_id {
            return Err(DomainError::not_found("application").into());
        }
        Ok(view)
    }

    pub async fn stats(&self, admin_id: AdminId) -> Result<AdminStats, ServiceError> {
        let properties = self.store.list_properties(Some(admin_id)).await?;
        let views = self
            .store
            .application_views(ApplicationScope::Admin(admin_id))
            .await?;
        let count = |status: ApplicationStatus| {
            views
                .iter()
                .filter(|v| v.application.status == status)
                .count()
        };

        let total: u64 = properties.iter().map(|p| u64::from(p.capacity.total())).sum();
        let occupied: u64 = properties
            .iter()
            .map(|p| u64::from(p.capacity.occupied()))
            .sum();
        let occupancy_rate = if total == 0 {
            0.0
        } else {
            (occupied as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        Ok(AdminStats {
            total_properties: properties.len(),
            total_applications: views.len(),
            pending_applications: count(ApplicationStatus::Pending),
            approved_applications: count(ApplicationStatus::Approved),
            rejected_applications: count(ApplicationStatus::Rejected),
            occupancy_rate,
        })
    }

    async fn load_view(&self, id: ApplicationId) -> Result<ApplicationView, ServiceError> {
        self.store
            .application_views(ApplicationScope::One(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found("application").into())
    }

    async fn discard(&self, stored: &[(DocumentKind, String)]) {
        for (_, url) in stored {
            let _ = release(self.blobs.as_ref(), url).await;
        }
    }
}
