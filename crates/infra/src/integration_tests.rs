//! Service-level tests for the full stack over in-memory adapters.
//!
//! Covers the application lifecycle end to end: registration and
//! verification, capacity, decisions, deletion gates, document
//! replacement and the account recovery flows.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use tokio::sync::Notify;

    use campusstay_core::{AdminId, ApplicationId, PropertyId, StudentId};
    use campusstay_housing::{
        Admin, Application, ApplicationStatus, Decision, DecisionOutcome, DeletionActor,
        DocumentKind, DocumentUpload, NewProperty, NewStudent, Property, Student,
    };

    use crate::blob::InMemoryBlobStore;
    use crate::config::{AppConfig, BootstrapAdmin};
    use crate::mail::{OutboundEmail, RecordingMailer};
    use crate::services::{ImageUpload, ProfileUpdate, PropertyChanges, Services, VerifyOutcome};
    use crate::store::{
        ApplicationScope, ApplicationView, CapacityEdit, InMemoryStore, Repository, StoreError,
        StudentEdit, StudentLookup,
    };

    struct Harness {
        services: Services,
        store: Arc<InMemoryStore>,
        blobs: Arc<InMemoryBlobStore>,
        mail: Arc<RecordingMailer>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        build_harness(store.clone(), store)
    }

    /// Services run against `repository`; assertions read `store` directly.
    fn build_harness(repository: Arc<dyn Repository>, store: Arc<InMemoryStore>) -> Harness {
        let config = AppConfig::from_lookup(|key| match key {
            "SECRET_KEY" => Some("integration-secret".into()),
            "BCRYPT_COST" => Some("4".into()),
            "FRONTEND_URL" => Some("http://front.test".into()),
            _ => None,
        })
        .unwrap();
        let blobs = Arc::new(InMemoryBlobStore::new("http://blobs.test"));
        let mail = Arc::new(RecordingMailer::new());
        let services = Services::new(&config, repository, blobs.clone(), mail.clone());
        Harness {
            services,
            store,
            blobs,
            mail,
        }
    }

    /// Delegating store that can park the next student access until
    /// released. Reads park after loading, edits park before locking.
    struct GatedStore {
        inner: Arc<InMemoryStore>,
        armed: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                armed: AtomicBool::new(false),
                parked: Notify::new(),
                release: Notify::new(),
            }
        }

        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }

        async fn gate(&self) {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
        }
    }

    #[async_trait]
    impl Repository for GatedStore {
        async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
            self.inner.insert_student(student).await
        }

        async fn edit_student(
            &self,
            lookup: StudentLookup<'_>,
            edit: StudentEdit<'_>,
        ) -> Result<Option<Student>, StoreError> {
            self.gate().await;
            self.inner.edit_student(lookup, edit).await
        }

        async fn student_by_id(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
            let found = self.inner.student_by_id(id).await;
            self.gate().await;
            found
        }

        async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
            let found = self.inner.student_by_email(email).await;
            self.gate().await;
            found
        }

        async fn student_by_number(&self, number: &str) -> Result<Option<Student>, StoreError> {
            self.inner.student_by_number(number).await
        }

        async fn insert_admin(&self, admin: &Admin) -> Result<(), StoreError> {
            self.inner.insert_admin(admin).await
        }

        async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError> {
            self.inner.admin_by_email(email).await
        }

        async fn insert_property(&self, property: &Property) -> Result<(), StoreError> {
            self.inner.insert_property(property).await
        }

        async fn update_property(
            &self,
            property: &Property,
            capacity: CapacityEdit,
        ) -> Result<(), StoreError> {
            self.inner.update_property(property, capacity).await
        }

        async fn delete_property(&self, id: PropertyId) -> Result<(), StoreError> {
            self.inner.delete_property(id).await
        }

        async fn property_by_id(&self, id: PropertyId) -> Result<Option<Property>, StoreError> {
            self.inner.property_by_id(id).await
        }

        async fn list_properties(
            &self,
            owner: Option<AdminId>,
        ) -> Result<Vec<Property>, StoreError> {
            self.inner.list_properties(owner).await
        }

        async fn insert_application(&self, application: &Application) -> Result<(), StoreError> {
            self.inner.insert_application(application).await
        }

        async fn application_by_id(
            &self,
            id: ApplicationId,
        ) -> Result<Option<Application>, StoreError> {
            self.inner.application_by_id(id).await
        }

        async fn find_application(
            &self,
            student_id: StudentId,
            property_id: PropertyId,
        ) -> Result<Option<Application>, StoreError> {
            self.inner.find_application(student_id, property_id).await
        }

        async fn application_views(
            &self,
            scope: ApplicationScope,
        ) -> Result<Vec<ApplicationView>, StoreError> {
            self.inner.application_views(scope).await
        }

        async fn attach_documents(
            &self,
            student_id: StudentId,
            application_id: ApplicationId,
            stored: &[(DocumentKind, String)],
            funding_approved: bool,
        ) -> Result<Vec<String>, StoreError> {
            self.inner
                .attach_documents(student_id, application_id, stored, funding_approved)
                .await
        }

        async fn decide_application(
            &self,
            application_id: ApplicationId,
            admin_id: AdminId,
            decision: Decision,
        ) -> Result<DecisionOutcome, StoreError> {
            self.inner
                .decide_application(application_id, admin_id, decision)
                .await
        }

        async fn delete_application(
            &self,
            application_id: ApplicationId,
            actor: DeletionActor,
        ) -> Result<Application, StoreError> {
            self.inner.delete_application(application_id, actor).await
        }
    }

    fn gated_harness() -> (Harness, Arc<GatedStore>) {
        let store = Arc::new(InMemoryStore::new());
        let gated = Arc::new(GatedStore::new(store.clone()));
        (build_harness(gated.clone(), store), gated)
    }

    fn new_student(email: &str, number: &str) -> NewStudent {
        NewStudent {
            full_name: "Lerato Dlamini".into(),
            email: email.into(),
            phone_number: "0711234567".into(),
            student_number: number.into(),
            campus: "Arcadia Campus".into(),
            password: "secret1".into(),
        }
    }

    fn listing(units: u32) -> NewProperty {
        NewProperty {
            title: "Hatfield Lofts".into(),
            address: "12 Burnett St".into(),
            is_bachelor: true,
            available_units: units,
            space_per_student: 18.5,
            campus_intake: "Arcadia Campus, Pretoria Campus".into(),
        }
    }

    fn image() -> ImageUpload {
        ImageUpload {
            file_name: "front.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        }
    }

    fn pdf(kind: DocumentKind) -> DocumentUpload {
        DocumentUpload {
            kind,
            file_name: format!("{}.pdf", kind.field_name()),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    async fn wait_for_mail(mail: &RecordingMailer, to: &str, count: usize) -> Vec<OutboundEmail> {
        for _ in 0..100 {
            let sent = mail.sent_to(to);
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        mail.sent_to(to)
    }

    impl Harness {
        async fn admin(&self, email: &str) -> Admin {
            self.services
                .accounts
                .bootstrap_admin(&BootstrapAdmin {
                    email: email.into(),
                    password: "admin-pass".into(),
                    full_name: "Housing Office".into(),
                })
                .await
                .unwrap()
        }

        async fn property(&self, admin: &Admin, units: u32) -> PropertyId {
            self.services
                .properties
                .create(admin.id, listing(units), vec![image()])
                .await
                .unwrap()
                .id
        }

        async fn unverified(&self, email: &str, number: &str) -> Student {
            self.services
                .accounts
                .register(new_student(email, number))
                .await
                .unwrap()
        }

        async fn verified(&self, email: &str, number: &str) -> Student {
            let student = self.unverified(email, number).await;
            let token = student.verification.clone().unwrap().value;
            let outcome = self.services.accounts.verify_email(&token).await.unwrap();
            assert_eq!(outcome, VerifyOutcome::Verified);
            self.reload(student.id).await
        }

        async fn reload(&self, id: StudentId) -> Student {
            self.store.student_by_id(id).await.unwrap().unwrap()
        }

        async fn available(&self, id: PropertyId) -> u32 {
            self.store
                .property_by_id(id)
                .await
                .unwrap()
                .unwrap()
                .capacity
                .available()
        }
    }

    #[tokio::test]
    async fn registration_requires_nine_digit_student_number() {
        let h = harness();
        let err = h
            .services
            .accounts
            .register(new_student("a@uni.ac.za", "12345678"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let student = h.unverified("a@uni.ac.za", "123456789").await;
        assert!(!student.email_verified);
        let token = student.verification.unwrap();
        let ttl = token.expires_at - Utc::now();
        assert!(ttl > chrono::Duration::hours(23) && ttl <= chrono::Duration::hours(24));

        let sent = wait_for_mail(&h.mail, "a@uni.ac.za", 1).await;
        assert!(sent[0].html_body.contains("http://front.test/verify-email?token="));
    }

    #[tokio::test]
    async fn duplicate_email_or_student_number_conflicts() {
        let h = harness();
        h.unverified("a@uni.ac.za", "123456789").await;

        let err = h
            .services
            .accounts
            .register(new_student("A@Uni.ac.za", "987654321"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let err = h
            .services
            .accounts
            .register(new_student("b@uni.ac.za", "123456789"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn unverified_student_cannot_apply_until_verified() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 3).await;

        let student = h.unverified("a@uni.ac.za", "123456789").await;
        let err = h
            .services
            .applications
            .create(&student, property, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unverified");

        let token = student.verification.clone().unwrap().value;
        h.services.accounts.verify_email(&token).await.unwrap();
        assert_eq!(
            h.services.accounts.verify_email(&token).await.unwrap(),
            VerifyOutcome::AlreadyVerified
        );

        let student = h.reload(student.id).await;
        let view = h
            .services
            .applications
            .create(&student, property, "  ground floor please ")
            .await
            .unwrap();
        assert_eq!(view.application.status, ApplicationStatus::Pending);
        assert_eq!(view.application.notes, "ground floor please");
        assert!(!view.application.funding_approved);
    }

    #[tokio::test]
    async fn create_reports_missing_property_and_exhausted_capacity() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let full = h.property(&admin, 0).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;

        let err = h
            .services
            .applications
            .create(&student, PropertyId::new(), "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = h
            .services
            .applications
            .create(&student, full, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "exhausted");
    }

    #[tokio::test]
    async fn approval_consumes_the_last_unit() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 1).await;
        let first = h.verified("a@uni.ac.za", "111111111").await;
        let second = h.verified("b@uni.ac.za", "222222222").await;
        let third = h.verified("c@uni.ac.za", "333333333").await;

        let a = h.services.applications.create(&first, property, "").await.unwrap();
        let b = h.services.applications.create(&second, property, "").await.unwrap();

        h.services
            .applications
            .decide(admin.id, a.application.id, Decision::Approve)
            .await
            .unwrap();
        assert_eq!(h.available(property).await, 0);

        let err = h
            .services
            .applications
            .create(&third, property, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "exhausted");

        // The second pending application was admitted before capacity ran out.
        let view = h
            .services
            .applications
            .decide(admin.id, b.application.id, Decision::Approve)
            .await
            .unwrap();
        assert_eq!(view.application.status, ApplicationStatus::Approved);
        assert_eq!(h.available(property).await, 0);
    }

    #[tokio::test]
    async fn deciding_twice_is_rejected_without_double_decrement() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();
        let id = app.application.id;

        h.services
            .applications
            .decide(admin.id, id, Decision::Approve)
            .await
            .unwrap();
        let err = h
            .services
            .applications
            .decide(admin.id, id, Decision::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        assert_eq!(h.available(property).await, 1);

        let sent = wait_for_mail(&h.mail, "a@uni.ac.za", 3).await;
        assert!(sent.iter().any(|m| m.subject.starts_with("Application Approved")));
    }

    #[tokio::test]
    async fn rejection_leaves_capacity_alone() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();

        let view = h
            .services
            .applications
            .decide(admin.id, app.application.id, Decision::Reject)
            .await
            .unwrap();
        assert_eq!(view.application.status, ApplicationStatus::Rejected);
        assert_eq!(h.available(property).await, 2);

        let sent = wait_for_mail(&h.mail, "a@uni.ac.za", 3).await;
        assert!(sent.iter().any(|m| m.subject.starts_with("Application Update")));
    }

    #[tokio::test]
    async fn only_the_owning_admin_can_decide() {
        let h = harness();
        let owner = h.admin("office@uni.ac.za").await;
        let other = h.admin("other@uni.ac.za").await;
        let property = h.property(&owner, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();

        let err = h
            .services
            .applications
            .decide(other.id, app.application.id, Decision::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(h.available(property).await, 2);
        assert!(h.services.applications.admin_list(other.id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_create_conflicts_until_the_first_is_withdrawn() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;

        let first = h.services.applications.create(&student, property, "").await.unwrap();
        let err = h
            .services
            .applications
            .create(&student, property, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        h.services
            .applications
            .delete_as_student(student.id, first.application.id)
            .await
            .unwrap();
        h.services
            .applications
            .create(&student, property, "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deletion_gates_are_inverse() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();
        let id = app.application.id;

        let err = h
            .services
            .applications
            .delete_as_admin(admin.id, id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        h.services
            .applications
            .decide(admin.id, id, Decision::Approve)
            .await
            .unwrap();
        let err = h
            .services
            .applications
            .delete_as_student(student.id, id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        h.services
            .applications
            .delete_as_admin(admin.id, id)
            .await
            .unwrap();
        assert!(h.services.applications.list_mine(student.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reuploading_a_document_keeps_one_live_blob() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();
        let id = app.application.id;
        let images = h.blobs.len();

        let first = h
            .services
            .applications
            .attach_documents(&student, id, vec![pdf(DocumentKind::IdCopy)], false)
            .await
            .unwrap();
        let first_url = first.student.documents.get(DocumentKind::IdCopy).unwrap().to_string();

        let second = h
            .services
            .applications
            .attach_documents(&student, id, vec![pdf(DocumentKind::IdCopy)], true)
            .await
            .unwrap();
        let second_url = second.student.documents.get(DocumentKind::IdCopy).unwrap().to_string();

        assert_ne!(first_url, second_url);
        assert!(!h.blobs.contains_url(&first_url));
        assert!(h.blobs.contains_url(&second_url));
        assert_eq!(h.blobs.len(), images + 1);
        assert!(second.application.funding_approved);
    }

    #[tokio::test]
    async fn documents_are_shared_across_applications() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let p1 = h.property(&admin, 2).await;
        let p2 = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let a1 = h.services.applications.create(&student, p1, "").await.unwrap();
        let a2 = h.services.applications.create(&student, p2, "").await.unwrap();

        h.services
            .applications
            .attach_documents(
                &student,
                a1.application.id,
                vec![
                    pdf(DocumentKind::IdCopy),
                    pdf(DocumentKind::ProofOfRegistration),
                ],
                false,
            )
            .await
            .unwrap();

        let other = h
            .services
            .applications
            .get_mine(student.id, a2.application.id)
            .await
            .unwrap();
        assert!(other.student.documents.get(DocumentKind::IdCopy).is_some());
        assert!(other.student.documents.get(DocumentKind::ProofOfRegistration).is_some());
    }

    #[tokio::test]
    async fn invalid_documents_abort_before_any_write() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();
        let before = h.blobs.len();

        let mut bad = pdf(DocumentKind::ProofOfRegistration);
        bad.content_type = "image/png".into();
        let err = h
            .services
            .applications
            .attach_documents(
                &student,
                app.application.id,
                vec![pdf(DocumentKind::IdCopy), bad],
                true,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_document");
        assert_eq!(h.blobs.len(), before);

        let view = h
            .services
            .applications
            .get_mine(student.id, app.application.id)
            .await
            .unwrap();
        assert!(!view.application.funding_approved);
    }

    #[tokio::test]
    async fn failed_blob_write_leaves_the_record_untouched() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();

        h.blobs.fail_puts(true);
        let err = h
            .services
            .applications
            .attach_documents(&student, app.application.id, vec![pdf(DocumentKind::IdCopy)], true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");

        let reloaded = h.reload(student.id).await;
        assert!(reloaded.documents.get(DocumentKind::IdCopy).is_none());
    }

    #[tokio::test]
    async fn failed_old_blob_delete_is_not_fatal() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();
        let id = app.application.id;

        h.services
            .applications
            .attach_documents(&student, id, vec![pdf(DocumentKind::IdCopy)], false)
            .await
            .unwrap();
        h.blobs.fail_deletes(true);
        let view = h
            .services
            .applications
            .attach_documents(&student, id, vec![pdf(DocumentKind::IdCopy)], false)
            .await
            .unwrap();
        let url = view.student.documents.get(DocumentKind::IdCopy).unwrap();
        assert!(h.blobs.contains_url(url));
    }

    #[tokio::test]
    async fn documents_cannot_change_after_a_decision() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        let intruder = h.verified("b@uni.ac.za", "987654321").await;
        let app = h.services.applications.create(&student, property, "").await.unwrap();
        let id = app.application.id;

        let err = h
            .services
            .applications
            .attach_documents(&intruder, id, vec![pdf(DocumentKind::IdCopy)], true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        h.services
            .applications
            .decide(admin.id, id, Decision::Reject)
            .await
            .unwrap();
        let err = h
            .services
            .applications
            .attach_documents(&student, id, vec![], true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_create() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let property = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;

        h.mail.set_failing(true);
        let view = h.services.applications.create(&student, property, "").await.unwrap();
        assert_eq!(view.application.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn password_reset_round_trip() {
        let h = harness();
        h.verified("a@uni.ac.za", "123456789").await;

        h.services.accounts.forgot_password("nobody@uni.ac.za").await.unwrap();
        h.services.accounts.forgot_password("A@uni.ac.za").await.unwrap();
        let student = h.store.student_by_email("a@uni.ac.za").await.unwrap().unwrap();
        let token = student.password_reset.unwrap().value;

        let err = h
            .services
            .accounts
            .reset_password(&token, "short")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        h.services.accounts.reset_password(&token, "new-secret").await.unwrap();
        let err = h
            .services
            .accounts
            .reset_password(&token, "another-secret")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_token");

        let err = h
            .services
            .accounts
            .login("a@uni.ac.za", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "bad_credentials");
        h.services.accounts.login("a@uni.ac.za", "new-secret").await.unwrap();
    }

    #[tokio::test]
    async fn reset_with_a_superseded_token_fails_even_when_interleaved() {
        let (h, gated) = gated_harness();
        let student = h.verified("a@uni.ac.za", "123456789").await;
        h.services.accounts.forgot_password("a@uni.ac.za").await.unwrap();
        let first = h.reload(student.id).await.password_reset.unwrap().value;

        gated.arm();
        let accounts = h.services.accounts.clone();
        let stale = first.clone();
        let pending =
            tokio::spawn(async move { accounts.reset_password(&stale, "stale-secret").await });
        gated.parked.notified().await;

        // A newer link is issued while the first reset is in flight.
        h.services.accounts.forgot_password("a@uni.ac.za").await.unwrap();
        let second = h.reload(student.id).await.password_reset.unwrap().value;
        assert_ne!(first, second);

        gated.release.notify_one();
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "invalid_token");

        let stored = h.reload(student.id).await.password_reset.map(|t| t.value);
        assert_eq!(stored.as_deref(), Some(second.as_str()));
        h.services.accounts.reset_password(&second, "fresh-secret").await.unwrap();
        h.services.accounts.login("a@uni.ac.za", "fresh-secret").await.unwrap();
    }

    #[tokio::test]
    async fn verification_does_not_drop_a_concurrent_reset_token() {
        let (h, gated) = gated_harness();
        let student = h.unverified("a@uni.ac.za", "123456789").await;
        let token = student.verification.clone().unwrap().value;

        gated.arm();
        let accounts = h.services.accounts.clone();
        let pending = tokio::spawn(async move { accounts.verify_email(&token).await });
        gated.parked.notified().await;

        h.services.accounts.forgot_password("a@uni.ac.za").await.unwrap();
        gated.release.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), VerifyOutcome::Verified);

        let stored = h.reload(student.id).await;
        assert!(stored.email_verified);
        let reset = stored.password_reset.unwrap().value;
        h.services.accounts.reset_password(&reset, "fresh-secret").await.unwrap();
    }

    #[tokio::test]
    async fn verification_token_cannot_reset_a_password() {
        let h = harness();
        let student = h.unverified("a@uni.ac.za", "123456789").await;
        let token = student.verification.unwrap().value;
        let err = h
            .services
            .accounts
            .reset_password(&token, "new-secret")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "wrong_purpose");
    }

    #[tokio::test]
    async fn resend_invalidates_the_previous_verification_token() {
        let h = harness();
        let student = h.unverified("a@uni.ac.za", "123456789").await;
        let old = student.verification.unwrap().value;

        h.services.accounts.resend_verification("a@uni.ac.za").await.unwrap();
        let err = h.services.accounts.verify_email(&old).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_token");

        let fresh = h.reload(student.id).await.verification.unwrap().value;
        h.services.accounts.verify_email(&fresh).await.unwrap();
    }

    #[tokio::test]
    async fn login_hides_which_part_was_wrong() {
        let h = harness();
        h.verified("a@uni.ac.za", "123456789").await;
        h.unverified("b@uni.ac.za", "987654321").await;

        let unknown = h.services.accounts.login("x@uni.ac.za", "secret1").await.unwrap_err();
        let wrong = h.services.accounts.login("a@uni.ac.za", "wrong-pass").await.unwrap_err();
        assert_eq!(unknown.kind(), "bad_credentials");
        assert_eq!(unknown.to_string(), wrong.to_string());

        let err = h.services.accounts.login("b@uni.ac.za", "secret1").await.unwrap_err();
        assert_eq!(err.kind(), "email_not_verified");

        let session = h.services.accounts.login("A@UNI.ac.za", "secret1").await.unwrap();
        let principal = h.services.resolver.resolve(&session.token.value).await.unwrap();
        assert!(principal.require_student().is_ok());
    }

    #[tokio::test]
    async fn profile_update_checks_current_password_and_number_uniqueness() {
        let h = harness();
        let student = h.verified("a@uni.ac.za", "123456789").await;
        h.verified("b@uni.ac.za", "987654321").await;

        let err = h
            .services
            .accounts
            .update_profile(
                student.id,
                ProfileUpdate {
                    student_number: Some("987654321".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let err = h
            .services
            .accounts
            .update_profile(
                student.id,
                ProfileUpdate {
                    current_password: Some("not-it".into()),
                    new_password: Some("changed1".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let updated = h
            .services
            .accounts
            .update_profile(
                student.id,
                ProfileUpdate {
                    phone_number: Some("0829999999".into()),
                    current_password: Some("secret1".into()),
                    new_password: Some("changed1".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone_number, "0829999999");
        h.services.accounts.login("a@uni.ac.za", "changed1").await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_admin_is_idempotent() {
        let h = harness();
        let first = h.admin("office@uni.ac.za").await;
        let again = h.admin("Office@uni.ac.za").await;
        assert_eq!(first.id, again.id);

        let session = h.services.accounts.login("office@uni.ac.za", "admin-pass").await.unwrap();
        assert!(session.principal.require_admin().is_ok());
    }

    #[tokio::test]
    async fn property_updates_respect_image_and_capacity_bounds() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let other = h.admin("other@uni.ac.za").await;
        let id = h.property(&admin, 3).await;
        let original = h.services.properties.get_public(id).await.unwrap();

        let err = h
            .services
            .properties
            .update(
                admin.id,
                id,
                PropertyChanges {
                    available_units: Some(4),
                    ..PropertyChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = h
            .services
            .properties
            .update(
                admin.id,
                id,
                PropertyChanges {
                    new_images: vec![image(); 5],
                    ..PropertyChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = h
            .services
            .properties
            .update(other.id, id, PropertyChanges::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let old_url = original.images[0].url.clone();
        let updated = h
            .services
            .properties
            .update(
                admin.id,
                id,
                PropertyChanges {
                    title: Some("Hatfield Lofts II".into()),
                    available_units: Some(1),
                    remove_images: vec![old_url.clone()],
                    new_images: vec![image(), image()],
                    ..PropertyChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Hatfield Lofts II");
        assert_eq!(updated.capacity.available(), 1);
        assert_eq!(updated.capacity.total(), 3);
        assert_eq!(updated.images.len(), 2);
        assert!(!h.blobs.contains_url(&old_url));
    }

    #[tokio::test]
    async fn property_delete_cascades_to_applications_and_images() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let id = h.property(&admin, 2).await;
        let student = h.verified("a@uni.ac.za", "123456789").await;
        h.services.applications.create(&student, id, "").await.unwrap();

        h.services.properties.delete(admin.id, id).await.unwrap();
        assert!(h.blobs.is_empty());
        assert!(h.services.applications.list_mine(student.id).await.unwrap().is_empty());
        let err = h.services.properties.get_public(id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn recommendations_follow_campus_intake() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let arcadia = h.property(&admin, 2).await;
        let mut elsewhere = listing(2);
        elsewhere.campus_intake = "Soshanguve North".into();
        h.services
            .properties
            .create(admin.id, elsewhere, vec![image()])
            .await
            .unwrap();

        let picks = h
            .services
            .properties
            .recommended_for(campusstay_housing::Campus::Arcadia)
            .await
            .unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].id, arcadia);
    }

    #[tokio::test]
    async fn property_create_requires_images() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let err = h
            .services
            .properties
            .create(admin.id, listing(2), vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let mut bad = image();
        bad.content_type = "application/pdf".into();
        let err = h
            .services
            .properties
            .create(admin.id, listing(2), vec![image(), bad])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn stats_summarise_the_admins_properties() {
        let h = harness();
        let admin = h.admin("office@uni.ac.za").await;
        let p1 = h.property(&admin, 3).await;
        h.property(&admin, 0).await;
        let a = h.verified("a@uni.ac.za", "111111111").await;
        let b = h.verified("b@uni.ac.za", "222222222").await;

        let app = h.services.applications.create(&a, p1, "").await.unwrap();
        h.services.applications.create(&b, p1, "").await.unwrap();
        h.services
            .applications
            .decide(admin.id, app.application.id, Decision::Approve)
            .await
            .unwrap();

        let stats = h.services.applications.stats(admin.id).await.unwrap();
        assert_eq!(stats.total_properties, 2);
        assert_eq!(stats.total_applications, 2);
        assert_eq!(stats.pending_applications, 1);
        assert_eq!(stats.approved_applications, 1);
        assert_eq!(stats.rejected_applications, 0);
        assert_eq!(stats.occupancy_rate, 33.33);

        let approved = h
            .services
            .applications
            .admin_list(admin.id, Some(ApplicationStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Create(usize),
        Approve(usize),
        Reject(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..4).prop_map(Op::Create),
            (0usize..4).prop_map(Op::Approve),
            (0usize..4).prop_map(Op::Reject),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn capacity_stays_within_bounds(total in 0u32..4, ops in prop::collection::vec(op(), 1..16)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let h = harness();
                let admin = h.admin("office@uni.ac.za").await;
                let property = h.property(&admin, total).await;
                let mut students = Vec::new();
                for i in 0..4 {
                    students.push(
                        h.verified(&format!("s{i}@uni.ac.za"), &format!("10000000{i}")).await,
                    );
                }

                let mut approved = 0u32;
                for op in ops {
                    match op {
                        Op::Create(i) => {
                            let _ = h.services.applications.create(&students[i], property, "").await;
                        }
                        Op::Approve(i) | Op::Reject(i) => {
                            let Some(app) = h
                                .store
                                .find_application(students[i].id, property)
                                .await
                                .unwrap()
                            else {
                                continue;
                            };
                            let decision = match op {
                                Op::Approve(_) => Decision::Approve,
                                _ => Decision::Reject,
                            };
                            let decided = h
                                .services
                                .applications
                                .decide(admin.id, app.id, decision)
                                .await
                                .is_ok();
                            if decided && decision == Decision::Approve {
                                approved += 1;
                            }
                        }
                    }

                    let available = h.available(property).await;
                    assert!(available <= total);
                    assert_eq!(total - available, approved.min(total));
                }
            });
        }
    }
}
