//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |------------|-----------------|--------------|
//! | Database (unique violation) | `23505` | `Conflict` (message chosen by constraint name) |
//! | Database (check violation) | `23514` | `Rejected(Validation)` |
//! | anything else | any | `Backend` |
//!
//! Transitions that touch more than one row lock those rows with
//! `SELECT ... FOR UPDATE` and run the housing state machine before writing,
//! all inside one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use campusstay_core::{
    AdminId, ApplicationId, DomainError, PropertyId, PropertyImageId, StudentId,
};
use campusstay_housing::{
    Admin, Application, ApplicationStatus, CapacityLedger, Decision, DecisionOutcome,
    DeletionActor, DocumentKind, DocumentSlots, IssuedToken, Property, PropertyImage,
    Reservation, Student,
};

use super::{
    ApplicationScope, ApplicationView, CapacityEdit, Repository, StoreError, StudentEdit,
    StudentLookup, StudentSummary,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const STUDENT_COLUMNS: &str = r#"
    id, full_name, email, phone_number, student_number, campus, password_hash,
    email_verified, verification_token, verification_expires_at,
    password_reset_token, password_reset_expires_at,
    id_document_url, proof_of_registration_url, created_at
"#;

const PROPERTY_COLUMNS: &str = r#"
    id, admin_id, title, address, is_bachelor, available_units, total_units,
    space_per_student, campus_intake, created_at
"#;

const APPLICATION_COLUMNS: &str =
    "id, student_id, property_id, status, notes, funding_approved, applied_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn images_for(
        &self,
        property_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<PropertyImage>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, property_id, url, created_at
            FROM property_images
            WHERE property_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(property_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_images", e))?;

        let mut out: HashMap<Uuid, Vec<PropertyImage>> = HashMap::new();
        for row in rows {
            let property_id: Uuid = row.try_get("property_id").map_err(corrupt)?;
            out.entry(property_id).or_default().push(PropertyImage {
                id: PropertyImageId::from_uuid(row.try_get("id").map_err(corrupt)?),
                url: row.try_get("url").map_err(corrupt)?,
                created_at: row.try_get("created_at").map_err(corrupt)?,
            });
        }
        Ok(out)
    }

    async fn fetch_student(&self, key: StudentKey<'_>) -> Result<Option<Student>, StoreError> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE {} = $1",
            key.column()
        );
        let query = sqlx::query(&sql);
        let query = match key {
            StudentKey::Id(id) => query.bind(id),
            StudentKey::Email(value) | StudentKey::Number(value) => query.bind(value),
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_student", e))?;
        row.as_ref().map(student_from_row).transpose()
    }
}

#[derive(Debug, Clone, Copy)]
enum StudentKey<'a> {
    Id(Uuid),
    Email(&'a str),
    Number(&'a str),
}

impl StudentKey<'_> {
    fn column(&self) -> &'static str {
        match self {
            StudentKey::Id(_) => "id",
            StudentKey::Email(_) => "email",
            StudentKey::Number(_) => "student_number",
        }
    }
}

#[async_trait]
impl Repository for PostgresStore {
    #[instrument(skip(self, student), fields(student_id = %student.id), err)]
    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        let (verification_token, verification_expires_at) = token_columns(&student.verification);
        let (reset_token, reset_expires_at) = token_columns(&student.password_reset);

        sqlx::query(
            r#"
            INSERT INTO students (
                id, full_name, email, phone_number, student_number, campus,
                password_hash, email_verified,
                verification_token, verification_expires_at,
                password_reset_token, password_reset_expires_at,
                id_document_url, proof_of_registration_url, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(student.id.as_uuid())
        .bind(&student.full_name)
        .bind(&student.email)
        .bind(&student.phone_number)
        .bind(&student.student_number)
        .bind(student.campus.as_str())
        .bind(&student.password_hash)
        .bind(student.email_verified)
        .bind(verification_token)
        .bind(verification_expires_at)
        .bind(reset_token)
        .bind(reset_expires_at)
        .bind(student.documents.id_document_url.as_deref())
        .bind(student.documents.proof_of_registration_url.as_deref())
        .bind(student.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_student", e))?;
        Ok(())
    }

    #[instrument(skip(self, edit), err)]
    async fn edit_student(
        &self,
        lookup: StudentLookup<'_>,
        edit: StudentEdit<'_>,
    ) -> Result<Option<Student>, StoreError> {
        let mut tx = self.begin().await?;

        let key = match lookup {
            StudentLookup::Id(id) => StudentKey::Id(*id.as_uuid()),
            StudentLookup::Email(email) => StudentKey::Email(email),
        };
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE {} = $1 FOR UPDATE",
            key.column()
        );
        let query = sqlx::query(&sql);
        let query = match key {
            StudentKey::Id(id) => query.bind(id),
            StudentKey::Email(value) | StudentKey::Number(value) => query.bind(value),
        };
        let Some(row) = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_student", e))?
        else {
            return Ok(None);
        };
        let mut student = student_from_row(&row)?;

        edit(&mut student)?;

        let (verification_token, verification_expires_at) = token_columns(&student.verification);
        let (reset_token, reset_expires_at) = token_columns(&student.password_reset);

        // Document slots are only written by `attach_documents`.
        sqlx::query(
            r#"
            UPDATE students SET
                full_name = $2,
                email = $3,
                phone_number = $4,
                student_number = $5,
                campus = $6,
                password_hash = $7,
                email_verified = $8,
                verification_token = $9,
                verification_expires_at = $10,
                password_reset_token = $11,
                password_reset_expires_at = $12
            WHERE id = $1
            "#,
        )
        .bind(student.id.as_uuid())
        .bind(&student.full_name)
        .bind(&student.email)
        .bind(&student.phone_number)
        .bind(&student.student_number)
        .bind(student.campus.as_str())
        .bind(&student.password_hash)
        .bind(student.email_verified)
        .bind(verification_token)
        .bind(verification_expires_at)
        .bind(reset_token)
        .bind(reset_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_student", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(student))
    }

    async fn student_by_id(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        self.fetch_student(StudentKey::Id(*id.as_uuid())).await
    }

    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        self.fetch_student(StudentKey::Email(email)).await
    }

    async fn student_by_number(&self, number: &str) -> Result<Option<Student>, StoreError> {
        self.fetch_student(StudentKey::Number(number)).await
    }

    #[instrument(skip(self, admin), fields(admin_id = %admin.id), err)]
    async fn insert_admin(&self, admin: &Admin) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO admins (id, full_name, email, password_hash, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(admin.id.as_uuid())
        .bind(&admin.full_name)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.is_active)
        .bind(admin.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_admin", e))?;
        Ok(())
    }

    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, full_name, email, password_hash, is_active, created_at
            FROM admins
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("admin_by_email", e))?;

        row.map(|row| -> Result<Admin, StoreError> {
            Ok(Admin {
                id: AdminId::from_uuid(row.try_get("id").map_err(corrupt)?),
                full_name: row.try_get("full_name").map_err(corrupt)?,
                email: row.try_get("email").map_err(corrupt)?,
                password_hash: row.try_get("password_hash").map_err(corrupt)?,
                is_active: row.try_get("is_active").map_err(corrupt)?,
                created_at: row.try_get("created_at").map_err(corrupt)?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, property), fields(property_id = %property.id), err)]
    async fn insert_property(&self, property: &Property) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO properties (
                id, admin_id, title, address, is_bachelor, available_units,
                total_units, space_per_student, campus_intake, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(property.id.as_uuid())
        .bind(property.admin_id.as_uuid())
        .bind(&property.title)
        .bind(&property.address)
        .bind(property.is_bachelor)
        .bind(to_i32(property.capacity.available(), "available_units")?)
        .bind(to_i32(property.capacity.total(), "total_units")?)
        .bind(property.space_per_student)
        .bind(&property.campus_intake)
        .bind(property.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_property", e))?;

        insert_images(&mut tx, property).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, property), fields(property_id = %property.id), err)]
    async fn update_property(
        &self,
        property: &Property,
        capacity: CapacityEdit,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            "SELECT available_units, total_units FROM properties WHERE id = $1 FOR UPDATE",
        )
        .bind(property.id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_property", e))?
        .ok_or(DomainError::not_found("property"))?;

        let mut ledger = ledger_from_row(&row)?;
        if let CapacityEdit::SetAvailable(available) = capacity {
            ledger.set_available(available)?;
        }

        sqlx::query(
            r#"
            UPDATE properties SET
                title = $2,
                address = $3,
                is_bachelor = $4,
                space_per_student = $5,
                campus_intake = $6,
                available_units = $7
            WHERE id = $1
            "#,
        )
        .bind(property.id.as_uuid())
        .bind(&property.title)
        .bind(&property.address)
        .bind(property.is_bachelor)
        .bind(property.space_per_student)
        .bind(&property.campus_intake)
        .bind(to_i32(ledger.available(), "available_units")?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_property", e))?;

        sqlx::query("DELETE FROM property_images WHERE property_id = $1")
            .bind(property.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_images", e))?;
        insert_images(&mut tx, property).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_property(&self, id: PropertyId) -> Result<(), StoreError> {
        // Images and applications go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_property", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("property").into());
        }
        Ok(())
    }

    async fn property_by_id(&self, id: PropertyId) -> Result<Option<Property>, StoreError> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("property_by_id", e))?
        else {
            return Ok(None);
        };

        let mut property = property_from_row(&row)?;
        let mut images = self.images_for(&[*id.as_uuid()]).await?;
        property.images = images.remove(id.as_uuid()).unwrap_or_default();
        Ok(Some(property))
    }

    #[instrument(skip(self), err)]
    async fn list_properties(&self, owner: Option<AdminId>) -> Result<Vec<Property>, StoreError> {
        let rows = match owner {
            Some(admin_id) => {
                let sql = format!(
                    "SELECT {PROPERTY_COLUMNS} FROM properties WHERE admin_id = $1 \
                     ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql)
                    .bind(admin_id.as_uuid())
                    .fetch_all(&*self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {PROPERTY_COLUMNS} FROM properties ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql).fetch_all(&*self.pool).await
            }
        }
        .map_err(|e| map_sqlx_error("list_properties", e))?;

        let mut properties = rows
            .iter()
            .map(property_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = properties.iter().map(|p| *p.id.as_uuid()).collect();
        let mut images = self.images_for(&ids).await?;
        for property in &mut properties {
            property.images = images.remove(property.id.as_uuid()).unwrap_or_default();
        }
        Ok(properties)
    }

    #[instrument(
        skip(self, application),
        fields(application_id = %application.id, student_id = %application.student_id),
        err
    )]
    async fn insert_application(&self, application: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications (
                id, student_id, property_id, status, notes, funding_approved, applied_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(application.id.as_uuid())
        .bind(application.student_id.as_uuid())
        .bind(application.property_id.as_uuid())
        .bind(application.status.as_str())
        .bind(&application.notes)
        .bind(application.funding_approved)
        .bind(application.applied_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_application", e))?;
        Ok(())
    }

    async fn application_by_id(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("application_by_id", e))?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn find_application(
        &self,
        student_id: StudentId,
        property_id: PropertyId,
    ) -> Result<Option<Application>, StoreError> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE student_id = $1 AND property_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(student_id.as_uuid())
            .bind(property_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_application", e))?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn application_views(
        &self,
        scope: ApplicationScope,
    ) -> Result<Vec<ApplicationView>, StoreError> {
        let (filter, key) = match scope {
            ApplicationScope::Student(id) => ("a.student_id = $1", *id.as_uuid()),
            ApplicationScope::Admin(id) => ("p.admin_id = $1", *id.as_uuid()),
            ApplicationScope::One(id) => ("a.id = $1", *id.as_uuid()),
        };
        let sql = format!(
            r#"
            SELECT
                a.id, a.student_id, a.property_id, a.status, a.notes,
                a.funding_approved, a.applied_at,
                p.title AS property_title,
                p.address AS property_address,
                p.admin_id AS property_owner,
                s.full_name, s.email, s.phone_number, s.student_number, s.campus,
                s.id_document_url, s.proof_of_registration_url
            FROM applications a
            JOIN properties p ON p.id = a.property_id
            JOIN students s ON s.id = a.student_id
            WHERE {filter}
            ORDER BY a.applied_at DESC, a.id DESC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(key)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("application_views", e))?;

        rows.iter()
            .map(|row| -> Result<ApplicationView, StoreError> {
                let application = application_from_row(row)?;
                Ok(ApplicationView {
                    student: StudentSummary {
                        id: application.student_id,
                        full_name: row.try_get("full_name").map_err(corrupt)?,
                        email: row.try_get("email").map_err(corrupt)?,
                        phone_number: row.try_get("phone_number").map_err(corrupt)?,
                        student_number: row.try_get("student_number").map_err(corrupt)?,
                        campus: parse_column(row, "campus")?,
                        documents: documents_from_row(row)?,
                    },
                    property_title: row.try_get("property_title").map_err(corrupt)?,
                    property_address: row.try_get("property_address").map_err(corrupt)?,
                    property_owner: AdminId::from_uuid(
                        row.try_get("property_owner").map_err(corrupt)?,
                    ),
                    application,
                })
            })
            .collect()
    }

    #[instrument(skip(self, stored), fields(documents = stored.len()), err)]
    async fn attach_documents(
        &self,
        student_id: StudentId,
        application_id: ApplicationId,
        stored: &[(DocumentKind, String)],
        funding_approved: bool,
    ) -> Result<Vec<String>, StoreError> {
        let mut tx = self.begin().await?;

        let mut application = lock_application(&mut tx, application_id).await?;
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(student_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_student", e))?
            .ok_or(DomainError::not_found("student"))?;
        let mut student = student_from_row(&row)?;

        let replaced = application.attach_documents(&mut student, stored, funding_approved)?;

        sqlx::query(
            r#"
            UPDATE students SET id_document_url = $2, proof_of_registration_url = $3
            WHERE id = $1
            "#,
        )
        .bind(student.id.as_uuid())
        .bind(student.documents.id_document_url.as_deref())
        .bind(student.documents.proof_of_registration_url.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_documents", e))?;

        sqlx::query("UPDATE applications SET funding_approved = $2 WHERE id = $1")
            .bind(application.id.as_uuid())
            .bind(application.funding_approved)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_funding", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(replaced)
    }

    #[instrument(skip(self), err)]
    async fn decide_application(
        &self,
        application_id: ApplicationId,
        admin_id: AdminId,
        decision: Decision,
    ) -> Result<DecisionOutcome, StoreError> {
        let mut tx = self.begin().await?;

        let mut application = lock_application(&mut tx, application_id).await?;
        let mut property = lock_property(&mut tx, application.property_id)
            .await?
            .ok_or(DomainError::not_found("application"))?;

        let outcome = application.decide(&mut property, admin_id, decision)?;

        sqlx::query("UPDATE applications SET status = $2 WHERE id = $1")
            .bind(application.id.as_uuid())
            .bind(application.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_status", e))?;

        if outcome.reservation == Some(Reservation::Reserved) {
            sqlx::query("UPDATE properties SET available_units = $2 WHERE id = $1")
                .bind(property.id.as_uuid())
                .bind(to_i32(property.capacity.available(), "available_units")?)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("reserve_unit", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(outcome)
    }

    #[instrument(skip(self), err)]
    async fn delete_application(
        &self,
        application_id: ApplicationId,
        actor: DeletionActor,
    ) -> Result<Application, StoreError> {
        let mut tx = self.begin().await?;

        let application = lock_application(&mut tx, application_id).await?;
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT admin_id FROM properties WHERE id = $1")
            .bind(application.property_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_owner", e))?
            .ok_or(DomainError::not_found("application"))?;

        application.ensure_deletable_by(actor, AdminId::from_uuid(owner))?;

        sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(application.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_application", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(application)
    }
}

async fn insert_images(
    tx: &mut Transaction<'static, Postgres>,
    property: &Property,
) -> Result<(), StoreError> {
    for (position, image) in property.images.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO property_images (id, property_id, url, position, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(image.id.as_uuid())
        .bind(property.id.as_uuid())
        .bind(&image.url)
        .bind(position as i32)
        .bind(image.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_image", e))?;
    }
    Ok(())
}

async fn lock_application(
    tx: &mut Transaction<'static, Postgres>,
    id: ApplicationId,
) -> Result<Application, StoreError> {
    let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_application", e))?
        .ok_or(DomainError::not_found("application"))?;
    application_from_row(&row)
}

/// Loads the property row without its images.
async fn lock_property(
    tx: &mut Transaction<'static, Postgres>,
    id: PropertyId,
) -> Result<Option<Property>, StoreError> {
    let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_property", e))?;
    row.as_ref().map(property_from_row).transpose()
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::Conflict(conflict_message(db_err.constraint())),
            Some("23514") => {
                return StoreError::Rejected(DomainError::validation(format!(
                    "constraint {} violated",
                    db_err.constraint().unwrap_or("check")
                )));
            }
            _ => {}
        }
    }
    StoreError::backend(operation, err.to_string())
}

fn conflict_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("students_email_key") => "email already registered",
        Some("students_student_number_key") => "student number already registered",
        Some("admins_email_key") => "admin email already registered",
        Some("applications_student_property_key") => "you have already applied to this property",
        _ => "record already exists",
    }
    .to_string()
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(corrupt)?;
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn to_i32(value: u32, field: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| DomainError::validation(format!("{field} is too large")).into())
}

fn to_u32(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let raw: i32 = row.try_get(column).map_err(corrupt)?;
    u32::try_from(raw).map_err(|_| StoreError::Corrupt(format!("{column} is negative")))
}

fn token_columns(token: &Option<IssuedToken>) -> (Option<&str>, Option<DateTime<Utc>>) {
    match token {
        Some(t) => (Some(t.value.as_str()), Some(t.expires_at)),
        None => (None, None),
    }
}

fn token_from_row(
    row: &PgRow,
    value_column: &str,
    expiry_column: &str,
) -> Result<Option<IssuedToken>, StoreError> {
    let value: Option<String> = row.try_get(value_column).map_err(corrupt)?;
    let expires_at: Option<DateTime<Utc>> = row.try_get(expiry_column).map_err(corrupt)?;
    Ok(match (value, expires_at) {
        (Some(value), Some(expires_at)) => Some(IssuedToken { value, expires_at }),
        _ => None,
    })
}

fn documents_from_row(row: &PgRow) -> Result<DocumentSlots, StoreError> {
    Ok(DocumentSlots {
        id_document_url: row.try_get("id_document_url").map_err(corrupt)?,
        proof_of_registration_url: row.try_get("proof_of_registration_url").map_err(corrupt)?,
    })
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    Ok(Student {
        id: StudentId::from_uuid(row.try_get("id").map_err(corrupt)?),
        full_name: row.try_get("full_name").map_err(corrupt)?,
        email: row.try_get("email").map_err(corrupt)?,
        phone_number: row.try_get("phone_number").map_err(corrupt)?,
        student_number: row.try_get("student_number").map_err(corrupt)?,
        campus: parse_column(row, "campus")?,
        password_hash: row.try_get("password_hash").map_err(corrupt)?,
        email_verified: row.try_get("email_verified").map_err(corrupt)?,
        verification: token_from_row(row, "verification_token", "verification_expires_at")?,
        password_reset: token_from_row(row, "password_reset_token", "password_reset_expires_at")?,
        documents: documents_from_row(row)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
    })
}

fn ledger_from_row(row: &PgRow) -> Result<CapacityLedger, StoreError> {
    CapacityLedger::restore(
        to_u32(row, "available_units")?,
        to_u32(row, "total_units")?,
    )
    .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn property_from_row(row: &PgRow) -> Result<Property, StoreError> {
    Ok(Property {
        id: PropertyId::from_uuid(row.try_get("id").map_err(corrupt)?),
        admin_id: AdminId::from_uuid(row.try_get("admin_id").map_err(corrupt)?),
        title: row.try_get("title").map_err(corrupt)?,
        address: row.try_get("address").map_err(corrupt)?,
        is_bachelor: row.try_get("is_bachelor").map_err(corrupt)?,
        capacity: ledger_from_row(row)?,
        space_per_student: row.try_get("space_per_student").map_err(corrupt)?,
        campus_intake: row.try_get("campus_intake").map_err(corrupt)?,
        images: Vec::new(),
        created_at: row.try_get("created_at").map_err(corrupt)?,
    })
}

fn application_from_row(row: &PgRow) -> Result<Application, StoreError> {
    Ok(Application {
        id: ApplicationId::from_uuid(row.try_get("id").map_err(corrupt)?),
        student_id: StudentId::from_uuid(row.try_get("student_id").map_err(corrupt)?),
        property_id: PropertyId::from_uuid(row.try_get("property_id").map_err(corrupt)?),
        status: parse_column::<ApplicationStatus>(row, "status")?,
        notes: row.try_get("notes").map_err(corrupt)?,
        funding_approved: row.try_get("funding_approved").map_err(corrupt)?,
        applied_at: row.try_get("applied_at").map_err(corrupt)?,
    })
}
