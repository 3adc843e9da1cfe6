//! Student document slots and upload validation.

use serde::{Deserialize, Serialize};

use campusstay_core::{DomainError, DomainResult, StudentId};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// The two document kinds a student keeps on file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    IdCopy,
    ProofOfRegistration,
}

impl DocumentKind {
    /// Multipart field name the document arrives under.
    pub fn field_name(&self) -> &'static str {
        match self {
            DocumentKind::IdCopy => "id_copy",
            DocumentKind::ProofOfRegistration => "proof_of_registration",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::IdCopy => "ID copy",
            DocumentKind::ProofOfRegistration => "Proof of registration",
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            DocumentKind::IdCopy => "id",
            DocumentKind::ProofOfRegistration => "por",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "id_copy" => Some(DocumentKind::IdCopy),
            "proof_of_registration" => Some(DocumentKind::ProofOfRegistration),
            _ => None,
        }
    }

    /// Blob key for a fresh upload of this kind. `nonce` keeps successive
    /// uploads from overwriting each other.
    pub fn blob_key(&self, student_id: StudentId, nonce: &str) -> String {
        format!("documents/{}/{}_{}.pdf", student_id, self.key_prefix(), nonce)
    }
}

/// Current document URLs held on a student record.
///
/// Shared by every application of that student: replacing a slot is visible
/// through all of them at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSlots {
    pub id_document_url: Option<String>,
    pub proof_of_registration_url: Option<String>,
}

impl DocumentSlots {
    pub fn get(&self, kind: DocumentKind) -> Option<&str> {
        match kind {
            DocumentKind::IdCopy => self.id_document_url.as_deref(),
            DocumentKind::ProofOfRegistration => self.proof_of_registration_url.as_deref(),
        }
    }

    /// Point the slot at `url`, returning the previous URL (if any).
    pub fn replace(&mut self, kind: DocumentKind, url: String) -> Option<String> {
        let slot = match kind {
            DocumentKind::IdCopy => &mut self.id_document_url,
            DocumentKind::ProofOfRegistration => &mut self.proof_of_registration_url,
        };
        slot.replace(url)
    }
}

/// A document received from a student, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub kind: DocumentKind,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn validate(&self) -> DomainResult<()> {
        let content_type = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if !content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
            return Err(DomainError::invalid_document(format!(
                "{} must be a PDF file",
                self.kind.label()
            )));
        }
        if self.bytes.is_empty() {
            return Err(DomainError::invalid_document(format!(
                "{} is empty",
                self.kind.label()
            )));
        }
        Ok(())
    }
}

/// Validate a whole batch before any of it is stored.
///
/// A batch may carry at most one document per kind.
pub fn validate_batch(uploads: &[DocumentUpload]) -> DomainResult<()> {
    for (idx, upload) in uploads.iter().enumerate() {
        upload.validate()?;
        if uploads[..idx].iter().any(|u| u.kind == upload.kind) {
            return Err(DomainError::invalid_document(format!(
                "{} supplied more than once",
                upload.kind.label()
            )));
        }
    }
    Ok(())
}
