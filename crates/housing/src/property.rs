use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusstay_core::{AdminId, DomainError, DomainResult, PropertyId, PropertyImageId};

use crate::campus::Campus;

pub const MAX_PROPERTY_IMAGES: usize = 5;
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Available vs. total unit counters on a property.
///
/// # Invariants
/// - `0 <= available <= total` at all times.
/// - `total` is fixed when the property is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLedger {
    available: u32,
    total: u32,
}

/// Result of taking one unit from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// One unit was taken.
    Reserved,
    /// The ledger was already empty; nothing changed.
    AlreadyExhausted,
}

impl CapacityLedger {
    /// A fresh ledger with every unit available.
    pub fn new(total: u32) -> Self {
        Self {
            available: total,
            total,
        }
    }

    /// Rebuild a ledger from persisted counters.
    pub fn restore(available: u32, total: u32) -> DomainResult<Self> {
        if available > total {
            return Err(DomainError::validation(format!(
                "available units ({available}) exceed total units ({total})"
            )));
        }
        Ok(Self { available, total })
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn occupied(&self) -> u32 {
        self.total - self.available
    }

    pub fn has_capacity(&self) -> bool {
        self.available > 0
    }

    pub fn ensure_capacity(&self) -> DomainResult<()> {
        if self.has_capacity() {
            Ok(())
        } else {
            Err(DomainError::Exhausted)
        }
    }

    /// Take one unit. Never goes below zero.
    pub fn reserve(&mut self) -> Reservation {
        match self.available.checked_sub(1) {
            Some(left) => {
                self.available = left;
                Reservation::Reserved
            }
            None => Reservation::AlreadyExhausted,
        }
    }

    /// Administrative correction of the available count.
    pub fn set_available(&mut self, available: u32) -> DomainResult<()> {
        *self = Self::restore(available, self.total)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyImage {
    pub id: PropertyImageId,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Listing input for a new property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProperty {
    pub title: String,
    pub address: String,
    pub is_bachelor: bool,
    pub available_units: u32,
    pub space_per_student: f64,
    pub campus_intake: String,
}

impl NewProperty {
    pub fn validate(&self) -> DomainResult<()> {
        validate_text("title", &self.title)?;
        validate_text("address", &self.address)?;
        validate_space(self.space_per_student)?;
        validate_campus_intake(&self.campus_intake)?;
        Ok(())
    }
}

/// A property listing.
///
/// # Invariants
/// - Owned by exactly one admin; only that admin can decide its applications.
/// - Image count stays within [`MAX_PROPERTY_IMAGES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub admin_id: AdminId,
    pub title: String,
    pub address: String,
    pub is_bachelor: bool,
    pub capacity: CapacityLedger,
    pub space_per_student: f64,
    pub campus_intake: String,
    pub images: Vec<PropertyImage>,
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// Create a listing; the initial available count also becomes the total.
    pub fn create(admin_id: AdminId, input: NewProperty, now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        Ok(Self {
            id: PropertyId::new(),
            admin_id,
            title: input.title.trim().to_string(),
            address: input.address.trim().to_string(),
            is_bachelor: input.is_bachelor,
            capacity: CapacityLedger::new(input.available_units),
            space_per_student: input.space_per_student,
            campus_intake: input.campus_intake.trim().to_string(),
            images: Vec::new(),
            created_at: now,
        })
    }

    pub fn is_owned_by(&self, admin_id: AdminId) -> bool {
        self.admin_id == admin_id
    }

    /// Unowned properties are reported as missing.
    pub fn ensure_owned_by(&self, admin_id: AdminId) -> DomainResult<()> {
        if self.is_owned_by(admin_id) {
            Ok(())
        } else {
            Err(DomainError::not_found("property"))
        }
    }

    /// Campus intake tags, split on commas.
    pub fn intake_tags(&self) -> Vec<&str> {
        self.campus_intake
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn accepts_campus(&self, campus: Campus) -> bool {
        self.intake_tags()
            .iter()
            .any(|t| t.eq_ignore_ascii_case(campus.as_str()))
    }

    pub fn image_urls(&self) -> Vec<String> {
        self.images.iter().map(|i| i.url.clone()).collect()
    }

    pub fn set_title(&mut self, title: &str) -> DomainResult<()> {
        validate_text("title", title)?;
        self.title = title.trim().to_string();
        Ok(())
    }

    pub fn set_address(&mut self, address: &str) -> DomainResult<()> {
        validate_text("address", address)?;
        self.address = address.trim().to_string();
        Ok(())
    }

    pub fn set_space_per_student(&mut self, space: f64) -> DomainResult<()> {
        validate_space(space)?;
        self.space_per_student = space;
        Ok(())
    }

    pub fn set_campus_intake(&mut self, intake: &str) -> DomainResult<()> {
        validate_campus_intake(intake)?;
        self.campus_intake = intake.trim().to_string();
        Ok(())
    }

    /// Check that `removing` existing images and `adding` new ones keeps the
    /// listing within the image limit.
    pub fn ensure_image_budget(&self, removing: usize, adding: usize) -> DomainResult<()> {
        let remaining = self.images.len().saturating_sub(removing);
        if remaining + adding > MAX_PROPERTY_IMAGES {
            return Err(DomainError::validation(format!(
                "maximum {MAX_PROPERTY_IMAGES} images allowed"
            )));
        }
        Ok(())
    }
}

/// Validate an uploaded listing image by content type and file extension.
///
/// Returns the lowercase extension to use in the blob key.
pub fn validate_image(file_name: &str, content_type: &str) -> DomainResult<String> {
    if !content_type.starts_with("image/") {
        return Err(DomainError::validation(format!(
            "{file_name} is not a valid image"
        )));
    }
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(DomainError::validation(format!(
            "file type .{ext} not allowed"
        )));
    }
    Ok(ext)
}

fn validate_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn validate_space(space: f64) -> DomainResult<()> {
    if !space.is_finite() || space <= 0.0 {
        return Err(DomainError::validation(
            "space per student must be a positive number",
        ));
    }
    Ok(())
}

fn validate_campus_intake(intake: &str) -> DomainResult<()> {
    if intake.split(',').all(|t| t.trim().is_empty()) {
        return Err(DomainError::validation("campus intake cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn listing(units: u32) -> Property {
        Property::create(
            AdminId::new(),
            NewProperty {
                title: "Block A".into(),
                address: "1 Main Rd".into(),
                is_bachelor: false,
                available_units: units,
                space_per_student: 12.5,
                campus_intake: "Arts Campus, Pretoria Campus".into(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_sets_total_from_available() {
        let p = listing(4);
        assert_eq!(p.capacity.available(), 4);
        assert_eq!(p.capacity.total(), 4);
    }

    #[test]
    fn reserve_stops_at_zero() {
        let mut ledger = CapacityLedger::new(1);
        assert_eq!(ledger.reserve(), Reservation::Reserved);
        assert_eq!(ledger.reserve(), Reservation::AlreadyExhausted);
        assert_eq!(ledger.available(), 0);
        assert_eq!(ledger.ensure_capacity(), Err(DomainError::Exhausted));
    }

    #[test]
    fn set_available_cannot_exceed_total() {
        let mut ledger = CapacityLedger::new(3);
        assert!(ledger.set_available(4).is_err());
        ledger.set_available(0).unwrap();
        assert_eq!(ledger.occupied(), 3);
    }

    #[test]
    fn intake_tags_are_split_and_trimmed() {
        let p = listing(1);
        assert_eq!(p.intake_tags(), vec!["Arts Campus", "Pretoria Campus"]);
        assert!(p.accepts_campus(Campus::Arts));
        assert!(!p.accepts_campus(Campus::Arcadia));
    }

    #[test]
    fn unowned_property_reads_as_missing() {
        let p = listing(1);
        assert_eq!(
            p.ensure_owned_by(AdminId::new()),
            Err(DomainError::not_found("property"))
        );
    }

    #[test]
    fn image_validation_checks_type_and_extension() {
        assert_eq!(validate_image("room.JPG", "image/jpeg").unwrap(), "jpg");
        assert!(validate_image("room.pdf", "application/pdf").is_err());
        assert!(validate_image("room.tiff", "image/tiff").is_err());
        assert!(validate_image("room", "image/png").is_err());
    }

    #[test]
    fn image_budget_counts_removals() {
        let mut p = listing(1);
        for _ in 0..5 {
            p.images.push(PropertyImage {
                id: PropertyImageId::new(),
                url: "u".into(),
                created_at: Utc::now(),
            });
        }
        assert!(p.ensure_image_budget(0, 1).is_err());
        assert!(p.ensure_image_budget(1, 1).is_ok());
    }

    proptest! {
        #[test]
        fn ledger_never_leaves_bounds(total in 0u32..20, ops in proptest::collection::vec(any::<bool>(), 0..60)) {
            let mut ledger = CapacityLedger::new(total);
            for reserve in ops {
                if reserve {
                    ledger.reserve();
                } else {
                    let _ = ledger.set_available(ledger.available() + 1);
                }
                prop_assert!(ledger.available() <= ledger.total());
                prop_assert_eq!(ledger.total(), total);
            }
        }
    }
}
