//! Property listings: public catalogue and owner-scoped management.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use campusstay_core::{AdminId, DomainError, PropertyId, PropertyImageId};
use campusstay_housing::{
    Campus, MAX_PROPERTY_IMAGES, NewProperty, Property, PropertyImage, validate_image,
};

use super::ServiceError;
use crate::blob::{BlobStore, release};
use crate::store::{CapacityEdit, Repository};

/// An uploaded listing image, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Partial update of a listing. `remove_images` holds image URLs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyChanges {
    pub title: Option<String>,
    pub address: Option<String>,
    pub is_bachelor: Option<bool>,
    pub available_units: Option<u32>,
    pub space_per_student: Option<f64>,
    pub campus_intake: Option<String>,
    pub remove_images: Vec<String>,
    pub new_images: Vec<ImageUpload>,
}

#[derive(Clone)]
pub struct PropertyService {
    store: Arc<dyn Repository>,
    blobs: Arc<dyn BlobStore>,
}

impl PropertyService {
    pub fn new(store: Arc<dyn Repository>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub async fn list_public(&self) -> Result<Vec<Property>, ServiceError> {
        Ok(self.store.list_properties(None).await?)
    }

    pub async fn get_public(&self, id: PropertyId) -> Result<Property, ServiceError> {
        self.store
            .property_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("property").into())
    }

    /// Listings whose campus intake includes `campus`.
    pub async fn recommended_for(&self, campus: Campus) -> Result<Vec<Property>, ServiceError> {
        let all = self.store.list_properties(None).await?;
        Ok(all.into_iter().filter(|p| p.accepts_campus(campus)).collect())
    }

    pub async fn list_for_admin(&self, admin_id: AdminId) -> Result<Vec<Property>, ServiceError> {
        Ok(self.store.list_properties(Some(admin_id)).await?)
    }

    pub async fn get_owned(&self, admin_id: AdminId, id: PropertyId) -> Result<Property, ServiceError> {
        let property = self.get_public(id).await?;
        property.ensure_owned_by(admin_id)?;
        Ok(property)
    }

    /// Create a listing with between one and five images.
    #[instrument(skip(self, input, images), fields(images = images.len()), err)]
    pub async fn create(
        &self,
        admin_id: AdminId,
        input: NewProperty,
        images: Vec<ImageUpload>,
    ) -> Result<Property, ServiceError> {
        if images.is_empty() {
            return Err(DomainError::validation("at least one image is required").into());
        }
        if images.len() > MAX_PROPERTY_IMAGES {
            return Err(DomainError::validation(format!(
                "maximum {MAX_PROPERTY_IMAGES} images allowed"
            ))
            .into());
        }

        let now = Utc::now();
        let mut property = Property::create(admin_id, input, now)?;
        property.images = self.store_images(property.id, images).await?;

        if let Err(err) = self.store.insert_property(&property).await {
            error!(property_id = %property.id, error = %err, "property insert failed; releasing images");
            self.discard(&property.image_urls()).await;
            return Err(err.into());
        }

        info!(property_id = %property.id, "property created");
        Ok(property)
    }

    #[instrument(skip(self, changes), err)]
    pub async fn update(
        &self,
        admin_id: AdminId,
        id: PropertyId,
        changes: PropertyChanges,
    ) -> Result<Property, ServiceError> {
        let mut property = self.get_owned(admin_id, id).await?;

        if let Some(title) = &changes.title {
            property.set_title(title)?;
        }
        if let Some(address) = &changes.address {
            property.set_address(address)?;
        }
        if let Some(is_bachelor) = changes.is_bachelor {
            property.is_bachelor = is_bachelor;
        }
        if let Some(space) = changes.space_per_student {
            property.set_space_per_student(space)?;
        }
        if let Some(intake) = &changes.campus_intake {
            property.set_campus_intake(intake)?;
        }
        // Early bounds check; the store re-applies it to the locked row.
        let capacity = match changes.available_units {
            Some(available) => {
                property.capacity.set_available(available)?;
                CapacityEdit::SetAvailable(available)
            }
            None => CapacityEdit::Keep,
        };

        let (removed, kept): (Vec<PropertyImage>, Vec<PropertyImage>) = property
            .images
            .drain(..)
            .partition(|img| changes.remove_images.contains(&img.url));
        property.images = kept;
        property.ensure_image_budget(0, changes.new_images.len())?;

        let added = self.store_images(property.id, changes.new_images).await?;
        let added_urls: Vec<String> = added.iter().map(|i| i.url.clone()).collect();
        property.images.extend(added);

        if let Err(err) = self.store.update_property(&property, capacity).await {
            error!(property_id = %id, error = %err, "property update failed; releasing new images");
            self.discard(&added_urls).await;
            return Err(err.into());
        }

        let removed_urls: Vec<String> = removed.into_iter().map(|i| i.url).collect();
        self.discard(&removed_urls).await;

        info!(property_id = %id, "property updated");
        self.get_public(id).await
    }

    /// Remove the listing, its applications and its images.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, admin_id: AdminId, id: PropertyId) -> Result<(), ServiceError> {
        let property = self.get_owned(admin_id, id).await?;
        self.store.delete_property(id).await?;
        self.discard(&property.image_urls()).await;
        info!(property_id = %id, "property deleted");
        Ok(())
    }

    /// Validate every image, then write them all. A failed write releases
    /// the images written before it.
    async fn store_images(
        &self,
        property_id: PropertyId,
        images: Vec<ImageUpload>,
    ) -> Result<Vec<PropertyImage>, ServiceError> {
        let mut extensions = Vec::with_capacity(images.len());
        for image in &images {
            extensions.push(validate_image(&image.file_name, &image.content_type)?);
        }

        let now = Utc::now();
        let mut stored: Vec<PropertyImage> = Vec::with_capacity(images.len());
        for (image, ext) in images.into_iter().zip(extensions) {
            let key = format!("properties/{property_id}/{}.{ext}", Uuid::now_v7().simple());
            match self.blobs.put(&key, image.bytes, &image.content_type).await {
                Ok(url) => stored.push(PropertyImage {
                    id: PropertyImageId::new(),
                    url,
                    created_at: now,
                }),
                Err(err) => {
                    let urls: Vec<String> = stored.into_iter().map(|i| i.url).collect();
                    self.discard(&urls).await;
                    return Err(err.into());
                }
            }
        }
        Ok(stored)
    }

    async fn discard(&self, urls: &[String]) {
        for url in urls {
            let _ = release(self.blobs.as_ref(), url).await;
        }
    }
}
