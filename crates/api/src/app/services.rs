//! Adapter selection and service wiring for the binary.

use std::sync::Arc;

use anyhow::Context;

use campusstay_infra::blob::{BlobStore, InMemoryBlobStore, LocalBlobStore};
use campusstay_infra::config::AppConfig;
use campusstay_infra::mail::LogMailer;
use campusstay_infra::services::Services;
use campusstay_infra::store::{InMemoryStore, PostgresStore, Repository};

/// Build the service bundle from configuration.
///
/// `DATABASE_URL` selects Postgres (migrated on startup), otherwise state
/// lives in memory. `UPLOAD_DIR` selects the local-filesystem blob store.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Arc<Services>> {
    let store: Arc<dyn Repository> = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; state is kept in memory and lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match &config.upload_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "using local blob store");
            Arc::new(LocalBlobStore::new(dir.clone(), &config.public_upload_url))
        }
        None => {
            tracing::warn!("UPLOAD_DIR not set; uploads are kept in memory");
            Arc::new(InMemoryBlobStore::new(&config.public_upload_url))
        }
    };

    let services = Services::new(config, store, blobs, Arc::new(LogMailer));

    if let Some(bootstrap) = &config.bootstrap_admin {
        services
            .accounts
            .bootstrap_admin(bootstrap)
            .await
            .context("failed to bootstrap admin")?;
    }

    Ok(Arc::new(services))
}
