//! Exclusive assignment of catalog datasets to subjects.
//!
//! The catalog lives in SQLite and every allocation runs as one immediate
//! transaction on the database worker, so two registrations racing for the
//! same dataset are serialized and the loser simply sees fewer available.

pub mod catalog;

use std::sync::Arc;

use chrono::Utc;

pub use catalog::{CatalogSource, DirectoryCatalog, StaticCatalog};

use crate::db::{
    models::{CatalogSyncSummary, Dataset, SubjectId},
    Database,
};
use crate::error::{CoreError, CoreResult};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Clone)]
pub struct DatasetPool {
    db: Database,
    catalog: Arc<dyn CatalogSource>,
}

impl DatasetPool {
    pub fn new(db: Database, catalog: Arc<dyn CatalogSource>) -> Self {
        Self { db, catalog }
    }

    /// Reconciles the stored catalog with the catalog source.
    pub async fn sync_catalog(&self) -> CoreResult<CatalogSyncSummary> {
        let catalog = Arc::clone(&self.catalog);
        let entries = tokio::task::spawn_blocking(move || catalog.entries())
            .await
            .map_err(|err| CoreError::Storage(anyhow::anyhow!("catalog scan task failed: {err}")))??;

        let summary = self.db.sync_catalog(entries, Utc::now()).await?;
        log_info!(
            "catalog synced: {} added, {} removed, {} total",
            summary.added,
            summary.removed,
            summary.total
        );
        if summary.missing_but_bound > 0 {
            log_warn!(
                "{} bound datasets no longer present in the catalog source",
                summary.missing_but_bound
            );
        }
        Ok(summary)
    }

    /// Binds up to `count` datasets to the subject. A short result is not an error.
    pub async fn allocate(&self, subject_id: SubjectId, count: usize) -> CoreResult<Vec<Dataset>> {
        let bound = self.db.allocate_datasets(subject_id, count, Utc::now()).await?;
        if bound.len() < count {
            log_warn!(
                "subject {subject_id} requested {count} datasets, only {} available",
                bound.len()
            );
        } else {
            log_info!("bound {} datasets to subject {subject_id}", bound.len());
        }
        Ok(bound)
    }

    /// Returns every dataset held by the subject to the pool.
    pub async fn release(&self, subject_id: SubjectId) -> CoreResult<Vec<String>> {
        let released = self.db.release_datasets(subject_id).await?;
        log_info!("released {} datasets from subject {subject_id}", released.len());
        Ok(released)
    }

    pub async fn available_count(&self) -> CoreResult<usize> {
        Ok(self.db.count_available_datasets().await?)
    }

    pub async fn datasets_for_subject(&self, subject_id: SubjectId) -> CoreResult<Vec<Dataset>> {
        Ok(self.db.get_datasets_for_subject(subject_id).await?)
    }

    pub async fn list(&self) -> CoreResult<Vec<Dataset>> {
        Ok(self.db.list_datasets().await?)
    }
}
