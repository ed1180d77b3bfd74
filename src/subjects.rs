//! Subject lifecycle: registration binds datasets, purge gives them back.

use chrono::Utc;
use serde::Serialize;

use crate::db::{
    models::{Dataset, PurgeSummary, Subject, SubjectId},
    Database,
};
use crate::error::{CoreError, CoreResult};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub subject: Subject,
    pub datasets: Vec<Dataset>,
    /// False when the subject was already known and kept its bindings.
    pub newly_registered: bool,
}

#[derive(Clone)]
pub struct SubjectRegistry {
    db: Database,
    datasets_per_subject: usize,
}

impl SubjectRegistry {
    pub fn new(db: Database, datasets_per_subject: usize) -> Self {
        Self {
            db,
            datasets_per_subject,
        }
    }

    /// Registers the subject and binds its share of datasets.
    ///
    /// Registering a known subject again returns its current bindings. A
    /// failed registration leaves neither the subject nor any binding behind.
    pub async fn register_subject(&self, subject_id: SubjectId) -> CoreResult<Registration> {
        let wanted = self.datasets_per_subject;
        let (newly_registered, datasets) =
            self.db.register_subject(subject_id, wanted, Utc::now()).await?;

        if !newly_registered {
            log_info!("subject {subject_id} already registered with {} datasets", datasets.len());
        } else if datasets.len() < wanted {
            log_warn!(
                "subject {subject_id} requested {wanted} datasets, only {} available",
                datasets.len()
            );
        } else {
            log_info!("registered subject {subject_id} with {} datasets", datasets.len());
        }

        let subject = self
            .db
            .get_subject(subject_id)
            .await?
            .ok_or_else(|| CoreError::not_found("subject", subject_id))?;

        Ok(Registration {
            subject,
            datasets,
            newly_registered,
        })
    }

    /// Releases the subject's datasets and deletes its history and alerts.
    pub async fn purge_subject(&self, subject_id: SubjectId) -> CoreResult<PurgeSummary> {
        let summary = self
            .db
            .purge_subject(subject_id)
            .await?
            .ok_or_else(|| CoreError::not_found("subject", subject_id))?;

        log_info!(
            "purged subject {subject_id}: {} datasets released, {} history entries, {} alerts",
            summary.datasets_released,
            summary.history_deleted,
            summary.alerts_deleted
        );
        Ok(summary)
    }
}
