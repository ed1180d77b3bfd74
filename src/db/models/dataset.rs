//! Dataset catalog data models.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubjectId;

/// A pre-recorded dataset known to the catalog, with its binding if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub name: String,
    pub path: PathBuf,
    pub subject_id: Option<SubjectId>,
    pub bound_at: Option<DateTime<Utc>>,
}

impl Dataset {
    pub fn is_bound(&self) -> bool {
        self.subject_id.is_some()
    }
}

/// One entry reported by a catalog source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSyncSummary {
    pub added: usize,
    pub removed: usize,
    /// Bound datasets whose source disappeared; kept until released.
    pub missing_but_bound: usize,
    pub total: usize,
}
