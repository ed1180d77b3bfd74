use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier supplied by the surrounding application for a monitored subject.
pub type SubjectId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub registered_at: DateTime<Utc>,
}

/// What a purge removed for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub datasets_released: usize,
    pub history_deleted: usize,
    pub measurements_deleted: usize,
    pub alerts_deleted: usize,
}
