use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubjectId;
use crate::alerts::{classify, AlertTier};

/// Severity notification raised for a stored measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Option<i64>,
    pub subject_id: SubjectId,
    pub message: String,
    pub tier: AlertTier,
    pub is_critical: bool,
    pub pressure_value: f64,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Unsaved alert for a peak pressure reading.
    pub fn for_peak(subject_id: SubjectId, peak: f64, created_at: DateTime<Utc>) -> Self {
        let classification = classify(peak);
        Self {
            id: None,
            subject_id,
            message: classification.message,
            tier: classification.tier,
            is_critical: classification.is_critical,
            pressure_value: peak,
            created_at,
        }
    }
}
