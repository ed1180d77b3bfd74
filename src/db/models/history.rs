//! History entry data model.
//!
//! An immutable snapshot of one stored measurement. Entries are never
//! updated; deleting one removes its measurement with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Alert, Measurement, SubjectId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub subject_id: SubjectId,
    pub measurement: Measurement,
    pub snapshot_at: DateTime<Utc>,
}

/// Result of persisting one measurement: its history entry and the alert it raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSnapshot {
    pub entry: HistoryEntry,
    pub alert: Alert,
}
