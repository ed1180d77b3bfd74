//! History recording with a per-session change gate.
//!
//! Manual captures always persist. Automatic captures go through a
//! [`CaptureSession`] that remembers the last triple it actually saved and
//! skips anything that has not moved by at least `epsilon` on one of the
//! three compared KPIs.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{
    models::{Alert, HistoryEntry, Measurement, RecordedSnapshot, SubjectId},
    Database,
};
use crate::error::{CoreError, CoreResult};
use crate::frames::{Frame, KpiTriple, Kpis};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Change-gate state for one polling loop (one subject, one dashboard).
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: Uuid,
    subject_id: SubjectId,
    last_saved: Option<KpiTriple>,
    saved: usize,
    skipped: usize,
}

impl CaptureSession {
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            last_saved: None,
            saved: 0,
            skipped: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn last_saved(&self) -> Option<KpiTriple> {
        self.last_saved
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn is_unchanged(&self, candidate: &KpiTriple, epsilon: f64) -> bool {
        self.last_saved
            .map_or(false, |last| last.within(candidate, epsilon))
    }
}

/// Persists measurements as history entries and raises their alerts.
#[derive(Clone)]
pub struct HistoryRecorder {
    db: Database,
    epsilon: f64,
}

impl HistoryRecorder {
    pub fn new(db: Database, epsilon: f64) -> Self {
        Self { db, epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Unconditionally stores the measurement and its alert.
    pub async fn record(&self, measurement: Measurement) -> CoreResult<RecordedSnapshot> {
        let alert = Alert::for_peak(
            measurement.subject_id,
            measurement.kpis.peak,
            measurement.measured_at,
        );
        let snapshot = self.db.insert_recorded_snapshot(measurement, alert).await?;

        log_info!(
            "recorded history {} for subject {} (peak {}, alert {})",
            snapshot.entry.id,
            snapshot.entry.subject_id,
            snapshot.entry.measurement.kpis.peak,
            snapshot.alert.tier.as_str()
        );
        Ok(snapshot)
    }

    /// Change-gated capture for automatic polling.
    ///
    /// Returns `Ok(None)` when the frames are within `epsilon` of the last
    /// triple this session saved. The session only advances after a
    /// successful write, so a failed save is retried on the next tick.
    pub async fn capture(
        &self,
        session: &mut CaptureSession,
        frames: &[Frame],
        captured_at: DateTime<Utc>,
    ) -> CoreResult<Option<RecordedSnapshot>> {
        let triple = Kpis::aggregate(frames).triple();
        if session.is_unchanged(&triple, self.epsilon) {
            session.skipped += 1;
            log_debug!(
                "capture session {} skipped unchanged frame set for subject {}",
                session.id,
                session.subject_id
            );
            return Ok(None);
        }

        let measurement = Measurement::from_frames(session.subject_id, frames, captured_at)?;
        let snapshot = self.record(measurement).await?;
        session.last_saved = Some(triple);
        session.saved += 1;
        Ok(Some(snapshot))
    }

    /// Newest first.
    pub async fn list(&self, subject_id: SubjectId) -> CoreResult<Vec<HistoryEntry>> {
        Ok(self.db.list_history(subject_id).await?)
    }

    pub async fn delete(&self, history_id: i64) -> CoreResult<()> {
        if !self.db.delete_history(history_id).await? {
            return Err(CoreError::not_found("history entry", history_id));
        }
        log_info!("deleted history entry {history_id}");
        Ok(())
    }

    pub async fn latest_measurement(&self, subject_id: SubjectId) -> CoreResult<Option<Measurement>> {
        Ok(self.db.latest_measurement(subject_id).await?)
    }

    pub async fn list_alerts(&self, subject_id: SubjectId, limit: usize) -> CoreResult<Vec<Alert>> {
        Ok(self.db.list_alerts(subject_id, limit).await?)
    }

    pub async fn delete_alert(&self, alert_id: i64) -> CoreResult<()> {
        if !self.db.delete_alert(alert_id).await? {
            return Err(CoreError::not_found("alert", alert_id));
        }
        Ok(())
    }
}
