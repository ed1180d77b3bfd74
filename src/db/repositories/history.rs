use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::subjects::subject_exists;
use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, to_i64, to_usize},
    models::{Alert, HistoryEntry, Measurement, RecordedSnapshot, SubjectId},
};
use crate::error::CoreError;
use crate::frames::Kpis;

const MEASUREMENT_COLUMNS: &str = "m.id AS measurement_id,
     m.subject_id,
     m.peak_pressure,
     m.low_pressure,
     m.avg_pressure,
     m.contact_area,
     m.frame_count,
     m.frame_data,
     m.heatmap_data,
     m.line_chart_data,
     m.measured_at";

fn row_to_measurement(row: &Row) -> Result<Measurement> {
    let measured_at: String = row.get("measured_at")?;
    let frame_count: i64 = row.get("frame_count")?;

    Ok(Measurement {
        id: Some(row.get("measurement_id")?),
        subject_id: row.get("subject_id")?,
        kpis: Kpis {
            peak: row.get("peak_pressure")?,
            low_above_zero: row.get("low_pressure")?,
            avg: row.get("avg_pressure")?,
            contact_area: row.get("contact_area")?,
        },
        frame_count: to_usize(frame_count, "frame_count")?,
        frame_data: row.get("frame_data")?,
        heatmap_data: row.get("heatmap_data")?,
        line_chart_data: row.get("line_chart_data")?,
        measured_at: parse_datetime(&measured_at, "measured_at")?,
    })
}

fn row_to_history_entry(row: &Row) -> Result<HistoryEntry> {
    let snapshot_at: String = row.get("snapshot_at")?;

    Ok(HistoryEntry {
        id: row.get("history_id")?,
        subject_id: row.get("subject_id")?,
        measurement: row_to_measurement(row)?,
        snapshot_at: parse_datetime(&snapshot_at, "snapshot_at")?,
    })
}

fn last_snapshot_at(conn: &Connection, subject_id: SubjectId) -> Result<Option<String>> {
    let last: Option<String> = conn.query_row(
        "SELECT MAX(snapshot_at) FROM history WHERE subject_id = ?1",
        params![subject_id],
        |row| row.get(0),
    )?;
    Ok(last)
}

impl Database {
    /// Stores a measurement, its history entry and its alert in one transaction.
    ///
    /// The snapshot time is the measurement time, raised to the subject's
    /// latest snapshot when the clock went backwards, so history stays in
    /// recording order. The alert is stamped with the same time.
    pub async fn insert_recorded_snapshot(
        &self,
        measurement: Measurement,
        alert: Alert,
    ) -> Result<RecordedSnapshot> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let subject_id = measurement.subject_id;

            if !subject_exists(&tx, subject_id)? {
                return Err(CoreError::not_found("subject", subject_id).into());
            }

            let mut snapshot_at = measurement.measured_at;
            if let Some(last) = last_snapshot_at(&tx, subject_id)? {
                let last = parse_datetime(&last, "snapshot_at")?;
                if last > snapshot_at {
                    snapshot_at = last;
                }
            }
            let mut alert = alert;
            alert.created_at = snapshot_at;

            tx.execute(
                "INSERT INTO measurements (
                    subject_id,
                    peak_pressure,
                    low_pressure,
                    avg_pressure,
                    contact_area,
                    frame_count,
                    frame_data,
                    heatmap_data,
                    line_chart_data,
                    measured_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    subject_id,
                    measurement.kpis.peak,
                    measurement.kpis.low_above_zero,
                    measurement.kpis.avg,
                    measurement.kpis.contact_area,
                    to_i64(measurement.frame_count)?,
                    measurement.frame_data,
                    measurement.heatmap_data,
                    measurement.line_chart_data,
                    format_datetime(&measurement.measured_at),
                ],
            )?;
            let measurement_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO history (subject_id, measurement_id, snapshot_at)
                 VALUES (?1, ?2, ?3)",
                params![subject_id, measurement_id, format_datetime(&snapshot_at)],
            )?;
            let history_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO alerts (
                    subject_id,
                    message,
                    tier,
                    is_critical,
                    pressure_value,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    alert.subject_id,
                    alert.message,
                    alert.tier.as_str(),
                    alert.is_critical,
                    alert.pressure_value,
                    format_datetime(&alert.created_at),
                ],
            )?;
            let alert_id = tx.last_insert_rowid();

            tx.commit()?;

            let mut measurement = measurement;
            measurement.id = Some(measurement_id);
            alert.id = Some(alert_id);

            Ok(RecordedSnapshot {
                entry: HistoryEntry {
                    id: history_id,
                    subject_id,
                    measurement,
                    snapshot_at,
                },
                alert,
            })
        })
        .await
    }

    /// History for one subject, newest first.
    pub async fn list_history(&self, subject_id: SubjectId) -> Result<Vec<HistoryEntry>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT h.id AS history_id, h.snapshot_at, {MEASUREMENT_COLUMNS}
                 FROM history h
                 JOIN measurements m ON m.id = h.measurement_id
                 WHERE h.subject_id = ?1
                 ORDER BY h.snapshot_at DESC, h.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![subject_id])?;

            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_history_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// Deletes a history entry and the measurement it owns.
    ///
    /// Returns `false` when no entry has that id.
    pub async fn delete_history(&self, history_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let measurement_id: Option<i64> = tx
                .query_row(
                    "SELECT measurement_id FROM history WHERE id = ?1",
                    params![history_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(measurement_id) = measurement_id else {
                return Ok(false);
            };

            tx.execute("DELETE FROM history WHERE id = ?1", params![history_id])?;
            tx.execute(
                "DELETE FROM measurements WHERE id = ?1",
                params![measurement_id],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Most recently recorded measurement for the subject, if any.
    pub async fn latest_measurement(&self, subject_id: SubjectId) -> Result<Option<Measurement>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {MEASUREMENT_COLUMNS}
                 FROM history h
                 JOIN measurements m ON m.id = h.measurement_id
                 WHERE h.subject_id = ?1
                 ORDER BY h.snapshot_at DESC, h.id DESC
                 LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![subject_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_measurement(row)?)),
                None => Ok(None),
            }
        })
        .await
    }
}
