use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_tier, to_i64},
    models::{Alert, SubjectId},
};

fn row_to_alert(row: &Row) -> Result<Alert> {
    let tier: String = row.get("tier")?;
    let created_at: String = row.get("created_at")?;

    Ok(Alert {
        id: Some(row.get("id")?),
        subject_id: row.get("subject_id")?,
        message: row.get("message")?,
        tier: parse_tier(&tier)?,
        is_critical: row.get("is_critical")?,
        pressure_value: row.get("pressure_value")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Newest alerts for a subject, at most `limit` of them.
    pub async fn list_alerts(&self, subject_id: SubjectId, limit: usize) -> Result<Vec<Alert>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, subject_id, message, tier, is_critical, pressure_value, created_at
                 FROM alerts
                 WHERE subject_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![subject_id, to_i64(limit)?])?;

            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    /// Returns `false` when no alert has that id.
    pub async fn delete_alert(&self, alert_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM alerts WHERE id = ?1", params![alert_id])?;
            Ok(removed == 1)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::alerts::AlertTier;
    use crate::db::models::Measurement;

    #[tokio::test]
    async fn lists_newest_alerts_up_to_limit() {
        let db = Database::open_in_memory().unwrap();
        db.insert_subject(3, Utc::now()).await.unwrap();

        let start = Utc::now();
        for (offset, peak) in [0.0, 120.0, 300.0, 500.0].into_iter().enumerate() {
            let at = start + Duration::seconds(offset as i64);
            let measurement = Measurement::from_frames(3, &[], at).unwrap();
            let alert = Alert::for_peak(3, peak, at);
            db.insert_recorded_snapshot(measurement, alert).await.unwrap();
        }

        let alerts = db.list_alerts(3, 2).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].tier, AlertTier::High);
        assert!(alerts[0].is_critical);
        assert_eq!(alerts[1].tier, AlertTier::Medium);
        assert!(!alerts[1].is_critical);
        assert_eq!(alerts[1].pressure_value, 300.0);

        let id = alerts[0].id.unwrap();
        assert!(db.delete_alert(id).await.unwrap());
        assert!(!db.delete_alert(id).await.unwrap());
        assert_eq!(db.list_alerts(3, 10).await.unwrap().len(), 3);
    }
}
