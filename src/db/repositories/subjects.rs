use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::datasets::{bind_available, bound_to, MAX_ALLOCATION_ATTEMPTS};
use crate::db::{
    connection::Database,
    helpers::{format_datetime, is_constraint_violation, parse_datetime},
    models::{Dataset, PurgeSummary, Subject, SubjectId},
};

pub(crate) fn subject_exists(conn: &Connection, subject_id: SubjectId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM subjects WHERE id = ?1",
            params![subject_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Inserts the subject and binds its datasets, or reads back the bindings
/// of a subject that already exists. Nothing is kept if any step fails.
fn try_register(
    conn: &mut Connection,
    subject_id: SubjectId,
    count: usize,
    now: &DateTime<Utc>,
) -> Result<(bool, Vec<Dataset>)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO subjects (id, registered_at) VALUES (?1, ?2)",
        params![subject_id, format_datetime(now)],
    )? == 1;
    let datasets = if inserted {
        bind_available(&tx, subject_id, count, now)?
    } else {
        bound_to(&tx, subject_id)?
    };

    tx.commit()?;
    Ok((inserted, datasets))
}

impl Database {
    /// Registers the subject with up to `count` datasets in one transaction.
    ///
    /// Returns `false` with the current bindings when the subject already existed.
    pub async fn register_subject(
        &self,
        subject_id: SubjectId,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<(bool, Vec<Dataset>)> {
        self.execute(move |conn| {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match try_register(conn, subject_id, count, &now) {
                    Ok(registered) => return Ok(registered),
                    Err(err) if is_constraint_violation(&err) && attempt < MAX_ALLOCATION_ATTEMPTS => {
                        warn!("registration of subject {subject_id} collided (attempt {attempt}); retrying");
                    }
                    Err(err) => return Err(err),
                }
            }
        })
        .await
    }

    /// Inserts the subject if it is new. Returns `false` when it already existed.
    pub async fn insert_subject(
        &self,
        subject_id: SubjectId,
        registered_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO subjects (id, registered_at) VALUES (?1, ?2)",
                params![subject_id, format_datetime(&registered_at)],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    pub async fn get_subject(&self, subject_id: SubjectId) -> Result<Option<Subject>> {
        self.execute(move |conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, registered_at FROM subjects WHERE id = ?1",
                    params![subject_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            row.map(|(id, registered_at)| {
                Ok(Subject {
                    id,
                    registered_at: parse_datetime(&registered_at, "registered_at")?,
                })
            })
            .transpose()
        })
        .await
    }

    /// Removes a subject together with everything it owns, in one transaction.
    ///
    /// Returns `None` when the subject is unknown.
    pub async fn purge_subject(&self, subject_id: SubjectId) -> Result<Option<PurgeSummary>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            if !subject_exists(&tx, subject_id)? {
                return Ok(None);
            }

            let datasets_released = tx.execute(
                "DELETE FROM dataset_bindings WHERE subject_id = ?1",
                params![subject_id],
            )?;
            let history_deleted = tx.execute(
                "DELETE FROM history WHERE subject_id = ?1",
                params![subject_id],
            )?;
            let measurements_deleted = tx.execute(
                "DELETE FROM measurements WHERE subject_id = ?1",
                params![subject_id],
            )?;
            let alerts_deleted = tx.execute(
                "DELETE FROM alerts WHERE subject_id = ?1",
                params![subject_id],
            )?;
            tx.execute("DELETE FROM subjects WHERE id = ?1", params![subject_id])?;

            tx.commit()?;

            Ok(Some(PurgeSummary {
                datasets_released,
                history_deleted,
                measurements_deleted,
                alerts_deleted,
            }))
        })
        .await
    }
}
