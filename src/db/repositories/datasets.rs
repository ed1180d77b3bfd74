use std::{collections::HashSet, path::PathBuf};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Connection, Row, TransactionBehavior};

use super::subjects::subject_exists;
use crate::db::{
    connection::Database,
    helpers::{format_datetime, is_constraint_violation, parse_optional_datetime, to_i64},
    models::{CatalogEntry, CatalogSyncSummary, Dataset, SubjectId},
};
use crate::error::CoreError;

/// Attempts made when a binding insert collides with a concurrent writer.
pub(crate) const MAX_ALLOCATION_ATTEMPTS: usize = 3;

const DATASET_COLUMNS: &str = "d.name, d.path, b.subject_id, b.bound_at
     FROM datasets d
     LEFT JOIN dataset_bindings b ON b.dataset_name = d.name";

fn row_to_dataset(row: &Row) -> Result<Dataset> {
    let path: String = row.get("path")?;
    let bound_at: Option<String> = row.get("bound_at")?;

    Ok(Dataset {
        name: row.get("name")?,
        path: PathBuf::from(path),
        subject_id: row.get("subject_id")?,
        bound_at: parse_optional_datetime(bound_at, "bound_at")?,
    })
}

fn query_datasets(conn: &Connection, filter: &str, subject: Option<SubjectId>) -> Result<Vec<Dataset>> {
    let sql = format!("SELECT {DATASET_COLUMNS} {filter} ORDER BY d.name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = match subject {
        Some(subject_id) => stmt.query(params![subject_id])?,
        None => stmt.query([])?,
    };

    let mut datasets = Vec::new();
    while let Some(row) = rows.next()? {
        datasets.push(row_to_dataset(row)?);
    }
    Ok(datasets)
}

/// Picks and binds up to `count` unbound datasets on the caller's transaction.
pub(crate) fn bind_available(
    conn: &Connection,
    subject_id: SubjectId,
    count: usize,
    bound_at: &DateTime<Utc>,
) -> Result<Vec<Dataset>> {
    let candidates: Vec<(String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT d.name, d.path
             FROM datasets d
             WHERE NOT EXISTS (
                 SELECT 1 FROM dataset_bindings b WHERE b.dataset_name = d.name
             )
             ORDER BY d.name ASC
             LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![to_i64(count)?])?;
        let mut picked = Vec::new();
        while let Some(row) = rows.next()? {
            picked.push((row.get(0)?, row.get(1)?));
        }
        picked
    };

    let stamp = format_datetime(bound_at);
    for (name, _) in &candidates {
        conn.execute(
            "INSERT INTO dataset_bindings (dataset_name, subject_id, bound_at)
             VALUES (?1, ?2, ?3)",
            params![name, subject_id, stamp],
        )?;
    }

    Ok(candidates
        .into_iter()
        .map(|(name, path)| Dataset {
            name,
            path: PathBuf::from(path),
            subject_id: Some(subject_id),
            bound_at: Some(*bound_at),
        })
        .collect())
}

pub(crate) fn bound_to(conn: &Connection, subject_id: SubjectId) -> Result<Vec<Dataset>> {
    query_datasets(conn, "WHERE b.subject_id = ?1", Some(subject_id))
}

fn try_allocate(
    conn: &mut Connection,
    subject_id: SubjectId,
    count: usize,
    bound_at: &DateTime<Utc>,
) -> Result<Vec<Dataset>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !subject_exists(&tx, subject_id)? {
        return Err(CoreError::not_found("subject", subject_id).into());
    }

    let bound = bind_available(&tx, subject_id, count, bound_at)?;
    tx.commit()?;
    Ok(bound)
}

impl Database {
    /// Brings the catalog table in line with a fresh listing.
    ///
    /// New entries are added and paths refreshed. Entries missing from the
    /// listing are deleted when unbound and kept when some subject holds them.
    pub async fn sync_catalog(
        &self,
        entries: Vec<CatalogEntry>,
        now: DateTime<Utc>,
    ) -> Result<CatalogSyncSummary> {
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let stamp = format_datetime(&now);
            let mut summary = CatalogSyncSummary::default();

            let listed: HashSet<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();

            for entry in &entries {
                let path = entry.path.to_string_lossy();
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO datasets (name, path, added_at) VALUES (?1, ?2, ?3)",
                    params![entry.name, path, stamp],
                )?;
                if inserted == 1 {
                    summary.added += 1;
                } else {
                    tx.execute(
                        "UPDATE datasets SET path = ?1 WHERE name = ?2",
                        params![path, entry.name],
                    )?;
                }
            }

            let known: Vec<(String, bool)> = {
                let mut stmt = tx.prepare(
                    "SELECT d.name, b.dataset_name IS NOT NULL
                     FROM datasets d
                     LEFT JOIN dataset_bindings b ON b.dataset_name = d.name",
                )?;
                let mut rows = stmt.query([])?;
                let mut known = Vec::new();
                while let Some(row) = rows.next()? {
                    known.push((row.get(0)?, row.get(1)?));
                }
                known
            };

            for (name, bound) in known {
                if listed.contains(name.as_str()) {
                    continue;
                }
                if bound {
                    warn!("dataset {name} is missing from the catalog source but still bound");
                    summary.missing_but_bound += 1;
                } else {
                    tx.execute("DELETE FROM datasets WHERE name = ?1", params![name])?;
                    summary.removed += 1;
                }
            }

            summary.total = tx.query_row("SELECT COUNT(*) FROM datasets", [], |row| {
                row.get::<_, i64>(0)
            })? as usize;

            tx.commit()?;
            Ok(summary)
        })
        .await
    }

    /// Binds up to `count` available datasets to the subject, in name order.
    ///
    /// Fewer than `count` (including none) is a normal outcome.
    pub async fn allocate_datasets(
        &self,
        subject_id: SubjectId,
        count: usize,
        bound_at: DateTime<Utc>,
    ) -> Result<Vec<Dataset>> {
        self.execute(move |conn| {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match try_allocate(conn, subject_id, count, &bound_at) {
                    Ok(bound) => return Ok(bound),
                    Err(err) if is_constraint_violation(&err) && attempt < MAX_ALLOCATION_ATTEMPTS => {
                        warn!(
                            "dataset binding collided for subject {subject_id} (attempt {attempt}); recomputing availability"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        })
        .await
    }

    /// Unbinds every dataset held by the subject and returns their names.
    pub async fn release_datasets(&self, subject_id: SubjectId) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let names: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT dataset_name FROM dataset_bindings
                     WHERE subject_id = ?1
                     ORDER BY dataset_name ASC",
                )?;
                let mut rows = stmt.query(params![subject_id])?;
                let mut names = Vec::new();
                while let Some(row) = rows.next()? {
                    names.push(row.get(0)?);
                }
                names
            };

            let removed = tx.execute(
                "DELETE FROM dataset_bindings WHERE subject_id = ?1",
                params![subject_id],
            )?;
            if removed != names.len() {
                bail!(
                    "released {removed} bindings for subject {subject_id}, expected {}",
                    names.len()
                );
            }

            tx.commit()?;
            Ok(names)
        })
        .await
    }

    pub async fn count_available_datasets(&self) -> Result<usize> {
        self.execute(|conn| {
            let available: i64 = conn.query_row(
                "SELECT COUNT(*) FROM datasets d
                 WHERE NOT EXISTS (
                     SELECT 1 FROM dataset_bindings b WHERE b.dataset_name = d.name
                 )",
                [],
                |row| row.get(0),
            )?;
            Ok(available as usize)
        })
        .await
    }

    pub async fn get_datasets_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Dataset>> {
        self.execute(move |conn| bound_to(conn, subject_id)).await
    }

    /// Whole catalog in allocation order, bound or not.
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        self.execute(|conn| query_datasets(conn, "", None)).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::error::CoreError;

    fn entries(names: &[&str]) -> Vec<CatalogEntry> {
        names
            .iter()
            .map(|name| CatalogEntry {
                name: name.to_string(),
                path: PathBuf::from("/data").join(name),
            })
            .collect()
    }

    async fn seeded(names: &[&str], subjects: &[SubjectId]) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.sync_catalog(entries(names), Utc::now()).await.unwrap();
        for subject in subjects {
            db.insert_subject(*subject, Utc::now()).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn allocates_in_name_order_and_partially() {
        let db = seeded(&["e.csv", "a.csv", "c.csv", "b.csv", "d.csv"], &[1, 2]).await;

        let first = db.allocate_datasets(1, 3, Utc::now()).await.unwrap();
        let names: Vec<_> = first.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a.csv", "b.csv", "c.csv"]);

        let second = db.allocate_datasets(2, 3, Utc::now()).await.unwrap();
        let names: Vec<_> = second.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["d.csv", "e.csv"]);

        assert_eq!(db.count_available_datasets().await.unwrap(), 0);
        assert!(db.allocate_datasets(2, 1, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_subject_is_not_found() {
        let db = seeded(&["a.csv"], &[]).await;
        let err = db.allocate_datasets(42, 1, Utc::now()).await.unwrap_err();
        let core = CoreError::from(err);
        assert!(core.is_not_found());
        assert_eq!(db.count_available_datasets().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn release_returns_datasets_to_the_pool() {
        let db = seeded(&["a.csv", "b.csv", "c.csv"], &[1, 2]).await;
        db.allocate_datasets(1, 2, Utc::now()).await.unwrap();
        let before = db.count_available_datasets().await.unwrap();

        let released = db.release_datasets(1).await.unwrap();
        assert_eq!(released, ["a.csv", "b.csv"]);
        assert_eq!(
            db.count_available_datasets().await.unwrap(),
            before + released.len()
        );

        let taken = db.allocate_datasets(2, 2, Utc::now()).await.unwrap();
        let names: Vec<_> = taken.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a.csv", "b.csv"]);
        assert!(db.get_datasets_for_subject(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_allocations_never_share_a_dataset() {
        let names: Vec<String> = (0..10).map(|i| format!("set_{i:02}.csv")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let subjects: Vec<SubjectId> = (1..=8).collect();
        let db = seeded(&name_refs, &subjects).await;

        let mut handles = Vec::new();
        for subject in subjects {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.allocate_datasets(subject, 3, Utc::now()).await.unwrap()
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for dataset in handle.await.unwrap() {
                total += 1;
                assert!(seen.insert(dataset.name), "dataset bound twice");
            }
        }
        assert_eq!(total, 10);
        assert_eq!(db.count_available_datasets().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sync_keeps_bound_entries_that_vanished() {
        let db = seeded(&["a.csv", "b.csv", "c.csv"], &[1]).await;
        db.allocate_datasets(1, 1, Utc::now()).await.unwrap();

        let summary = db.sync_catalog(entries(&["c.csv", "d.csv"]), Utc::now()).await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.missing_but_bound, 1);
        assert_eq!(summary.total, 3);

        let listed = db.list_datasets().await.unwrap();
        let names: Vec<_> = listed.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a.csv", "c.csv", "d.csv"]);
        assert!(listed[0].is_bound());
        assert_eq!(listed[0].subject_id, Some(1));
    }
}
