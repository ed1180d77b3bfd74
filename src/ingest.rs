//! `PressureCore`: one handle wiring configuration, storage, the dataset
//! pool and the history recorder together for the embedding application.

use std::{io::BufRead, path::Path, sync::Arc};

use chrono::Utc;
use serde::Serialize;

use crate::alerts::requires_attention;
use crate::config::CoreConfig;
use crate::db::{
    models::{Alert, Measurement, RecordedSnapshot, SubjectId},
    Database,
};
use crate::error::{CoreError, CoreResult};
use crate::frames::{load_dataset_or_empty, load_datasets, read_frames, Frame, ParseStats};
use crate::history::{CaptureSession, HistoryRecorder};
use crate::pool::{CatalogSource, DatasetPool, DirectoryCatalog};
use crate::replay::{ReplayCursor, ReplayFeed};
use crate::subjects::SubjectRegistry;

const ENABLE_LOGS: bool = true;

const STREAM_LABEL: &str = "<stream>";

use crate::{log_info, log_warn};

/// Outcome of ingesting one dataset source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingestion {
    pub stats: ParseStats,
    /// `None` when the source produced no frames; nothing is stored then.
    pub snapshot: Option<RecordedSnapshot>,
}

impl Ingestion {
    pub fn alert(&self) -> Option<&Alert> {
        self.snapshot.as_ref().map(|snapshot| &snapshot.alert)
    }
}

#[derive(Clone)]
pub struct PressureCore {
    config: Arc<CoreConfig>,
    db: Database,
    pool: DatasetPool,
    recorder: HistoryRecorder,
    subjects: SubjectRegistry,
}

impl PressureCore {
    /// Opens the database at `database_path` and scans `catalog_dir`.
    pub async fn open(config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let db = Database::new(config.database_path.clone())?;
        let catalog = DirectoryCatalog::new(&config.catalog_dir, config.dataset_extension.clone());
        let core = Self::with_parts(config, db, Arc::new(catalog))?;

        match core.pool.sync_catalog().await {
            Ok(_) => {}
            Err(err @ CoreError::SourceUnavailable { .. }) => {
                log_warn!("starting with an empty catalog: {err}");
            }
            Err(err) => return Err(err),
        }
        Ok(core)
    }

    /// Assembles a core from an existing database and catalog source without scanning.
    pub fn with_parts(
        config: CoreConfig,
        db: Database,
        catalog: Arc<dyn CatalogSource>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let pool = DatasetPool::new(db.clone(), catalog);
        let recorder = HistoryRecorder::new(db.clone(), config.change_epsilon);
        let subjects = SubjectRegistry::new(db.clone(), config.datasets_per_subject);

        Ok(Self {
            config: Arc::new(config),
            db,
            pool,
            recorder,
            subjects,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pool(&self) -> &DatasetPool {
        &self.pool
    }

    pub fn recorder(&self) -> &HistoryRecorder {
        &self.recorder
    }

    pub fn subjects(&self) -> &SubjectRegistry {
        &self.subjects
    }

    /// Parses a row stream on the blocking pool and records the result.
    ///
    /// A stream that is still unread after the configured read timeout
    /// yields an empty ingestion, the same as an unreadable dataset file.
    pub async fn ingest_source<R>(&self, subject_id: SubjectId, source: R) -> CoreResult<Ingestion>
    where
        R: BufRead + Send + 'static,
    {
        let parsed = read_frames(
            Path::new(STREAM_LABEL),
            move || Ok(source),
            self.config.grid_width,
            self.config.field_delimiter,
            self.config.read_timeout(),
        )
        .await;

        match parsed {
            Ok(loaded) => self.store_frames(subject_id, loaded.frames, loaded.stats).await,
            Err(err @ CoreError::SourceUnavailable { .. }) => {
                log_warn!("subject {subject_id}: {err}");
                Ok(Ingestion {
                    stats: ParseStats::default(),
                    snapshot: None,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Ingests one dataset file. An unreadable file yields an empty ingestion.
    pub async fn ingest_dataset(&self, subject_id: SubjectId, path: &Path) -> CoreResult<Ingestion> {
        let loaded = load_dataset_or_empty(
            path,
            self.config.grid_width,
            self.config.field_delimiter,
            self.config.read_timeout(),
        )
        .await;
        self.store_frames(subject_id, loaded.frames, loaded.stats).await
    }

    /// Ingests every dataset bound to the subject, one measurement per dataset.
    pub async fn ingest_bound_datasets(&self, subject_id: SubjectId) -> CoreResult<Vec<Ingestion>> {
        let paths = self
            .pool
            .datasets_for_subject(subject_id)
            .await?
            .into_iter()
            .map(|dataset| dataset.path)
            .collect();
        let loaded = load_datasets(
            paths,
            self.config.grid_width,
            self.config.field_delimiter,
            self.config.read_timeout(),
        )
        .await;

        let mut ingested = Vec::with_capacity(loaded.len());
        for dataset in loaded {
            ingested.push(self.store_frames(subject_id, dataset.frames, dataset.stats).await?);
        }
        Ok(ingested)
    }

    async fn store_frames(
        &self,
        subject_id: SubjectId,
        frames: Vec<Frame>,
        stats: ParseStats,
    ) -> CoreResult<Ingestion> {
        if frames.is_empty() {
            log_warn!("no frames to record for subject {subject_id}");
            return Ok(Ingestion {
                stats,
                snapshot: None,
            });
        }

        let measurement = Measurement::from_frames(subject_id, &frames, Utc::now())?;
        let snapshot = self.recorder.record(measurement).await?;
        Ok(Ingestion {
            stats,
            snapshot: Some(snapshot),
        })
    }

    /// Replay feeds for the subject's datasets, in allocation order.
    ///
    /// A preview covers the first dataset only, capped at the preview frame
    /// limit. Datasets without frames are left out.
    pub async fn replay_feeds(&self, subject_id: SubjectId, preview: bool) -> CoreResult<Vec<ReplayFeed>> {
        let mut datasets = self.pool.datasets_for_subject(subject_id).await?;
        if preview {
            datasets.truncate(1);
        }
        let frame_limit = preview.then_some(self.config.preview_frame_limit);

        let loaded = load_datasets(
            datasets.into_iter().map(|dataset| dataset.path).collect(),
            self.config.grid_width,
            self.config.field_delimiter,
            self.config.read_timeout(),
        )
        .await;

        let feeds: Vec<ReplayFeed> = loaded
            .into_iter()
            .filter_map(|dataset| {
                ReplayFeed::from_dataset(
                    dataset,
                    self.config.replay_fps,
                    self.config.refresh_ms,
                    frame_limit,
                )
            })
            .collect();

        log_info!("prepared {} replay feeds for subject {subject_id}", feeds.len());
        Ok(feeds)
    }

    /// One auto-refresh tick: takes the cursor's next frame through the change gate.
    pub async fn capture_frame(
        &self,
        session: &mut CaptureSession,
        cursor: &mut ReplayCursor,
    ) -> CoreResult<Option<RecordedSnapshot>> {
        let Some(frame) = cursor.advance().cloned() else {
            return Ok(None);
        };
        self.recorder.capture(session, &[frame], Utc::now()).await
    }

    /// Newest alerts for the dashboard list.
    pub async fn recent_alerts(&self, subject_id: SubjectId) -> CoreResult<Vec<Alert>> {
        self.recorder
            .list_alerts(subject_id, self.config.alert_list_limit)
            .await
    }

    /// Whether the subject's latest measurement should raise the clinician banner.
    pub async fn requires_attention(&self, subject_id: SubjectId) -> CoreResult<bool> {
        Ok(self
            .recorder
            .latest_measurement(subject_id)
            .await?
            .map_or(false, |measurement| requires_attention(measurement.kpis.peak)))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::{BufReader, Cursor, Read},
        path::PathBuf,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::alerts::AlertTier;

    fn row(value: &str, fields: usize) -> String {
        vec![value; fields].join(",")
    }

    /// 32 good rows of `value`, then 32 rows one field short.
    fn dataset_text(value: &str) -> String {
        let mut lines = Vec::new();
        for _ in 0..32 {
            lines.push(row(value, 32));
        }
        for _ in 0..32 {
            lines.push(row(value, 31));
        }
        lines.join("\n")
    }

    fn config_in(dir: &Path) -> CoreConfig {
        CoreConfig {
            catalog_dir: dir.join("datasets"),
            database_path: dir.join("db").join("core.sqlite3"),
            ..CoreConfig::default()
        }
    }

    fn write_datasets(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
        let catalog = dir.join("datasets");
        fs::create_dir_all(&catalog).unwrap();
        for (name, contents) in files {
            fs::write(catalog.join(name), contents).unwrap();
        }
        catalog
    }

    #[tokio::test]
    async fn ingests_one_good_group_and_drops_the_malformed_one() {
        let dir = tempfile::tempdir().unwrap();
        let core = PressureCore::open(config_in(dir.path())).await.unwrap();
        core.subjects().register_subject(1).await.unwrap();

        let source = Cursor::new(dataset_text("100").into_bytes());
        let ingestion = core.ingest_source(1, source).await.unwrap();

        assert_eq!(ingestion.stats.frames, 1);
        assert_eq!(ingestion.stats.rejected_rows, 32);
        assert_eq!(ingestion.stats.dropped_groups, 1);

        let snapshot = ingestion.snapshot.as_ref().unwrap();
        let kpis = &snapshot.entry.measurement.kpis;
        assert_eq!(kpis.peak, 100.0);
        assert_eq!(kpis.low_above_zero, 100.0);
        assert_eq!(kpis.avg, 100.0);
        assert_eq!(kpis.contact_area, 100.0);

        let alert = ingestion.alert().unwrap();
        assert_eq!(alert.tier, AlertTier::Low);
        assert!(!alert.is_critical);
        assert!(alert.message.starts_with("Low pressure detected"));
    }

    #[tokio::test]
    async fn registration_and_replay_use_the_directory_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let text = dataset_text("50");
        write_datasets(
            dir.path(),
            &[
                ("a.csv", text.as_str()),
                ("b.csv", text.as_str()),
                ("c.csv", ""),
                ("d.csv", text.as_str()),
                ("e.csv", text.as_str()),
                ("ignored.txt", text.as_str()),
            ],
        );
        let core = PressureCore::open(config_in(dir.path())).await.unwrap();
        assert_eq!(core.pool().available_count().await.unwrap(), 5);

        let first = core.subjects().register_subject(1).await.unwrap();
        let second = core.subjects().register_subject(2).await.unwrap();
        assert_eq!(first.datasets.len(), 3);
        assert_eq!(second.datasets.len(), 2);
        assert_eq!(core.pool().available_count().await.unwrap(), 0);

        // c.csv has no frames and is left out of the feed list.
        let feeds = core.replay_feeds(1, false).await.unwrap();
        let names: Vec<_> = feeds.iter().map(|feed| feed.file_name.as_str()).collect();
        assert_eq!(names, ["a.csv", "b.csv"]);
        assert_eq!(feeds[0].total_frames, 1);
        assert_eq!(feeds[0].refresh_ms, 3_000);

        let preview = core.replay_feeds(2, true).await.unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].file_name, "d.csv");

        let ingested = core.ingest_bound_datasets(1).await.unwrap();
        assert_eq!(ingested.len(), 3);
        assert_eq!(ingested.iter().filter(|i| i.snapshot.is_some()).count(), 2);
        assert_eq!(core.recorder().list(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_dataset_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let core = PressureCore::open(config_in(dir.path())).await.unwrap();
        core.subjects().register_subject(1).await.unwrap();

        let ingestion = core
            .ingest_dataset(1, &dir.path().join("nowhere.csv"))
            .await
            .unwrap();
        assert!(ingestion.snapshot.is_none());
        assert!(core.recorder().list(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn auto_refresh_skips_repeated_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut text = dataset_text("100");
        text.push('\n');
        for _ in 0..64 {
            text.push_str(&row("500", 32));
            text.push('\n');
        }
        write_datasets(dir.path(), &[("walk.csv", text.as_str())]);
        let core = PressureCore::open(config_in(dir.path())).await.unwrap();
        core.subjects().register_subject(4).await.unwrap();

        let feed = core.replay_feeds(4, false).await.unwrap().remove(0);
        assert_eq!(feed.total_frames, 3);
        let mut cursor = ReplayCursor::new(feed);
        let mut session = CaptureSession::new(4);

        // Frames cycle 100, 500, 500; the second 500 matches the last save.
        let mut ticks = Vec::new();
        for _ in 0..5 {
            let saved = core.capture_frame(&mut session, &mut cursor).await.unwrap();
            ticks.push(saved.map(|snapshot| snapshot.entry.measurement.kpis.peak));
        }
        assert_eq!(
            ticks,
            [Some(100.0), Some(500.0), None, Some(100.0), Some(500.0)]
        );
        assert_eq!(session.saved(), 4);
        assert_eq!(session.skipped(), 1);
        assert!(core.requires_attention(4).await.unwrap());

        let alerts = core.recent_alerts(4).await.unwrap();
        assert_eq!(alerts.len(), 4);
        assert!(alerts[0].is_critical);
        assert_eq!(core.recorder().list(4).await.unwrap().len(), 4);
    }

    /// Holds its reader back for `stall` before reporting end of input.
    struct StalledStream {
        stall: Duration,
    }

    impl Read for StalledStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(self.stall);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn stalled_stream_yields_empty_ingestion() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            read_timeout_ms: 30,
            ..config_in(dir.path())
        };
        let core = PressureCore::open(config).await.unwrap();
        core.subjects().register_subject(1).await.unwrap();

        let started = Instant::now();
        let stream = BufReader::new(StalledStream {
            stall: Duration::from_millis(500),
        });
        let ingestion = core.ingest_source(1, stream).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(ingestion.snapshot.is_none());
        assert_eq!(ingestion.stats, ParseStats::default());
        assert!(core.recorder().list(1).await.unwrap().is_empty());
    }
}
