use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::task::JoinSet;

use super::{Frame, FrameReader, ParseStats};
use crate::error::{CoreError, CoreResult};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Every frame parsed out of one dataset file.
#[derive(Debug, Clone)]
pub struct DatasetFrames {
    pub path: PathBuf,
    pub frames: Vec<Frame>,
    pub stats: ParseStats,
}

impl DatasetFrames {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            frames: Vec::new(),
            stats: ParseStats::default(),
        }
    }
}

/// Parses whatever `open` yields on the blocking pool, giving up after `timeout`.
///
/// `path` labels the source in results and errors. Failing to open, a reader
/// task panic, or an elapsed timeout is reported as
/// [`CoreError::SourceUnavailable`]. A timed-out read keeps running on its
/// blocking thread until the source is exhausted; its result is discarded.
pub async fn read_frames<R, F>(
    path: &Path,
    open: F,
    width: usize,
    delimiter: char,
    timeout: Duration,
) -> CoreResult<DatasetFrames>
where
    R: BufRead,
    F: FnOnce() -> std::io::Result<R> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || -> std::io::Result<(Vec<Frame>, ParseStats)> {
        let source = open()?;
        Ok(FrameReader::new(source, width, delimiter).read_all())
    });

    let unavailable = |reason: String| CoreError::SourceUnavailable {
        path: path.to_path_buf(),
        reason,
    };

    let (frames, stats) = match tokio::time::timeout(timeout, task).await {
        Err(_) => {
            return Err(unavailable(format!(
                "read timed out after {}ms",
                timeout.as_millis()
            )))
        }
        Ok(Err(join_err)) => return Err(unavailable(format!("reader task failed: {join_err}"))),
        Ok(Ok(Err(io_err))) => return Err(unavailable(io_err.to_string())),
        Ok(Ok(Ok(parsed))) => parsed,
    };

    if stats.rejected_rows > 0 || stats.dropped_groups > 0 {
        log_warn!(
            "{}: {} rows rejected, {} incomplete groups dropped, {} frames kept",
            path.display(),
            stats.rejected_rows,
            stats.dropped_groups,
            stats.frames
        );
    } else {
        log_debug!("{}: parsed {} frames", path.display(), stats.frames);
    }

    Ok(DatasetFrames {
        path: path.to_path_buf(),
        frames,
        stats,
    })
}

/// Parses a dataset file with [`read_frames`].
pub async fn load_dataset(
    path: &Path,
    width: usize,
    delimiter: char,
    timeout: Duration,
) -> CoreResult<DatasetFrames> {
    let owned = path.to_path_buf();
    read_frames(
        path,
        move || File::open(owned).map(BufReader::new),
        width,
        delimiter,
        timeout,
    )
    .await
}

/// Like [`load_dataset`] but degrades an unavailable source to an empty result.
pub async fn load_dataset_or_empty(
    path: &Path,
    width: usize,
    delimiter: char,
    timeout: Duration,
) -> DatasetFrames {
    match load_dataset(path, width, delimiter, timeout).await {
        Ok(loaded) => loaded,
        Err(err) => {
            log_warn!("skipping dataset: {err}");
            DatasetFrames::empty(path.to_path_buf())
        }
    }
}

/// Loads several datasets concurrently, preserving input order.
///
/// Unavailable sources come back empty; the others are unaffected.
pub async fn load_datasets(
    paths: Vec<PathBuf>,
    width: usize,
    delimiter: char,
    timeout: Duration,
) -> Vec<DatasetFrames> {
    let mut tasks = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        tasks.spawn(async move {
            let loaded = load_dataset_or_empty(&path, width, delimiter, timeout).await;
            (index, loaded)
        });
    }

    let mut slots: Vec<Option<DatasetFrames>> = vec![None; paths.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, loaded)) => slots[index] = Some(loaded),
            Err(err) => log_warn!("dataset load task failed: {err}"),
        }
    }

    slots
        .into_iter()
        .zip(paths)
        .map(|(slot, path)| slot.unwrap_or_else(|| DatasetFrames::empty(path)))
        .collect()
}
