//! Dashboard replay of pre-recorded datasets.

use std::path::Path;

use serde::Serialize;

use crate::frames::{DatasetFrames, Frame};

/// One dataset's frames plus the timing the dashboard animates them with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFeed {
    pub file_name: String,
    pub frames: Vec<Frame>,
    pub total_frames: usize,
    /// Seconds of recording at the configured frame rate.
    pub total_time: f64,
    pub refresh_ms: u64,
}

impl ReplayFeed {
    /// Builds a feed, keeping at most `frame_limit` frames when given.
    ///
    /// Returns `None` for a dataset with no frames so it can be left out.
    pub fn from_dataset(
        dataset: DatasetFrames,
        fps: f64,
        refresh_ms: u64,
        frame_limit: Option<usize>,
    ) -> Option<Self> {
        let mut frames = dataset.frames;
        if let Some(limit) = frame_limit {
            frames.truncate(limit);
        }
        if frames.is_empty() {
            return None;
        }

        let total_frames = frames.len();
        Some(Self {
            file_name: file_name_of(&dataset.path),
            frames,
            total_frames,
            total_time: total_frames as f64 / fps,
            refresh_ms,
        })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Walks a feed's frames in a loop, one per refresh tick.
#[derive(Debug, Clone)]
pub struct ReplayCursor {
    feed: ReplayFeed,
    position: usize,
}

impl ReplayCursor {
    pub fn new(feed: ReplayFeed) -> Self {
        Self { feed, position: 0 }
    }

    pub fn feed(&self) -> &ReplayFeed {
        &self.feed
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<&Frame> {
        self.feed.frames.get(self.position)
    }

    /// Returns the current frame and moves to the next, wrapping at the end.
    pub fn advance(&mut self) -> Option<&Frame> {
        let len = self.feed.frames.len();
        if len == 0 {
            return None;
        }
        let index = self.position % len;
        self.position = (index + 1) % len;
        self.feed.frames.get(index)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::frames::ParseStats;

    fn dataset(count: usize) -> DatasetFrames {
        let frames = (0..count)
            .map(|i| Frame::from_values(2, vec![i as f64; 4]).unwrap())
            .collect();
        DatasetFrames {
            path: PathBuf::from("/data/session_a.csv"),
            frames,
            stats: ParseStats::default(),
        }
    }

    #[test]
    fn timing_follows_frame_rate() {
        let feed = ReplayFeed::from_dataset(dataset(30), 15.0, 3_000, None).unwrap();
        assert_eq!(feed.file_name, "session_a.csv");
        assert_eq!(feed.total_frames, 30);
        assert_eq!(feed.total_time, 2.0);
        assert_eq!(feed.refresh_ms, 3_000);

        let json = serde_json::to_value(&feed).unwrap();
        assert_eq!(json["totalFrames"], 30);
        assert_eq!(json["frames"][1]["peakPressure"], 1.0);
    }

    #[test]
    fn preview_limit_caps_frames() {
        let feed = ReplayFeed::from_dataset(dataset(25), 15.0, 3_000, Some(10)).unwrap();
        assert_eq!(feed.total_frames, 10);
        assert!(ReplayFeed::from_dataset(dataset(0), 15.0, 3_000, None).is_none());
    }

    #[test]
    fn cursor_wraps_around() {
        let feed = ReplayFeed::from_dataset(dataset(3), 15.0, 3_000, None).unwrap();
        let mut cursor = ReplayCursor::new(feed);

        let peaks: Vec<f64> = (0..5)
            .map(|_| cursor.advance().unwrap().kpis().peak)
            .collect();
        assert_eq!(peaks, vec![0.0, 1.0, 2.0, 0.0, 1.0]);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.current().unwrap().kpis().peak, 2.0);
    }
}
