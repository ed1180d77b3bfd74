//! Measurement data model.
//!
//! One capture event for one subject: the aggregate KPIs of its frame set
//! plus three serialized views kept for the dashboard (the frame set itself,
//! the first frame as a flat heat-map array, and the per-frame peak series).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubjectId;
use crate::frames::{Frame, Kpis};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub id: Option<i64>,
    pub subject_id: SubjectId,
    #[serde(flatten)]
    pub kpis: Kpis,
    pub frame_count: usize,
    /// JSON array of `{values, peakPressure, lowPressure, avgPressure, contactArea}`.
    pub frame_data: String,
    /// JSON array with the first frame's cells, row-major.
    pub heatmap_data: String,
    /// JSON array of frame peaks in capture order.
    pub line_chart_data: String,
    pub measured_at: DateTime<Utc>,
}

impl Measurement {
    /// Derives KPIs and serialized views from a frame set.
    ///
    /// An empty frame set is valid and produces zero KPIs with empty arrays.
    pub fn from_frames(
        subject_id: SubjectId,
        frames: &[Frame],
        measured_at: DateTime<Utc>,
    ) -> Result<Self> {
        let kpis = Kpis::aggregate(frames);
        let frame_data =
            serde_json::to_string(frames).context("failed to serialize frame set")?;
        let heatmap: &[f64] = frames.first().map(Frame::values).unwrap_or(&[]);
        let heatmap_data =
            serde_json::to_string(heatmap).context("failed to serialize heat map")?;
        let peaks: Vec<f64> = frames.iter().map(|frame| frame.kpis().peak).collect();
        let line_chart_data =
            serde_json::to_string(&peaks).context("failed to serialize peak series")?;

        Ok(Self {
            id: None,
            subject_id,
            kpis,
            frame_count: frames.len(),
            frame_data,
            heatmap_data,
            line_chart_data,
            measured_at,
        })
    }

    pub fn heatmap(&self) -> Result<Vec<f64>> {
        serde_json::from_str(&self.heatmap_data).context("stored heat map is not a number array")
    }

    pub fn peak_series(&self) -> Result<Vec<f64>> {
        serde_json::from_str(&self.line_chart_data)
            .context("stored peak series is not a number array")
    }
}
