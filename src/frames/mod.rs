//! Pressure frames: square grids of readings cut from fixed-width text rows.

pub mod kpi;
pub mod loader;
pub mod parser;

use anyhow::{bail, Result};
use serde::Serialize;

pub use kpi::{KpiTriple, Kpis};
pub use loader::{load_dataset, load_dataset_or_empty, load_datasets, read_frames, DatasetFrames};
pub use parser::{FrameReader, ParseStats};

/// One immutable `width` x `width` grid with its KPIs computed at build time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(skip)]
    width: usize,
    values: Vec<f64>,
    #[serde(flatten)]
    kpis: Kpis,
}

impl Frame {
    /// Builds a frame, refusing anything that is not exactly `width * width` cells.
    pub fn from_values(width: usize, values: Vec<f64>) -> Result<Self> {
        if width == 0 {
            bail!("frame width must be positive");
        }
        let Some(cells) = width.checked_mul(width) else {
            bail!("frame width {width} is too large");
        };
        if values.len() != cells {
            bail!(
                "frame needs {cells} values for a {width}x{width} grid, got {}",
                values.len()
            );
        }
        let kpis = Kpis::from_values(&values);
        Ok(Self { width, values, kpis })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn kpis(&self) -> &Kpis {
        &self.kpis
    }

    /// Row-major cell access.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.width || col >= self.width {
            return None;
        }
        self.values.get(row * self.width + col).copied()
    }
}
