//! Frame and measurement KPIs.
//!
//! Per frame: peak is the maximum reading, `low_above_zero` the smallest
//! strictly positive reading (0 when nothing is positive), `avg` the mean of
//! every cell and `contact_area` the share of positive cells as a percentage.
//!
//! Across a frame set, peak is the max of frame peaks, avg and contact area
//! are means of the per-frame values, and `low_above_zero` pools every raw
//! reading of every frame before taking the positive minimum.

use serde::{Deserialize, Serialize};

use super::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    #[serde(rename = "peakPressure")]
    pub peak: f64,
    #[serde(rename = "lowPressure")]
    pub low_above_zero: f64,
    #[serde(rename = "avgPressure")]
    pub avg: f64,
    pub contact_area: f64,
}

impl Kpis {
    /// KPIs of a single grid. An empty slice yields all zeros.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut peak = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut positive = 0usize;
        for &value in values {
            if value > peak {
                peak = value;
            }
            sum += value;
            if value > 0.0 {
                positive += 1;
            }
        }

        let cells = values.len() as f64;
        Self {
            peak,
            low_above_zero: min_positive(values.iter().copied()),
            avg: sum / cells,
            contact_area: positive as f64 / cells * 100.0,
        }
    }

    /// Aggregate over a frame set. No frames yields all zeros.
    pub fn aggregate(frames: &[Frame]) -> Self {
        if frames.is_empty() {
            return Self::default();
        }

        let count = frames.len() as f64;
        let peak = frames
            .iter()
            .map(|frame| frame.kpis().peak)
            .fold(f64::NEG_INFINITY, f64::max);
        let avg = frames.iter().map(|frame| frame.kpis().avg).sum::<f64>() / count;
        let contact_area = frames
            .iter()
            .map(|frame| frame.kpis().contact_area)
            .sum::<f64>()
            / count;
        let low_above_zero =
            min_positive(frames.iter().flat_map(|frame| frame.values().iter().copied()));

        Self {
            peak,
            low_above_zero,
            avg,
            contact_area,
        }
    }

    pub fn triple(&self) -> KpiTriple {
        KpiTriple {
            peak: self.peak,
            contact_area: self.contact_area,
            avg: self.avg,
        }
    }
}

/// The three KPIs compared by the history change gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpiTriple {
    pub peak: f64,
    pub contact_area: f64,
    pub avg: f64,
}

impl KpiTriple {
    /// True when every component moved by less than `epsilon`.
    pub fn within(&self, other: &KpiTriple, epsilon: f64) -> bool {
        (self.peak - other.peak).abs() < epsilon
            && (self.contact_area - other.contact_area).abs() < epsilon
            && (self.avg - other.avg).abs() < epsilon
    }
}

fn min_positive(values: impl Iterator<Item = f64>) -> f64 {
    values
        .filter(|value| *value > 0.0)
        .fold(None, |acc: Option<f64>, value| match acc {
            Some(current) if current <= value => Some(current),
            _ => Some(value),
        })
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(values: Vec<f64>) -> Frame {
        Frame::from_values(2, values).unwrap()
    }

    #[test]
    fn uniform_grid() {
        let kpis = Kpis::from_values(&[100.0; 1024]);
        assert_eq!(kpis.peak, 100.0);
        assert_eq!(kpis.low_above_zero, 100.0);
        assert_eq!(kpis.avg, 100.0);
        assert_eq!(kpis.contact_area, 100.0);
    }

    #[test]
    fn all_zero_grid_has_zero_low() {
        let kpis = Kpis::from_values(&[0.0; 1024]);
        assert_eq!(kpis.peak, 0.0);
        assert_eq!(kpis.low_above_zero, 0.0);
        assert_eq!(kpis.avg, 0.0);
        assert_eq!(kpis.contact_area, 0.0);
    }

    #[test]
    fn low_ignores_zero_cells() {
        let mut values = vec![0.0; 1024];
        values[3] = 12.5;
        values[700] = 300.0;
        values[900] = 7.0;
        let kpis = Kpis::from_values(&values);
        assert_eq!(kpis.peak, 300.0);
        assert_eq!(kpis.low_above_zero, 7.0);
        assert!((kpis.contact_area - 3.0 / 1024.0 * 100.0).abs() < 1e-12);
        assert!((kpis.avg - 319.5 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_hold_for_non_negative_grids() {
        // Deterministic pseudo-random fill, values in [0, 500).
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..50 {
            let values: Vec<f64> = (0..1024)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 7;
                    seed ^= seed << 17;
                    let raw = (seed % 1000) as f64 / 2.0;
                    if raw < 120.0 { 0.0 } else { raw }
                })
                .collect();
            let kpis = Kpis::from_values(&values);
            assert!(kpis.peak >= kpis.avg);
            assert!(kpis.avg >= 0.0);
            assert!((0.0..=100.0).contains(&kpis.contact_area));
            if kpis.peak > 0.0 {
                assert!(kpis.peak >= kpis.low_above_zero);
                assert!(kpis.low_above_zero > 0.0);
            }
        }
    }

    #[test]
    fn aggregate_pools_raw_values_for_low() {
        let first = frame_of(vec![0.0, 40.0, 50.0, 60.0]);
        let second = frame_of(vec![0.0, 0.0, 5.0, 200.0]);
        let kpis = Kpis::aggregate(&[first.clone(), second.clone()]);

        assert_eq!(kpis.peak, 200.0);
        assert_eq!(kpis.low_above_zero, 5.0);
        assert_eq!(kpis.avg, (first.kpis().avg + second.kpis().avg) / 2.0);
        assert_eq!(kpis.contact_area, (75.0 + 50.0) / 2.0);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        assert_eq!(Kpis::aggregate(&[]), Kpis::default());
    }

    #[test]
    fn aggregate_of_silent_frames_has_zero_low() {
        let frames = vec![frame_of(vec![0.0; 4]), frame_of(vec![0.0; 4])];
        assert_eq!(Kpis::aggregate(&frames).low_above_zero, 0.0);
    }

    #[test]
    fn triple_within_epsilon() {
        let base = KpiTriple { peak: 100.0, contact_area: 50.0, avg: 20.0 };
        let near = KpiTriple { peak: 100.9, contact_area: 49.5, avg: 20.2 };
        let far_peak = KpiTriple { peak: 101.5, ..near };
        assert!(base.within(&near, 1.0));
        assert!(!base.within(&far_peak, 1.0));
    }
}
