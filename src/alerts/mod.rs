//! Severity tiers derived from peak pressure.
//!
//! Boundaries are inclusive upper bounds checked in order: exactly 0 is
//! very low, up to 250 low, up to 420 medium, anything above is high and
//! critical. The clinician banner uses the same 420 cut-off.

use serde::{Deserialize, Serialize};

/// Upper bound of the low tier (inclusive).
pub const LOW_PRESSURE_MAX: f64 = 250.0;
/// Upper bound of the medium tier (inclusive). Above this is critical.
pub const MEDIUM_PRESSURE_MAX: f64 = 420.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertTier {
    VeryLow,
    Low,
    Medium,
    High,
}

impl AlertTier {
    pub fn for_peak(peak: f64) -> Self {
        if peak == 0.0 {
            AlertTier::VeryLow
        } else if peak <= LOW_PRESSURE_MAX {
            AlertTier::Low
        } else if peak <= MEDIUM_PRESSURE_MAX {
            AlertTier::Medium
        } else {
            AlertTier::High
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            AlertTier::VeryLow => "Very Low pressure detected",
            AlertTier::Low => "Low pressure detected",
            AlertTier::Medium => "Medium pressure detected",
            AlertTier::High => "High pressure detected",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, AlertTier::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTier::VeryLow => "veryLow",
            AlertTier::Low => "low",
            AlertTier::Medium => "medium",
            AlertTier::High => "high",
        }
    }
}

/// Outcome of classifying one peak value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub tier: AlertTier,
    pub message: String,
    pub is_critical: bool,
}

/// Maps a peak pressure to its tier and the message stored on the alert.
pub fn classify(peak: f64) -> Classification {
    let tier = AlertTier::for_peak(peak);
    let detail = match tier {
        AlertTier::VeryLow => "Peak pressure is 0 mmHg.".to_string(),
        AlertTier::Low => format!("Peak pressure {peak} mmHg is between 1-250 mmHg."),
        AlertTier::Medium => format!("Peak pressure {peak} mmHg is between 251-420 mmHg."),
        AlertTier::High => format!("Peak pressure {peak} mmHg exceeds 420 mmHg."),
    };

    Classification {
        tier,
        message: format!("{}: {detail}", tier.headline()),
        is_critical: tier.is_critical(),
    }
}

/// Whether the clinician dashboard should raise its high-pressure banner.
pub fn requires_attention(peak: f64) -> bool {
    peak > MEDIUM_PRESSURE_MAX
}
