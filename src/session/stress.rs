use std::fmt;

use crate::device::constants::{METRIC_MAX, METRIC_MIN};
use crate::device::types::ChannelSample;
use crate::session::types::{ChannelStress, SignalQuality};

/// Derives the stress value of one channel: `100 - meditation`.
///
/// Meditation values outside [0, 100] are clamped instead of rejected, so a
/// transient bad packet does not stall the live feed; the result is flagged
/// with [`SignalQuality::OutOfRange`].
pub fn derive_stress(sample: &ChannelSample) -> ChannelStress {
    let raw = sample.meditation;
    let meditation = if raw.is_nan() { METRIC_MIN } else { raw.clamp(METRIC_MIN, METRIC_MAX) };

    let quality = if raw.is_nan() || meditation != raw {
        SignalQuality::OutOfRange
    } else {
        SignalQuality::from_raw(sample.signal_quality)
    };

    ChannelStress {
        stress: METRIC_MAX - meditation,
        meditation,
        attention: sample.attention,
        quality,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressCategory {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl StressCategory {
    pub fn from_value(stress: f32) -> Self {
        if stress < 20.0 {
            StressCategory::VeryLow
        } else if stress < 40.0 {
            StressCategory::Low
        } else if stress < 60.0 {
            StressCategory::Moderate
        } else if stress < 80.0 {
            StressCategory::High
        } else {
            StressCategory::VeryHigh
        }
    }
}

impl fmt::Display for StressCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            StressCategory::VeryLow => "Very Low",
            StressCategory::Low => "Low",
            StressCategory::Moderate => "Moderate",
            StressCategory::High => "High",
            StressCategory::VeryHigh => "Very High",
        };

        write!(f, "{}", result)
    }
}
