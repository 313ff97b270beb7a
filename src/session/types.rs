use std::fmt;
use std::time::Instant;

use crate::device::types::{Channel, ChannelSample, DeviceDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    AwaitingSelection,
    Connecting,
    Streaming,
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::AwaitingSelection => "awaiting selection",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
        };

        write!(f, "{}", result)
    }
}

/// Reliability of a channel value. The device reports 0 for a good contact;
/// higher values mean more noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQuality {
    Good,
    Poor(u8),
    VeryPoor(u8),
    Unknown,
    /// The meditation value was outside [0, 100] and has been clamped.
    OutOfRange,
}

impl SignalQuality {
    pub fn from_raw(raw: Option<u8>) -> Self {
        match raw {
            None => SignalQuality::Unknown,
            Some(0) => SignalQuality::Good,
            Some(value @ 1..=50) => SignalQuality::Poor(value),
            Some(value) => SignalQuality::VeryPoor(value),
        }
    }

    pub fn is_good(&self) -> bool {
        *self == SignalQuality::Good
    }

    pub fn is_degraded(&self) -> bool {
        *self == SignalQuality::OutOfRange
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalQuality::Good => write!(f, "Good"),
            SignalQuality::Poor(value) => write!(f, "Poor ({})", value),
            SignalQuality::VeryPoor(value) => write!(f, "Very Poor ({})", value),
            SignalQuality::Unknown => write!(f, "Unknown"),
            SignalQuality::OutOfRange => write!(f, "Out of range"),
        }
    }
}

/// A telemetry frame stamped with the session clock on arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: Instant,
    pub left: Option<ChannelSample>,
    pub right: Option<ChannelSample>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStress {
    pub stress: f32,
    pub meditation: f32,
    pub attention: Option<u8>,
    pub quality: SignalQuality,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressReading {
    pub sequence: u64,
    pub timestamp: Instant,
    pub left: Option<ChannelStress>,
    pub right: Option<ChannelStress>,
}

impl StressReading {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelStress> {
        match channel {
            Channel::Left => self.left.as_ref(),
            Channel::Right => self.right.as_ref(),
        }
    }
}

/// Mean stress per channel over one closed window. A channel without readings
/// in the window has no mean.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalAggregate {
    pub index: u64,
    pub start: Instant,
    pub end: Instant,
    pub left: Option<f32>,
    pub right: Option<f32>,
    pub left_count: u32,
    pub right_count: u32,
}

impl IntervalAggregate {
    pub fn channel(&self, channel: Channel) -> Option<f32> {
        match channel {
            Channel::Left => self.left,
            Channel::Right => self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { state: SessionState, reason: Option<String> },
    DeviceDiscovered(DeviceDescriptor),
    Reading(StressReading),
    Aggregate(IntervalAggregate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_quality_bands() {
        assert_eq!(SignalQuality::from_raw(Some(0)), SignalQuality::Good);
        assert_eq!(SignalQuality::from_raw(Some(1)), SignalQuality::Poor(1));
        assert_eq!(SignalQuality::from_raw(Some(50)), SignalQuality::Poor(50));
        assert_eq!(SignalQuality::from_raw(Some(51)), SignalQuality::VeryPoor(51));
        assert_eq!(SignalQuality::from_raw(Some(200)), SignalQuality::VeryPoor(200));
        assert_eq!(SignalQuality::from_raw(None), SignalQuality::Unknown);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Disconnected.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
    }
}
