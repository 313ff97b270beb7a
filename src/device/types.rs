use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub address: String,
    pub name: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        DeviceDescriptor { address: address.into(), name }
    }

    pub fn matches_name(&self, filter: &str) -> bool {
        let filter = filter.to_lowercase();
        self.name.as_ref().map_or(false, |name| name.to_lowercase().contains(&filter))
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name.as_deref().unwrap_or("Unknown"), self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Channel::Left => "Left",
            Channel::Right => "Right",
        };

        write!(f, "{}", result)
    }
}

/// One decoded packet of a single channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSample {
    pub meditation: f32,
    pub attention: Option<u8>,
    pub signal_quality: Option<u8>,
}

impl ChannelSample {
    pub fn new(meditation: f32) -> Self {
        ChannelSample { meditation, attention: None, signal_quality: None }
    }
}

/// What the BLE stack delivers per notification: either or both channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryFrame {
    pub left: Option<ChannelSample>,
    pub right: Option<ChannelSample>,
}

impl TelemetryFrame {
    pub fn pair(left: ChannelSample, right: ChannelSample) -> Self {
        TelemetryFrame { left: Some(left), right: Some(right) }
    }

    pub fn single(channel: Channel, sample: ChannelSample) -> Self {
        match channel {
            Channel::Left => TelemetryFrame { left: Some(sample), right: None },
            Channel::Right => TelemetryFrame { left: None, right: Some(sample) },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_filter_is_case_insensitive() {
        let device = DeviceDescriptor::new("AA:BB:CC:DD:EE:FF", Some("Mirolab MindEase".into()));
        assert!(device.matches_name("mindease"));
        assert!(!device.matches_name("muse"));
        assert!(!DeviceDescriptor::new("AA:BB:CC:DD:EE:FF", None).matches_name("mindease"));
    }

    #[test]
    fn display_falls_back_to_unknown() {
        let device = DeviceDescriptor::new("11:22:33:44:55:66", None);
        assert_eq!(device.to_string(), "Unknown (11:22:33:44:55:66)");
    }
}
