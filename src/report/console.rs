use futures::StreamExt;
use futures::channel::mpsc::Receiver;
use log::info;
use tokio::spawn;
use tokio::task::JoinHandle;

use crate::config::types::Config;
use crate::device::types::Channel;
use crate::report::history::{AggregateHistory, LiveWindow};
use crate::session::stress::StressCategory;
use crate::session::types::{IntervalAggregate, SessionEvent, SessionState, SignalQuality, StressReading};

const BAR_WIDTH: usize = 20;

fn bar(value: f32) -> String {
    let filled = ((value.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f32).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

// one glyph per value, oldest first
fn sparkline(values: &[f32]) -> String {
    values.iter()
        .map(|value| {
            let level = (value.clamp(0.0, 100.0) / 100.0 * (SPARK_LEVELS.len() - 1) as f32).round() as usize;
            SPARK_LEVELS[level]
        })
        .collect()
}

fn format_channel(value: Option<f32>) -> String {
    match value {
        Some(value) => format!("{:>6.2} ({})", value, StressCategory::from_value(value)),
        None => "   n/a".to_string(),
    }
}

/// Turns session events into console lines: the live stress values, signal
/// quality changes, and a summary of the recent intervals.
#[derive(Debug)]
pub struct ConsoleReporter {
    live: LiveWindow,
    intervals: AggregateHistory,
    left_quality: Option<SignalQuality>,
    right_quality: Option<SignalQuality>,
}

impl ConsoleReporter {
    pub fn new(config: &Config) -> Self {
        ConsoleReporter {
            live: LiveWindow::new(config.live_window, config.good_signal_only),
            intervals: AggregateHistory::new(config.aggregate_history),
            left_quality: None,
            right_quality: None,
        }
    }

    pub fn intervals(&self) -> &AggregateHistory {
        &self.intervals
    }

    pub fn handle(&mut self, event: &SessionEvent) -> Vec<String> {
        match event {
            SessionEvent::StateChanged { state, reason } => self.state_lines(*state, reason.as_deref()),
            SessionEvent::DeviceDiscovered(device) => vec![format!("Found {}", device)],
            SessionEvent::Reading(reading) => self.reading_lines(reading),
            SessionEvent::Aggregate(aggregate) => self.aggregate_lines(aggregate),
        }
    }

    fn state_lines(&self, state: SessionState, reason: Option<&str>) -> Vec<String> {
        let line = match (state, reason) {
            (SessionState::Scanning, _) => "Scanning for devices...".to_string(),
            (SessionState::Connecting, _) => "Connecting to device...".to_string(),
            (SessionState::Streaming, _) => "Connected to device".to_string(),
            (SessionState::Disconnected, _) => "Disconnected from device".to_string(),
            (SessionState::Failed, Some(reason)) => format!("Connection error: {}", reason),
            (SessionState::Failed, None) => "Connection error".to_string(),
            _ => return Vec::new(),
        };
        vec![line]
    }

    fn quality_mut(&mut self, channel: Channel) -> &mut Option<SignalQuality> {
        match channel {
            Channel::Left => &mut self.left_quality,
            Channel::Right => &mut self.right_quality,
        }
    }

    fn reading_lines(&mut self, reading: &StressReading) -> Vec<String> {
        let mut lines = Vec::new();

        for channel in [Channel::Left, Channel::Right] {
            if let Some(value) = reading.channel(channel) {
                let previous = self.quality_mut(channel).replace(value.quality);
                if previous != Some(value.quality) {
                    lines.push(format!("{} Signal Quality: {}", channel, value.quality));
                }
            }
        }

        self.live.push(reading);

        let latest = |channel: Channel| {
            reading.channel(channel).map(|value| format!("{:>5.1}", value.stress)).unwrap_or_else(|| "    -".to_string())
        };
        lines.push(format!("Stress  Left {}  Right {}", latest(Channel::Left), latest(Channel::Right)));

        let trend = |channel: Channel| sparkline(&self.live.history(channel).values());
        lines.push(format!("Trend   Left {}  Right {}", trend(Channel::Left), trend(Channel::Right)));
        lines
    }

    fn aggregate_lines(&mut self, aggregate: &IntervalAggregate) -> Vec<String> {
        self.intervals.push(aggregate);

        let left = self.intervals.history(Channel::Left);
        let right = self.intervals.history(Channel::Right);
        let mut lines = vec![
            "Latest Interval Stress:".to_string(),
            format!("  Left: {}", format_channel(aggregate.left)),
            format!("  Right: {}", format_channel(aggregate.right)),
        ];

        for (index, (left, right)) in left.padded().into_iter().zip(right.padded()).enumerate() {
            lines.push(format!("  Int {}  L {} {:>5.1}  R {} {:>5.1}", index + 1, bar(left), left, bar(right), right));
        }
        lines
    }
}

/// Prints the session events until the session drops its side of the channel.
pub fn console_report_task(config: &Config, mut events: Receiver<SessionEvent>) -> JoinHandle<()> {
    let mut reporter = ConsoleReporter::new(config);

    spawn(async move {
        while let Some(event) = events.next().await {
            for line in reporter.handle(&event) {
                println!("{}", line);
            }
        }
        info!("Session event stream ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use crate::session::types::ChannelStress;

    fn channel(stress: f32, quality: SignalQuality) -> Option<ChannelStress> {
        Some(ChannelStress { stress, meditation: 100.0 - stress, attention: None, quality })
    }

    fn reading(left: f32, right: f32, quality: SignalQuality) -> SessionEvent {
        SessionEvent::Reading(StressReading {
            sequence: 1,
            timestamp: Instant::now(),
            left: channel(left, quality),
            right: channel(right, quality),
        })
    }

    #[test]
    fn bars_scale_with_stress() {
        assert_eq!(bar(0.0), ".".repeat(BAR_WIDTH));
        assert_eq!(bar(100.0), "#".repeat(BAR_WIDTH));
        assert_eq!(bar(50.0).matches('#').count(), BAR_WIDTH / 2);
    }

    #[test]
    fn quality_is_reported_on_change_only() {
        let mut reporter = ConsoleReporter::new(&Config::default());

        let lines = reporter.handle(&reading(30.0, 35.0, SignalQuality::Good));
        assert_eq!(lines[0], "Left Signal Quality: Good");
        assert_eq!(lines[1], "Right Signal Quality: Good");
        assert_eq!(lines[2], "Stress  Left  30.0  Right  35.0");

        let lines = reporter.handle(&reading(20.0, 40.0, SignalQuality::Good));
        assert_eq!(lines[0], "Stress  Left  20.0  Right  40.0");
        assert_eq!(lines.len(), 2);

        let lines = reporter.handle(&reading(20.0, 40.0, SignalQuality::Poor(26)));
        assert_eq!(lines[0], "Left Signal Quality: Poor (26)");
    }

    #[test]
    fn sparkline_maps_stress_to_levels() {
        assert_eq!(sparkline(&[]), "");
        assert_eq!(sparkline(&[0.0, 50.0, 100.0, 140.0]), "▁▅██");
    }

    #[test]
    fn each_reading_renders_the_live_window() {
        let mut config = Config::default();
        config.live_window = 3;
        let mut reporter = ConsoleReporter::new(&config);

        reporter.handle(&reading(0.0, 100.0, SignalQuality::Good));
        reporter.handle(&reading(30.0, 40.0, SignalQuality::Good));
        let lines = reporter.handle(&reading(20.0, 40.0, SignalQuality::Good));
        assert_eq!(lines.last().unwrap(), "Trend   Left ▁▃▂  Right █▄▄");

        let lines = reporter.handle(&reading(100.0, 0.0, SignalQuality::Good));
        assert_eq!(lines.last().unwrap(), "Trend   Left ▃▂█  Right ▄▄▁");
    }

    #[test]
    fn aggregate_summary_lists_padded_intervals() {
        let mut reporter = ConsoleReporter::new(&Config::default());
        let now = Instant::now();

        let lines = reporter.handle(&SessionEvent::Aggregate(IntervalAggregate {
            index: 0,
            start: now,
            end: now,
            left: Some(25.0),
            right: Some(37.5),
            left_count: 2,
            right_count: 2,
        }));

        assert_eq!(lines[0], "Latest Interval Stress:");
        assert_eq!(lines[1], "  Left:  25.00 (Low)");
        assert_eq!(lines[2], "  Right:  37.50 (Low)");
        assert_eq!(lines.len(), 3 + 5);
        assert!(lines[7].starts_with("  Int 5"));
        assert_eq!(reporter.intervals().history(Channel::Right).latest(), Some(37.5));
    }

    #[test]
    fn failures_carry_their_reason() {
        let mut reporter = ConsoleReporter::new(&Config::default());
        let lines = reporter.handle(&SessionEvent::StateChanged {
            state: SessionState::Failed,
            reason: Some("Connection to the device was lost".to_string()),
        });
        assert_eq!(lines, vec!["Connection error: Connection to the device was lost".to_string()]);
    }
}
