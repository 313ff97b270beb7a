use std::collections::VecDeque;

use crate::device::types::Channel;
use crate::session::types::{IntervalAggregate, StressReading};

/// A bounded, oldest-first history of one channel.
#[derive(Debug, Clone)]
pub struct ChannelHistory {
    values: VecDeque<f32>,
    capacity: usize,
}

impl ChannelHistory {
    pub fn new(capacity: usize) -> Self {
        ChannelHistory { values: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, value: f32) {
        if self.capacity == 0 {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn latest(&self) -> Option<f32> {
        self.values.back().copied()
    }

    pub fn values(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }

    /// The values, left-padded with zeros to the full capacity.
    pub fn padded(&self) -> Vec<f32> {
        let mut padded = vec![0.0; self.capacity.saturating_sub(self.values.len())];
        padded.extend(self.values.iter());
        padded
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The moving window of the live stress line.
#[derive(Debug, Clone)]
pub struct LiveWindow {
    left: ChannelHistory,
    right: ChannelHistory,
    good_signal_only: bool,
}

impl LiveWindow {
    pub fn new(capacity: usize, good_signal_only: bool) -> Self {
        LiveWindow {
            left: ChannelHistory::new(capacity),
            right: ChannelHistory::new(capacity),
            good_signal_only,
        }
    }

    pub fn push(&mut self, reading: &StressReading) {
        for channel in [Channel::Left, Channel::Right] {
            if let Some(value) = reading.channel(channel) {
                if self.good_signal_only && !value.quality.is_good() {
                    continue;
                }
                self.history_mut(channel).push(value.stress);
            }
        }
    }

    fn history_mut(&mut self, channel: Channel) -> &mut ChannelHistory {
        match channel {
            Channel::Left => &mut self.left,
            Channel::Right => &mut self.right,
        }
    }

    pub fn history(&self, channel: Channel) -> &ChannelHistory {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }
}

/// The last few interval aggregates, per channel.
#[derive(Debug, Clone)]
pub struct AggregateHistory {
    left: ChannelHistory,
    right: ChannelHistory,
}

impl AggregateHistory {
    pub fn new(capacity: usize) -> Self {
        AggregateHistory {
            left: ChannelHistory::new(capacity),
            right: ChannelHistory::new(capacity),
        }
    }

    pub fn push(&mut self, aggregate: &IntervalAggregate) {
        if let Some(left) = aggregate.left {
            self.left.push(left);
        }
        if let Some(right) = aggregate.right {
            self.right.push(right);
        }
    }

    pub fn history(&self, channel: Channel) -> &ChannelHistory {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use crate::session::types::{ChannelStress, SignalQuality};

    fn reading(left: f32, quality: SignalQuality) -> StressReading {
        StressReading {
            sequence: 1,
            timestamp: Instant::now(),
            left: Some(ChannelStress { stress: left, meditation: 100.0 - left, attention: None, quality }),
            right: None,
        }
    }

    #[test]
    fn history_drops_the_oldest_value() {
        let mut history = ChannelHistory::new(3);
        for value in [1.0, 2.0, 3.0, 4.0] {
            history.push(value);
        }
        assert_eq!(history.values(), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.latest(), Some(4.0));
    }

    #[test]
    fn padded_history_is_zero_filled_at_the_front() {
        let mut history = ChannelHistory::new(5);
        history.push(25.0);
        history.push(37.5);
        assert_eq!(history.padded(), vec![0.0, 0.0, 0.0, 25.0, 37.5]);
    }

    #[test]
    fn zero_capacity_history_stays_empty() {
        let mut history = ChannelHistory::new(0);
        history.push(25.0);
        assert!(history.is_empty());
        assert!(history.padded().is_empty());
    }

    #[test]
    fn live_window_can_skip_noisy_readings() {
        let mut window = LiveWindow::new(15, true);
        window.push(&reading(30.0, SignalQuality::Good));
        window.push(&reading(90.0, SignalQuality::Poor(20)));

        assert_eq!(window.history(Channel::Left).values(), vec![30.0]);
        assert!(window.history(Channel::Right).is_empty());
    }

    #[test]
    fn aggregate_history_skips_missing_channels() {
        let now = Instant::now();
        let mut history = AggregateHistory::new(5);
        history.push(&IntervalAggregate {
            index: 0,
            start: now,
            end: now,
            left: Some(25.0),
            right: None,
            left_count: 2,
            right_count: 0,
        });

        assert_eq!(history.history(Channel::Left).len(), 1);
        assert!(history.history(Channel::Right).is_empty());
    }
}
