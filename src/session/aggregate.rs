use std::time::{Duration, Instant};

use crate::session::types::{ChannelStress, IntervalAggregate, StressReading};

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: f32) {
        self.sum += f64::from(value);
        self.count += 1;
    }

    fn value(&self) -> Option<f32> {
        match self.count {
            0 => None,
            count => Some((self.sum / f64::from(count)) as f32),
        }
    }
}

/// Averages stress readings over fixed, non-overlapping windows.
///
/// Window `n` covers `[origin + n * width, origin + (n + 1) * width)`.
#[derive(Debug)]
pub struct IntervalAggregator {
    origin: Instant,
    width: Duration,
    index: u64,
    good_signal_only: bool,
    left: Mean,
    right: Mean,
}

impl IntervalAggregator {
    pub fn new(origin: Instant, width: Duration, good_signal_only: bool) -> Self {
        IntervalAggregator {
            origin,
            width,
            index: 0,
            good_signal_only,
            left: Mean::default(),
            right: Mean::default(),
        }
    }

    fn window_start(&self, index: u64) -> Instant {
        self.origin + self.width.mul_f64(index as f64)
    }

    pub fn next_boundary(&self) -> Instant {
        self.window_start(self.index + 1)
    }

    /// Closes the current window if `now` lies past its end. Returns the closed
    /// window's aggregate, unless the window had no readings.
    pub fn advance(&mut self, now: Instant) -> Option<IntervalAggregate> {
        if now < self.next_boundary() {
            return None;
        }

        let aggregate = self.close();

        // windows without any reading are skipped entirely
        let elapsed = now.saturating_duration_since(self.origin);
        self.index = (elapsed.as_nanos() / self.width.as_nanos().max(1)) as u64;

        aggregate
    }

    fn close(&mut self) -> Option<IntervalAggregate> {
        let left = std::mem::take(&mut self.left);
        let right = std::mem::take(&mut self.right);

        if left.count == 0 && right.count == 0 {
            return None;
        }

        Some(IntervalAggregate {
            index: self.index,
            start: self.window_start(self.index),
            end: self.next_boundary(),
            left: left.value(),
            right: right.value(),
            left_count: left.count,
            right_count: right.count,
        })
    }

    fn accepts(&self, channel: &ChannelStress) -> bool {
        !self.good_signal_only || channel.quality.is_good()
    }

    pub fn record(&mut self, reading: &StressReading) {
        if let Some(left) = reading.left.as_ref().filter(|left| self.accepts(left)) {
            self.left.add(left.stress);
        }
        if let Some(right) = reading.right.as_ref().filter(|right| self.accepts(right)) {
            self.right.add(right.stress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::SignalQuality;

    const WIDTH: Duration = Duration::from_secs(10);

    fn reading(origin: Instant, at_secs: u64, left: Option<f32>, right: Option<f32>, quality: SignalQuality) -> StressReading {
        let channel = |stress: f32| ChannelStress { stress, meditation: 100.0 - stress, attention: None, quality };
        StressReading {
            sequence: 0,
            timestamp: origin + Duration::from_secs(at_secs),
            left: left.map(channel),
            right: right.map(channel),
        }
    }

    #[test]
    fn aggregate_is_the_mean_of_the_window() {
        let origin = Instant::now();
        let mut aggregator = IntervalAggregator::new(origin, WIDTH, false);

        aggregator.record(&reading(origin, 1, Some(30.0), Some(35.0), SignalQuality::Good));
        aggregator.record(&reading(origin, 2, Some(20.0), Some(40.0), SignalQuality::Good));
        assert_eq!(aggregator.advance(origin + Duration::from_secs(9)), None);

        let aggregate = aggregator.advance(origin + WIDTH).unwrap();
        assert_eq!(aggregate.index, 0);
        assert_eq!(aggregate.left, Some(25.0));
        assert_eq!(aggregate.right, Some(37.5));
        assert_eq!(aggregate.left_count, 2);
        assert_eq!(aggregate.start, origin);
        assert_eq!(aggregate.end, origin + WIDTH);
    }

    #[test]
    fn empty_windows_produce_nothing() {
        let origin = Instant::now();
        let mut aggregator = IntervalAggregator::new(origin, WIDTH, false);

        assert_eq!(aggregator.advance(origin + Duration::from_secs(35)), None);
        assert_eq!(aggregator.next_boundary(), origin + Duration::from_secs(40));

        aggregator.record(&reading(origin, 36, Some(50.0), None, SignalQuality::Good));
        let aggregate = aggregator.advance(origin + Duration::from_secs(40)).unwrap();
        assert_eq!(aggregate.index, 3);
        assert_eq!(aggregate.left, Some(50.0));
        assert_eq!(aggregate.right, None);
        assert_eq!(aggregate.right_count, 0);
    }

    #[test]
    fn good_signal_only_skips_noisy_readings() {
        let origin = Instant::now();
        let mut aggregator = IntervalAggregator::new(origin, WIDTH, true);

        aggregator.record(&reading(origin, 1, Some(10.0), Some(10.0), SignalQuality::Good));
        aggregator.record(&reading(origin, 2, Some(90.0), Some(90.0), SignalQuality::Poor(30)));

        let aggregate = aggregator.advance(origin + WIDTH).unwrap();
        assert_eq!(aggregate.left, Some(10.0));
        assert_eq!(aggregate.left_count, 1);
    }
}
