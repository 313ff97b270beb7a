//! The telemetry session: discovery, connection and the telemetry-to-stress
//! pipeline for one device.
//!
//! A session moves through
//! `Idle -> Scanning -> AwaitingSelection -> Connecting -> Streaming -> Disconnected`,
//! with `Failed` reachable from `Scanning`, `Connecting` and `Streaming`.
//! `Disconnected` and `Failed` are terminal; construct a new session to retry.
//!
//! Everything the session produces is pushed: to the callbacks registered
//! through [`TelemetrySession::on_sample`] / [`TelemetrySession::on_aggregate`]
//! and to every channel handed out by [`TelemetrySession::subscribe`]. Events
//! are queued and delivered in order after each step.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::stream::BoxStream;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::backend::{BleBackend, DeviceConnection};
use crate::device::types::{DeviceDescriptor, TelemetryFrame};
use crate::error::{ConnectionError, InvalidStateError, SessionError};
use crate::session::aggregate::IntervalAggregator;
use crate::session::clock::{Clock, SystemClock};
use crate::session::stress::derive_stress;
use crate::session::types::{IntervalAggregate, SessionEvent, SessionState, StressReading, TelemetrySample};

pub mod aggregate;
pub mod clock;
pub mod stress;
pub mod types;


pub const DEFAULT_AGGREGATE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub aggregate_interval: Duration,
    /// Only readings with a good signal count towards interval aggregates.
    pub good_signal_only: bool,
    /// Only report discovered devices whose name contains this (case insensitive).
    pub device_name_filter: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            aggregate_interval: DEFAULT_AGGREGATE_INTERVAL,
            good_signal_only: false,
            device_name_filter: None,
        }
    }
}

/// Requests a stop of the session from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once a stop has been requested.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }
}

type SampleConsumer = Box<dyn FnMut(&StressReading) + Send>;
type AggregateConsumer = Box<dyn FnMut(&IntervalAggregate) + Send>;

pub struct TelemetrySession<B: BleBackend, C: Clock = SystemClock> {
    backend: B,
    clock: C,
    options: SessionOptions,

    state: SessionState,
    failure: Option<String>,
    cancel: CancellationToken,

    discovered: IndexMap<String, DeviceDescriptor>,
    selected: Option<DeviceDescriptor>,

    // the connection is exclusively owned by the session, and released on every exit path
    connection: Option<B::Connection>,
    notifications: Option<BoxStream<'static, TelemetryFrame>>,
    aggregator: Option<IntervalAggregator>,
    sequence: u64,

    sample_consumers: Vec<SampleConsumer>,
    aggregate_consumers: Vec<AggregateConsumer>,
    subscribers: Vec<Sender<SessionEvent>>,
    queue: VecDeque<SessionEvent>,
}

impl<B: BleBackend> TelemetrySession<B, SystemClock> {
    pub fn new(backend: B, options: SessionOptions) -> Self {
        TelemetrySession::with_clock(backend, SystemClock, options)
    }
}

impl<B: BleBackend, C: Clock> TelemetrySession<B, C> {
    pub fn with_clock(backend: B, clock: C, options: SessionOptions) -> Self {
        TelemetrySession {
            backend,
            clock,
            options,
            state: SessionState::Idle,
            failure: None,
            cancel: CancellationToken::new(),
            discovered: IndexMap::new(),
            selected: None,
            connection: None,
            notifications: None,
            aggregator: None,
            sequence: 0,
            sample_consumers: Vec::new(),
            aggregate_consumers: Vec::new(),
            subscribers: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The reason of the `Failed` transition, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn selected_device(&self) -> Option<&DeviceDescriptor> {
        self.selected.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { cancel: self.cancel.clone() }
    }

    /// Registers a consumer that is invoked once per stress reading, in arrival order.
    pub fn on_sample<F>(&mut self, callback: F)
        where F: FnMut(&StressReading) + Send + 'static
    {
        self.sample_consumers.push(Box::new(callback));
    }

    /// Registers a consumer that is invoked once per closed, non-empty interval.
    pub fn on_aggregate<F>(&mut self, callback: F)
        where F: FnMut(&IntervalAggregate) + Send + 'static
    {
        self.aggregate_consumers.push(Box::new(callback));
    }

    /// Returns a channel receiving every session event. A full channel holds
    /// up the session until the consumer catches up.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<SessionEvent> {
        let (sender, receiver) = channel(capacity);
        self.subscribers.push(sender);
        receiver
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), InvalidStateError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }

        let err = InvalidStateError { operation, state: self.state };
        error!("{}", err);
        Err(err)
    }

    fn transition(&mut self, state: SessionState, reason: Option<String>) {
        info!("Session {} -> {}", self.state, state);
        self.state = state;
        self.queue.push_back(SessionEvent::StateChanged { state, reason });
    }

    fn fail(&mut self, err: &dyn Display) {
        let reason = err.to_string();
        error!("Session failed: {}", reason);
        self.failure = Some(reason.clone());
        self.transition(SessionState::Failed, Some(reason));
    }

    async fn dispatch(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            match &event {
                SessionEvent::Reading(reading) => {
                    for consumer in &mut self.sample_consumers {
                        consumer(reading);
                    }
                },
                SessionEvent::Aggregate(aggregate) => {
                    for consumer in &mut self.aggregate_consumers {
                        consumer(aggregate);
                    }
                },
                _ => {},
            }

            let subscribers = std::mem::take(&mut self.subscribers);
            for mut sender in subscribers {
                if sender.send(event.clone()).await.is_ok() {
                    self.subscribers.push(sender);
                } else {
                    debug!("Event subscriber went away");
                }
            }
        }
    }

    /// Starts discovering devices. The returned [`Discovery`] yields each device
    /// once, as it is found; when it is exhausted or dropped the session awaits
    /// a selection.
    pub async fn start_scan(&mut self, timeout: Duration) -> Result<Discovery<'_, B, C>, SessionError> {
        self.expect_state("start_scan", &[SessionState::Idle])?;
        self.discovered.clear();
        self.transition(SessionState::Scanning, None);

        let result = self.backend.scan(timeout).await;
        match result {
            Ok(stream) => {
                self.dispatch().await;
                Ok(Discovery { session: self, stream: Some(stream) })
            },
            Err(err) => {
                self.fail(&err);
                self.dispatch().await;
                Err(err.into())
            },
        }
    }

    pub fn discovered_devices(&self) -> Vec<DeviceDescriptor> {
        self.discovered.values().cloned().collect()
    }

    pub fn select_device(&mut self, device: DeviceDescriptor) -> Result<(), InvalidStateError> {
        self.expect_state("select_device", &[SessionState::AwaitingSelection])?;
        info!("Selected device {}", device);
        self.selected = Some(device);
        self.transition(SessionState::Connecting, None);
        Ok(())
    }

    async fn establish(backend: &B, device: &DeviceDescriptor) -> Result<(B::Connection, BoxStream<'static, TelemetryFrame>), ConnectionError> {
        let mut connection = backend.connect(device).await?;

        match connection.notifications().await {
            Ok(stream) => Ok((connection, stream)),
            Err(err) => {
                if let Err(disconnect_err) = connection.disconnect().await {
                    warn!("Failed to release connection: {}", disconnect_err);
                }
                Err(err)
            },
        }
    }

    /// Connects to the selected device and subscribes to its telemetry. There
    /// is no retry: on failure the session is `Failed`.
    ///
    /// A stop requested while connecting wins: the outcome of the attempt is
    /// discarded and the session ends `Disconnected`.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.expect_state("connect", &[SessionState::Connecting])?;
        self.dispatch().await;

        let device = self.selected.clone()
            .ok_or(InvalidStateError { operation: "connect", state: self.state })?;
        let cancel = self.cancel.clone();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = Self::establish(&self.backend, &device) => Some(result),
        };

        match outcome {
            None => {
                info!("Stop requested while connecting");
                self.stop().await;
                Ok(())
            },
            Some(Ok((connection, stream))) => {
                self.connection = Some(connection);
                if cancel.is_cancelled() {
                    info!("Stop requested while connecting");
                    self.stop().await;
                    return Ok(());
                }

                self.notifications = Some(stream);
                self.aggregator = Some(IntervalAggregator::new(
                    self.clock.now(),
                    self.options.aggregate_interval,
                    self.options.good_signal_only,
                ));
                self.transition(SessionState::Streaming, None);
                self.dispatch().await;
                Ok(())
            },
            Some(Err(err)) => {
                if cancel.is_cancelled() {
                    debug!("Ignoring connect failure after stop: {}", err);
                    self.stop().await;
                    return Ok(());
                }

                self.fail(&err);
                self.dispatch().await;
                Err(err.into())
            },
        }
    }

    /// Processes one telemetry frame. Frames outside of `Streaming` are dropped.
    pub async fn ingest(&mut self, frame: TelemetryFrame) {
        if self.state != SessionState::Streaming {
            debug!("Dropping telemetry frame while {}", self.state);
            return;
        }
        if frame.is_empty() {
            return;
        }

        let sample = TelemetrySample {
            timestamp: self.clock.now(),
            left: frame.left,
            right: frame.right,
        };

        // a sample past the window boundary closes the window before it is emitted
        if let Some(aggregate) = self.aggregator.as_mut().and_then(|aggregator| aggregator.advance(sample.timestamp)) {
            self.queue.push_back(SessionEvent::Aggregate(aggregate));
        }

        self.sequence += 1;
        let reading = StressReading {
            sequence: self.sequence,
            timestamp: sample.timestamp,
            left: sample.left.as_ref().map(derive_stress),
            right: sample.right.as_ref().map(derive_stress),
        };

        if let Some(aggregator) = self.aggregator.as_mut() {
            aggregator.record(&reading);
        }

        self.queue.push_back(SessionEvent::Reading(reading));
        self.dispatch().await;
    }

    /// Closes the current aggregate window if it has ended.
    pub async fn flush(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }

        let now = self.clock.now();
        if let Some(aggregate) = self.aggregator.as_mut().and_then(|aggregator| aggregator.advance(now)) {
            debug!("Interval {} closed", aggregate.index);
            self.queue.push_back(SessionEvent::Aggregate(aggregate));
        }
        self.dispatch().await;
    }

    /// Streams telemetry until a stop is requested (`Ok`, session
    /// `Disconnected`) or the device goes away (`Err`, session `Failed`).
    pub async fn run(&mut self) -> Result<(), SessionError> {
        self.expect_state("run", &[SessionState::Streaming])?;

        let mut notifications = self.notifications.take()
            .ok_or(InvalidStateError { operation: "run", state: self.state })?;

        let width = self.options.aggregate_interval;
        let until_boundary = self.aggregator.as_ref()
            .map(|aggregator| aggregator.next_boundary().saturating_duration_since(self.clock.now()))
            .unwrap_or(width);
        let mut flush_timer = interval_at(tokio::time::Instant::now() + until_boundary, width);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancel = self.cancel.clone();

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break Ok(());
                },
                frame = notifications.next() => match frame {
                    Some(frame) => self.ingest(frame).await,
                    None => break Err(ConnectionError::Lost),
                },
                _ = flush_timer.tick() => {
                    self.flush().await;
                },
            }
        };

        drop(notifications);

        match result {
            Ok(()) => {
                self.stop().await;
                Ok(())
            },
            Err(err) => {
                warn!("Connection lost");
                self.fail(&err);
                self.release().await;
                self.dispatch().await;
                Err(err.into())
            },
        }
    }

    async fn release(&mut self) {
        self.notifications = None;
        self.aggregator = None;

        if let Some(mut connection) = self.connection.take() {
            if let Err(err) = connection.disconnect().await {
                warn!("Failed to release connection: {}", err);
            }
        }
    }

    /// Releases the connection and ends the session. Valid in every state;
    /// calling it again has no further effect. A failed session stays `Failed`.
    /// An unfinished aggregate window is discarded.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.release().await;

        if !self.state.is_terminal() {
            self.transition(SessionState::Disconnected, None);
        }
        self.dispatch().await;
    }
}

/// A running scan. Borrows the session until it is exhausted or dropped.
pub struct Discovery<'a, B: BleBackend, C: Clock> {
    session: &'a mut TelemetrySession<B, C>,
    stream: Option<BoxStream<'static, DeviceDescriptor>>,
}

impl<'a, B: BleBackend, C: Clock> Discovery<'a, B, C> {
    /// The next newly discovered device, or `None` once the scan has ended
    /// (timeout or stop requested).
    pub async fn next(&mut self) -> Option<DeviceDescriptor> {
        loop {
            let stream = self.stream.as_mut()?;
            let cancel = self.session.cancel.clone();

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                device = stream.next() => device,
            };

            let Some(device) = next else {
                self.finish();
                self.session.dispatch().await;
                return None;
            };

            if let Some(filter) = &self.session.options.device_name_filter {
                if !device.matches_name(filter) {
                    debug!("Ignoring device {}", device);
                    continue;
                }
            }

            if self.session.discovered.contains_key(&device.address) {
                continue;
            }

            info!("Discovered device {}", device);
            self.session.discovered.insert(device.address.clone(), device.clone());
            self.session.queue.push_back(SessionEvent::DeviceDiscovered(device.clone()));
            self.session.dispatch().await;
            return Some(device);
        }
    }

    /// Runs the scan to the end.
    pub async fn collect_all(mut self) -> Vec<DeviceDescriptor> {
        let mut devices = Vec::new();
        while let Some(device) = self.next().await {
            devices.push(device);
        }
        devices
    }

    fn finish(&mut self) {
        if self.stream.take().is_some() && self.session.state == SessionState::Scanning {
            self.session.transition(SessionState::AwaitingSelection, None);
        }
    }
}

impl<'a, B: BleBackend, C: Clock> Drop for Discovery<'a, B, C> {
    fn drop(&mut self) {
        self.finish();
    }
}
