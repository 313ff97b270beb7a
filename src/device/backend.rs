use std::time::Duration;
use futures::stream::BoxStream;

use crate::device::types::{DeviceDescriptor, TelemetryFrame};
use crate::error::{ConnectionError, ScanError};

/// The BLE stack as seen by a telemetry session.
///
/// The session is driven from a single task, so the returned futures do not
/// need to be `Send`.
#[allow(async_fn_in_trait)]
pub trait BleBackend {
    type Connection: DeviceConnection;

    /// Starts a scan. The returned stream yields devices as they are discovered
    /// and ends once `timeout` has elapsed.
    async fn scan(&self, timeout: Duration) -> Result<BoxStream<'static, DeviceDescriptor>, ScanError>;

    async fn connect(&self, device: &DeviceDescriptor) -> Result<Self::Connection, ConnectionError>;
}

#[allow(async_fn_in_trait)]
pub trait DeviceConnection {
    /// Subscribes to the telemetry characteristics. The stream ends when the
    /// link to the device is lost.
    async fn notifications(&mut self) -> Result<BoxStream<'static, TelemetryFrame>, ConnectionError>;

    async fn disconnect(&mut self) -> Result<(), ConnectionError>;
}
