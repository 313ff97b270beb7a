use std::future::Future;
use std::time::Duration;
use futures::{future, stream, FutureExt, StreamExt};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::device::backend::{BleBackend, DeviceConnection};
use crate::device::constants::{CONNECT_DEADLINE, DISCONNECT_DEADLINE, IS_CONNECTED_DEADLINE, LINK_POLL_INTERVAL};
use crate::device::packet::PacketDecoder;
use crate::device::types::{Channel, DeviceDescriptor, TelemetryFrame};
use crate::error::{ConnectionError, ScanError};

/// The platform bluetooth stack, through btleplug.
pub struct BtleplugBackend {
    // adapters are only valid while the manager is alive
    _manager: Manager,
    adapters: Vec<Adapter>,
    left_uuid: Uuid,
    right_uuid: Uuid,
}

impl BtleplugBackend {
    pub async fn new(left_uuid: Uuid, right_uuid: Uuid) -> Result<Self, ScanError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        Ok(BtleplugBackend { _manager: manager, adapters, left_uuid, right_uuid })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Option<Peripheral>, ConnectionError> {
        for adapter in &self.adapters {
            let peripherals = match adapter.peripherals().await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to query BLE adapter for peripherals: {}", err);
                    continue;
                },
            };

            for peripheral in peripherals {
                match peripheral.properties().await {
                    Err(err) => {
                        warn!("Could not query peripheral for properties: {:?}", err);
                    },
                    Ok(None) => {
                        debug!("Peripheral has no properties");
                    },
                    Ok(Some(properties)) => {
                        if properties.address.to_string() == address {
                            return Ok(Some(peripheral));
                        }
                    },
                }
            }
        }

        Ok(None)
    }
}

async fn describe_peripheral(adapter: &Adapter, id: &PeripheralId) -> Option<DeviceDescriptor> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(v) => v,
        Err(err) => {
            warn!("Discovered peripheral is not available: {}", err);
            return None;
        },
    };

    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => {
            warn!("Peripheral has no properties");
            None
        },
        Ok(Some(properties)) => {
            Some(DeviceDescriptor::new(properties.address.to_string(), properties.local_name))
        },
    }
}

/// Runs a cleanup future exactly once: awaited when the owning stream is
/// drained, spawned when the stream is dropped before that.
struct CleanupGuard {
    cleanup: Option<BoxFuture<'static, ()>>,
}

impl CleanupGuard {
    async fn run(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.await;
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cleanup);
            },
            Err(_) => warn!("No runtime available to run stream cleanup"),
        }
    }
}

/// Appends `cleanup` to `items`. It also runs if the stream is dropped early.
fn with_cleanup<T, F>(items: BoxStream<'static, T>, cleanup: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let guard = CleanupGuard { cleanup: Some(cleanup.boxed()) };
    let tail = stream::once(async move {
        guard.run().await;
        None
    }).filter_map(future::ready);

    items.chain(tail).boxed()
}

/// Ends `items` once `is_connected` reports the link as gone. The link is
/// checked every `poll_interval`.
fn end_on_link_loss<T, F, Fut>(items: BoxStream<'static, T>, poll_interval: Duration, is_connected: F) -> BoxStream<'static, T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let link_lost = async move {
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !is_connected().await {
                break;
            }
        }
    };

    items.take_until(link_lost).boxed()
}

async fn check_link(peripheral: Peripheral) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_millis(IS_CONNECTED_DEADLINE)) => {
            warn!("Checking for connection status took too long");
            false
        }
        result = peripheral.is_connected() => match result {
            Err(err) => {
                warn!("Error checking for connection state: {:?}", err);
                false
            },
            Ok(false) => {
                warn!("Connection lost");
                false
            },
            Ok(true) => true,
        }
    }
}

impl BleBackend for BtleplugBackend {
    type Connection = BtleplugConnection;

    async fn scan(&self, scan_timeout: Duration) -> Result<BoxStream<'static, DeviceDescriptor>, ScanError> {
        if self.adapters.is_empty() {
            return Err(ScanError::NoAdapter);
        }

        let mut streams = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
            let events = adapter.events().await?;
            adapter.start_scan(ScanFilter::default()).await?;

            // peripherals cached by the OS do not produce a discovery event
            let known = adapter.peripherals().await?
                .into_iter()
                .map(|peripheral| peripheral.id())
                .collect::<Vec<_>>();

            let discovered = events.filter_map(|event| future::ready(match event {
                CentralEvent::DeviceDiscovered(id) => Some(id),
                _ => None,
            }));

            let adapter = adapter.clone();
            let devices = stream::iter(known)
                .chain(discovered)
                .then(move |id| {
                    let adapter = adapter.clone();
                    async move { describe_peripheral(&adapter, &id).await }
                })
                .filter_map(future::ready);

            streams.push(devices.boxed());
        }

        let adapters = self.adapters.clone();
        let stop_scan = async move {
            for adapter in &adapters {
                if let Err(err) = adapter.stop_scan().await {
                    warn!("Failed to stop scanning: {}", err);
                }
            }
            debug!("Scan finished");
        };

        let devices = stream::select_all(streams)
            .take_until(sleep(scan_timeout))
            .boxed();
        Ok(with_cleanup(devices, stop_scan))
    }

    async fn connect(&self, device: &DeviceDescriptor) -> Result<BtleplugConnection, ConnectionError> {
        let peripheral = self.find_peripheral(&device.address).await?
            .ok_or_else(|| ConnectionError::DeviceNotFound { address: device.address.clone() })?;

        info!("Connecting to peripheral {}...", device);
        match timeout(Duration::from_millis(CONNECT_DEADLINE), peripheral.connect()).await {
            Err(_) => {
                return Err(ConnectionError::Unreachable {
                    address: device.address.clone(),
                    reason: "connection attempt took too long".to_string(),
                });
            },
            Ok(Err(err)) => {
                return Err(ConnectionError::Unreachable {
                    address: device.address.clone(),
                    reason: err.to_string(),
                });
            },
            Ok(Ok(())) => {},
        }

        // from here on, dropping the connection releases the peripheral
        let connection = BtleplugConnection {
            peripheral,
            left_uuid: self.left_uuid,
            right_uuid: self.right_uuid,
            released: false,
        };

        info!("Connected; Discovering services...");
        connection.peripheral.discover_services().await?;
        Ok(connection)
    }
}

pub struct BtleplugConnection {
    peripheral: Peripheral,
    left_uuid: Uuid,
    right_uuid: Uuid,
    released: bool,
}

impl DeviceConnection for BtleplugConnection {
    async fn notifications(&mut self) -> Result<BoxStream<'static, TelemetryFrame>, ConnectionError> {
        let characteristics = self.peripheral.characteristics();

        for uuid in [self.left_uuid, self.right_uuid] {
            let characteristic = characteristics.iter()
                .find(|characteristic| characteristic.uuid == uuid)
                .ok_or(ConnectionError::MissingCharacteristic { uuid })?;

            info!("Subscribing to characteristic {:?}", uuid);
            self.peripheral.subscribe(characteristic).await
                .map_err(|source| ConnectionError::SubscriptionRefused { uuid, source })?;
        }

        let notification_stream = self.peripheral.notifications().await?;
        let (left_uuid, right_uuid) = (self.left_uuid, self.right_uuid);
        let mut left_decoder = PacketDecoder::new();
        let mut right_decoder = PacketDecoder::new();

        let frames = notification_stream
            .map(move |notification| {
                let (channel, decoder) = if notification.uuid == left_uuid {
                    (Channel::Left, &mut left_decoder)
                } else if notification.uuid == right_uuid {
                    (Channel::Right, &mut right_decoder)
                } else {
                    return Vec::new();
                };

                decoder.push(&notification.value)
                    .into_iter()
                    .map(|sample| TelemetryFrame::single(channel, sample))
                    .collect::<Vec<_>>()
            })
            .flat_map(stream::iter)
            .boxed();

        // the notification stream outlives the link, so it never ends by itself
        let peripheral = self.peripheral.clone();
        Ok(end_on_link_loss(frames, Duration::from_millis(LINK_POLL_INTERVAL), move || check_link(peripheral.clone())))
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        info!("Disconnecting from peripheral...");
        match timeout(Duration::from_millis(DISCONNECT_DEADLINE), self.peripheral.disconnect()).await {
            Err(_) => {
                warn!("Disconnecting from peripheral took too long");
                Ok(())
            },
            Ok(result) => Ok(result?),
        }
    }
}

impl Drop for BtleplugConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let peripheral = self.peripheral.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = peripheral.disconnect().await {
                        warn!("Failed to release peripheral: {}", err);
                    }
                });
            },
            Err(_) => warn!("No runtime available to release the peripheral"),
        }
    }
}
