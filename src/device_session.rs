//! Discovery of, and connection to, the blood pressure monitor.
//!
//! Tested with an iHealth KN-550BT. The monitor exposes a proprietary GATT service
//! ("com.jiuan.dev") whose "sed." characteristic pushes measurement notifications.
//! Some firmware also offers the standard Blood Pressure Measurement characteristic,
//! which is used when the proprietary one is missing.
//!
//! The command which starts a measurement remotely is not known, so a measurement
//! has to be started with the button on the monitor.

use std::collections::HashMap;
use std::sync::Arc;

use bluest::Adapter;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::connection_state::SessionId;
use crate::error::ConnectionFailure;
use crate::error::DeviceUnavailable;
use crate::pipeline::Pipeline;

/// "sed.jiuan.dev", notifications from the monitor
const IHEALTH_NOTIFY_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x7365642e_6a69_7561_6e2e_646576000000);
/// Blood Pressure Measurement, from the Bluetooth SIG assigned numbers
const STANDARD_MEASUREMENT_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x00002a35_0000_1000_8000_00805f9b34fb);

/// Characteristics which may carry measurements, most preferred first
const MEASUREMENT_CHARACTERISTIC_IDS: [Uuid; 2] =
    [IHEALTH_NOTIFY_CHARACTERISTIC_ID, STANDARD_MEASUREMENT_CHARACTERISTIC_ID];

/// A device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub name: String,
    /// Opaque platform identifier, used to connect
    pub address: String,
    /// Signal strength in dBm, if the platform reported it
    pub rssi: Option<i16>,
}

struct ActiveSession {
    device: Device,
    session: SessionId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the BLE lifecycle of the single monitor and feeds its notifications
/// into the [`Pipeline`].
///
/// The Bluetooth adapter is only acquired on first use.
pub struct DeviceSession {
    config: BridgeConfig,
    pipeline: Arc<Pipeline>,
    adapter: OnceCell<Adapter>,
    discovered: Mutex<HashMap<String, Device>>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl DeviceSession {
    pub fn new(config: BridgeConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            adapter: OnceCell::new(),
            discovered: Mutex::new(HashMap::new()),
            active: tokio::sync::Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Listen for advertisements for the configured scan duration and return the
    /// devices whose name contains the configured device name.
    ///
    /// Only devices found by the latest scan can be connected to.
    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>, ConnectionFailure> {
        self.discovered.lock().clear();
        let adapter = self.adapter().await?;
        log::info!("Scanning for {} devices for {}s", self.config.device_name, self.config.scan_secs);

        let mut seen = HashMap::<String, (DiscoveredDevice, Device)>::new();
        let mut events = adapter.scan(&[]).await?;
        let _ = timeout(self.config.scan_duration(), async {
            while let Some(event) = events.next().await {
                let name = event
                    .adv_data
                    .local_name
                    .clone()
                    .or_else(|| event.device.name().ok())
                    .unwrap_or_else(|| "Unknown".into());
                let address = address_of(&event.device);
                let found = DiscoveredDevice { name, address: address.clone(), rssi: event.rssi };
                seen.insert(address, (found, event.device));
            }
        })
        .await;
        drop(events);

        log::info!("Found {} BLE devices", seen.len());
        let (matching, devices) = select_matching(seen, &self.config.device_name);
        *self.discovered.lock() = devices;
        Ok(matching)
    }

    /// Connect to a device returned by an earlier [`DeviceSession::scan`] and start
    /// feeding its notifications into the pipeline. Any existing connection is
    /// closed first.
    pub async fn connect(&self, address: &str) -> Result<(), ConnectionFailure> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }

        let device = self
            .discovered
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| ConnectionFailure::NotFound(address.to_string()))?;
        let adapter = self.adapter().await?;

        log::info!("Connecting to {address}...");
        let opened = timeout(self.config.connect_timeout(), open_measurement_characteristic(adapter, &device))
            .await
            .unwrap_or_else(|_| Err(ConnectionFailure::Timeout(address.to_string())));
        let characteristic = match opened {
            Ok(characteristic) => characteristic,
            Err(e) => {
                self.pipeline.state().set_connected(false);
                if let Err(e) = adapter.disconnect_device(&device).await {
                    log::warn!("Failed to disconnect after failed connect: {e}");
                }
                return Err(e);
            }
        };

        let session = self.pipeline.state().begin_session();
        let cancel = CancellationToken::new();
        let (subscribed_tx, subscribed_rx) = oneshot::channel();
        let task = tokio::spawn(receive_notifications(
            self.pipeline.clone(),
            characteristic,
            session,
            cancel.clone(),
            subscribed_tx,
        ));

        let subscribed = subscribed_rx
            .await
            .unwrap_or_else(|_| Err(ConnectionFailure::NoMeasurementCharacteristic));
        let started = ActiveSession { device, session, cancel, task };
        if let Err(e) = subscribed {
            self.teardown(started).await;
            return Err(e);
        }

        log::info!("Connected to {address}, waiting for measurements");
        *active = Some(started);
        Ok(())
    }

    /// Stop receiving notifications and close the connection. Does nothing if
    /// no device is connected.
    pub async fn disconnect(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            self.teardown(previous).await;
        }
    }

    /// Ask the monitor to take a measurement
    pub fn start_measurement(&self) -> Result<(), DeviceUnavailable> {
        if !self.pipeline.state().is_connected() {
            return Err(DeviceUnavailable);
        }
        log::info!("Starting measurement. Press the start button on the monitor.");
        Ok(())
    }

    async fn adapter(&self) -> Result<&Adapter, ConnectionFailure> {
        self.adapter
            .get_or_try_init(|| async {
                let adapter = Adapter::default().await.ok_or(ConnectionFailure::NoAdapter)?;
                adapter.wait_available().await?;
                Ok::<_, ConnectionFailure>(adapter)
            })
            .await
    }

    async fn teardown(&self, active: ActiveSession) {
        // Dropping the notification stream unsubscribes from the characteristic
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            log::warn!("Notification task failed: {e}");
        }
        self.pipeline.state().end_session(active.session);

        match self.adapter().await {
            Ok(adapter) => {
                if let Err(e) = adapter.disconnect_device(&active.device).await {
                    log::warn!("Failed to disconnect: {e}");
                }
            }
            Err(e) => log::warn!("Failed to disconnect: {e}"),
        }
        log::info!("Disconnected from device");
    }
}

/// Split scan results into those whose name contains `device_name` and the
/// handles needed to connect to them
fn select_matching<D>(
    seen: HashMap<String, (DiscoveredDevice, D)>,
    device_name: &str,
) -> (Vec<DiscoveredDevice>, HashMap<String, D>) {
    let mut matching = Vec::new();
    let mut devices = HashMap::new();
    for (address, (found, device)) in seen {
        log::info!("  - {} ({}) RSSI: {:?}", found.name, found.address, found.rssi);
        if found.name.contains(device_name) {
            devices.insert(address, device);
            matching.push(found);
        }
    }
    (matching, devices)
}

fn address_of(device: &Device) -> String {
    // DeviceId has no common textual form across platforms
    format!("{:?}", device.id())
}

async fn open_measurement_characteristic(
    adapter: &Adapter,
    device: &Device,
) -> Result<Characteristic, ConnectionFailure> {
    adapter.connect_device(device).await?;

    let mut characteristics = Vec::new();
    for service in device.discover_services().await? {
        log::debug!("Service: {}", service.uuid());
        for characteristic in service.discover_characteristics().await? {
            log::debug!("  Characteristic: {}", characteristic.uuid());
            characteristics.push(characteristic);
        }
    }

    MEASUREMENT_CHARACTERISTIC_IDS
        .iter()
        .find_map(|id| characteristics.iter().find(|c| c.uuid() == *id).cloned())
        .ok_or(ConnectionFailure::NoMeasurementCharacteristic)
}

async fn receive_notifications(
    pipeline: Arc<Pipeline>,
    characteristic: Characteristic,
    session: SessionId,
    cancel: CancellationToken,
    subscribed: oneshot::Sender<Result<(), ConnectionFailure>>,
) {
    let notifications = match characteristic.notify().await {
        Ok(notifications) => notifications,
        Err(e) => {
            log::error!("Could not subscribe to {}: {e}", characteristic.uuid());
            let _ = subscribed.send(Err(e.into()));
            return;
        }
    };
    log::info!("Subscribed to notifications from {}", characteristic.uuid());
    let _ = subscribed.send(Ok(()));

    pipeline.run(session, notifications, cancel).await;
}

#[cfg(test)]
fn test_session() -> DeviceSession {
    use crate::broadcaster::Broadcaster;
    use crate::connection_state::ConnectionState;
    use crate::message::Decoder;

    let state = Arc::new(ConnectionState::new(Arc::new(Broadcaster::new())));
    let pipeline = Arc::new(Pipeline::new(Decoder::default(), state, None));
    DeviceSession::new(BridgeConfig::default(), pipeline)
}

#[test]
fn test_start_measurement_requires_connection() {
    let session = test_session();
    assert_eq!(session.start_measurement(), Err(DeviceUnavailable));
    assert_eq!(DeviceUnavailable.to_string(), "Device not connected");

    session.pipeline().state().begin_session();
    assert_eq!(session.start_measurement(), Ok(()));
}

#[tokio::test]
async fn test_connect_to_unknown_device() {
    let session = test_session();
    let result = session.connect("never-scanned").await;
    assert!(matches!(result, Err(ConnectionFailure::NotFound(address)) if address == "never-scanned"));
    assert!(!session.pipeline().state().is_connected());
}

#[tokio::test]
async fn test_disconnect_without_connection() {
    let session = test_session();
    session.disconnect().await;
    assert!(!session.pipeline().state().is_connected());
}

#[test]
fn test_select_matching_keeps_only_named_devices() {
    let seen = HashMap::from([
        ("a".to_string(), (DiscoveredDevice { name: "KN-550BT 1234".into(), address: "a".into(), rssi: Some(-60) }, 1)),
        ("b".to_string(), (DiscoveredDevice { name: "Headphones".into(), address: "b".into(), rssi: None }, 2)),
    ]);
    let (matching, devices) = select_matching(seen, "KN-550BT");
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].address, "a");
    assert_eq!(devices, HashMap::from([("a".to_string(), 1)]));
}
