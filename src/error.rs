/// A subscriber sink could not accept a frame, usually because its connection closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscriber sink closed")]
pub struct TransportFailure;

/// An operation needed the device but none is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Device not connected")]
pub struct DeviceUnavailable;

/// Discovering or connecting to the device failed
#[derive(Debug, thiserror::Error)]
pub enum ConnectionFailure {
    #[error("Bluetooth adapter not available")]
    NoAdapter,
    #[error("Device {0} not found")]
    NotFound(String),
    #[error("Timed out connecting to {0}")]
    Timeout(String),
    #[error("Device does not offer a measurement characteristic")]
    NoMeasurementCharacteristic,
    #[error(transparent)]
    Bluetooth(#[from] bluest::Error),
}
