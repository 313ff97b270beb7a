use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::session::types::SessionState;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Invalid characteristic uuid {value:?}: {source}")]
    InvalidUuid { value: String, source: uuid::Error },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Scanning failed (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Device {address} is not known to any bluetooth adapter")]
    DeviceNotFound { address: String },

    #[error("Device {address} could not be reached: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("A required bluetooth characteristic is not available: {uuid}")]
    MissingCharacteristic { uuid: uuid::Uuid },

    #[error("Subscribing to characteristic {uuid} was refused: {source}")]
    SubscriptionRefused { uuid: uuid::Uuid, source: btleplug::Error },

    #[error("Connection to the device was lost")]
    Lost,

    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} is not valid while the session is {state}")]
pub struct InvalidStateError {
    pub operation: &'static str,
    pub state: SessionState,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{source}")]
    Scan { #[from] source: ScanError },

    #[error("{source}")]
    Connection { #[from] source: ConnectionError },

    #[error("{source}")]
    InvalidState { #[from] source: InvalidStateError },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Telemetry session error: {source}")]
    Session { #[from] source: SessionError },

    #[error("I/O error: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Telemetry session failed: {reason}")]
    SessionFailed { reason: String },
}
