//! Error types for device operations and configuration loading.

use thiserror::Error;

use satip_protocol::{ParamError, Source};

/// Errors returned by device operations.
///
/// None of these are fatal: the device stays usable after any of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The channel's transponder parameters could not be turned into a tuning request.
    #[error("Unrecognized channel parameters '{parameters}': {reason}")]
    UnrecognizedParameters {
        parameters: String,
        #[source]
        reason: ParamError,
    },

    /// PID outside of 0..=8191.
    #[error("PID {0} out of range")]
    PidOutOfRange(i32),

    /// Discovery could not assign a remote tuner for the request.
    #[error("No server available for {signal_source} transponder {transponder}")]
    NoServerAvailable { signal_source: Source, transponder: u32 },

    /// The section filter handler refused a new filter.
    #[error("Failed to open section filter on PID {pid} (tid 0x{tid:02X}, mask 0x{mask:02X})")]
    FilterOpenFailed { pid: u16, tid: u8, mask: u8 },

    /// The device is configured as detached and delivers nothing.
    #[error("Device is detached")]
    Detached,
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid disabled source '{value}': {reason}")]
    InvalidSource { value: String, reason: String },

    #[error("Unknown CA system '{0}'")]
    UnknownCaSystem(String),

    #[error("Buffer size {size} is below the minimum of {min} bytes")]
    BufferTooSmall { size: usize, min: usize },
}
