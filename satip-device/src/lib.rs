//! Device-side orchestration for network attached SAT>IP tuners.
//!
//! Each [`SatipDevice`] presents one remote tuner to a recording host as if
//! it were local hardware. The host talks to the devices through a
//! [`DeviceRegistry`]; the network session, server discovery, section
//! filtering and the host itself are plugged in as trait objects through a
//! [`DeviceEnvironment`].

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod host;
pub mod logging;
pub mod packet;
pub mod registry;
pub mod ring_buffer;
pub mod section_filter;
pub mod statistics;
pub mod tuner;

#[cfg(test)]
mod test_support;

pub use config::{
    load_config, load_from_env, LoggingConfig, OperatingMode, SatipConfig, TraceCategory,
};
pub use device::{
    Admission, ChannelSwitchLock, DeviceEnvironment, DeviceLink, InfoPage, SatipDevice,
    SignalStats, DEVICE_TYPE, MAX_DEVICES,
};
pub use discovery::Discovery;
pub use error::{ConfigError, DeviceError};
pub use host::{
    CamSlot, Decrypted, DefaultPolicy, HostDevice, HostServices, PidHandle, ProvisionPolicy,
};
pub use logging::init_logging;
pub use packet::TsPacket;
pub use registry::DeviceRegistry;
pub use section_filter::{FilterHandle, SectionFilterFactory, SectionFilterHandler};
pub use tuner::{TunerFactory, TunerSession};
