//! Interface to the network session that streams from one remote tuner.

use satip_protocol::{PidType, SatipServer};

use crate::device::DeviceLink;

/// The network session of one device.
///
/// The session delivers stream bytes and the tuning-concluded notification
/// through the [`DeviceLink`] it was created with.
pub trait TunerSession: Send + Sync {
    /// Point the session at `server`, or release the current server when
    /// `server` is `None`. Returns whether the request was accepted.
    fn set_source(
        &self,
        server: Option<&SatipServer>,
        transponder: u32,
        parameters: &str,
        device_index: usize,
    ) -> bool;

    /// Add or remove interest in a PID.
    fn set_pid(&self, pid: u16, pid_type: PidType, on: bool) -> bool;

    /// Start the stream flow.
    fn open(&self) -> bool;

    /// Stop the stream flow.
    fn close(&self) -> bool;

    fn has_lock(&self) -> bool;

    /// True once the last `set_source` was carried out by the server.
    fn is_tuned(&self) -> bool;

    /// Signal strength in percent.
    fn signal_strength(&self) -> i32;

    /// Signal strength in dBm; 0.0 when unknown.
    fn signal_strength_dbm(&self) -> f64;

    /// Signal quality in percent.
    fn signal_quality(&self) -> i32;

    /// Session description for information pages.
    fn information(&self) -> String;

    fn signal_status(&self) -> String;

    /// Stream bitrate report.
    fn statistic(&self) -> String;
}

/// Creates the session of a device during device construction.
pub trait TunerFactory: Send + Sync {
    fn create(&self, link: DeviceLink, packet_buffer_size: usize) -> Box<dyn TunerSession>;
}

impl<F> TunerFactory for F
where
    F: Fn(DeviceLink, usize) -> Box<dyn TunerSession> + Send + Sync,
{
    fn create(&self, link: DeviceLink, packet_buffer_size: usize) -> Box<dyn TunerSession> {
        self(link, packet_buffer_size)
    }
}
