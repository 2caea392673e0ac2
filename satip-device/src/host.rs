//! Services consumed from the recording host.
//!
//! The host owns the channel list, the receivers attached to each device and
//! the CAM slots. A device only queries them.

use std::sync::Arc;

use satip_protocol::{Channel, Source};

use crate::packet::TsPacket;

/// Result of feeding stream data to a CAM.
#[derive(Debug, Clone, Default)]
pub struct Decrypted {
    /// Next decrypted packet, if the CAM has one ready.
    pub packet: Option<TsPacket>,
    /// Number of input bytes the CAM took.
    pub consumed: usize,
}

/// A conditional access slot bound to a device.
pub trait CamSlot: Send + Sync {
    fn can_decrypt(&self, channel: &Channel) -> bool;

    /// True while the CAM takes the raw stream for decryption.
    fn wants_ts_data(&self) -> bool;

    /// Hand `data` (possibly empty) to the CAM.
    ///
    /// `data` is a copy of the queued stream. The stream ring is not locked
    /// during the call, so the tuner session keeps writing meanwhile.
    fn decrypt(&self, data: &[u8]) -> Decrypted;
}

/// The host's view of one device: its receivers and CAM.
pub trait HostDevice: Send + Sync {
    fn card_index(&self) -> i32;

    /// Highest priority among attached receivers, or
    /// [`priority::IDLE`](satip_protocol::priority::IDLE) when none.
    fn priority(&self) -> i32;

    /// True while any receiver is attached.
    fn receiving(&self) -> bool;

    /// True if an attached receiver already takes `pid`.
    fn has_pid(&self, pid: u16) -> bool;

    fn cam_slot(&self) -> Option<Arc<dyn CamSlot>>;

    fn may_switch_transponder(&self, channel: &Channel) -> bool;
}

/// Host wide lookups.
pub trait HostServices: Send + Sync {
    /// Host side of the device with the given index.
    fn host_device(&self, device_index: usize) -> Arc<dyn HostDevice>;

    /// User description of a source; a leading '0' disables it.
    fn source_description(&self, source: Source) -> Option<String>;

    /// PMT PID of a service, 0 if unknown.
    fn pmt_pid(&self, source: Source, transponder: u32, sid: u16) -> u16;

    /// Number of recordings running on the card.
    fn active_recordings(&self, card_index: i32) -> usize;

    /// True if the card is the one showing live TV.
    fn is_live_device(&self, card_index: i32) -> bool;
}

/// Build specific provision hooks.
pub trait ProvisionPolicy: Send + Sync {
    fn provides_transponder(&self, _channel: &Channel) -> bool {
        true
    }

    fn provides_eit(&self) -> bool {
        true
    }
}

/// Provides every transponder and EIT.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl ProvisionPolicy for DefaultPolicy {}

/// A host PID table entry as seen by `set_pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidHandle {
    pub pid: i32,
    /// True while the host still delivers this PID to a receiver.
    pub used: bool,
}

impl PidHandle {
    pub fn new(pid: i32, used: bool) -> Self {
        Self { pid, used }
    }
}
