//! Registry of all SAT>IP devices of the process.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::config::SatipConfig;
use crate::device::{DeviceEnvironment, SatipDevice, MAX_DEVICES};
use crate::host::HostServices;
use crate::logging::target;

/// Message returned by [`DeviceRegistry::aggregate_status`] when no device
/// provides service.
pub const STATUS_NOT_AVAILABLE: &str = "SAT>IP information not available!";

/// Ordered collection of the devices, created once at startup.
pub struct DeviceRegistry {
    devices: Vec<Arc<SatipDevice>>,
    config: Arc<SatipConfig>,
    host: Arc<dyn HostServices>,
}

impl DeviceRegistry {
    /// Create `min(count, MAX_DEVICES)` devices with indices `0..count`.
    pub fn initialize(count: usize, env: &DeviceEnvironment) -> Self {
        debug!(target: target::FUNC, "DeviceRegistry::initialize({})", count);
        let count = count.min(MAX_DEVICES);
        let devices = (0..count)
            .map(|index| Arc::new(SatipDevice::new(index, env)))
            .collect();
        info!("Created {} SAT>IP device(s)", count);

        Self {
            devices,
            config: env.config.clone(),
            host: env.host.clone(),
        }
    }

    /// Close the stream path of every device. Devices stay registered.
    pub fn shutdown(&self) {
        debug!(target: target::FUNC, "DeviceRegistry::shutdown");
        for device in &self.devices {
            device.close_dvr();
        }
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<SatipDevice>> {
        self.devices.get(index)
    }

    /// Look up a device by the host's card index.
    pub fn get_by_card_index(&self, card_index: i32) -> Option<&Arc<SatipDevice>> {
        debug!(target: target::FUNC, "get_by_card_index({})", card_index);
        self.devices
            .iter()
            .find(|device| device.card_index() == card_index)
    }

    pub fn devices(&self) -> &[Arc<SatipDevice>] {
        &self.devices
    }

    /// Status report of every device providing service.
    pub fn aggregate_status(&self) -> String {
        if self.config.detached_mode || self.config.is_operating_mode_off() {
            return STATUS_NOT_AVAILABLE.to_string();
        }

        let mut info = String::new();
        for device in &self.devices {
            let card = device.card_index();
            let _ = writeln!(info, "Device: {}", device.device_name());

            if device.has_lock(Duration::ZERO) {
                let live = if self.host.is_live_device(card) { "  Live: yes" } else { "" };
                let _ = writeln!(
                    info,
                    "CardIndex: {}  HasLock: yes  Strength: {}  Quality: {}{}",
                    card,
                    device.signal_strength(),
                    device.signal_quality(),
                    live
                );
            } else {
                let _ = writeln!(info, "CardIndex: {}  HasLock: no", card);
            }

            if let Some(channel) = device.currently_tuned_transponder() {
                if channel.number > 0 && device.receiving() {
                    let _ = writeln!(
                        info,
                        "Transponder: {}  Channel: {}",
                        channel.transponder(),
                        channel.name
                    );
                } else {
                    let _ = writeln!(info, "Transponder: {}", channel.transponder());
                }
            }

            let timers = self.host.active_recordings(card);
            if timers > 0 {
                let _ = writeln!(
                    info,
                    "Recording: {} timer{}",
                    timers,
                    if timers > 1 { "s" } else { "" }
                );
            }
            info.push('\n');
        }

        if info.is_empty() {
            STATUS_NOT_AVAILABLE.to_string()
        } else {
            info
        }
    }
}
