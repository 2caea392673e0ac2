//! One virtual SAT>IP device.
//!
//! A device owns a ring buffer, a tuner session and a section filter handler.
//! It decides channel admission, serializes channel switches across all
//! devices, keeps PID interest in sync with the host and its section filters,
//! and drains the ring buffer one TS packet at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use satip_protocol::{
    priority, tnr_parameters, Channel, PidType, Source, SourceKind, TransponderParams, MAX_PID,
    TS_PACKET_SIZE, TS_SYNC_BYTE,
};

use crate::config::SatipConfig;
use crate::discovery::Discovery;
use crate::error::DeviceError;
use crate::host::{DefaultPolicy, HostDevice, HostServices, PidHandle, ProvisionPolicy};
use crate::logging::target;
use crate::packet::{find_sync, ts_payload_size, ts_pid, TsPacket};
use crate::ring_buffer::TsRingBuffer;
use crate::section_filter::{FilterHandle, SectionFilterFactory, SectionFilterHandler};
use crate::statistics::{BufferStatistics, PidStatistics};
use crate::tuner::{TunerFactory, TunerSession};

/// Upper bound on the number of devices a registry creates.
pub const MAX_DEVICES: usize = 16;

/// Device type reported to the host.
pub const DEVICE_TYPE: &str = "SAT>IP";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

const MAX_PROVIDED_SYSTEMS: usize = 15;

/// Signal strength readings at or above this are not real measurements.
const STRENGTH_VALID_BELOW_DBM: f64 = -18.0;

/// Information page kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoPage {
    General,
    Pids,
    Filters,
    Protocol,
    Bitrate,
    All,
}

/// Signal statistics of a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStats {
    /// Strength in dBm, `None` while the session has no valid reading.
    pub strength_dbm: Option<f64>,
    pub has_lock: bool,
}

/// Outcome of a channel admission check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    /// The host has to detach the current receivers to satisfy the request.
    pub needs_detach: bool,
}

/// Lock serializing channel switches across every device.
///
/// The remote tuner pool is shared; two devices must never allocate from it
/// at the same time.
#[derive(Default)]
pub struct ChannelSwitchLock {
    inner: Mutex<()>,
}

impl ChannelSwitchLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock()
    }
}

/// Collaborators shared by all devices.
#[derive(Clone)]
pub struct DeviceEnvironment {
    pub config: Arc<SatipConfig>,
    pub discovery: Arc<dyn Discovery>,
    pub host: Arc<dyn HostServices>,
    pub policy: Arc<dyn ProvisionPolicy>,
    pub tuners: Arc<dyn TunerFactory>,
    pub section_filters: Arc<dyn SectionFilterFactory>,
    pub switch_lock: Arc<ChannelSwitchLock>,
}

impl DeviceEnvironment {
    pub fn new(
        config: SatipConfig,
        discovery: Arc<dyn Discovery>,
        host: Arc<dyn HostServices>,
        tuners: Arc<dyn TunerFactory>,
        section_filters: Arc<dyn SectionFilterFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            discovery,
            host,
            policy: Arc::new(DefaultPolicy),
            tuners,
            section_filters,
            switch_lock: Arc::new(ChannelSwitchLock::new()),
        }
    }

    /// Replace the provision policy.
    pub fn with_policy(mut self, policy: Arc<dyn ProvisionPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

/// "Tuning attempt concluded" flag with a bounded wait.
#[derive(Default)]
struct TuneSignal {
    concluded: Mutex<bool>,
    cond: Condvar,
}

impl TuneSignal {
    fn reset(&self) {
        *self.concluded.lock() = false;
    }

    fn notify(&self) {
        *self.concluded.lock() = true;
        self.cond.notify_all();
    }

    /// Returns whether a notification arrived before the timeout.
    fn wait(&self, timeout: Duration) -> bool {
        let mut concluded = self.concluded.lock();
        let _ = self
            .cond
            .wait_while_for(&mut concluded, |done| !*done, timeout);
        *concluded
    }
}

#[derive(Default)]
struct ChannelState {
    /// Channel of the last accepted `set_source`.
    current: Option<Channel>,
    /// Identity of the assigned server, empty when unassigned.
    server: String,
}

/// State shared between a device and its tuner session.
struct DeviceCore {
    index: usize,
    config: Arc<SatipConfig>,
    host: Arc<dyn HostServices>,
    host_device: Arc<dyn HostDevice>,
    ts_buffer: TsRingBuffer,
    section_filters: Box<dyn SectionFilterHandler>,
    dvr_open: AtomicBool,
    channel: Mutex<ChannelState>,
    tuned: TuneSignal,
}

impl DeviceCore {
    fn current_channel(&self) -> Option<Channel> {
        self.channel.lock().current.clone()
    }
}

#[derive(Default)]
struct PullState {
    /// Bytes handed out by the last pull, released on the next one.
    bytes_delivered: usize,
    /// Require a whole packet before pulling (CAM mode).
    check_ts_buffer: bool,
}

enum Pulled<R> {
    Short,
    Skip(usize),
    /// PID, payload size and what the caller took from the run.
    Packet(u16, usize, R),
}

/// A virtual tuner backed by a remote SAT>IP server.
pub struct SatipDevice {
    core: Arc<DeviceCore>,
    tuner: Box<dyn TunerSession>,
    discovery: Arc<dyn Discovery>,
    policy: Arc<dyn ProvisionPolicy>,
    switch_lock: Arc<ChannelSwitchLock>,
    pull: Mutex<PullState>,
    pid_stats: PidStatistics,
    buffer_stats: BufferStatistics,
    created: Instant,
}

impl SatipDevice {
    /// Create device `index` and start its section filter handler.
    pub fn new(index: usize, env: &DeviceEnvironment) -> Self {
        let config = env.config.clone();
        let bufsize = config.buffer_size - config.buffer_size % TS_PACKET_SIZE;
        let ts_buffer = TsRingBuffer::new(bufsize + 1, TS_PACKET_SIZE)
            .with_timeouts(config.buffer_read_timeout, config.buffer_write_timeout);
        let free = ts_buffer.free();

        let host_device = env.host.host_device(index);
        info!(
            "Creating device CardIndex={} [device {}]",
            host_device.card_index(),
            index
        );

        let core = Arc::new(DeviceCore {
            index,
            config,
            host: env.host.clone(),
            host_device,
            ts_buffer,
            section_filters: env.section_filters.create(index, bufsize + 1),
            dvr_open: AtomicBool::new(false),
            channel: Mutex::new(ChannelState::default()),
            tuned: TuneSignal::default(),
        });
        let tuner = env.tuners.create(DeviceLink { core: core.clone() }, free);
        core.section_filters.start();

        Self {
            core,
            tuner,
            discovery: env.discovery.clone(),
            policy: env.policy.clone(),
            switch_lock: env.switch_lock.clone(),
            pull: Mutex::new(PullState::default()),
            pid_stats: PidStatistics::new(),
            buffer_stats: BufferStatistics::new(bufsize + 1),
            created: Instant::now(),
        }
    }

    pub fn index(&self) -> usize {
        self.core.index
    }

    pub fn card_index(&self) -> i32 {
        self.core.host_device.card_index()
    }

    /// True while the host has receivers attached.
    pub fn receiving(&self) -> bool {
        self.core.host_device.receiving()
    }

    /// Identity of the assigned remote tuner, empty when unassigned.
    pub fn server_identity(&self) -> String {
        self.core.channel.lock().server.clone()
    }

    pub fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    /// "SAT>IP <index> (<source letters>) <server>".
    pub fn device_name(&self) -> String {
        let letters: String = SourceKind::ALL
            .iter()
            .filter(|kind| self.provides_source(Source::of_kind(**kind)))
            .map(|kind| kind.to_char())
            .collect();

        let mut name = format!("{} {} ({})", DEVICE_TYPE, self.core.index, letters);
        let server = self.server_identity();
        if !server.is_empty() {
            name.push(' ');
            name.push_str(&server);
        }
        name
    }

    /// Ready once a server is known or the ready timeout has passed.
    pub fn ready(&self) -> bool {
        self.discovery.server_count() > 0 || self.created.elapsed() > self.core.config.ready_timeout
    }

    pub fn avoid_recording(&self) -> bool {
        self.core.config.is_operating_mode_low()
    }

    pub fn has_internal_cam(&self) -> bool {
        self.core.config.ci_extension
    }

    pub fn provides_source(&self, source: Source) -> bool {
        let config = &self.core.config;
        let description = self.core.host.source_description(source);
        debug!(
            target: target::CHAN_SWITCH,
            "provides_source({}) desc='{}' [device {}]",
            source,
            description.as_deref().unwrap_or(""),
            self.core.index
        );

        if config.detached_mode {
            return false;
        }
        // Descriptions starting with '0' mark disabled sources
        if description.map_or(false, |d| d.starts_with('0')) {
            return false;
        }
        !config.is_operating_mode_off()
            && self.discovery.has_server(source)
            && !config.is_source_disabled(source)
    }

    pub fn provides_transponder(&self, channel: &Channel) -> bool {
        debug!(
            target: target::CHAN_SWITCH,
            "provides_transponder({}) transponder={} source={} [device {}]",
            channel.number,
            channel.transponder(),
            channel.source,
            self.core.index
        );
        self.provides_source(channel.source) && self.policy.provides_transponder(channel)
    }

    /// Decide whether this device can serve `channel` at `priority`.
    pub fn provides_channel(&self, channel: Option<&Channel>, priority: i32) -> Admission {
        let host_device = &self.core.host_device;
        let has_priority = priority == priority::IDLE || priority > host_device.priority();
        let mut admission = Admission::default();

        debug!(
            target: target::CHAN_SWITCH,
            "provides_channel({}, {}) [device {}]",
            channel.map_or(-1, |c| c.number as i64),
            priority,
            self.core.index
        );

        let Some(channel) = channel else {
            return admission;
        };
        if !self.provides_transponder(channel) {
            return admission;
        }

        admission.admitted = has_priority;
        if priority > priority::IDLE && host_device.receiving() {
            if self.is_tuned_to_transponder(channel) {
                let missing_pid = channel.required_pids().any(|pid| !host_device.has_pid(pid));
                if missing_pid {
                    match host_device.cam_slot() {
                        Some(cam) if channel.is_encrypted() => {
                            if cam.can_decrypt(channel) {
                                admission.admitted = true;
                            } else {
                                admission.needs_detach = true;
                            }
                        }
                        _ => admission.admitted = true,
                    }
                } else {
                    admission.admitted = self.core.config.frontend_reuse;
                }
            } else {
                admission.needs_detach = true;
            }
        }
        admission
    }

    pub fn provides_eit(&self) -> bool {
        self.core.config.eit_scan && self.policy.provides_eit()
    }

    pub fn num_provided_systems(&self) -> usize {
        let config = &self.core.config;
        let count = if config.is_operating_mode_low() {
            MAX_PROVIDED_SYSTEMS
        } else if config.is_operating_mode_high() {
            1
        } else {
            self.discovery.num_provided_systems()
        };
        count.clamp(1, MAX_PROVIDED_SYSTEMS)
    }

    /// Channel of the last accepted tuning request.
    pub fn currently_tuned_transponder(&self) -> Option<Channel> {
        self.core.current_channel()
    }

    pub fn is_tuned_to_transponder(&self, channel: &Channel) -> bool {
        if !self.tuner.is_tuned() {
            return false;
        }
        self.core.channel.lock().current.as_ref().map_or(false, |current| {
            current.source == channel.source
                && current.transponder() == channel.transponder()
                && current.parameters == channel.parameters
        })
    }

    pub fn may_switch_transponder(&self, channel: &Channel) -> bool {
        self.core.host_device.may_switch_transponder(channel)
    }

    /// DiSEqC source index taken from the leading number of the source
    /// description; 1 when there is none.
    fn diseqc_source(&self, source: Source) -> i32 {
        if !source.is_satellite() {
            return 1;
        }
        self.core
            .host
            .source_description(source)
            .and_then(|desc| {
                let digits: String = desc
                    .trim_start()
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                digits.parse().ok()
            })
            .unwrap_or(1)
    }

    /// Tune to `channel`, or release the remote tuner when `channel` is `None`.
    ///
    /// Only one device switches at a time. After an accepted request the
    /// call waits up to the tuning timeout for the session to report that
    /// tuning concluded; the switch lock is released during that wait. A
    /// timeout is not an error: check [`has_lock`](Self::has_lock) for the
    /// outcome.
    pub fn set_channel_device(
        &self,
        channel: Option<&Channel>,
        live_view: bool,
    ) -> Result<(), DeviceError> {
        let mut switch_guard = self.switch_lock.lock();
        let index = self.core.index;
        debug!(
            target: target::CHAN_SWITCH,
            "set_channel_device({}, {}) [device {}]",
            channel.map_or(-1, |c| c.number as i64),
            live_view,
            index
        );

        let Some(channel) = channel else {
            self.tuner.set_source(None, 0, "", index);
            self.core.channel.lock().server.clear();
            return Ok(());
        };

        let params = TransponderParams::parse(&channel.parameters).map_err(|reason| {
            error!(
                "Unrecognized channel parameters: {} [device {}]",
                channel.parameters, index
            );
            DeviceError::UnrecognizedParameters {
                parameters: channel.parameters.clone(),
                reason,
            }
        })?;
        let url_params = params.url_parameters(channel, self.diseqc_source(channel.source));

        let transponder = channel.transponder();
        let Some(server) = self.discovery.assign_server(
            index,
            channel.source,
            transponder,
            params.delivery_system(channel.source.kind),
        ) else {
            debug!(
                target: target::CHAN_SWITCH,
                "No server for {} [device {}]",
                channel.to_text(),
                index
            );
            return Err(DeviceError::NoServerAvailable {
                signal_source: channel.source,
                transponder,
            });
        };

        self.core.channel.lock().server = self.discovery.server_string(&server);

        self.core.tuned.reset();
        if self
            .tuner
            .set_source(Some(&server), transponder, &url_params, index)
        {
            self.core.channel.lock().current = Some(channel.clone());
            // Let other devices switch while this one waits for its tuner
            let concluded = MutexGuard::unlocked(&mut switch_guard, || {
                self.core.tuned.wait(self.core.config.tuning_timeout)
            });
            if !concluded {
                debug!(
                    target: target::CHAN_SWITCH,
                    "Tuning not concluded within {:?} [device {}]",
                    self.core.config.tuning_timeout,
                    index
                );
            }
        } else {
            warn!(
                "Server {} rejected transponder {} [device {}]",
                server, transponder, index
            );
        }
        Ok(())
    }

    /// Add or remove interest in a PID of the host's PID table.
    ///
    /// Interest is only dropped when neither the host nor a section filter
    /// still needs the PID.
    pub fn set_pid(
        &self,
        handle: &PidHandle,
        pid_type: PidType,
        on: bool,
    ) -> Result<bool, DeviceError> {
        debug!(
            target: target::PIDS,
            "set_pid({}, {:?}, {}) [device {}]",
            handle.pid,
            pid_type,
            on,
            self.core.index
        );
        if !(0..=MAX_PID as i32).contains(&handle.pid) {
            return Err(DeviceError::PidOutOfRange(handle.pid));
        }

        let pid = handle.pid as u16;
        if on {
            return Ok(self.tuner.set_pid(pid, pid_type, true));
        }
        if !handle.used && !self.core.section_filters.exists(pid) {
            return Ok(self.tuner.set_pid(pid, pid_type, false));
        }
        Ok(true)
    }

    pub fn open_filter(&self, pid: u16, tid: u8, mask: u8) -> Result<FilterHandle, DeviceError> {
        debug!(
            target: target::PIDS,
            "open_filter({}, {:02X}, {:02X}) [device {}]",
            pid,
            tid,
            mask,
            self.core.index
        );
        let handle = self
            .core
            .section_filters
            .open(pid, tid, mask)
            .ok_or(DeviceError::FilterOpenFailed { pid, tid, mask })?;
        self.tuner.set_pid(pid, PidType::Other, true);
        Ok(handle)
    }

    pub fn close_filter(&self, handle: FilterHandle) {
        let filters = &self.core.section_filters;
        let pid = filters.pid(handle);
        debug!(
            target: target::PIDS,
            "close_filter({:?}) [device {}]",
            pid,
            self.core.index
        );
        if let Some(pid) = pid {
            self.tuner.set_pid(pid, PidType::Other, false);
        }
        filters.close(handle);
    }

    /// Start the stream flow into the ring buffer.
    pub fn open_dvr(&self) -> bool {
        debug!(target: target::CHAN_SWITCH, "open_dvr [device {}]", self.core.index);
        self.pull.lock().bytes_delivered = 0;
        self.core.ts_buffer.clear();
        self.tuner.open();
        self.core.dvr_open.store(true, Ordering::Release);
        true
    }

    pub fn close_dvr(&self) {
        debug!(target: target::CHAN_SWITCH, "close_dvr [device {}]", self.core.index);
        if self.core.dvr_open.swap(false, Ordering::AcqRel) {
            self.tuner.close();
        }
        self.pull.lock().bytes_delivered = 0;
    }

    pub fn is_dvr_open(&self) -> bool {
        self.core.dvr_open.load(Ordering::Acquire)
    }

    /// Pull the next TS packet.
    ///
    /// `Ok(None)` means no packet is ready yet, including right after a
    /// resync. Detached devices refuse with [`DeviceError::Detached`].
    pub fn get_ts_packet(&self) -> Result<Option<TsPacket>, DeviceError> {
        if self.core.config.detached_mode {
            return Err(DeviceError::Detached);
        }

        let mut pull = self.pull.lock();
        if let Some(cam) = self
            .core
            .host_device
            .cam_slot()
            .filter(|cam| cam.wants_ts_data())
        {
            let check = pull.check_ts_buffer;
            let data = self
                .get_data(&mut pull, check, <[u8]>::to_vec)
                .unwrap_or_default();
            let decrypted = cam.decrypt(&data);
            self.skip_data(&mut pull, decrypted.consumed);
            pull.check_ts_buffer = decrypted.packet.is_some();
            return Ok(decrypted.packet);
        }

        let packet = self.get_data(&mut pull, false, |run| {
            let mut packet = [0u8; TS_PACKET_SIZE];
            packet.copy_from_slice(&run[..TS_PACKET_SIZE]);
            packet
        });
        if packet.is_some() {
            self.buffer_stats
                .add(TS_PACKET_SIZE, self.core.ts_buffer.available());
        }
        Ok(packet)
    }

    /// Hand the next readable run to `f` if it starts with a whole packet.
    ///
    /// Releases what the previous pull delivered first. A run not starting
    /// with a sync byte is dropped up to the next sync byte. `f` runs with the
    /// ring locked, so it only copies out what the caller needs.
    fn get_data<R>(
        &self,
        pull: &mut PullState,
        check_ts_buffer: bool,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Option<R> {
        debug!(target: target::FUNC, "get_data [device {}]", self.core.index);
        if !self.core.dvr_open.load(Ordering::Acquire) {
            return None;
        }

        let ts_buffer = &self.core.ts_buffer;
        if pull.bytes_delivered > 0 {
            ts_buffer.delete(pull.bytes_delivered);
            pull.bytes_delivered = 0;
        }
        if check_ts_buffer && ts_buffer.available() < TS_PACKET_SIZE {
            return None;
        }

        let pulled = ts_buffer.get(|run| {
            if run.len() < TS_PACKET_SIZE {
                return Pulled::Short;
            }
            if run[0] != TS_SYNC_BYTE {
                return Pulled::Skip(find_sync(run, 1).unwrap_or(run.len()));
            }
            Pulled::Packet(ts_pid(run), ts_payload_size(run), f(run))
        })?;

        match pulled {
            Pulled::Short => None,
            Pulled::Skip(count) => {
                ts_buffer.delete(count);
                info!(
                    "Skipped {} bytes to sync on TS packet [device {}]",
                    count, self.core.index
                );
                None
            }
            Pulled::Packet(pid, payload, result) => {
                self.pid_stats.add(pid, payload);
                pull.bytes_delivered = TS_PACKET_SIZE;
                Some(result)
            }
        }
    }

    fn skip_data(&self, pull: &mut PullState, count: usize) {
        pull.bytes_delivered = count;
        self.buffer_stats
            .add(count, self.core.ts_buffer.available());
    }

    /// Poll the lock state every 100 ms for up to `timeout`.
    pub fn has_lock(&self, timeout: Duration) -> bool {
        let mut remaining = timeout;
        while !remaining.is_zero() {
            if self.tuner.has_lock() {
                return true;
            }
            thread::sleep(LOCK_POLL_INTERVAL);
            remaining = remaining.saturating_sub(LOCK_POLL_INTERVAL);
        }
        self.tuner.has_lock()
    }

    pub fn signal_stats(&self) -> SignalStats {
        let strength = self.tuner.signal_strength_dbm();
        SignalStats {
            strength_dbm: (strength < STRENGTH_VALID_BELOW_DBM).then_some(strength),
            has_lock: self.has_lock(Duration::ZERO),
        }
    }

    pub fn signal_strength(&self) -> i32 {
        self.tuner.signal_strength()
    }

    pub fn signal_quality(&self) -> i32 {
        self.tuner.signal_quality()
    }

    /// Render an information page.
    ///
    /// Statistics pages restart their measurement window.
    pub fn information(&self, page: InfoPage) -> String {
        match page {
            InfoPage::General => self.general_information(),
            InfoPage::Pids => self.pid_stats.report(),
            InfoPage::Filters => self.filters_information(),
            InfoPage::Protocol => self.tuner.information(),
            InfoPage::Bitrate => self.tuner.statistic(),
            InfoPage::All => format!(
                "{}{}{}",
                self.general_information(),
                self.pid_stats.report(),
                self.filters_information()
            ),
        }
    }

    fn general_information(&self) -> String {
        format!(
            "SAT>IP device: {}\nCardIndex: {}\nStream: {}\nSignal: {}\nStream bitrate: {}\n{}Channel: {}\n",
            self.core.index,
            self.card_index(),
            self.tuner.information(),
            self.tuner.signal_status(),
            self.tuner.statistic(),
            self.buffer_stats.report(),
            self.core
                .current_channel()
                .map(|c| c.to_text())
                .unwrap_or_default()
        )
    }

    fn filters_information(&self) -> String {
        format!(
            "Active section filters:\n{}",
            self.core.section_filters.information()
        )
    }
}

impl Drop for SatipDevice {
    fn drop(&mut self) {
        debug!(target: target::FUNC, "Dropping device [device {}]", self.core.index);
        // Release any pending tuning wait
        self.core.tuned.notify();
        self.core.section_filters.stop();
    }
}

/// The device as seen by its tuner session.
#[derive(Clone)]
pub struct DeviceLink {
    core: Arc<DeviceCore>,
}

impl DeviceLink {
    /// Deliver stream bytes arriving from the server.
    ///
    /// Bytes enter the ring buffer only while the DVR is open; section
    /// filters see every byte.
    pub fn write_data(&self, data: &[u8]) {
        let core = &self.core;
        if core.dvr_open.load(Ordering::Acquire) {
            let written = core.ts_buffer.put(data);
            if written != data.len() {
                core.ts_buffer.report_overflow(data.len() - written);
            }
        }
        core.section_filters.write(data);
    }

    /// Report that the last tuning attempt concluded, either way.
    pub fn set_channel_tuned(&self) {
        debug!(
            target: target::CHAN_SWITCH,
            "set_channel_tuned [device {}]",
            self.core.index
        );
        self.core.tuned.notify();
    }

    pub fn id(&self) -> usize {
        self.core.index
    }

    /// PMT PID of the current service when it carries a CA id, else 0.
    pub fn pmt_pid(&self) -> u16 {
        let Some(channel) = self.core.current_channel() else {
            return 0;
        };
        let pid = if channel.ca() != 0 {
            self.core
                .host
                .pmt_pid(channel.source, channel.transponder(), channel.sid)
        } else {
            0
        };
        debug!(
            target: target::CI,
            "pmt_pid pmtpid={} source={} transponder={} sid={} name={} [device {}]",
            pid,
            channel.source,
            channel.transponder(),
            channel.sid,
            channel.name,
            self.core.index
        );
        pid
    }

    /// CI slot (1 or 2) whose CA system matches the current channel, 0 if none.
    pub fn ci_slot(&self) -> u8 {
        let Some(channel) = self.core.current_channel() else {
            return 0;
        };
        let cicams = &self.core.config.cicams;
        let handles = |slot: usize, caid: u16| cicams[slot].map_or(false, |ca| ca.contains(caid));

        let (slot, ca) = channel
            .caids
            .iter()
            .find_map(|&caid| {
                if handles(0, caid) {
                    Some((1, caid))
                } else if handles(1, caid) {
                    Some((2, caid))
                } else {
                    None
                }
            })
            .unwrap_or((0, 0));
        debug!(
            target: target::CI,
            "ci_slot slot={} ca={:X} name={} [device {}]",
            slot,
            ca,
            channel.name,
            self.core.index
        );
        slot
    }

    /// Tuner descriptor for the CI extension when the current channel
    /// carries a CA id.
    pub fn tnr_parameter_string(&self) -> Option<String> {
        let channel = self.core.current_channel()?;
        if channel.ca() == 0 {
            return None;
        }
        match tnr_parameters(&channel) {
            Ok(tnr) => Some(tnr),
            Err(e) => {
                warn!(
                    "Cannot build tuner descriptor for {}: {} [device {}]",
                    channel.name, e, self.core.index
                );
                None
            }
        }
    }

    /// True while the host has no receiver on the device.
    pub fn is_idle(&self) -> bool {
        !self.core.host_device.receiving()
    }
}
