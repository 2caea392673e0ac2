//! In-process collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use satip_protocol::{
    priority, Channel, DeliverySystem, PidType, SatipServer, Source, SourceKind, TS_PACKET_SIZE,
};

use crate::config::SatipConfig;
use crate::device::{DeviceEnvironment, DeviceLink, SatipDevice};
use crate::discovery::Discovery;
use crate::host::{CamSlot, Decrypted, HostDevice, HostServices};
use crate::packet::TsPacket;
use crate::section_filter::{FilterHandle, SectionFilterHandler};
use crate::tuner::TunerSession;

/// Card indices of the fake host start here.
pub const CARD_OFFSET: i32 = 3;

/// Number of filters a fake section filter handler accepts.
pub const FILTER_SLOTS: usize = 4;

pub fn test_config() -> SatipConfig {
    SatipConfig {
        buffer_size: TS_PACKET_SIZE * 64,
        tuning_timeout: Duration::from_millis(200),
        buffer_read_timeout: Duration::from_millis(5),
        buffer_write_timeout: Duration::from_millis(5),
        ..SatipConfig::default()
    }
}

pub fn satellite_channel() -> Channel {
    let mut channel = Channel::new(
        1,
        "Das Erste HD",
        Source::satellite(192),
        11494,
        "HC23M5O35P0S1",
    );
    channel.srate = 22000;
    channel.sid = 10301;
    channel.vpid = 5101;
    channel.apids = vec![5102];
    channel
}

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunerCommand {
    SetSource {
        server: Option<String>,
        transponder: u32,
        parameters: String,
    },
    SetPid {
        pid: u16,
        on: bool,
    },
    Open,
    Close,
}

/// Observable state of a fake tuner session.
pub struct TunerProbe {
    link: DeviceLink,
    commands: Mutex<Vec<TunerCommand>>,
    accept: AtomicBool,
    notify: AtomicBool,
    tuned: AtomicBool,
    lock: AtomicBool,
    strength_dbm: Mutex<f64>,
    events: Events,
    delay: Arc<Mutex<Duration>>,
}

impl TunerProbe {
    pub fn link(&self) -> DeviceLink {
        self.link.clone()
    }

    pub fn commands(&self) -> Vec<TunerCommand> {
        self.commands.lock().clone()
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Whether an accepted `set_source` reports tuning concluded right away.
    pub fn set_notify(&self, notify: bool) {
        self.notify.store(notify, Ordering::SeqCst);
    }

    pub fn set_lock(&self, lock: bool) {
        self.lock.store(lock, Ordering::SeqCst);
    }

    pub fn set_strength_dbm(&self, dbm: f64) {
        *self.strength_dbm.lock() = dbm;
    }
}

struct FakeTuner {
    probe: Arc<TunerProbe>,
}

impl TunerSession for FakeTuner {
    fn set_source(
        &self,
        server: Option<&SatipServer>,
        transponder: u32,
        parameters: &str,
        device_index: usize,
    ) -> bool {
        let probe = &self.probe;
        probe.events.lock().push(format!("enter {}", device_index));
        let delay = *probe.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        probe.commands.lock().push(TunerCommand::SetSource {
            server: server.map(|s| s.to_string()),
            transponder,
            parameters: parameters.to_string(),
        });
        probe.events.lock().push(format!("leave {}", device_index));

        if server.is_none() {
            probe.tuned.store(false, Ordering::SeqCst);
            return true;
        }
        if !probe.accept.load(Ordering::SeqCst) {
            return false;
        }
        probe.tuned.store(true, Ordering::SeqCst);
        if probe.notify.load(Ordering::SeqCst) {
            probe.link.set_channel_tuned();
        }
        true
    }

    fn set_pid(&self, pid: u16, _pid_type: PidType, on: bool) -> bool {
        self.probe
            .commands
            .lock()
            .push(TunerCommand::SetPid { pid, on });
        true
    }

    fn open(&self) -> bool {
        self.probe.commands.lock().push(TunerCommand::Open);
        true
    }

    fn close(&self) -> bool {
        self.probe.commands.lock().push(TunerCommand::Close);
        true
    }

    fn has_lock(&self) -> bool {
        self.probe.lock.load(Ordering::SeqCst)
    }

    fn is_tuned(&self) -> bool {
        self.probe.tuned.load(Ordering::SeqCst)
    }

    fn signal_strength(&self) -> i32 {
        if self.has_lock() {
            80
        } else {
            0
        }
    }

    fn signal_strength_dbm(&self) -> f64 {
        *self.probe.strength_dbm.lock()
    }

    fn signal_quality(&self) -> i32 {
        if self.has_lock() {
            90
        } else {
            0
        }
    }

    fn information(&self) -> String {
        "fake session".to_string()
    }

    fn signal_status(&self) -> String {
        format!("lock={}", self.has_lock())
    }

    fn statistic(&self) -> String {
        "0 kbit/s".to_string()
    }
}

/// Fake section filter handler with a fixed number of slots.
#[derive(Default)]
pub struct FilterProbe {
    slots: Mutex<Vec<Option<(u16, u8, u8)>>>,
    written: AtomicUsize,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl FilterProbe {
    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl SectionFilterHandler for Arc<FilterProbe> {
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn open(&self, pid: u16, tid: u8, mask: u8) -> Option<FilterHandle> {
        let mut slots = self.slots.lock();
        if let Some(index) = slots.iter().position(Option::is_none) {
            slots[index] = Some((pid, tid, mask));
            return Some(FilterHandle(index));
        }
        if slots.len() >= FILTER_SLOTS {
            return None;
        }
        slots.push(Some((pid, tid, mask)));
        Some(FilterHandle(slots.len() - 1))
    }

    fn close(&self, handle: FilterHandle) {
        if let Some(slot) = self.slots.lock().get_mut(handle.0) {
            *slot = None;
        }
    }

    fn exists(&self, pid: u16) -> bool {
        self.slots
            .lock()
            .iter()
            .flatten()
            .any(|(p, _, _)| *p == pid)
    }

    fn pid(&self, handle: FilterHandle) -> Option<u16> {
        self.slots
            .lock()
            .get(handle.0)
            .copied()
            .flatten()
            .map(|(pid, _, _)| pid)
    }

    fn write(&self, data: &[u8]) {
        self.written.fetch_add(data.len(), Ordering::SeqCst);
    }

    fn information(&self) -> String {
        self.slots
            .lock()
            .iter()
            .flatten()
            .map(|(pid, tid, mask)| format!("0x{:02X} 0x{:02X} 0x{:02X}\n", pid, tid, mask))
            .collect()
    }
}

/// Discovery with one server serving every source of the registered kinds.
pub struct FakeDiscovery {
    kinds: Mutex<Vec<SourceKind>>,
    available: AtomicBool,
    server_count: AtomicUsize,
    num_systems: AtomicUsize,
    events: Events,
}

impl FakeDiscovery {
    pub fn add_source(&self, source: Source) {
        let mut kinds = self.kinds.lock();
        if !kinds.contains(&source.kind) {
            kinds.push(source.kind);
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_server_count(&self, count: usize) {
        self.server_count.store(count, Ordering::SeqCst);
    }

    pub fn set_num_systems(&self, count: usize) {
        self.num_systems.store(count, Ordering::SeqCst);
    }
}

impl Discovery for FakeDiscovery {
    fn assign_server(
        &self,
        device_index: usize,
        source: Source,
        _transponder: u32,
        _system: DeliverySystem,
    ) -> Option<SatipServer> {
        self.events.lock().push(format!("assign {}", device_index));
        if !self.available.load(Ordering::SeqCst) || !self.has_server(source) {
            return None;
        }
        Some(SatipServer::new("192.168.0.10", "minisatip", "OctopusNet"))
    }

    fn has_server(&self, source: Source) -> bool {
        self.kinds.lock().contains(&source.kind)
    }

    fn server_count(&self) -> usize {
        self.server_count.load(Ordering::SeqCst)
    }

    fn num_provided_systems(&self) -> usize {
        self.num_systems.load(Ordering::SeqCst)
    }
}

pub struct FakeCam {
    can_decrypt: bool,
    wants_ts_data: AtomicBool,
    fed: Mutex<Vec<usize>>,
    write_back: Mutex<Option<DeviceLink>>,
}

impl FakeCam {
    pub fn new(can_decrypt: bool) -> Arc<Self> {
        Arc::new(Self {
            can_decrypt,
            wants_ts_data: AtomicBool::new(false),
            fed: Mutex::new(Vec::new()),
            write_back: Mutex::new(None),
        })
    }

    /// Write every decrypted packet back into the device through `link`.
    pub fn set_write_back(&self, link: DeviceLink) {
        *self.write_back.lock() = Some(link);
    }

    pub fn set_wants_ts_data(&self, wants: bool) {
        self.wants_ts_data.store(wants, Ordering::SeqCst);
    }

    /// Lengths of the data handed to `decrypt`, in call order.
    pub fn fed(&self) -> Vec<usize> {
        self.fed.lock().clone()
    }
}

impl CamSlot for FakeCam {
    fn can_decrypt(&self, _channel: &Channel) -> bool {
        self.can_decrypt
    }

    fn wants_ts_data(&self) -> bool {
        self.wants_ts_data.load(Ordering::SeqCst)
    }

    /// Passes one packet through unchanged.
    fn decrypt(&self, data: &[u8]) -> Decrypted {
        self.fed.lock().push(data.len());
        if data.len() < TS_PACKET_SIZE {
            return Decrypted::default();
        }
        let mut packet: TsPacket = [0; TS_PACKET_SIZE];
        packet.copy_from_slice(&data[..TS_PACKET_SIZE]);
        if let Some(link) = self.write_back.lock().as_ref() {
            link.write_data(&packet);
        }
        Decrypted {
            packet: Some(packet),
            consumed: TS_PACKET_SIZE,
        }
    }
}

pub struct FakeHostDevice {
    card_index: i32,
    priority: AtomicI32,
    receiving: AtomicBool,
    pids: Mutex<HashSet<u16>>,
    cam: Mutex<Option<Arc<FakeCam>>>,
}

impl FakeHostDevice {
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::SeqCst);
    }

    pub fn set_receiving(&self, receiving: bool) {
        self.receiving.store(receiving, Ordering::SeqCst);
    }

    pub fn add_pids(&self, pids: &[u16]) {
        self.pids.lock().extend(pids.iter().copied());
    }

    pub fn set_cam(&self, cam: Option<Arc<FakeCam>>) {
        *self.cam.lock() = cam;
    }
}

impl HostDevice for FakeHostDevice {
    fn card_index(&self) -> i32 {
        self.card_index
    }

    fn priority(&self) -> i32 {
        self.priority.load(Ordering::SeqCst)
    }

    fn receiving(&self) -> bool {
        self.receiving.load(Ordering::SeqCst)
    }

    fn has_pid(&self, pid: u16) -> bool {
        self.pids.lock().contains(&pid)
    }

    fn cam_slot(&self) -> Option<Arc<dyn CamSlot>> {
        self.cam
            .lock()
            .clone()
            .map(|cam| cam as Arc<dyn CamSlot>)
    }

    fn may_switch_transponder(&self, _channel: &Channel) -> bool {
        !self.receiving()
    }
}

#[derive(Default)]
pub struct FakeHost {
    devices: Mutex<HashMap<usize, Arc<FakeHostDevice>>>,
    descriptions: Mutex<HashMap<Source, String>>,
    recordings: Mutex<HashMap<i32, usize>>,
    live_card: Mutex<Option<i32>>,
}

impl FakeHost {
    pub fn describe(&self, source: Source, description: &str) {
        self.descriptions
            .lock()
            .insert(source, description.to_string());
    }

    pub fn set_recordings(&self, card_index: i32, count: usize) {
        self.recordings.lock().insert(card_index, count);
    }

    pub fn set_live_card(&self, card_index: Option<i32>) {
        *self.live_card.lock() = card_index;
    }

    fn device(&self, device_index: usize) -> Arc<FakeHostDevice> {
        self.devices
            .lock()
            .entry(device_index)
            .or_insert_with(|| {
                Arc::new(FakeHostDevice {
                    card_index: device_index as i32 + CARD_OFFSET,
                    priority: AtomicI32::new(priority::IDLE),
                    receiving: AtomicBool::new(false),
                    pids: Mutex::new(HashSet::new()),
                    cam: Mutex::new(None),
                })
            })
            .clone()
    }
}

impl HostServices for FakeHost {
    fn host_device(&self, device_index: usize) -> Arc<dyn HostDevice> {
        self.device(device_index)
    }

    fn source_description(&self, source: Source) -> Option<String> {
        self.descriptions.lock().get(&source).cloned()
    }

    fn pmt_pid(&self, _source: Source, _transponder: u32, _sid: u16) -> u16 {
        0x0064
    }

    fn active_recordings(&self, card_index: i32) -> usize {
        self.recordings
            .lock()
            .get(&card_index)
            .copied()
            .unwrap_or(0)
    }

    fn is_live_device(&self, card_index: i32) -> bool {
        *self.live_card.lock() == Some(card_index)
    }
}

/// A device environment wired to fakes.
pub struct Fixture {
    pub env: DeviceEnvironment,
    pub discovery: Arc<FakeDiscovery>,
    pub host: Arc<FakeHost>,
    tuners: Arc<Mutex<HashMap<usize, Arc<TunerProbe>>>>,
    filters: Arc<Mutex<HashMap<usize, Arc<FilterProbe>>>>,
    events: Events,
    delay: Arc<Mutex<Duration>>,
}

impl Fixture {
    pub fn new(config: SatipConfig) -> Self {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let delay = Arc::new(Mutex::new(Duration::ZERO));

        let discovery = Arc::new(FakeDiscovery {
            kinds: Mutex::new(vec![SourceKind::Satellite]),
            available: AtomicBool::new(true),
            server_count: AtomicUsize::new(1),
            num_systems: AtomicUsize::new(2),
            events: events.clone(),
        });
        let host = Arc::new(FakeHost::default());

        let tuners: Arc<Mutex<HashMap<usize, Arc<TunerProbe>>>> = Arc::default();
        let tuner_factory = {
            let tuners = tuners.clone();
            let events = events.clone();
            let delay = delay.clone();
            move |link: DeviceLink, _buffer_size: usize| -> Box<dyn TunerSession> {
                let probe = Arc::new(TunerProbe {
                    link: link.clone(),
                    commands: Mutex::new(Vec::new()),
                    accept: AtomicBool::new(true),
                    notify: AtomicBool::new(true),
                    tuned: AtomicBool::new(false),
                    lock: AtomicBool::new(false),
                    strength_dbm: Mutex::new(0.0),
                    events: events.clone(),
                    delay: delay.clone(),
                });
                tuners.lock().insert(link.id(), probe.clone());
                Box::new(FakeTuner { probe })
            }
        };

        let filters: Arc<Mutex<HashMap<usize, Arc<FilterProbe>>>> = Arc::default();
        let filter_factory = {
            let filters = filters.clone();
            move |device_index: usize, _buffer_size: usize| -> Box<dyn SectionFilterHandler> {
                let probe = Arc::new(FilterProbe::default());
                filters.lock().insert(device_index, probe.clone());
                Box::new(probe)
            }
        };

        let env = DeviceEnvironment::new(
            config,
            discovery.clone(),
            host.clone(),
            Arc::new(tuner_factory),
            Arc::new(filter_factory),
        );

        Self {
            env,
            discovery,
            host,
            tuners,
            filters,
            events,
            delay,
        }
    }

    pub fn device(&self, index: usize) -> SatipDevice {
        SatipDevice::new(index, &self.env)
    }

    pub fn tuner(&self, index: usize) -> Arc<TunerProbe> {
        self.tuners.lock()[&index].clone()
    }

    pub fn filters(&self, index: usize) -> Arc<FilterProbe> {
        self.filters.lock()[&index].clone()
    }

    pub fn host_device(&self, index: usize) -> Arc<FakeHostDevice> {
        self.host.device(index)
    }

    /// Delay every fake `set_source` call.
    pub fn set_set_source_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Ordered log of discovery and tuner calls.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}
