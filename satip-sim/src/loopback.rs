//! In-process collaborators standing in for a SAT>IP server and a host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;

use satip_device::{
    CamSlot, DeviceLink, Discovery, FilterHandle, HostDevice, HostServices, SectionFilterHandler,
    TunerSession,
};
use satip_protocol::{
    priority, Channel, DeliverySystem, PidType, SatipServer, Source, SourceKind, TS_PACKET_SIZE,
    TS_SYNC_BYTE,
};

/// Packets generated per write.
const PACKETS_PER_CHUNK: usize = 7;

const CHUNK_INTERVAL: Duration = Duration::from_millis(2);

/// Server announced by [`LoopbackDiscovery`].
pub fn loopback_server() -> SatipServer {
    SatipServer::new("127.0.0.1", "loopback", "satip-sim")
}

pub struct LoopbackDiscovery {
    kinds: Vec<SourceKind>,
}

impl LoopbackDiscovery {
    pub fn new(kinds: Vec<SourceKind>) -> Self {
        Self { kinds }
    }
}

impl Discovery for LoopbackDiscovery {
    fn assign_server(
        &self,
        device_index: usize,
        source: Source,
        transponder: u32,
        system: DeliverySystem,
    ) -> Option<SatipServer> {
        debug!(
            "Assigning {} transponder {} ({}) to device {}",
            source, transponder, system, device_index
        );
        self.has_server(source).then(loopback_server)
    }

    fn has_server(&self, source: Source) -> bool {
        self.kinds.contains(&source.kind)
    }

    fn server_count(&self) -> usize {
        1
    }

    fn num_provided_systems(&self) -> usize {
        self.kinds.len()
    }
}

/// Stream generator state shared with the generator thread.
#[derive(Default)]
struct Stream {
    pids: Mutex<Vec<u16>>,
    running: AtomicBool,
    tuned: AtomicBool,
    continuity: AtomicU8,
}

impl Stream {
    fn chunk(&self) -> Vec<u8> {
        let pids = self.pids.lock().clone();
        let mut data = Vec::with_capacity(PACKETS_PER_CHUNK * TS_PACKET_SIZE);
        if pids.is_empty() {
            return data;
        }
        for i in 0..PACKETS_PER_CHUNK {
            let pid = pids[i % pids.len()];
            let cc = self.continuity.fetch_add(1, Ordering::Relaxed) & 0x0F;
            let mut packet = [0xFFu8; TS_PACKET_SIZE];
            packet[0] = TS_SYNC_BYTE;
            packet[1] = ((pid >> 8) & 0x1F) as u8;
            packet[2] = (pid & 0xFF) as u8;
            packet[3] = 0x10 | cc;
            data.extend_from_slice(&packet);
        }
        data
    }
}

/// A tuner session producing a synthetic stream of the requested PIDs.
pub struct LoopbackTuner {
    link: DeviceLink,
    stream: Arc<Stream>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackTuner {
    pub fn new(link: DeviceLink) -> Self {
        Self {
            link,
            stream: Arc::new(Stream::default()),
            worker: Mutex::new(None),
        }
    }

    fn stop(&self) {
        self.stream.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl TunerSession for LoopbackTuner {
    fn set_source(
        &self,
        server: Option<&SatipServer>,
        transponder: u32,
        parameters: &str,
        device_index: usize,
    ) -> bool {
        match server {
            Some(server) => {
                info!(
                    "[Loopback {}] Tuning {} transponder {}: {}",
                    device_index, server, transponder, parameters
                );
                self.stream.tuned.store(true, Ordering::Release);
                self.link.set_channel_tuned();
            }
            None => {
                info!("[Loopback {}] Releasing server", device_index);
                self.stream.tuned.store(false, Ordering::Release);
                self.stream.pids.lock().clear();
            }
        }
        true
    }

    fn set_pid(&self, pid: u16, _pid_type: PidType, on: bool) -> bool {
        let mut pids = self.stream.pids.lock();
        if on {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        } else {
            pids.retain(|p| *p != pid);
        }
        true
    }

    fn open(&self) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return true;
        }
        self.stream.running.store(true, Ordering::Release);

        let stream = self.stream.clone();
        let link = self.link.clone();
        *worker = Some(thread::spawn(move || {
            while stream.running.load(Ordering::Acquire) {
                if stream.tuned.load(Ordering::Acquire) {
                    let data = stream.chunk();
                    if !data.is_empty() {
                        link.write_data(&data);
                    }
                }
                thread::sleep(CHUNK_INTERVAL);
            }
        }));
        true
    }

    fn close(&self) -> bool {
        self.stop();
        true
    }

    fn has_lock(&self) -> bool {
        self.stream.tuned.load(Ordering::Acquire)
    }

    fn is_tuned(&self) -> bool {
        self.stream.tuned.load(Ordering::Acquire)
    }

    fn signal_strength(&self) -> i32 {
        if self.has_lock() {
            75
        } else {
            0
        }
    }

    fn signal_strength_dbm(&self) -> f64 {
        if self.has_lock() {
            -42.0
        } else {
            0.0
        }
    }

    fn signal_quality(&self) -> i32 {
        if self.has_lock() {
            100
        } else {
            0
        }
    }

    fn information(&self) -> String {
        format!("rtsp://127.0.0.1/ (loopback) pids={:?}", self.stream.pids.lock())
    }

    fn signal_status(&self) -> String {
        format!(
            "lock={} strength={} quality={}",
            self.has_lock(),
            self.signal_strength(),
            self.signal_quality()
        )
    }

    fn statistic(&self) -> String {
        let kbits = (PACKETS_PER_CHUNK * TS_PACKET_SIZE * 8) as u128
            / CHUNK_INTERVAL.as_millis().max(1);
        format!("{} kbit/s", kbits)
    }
}

impl Drop for LoopbackTuner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Section filters that only keep track of what is open.
#[derive(Default)]
pub struct LoopbackFilters {
    filters: Mutex<Vec<Option<(u16, u8, u8)>>>,
}

impl SectionFilterHandler for LoopbackFilters {
    fn open(&self, pid: u16, tid: u8, mask: u8) -> Option<FilterHandle> {
        let mut filters = self.filters.lock();
        let index = match filters.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                filters.push(None);
                filters.len() - 1
            }
        };
        filters[index] = Some((pid, tid, mask));
        Some(FilterHandle(index))
    }

    fn close(&self, handle: FilterHandle) {
        if let Some(filter) = self.filters.lock().get_mut(handle.0) {
            *filter = None;
        }
    }

    fn exists(&self, pid: u16) -> bool {
        self.filters.lock().iter().flatten().any(|(p, _, _)| *p == pid)
    }

    fn pid(&self, handle: FilterHandle) -> Option<u16> {
        self.filters
            .lock()
            .get(handle.0)
            .copied()
            .flatten()
            .map(|(pid, _, _)| pid)
    }

    fn write(&self, _data: &[u8]) {}

    fn information(&self) -> String {
        self.filters
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.map(|(pid, tid, mask)| (i, pid, tid, mask)))
            .map(|(i, pid, tid, mask)| {
                format!("#{} pid={} tid=0x{:02X} mask=0x{:02X}\n", i, pid, tid, mask)
            })
            .collect()
    }
}

/// Host side of one device: a single live receiver.
pub struct LoopbackHostDevice {
    card_index: i32,
    receiving: AtomicBool,
    pids: Mutex<Vec<u16>>,
}

impl LoopbackHostDevice {
    pub fn attach(&self, pids: &[u16]) {
        self.pids.lock().extend_from_slice(pids);
        self.receiving.store(true, Ordering::Release);
    }
}

impl HostDevice for LoopbackHostDevice {
    fn card_index(&self) -> i32 {
        self.card_index
    }

    fn priority(&self) -> i32 {
        if self.receiving() {
            0
        } else {
            priority::IDLE
        }
    }

    fn receiving(&self) -> bool {
        self.receiving.load(Ordering::Acquire)
    }

    fn has_pid(&self, pid: u16) -> bool {
        self.pids.lock().contains(&pid)
    }

    fn cam_slot(&self) -> Option<Arc<dyn CamSlot>> {
        None
    }

    fn may_switch_transponder(&self, _channel: &Channel) -> bool {
        !self.receiving()
    }
}

#[derive(Default)]
pub struct LoopbackHost {
    devices: Mutex<HashMap<usize, Arc<LoopbackHostDevice>>>,
    descriptions: HashMap<Source, String>,
}

impl LoopbackHost {
    pub fn with_descriptions(descriptions: HashMap<Source, String>) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            descriptions,
        }
    }

    pub fn device(&self, device_index: usize) -> Arc<LoopbackHostDevice> {
        self.devices
            .lock()
            .entry(device_index)
            .or_insert_with(|| {
                Arc::new(LoopbackHostDevice {
                    card_index: device_index as i32,
                    receiving: AtomicBool::new(false),
                    pids: Mutex::new(Vec::new()),
                })
            })
            .clone()
    }
}

impl HostServices for LoopbackHost {
    fn host_device(&self, device_index: usize) -> Arc<dyn HostDevice> {
        self.device(device_index)
    }

    fn source_description(&self, source: Source) -> Option<String> {
        self.descriptions.get(&source).cloned()
    }

    fn pmt_pid(&self, _source: Source, _transponder: u32, _sid: u16) -> u16 {
        0
    }

    fn active_recordings(&self, _card_index: i32) -> usize {
        0
    }

    fn is_live_device(&self, card_index: i32) -> bool {
        card_index == 0
    }
}
