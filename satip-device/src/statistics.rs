//! PID and buffer statistics.
//!
//! Both modules accumulate over a measurement window that restarts every
//! time a report is rendered.

use std::fmt::Write;
use std::time::Instant;

use parking_lot::Mutex;

/// Number of PIDs tracked by [`PidStatistics`].
const PID_STATISTICS_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PidEntry {
    pid: Option<u16>,
    bytes: u64,
}

struct PidWindow {
    entries: [PidEntry; PID_STATISTICS_SIZE],
    started: Instant,
}

/// Payload bytes per PID for the most active PIDs.
pub struct PidStatistics {
    window: Mutex<PidWindow>,
}

impl Default for PidStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl PidStatistics {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(PidWindow {
                entries: [PidEntry::default(); PID_STATISTICS_SIZE],
                started: Instant::now(),
            }),
        }
    }

    /// Account `payload` bytes to `pid`.
    ///
    /// An untracked PID displaces the least active entry only when its
    /// payload outweighs that entry.
    pub fn add(&self, pid: u16, payload: usize) {
        let payload = payload as u64;
        let mut window = self.window.lock();
        let entries = &mut window.entries;

        if let Some(entry) = entries.iter_mut().find(|e| e.pid == Some(pid)) {
            entry.bytes += payload;
        } else {
            let last = &mut entries[PID_STATISTICS_SIZE - 1];
            if last.pid.is_some() && last.bytes >= payload {
                return;
            }
            *last = PidEntry {
                pid: Some(pid),
                bytes: payload,
            };
        }
        // Unused entries sort last
        entries.sort_by(|a, b| {
            b.pid
                .is_some()
                .cmp(&a.pid.is_some())
                .then(b.bytes.cmp(&a.bytes))
        });
    }

    /// PIDs currently tracked, most active first.
    pub fn active_pids(&self) -> Vec<(u16, u64)> {
        self.window
            .lock()
            .entries
            .iter()
            .filter_map(|e| e.pid.map(|pid| (pid, e.bytes)))
            .collect()
    }

    /// Render the report and start a new window.
    pub fn report(&self) -> String {
        let mut window = self.window.lock();
        let elapsed_ms = window.started.elapsed().as_millis().max(1) as u64;

        let mut s = String::from("Active pids:\n");
        for (i, entry) in window.entries.iter().enumerate() {
            if let Some(pid) = entry.pid {
                // bytes per ms equals kB/s
                let kbits = entry.bytes * 8 / elapsed_ms;
                let _ = writeln!(s, "Pid {}: {:4} ({:4} kbit/s)", i, pid, kbits);
            }
        }

        window.entries = [PidEntry::default(); PID_STATISTICS_SIZE];
        window.started = Instant::now();
        s
    }
}

struct BufferWindow {
    delivered: u64,
    peak_used: usize,
    started: Instant,
}

/// Delivered bytes and peak ring buffer fill.
pub struct BufferStatistics {
    total_space: usize,
    window: Mutex<BufferWindow>,
}

impl BufferStatistics {
    pub fn new(total_space: usize) -> Self {
        Self {
            total_space,
            window: Mutex::new(BufferWindow {
                delivered: 0,
                peak_used: 0,
                started: Instant::now(),
            }),
        }
    }

    /// Record `bytes` handed to the consumer while `used` bytes were queued.
    pub fn add(&self, bytes: usize, used: usize) {
        let mut window = self.window.lock();
        window.delivered += bytes as u64;
        window.peak_used = window.peak_used.max(used);
    }

    pub fn delivered(&self) -> u64 {
        self.window.lock().delivered
    }

    /// Render the report and start a new window.
    pub fn report(&self) -> String {
        let mut window = self.window.lock();
        let elapsed_ms = window.started.elapsed().as_millis().max(1) as u64;
        let bitrate = window.delivered * 8 / elapsed_ms;
        let used_kbit = window.peak_used as u64 * 8 / 1000;
        let total_kbit = self.total_space as u64 * 8 / 1000;
        let percent = if self.total_space > 0 {
            window.peak_used as f64 * 100.0 / self.total_space as f64
        } else {
            0.0
        };

        let s = format!(
            "Buffer bitrate: {} kbit/s\nBuffer usage: {}/{} kbit ({:.1}%)\n",
            bitrate, used_kbit, total_kbit, percent
        );

        window.delivered = 0;
        window.peak_used = 0;
        window.started = Instant::now();
        s
    }
}
