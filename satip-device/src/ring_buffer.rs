//! Ring buffer for TS data between the stream receiver and the packet consumer.

use std::time::{Duration, Instant};

use log::{error, warn};
use parking_lot::{Condvar, Mutex};

/// Minimum delay between two overflow reports in the log.
const OVERFLOW_REPORT_DELAY: Duration = Duration::from_secs(60);

/// A fixed-capacity byte ring for TS data.
///
/// Designed for one producer (the tuner session writing arriving stream
/// bytes) and one consumer (the host pulling packets). One slot is kept free
/// to tell a full ring from an empty one, so a capacity of `n * 188 + 1`
/// holds exactly `n` packets.
pub struct TsRingBuffer {
    ring: Mutex<Ring>,
    /// Signalled when bytes were put.
    data_ready: Condvar,
    /// Signalled when bytes were deleted.
    space_ready: Condvar,
    capacity: usize,
    /// Minimum contiguous run handed to readers when more is queued.
    margin: usize,
    read_timeout: Duration,
    write_timeout: Duration,
    overflow: Mutex<OverflowReport>,
}

struct Ring {
    buffer: Box<[u8]>,
    /// Write position.
    head: usize,
    /// Read position.
    tail: usize,
    /// Scratch area for runs that wrap past the end of `buffer`.
    linear: Vec<u8>,
}

#[derive(Default)]
struct OverflowReport {
    count: u64,
    bytes: u64,
    total_bytes: u64,
    last_report: Option<Instant>,
}

impl Ring {
    fn available(&self) -> usize {
        let cap = self.buffer.len();
        (self.head + cap - self.tail) % cap
    }

    fn free(&self) -> usize {
        self.buffer.len() - self.available() - 1
    }
}

impl TsRingBuffer {
    /// Create a ring of `capacity` bytes that hands out runs of at least
    /// `margin` bytes whenever that many are queued.
    pub fn new(capacity: usize, margin: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            ring: Mutex::new(Ring {
                // Allocate directly on heap to avoid stack overflow
                buffer: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                linear: Vec::with_capacity(margin),
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
            capacity,
            margin: margin.clamp(1, capacity - 1),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            overflow: Mutex::new(OverflowReport::default()),
        }
    }

    /// Set how long `get` waits for data and `put` waits for space.
    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes queued for reading.
    pub fn available(&self) -> usize {
        self.ring.lock().available()
    }

    /// Number of bytes that can be put without overflowing.
    pub fn free(&self) -> usize {
        self.ring.lock().free()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Write data to the buffer.
    ///
    /// When the ring is too full the writer is throttled for up to the write
    /// timeout. Returns the number of bytes written, which is less than
    /// `data.len()` if the consumer did not make room in time.
    pub fn put(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let mut ring = self.ring.lock();
        if ring.free() < data.len() && !self.write_timeout.is_zero() {
            self.space_ready.wait_for(&mut ring, self.write_timeout);
        }

        let to_write = data.len().min(ring.free());
        if to_write == 0 {
            return 0;
        }

        let head = ring.head;
        let first_chunk = to_write.min(self.capacity - head);
        ring.buffer[head..head + first_chunk].copy_from_slice(&data[..first_chunk]);
        if first_chunk < to_write {
            ring.buffer[..to_write - first_chunk].copy_from_slice(&data[first_chunk..to_write]);
        }
        ring.head = (head + to_write) % self.capacity;
        drop(ring);

        self.data_ready.notify_one();
        to_write
    }

    /// Hand the next readable run to `f`.
    ///
    /// The run starts at the read position and is contiguous; it may be
    /// shorter than what is queued when the queued bytes wrap past the end of
    /// the ring, but it is never shorter than the margin while at least that
    /// many bytes are queued. Nothing is consumed: call [`delete`](Self::delete)
    /// with the number of bytes used. While fewer than the margin are queued
    /// it waits up to the read timeout for more, then hands out what is there
    /// or returns `None` if nothing arrived.
    ///
    /// `f` runs with the ring locked and must not call back into it.
    pub fn get<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut ring = self.ring.lock();
        if ring.available() < self.margin && !self.read_timeout.is_zero() {
            let margin = self.margin;
            let _ = self.data_ready.wait_while_for(
                &mut ring,
                |ring| ring.available() < margin,
                self.read_timeout,
            );
        }

        let available = ring.available();
        if available == 0 {
            return None;
        }

        let Ring {
            buffer,
            head,
            tail,
            linear,
        } = &mut *ring;
        let contiguous = if *head >= *tail {
            *head - *tail
        } else {
            self.capacity - *tail
        };

        if contiguous >= self.margin || contiguous == available {
            return Some(f(&buffer[*tail..*tail + contiguous]));
        }

        // The run wraps before the margin is reached: present it linearised
        let wanted = available.min(self.margin);
        linear.clear();
        linear.extend_from_slice(&buffer[*tail..]);
        linear.extend_from_slice(&buffer[..wanted - contiguous]);
        Some(f(linear.as_slice()))
    }

    /// Release `count` bytes from the read position.
    pub fn delete(&self, count: usize) {
        let mut ring = self.ring.lock();
        let available = ring.available();
        let count = if count > available {
            error!(
                "Invalid ring buffer delete request: {} bytes, {} available",
                count, available
            );
            available
        } else {
            count
        };
        ring.tail = (ring.tail + count) % self.capacity;
        drop(ring);

        self.space_ready.notify_one();
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.head = 0;
        ring.tail = 0;
        drop(ring);

        self.space_ready.notify_all();
    }

    /// Account for bytes that could not be put.
    ///
    /// Overflows are summarised in the log at most once per minute.
    pub fn report_overflow(&self, bytes: usize) {
        let mut report = self.overflow.lock();
        report.count += 1;
        report.bytes += bytes as u64;
        report.total_bytes += bytes as u64;

        let due = report
            .last_report
            .map_or(true, |last| last.elapsed() >= OVERFLOW_REPORT_DELAY);
        if due {
            warn!(
                "{} ring buffer overflow{} ({} bytes dropped)",
                report.count,
                if report.count > 1 { "s" } else { "" },
                report.bytes
            );
            report.count = 0;
            report.bytes = 0;
            report.last_report = Some(Instant::now());
        }
    }

    /// Total bytes dropped since creation.
    pub fn overflow_bytes(&self) -> u64 {
        self.overflow.lock().total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use satip_protocol::TS_PACKET_SIZE;

    fn read_all(buffer: &TsRingBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(n) = buffer.get(|run| {
            out.extend_from_slice(run);
            run.len()
        }) {
            buffer.delete(n);
        }
        out
    }

    #[test]
    fn test_write_read() {
        let buffer = TsRingBuffer::new(TS_PACKET_SIZE * 10 + 1, TS_PACKET_SIZE);

        let data = vec![0x47u8; TS_PACKET_SIZE * 8];
        assert_eq!(buffer.put(&data), data.len());
        assert_eq!(buffer.available(), data.len());

        let len = buffer.get(|run| run.len()).unwrap();
        assert_eq!(len, data.len());
        buffer.delete(1000);
        assert_eq!(buffer.available(), data.len() - 1000);
    }

    #[test]
    fn test_capacity_holds_whole_packets() {
        let buffer = TsRingBuffer::new(TS_PACKET_SIZE * 3 + 1, TS_PACKET_SIZE);
        assert_eq!(buffer.free(), TS_PACKET_SIZE * 3);

        let data = vec![0u8; TS_PACKET_SIZE * 4];
        let written = buffer.put(&data);
        assert_eq!(written, TS_PACKET_SIZE * 3);
        assert_eq!(buffer.free(), 0);
        assert!(buffer.available() <= buffer.capacity());
    }

    #[test]
    fn test_overflow_round_trip() {
        let buffer = TsRingBuffer::new(1001, TS_PACKET_SIZE);
        let data: Vec<u8> = (0..1500u32).map(|i| i as u8).collect();

        let written = buffer.put(&data);
        let overflow = data.len() - written;
        assert_eq!(overflow, 500);
        buffer.report_overflow(overflow);
        assert_eq!(buffer.overflow_bytes(), 500);

        let read = read_all(&buffer);
        assert_eq!(read.len(), data.len() - overflow);
        assert_eq!(&read[..], &data[..written]);
    }

    #[test]
    fn test_wrapped_run_is_linearised_up_to_margin() {
        let buffer = TsRingBuffer::new(1001, 188);

        // Move the positions close to the end of the ring
        assert_eq!(buffer.put(&vec![0u8; 900]), 900);
        buffer.delete(900);

        let data: Vec<u8> = (0..400u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(buffer.put(&data), 400);

        // Only 101 bytes are contiguous, less than the margin
        let first = buffer.get(|run| run.to_vec()).unwrap();
        assert_eq!(first.len(), 188);
        assert_eq!(&first[..], &data[..188]);
        buffer.delete(188);

        let rest = read_all(&buffer);
        assert_eq!(&rest[..], &data[188..]);
    }

    #[test]
    fn test_wrapped_run_returns_contiguous_part_above_margin() {
        let buffer = TsRingBuffer::new(1001, 100);
        assert_eq!(buffer.put(&vec![0u8; 600]), 600);
        buffer.delete(600);

        assert_eq!(buffer.put(&vec![1u8; 700]), 700);
        // 401 contiguous bytes before the wrap, 299 after
        assert_eq!(buffer.get(|run| run.len()), Some(401));
        buffer.delete(401);
        assert_eq!(buffer.get(|run| run.len()), Some(299));
    }

    #[test]
    fn test_get_times_out_when_empty() {
        let buffer = TsRingBuffer::new(1001, 188)
            .with_timeouts(Duration::from_millis(5), Duration::from_millis(5));
        assert!(buffer.get(|run| run.len()).is_none());
        buffer.put(&[0x47]);
        assert_eq!(buffer.get(|run| run.len()), Some(1));
    }

    #[test]
    fn test_get_waits_for_margin() {
        let timeout = Duration::from_millis(50);
        let buffer = TsRingBuffer::new(TS_PACKET_SIZE * 10 + 1, TS_PACKET_SIZE)
            .with_timeouts(timeout, timeout);
        buffer.put(&[0x47; 100]);

        let start = Instant::now();
        assert_eq!(buffer.get(|run| run.len()), Some(100));
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_get_wakes_when_margin_is_reached() {
        let buffer = Arc::new(
            TsRingBuffer::new(TS_PACKET_SIZE * 10 + 1, TS_PACKET_SIZE)
                .with_timeouts(Duration::from_secs(5), Duration::from_millis(5)),
        );
        buffer.put(&[0x47; 100]);

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                buffer.put(&[0x47; 10]);
                thread::sleep(Duration::from_millis(20));
                buffer.put(&[0x47; TS_PACKET_SIZE]);
            })
        };

        let start = Instant::now();
        assert_eq!(buffer.get(|run| run.len()), Some(100 + 10 + TS_PACKET_SIZE));
        assert!(start.elapsed() < Duration::from_secs(5));
        producer.join().unwrap();
    }

    #[test]
    fn test_delete_more_than_available_is_clamped() {
        let buffer = TsRingBuffer::new(1001, 188);
        buffer.put(&[1, 2, 3]);
        buffer.delete(10);
        assert!(buffer.is_empty());
        buffer.put(&[4, 5]);
        assert_eq!(read_all(&buffer), vec![4, 5]);
    }

    #[test]
    fn test_clear() {
        let buffer = TsRingBuffer::new(1001, 188);

        buffer.put(&[1, 2, 3, 4, 5]);
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.free(), 1000);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let buffer = Arc::new(
            TsRingBuffer::new(TS_PACKET_SIZE * 8 + 1, TS_PACKET_SIZE)
                .with_timeouts(Duration::from_millis(10), Duration::from_millis(50)),
        );
        let total = TS_PACKET_SIZE * 200;
        let source: Vec<u8> = (0..total).map(|i| (i % 253) as u8).collect();

        let producer = {
            let buffer = Arc::clone(&buffer);
            let source = source.clone();
            thread::spawn(move || {
                let mut offset = 0;
                while offset < source.len() {
                    let end = (offset + 1000).min(source.len());
                    offset += buffer.put(&source[offset..end]);
                }
            })
        };

        let mut received = Vec::with_capacity(total);
        while received.len() < total {
            if let Some(n) = buffer.get(|run| {
                received.extend_from_slice(run);
                run.len()
            }) {
                buffer.delete(n);
            }
        }
        producer.join().unwrap();

        assert_eq!(received, source);
    }
}
