//! Interface to the section filter handler of a device.

/// Handle of an open section filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterHandle(pub usize);

/// Matches sections inside the stream against registered filters.
///
/// The device only manages the handler's lifecycle and feeds it every byte
/// arriving from the tuner session.
pub trait SectionFilterHandler: Send + Sync {
    fn start(&self) {}

    fn stop(&self) {}

    /// Register a filter; `None` when the handler has no room for it.
    fn open(&self, pid: u16, tid: u8, mask: u8) -> Option<FilterHandle>;

    fn close(&self, handle: FilterHandle);

    /// True while any filter is open on `pid`.
    fn exists(&self, pid: u16) -> bool;

    /// PID of an open filter.
    fn pid(&self, handle: FilterHandle) -> Option<u16>;

    fn write(&self, data: &[u8]);

    /// Active filters, one per line.
    fn information(&self) -> String;
}

/// Creates the section filter handler of a device.
pub trait SectionFilterFactory: Send + Sync {
    fn create(&self, device_index: usize, buffer_size: usize) -> Box<dyn SectionFilterHandler>;
}

impl<F> SectionFilterFactory for F
where
    F: Fn(usize, usize) -> Box<dyn SectionFilterHandler> + Send + Sync,
{
    fn create(&self, device_index: usize, buffer_size: usize) -> Box<dyn SectionFilterHandler> {
        self(device_index, buffer_size)
    }
}
