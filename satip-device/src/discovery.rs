//! Interface to SAT>IP server discovery.

use satip_protocol::{DeliverySystem, SatipServer, Source};

/// Knows the reachable SAT>IP servers and hands out their tuners.
pub trait Discovery: Send + Sync {
    /// Pick a server able to tune `transponder` on `source` for a device.
    fn assign_server(
        &self,
        device_index: usize,
        source: Source,
        transponder: u32,
        system: DeliverySystem,
    ) -> Option<SatipServer>;

    /// Identity string shown in device names and status pages.
    fn server_string(&self, server: &SatipServer) -> String {
        server.to_string()
    }

    /// True if any known server serves `source`.
    fn has_server(&self, source: Source) -> bool;

    fn server_count(&self) -> usize;

    /// Number of delivery systems the servers provide.
    fn num_provided_systems(&self) -> usize;
}
