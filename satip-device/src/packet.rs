//! TS packet header helpers.

use satip_protocol::{TS_PACKET_SIZE, TS_SYNC_BYTE};

/// One owned 188-byte TS packet.
pub type TsPacket = [u8; TS_PACKET_SIZE];

/// Bytes following the 4-byte header.
const TS_BODY_SIZE: usize = TS_PACKET_SIZE - 4;

/// Packet identifier of a TS packet (13 bits).
pub fn ts_pid(packet: &[u8]) -> u16 {
    (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16
}

/// Check if packet has adaptation field.
pub fn ts_has_adaptation_field(packet: &[u8]) -> bool {
    packet[3] & 0x20 != 0
}

/// Check if packet has payload.
pub fn ts_has_payload(packet: &[u8]) -> bool {
    packet[3] & 0x10 != 0
}

/// Number of payload bytes carried by a packet.
pub fn ts_payload_size(packet: &[u8]) -> usize {
    if !ts_has_payload(packet) {
        return 0;
    }
    if ts_has_adaptation_field(packet) {
        // Adaptation field length byte plus its content
        return TS_BODY_SIZE.saturating_sub(1 + packet[4] as usize);
    }
    TS_BODY_SIZE
}

/// Index of the first sync byte at or after `from`, if any.
pub fn find_sync(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .iter()
        .position(|&b| b == TS_SYNC_BYTE)
        .map(|i| from + i)
}

#[cfg(test)]
pub(crate) fn make_packet(pid: u16, fill: u8) -> TsPacket {
    let mut packet = [fill; TS_PACKET_SIZE];
    packet[0] = TS_SYNC_BYTE;
    packet[1] = ((pid >> 8) & 0x1F) as u8;
    packet[2] = (pid & 0xFF) as u8;
    packet[3] = 0x10;
    packet
}
