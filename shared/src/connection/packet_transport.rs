use crate::PacketIndex;

/// The packet socket underneath a Connection.
///
/// Packet indices are opaque handles issued in increasing order. The index
/// reported by `next_packet_index` must be the one the following `send_raw`
/// uses. Acks and naks for those indices are reported back through
/// `Connection::on_ack` and `Connection::on_nak`.
pub trait PacketTransport {
    fn next_packet_index(&self) -> PacketIndex;

    /// Sends a finished packet without blocking
    fn send_raw(&mut self, payload: Vec<u8>) -> PacketIndex;
}
