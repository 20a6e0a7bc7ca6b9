use log::trace;
use skein_serde::{BitWriter, Serde};

use crate::{
    bunch::Bunch, channels::channel::BunchSink, connection::packet_transport::PacketTransport,
    constants::PACKET_FRAMING_BITS, PacketIndex, SendError,
};

/// Packs bunches into packets. Each bunch is preceded by a `true` continue
/// bit and a packet ends with a `false` one.
pub struct PacketWriter {
    writer: BitWriter,
    bunch_count: usize,
    max_bits: u32,
}

impl PacketWriter {
    pub fn new(max_packet_bytes: usize) -> Self {
        Self {
            writer: BitWriter::with_capacity(max_packet_bytes),
            bunch_count: 0,
            max_bits: (max_packet_bytes as u32).saturating_mul(8),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bunch_count == 0
    }

    /// Room left for bunches, keeping space for the terminator
    fn bits_free(&self) -> u32 {
        self.max_bits
            .saturating_sub(self.writer.bits_written())
            .saturating_sub(PACKET_FRAMING_BITS)
    }

    /// Adds `bunch` to the current packet, sending that packet first if the
    /// bunch would not fit. Returns the index of the packet carrying the bunch.
    pub fn write_bunch(
        &mut self,
        bunch: &Bunch,
        transport: &mut dyn PacketTransport,
    ) -> Result<PacketIndex, SendError> {
        let bits_needed = PACKET_FRAMING_BITS + bunch.bit_length();
        let capacity = self.max_bits.saturating_sub(PACKET_FRAMING_BITS);
        if bits_needed > capacity {
            return Err(SendError::BunchTooLarge {
                bits: bunch.bit_length(),
                max_bits: capacity.saturating_sub(PACKET_FRAMING_BITS),
            });
        }

        if bits_needed > self.bits_free() {
            self.flush(transport);
        }

        true.ser(&mut self.writer);
        bunch.ser(&mut self.writer);
        self.bunch_count += 1;
        Ok(transport.next_packet_index())
    }

    /// Sends the current packet, if it holds any bunches
    pub fn flush(&mut self, transport: &mut dyn PacketTransport) -> Option<PacketIndex> {
        if self.bunch_count == 0 {
            return None;
        }
        let mut writer = std::mem::replace(&mut self.writer, BitWriter::new());
        false.ser(&mut writer);
        let bunches = std::mem::take(&mut self.bunch_count);
        let packet_index = transport.send_raw(writer.to_bytes());
        trace!("sent packet {packet_index} carrying {bunches} bunches");
        Some(packet_index)
    }

    /// Forgets the current packet without sending it
    pub fn clear(&mut self) {
        self.writer = BitWriter::new();
        self.bunch_count = 0;
    }
}

/// A PacketWriter paired with the transport its packets go to
pub struct PacketSink<'a> {
    pub writer: &'a mut PacketWriter,
    pub transport: &'a mut dyn PacketTransport,
}

impl BunchSink for PacketSink<'_> {
    fn write_bunch(&mut self, bunch: &Bunch) -> Result<PacketIndex, SendError> {
        self.writer.write_bunch(bunch, self.transport)
    }
}
