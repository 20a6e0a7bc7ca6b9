use skein_serde::{
    BitCounter, BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger,
};

use crate::{
    bunch::{CloseReason, Payload},
    BunchSequence, ChannelIndex, ChannelKind, PacketIndex,
};

/// Marks one slice of a bunch that was too large to send whole
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartialFlags {
    pub first: bool,
    pub last: bool,
}

/// One logical message addressed to a single channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bunch {
    pub channel_index: ChannelIndex,
    /// Only written for reliable or opening bunches
    pub channel_kind: Option<ChannelKind>,
    /// Reliable sequence, or the carrying packet's index for unreliable bunches
    pub sequence: BunchSequence,
    pub reliable: bool,
    pub open: bool,
    pub close: Option<CloseReason>,
    pub replication_paused: bool,
    pub has_reference_exports: bool,
    pub partial: Option<PartialFlags>,
    /// Assigned when the bunch is written into a packet
    pub packet_index: Option<PacketIndex>,
    pub payload: Payload,
}

impl Bunch {
    pub fn new(payload: Payload) -> Self {
        Self {
            channel_index: 0,
            channel_kind: None,
            sequence: 0,
            reliable: false,
            open: false,
            close: None,
            replication_paused: false,
            has_reference_exports: false,
            partial: None,
            packet_index: None,
            payload,
        }
    }

    pub fn reliable(payload: Payload) -> Self {
        let mut bunch = Self::new(payload);
        bunch.reliable = true;
        bunch
    }

    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    pub fn is_partial_first(&self) -> bool {
        self.partial.map(|flags| flags.first).unwrap_or(false)
    }

    pub fn is_partial_last(&self) -> bool {
        self.partial.map(|flags| flags.last).unwrap_or(false)
    }

    /// True for whole bunches and for the last slice of a split bunch
    pub fn is_final_slice(&self) -> bool {
        self.partial.map(|flags| flags.last).unwrap_or(true)
    }

    pub fn is_close(&self) -> bool {
        self.close.is_some()
    }

    /// Copies every field except the payload
    pub fn header_clone(&self, payload: Payload) -> Self {
        Self {
            channel_index: self.channel_index,
            channel_kind: self.channel_kind,
            sequence: self.sequence,
            reliable: self.reliable,
            open: self.open,
            close: self.close,
            replication_paused: self.replication_paused,
            has_reference_exports: self.has_reference_exports,
            partial: self.partial,
            packet_index: self.packet_index,
            payload,
        }
    }

    pub fn write_header(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<5>::new(self.channel_index).ser(writer);
        self.reliable.ser(writer);
        self.open.ser(writer);

        self.close.is_some().ser(writer);
        if let Some(reason) = &self.close {
            reason.ser(writer);
        }

        self.replication_paused.ser(writer);
        self.has_reference_exports.ser(writer);

        self.partial.is_some().ser(writer);
        if let Some(flags) = &self.partial {
            flags.first.ser(writer);
            flags.last.ser(writer);
        }

        if self.reliable {
            self.sequence.ser(writer);
        }
        if self.reliable || self.open {
            self.channel_kind.unwrap_or(ChannelKind::Data).ser(writer);
        }

        UnsignedVariableInteger::<9>::new(self.payload.bit_length()).ser(writer);
    }

    pub fn ser(&self, writer: &mut dyn BitWrite) {
        self.write_header(writer);
        self.payload.write(writer);
    }

    pub fn bit_length(&self) -> u32 {
        let mut counter = BitCounter::new();
        self.write_header(&mut counter);
        counter.bits_needed() + self.payload.bit_length()
    }

    /// Reads one bunch carried in packet `packet_index`
    pub fn de(reader: &mut BitReader, packet_index: PacketIndex) -> Result<Self, SerdeErr> {
        let channel_index = UnsignedVariableInteger::<5>::de(reader)?.get();
        let channel_index = ChannelIndex::try_from(channel_index).map_err(|_| SerdeErr)?;
        let reliable = bool::de(reader)?;
        let open = bool::de(reader)?;

        let close = if bool::de(reader)? {
            Some(CloseReason::de(reader)?)
        } else {
            None
        };

        let replication_paused = bool::de(reader)?;
        let has_reference_exports = bool::de(reader)?;

        let partial = if bool::de(reader)? {
            Some(PartialFlags {
                first: bool::de(reader)?,
                last: bool::de(reader)?,
            })
        } else {
            None
        };

        let sequence = if reliable {
            BunchSequence::de(reader)?
        } else {
            packet_index
        };
        let channel_kind = if reliable || open {
            Some(ChannelKind::de(reader)?)
        } else {
            None
        };

        let bit_length = UnsignedVariableInteger::<9>::de(reader)?.get();
        let bit_length = u32::try_from(bit_length).map_err(|_| SerdeErr)?;
        let bytes = reader.read_bits(bit_length)?;

        Ok(Self {
            channel_index,
            channel_kind,
            sequence,
            reliable,
            open,
            close,
            replication_paused,
            has_reference_exports,
            partial,
            packet_index: Some(packet_index),
            payload: Payload::new(bytes, bit_length),
        })
    }
}
