use skein_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedInteger};

/// What a channel carries, which decides how its bunches are consumed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Control,
    Entity,
    Voice,
    Data,
}

/// Exceptions to the rule that only the opener may open or close a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelCapabilities {
    /// Both peers may open the same index at the same time
    pub bidirectional_open: bool,
    /// Either peer may close the channel
    pub closable_by_either_side: bool,
}

impl ChannelKind {
    pub fn capabilities(&self) -> ChannelCapabilities {
        match self {
            ChannelKind::Control => ChannelCapabilities {
                bidirectional_open: false,
                closable_by_either_side: true,
            },
            ChannelKind::Voice => ChannelCapabilities {
                bidirectional_open: true,
                closable_by_either_side: true,
            },
            ChannelKind::Entity | ChannelKind::Data => ChannelCapabilities::default(),
        }
    }

    fn to_index(self) -> u8 {
        match self {
            ChannelKind::Control => 0,
            ChannelKind::Entity => 1,
            ChannelKind::Voice => 2,
            ChannelKind::Data => 3,
        }
    }
}

impl Serde for ChannelKind {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedInteger::<2>::new(self.to_index()).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match UnsignedInteger::<2>::de(reader)?.get() {
            0 => Ok(ChannelKind::Control),
            1 => Ok(ChannelKind::Entity),
            2 => Ok(ChannelKind::Voice),
            _ => Ok(ChannelKind::Data),
        }
    }

    fn bit_length(&self) -> u32 {
        2
    }
}
