use skein_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedInteger};

/// Why a channel is being closed. Dormancy is just one close reason, so there
/// is no separate dormant flag to disagree with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    Destroyed,
    Dormancy,
    LevelUnloaded,
    RelevancyLost,
    TearOff,
    Shutdown,
}

impl CloseReason {
    fn to_index(self) -> u8 {
        match self {
            CloseReason::Destroyed => 0,
            CloseReason::Dormancy => 1,
            CloseReason::LevelUnloaded => 2,
            CloseReason::RelevancyLost => 3,
            CloseReason::TearOff => 4,
            CloseReason::Shutdown => 5,
        }
    }

    fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(CloseReason::Destroyed),
            1 => Some(CloseReason::Dormancy),
            2 => Some(CloseReason::LevelUnloaded),
            3 => Some(CloseReason::RelevancyLost),
            4 => Some(CloseReason::TearOff),
            5 => Some(CloseReason::Shutdown),
            _ => None,
        }
    }

    pub fn is_dormancy(&self) -> bool {
        matches!(self, CloseReason::Dormancy)
    }
}

impl Serde for CloseReason {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedInteger::<3>::new(self.to_index()).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let index = UnsignedInteger::<3>::de(reader)?.get();
        Self::from_index(index).ok_or(SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        3
    }
}
