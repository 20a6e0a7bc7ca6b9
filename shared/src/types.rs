pub type PacketIndex = u16;
pub type ChannelIndex = u16;
pub type BunchSequence = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    /// Index parity for channels this host opens. Index 0 belongs to neither.
    pub fn owns_index(self, index: ChannelIndex) -> bool {
        if index == 0 {
            return false;
        }
        match self {
            HostType::Client => index % 2 == 1,
            HostType::Server => index % 2 == 0,
        }
    }
}
