use std::time::Instant;

use log::trace;

use crate::{
    channels::{
        channel::{Channel, ChannelRole, ChannelSequences, OpenState},
        control::ControlChannel,
    },
    constants::CONTROL_CHANNEL_INDEX,
    ChannelId, ChannelIndex, ChannelKind, HostType, SendError,
};

struct ChannelSlot {
    generation: u32,
    sequences: ChannelSequences,
    channel: Option<Channel>,
}

/// Fixed-size table of channel slots, indexed by channel index.
///
/// A slot's reliable sequences survive its channel so that a late duplicate
/// from an earlier generation is recognized. Released channels go back to a
/// pool and are reset before reuse.
pub struct ChannelTable {
    host_type: HostType,
    slots: Vec<ChannelSlot>,
    pool: Vec<Channel>,
    next_local: ChannelIndex,
}

impl ChannelTable {
    pub fn new(host_type: HostType, max_channels: u16) -> Self {
        let slots = (0..max_channels)
            .map(|_| ChannelSlot {
                generation: 0,
                sequences: ChannelSequences::default(),
                channel: None,
            })
            .collect();
        Self {
            host_type,
            slots,
            pool: Vec::new(),
            next_local: 0,
        }
    }

    pub fn max_channels(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn contains_index(&self, index: ChannelIndex) -> bool {
        self.slots
            .get(index as usize)
            .map(|slot| slot.channel.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.channel.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Last reliable sequence dispatched on `index`, across generations
    pub fn in_reliable(&self, index: ChannelIndex) -> u16 {
        match self.slots.get(index as usize) {
            Some(slot) => match &slot.channel {
                Some(channel) => channel.sequences().in_reliable,
                None => slot.sequences.in_reliable,
            },
            None => 0,
        }
    }

    /// Installs the control channel at index 0. The client opens it, the
    /// server waits for the client's open.
    pub fn create_control(&mut self, open_state: OpenState) -> ChannelId {
        self.install(
            CONTROL_CHANNEL_INDEX,
            ChannelKind::Control,
            open_state,
            ChannelRole::Control(ControlChannel::new()),
        )
    }

    /// Opens a channel from this end on the next free index of this host's
    /// parity
    pub fn allocate_local(
        &mut self,
        kind: ChannelKind,
        role: ChannelRole,
    ) -> Result<ChannelId, SendError> {
        if kind == ChannelKind::Control {
            return Err(SendError::UnsupportedKind { kind });
        }
        let index = self.find_free_local()?;
        Ok(self.install(index, kind, OpenState::OpenedLocally, role))
    }

    /// Opens a bidirectional kind on an agreed index, which may belong to
    /// either host. If the remote already opened it, its channel is joined.
    pub fn open_shared(
        &mut self,
        index: ChannelIndex,
        kind: ChannelKind,
    ) -> Result<ChannelId, SendError> {
        if !kind.capabilities().bidirectional_open {
            return Err(SendError::UnsupportedKind { kind });
        }
        if index == CONTROL_CHANNEL_INDEX || index >= self.max_channels() {
            return Err(SendError::ChannelIndexUnavailable { index });
        }
        if let Some(channel) = &self.slots[index as usize].channel {
            let joinable = channel.kind() == kind
                && channel.open_state() == OpenState::OpenedRemotely
                && channel.closing().is_none()
                && !channel.is_broken();
            if joinable {
                return Ok(channel.id());
            }
            return Err(SendError::ChannelIndexUnavailable { index });
        }
        Ok(self.install(index, kind, OpenState::OpenedLocally, ChannelRole::Stream))
    }

    /// Creates the receiving end of a channel the remote is opening
    pub fn create_remote(&mut self, index: ChannelIndex, kind: ChannelKind, now: Instant) -> ChannelId {
        self.install(index, kind, OpenState::Unopened, ChannelRole::for_kind(kind, now))
    }

    fn find_free_local(&mut self) -> Result<ChannelIndex, SendError> {
        let max_channels = self.max_channels();
        for step in 0..max_channels {
            let index = self.next_local.wrapping_add(step) % max_channels;
            if !self.host_type.owns_index(index) {
                continue;
            }
            if !self.contains_index(index) {
                self.next_local = index.wrapping_add(1) % max_channels;
                return Ok(index);
            }
        }
        Err(SendError::NoFreeChannelIndex { max_channels })
    }

    fn install(
        &mut self,
        index: ChannelIndex,
        kind: ChannelKind,
        open_state: OpenState,
        role: ChannelRole,
    ) -> ChannelId {
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let id = ChannelId::new(index, slot.generation);

        let channel = match self.pool.pop() {
            Some(mut channel) => {
                channel.reset(id, kind, slot.sequences, open_state, role);
                channel
            }
            None => Channel::new(id, kind, slot.sequences, open_state, role),
        };
        trace!("channel {index}: installed generation {} as {kind:?}", id.generation);
        slot.channel = Some(channel);
        id
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.channel.as_ref()
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.channel.as_mut()
    }

    pub fn get_by_index_mut(&mut self, index: ChannelIndex) -> Option<&mut Channel> {
        self.slots.get_mut(index as usize)?.channel.as_mut()
    }

    pub fn ids(&self) -> Vec<ChannelId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.channel.as_ref().map(|channel| channel.id()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().filter_map(|slot| slot.channel.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.channel.as_mut())
    }

    /// Frees the slot of `id`, keeping its sequences. Returns the channel's
    /// role so queued entity state can outlive the slot. A stale or already
    /// released id returns `None`.
    pub fn release(&mut self, id: ChannelId) -> Option<ChannelRole> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let mut channel = slot.channel.take()?;
        slot.sequences = channel.sequences();
        let role = channel.take_role();
        self.pool.push(channel);
        trace!("channel {}: released generation {}", id.index, id.generation);
        Some(role)
    }

    /// Drops every channel at connection teardown
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(channel) = slot.channel.take() {
                slot.sequences = channel.sequences();
            }
        }
        self.pool.clear();
    }
}
