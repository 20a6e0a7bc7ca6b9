use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use log::{debug, trace};

use crate::{
    bunch::{Bunch, CloseReason, Payload},
    channels::{
        control::{ControlChannel, ControlMessage},
        entity::EntityChannel,
        partial::{split_bunch, AssemblyOutcome, PartialBunchAssembler},
        reliable::{ReliableReceiver, ReliableSender},
    },
    connection::{events::ConnectionEvent, packet_id_range::PacketIdRange},
    sequence_distance, sequence_greater_than, BunchSequence, ChannelConfig, ChannelError,
    ChannelId, ChannelKind, ConnectionConfig, ConnectionError, DecodeError, FatalError,
    NetRefId, PacketIndex, ReferenceCache, SendError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenState {
    Unopened,
    OpenedLocally,
    OpenedRemotely,
    /// Every bunch of the local open has been acknowledged
    OpenAcked,
}

/// Reliable sequence counters. They outlive a channel so that the next
/// generation on the same index continues where the last one stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelSequences {
    pub in_reliable: BunchSequence,
    pub out_reliable: BunchSequence,
}

/// What a channel does with the bunches it completes
pub enum ChannelRole {
    Control(ControlChannel),
    Entity(EntityChannel),
    /// Complete bunches are handed straight to the application
    Stream,
}

impl ChannelRole {
    pub fn for_kind(kind: ChannelKind, now: Instant) -> Self {
        match kind {
            ChannelKind::Control => ChannelRole::Control(ControlChannel::new()),
            ChannelKind::Entity => ChannelRole::Entity(EntityChannel::incoming(now)),
            ChannelKind::Voice | ChannelKind::Data => ChannelRole::Stream,
        }
    }
}

/// Where a channel writes the bunches it sends
pub trait BunchSink {
    fn write_bunch(&mut self, bunch: &Bunch) -> Result<PacketIndex, SendError>;
}

/// Everything a channel needs from its connection while receiving
pub struct ReceiveContext<'a> {
    pub now: Instant,
    pub config: &'a ConnectionConfig,
    pub refs: &'a mut dyn ReferenceCache,
    pub events: &'a mut Vec<ConnectionEvent>,
    /// Entities whose previous channel is still replaying queued bunches
    pub draining: &'a HashSet<NetRefId>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReceiveOutcome {
    pub skip_ack: bool,
    pub closed: Option<CloseReason>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub open_acked: bool,
    /// The close bunch was acknowledged, the slot may be reclaimed
    pub released: bool,
}

pub struct Channel {
    id: ChannelId,
    kind: ChannelKind,
    open_state: OpenState,
    locally_opened: bool,
    open_sent: bool,
    open_sequences: Option<(BunchSequence, BunchSequence)>,
    closing: Option<CloseReason>,
    broken: bool,
    sequences: ChannelSequences,
    reliable_sender: ReliableSender,
    reliable_receiver: ReliableReceiver,
    assembler: PartialBunchAssembler,
    paused_until_reliable_ack: bool,
    role: ChannelRole,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        kind: ChannelKind,
        sequences: ChannelSequences,
        open_state: OpenState,
        role: ChannelRole,
    ) -> Self {
        Self {
            id,
            kind,
            open_state,
            locally_opened: open_state == OpenState::OpenedLocally,
            open_sent: false,
            open_sequences: None,
            closing: None,
            broken: false,
            sequences,
            reliable_sender: ReliableSender::new(),
            reliable_receiver: ReliableReceiver::new(),
            assembler: PartialBunchAssembler::new(),
            paused_until_reliable_ack: false,
            role,
        }
    }

    /// Reinitializes a pooled channel for a new generation, keeping its
    /// buffers' allocations
    pub fn reset(
        &mut self,
        id: ChannelId,
        kind: ChannelKind,
        sequences: ChannelSequences,
        open_state: OpenState,
        role: ChannelRole,
    ) {
        self.id = id;
        self.kind = kind;
        self.open_state = open_state;
        self.locally_opened = open_state == OpenState::OpenedLocally;
        self.open_sent = false;
        self.open_sequences = None;
        self.closing = None;
        self.broken = false;
        self.sequences = sequences;
        self.reliable_sender.clear();
        self.reliable_receiver.clear();
        self.assembler.clear();
        self.paused_until_reliable_ack = false;
        self.role = role;
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn open_state(&self) -> OpenState {
        self.open_state
    }

    pub fn is_locally_opened(&self) -> bool {
        self.locally_opened
    }

    /// The remote end has seen the whole open, either because it acked our
    /// open or because it opened the channel itself
    pub fn is_open_acked(&self) -> bool {
        matches!(
            self.open_state,
            OpenState::OpenAcked | OpenState::OpenedRemotely
        )
    }

    pub fn can_send(&self) -> bool {
        self.open_state != OpenState::Unopened
    }

    pub fn closing(&self) -> Option<CloseReason> {
        self.closing
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Drops any partial assembly. Later bunches are still sequenced so the
    /// owner's close can release the channel, but their content is ignored.
    pub fn set_broken(&mut self) {
        self.broken = true;
        self.assembler.clear();
    }

    pub fn sequences(&self) -> ChannelSequences {
        self.sequences
    }

    pub fn is_replication_paused(&self) -> bool {
        self.paused_until_reliable_ack
    }

    pub fn unacked_reliable(&self) -> usize {
        self.reliable_sender.len()
    }

    pub fn buffered_out_of_order(&self) -> usize {
        self.reliable_receiver.len()
    }

    pub fn role(&self) -> &ChannelRole {
        &self.role
    }

    pub fn entity(&self) -> Option<&EntityChannel> {
        match &self.role {
            ChannelRole::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self) -> Option<&mut EntityChannel> {
        match &mut self.role {
            ChannelRole::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn take_role(&mut self) -> ChannelRole {
        std::mem::replace(&mut self.role, ChannelRole::Stream)
    }

    // Sending

    pub fn send(
        &mut self,
        now: Instant,
        bunch: Bunch,
        config: &ChannelConfig,
        sink: &mut dyn BunchSink,
    ) -> Result<PacketIdRange, ConnectionError> {
        let index = self.id.index;
        if self.broken {
            return Err(SendError::ChannelBroken { index }.into());
        }
        if !self.can_send() {
            return Err(SendError::ChannelNotOpen { index }.into());
        }
        if self.closing.is_some() {
            return Err(SendError::ChannelClosing { index }.into());
        }
        if let ChannelRole::Entity(entity) = &mut self.role {
            entity.dormancy_mut().note_update(now);
        }
        self.send_internal(now, bunch, config, sink)
    }

    /// Sends a reliable close bunch. The channel stays in its slot until the
    /// close is acknowledged.
    pub fn close(
        &mut self,
        now: Instant,
        reason: CloseReason,
        config: &ChannelConfig,
        sink: &mut dyn BunchSink,
    ) -> Result<PacketIdRange, ConnectionError> {
        let index = self.id.index;
        if !self.can_send() {
            return Err(SendError::ChannelNotOpen { index }.into());
        }
        if self.closing.is_some() {
            return Err(SendError::ChannelClosing { index }.into());
        }
        self.closing = Some(reason);
        if let ChannelRole::Entity(entity) = &mut self.role {
            if reason.is_dormancy() {
                entity.dormancy_mut().set_dormant();
            }
        }

        let mut bunch = Bunch::reliable(Payload::empty());
        bunch.close = Some(reason);
        self.send_internal(now, bunch, config, sink)
    }

    fn send_internal(
        &mut self,
        now: Instant,
        mut bunch: Bunch,
        config: &ChannelConfig,
        sink: &mut dyn BunchSink,
    ) -> Result<PacketIdRange, ConnectionError> {
        bunch.channel_index = self.id.index;
        bunch.channel_kind = Some(self.kind);
        bunch.partial = None;
        bunch.packet_index = None;
        bunch.open = self.open_state == OpenState::OpenedLocally && !self.open_sent;
        if bunch.open {
            bunch.reliable = true;
            if let ChannelRole::Entity(entity) = &self.role {
                bunch.payload = entity.prepend_open_header(&bunch.payload);
                bunch.has_reference_exports = true;
            }
        }

        let split = split_bunch(bunch, config, self.reliable_sender.len());
        let mut parts = split.bunches;
        let reliable = parts.first().map(|part| part.reliable).unwrap_or(false);
        let is_close = parts.last().map(|part| part.is_close()).unwrap_or(false);
        let opening = parts.first().map(|part| part.open).unwrap_or(false);

        if reliable {
            self.reliable_sender.check_capacity(
                self.id.index,
                parts.len(),
                is_close,
                config.reliable_buffer,
            )?;
            for part in parts.iter_mut() {
                self.sequences.out_reliable = self.sequences.out_reliable.wrapping_add(1);
                part.sequence = self.sequences.out_reliable;
            }
        }
        if split.upgraded_to_reliable {
            debug!(
                "channel {}: large unreliable bunch upgraded to {} reliable partials",
                self.id.index,
                parts.len()
            );
            self.paused_until_reliable_ack = true;
        }
        if opening {
            self.open_sent = true;
            if let (Some(first), Some(last)) = (parts.first(), parts.last()) {
                self.open_sequences = Some((first.sequence, last.sequence));
            }
        }

        let mut range: Option<PacketIdRange> = None;
        for mut part in parts {
            let packet_index = sink.write_bunch(&part)?;
            part.packet_index = Some(packet_index);
            range = Some(match range {
                None => PacketIdRange::new(packet_index),
                Some(range) => range.extended(packet_index),
            });
            if reliable {
                self.reliable_sender.push(part, now);
            }
        }
        Ok(range.unwrap_or_default())
    }

    /// Resends every unacknowledged reliable bunch that rode in `packet_index`,
    /// as it was first sent
    pub fn on_nak(
        &mut self,
        now: Instant,
        packet_index: PacketIndex,
        sink: &mut dyn BunchSink,
    ) -> Result<usize, SendError> {
        let mut resent = 0;
        for entry in self.reliable_sender.unacked_in_packet(packet_index) {
            let new_index = sink.write_bunch(&entry.bunch)?;
            trace!(
                "channel {}: resending bunch {} in packet {} (was {})",
                entry.bunch.channel_index,
                entry.bunch.sequence,
                new_index,
                packet_index
            );
            entry.bunch.packet_index = Some(new_index);
            entry.sent_at = now;
            resent += 1;
        }
        Ok(resent)
    }

    pub fn on_ack(&mut self, packet_index: PacketIndex) -> AckOutcome {
        let mut outcome = AckOutcome::default();
        if !self.reliable_sender.mark_acked(packet_index) {
            return outcome;
        }

        for bunch in self.reliable_sender.prune_acked() {
            if let Some((first, last)) = self.open_sequences {
                if bunch.sequence == last && self.open_state == OpenState::OpenedLocally {
                    trace!(
                        "channel {}: open acknowledged through sequences {first}..={last}",
                        self.id.index
                    );
                    self.open_state = OpenState::OpenAcked;
                    outcome.open_acked = true;
                }
            }
            if bunch.is_close() {
                outcome.released = true;
            }
        }

        if self.reliable_sender.is_empty() && self.paused_until_reliable_ack {
            debug!("channel {}: reliable backlog acknowledged, resuming", self.id.index);
            self.paused_until_reliable_ack = false;
        }
        outcome
    }

    /// Before the open is acknowledged, resends bunches nobody has heard back
    /// about, unless too many are already outstanding
    pub fn resend_stale(
        &mut self,
        now: Instant,
        timeout: Duration,
        max_unacked: usize,
        sink: &mut dyn BunchSink,
    ) -> Result<usize, SendError> {
        if self.is_open_acked() || self.reliable_sender.unacked_count() > max_unacked {
            return Ok(0);
        }
        let mut resent = 0;
        for entry in self.reliable_sender.unacked_older_than(now, timeout) {
            let new_index = sink.write_bunch(&entry.bunch)?;
            entry.bunch.packet_index = Some(new_index);
            entry.sent_at = now;
            resent += 1;
        }
        Ok(resent)
    }

    // Control channel

    /// Sends `message` right away, or queues it while the channel is not open
    /// yet, already has a queue, or is one bunch short of a full reliable buffer
    pub fn send_control_message(
        &mut self,
        now: Instant,
        message: ControlMessage,
        config: &ConnectionConfig,
        sink: &mut dyn BunchSink,
    ) -> Result<Option<PacketIdRange>, ConnectionError> {
        let index = self.id.index;
        if self.closing.is_some() {
            return Err(SendError::ChannelClosing { index }.into());
        }
        let payload = message.to_payload();
        let max_bits = config.channel.max_bunch_bits();
        if payload.bit_length() > max_bits {
            return Err(FatalError::ControlMessageOverflow {
                bits: payload.bit_length(),
                max_bits,
            }
            .into());
        }

        let saturated = self.reliable_sender.len() + 1 >= config.channel.reliable_buffer;
        let can_send = self.can_send();
        let ChannelRole::Control(control) = &mut self.role else {
            return Err(SendError::WrongChannelKind { index }.into());
        };
        if control.has_queued() || saturated || !can_send {
            control.enqueue(message, &config.control)?;
            return Ok(None);
        }

        self.send_internal(now, Bunch::reliable(payload), &config.channel, sink)
            .map(Some)
    }

    /// Sends queued control messages while the open is acknowledged and the
    /// reliable buffer has room
    pub fn drain_control_queue(
        &mut self,
        now: Instant,
        config: &ConnectionConfig,
        sink: &mut dyn BunchSink,
    ) -> Result<usize, ConnectionError> {
        let mut sent = 0;
        while self.is_open_acked()
            && self.closing.is_none()
            && self.reliable_sender.len() + 1 < config.channel.reliable_buffer
        {
            let message = match &mut self.role {
                ChannelRole::Control(control) => control.pop(),
                _ => None,
            };
            let Some(message) = message else {
                break;
            };
            self.send_internal(now, Bunch::reliable(message.to_payload()), &config.channel, sink)?;
            sent += 1;
        }
        Ok(sent)
    }

    // Receiving

    /// Takes a bunch straight off the wire. Reliable bunches ahead of the
    /// next expected sequence wait in the out-of-order buffer.
    /// Duplicates of already dispatched sequences must be filtered by the caller.
    pub fn receive_raw(
        &mut self,
        bunch: Bunch,
        ctx: &mut ReceiveContext,
    ) -> Result<ReceiveOutcome, ChannelError> {
        let index = self.id.index;

        if bunch.reliable {
            let expected = self.sequences.in_reliable.wrapping_add(1);
            if bunch.sequence != expected {
                let distance = sequence_distance(self.sequences.in_reliable, bunch.sequence);
                if distance <= 0 || distance as usize > ctx.config.channel.reliable_buffer {
                    return Err(DecodeError::SequenceOutOfWindow {
                        index,
                        sequence: bunch.sequence,
                        expected,
                    }
                    .into());
                }
                trace!(
                    "channel {index}: buffering bunch {} until {expected} arrives",
                    bunch.sequence
                );
                self.reliable_receiver.buffer(
                    index,
                    bunch,
                    ctx.config.channel.out_of_order_buffer,
                )?;
                return Ok(ReceiveOutcome::default());
            }
        }

        let mut outcome = self.receive_next(bunch, ctx)?;
        if outcome.closed.is_none() {
            outcome.closed = self.drain_buffered(ctx)?.closed;
        }
        Ok(outcome)
    }

    /// Dispatches buffered reliable bunches that are now next in sequence
    pub fn drain_buffered(
        &mut self,
        ctx: &mut ReceiveContext,
    ) -> Result<ReceiveOutcome, ChannelError> {
        let mut outcome = ReceiveOutcome::default();
        while outcome.closed.is_none() {
            let expected = self.sequences.in_reliable.wrapping_add(1);
            let Some(next) = self.reliable_receiver.pop_next(expected) else {
                break;
            };
            outcome.closed = self.receive_next(next, ctx)?.closed;
        }
        Ok(outcome)
    }

    fn receive_next(
        &mut self,
        bunch: Bunch,
        ctx: &mut ReceiveContext,
    ) -> Result<ReceiveOutcome, ChannelError> {
        let index = self.id.index;
        if bunch.reliable {
            if !sequence_greater_than(bunch.sequence, self.sequences.in_reliable) {
                return Err(DecodeError::SequenceRegression {
                    index,
                    sequence: bunch.sequence,
                    dispatched: self.sequences.in_reliable,
                }
                .into());
            }
            self.sequences.in_reliable = bunch.sequence;
        }

        if self.broken {
            return Ok(self.receive_while_broken(&bunch));
        }

        let bunch = if bunch.is_partial() {
            match self
                .assembler
                .receive(bunch, ctx.config.channel.max_assembled_bytes)?
            {
                AssemblyOutcome::Pending => return Ok(ReceiveOutcome::default()),
                AssemblyOutcome::SkipAck => {
                    return Ok(ReceiveOutcome {
                        skip_ack: true,
                        closed: None,
                    })
                }
                AssemblyOutcome::Complete(bunch) => bunch,
            }
        } else {
            bunch
        };

        self.dispatch(bunch, ctx)
    }

    /// Only a close the remote is allowed to send gets through
    fn receive_while_broken(&self, bunch: &Bunch) -> ReceiveOutcome {
        let closed = bunch.close.filter(|_| {
            !self.locally_opened || self.kind.capabilities().closable_by_either_side
        });
        match closed {
            Some(reason) => debug!(
                "channel {}: broken channel closed by the remote ({reason:?})",
                self.id.index
            ),
            None => trace!(
                "channel {}: ignoring bunch {} on a broken channel",
                self.id.index,
                bunch.sequence
            ),
        }
        ReceiveOutcome {
            skip_ack: false,
            closed,
        }
    }

    /// Hands a complete bunch to the channel's role
    fn dispatch(
        &mut self,
        bunch: Bunch,
        ctx: &mut ReceiveContext,
    ) -> Result<ReceiveOutcome, ChannelError> {
        let index = self.id.index;
        let capabilities = self.kind.capabilities();

        if bunch.open {
            match self.open_state {
                OpenState::Unopened => {
                    self.open_state = OpenState::OpenedRemotely;
                    ctx.events.push(ConnectionEvent::ChannelOpened {
                        channel: self.id,
                        kind: self.kind,
                    });
                }
                OpenState::OpenedRemotely => {}
                OpenState::OpenedLocally | OpenState::OpenAcked => {
                    if !capabilities.bidirectional_open {
                        return Err(DecodeError::UnexpectedOpen { index }.into());
                    }
                    trace!("channel {index}: opened by both ends");
                }
            }
        } else if self.open_state == OpenState::Unopened {
            debug!("channel {index}: dropping bunch {} received before its open", bunch.sequence);
            return Ok(ReceiveOutcome::default());
        }

        let closed = bunch.close;
        if closed.is_some() && self.locally_opened && !capabilities.closable_by_either_side {
            return Err(DecodeError::CloseFromNonOwner { index }.into());
        }

        let channel = self.id;
        match &mut self.role {
            ChannelRole::Stream => {
                if !bunch.payload.is_empty() {
                    ctx.events.push(ConnectionEvent::Bunch {
                        channel,
                        payload: bunch.payload,
                    });
                }
                if let Some(reason) = closed {
                    ctx.events.push(ConnectionEvent::ChannelClosed { channel, reason });
                }
            }
            ChannelRole::Control(control) => {
                control.receive_bunch(&bunch, ctx.events)?;
                if let Some(reason) = closed {
                    ctx.events.push(ConnectionEvent::ChannelClosed { channel, reason });
                }
            }
            ChannelRole::Entity(entity) => {
                entity.receive_bunch(channel, bunch, ctx)?;
            }
        }

        Ok(ReceiveOutcome {
            skip_ack: false,
            closed,
        })
    }
}
