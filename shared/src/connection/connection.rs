use std::{
    collections::HashSet,
    time::Instant,
};

use log::{debug, error, info, trace, warn};
use skein_serde::BitReader;

use crate::{
    bunch::{Bunch, CloseReason},
    channels::{
        channel::{Channel, ChannelRole, OpenState, ReceiveContext},
        control::ControlMessage,
        entity::{ContentBlockWriter, DrainStatus, EntityChannel},
    },
    connection::{
        channel_table::ChannelTable,
        events::{ConnectionEvent, DisconnectReason},
        packet_id_range::PacketIdRange,
        packet_transport::PacketTransport,
        packet_writer::{PacketSink, PacketWriter},
    },
    constants::CONTROL_CHANNEL_INDEX,
    sequence_greater_than, ChannelError, ChannelId, ChannelIndex, ChannelKind, ConfigError,
    ConnectionConfig, ConnectionError, DecodeError, DecodeSeverity, FatalError, HostType,
    NetRefId, PacketIndex, ReferenceCache, SendError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectionState {
    Connected,
    Closed,
}

/// What the caller should tell the remote about a received packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketReceipt {
    /// False when the packet must not be acknowledged, so the remote resends
    /// what it carried
    pub should_ack: bool,
}

/// An entity channel whose close arrived while bunches were still queued.
/// It keeps replaying on tick after its slot has been reclaimed.
struct DrainingEntity {
    channel: ChannelId,
    entity: EntityChannel,
}

/// Multiplexes channels over one packet transport.
///
/// Outgoing bunches are batched into packets of at most `max_packet_bytes`
/// and handed to the transport on `flush` or `tick`. Acknowledgments for
/// those packets come back through `on_ack` and `on_nak`.
pub struct Connection<T: PacketTransport> {
    host_type: HostType,
    config: ConnectionConfig,
    transport: T,
    table: ChannelTable,
    packet_writer: PacketWriter,
    draining: Vec<DrainingEntity>,
    events: Vec<ConnectionEvent>,
    state: ConnectionState,
}

impl<T: PacketTransport> Connection<T> {
    /// Create a new Connection. The client opens the control channel with
    /// its first control message; the server waits for that open before
    /// anything it queues on the control channel goes out.
    pub fn new(
        host_type: HostType,
        config: ConnectionConfig,
        transport: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut table = ChannelTable::new(host_type, config.max_channels);
        let control_state = match host_type {
            HostType::Client => OpenState::OpenedLocally,
            HostType::Server => OpenState::Unopened,
        };
        table.create_control(control_state);

        let packet_writer = PacketWriter::new(config.max_packet_bytes);
        Ok(Self {
            host_type,
            config,
            transport,
            table,
            packet_writer,
            draining: Vec::new(),
            events: Vec::new(),
            state: ConnectionState::Connected,
        })
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.table.get(id)
    }

    pub fn control_channel_id(&self) -> Option<ChannelId> {
        self.table
            .ids()
            .into_iter()
            .find(|id| id.index == CONTROL_CHANNEL_INDEX)
    }

    pub fn channel_count(&self) -> usize {
        self.table.len()
    }

    /// Entity channels that were closed while bunches were still queued
    pub fn draining_count(&self) -> usize {
        self.draining.len()
    }

    pub fn is_replication_paused(&self, id: ChannelId) -> bool {
        self.table
            .get(id)
            .map(|channel| channel.is_replication_paused())
            .unwrap_or(false)
    }

    /// Drains every event produced since the last call
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    // Opening & closing

    /// Opens a voice or data channel. Nothing is sent until the first bunch.
    pub fn open_channel(&mut self, kind: ChannelKind) -> Result<ChannelId, ConnectionError> {
        self.ensure_connected()?;
        match kind {
            ChannelKind::Voice | ChannelKind::Data => {}
            ChannelKind::Control | ChannelKind::Entity => {
                return Err(SendError::UnsupportedKind { kind }.into());
            }
        }
        let id = self.table.allocate_local(kind, ChannelRole::Stream)?;
        debug!("opened {kind:?} channel {}", id.index);
        Ok(id)
    }

    /// Opens a bidirectional kind on an index both peers agreed on. Both may
    /// open it at the same time; if the remote opened it first, this joins it.
    pub fn open_shared_channel(
        &mut self,
        kind: ChannelKind,
        index: ChannelIndex,
    ) -> Result<ChannelId, ConnectionError> {
        self.ensure_connected()?;
        let id = self.table.open_shared(index, kind)?;
        debug!("opened shared {kind:?} channel {index}");
        Ok(id)
    }

    /// Opens an entity channel. Its first bunch carries `entity_ref` and
    /// `type_ref` so the remote can bind or instantiate the entity.
    pub fn open_entity_channel(
        &mut self,
        now: Instant,
        entity_ref: NetRefId,
        type_ref: NetRefId,
    ) -> Result<ChannelId, ConnectionError> {
        self.ensure_connected()?;
        if entity_ref.is_null() || type_ref.is_null() {
            return Err(SendError::EntityNotBound.into());
        }
        let role = ChannelRole::Entity(EntityChannel::outgoing(entity_ref, type_ref, now));
        let id = self.table.allocate_local(ChannelKind::Entity, role)?;
        debug!("opened entity channel {} for {entity_ref:?}", id.index);
        Ok(id)
    }

    /// Sends a reliable close. The slot is reclaimed once the close is acked.
    pub fn close_channel(
        &mut self,
        now: Instant,
        id: ChannelId,
        reason: CloseReason,
    ) -> Result<PacketIdRange, ConnectionError> {
        self.ensure_connected()?;
        let channel = self
            .table
            .get_mut(id)
            .ok_or(SendError::UnknownChannel {
                index: id.index,
                generation: id.generation,
            })?;
        if !channel.is_locally_opened()
            && id.index != CONTROL_CHANNEL_INDEX
            && !channel.kind().capabilities().closable_by_either_side
        {
            return Err(SendError::NotChannelOwner { index: id.index }.into());
        }

        let mut sink = PacketSink {
            writer: &mut self.packet_writer,
            transport: &mut self.transport,
        };
        let result = channel.close(now, reason, &self.config.channel, &mut sink);
        self.escalate(result)
    }

    // Sending

    pub fn send_bunch(
        &mut self,
        now: Instant,
        id: ChannelId,
        bunch: Bunch,
    ) -> Result<PacketIdRange, ConnectionError> {
        self.ensure_connected()?;
        let channel = self
            .table
            .get_mut(id)
            .ok_or(SendError::UnknownChannel {
                index: id.index,
                generation: id.generation,
            })?;
        let mut sink = PacketSink {
            writer: &mut self.packet_writer,
            transport: &mut self.transport,
        };
        let result = channel.send(now, bunch, &self.config.channel, &mut sink);
        self.escalate(result)
    }

    /// Sends or queues `message` on the control channel. Returns `None` when
    /// the message was queued.
    pub fn send_control_message(
        &mut self,
        now: Instant,
        message: ControlMessage,
    ) -> Result<Option<PacketIdRange>, ConnectionError> {
        self.ensure_connected()?;
        let channel = self
            .table
            .get_by_index_mut(CONTROL_CHANNEL_INDEX)
            .ok_or(ConnectionError::Closed)?;
        let mut sink = PacketSink {
            writer: &mut self.packet_writer,
            transport: &mut self.transport,
        };
        let result = channel.send_control_message(now, message, &self.config, &mut sink);
        self.escalate(result)
    }

    /// Starts packing content blocks for an outgoing entity channel. Send
    /// the finished bunch with `send_bunch`.
    pub fn entity_block_writer(
        &mut self,
        id: ChannelId,
    ) -> Result<ContentBlockWriter<'_>, ConnectionError> {
        let entity = self.outgoing_entity_mut(id)?;
        Ok(ContentBlockWriter::new(entity))
    }

    /// Asks for the entity channel to go dormant once it has been quiet for
    /// the configured hysteresis
    pub fn set_dormant(&mut self, id: ChannelId) -> Result<(), ConnectionError> {
        self.outgoing_entity_mut(id)?.dormancy_mut().request();
        Ok(())
    }

    /// Cancels a dormancy request that has not closed the channel yet
    pub fn wake(&mut self, id: ChannelId) -> Result<(), ConnectionError> {
        self.outgoing_entity_mut(id)?.dormancy_mut().wake();
        Ok(())
    }

    /// Records that the entity has property changes not yet sent, which
    /// holds off a dormancy close
    pub fn mark_pending_delta(&mut self, now: Instant, id: ChannelId) -> Result<(), ConnectionError> {
        self.outgoing_entity_mut(id)?
            .dormancy_mut()
            .mark_pending_delta(now);
        Ok(())
    }

    fn outgoing_entity_mut(&mut self, id: ChannelId) -> Result<&mut EntityChannel, ConnectionError> {
        self.ensure_connected()?;
        let channel = self.table.get_mut(id).ok_or(SendError::UnknownChannel {
            index: id.index,
            generation: id.generation,
        })?;
        if !channel.is_locally_opened() {
            return Err(SendError::NotChannelOwner { index: id.index }.into());
        }
        channel
            .entity_mut()
            .ok_or_else(|| SendError::WrongChannelKind { index: id.index }.into())
    }

    /// Hands the packet being written to the transport, if it holds any bunch
    pub fn flush(&mut self) -> Option<PacketIndex> {
        self.packet_writer.flush(&mut self.transport)
    }

    // Receiving

    /// Reads every bunch in `data`. Decode errors are contained to the bunch
    /// or channel they affect unless their severity reaches the connection.
    pub fn receive_packet(
        &mut self,
        now: Instant,
        packet_index: PacketIndex,
        data: &[u8],
        refs: &mut dyn ReferenceCache,
    ) -> Result<PacketReceipt, ConnectionError> {
        self.ensure_connected()?;
        let mut reader = BitReader::new(data);
        let mut receipt = PacketReceipt { should_ack: true };

        loop {
            let has_bunch = match reader.read_bit() {
                Ok(has_bunch) => has_bunch,
                Err(_) => {
                    warn!("packet {packet_index}: missing terminator, dropping the rest");
                    receipt.should_ack = false;
                    break;
                }
            };
            if !has_bunch {
                break;
            }

            let bunch = match Bunch::de(&mut reader, packet_index) {
                Ok(bunch) => bunch,
                Err(err) => {
                    let err = DecodeError::from(err);
                    warn!("packet {packet_index}: {err}, dropping the rest");
                    receipt.should_ack = false;
                    break;
                }
            };

            match self.receive_bunch(now, bunch, refs) {
                Ok(skip_ack) => {
                    if skip_ack {
                        receipt.should_ack = false;
                    }
                }
                Err(fatal) => {
                    self.fail(fatal.clone());
                    return Err(fatal.into());
                }
            }
            if !self.is_connected() {
                break;
            }
        }
        Ok(receipt)
    }

    /// Returns whether the packet carrying `bunch` should go unacknowledged
    fn receive_bunch(
        &mut self,
        now: Instant,
        bunch: Bunch,
        refs: &mut dyn ReferenceCache,
    ) -> Result<bool, FatalError> {
        let index = bunch.channel_index;
        if index >= self.table.max_channels() {
            let err = DecodeError::ChannelIndexOutOfRange {
                index,
                max_channels: self.table.max_channels(),
            };
            return self.on_decode_error(None, err).map(|_| false);
        }

        if bunch.reliable && !sequence_greater_than(bunch.sequence, self.table.in_reliable(index)) {
            trace!("channel {index}: discarding duplicate bunch {}", bunch.sequence);
            return Ok(false);
        }

        if !self.table.contains_index(index) {
            if !bunch.reliable && !bunch.open {
                debug!("channel {index}: dropping unreliable bunch for a closed channel");
                return Ok(false);
            }
            let shared_open = bunch.open
                && bunch
                    .channel_kind
                    .map(|kind| kind.capabilities().bidirectional_open)
                    .unwrap_or(false);
            if self.host_type.owns_index(index) && !shared_open {
                if bunch.open {
                    let err = DecodeError::UnexpectedOpen { index };
                    return self.on_decode_error(None, err).map(|_| false);
                }
                debug!("channel {index}: dropping late bunch {} for a released channel", bunch.sequence);
                return Ok(false);
            }
            let Some(kind) = bunch.channel_kind else {
                let err = DecodeError::MalformedBunch(skein_serde::SerdeErr);
                return self.on_decode_error(None, err).map(|_| false);
            };
            let id = self.table.create_remote(index, kind, now);
            trace!("channel {index}: created generation {} for {kind:?}", id.generation);
        }

        let draining: HashSet<NetRefId> = self
            .draining
            .iter()
            .filter_map(|draining| draining.entity.entity_ref())
            .collect();

        let Some(channel) = self.table.get_by_index_mut(index) else {
            return Ok(false);
        };
        let id = channel.id();
        let mut ctx = ReceiveContext {
            now,
            config: &self.config,
            refs: &mut *refs,
            events: &mut self.events,
            draining: &draining,
        };

        match channel.receive_raw(bunch, &mut ctx) {
            Ok(outcome) => {
                if let Some(reason) = outcome.closed {
                    self.on_remote_close(id, reason);
                }
                Ok(outcome.skip_ack)
            }
            Err(ChannelError::Decode(err)) => {
                self.on_decode_error(Some(id), err)?;
                self.drain_broken(now, id, refs, &draining)?;
                Ok(false)
            }
            Err(ChannelError::Fatal(fatal)) => Err(fatal),
        }
    }

    /// A channel that just broke may already hold the close it is waiting
    /// for among its buffered bunches
    fn drain_broken(
        &mut self,
        now: Instant,
        id: ChannelId,
        refs: &mut dyn ReferenceCache,
        draining: &HashSet<NetRefId>,
    ) -> Result<(), FatalError> {
        let Some(channel) = self.table.get_mut(id) else {
            return Ok(());
        };
        if !channel.is_broken() {
            return Ok(());
        }
        let mut ctx = ReceiveContext {
            now,
            config: &self.config,
            refs,
            events: &mut self.events,
            draining,
        };
        match channel.drain_buffered(&mut ctx) {
            Ok(outcome) => {
                if let Some(reason) = outcome.closed {
                    self.on_remote_close(id, reason);
                }
                Ok(())
            }
            Err(ChannelError::Decode(err)) => self.on_decode_error(Some(id), err),
            Err(ChannelError::Fatal(fatal)) => Err(fatal),
        }
    }

    fn on_decode_error(&mut self, channel: Option<ChannelId>, err: DecodeError) -> Result<(), FatalError> {
        match (err.severity(), channel) {
            (DecodeSeverity::Unit, _) => {
                debug!("dropping bunch: {err}");
                Ok(())
            }
            (DecodeSeverity::Channel, Some(id)) => {
                warn!("channel {}: broken by {err}", id.index);
                if let Some(channel) = self.table.get_mut(id) {
                    channel.set_broken();
                }
                self.events.push(ConnectionEvent::ChannelBroken {
                    channel: id,
                    error: err,
                });
                Ok(())
            }
            (DecodeSeverity::Channel, None) => {
                warn!("dropping bunch for unknown channel: {err}");
                Ok(())
            }
            (DecodeSeverity::Connection, _) => Err(FatalError::Protocol(err)),
        }
    }

    fn on_remote_close(&mut self, id: ChannelId, reason: CloseReason) {
        if id.index == CONTROL_CHANNEL_INDEX {
            info!("remote closed the control channel ({reason:?})");
            self.teardown();
            self.events.push(ConnectionEvent::Disconnected {
                reason: DisconnectReason::RemoteClosed,
            });
            return;
        }

        if let Some(ChannelRole::Entity(entity)) = self.table.release(id) {
            if entity.has_queued() {
                debug!(
                    "channel {}: closed with {} bunches still queued, draining",
                    id.index,
                    entity.queued_len()
                );
                self.draining.push(DrainingEntity { channel: id, entity });
            }
        }
        self.events.push(ConnectionEvent::ChannelReleased { channel: id });
    }

    // Acks

    /// The remote received `packet_index`
    pub fn on_ack(&mut self, packet_index: PacketIndex) {
        if !self.is_connected() {
            return;
        }
        let mut released = Vec::new();
        for channel in self.table.iter_mut() {
            let outcome = channel.on_ack(packet_index);
            if outcome.released {
                released.push(channel.id());
            }
        }
        for id in released {
            if self.table.release(id).is_some() {
                self.events.push(ConnectionEvent::ChannelReleased { channel: id });
            }
        }
    }

    /// The remote missed `packet_index`; every unacked reliable bunch it
    /// carried is written again
    pub fn on_nak(&mut self, now: Instant, packet_index: PacketIndex) -> Result<usize, ConnectionError> {
        self.ensure_connected()?;
        let mut sink = PacketSink {
            writer: &mut self.packet_writer,
            transport: &mut self.transport,
        };
        let mut resent = 0;
        for channel in self.table.iter_mut() {
            resent += channel.on_nak(now, packet_index, &mut sink)?;
        }
        Ok(resent)
    }

    // Tick

    /// Resends and drains the control channel, closes entity channels that
    /// have been dormant long enough, replays queued entity bunches within
    /// the per-tick budget, then flushes.
    pub fn tick(&mut self, now: Instant, refs: &mut dyn ReferenceCache) -> Result<(), ConnectionError> {
        self.ensure_connected()?;

        self.tick_control(now)?;
        self.tick_dormancy(now)?;
        self.tick_queued(now, refs)?;

        self.flush();
        Ok(())
    }

    fn tick_control(&mut self, now: Instant) -> Result<(), ConnectionError> {
        let Some(control) = self.table.get_by_index_mut(CONTROL_CHANNEL_INDEX) else {
            return Ok(());
        };
        let mut sink = PacketSink {
            writer: &mut self.packet_writer,
            transport: &mut self.transport,
        };
        let resent = control.resend_stale(
            now,
            self.config.control.resend_timeout,
            self.config.control.max_unacked_for_resend,
            &mut sink,
        )?;
        if resent > 0 {
            trace!("control channel: resent {resent} unacked bunches before open ack");
        }
        let result = control.drain_control_queue(now, &self.config, &mut sink);
        self.escalate(result).map(|_| ())
    }

    fn tick_dormancy(&mut self, now: Instant) -> Result<(), ConnectionError> {
        let hysteresis = self.config.entity.dormancy_hysteresis;
        let ready: Vec<ChannelId> = self
            .table
            .iter()
            .filter(|channel| channel.closing().is_none() && channel.can_send())
            .filter_map(|channel| {
                let has_unacked = channel.unacked_reliable() > 0;
                let entity = channel.entity()?;
                entity
                    .dormancy()
                    .ready_to_close(now, hysteresis, has_unacked)
                    .then(|| channel.id())
            })
            .collect();

        for id in ready {
            debug!("channel {}: closing for dormancy", id.index);
            self.close_channel(now, id, CloseReason::Dormancy)?;
        }
        Ok(())
    }

    fn tick_queued(&mut self, now: Instant, refs: &mut dyn ReferenceCache) -> Result<(), ConnectionError> {
        let mut budget = self.config.entity.queued_bunch_budget;
        let mut failures: Vec<(ChannelId, DecodeError)> = Vec::new();
        let mut out_of_budget = false;

        // Older generations replay first; a newer one waits for them.
        let mut seen: HashSet<NetRefId> = HashSet::new();
        let mut finished: Vec<ChannelId> = Vec::new();
        for draining in self.draining.iter_mut() {
            let reference = draining.entity.entity_ref();
            let older_draining = reference
                .map(|reference| !seen.insert(reference))
                .unwrap_or(false);
            if out_of_budget {
                continue;
            }
            let empty = HashSet::new();
            let mut ctx = ReceiveContext {
                now,
                config: &self.config,
                refs: &mut *refs,
                events: &mut self.events,
                draining: &empty,
            };
            match draining
                .entity
                .drain_queued(draining.channel, &mut ctx, older_draining, &mut budget)
            {
                Ok(DrainStatus::Drained) => finished.push(draining.channel),
                Ok(DrainStatus::Waiting) => {}
                Ok(DrainStatus::OutOfBudget) => out_of_budget = true,
                Err(err) => {
                    failures.push((draining.channel, err));
                    finished.push(draining.channel);
                }
            }
        }
        self.draining
            .retain(|draining| !finished.contains(&draining.channel));

        let still_draining: HashSet<NetRefId> = self
            .draining
            .iter()
            .filter_map(|draining| draining.entity.entity_ref())
            .collect();
        if !out_of_budget {
            for channel in self.table.iter_mut() {
                if channel.is_broken() {
                    continue;
                }
                let id = channel.id();
                let Some(entity) = channel.entity_mut() else {
                    continue;
                };
                if !entity.has_queued() {
                    continue;
                }
                let older_draining = entity
                    .entity_ref()
                    .map(|reference| still_draining.contains(&reference))
                    .unwrap_or(false);
                let mut ctx = ReceiveContext {
                    now,
                    config: &self.config,
                    refs: &mut *refs,
                    events: &mut self.events,
                    draining: &still_draining,
                };
                match entity.drain_queued(id, &mut ctx, older_draining, &mut budget) {
                    Ok(DrainStatus::OutOfBudget) => break,
                    Ok(_) => {}
                    Err(err) => failures.push((id, err)),
                }
            }
        }

        for (id, err) in failures {
            if let Err(fatal) = self.on_decode_error(Some(id), err) {
                self.fail(fatal.clone());
                return Err(fatal.into());
            }
        }
        Ok(())
    }

    // Teardown

    /// Closes the control channel, flushes, and drops every channel
    pub fn disconnect(&mut self, now: Instant) {
        if !self.is_connected() {
            return;
        }
        if let Some(control) = self.table.get_by_index_mut(CONTROL_CHANNEL_INDEX) {
            let mut sink = PacketSink {
                writer: &mut self.packet_writer,
                transport: &mut self.transport,
            };
            if let Err(err) = control.close(now, CloseReason::Shutdown, &self.config.channel, &mut sink) {
                debug!("could not send control close: {err}");
            }
        }
        self.flush();
        info!("disconnected");
        self.teardown();
        self.events.push(ConnectionEvent::Disconnected {
            reason: DisconnectReason::Local,
        });
    }

    fn escalate<R>(&mut self, result: Result<R, ConnectionError>) -> Result<R, ConnectionError> {
        if let Err(ConnectionError::Fatal(fatal)) = &result {
            self.fail(fatal.clone());
        }
        result
    }

    fn fail(&mut self, fatal: FatalError) {
        if !self.is_connected() {
            return;
        }
        error!("closing connection: {fatal}");
        self.teardown();
        self.events.push(ConnectionEvent::Disconnected {
            reason: DisconnectReason::Fatal(fatal),
        });
    }

    fn teardown(&mut self) {
        self.state = ConnectionState::Closed;
        self.table.clear();
        self.draining.clear();
        self.packet_writer.clear();
    }

    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(ConnectionError::Closed),
        }
    }
}
