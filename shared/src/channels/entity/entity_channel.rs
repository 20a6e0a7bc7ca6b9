//! # Entity channel
//!
//! Multiplexes one entity and its sub-objects over a single bunch stream.
//! Every bunch carries length-prefixed content blocks, so one block that
//! names a broken reference is skipped without disturbing its siblings.
//!
//! Receiving is strictly in arrival order. When a block needs a reference the
//! cache cannot resolve yet, the rest of the bunch is queued, and every later
//! bunch queues behind it until the queue is replayed on tick.

use std::{
    collections::HashMap,
    time::Instant,
};

use log::{debug, warn};
use skein_serde::{BitReader, BitWriter, Serde, UnsignedVariableInteger};

use crate::{
    bunch::{Bunch, Payload},
    channels::{
        channel::ReceiveContext,
        entity::{
            ContentBlockHeader, Dormancy, QueuedBunch, QueuedBunches, ReplicationCursor,
            ReplicationEvent,
        },
    },
    connection::events::ConnectionEvent,
    ChannelId, ChannelIndex, DecodeError, NetRefId, ObjectHandle, ReferenceCache,
};

pub(crate) enum ProcessOutcome {
    Done,
    Blocked {
        start_bit: u32,
        waiting_on: Vec<NetRefId>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DrainStatus {
    /// Nothing is left in the queue
    Drained,
    /// The head of the queue is still waiting on a reference
    Waiting,
    /// The tick's replay budget ran out
    OutOfBudget,
}

pub struct EntityChannel {
    entity_ref: Option<NetRefId>,
    type_ref: Option<NetRefId>,
    entity: Option<ObjectHandle>,
    cursors: HashMap<NetRefId, ReplicationCursor>,
    queued: QueuedBunches,
    dormancy: Dormancy,
}

impl EntityChannel {
    /// The sending end, which announces `entity_ref` of type `type_ref` in its open bunch
    pub fn outgoing(entity_ref: NetRefId, type_ref: NetRefId, now: Instant) -> Self {
        let mut channel = Self::incoming(now);
        channel.entity_ref = Some(entity_ref);
        channel.type_ref = Some(type_ref);
        channel
    }

    /// The receiving end, which learns its entity from the open bunch
    pub fn incoming(now: Instant) -> Self {
        Self {
            entity_ref: None,
            type_ref: None,
            entity: None,
            cursors: HashMap::new(),
            queued: QueuedBunches::new(),
            dormancy: Dormancy::new(now),
        }
    }

    pub fn entity_ref(&self) -> Option<NetRefId> {
        self.entity_ref
    }

    pub fn entity(&self) -> Option<ObjectHandle> {
        self.entity
    }

    pub fn dormancy(&self) -> &Dormancy {
        &self.dormancy
    }

    pub fn dormancy_mut(&mut self) -> &mut Dormancy {
        &mut self.dormancy
    }

    pub fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn cursor(&self, reference: &NetRefId) -> Option<&ReplicationCursor> {
        self.cursors.get(reference)
    }

    pub(crate) fn cursors_mut(&mut self) -> &mut HashMap<NetRefId, ReplicationCursor> {
        &mut self.cursors
    }

    pub(crate) fn prepend_open_header(&self, payload: &Payload) -> Payload {
        let mut writer = BitWriter::with_capacity(payload.byte_length() + 8);
        self.entity_ref.unwrap_or(NetRefId::NULL).ser(&mut writer);
        self.type_ref.unwrap_or(NetRefId::NULL).ser(&mut writer);
        payload.write(&mut writer);
        Payload::from_writer(writer)
    }

    pub(crate) fn receive_bunch(
        &mut self,
        channel: ChannelId,
        bunch: Bunch,
        ctx: &mut ReceiveContext,
    ) -> Result<(), DecodeError> {
        if bunch.open && self.entity_ref.is_none() {
            let mut reader = bunch.payload.reader();
            let (entity_ref, type_ref) = read_open_header(&mut reader, channel.index)?;
            self.entity_ref = Some(entity_ref);
            self.type_ref = Some(type_ref);
        }

        let older_generation_draining = self
            .entity_ref
            .map(|reference| ctx.draining.contains(&reference))
            .unwrap_or(false);

        if !self.queued.is_empty() || older_generation_draining {
            debug!(
                "channel {}: queueing bunch {} behind {} earlier bunches",
                channel.index,
                bunch.sequence,
                self.queued.len()
            );
            self.queued
                .push_back(QueuedBunch::new(bunch, 0, Vec::new(), ctx.now));
            return Ok(());
        }

        if let ProcessOutcome::Blocked {
            start_bit,
            waiting_on,
        } = self.process_bunch(channel, &bunch, 0, ctx)?
        {
            debug!(
                "channel {}: bunch {} waiting on {:?}",
                channel.index, bunch.sequence, waiting_on
            );
            self.queued
                .push_back(QueuedBunch::new(bunch, start_bit, waiting_on, ctx.now));
        }
        Ok(())
    }

    /// Replays queued bunches in receipt order until one is still blocked or
    /// `budget` is spent. Each replayed bunch costs one.
    pub(crate) fn drain_queued(
        &mut self,
        channel: ChannelId,
        ctx: &mut ReceiveContext,
        older_generation_draining: bool,
        budget: &mut usize,
    ) -> Result<DrainStatus, DecodeError> {
        loop {
            let Some(front) = self.queued.front_mut() else {
                return Ok(DrainStatus::Drained);
            };
            if older_generation_draining {
                return Ok(DrainStatus::Waiting);
            }
            if !front.is_ready(&*ctx.refs) {
                let waited = ctx.now.saturating_duration_since(front.queued_at);
                if !front.warned && waited >= ctx.config.entity.queued_bunch_warn_after {
                    front.warned = true;
                    warn!(
                        "channel {}: bunch {} has waited {:?} on unresolved references {:?}",
                        channel.index, front.bunch.sequence, waited, front.waiting_on
                    );
                }
                return Ok(DrainStatus::Waiting);
            }
            if *budget == 0 {
                return Ok(DrainStatus::OutOfBudget);
            }
            *budget -= 1;

            let Some(mut queued) = self.queued.pop_front() else {
                return Ok(DrainStatus::Drained);
            };
            if let ProcessOutcome::Blocked {
                start_bit,
                waiting_on,
            } = self.process_bunch(channel, &queued.bunch, queued.start_bit, ctx)?
            {
                queued.start_bit = start_bit;
                queued.waiting_on = waiting_on;
                self.queued.push_front(queued);
            }
        }
    }

    fn process_bunch(
        &mut self,
        channel: ChannelId,
        bunch: &Bunch,
        start_bit: u32,
        ctx: &mut ReceiveContext,
    ) -> Result<ProcessOutcome, DecodeError> {
        let index = channel.index;
        let mut reader = bunch.payload.reader();
        reader
            .skip_bits(start_bit)
            .map_err(|_| malformed(index, "resume point is past the payload"))?;

        if bunch.open && start_bit == 0 {
            let (entity_ref, type_ref) = read_open_header(&mut reader, index)?;
            if self.entity.is_none() {
                match bind_entity(index, entity_ref, type_ref, &mut *ctx.refs)? {
                    Some(entity) => {
                        self.entity = Some(entity);
                        ctx.events
                            .push(ConnectionEvent::Replication(ReplicationEvent::EntityOpened {
                                channel,
                                reference: entity_ref,
                                entity,
                            }));
                    }
                    None => {
                        return Ok(ProcessOutcome::Blocked {
                            start_bit: 0,
                            waiting_on: vec![type_ref],
                        })
                    }
                }
            }
        }

        while !reader.is_empty() {
            let block_start = reader.position();
            let header = ContentBlockHeader::de(&mut reader)
                .map_err(|_| malformed(index, "unreadable block header"))?;
            let payload = if header.has_payload() {
                read_block_payload(&mut reader, index)?
            } else {
                Payload::empty()
            };
            let entity = self
                .entity
                .ok_or_else(|| malformed(index, "content block before the entity is bound"))?;

            match header {
                ContentBlockHeader::Entity => {
                    ctx.events
                        .push(ConnectionEvent::Replication(ReplicationEvent::EntityUpdated {
                            channel,
                            entity,
                            payload,
                        }));
                }
                ContentBlockHeader::SubObject { reference } => {
                    let known = self.cursors.get(&reference).and_then(|cursor| cursor.object);
                    let Some(object) = known.or_else(|| ctx.refs.resolve(reference)) else {
                        if ctx.refs.is_broken(reference) {
                            warn!("channel {index}: skipping block for broken sub-object {reference:?}");
                            continue;
                        }
                        return Ok(ProcessOutcome::Blocked {
                            start_bit: block_start,
                            waiting_on: vec![reference],
                        });
                    };
                    let cursor = self
                        .cursors
                        .entry(reference)
                        .or_insert_with(|| ReplicationCursor::new(NetRefId::NULL, Some(object)));
                    cursor.blocks += 1;
                    ctx.events
                        .push(ConnectionEvent::Replication(ReplicationEvent::SubObjectUpdated {
                            channel,
                            entity,
                            reference,
                            object,
                            payload,
                        }));
                }
                ContentBlockHeader::NewSubObject {
                    reference,
                    object_type,
                } => {
                    let known = self
                        .cursors
                        .get(&reference)
                        .and_then(|cursor| cursor.object)
                        .or_else(|| ctx.refs.resolve(reference));
                    let object = match known {
                        Some(object) => object,
                        None => {
                            let Some(type_handle) = ctx.refs.resolve(object_type) else {
                                if ctx.refs.is_broken(object_type) {
                                    warn!("channel {index}: skipping sub-object {reference:?} of broken type {object_type:?}");
                                    continue;
                                }
                                return Ok(ProcessOutcome::Blocked {
                                    start_bit: block_start,
                                    waiting_on: vec![object_type],
                                });
                            };
                            let Some(object) =
                                ctx.refs.instantiate(reference, type_handle, Some(entity))
                            else {
                                warn!("channel {index}: could not instantiate sub-object {reference:?}");
                                continue;
                            };
                            ctx.events.push(ConnectionEvent::Replication(
                                ReplicationEvent::SubObjectCreated {
                                    channel,
                                    entity,
                                    reference,
                                    object,
                                },
                            ));
                            object
                        }
                    };
                    let mut cursor = ReplicationCursor::new(object_type, Some(object));
                    cursor.blocks = 1;
                    self.cursors.insert(reference, cursor);
                    if !payload.is_empty() {
                        ctx.events.push(ConnectionEvent::Replication(
                            ReplicationEvent::SubObjectUpdated {
                                channel,
                                entity,
                                reference,
                                object,
                                payload,
                            },
                        ));
                    }
                }
                ContentBlockHeader::DestroySubObject { reference } => {
                    let object = self
                        .cursors
                        .remove(&reference)
                        .and_then(|cursor| cursor.object)
                        .or_else(|| ctx.refs.resolve(reference));
                    ctx.events
                        .push(ConnectionEvent::Replication(ReplicationEvent::SubObjectDestroyed {
                            channel,
                            entity,
                            reference,
                            object,
                        }));
                }
            }
        }

        if let Some(reason) = bunch.close {
            ctx.events
                .push(ConnectionEvent::ChannelClosed { channel, reason });
        }

        Ok(ProcessOutcome::Done)
    }
}

fn malformed(index: ChannelIndex, reason: &'static str) -> DecodeError {
    DecodeError::MalformedContentBlock { index, reason }
}

fn read_open_header(
    reader: &mut BitReader,
    index: ChannelIndex,
) -> Result<(NetRefId, NetRefId), DecodeError> {
    let entity_ref = NetRefId::de(reader).map_err(|_| DecodeError::MalformedEntityHeader { index })?;
    let type_ref = NetRefId::de(reader).map_err(|_| DecodeError::MalformedEntityHeader { index })?;
    if entity_ref.is_null() || type_ref.is_null() {
        return Err(DecodeError::MalformedEntityHeader { index });
    }
    Ok((entity_ref, type_ref))
}

fn read_block_payload(reader: &mut BitReader, index: ChannelIndex) -> Result<Payload, DecodeError> {
    let bit_length = UnsignedVariableInteger::<8>::de(reader)
        .map_err(|_| malformed(index, "unreadable block length"))?
        .get();
    let bit_length =
        u32::try_from(bit_length).map_err(|_| malformed(index, "block length overflow"))?;
    let bytes = reader
        .read_bits(bit_length)
        .map_err(|_| malformed(index, "block runs past the end of the bunch"))?;
    Ok(Payload::new(bytes, bit_length))
}

/// Resolves the channel's entity, instantiating it from its type when needed.
/// `None` means the type is not resolvable yet.
fn bind_entity(
    index: ChannelIndex,
    entity_ref: NetRefId,
    type_ref: NetRefId,
    refs: &mut dyn ReferenceCache,
) -> Result<Option<ObjectHandle>, DecodeError> {
    if let Some(entity) = refs.resolve(entity_ref) {
        return Ok(Some(entity));
    }
    let unresolvable = DecodeError::UnresolvableEntity {
        index,
        reference: entity_ref.0,
    };
    if refs.is_broken(entity_ref) {
        return Err(unresolvable);
    }
    match refs.resolve(type_ref) {
        Some(type_handle) => refs
            .instantiate(entity_ref, type_handle, None)
            .map(Some)
            .ok_or(unresolvable),
        None if refs.is_broken(type_ref) => Err(unresolvable),
        None => Ok(None),
    }
}
