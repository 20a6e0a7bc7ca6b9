use log::warn;
use skein_serde::{BitWriter, Serde, UnsignedVariableInteger};

use crate::{
    bunch::{Bunch, Payload},
    channels::entity::{ContentBlockHeader, EntityChannel, ReplicationCursor},
    NetRefId,
};

/// Packs content blocks for one outgoing entity-channel bunch.
///
/// The first block written for a sub-object announces its type; the channel
/// remembers that through its replication cursors.
pub struct ContentBlockWriter<'c> {
    channel: &'c mut EntityChannel,
    writer: BitWriter,
    blocks: usize,
    has_reference_exports: bool,
}

impl<'c> ContentBlockWriter<'c> {
    pub(crate) fn new(channel: &'c mut EntityChannel) -> Self {
        Self {
            channel,
            writer: BitWriter::new(),
            blocks: 0,
            has_reference_exports: false,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks
    }

    pub fn write_entity_block(&mut self, payload: &Payload) -> &mut Self {
        self.write_block(ContentBlockHeader::Entity, Some(payload));
        self
    }

    pub fn write_sub_object_block(
        &mut self,
        reference: NetRefId,
        object_type: NetRefId,
        payload: &Payload,
    ) -> &mut Self {
        if reference.is_null() || object_type.is_null() {
            warn!("refusing to write a content block with a null reference");
            return self;
        }

        let cursors = self.channel.cursors_mut();
        let header = match cursors.get_mut(&reference) {
            Some(cursor) => {
                cursor.blocks += 1;
                ContentBlockHeader::SubObject { reference }
            }
            None => {
                let mut cursor = ReplicationCursor::new(object_type, None);
                cursor.blocks = 1;
                cursors.insert(reference, cursor);
                self.has_reference_exports = true;
                ContentBlockHeader::NewSubObject {
                    reference,
                    object_type,
                }
            }
        };
        self.write_block(header, Some(payload));
        self
    }

    pub fn destroy_sub_object(&mut self, reference: NetRefId) -> &mut Self {
        if reference.is_null() {
            warn!("refusing to destroy a null sub-object reference");
            return self;
        }
        self.channel.cursors_mut().remove(&reference);
        self.write_block(ContentBlockHeader::DestroySubObject { reference }, None);
        self
    }

    /// The finished bunch is unreliable; set `reliable` on it before sending
    /// if the blocks must arrive
    pub fn finish(self) -> Bunch {
        let mut bunch = Bunch::new(Payload::from_writer(self.writer));
        bunch.has_reference_exports = self.has_reference_exports;
        bunch
    }

    fn write_block(&mut self, header: ContentBlockHeader, payload: Option<&Payload>) {
        header.ser(&mut self.writer);
        if let Some(payload) = payload {
            UnsignedVariableInteger::<8>::new(payload.bit_length()).ser(&mut self.writer);
            payload.write(&mut self.writer);
        }
        self.blocks += 1;
    }
}
