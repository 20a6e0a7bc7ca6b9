use skein_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::NetRefId;

/// Identifies the object a content block is addressed to.
///
/// Wire layout: an "is entity" bit; otherwise the object's reference id, a
/// "has type" bit and, when set, a type reference id. A null type reference
/// marks the sub-object as destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentBlockHeader {
    Entity,
    SubObject {
        reference: NetRefId,
    },
    NewSubObject {
        reference: NetRefId,
        object_type: NetRefId,
    },
    DestroySubObject {
        reference: NetRefId,
    },
}

impl ContentBlockHeader {
    /// Destruction blocks carry no payload
    pub fn has_payload(&self) -> bool {
        !matches!(self, ContentBlockHeader::DestroySubObject { .. })
    }
}

impl Serde for ContentBlockHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            ContentBlockHeader::Entity => {
                true.ser(writer);
            }
            ContentBlockHeader::SubObject { reference } => {
                false.ser(writer);
                reference.ser(writer);
                false.ser(writer);
            }
            ContentBlockHeader::NewSubObject {
                reference,
                object_type,
            } => {
                false.ser(writer);
                reference.ser(writer);
                true.ser(writer);
                object_type.ser(writer);
            }
            ContentBlockHeader::DestroySubObject { reference } => {
                false.ser(writer);
                reference.ser(writer);
                true.ser(writer);
                NetRefId::NULL.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if bool::de(reader)? {
            return Ok(ContentBlockHeader::Entity);
        }

        let reference = NetRefId::de(reader)?;
        if reference.is_null() {
            return Err(SerdeErr);
        }

        if !bool::de(reader)? {
            return Ok(ContentBlockHeader::SubObject { reference });
        }

        let object_type = NetRefId::de(reader)?;
        if object_type.is_null() {
            Ok(ContentBlockHeader::DestroySubObject { reference })
        } else {
            Ok(ContentBlockHeader::NewSubObject {
                reference,
                object_type,
            })
        }
    }

    fn bit_length(&self) -> u32 {
        match self {
            ContentBlockHeader::Entity => 1,
            ContentBlockHeader::SubObject { reference } => 2 + reference.bit_length(),
            ContentBlockHeader::NewSubObject {
                reference,
                object_type,
            } => 2 + reference.bit_length() + object_type.bit_length(),
            ContentBlockHeader::DestroySubObject { reference } => {
                2 + reference.bit_length() + NetRefId::NULL.bit_length()
            }
        }
    }
}
