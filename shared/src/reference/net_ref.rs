use skein_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

/// A stable id for an object that both peers agree on, whether or not the
/// object exists locally yet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetRefId(pub u32);

impl NetRefId {
    pub const NULL: NetRefId = NetRefId(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl Serde for NetRefId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        let value = u32::try_from(value).map_err(|_| SerdeErr)?;
        Ok(NetRefId(value))
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

/// A live local object, as handed out by the reference cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);
