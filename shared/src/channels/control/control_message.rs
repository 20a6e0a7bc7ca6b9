use skein_serde::{BitReader, BitWrite, BitWriter, Serde, SerdeErr, UnsignedVariableInteger};

use crate::bunch::Payload;

/// An out-of-band protocol message carried on the control channel.
/// The body is opaque to this layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlMessage {
    pub message_type: u8,
    pub body: Vec<u8>,
}

impl ControlMessage {
    pub fn new(message_type: u8, body: Vec<u8>) -> Self {
        Self { message_type, body }
    }

    pub fn to_payload(&self) -> Payload {
        let mut writer = BitWriter::with_capacity(self.body.len() + 4);
        self.ser(&mut writer);
        Payload::from_writer(writer)
    }
}

impl Serde for ControlMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.message_type.ser(writer);
        UnsignedVariableInteger::<8>::new(self.body.len() as u64).ser(writer);
        for byte in &self.body {
            writer.write_byte(*byte);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let message_type = u8::de(reader)?;
        let length = UnsignedVariableInteger::<8>::de(reader)?.get();
        let length = usize::try_from(length).map_err(|_| SerdeErr)?;
        if length.saturating_mul(8) > reader.bits_remaining() as usize {
            return Err(SerdeErr);
        }
        let mut body = Vec::with_capacity(length);
        for _ in 0..length {
            body.push(reader.read_byte()?);
        }
        Ok(Self { message_type, body })
    }

    fn bit_length(&self) -> u32 {
        let length = UnsignedVariableInteger::<8>::new(self.body.len() as u64);
        8 + length.bit_length() + (self.body.len() as u32) * 8
    }
}
