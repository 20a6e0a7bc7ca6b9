use skein_serde::{BitReader, BitWrite, BitWriter};

/// An opaque run of bits carried by a bunch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    bit_length: u32,
}

impl Payload {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bits past `bit_length` in the final byte are ignored
    pub fn new(mut bytes: Vec<u8>, bit_length: u32) -> Self {
        let byte_length = bit_length.div_ceil(8) as usize;
        bytes.resize(byte_length, 0);
        let tail = bit_length & 7;
        if tail > 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= (1u8 << tail) - 1;
            }
        }
        Self { bytes, bit_length }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let bit_length = (bytes.len() as u32) * 8;
        Self { bytes, bit_length }
    }

    pub fn from_writer(writer: BitWriter) -> Self {
        let (bytes, bit_length) = writer.into_parts();
        Self::new(bytes, bit_length)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bit_length == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_length & 7 == 0
    }

    pub fn reader(&self) -> BitReader<'_> {
        BitReader::with_bit_limit(&self.bytes, self.bit_length)
    }

    /// Appends all bits of `other` directly after this payload's last bit
    pub fn append(&mut self, other: &Payload) {
        if self.is_byte_aligned() {
            self.bytes.extend_from_slice(&other.bytes);
            self.bit_length += other.bit_length;
            return;
        }
        let mut writer = BitWriter::with_capacity(self.bytes.len() + other.bytes.len());
        writer.write_bits(&self.bytes, self.bit_length);
        writer.write_bits(&other.bytes, other.bit_length);
        *self = Self::from_writer(writer);
    }

    /// Copies `bit_length` bits starting at byte `byte_offset`
    pub fn slice(&self, byte_offset: usize, bit_length: u32) -> Payload {
        let start = byte_offset.min(self.bytes.len());
        let end = (start + bit_length.div_ceil(8) as usize).min(self.bytes.len());
        Self::new(self.bytes[start..end].to_vec(), bit_length)
    }

    pub fn write(&self, writer: &mut dyn BitWrite) {
        writer.write_bits(&self.bytes, self.bit_length);
    }
}
