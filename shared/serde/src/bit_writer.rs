/// A sink for individual bits. Bits within a byte are laid out LSB-first.
pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
    fn is_counter(&self) -> bool;
    fn count_bits(&mut self, bits: u32);

    /// Writes the first `bit_length` bits of `bytes`.
    fn write_bits(&mut self, bytes: &[u8], bit_length: u32) {
        for bit_index in 0..bit_length {
            let byte = bytes.get((bit_index >> 3) as usize).copied().unwrap_or(0);
            self.write_bit((byte >> (bit_index & 7)) & 1 != 0);
        }
    }
}

/// A growable BitWrite implementation. Bunches on the send path can be far
/// larger than a single packet before they are split, so there is no fixed
/// capacity here; packet limits are enforced by the packet writer.
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(bytes),
            bits_written: 0,
        }
    }

    fn flush_scratch(&mut self) {
        if self.scratch_index > 0 {
            let byte = (self.scratch << (8 - self.scratch_index)).reverse_bits();
            self.buffer.push(byte);
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.scratch_index == 0
    }

    pub fn to_bytes(mut self) -> Vec<u8> {
        self.flush_scratch();
        self.buffer
    }

    /// Consumes the writer, returning its bytes along with the exact bit count
    pub fn into_parts(self) -> (Vec<u8>, u32) {
        let bits = self.bits_written;
        (self.to_bytes(), bits)
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index = 0;
            self.scratch = 0;
        }
    }

    fn write_byte(&mut self, byte: u8) {
        if self.scratch_index == 0 {
            self.buffer.push(byte);
            self.bits_written += 8;
            return;
        }
        let mut temp = byte;
        for _ in 0..8 {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    fn is_counter(&self) -> bool {
        false
    }

    fn count_bits(&mut self, _bits: u32) {}

    fn write_bits(&mut self, bytes: &[u8], bit_length: u32) {
        let whole_bytes = (bit_length >> 3) as usize;
        let whole_bytes = whole_bytes.min(bytes.len());
        if self.scratch_index == 0 {
            self.buffer.extend_from_slice(&bytes[..whole_bytes]);
            self.bits_written += (whole_bytes as u32) * 8;
        } else {
            for byte in &bytes[..whole_bytes] {
                self.write_byte(*byte);
            }
        }
        let written = (whole_bytes as u32) * 8;
        for bit_index in written..bit_length {
            let byte = bytes.get((bit_index >> 3) as usize).copied().unwrap_or(0);
            self.write_bit((byte >> (bit_index & 7)) & 1 != 0);
        }
    }
}
