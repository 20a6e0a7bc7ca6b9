use crate::SerdeErr;

/// Reads bits LSB-first out of a borrowed buffer, never past `limit`
pub struct BitReader<'b> {
    buffer: &'b [u8],
    position: u32,
    limit: u32,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        let limit = (buffer.len() as u32).saturating_mul(8);
        Self {
            buffer,
            position: 0,
            limit,
        }
    }

    /// Restricts the reader to the first `bit_limit` bits of `buffer`
    pub fn with_bit_limit(buffer: &'b [u8], bit_limit: u32) -> Self {
        let mut reader = Self::new(buffer);
        reader.limit = reader.limit.min(bit_limit);
        reader
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn bits_remaining(&self) -> u32 {
        self.limit - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.limit
    }

    pub fn skip_bits(&mut self, bits: u32) -> Result<(), SerdeErr> {
        if bits > self.bits_remaining() {
            return Err(SerdeErr);
        }
        self.position += bits;
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        if self.position >= self.limit {
            return Err(SerdeErr);
        }
        let byte = self.buffer[(self.position >> 3) as usize];
        let bit = (byte >> (self.position & 7)) & 1 != 0;
        self.position += 1;
        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        if self.bits_remaining() < 8 {
            return Err(SerdeErr);
        }
        if self.position & 7 == 0 {
            let byte = self.buffer[(self.position >> 3) as usize];
            self.position += 8;
            return Ok(byte);
        }
        let mut output: u8 = 0;
        for index in 0..8 {
            if self.read_bit()? {
                output |= 1 << index;
            }
        }
        Ok(output)
    }

    /// Reads `bit_length` bits into a fresh buffer. Trailing bits of the last
    /// byte are zero.
    pub fn read_bits(&mut self, bit_length: u32) -> Result<Vec<u8>, SerdeErr> {
        if bit_length > self.bits_remaining() {
            return Err(SerdeErr);
        }
        let whole_bytes = (bit_length >> 3) as usize;
        let mut output = Vec::with_capacity(whole_bytes + 1);

        if self.position & 7 == 0 {
            let start = (self.position >> 3) as usize;
            output.extend_from_slice(&self.buffer[start..start + whole_bytes]);
            self.position += (whole_bytes as u32) * 8;
        } else {
            for _ in 0..whole_bytes {
                output.push(self.read_byte()?);
            }
        }

        let tail = bit_length & 7;
        if tail > 0 {
            let mut last: u8 = 0;
            for index in 0..tail {
                if self.read_bit()? {
                    last |= 1 << index;
                }
            }
            output.push(last);
        }

        Ok(output)
    }
}
