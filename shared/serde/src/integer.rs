use crate::{BitReader, BitWrite, ConstBitLength, SerdeErr, Serde};

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<true, BITS>;

/// An unsigned integer packed into a fixed number of bits, or into
/// BITS-sized chunks each preceded by a "proceed" bit when VARIABLE.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const VARIABLE: bool, const BITS: u8> {
    value: u64,
}

// Non-generic helpers, to keep monomorphization small
fn ser_inner(writer: &mut dyn BitWrite, mut value: u64, variable: bool, bits: u8) {
    if variable {
        loop {
            let proceed = bits < 64 && value >= (1u64 << bits);
            writer.write_bit(proceed);
            for _ in 0..bits {
                writer.write_bit(value & 1 != 0);
                value >>= 1;
            }
            if !proceed {
                return;
            }
        }
    } else {
        for _ in 0..bits {
            writer.write_bit(value & 1 != 0);
            value >>= 1;
        }
    }
}

fn de_inner(reader: &mut BitReader, variable: bool, bits: u8) -> Result<u64, SerdeErr> {
    let mut output: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let proceed = if variable { reader.read_bit()? } else { false };
        for _ in 0..bits {
            let bit = reader.read_bit()?;
            if bit {
                if shift >= 64 {
                    return Err(SerdeErr);
                }
                output |= 1 << shift;
            }
            shift += 1;
        }
        if !proceed {
            return Ok(output);
        }
        if shift >= 64 {
            return Err(SerdeErr);
        }
    }
}

fn bit_length_inner(mut value: u64, variable: bool, bits: u8) -> u32 {
    if !variable {
        return bits as u32;
    }
    let mut output = 0;
    loop {
        output += 1 + bits as u32;
        if bits >= 64 || value < (1u64 << bits) {
            return output;
        }
        value >>= bits;
    }
}

impl<const VARIABLE: bool, const BITS: u8> SerdeInteger<VARIABLE, BITS> {
    /// Fixed-width integers silently drop any bits above BITS
    pub fn new<T: Into<u64>>(value: T) -> Self {
        let mut value = value.into();
        if !VARIABLE && BITS < 64 {
            debug_assert!(
                value < (1u64 << BITS),
                "with {} bits, can't encode {}",
                BITS,
                value
            );
            value &= (1u64 << BITS) - 1;
        }
        Self { value }
    }

    pub fn get(&self) -> u64 {
        self.value
    }
}

impl<const VARIABLE: bool, const BITS: u8> Serde for SerdeInteger<VARIABLE, BITS> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        ser_inner(writer, self.value, VARIABLE, BITS);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = de_inner(reader, VARIABLE, BITS)?;
        Ok(Self { value })
    }

    fn bit_length(&self) -> u32 {
        bit_length_inner(self.value, VARIABLE, BITS)
    }
}

impl<const BITS: u8> ConstBitLength for SerdeInteger<false, BITS> {
    fn const_bit_length() -> u32 {
        BITS as u32
    }
}
