use log::debug;

use crate::{bunch::Bunch, ChannelError, ChannelIndex, DecodeError, FatalError};

pub enum AssemblyOutcome {
    /// More slices are needed, or the slice was dropped
    Pending,
    /// The last slice arrived, here is the whole bunch
    Complete(Bunch),
    /// The slice did not fit the assembly; leave its packet unacknowledged
    SkipAck,
}

/// Rebuilds a bunch from its partial slices. Only one assembly is in
/// progress per channel at a time.
pub struct PartialBunchAssembler {
    in_progress: Option<Bunch>,
}

impl PartialBunchAssembler {
    pub fn new() -> Self {
        Self { in_progress: None }
    }

    pub fn is_assembling(&self) -> bool {
        self.in_progress.is_some()
    }

    pub fn clear(&mut self) {
        self.in_progress = None;
    }

    pub fn receive(
        &mut self,
        bunch: Bunch,
        max_assembled_bytes: usize,
    ) -> Result<AssemblyOutcome, ChannelError> {
        let index = bunch.channel_index;

        if !bunch.reliable && self.in_progress.as_ref().map(|b| b.reliable).unwrap_or(false) {
            self.in_progress = None;
            return Err(DecodeError::UnreliablePartialOverReliable {
                index,
                sequence: bunch.sequence,
            }
            .into());
        }

        if !bunch.is_final_slice() && !bunch.payload.is_byte_aligned() {
            self.in_progress = None;
            return Err(DecodeError::UnalignedPartialBunch {
                index,
                bit_length: bunch.payload.bit_length(),
            }
            .into());
        }

        if bunch.is_partial_first() {
            if let Some(stale) = self.in_progress.take() {
                if stale.reliable {
                    return Err(DecodeError::ReliablePartialAbandoned {
                        index,
                        sequence: stale.sequence,
                    }
                    .into());
                }
                debug!(
                    "channel {index}: incomplete partial bunch at sequence {} dropped",
                    stale.sequence
                );
            }
            check_size(index, bunch.payload.byte_length(), max_assembled_bytes)?;

            let mut assembly = bunch;
            if assembly.is_partial_last() {
                assembly.partial = None;
                return Ok(AssemblyOutcome::Complete(assembly));
            }
            self.in_progress = Some(assembly);
            return Ok(AssemblyOutcome::Pending);
        }

        let (continues, assembled_bytes) = match self.in_progress.as_ref() {
            None => return self.mismatch(index, bunch),
            Some(assembly) => {
                let sequence_matches = if bunch.reliable {
                    bunch.sequence == assembly.sequence.wrapping_add(1)
                } else {
                    bunch.sequence == assembly.sequence
                        || bunch.sequence == assembly.sequence.wrapping_add(1)
                };
                (
                    sequence_matches && bunch.reliable == assembly.reliable,
                    assembly.payload.byte_length() + bunch.payload.byte_length(),
                )
            }
        };
        if !continues {
            return self.mismatch(index, bunch);
        }

        if let Err(error) = check_size(index, assembled_bytes, max_assembled_bytes) {
            self.in_progress = None;
            return Err(error.into());
        }

        let Some(assembly) = self.in_progress.as_mut() else {
            return Ok(AssemblyOutcome::Pending);
        };
        assembly.payload.append(&bunch.payload);
        assembly.sequence = bunch.sequence;
        assembly.packet_index = bunch.packet_index;

        if !bunch.is_partial_last() {
            return Ok(AssemblyOutcome::Pending);
        }

        let Some(mut complete) = self.in_progress.take() else {
            return Ok(AssemblyOutcome::Pending);
        };
        complete.partial = None;
        complete.close = bunch.close;
        complete.replication_paused = bunch.replication_paused;
        Ok(AssemblyOutcome::Complete(complete))
    }

    /// A continuation that does not fit. Losing a reliable assembly is an
    /// error; anything else is abandoned and left unacknowledged.
    fn mismatch(&mut self, index: ChannelIndex, bunch: Bunch) -> Result<AssemblyOutcome, ChannelError> {
        match self.in_progress.take() {
            Some(stale) if stale.reliable => Err(DecodeError::ReliablePartialAbandoned {
                index,
                sequence: stale.sequence,
            }
            .into()),
            Some(stale) => {
                debug!(
                    "channel {index}: partial bunch {} does not continue assembly at {}, abandoning it",
                    bunch.sequence, stale.sequence
                );
                Ok(AssemblyOutcome::SkipAck)
            }
            None if bunch.reliable => Err(DecodeError::ReliablePartialAbandoned {
                index,
                sequence: bunch.sequence,
            }
            .into()),
            None => Ok(AssemblyOutcome::SkipAck),
        }
    }
}

impl Default for PartialBunchAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn check_size(index: ChannelIndex, bytes: usize, max_bytes: usize) -> Result<(), FatalError> {
    if bytes > max_bytes {
        return Err(FatalError::AssembledBunchTooLarge {
            index,
            bytes,
            max_bytes,
        });
    }
    Ok(())
}
