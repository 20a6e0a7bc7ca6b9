use log::trace;

use crate::{bunch::Bunch, BunchSequence, ChannelIndex, FatalError, SequenceList};

/// Reliable bunches that arrived ahead of a gap, sorted by sequence
pub struct ReliableReceiver {
    buffer: SequenceList<Bunch>,
}

impl ReliableReceiver {
    pub fn new() -> Self {
        Self {
            buffer: SequenceList::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Exact duplicates are dropped without complaint
    pub fn buffer(
        &mut self,
        index: ChannelIndex,
        bunch: Bunch,
        capacity: usize,
    ) -> Result<(), FatalError> {
        let sequence = bunch.sequence;
        if self.buffer.contains_scan_from_back(&sequence) {
            trace!("channel {index}: duplicate out-of-order bunch {sequence}");
            return Ok(());
        }
        if self.buffer.len() >= capacity {
            return Err(FatalError::OutOfOrderBufferOverflow { index, capacity });
        }
        if self.buffer.try_insert_scan_from_back(sequence, bunch).is_err() {
            trace!("channel {index}: duplicate out-of-order bunch {sequence}");
        }
        Ok(())
    }

    /// Takes the head of the buffer if it is `expected`
    pub fn pop_next(&mut self, expected: BunchSequence) -> Option<Bunch> {
        match self.buffer.front() {
            Some((sequence, _)) if *sequence == expected => {
                self.buffer.pop_front().map(|(_, bunch)| bunch)
            }
            _ => None,
        }
    }
}

impl Default for ReliableReceiver {
    fn default() -> Self {
        Self::new()
    }
}
