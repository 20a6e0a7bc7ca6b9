use std::collections::VecDeque;

use thiserror::Error;

use crate::sequence_less_than;

/// Errors that can occur during SequenceList operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Attempted to insert a duplicate ID into the sequence list
    #[error("Duplicate sequence ID {id} not allowed in SequenceList")]
    DuplicateId { id: u16 },
}

/// A list kept sorted by wrapping u16 id. Inserts usually land near the back,
/// so lookups scan from there.
pub struct SequenceList<T> {
    list: VecDeque<(u16, T)>,
}

impl<T> SequenceList<T> {
    pub fn new() -> Self {
        Self {
            list: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn front(&self) -> Option<&(u16, T)> {
        self.list.front()
    }

    pub fn pop_front(&mut self) -> Option<(u16, T)> {
        self.list.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u16, T)> {
        self.list.iter()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    pub fn contains_scan_from_back(&self, id: &u16) -> bool {
        for (old_id, _) in self.list.iter().rev() {
            if *old_id == *id {
                return true;
            }
            if sequence_less_than(*old_id, *id) {
                return false;
            }
        }
        false
    }

    /// Attempts to insert an item with the given ID, scanning from the back.
    /// Returns an error if the ID already exists.
    pub fn try_insert_scan_from_back(&mut self, id: u16, item: T) -> Result<(), SequenceError> {
        let mut index = self.list.len();

        while index > 0 {
            let old_id = self.list[index - 1].0;
            if old_id == id {
                return Err(SequenceError::DuplicateId { id });
            }
            if sequence_less_than(old_id, id) {
                break;
            }
            index -= 1;
        }

        self.list.insert(index, (id, item));
        Ok(())
    }

    pub fn remove_scan_from_front(&mut self, id: &u16) -> Option<T> {
        let index = self.list.iter().position(|(old_id, _)| *old_id == *id)?;
        self.list.remove(index).map(|(_, item)| item)
    }
}

impl<T> Default for SequenceList<T> {
    fn default() -> Self {
        Self::new()
    }
}
