use std::collections::VecDeque;

use log::warn;
use skein_serde::Serde;

use crate::{
    bunch::Bunch, channels::control::ControlMessage, connection::events::ConnectionEvent,
    ControlChannelConfig, DecodeError, FatalError,
};

/// State specific to channel 0: the outgoing queue used while the channel
/// is not open yet or its reliable buffer is near full.
pub struct ControlChannel {
    queue: VecDeque<ControlMessage>,
}

impl ControlChannel {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(
        &mut self,
        message: ControlMessage,
        config: &ControlChannelConfig,
    ) -> Result<(), FatalError> {
        if self.queue.len() >= config.max_queued_messages {
            return Err(FatalError::ControlQueueOverflow {
                queued: self.queue.len() + 1,
                max_queued: config.max_queued_messages,
            });
        }
        if self.queue.is_empty() {
            warn!("control channel is saturated, queueing outgoing messages");
        }
        self.queue.push_back(message);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<ControlMessage> {
        self.queue.pop_front()
    }

    /// Reads every message packed in `bunch`
    pub(crate) fn receive_bunch(
        &mut self,
        bunch: &Bunch,
        events: &mut Vec<ConnectionEvent>,
    ) -> Result<(), DecodeError> {
        let mut reader = bunch.payload.reader();
        while !reader.is_empty() {
            let message = ControlMessage::de(&mut reader).map_err(|_| {
                DecodeError::MalformedControlMessage {
                    reason: "truncated message",
                }
            })?;
            events.push(ConnectionEvent::ControlMessage(message));
        }
        Ok(())
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}
