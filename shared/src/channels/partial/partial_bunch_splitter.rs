use log::warn;

use crate::{
    bunch::{Bunch, PartialFlags},
    ChannelConfig,
};

/// The bunches an outgoing bunch was cut into, in send order
pub struct SplitBunch {
    pub bunches: Vec<Bunch>,
    /// The split was forced to be reliable by the partial threshold
    pub upgraded_to_reliable: bool,
}

/// Cuts `bunch` into byte-aligned slices of at most `max_bunch_bytes`.
///
/// Only the first slice keeps `open` and `has_reference_exports`, only the
/// last keeps `close`. A split of an unreliable bunch with at least
/// `partial_reliable_threshold` slices is made reliable, as long as that does
/// not overflow the `reliable_pending` already outstanding on the channel.
pub fn split_bunch(bunch: Bunch, config: &ChannelConfig, reliable_pending: usize) -> SplitBunch {
    let max_bits = config.max_bunch_bits();
    let total_bits = bunch.payload.bit_length();

    if total_bits <= max_bits {
        return SplitBunch {
            bunches: vec![bunch],
            upgraded_to_reliable: false,
        };
    }

    let count = total_bits.div_ceil(max_bits) as usize;
    let mut reliable = bunch.reliable;
    let mut upgraded_to_reliable = false;

    if !reliable {
        if let Some(threshold) = config.partial_reliable_threshold {
            if count >= threshold {
                let is_close = bunch.close.is_some();
                if reliable_pending + count >= config.reliable_buffer + is_close as usize {
                    warn!(
                        "channel {}: {} partial bunches would overflow the reliable buffer, sending unreliably",
                        bunch.channel_index, count
                    );
                } else {
                    reliable = true;
                    upgraded_to_reliable = true;
                }
            }
        }
    }

    let mut bunches = Vec::with_capacity(count);
    let mut remaining = total_bits;
    for slice in 0..count {
        let slice_bits = remaining.min(max_bits);
        remaining -= slice_bits;

        let first = slice == 0;
        let last = slice + 1 == count;

        let payload = bunch
            .payload
            .slice(slice * config.max_bunch_bytes, slice_bits);
        let mut part = bunch.header_clone(payload);
        part.reliable = reliable;
        part.partial = Some(PartialFlags { first, last });
        part.open = bunch.open && first;
        part.has_reference_exports = bunch.has_reference_exports && first;
        part.close = if last { bunch.close } else { None };
        bunches.push(part);
    }

    SplitBunch {
        bunches,
        upgraded_to_reliable,
    }
}
