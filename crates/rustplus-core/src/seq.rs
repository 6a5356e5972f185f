//! Request sequence allocation.

use crate::types::SequenceId;

/// Hands out request ids starting at 0. Wraps at `u32::MAX` without
/// complaint; a wrap only matters if four billion requests are in flight.
///
/// Not synchronized: the session keeps it behind the same lock as the
/// pending-call table so allocate-and-register is one atomic step.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    next: SequenceId,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current value, then advance.
    pub fn next(&mut self) -> SequenceId {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }
}
