//! In-flight request table and the continuations it holds.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::oneshot;

use crate::entity::EntitySnapshot;
use crate::error::{Error, Result};
use crate::resolution::Registration;
use crate::types::{EntityId, Response, SequenceId};

/// Invoked with the decoded response.
pub type ValueCallback = Box<dyn FnOnce(Response) + Send>;

/// Invoked with the response and the entity as it was before the response
/// payload is committed to the cache.
pub type DeviceCallback = Box<dyn FnOnce(&Response, &EntitySnapshot) + Send>;

/// What to do when the response for a request arrives. Holds only owned
/// data; the dispatcher executes it.
pub enum Continuation {
    Value(ValueCallback),
    /// Hand the response to an awaiting caller.
    Reply(oneshot::Sender<Response>),
    /// Run an optional callback, then feed the response back into the
    /// entity cache.
    Device {
        entity_id: EntityId,
        callback: Option<DeviceCallback>,
    },
    /// Answer to a type probe.
    Register(Registration),
}

impl Continuation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Reply(_) => "reply",
            Self::Device { .. } => "device",
            Self::Register(_) => "register",
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { entity_id, callback } => f
                .debug_struct("Device")
                .field("entity_id", entity_id)
                .field("has_callback", &callback.is_some())
                .finish(),
            Self::Register(reg) => f.debug_tuple("Register").field(reg).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Maps an outstanding request id to exactly one continuation.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<SequenceId, Continuation>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a continuation. An id that is already pending is rejected and
    /// the existing entry is left untouched.
    pub fn register(&mut self, id: SequenceId, continuation: Continuation) -> Result<()> {
        if self.calls.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.calls.insert(id, continuation);
        Ok(())
    }

    /// Remove and return the continuation for `id`. A second take for the
    /// same id returns `None`.
    pub fn take(&mut self, id: SequenceId) -> Option<Continuation> {
        self.calls.remove(&id)
    }

    pub fn contains(&self, id: SequenceId) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drop every pending continuation without running it. Returns how many
    /// were discarded.
    pub fn abandon_all(&mut self) -> usize {
        let n = self.calls.len();
        self.calls.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn noop() -> Continuation {
        Continuation::Value(Box::new(|_| {}))
    }

    #[test]
    fn take_is_at_most_once() {
        let mut table = PendingCalls::new();
        table.register(0, noop()).unwrap();
        assert!(table.take(0).is_some());
        assert!(table.take(0).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_id_is_rejected_and_original_kept() {
        let mut table = PendingCalls::new();
        let (tx, _rx) = oneshot::channel();
        table.register(3, Continuation::Reply(tx)).unwrap();

        let err = table.register(3, noop()).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(3)));
        assert_eq!(table.take(3).map(|c| c.kind()), Some("reply"));
    }

    #[test]
    fn unknown_id_is_none() {
        let mut table = PendingCalls::new();
        assert!(table.take(42).is_none());
    }

    #[test]
    fn abandon_all_drops_reply_senders() {
        let mut table = PendingCalls::new();
        let (tx, mut rx) = oneshot::channel();
        table.register(1, Continuation::Reply(tx)).unwrap();
        table.register(2, noop()).unwrap();

        assert_eq!(table.abandon_all(), 2);
        assert!(table.is_empty());
        assert!(rx.try_recv().is_err());
    }

    proptest! {
        #[test]
        fn each_registered_id_is_taken_exactly_once(
            ids in proptest::collection::hash_set(any::<u32>(), 1..64),
            extra_takes in proptest::collection::vec(any::<u32>(), 0..64),
        ) {
            let mut table = PendingCalls::new();
            for &id in &ids {
                table.register(id, noop()).unwrap();
            }

            let mut taken = HashSet::new();
            let order: Vec<u32> = ids.iter().copied().chain(extra_takes).collect();
            for id in order.iter().chain(order.iter()) {
                if table.take(*id).is_some() {
                    prop_assert!(taken.insert(*id), "id {} taken twice", id);
                }
            }
            prop_assert_eq!(taken, ids);
            prop_assert!(table.is_empty());
        }
    }
}
