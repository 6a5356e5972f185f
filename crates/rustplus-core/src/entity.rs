//! A single remote entity as tracked by the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{EntityId, EntityPayload, EntityType, StorageItem};

/// Per-entity subscription id. Counts up from 1 and never decrements, so a
/// handle is never reused within its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u32);

impl SubscriptionHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Subscriber callback: the entity as it was before this update, and the
/// incoming payload.
pub type UpdateCallback = Arc<dyn Fn(&EntitySnapshot, &EntityPayload) + Send + Sync>;

/// Where an entity is in the type-probe handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Id and name known, type unknown, no probe sent.
    Referenced,
    /// Probe sent, answer pending.
    Resolving,
    Resolved(EntityType),
}

/// Owned copy of an entity's observable state, handed to callbacks and
/// callers.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    pub state: ResolutionState,
    pub value: Option<EntityPayload>,
}

impl EntitySnapshot {
    pub fn entity_type(&self) -> Option<EntityType> {
        match self.state {
            ResolutionState::Resolved(t) => Some(t),
            _ => None,
        }
    }

    /// Last observed on/active flag.
    pub fn is_on(&self) -> Option<bool> {
        self.value.as_ref().and_then(|v| v.value)
    }

    pub fn items(&self) -> &[StorageItem] {
        self.value.as_ref().map(|v| v.items.as_slice()).unwrap_or(&[])
    }

    pub fn capacity(&self) -> Option<i32> {
        self.value.as_ref().and_then(|v| v.capacity)
    }
}

pub struct Entity {
    id: EntityId,
    name: String,
    state: ResolutionState,
    value: Option<EntityPayload>,
    subscribers: BTreeMap<SubscriptionHandle, UpdateCallback>,
    last_handle: u32,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: ResolutionState::Referenced,
            value: None,
            subscribers: BTreeMap::new(),
            last_handle: 0,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn resolved_type(&self) -> Option<EntityType> {
        match self.state {
            ResolutionState::Resolved(t) => Some(t),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&EntityPayload> {
        self.value.as_ref()
    }

    /// `Referenced -> Resolving`. Returns `false` (and changes nothing) from
    /// any other state.
    pub fn begin_resolving(&mut self) -> bool {
        if self.state == ResolutionState::Referenced {
            self.state = ResolutionState::Resolving;
            true
        } else {
            false
        }
    }

    /// Undo [`Self::begin_resolving`] after the probe could not be sent.
    pub fn abort_resolving(&mut self) {
        if self.state == ResolutionState::Resolving {
            self.state = ResolutionState::Referenced;
        }
    }

    /// Set the resolved type. Fails if a type is already set.
    pub fn set_type(&mut self, entity_type: EntityType) -> Result<()> {
        if let ResolutionState::Resolved(existing) = self.state {
            return Err(Error::TypeAlreadySet {
                id: self.id,
                existing,
                attempted: entity_type,
            });
        }
        self.state = ResolutionState::Resolved(entity_type);
        Ok(())
    }

    pub fn set_value(&mut self, payload: EntityPayload) {
        self.value = Some(payload);
    }

    pub fn subscribe(&mut self, callback: UpdateCallback) -> SubscriptionHandle {
        self.last_handle += 1;
        let handle = SubscriptionHandle(self.last_handle);
        self.subscribers.insert(handle, callback);
        handle
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()> {
        self.subscribers
            .remove(&handle)
            .map(|_| ())
            .ok_or(Error::NotRegistered {
                entity_id: self.id,
                handle,
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Subscribers in handle order.
    pub fn subscribers(&self) -> impl Iterator<Item = &UpdateCallback> {
        self.subscribers.values()
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            value: self.value.clone(),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
