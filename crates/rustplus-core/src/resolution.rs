//! Type-probe handshake: `Referenced -> Resolving -> Resolved`.
//!
//! The session sends a `GetEntityInfo` probe carrying a [`Registration`] as
//! its continuation. When the answer arrives, [`resolve`] records the type
//! and state in the registry and the registration's handlers are fulfilled
//! with the resulting snapshot.

use std::fmt;

use tokio::sync::{oneshot, watch};

use crate::entity::EntitySnapshot;
use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::types::{EntityId, Response};

/// Follow-up invoked once with the resolved entity.
pub type ResolveHook = Box<dyn FnOnce(&EntitySnapshot) + Send>;

/// A caller's request to resolve one entity, plus whatever should happen
/// once it resolves. Every handler supplied is honored.
pub struct Registration {
    id: EntityId,
    name: String,
    slot: Option<watch::Sender<Option<EntitySnapshot>>>,
    hook: Option<ResolveHook>,
    channel: Option<oneshot::Sender<EntitySnapshot>>,
}

impl Registration {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            slot: None,
            hook: None,
            channel: None,
        }
    }

    /// Copy the resolved entity into an output slot. The receiver holds
    /// `None` until resolution.
    pub fn with_slot(mut self) -> (Self, watch::Receiver<Option<EntitySnapshot>>) {
        let (tx, rx) = watch::channel(None);
        self.slot = Some(tx);
        (self, rx)
    }

    pub fn with_hook(mut self, hook: impl FnOnce(&EntitySnapshot) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Send the resolved entity over a one-shot channel. The receiver errors
    /// if the registration is dropped unresolved (for example on disconnect).
    pub fn with_channel(mut self) -> (Self, oneshot::Receiver<EntitySnapshot>) {
        let (tx, rx) = oneshot::channel();
        self.channel = Some(tx);
        (self, rx)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every supplied handler with `snapshot`: slot, then hook, then channel.
    pub fn fulfil(self, snapshot: &EntitySnapshot) {
        if let Some(slot) = self.slot {
            slot.send_replace(Some(snapshot.clone()));
        }
        if let Some(hook) = self.hook {
            hook(snapshot);
        }
        if let Some(channel) = self.channel {
            // Receiver may have given up; that's fine.
            let _ = channel.send(snapshot.clone());
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("slot", &self.slot.is_some())
            .field("hook", &self.hook.is_some())
            .field("channel", &self.channel.is_some())
            .finish()
    }
}

/// Consume a probe answer for `registration`.
///
/// Returns `Ok(None)` when the response carries no type; the entity stays
/// `Resolving` and nothing is retried. Otherwise the entity is inserted if
/// it was removed meanwhile, its type is set (a repeat answer with the same
/// type is accepted) and the probed state is cached.
pub fn resolve(
    registry: &mut EntityRegistry,
    registration: &Registration,
    response: &Response,
) -> Result<Option<EntitySnapshot>> {
    let Some(info) = response.entity_info() else {
        return Ok(None);
    };
    let Some(kind) = info.entity_type else {
        return Ok(None);
    };

    let entity = registry.get_or_create(registration.id, &registration.name);
    if entity.resolved_type() != Some(kind) {
        entity.set_type(kind)?;
    }
    entity.set_value(info.payload.clone());
    Ok(Some(entity.snapshot()))
}
