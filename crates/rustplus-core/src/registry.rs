//! Entity registry: the single source of truth for "is this id known".
//!
//! # Update ordering
//!
//! An accepted update notifies subscribers first and only then overwrites
//! the cached value, so a subscriber sees the previous state in its
//! snapshot and the new state on any later read. Multi-field payloads
//! (storage contents) rely on this.
//!
//! The session splits an update into [`EntityRegistry::prepare_update`] and
//! [`EntityRegistry::commit_update`] so callbacks run without the registry
//! lock held; [`EntityRegistry::apply_update`] does all three steps in place.

use std::collections::HashMap;

use crate::entity::{Entity, EntitySnapshot, SubscriptionHandle, UpdateCallback};
use crate::error::{Error, Result};
use crate::router::should_notify;
use crate::types::{EntityId, EntityPayload};

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Entity>,
}

/// Subscribers selected for one update, plus the pre-update snapshot they
/// will be shown.
pub struct UpdateDispatch {
    pub snapshot: EntitySnapshot,
    suppressed: bool,
    subscribers: Vec<UpdateCallback>,
}

impl UpdateDispatch {
    /// `true` when the de-duplication policy filtered this update out.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Invoke every selected subscriber in handle order. Returns the number
    /// invoked.
    pub fn notify(&self, payload: &EntityPayload) -> usize {
        for callback in &self.subscribers {
            callback(&self.snapshot, payload);
        }
        self.subscribers.len()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entity for `id`, creating it in `Referenced` state if absent.
    pub fn get_or_create(&mut self, id: EntityId, name: &str) -> &mut Entity {
        self.entities
            .entry(id)
            .or_insert_with(|| Entity::new(id, name))
    }

    pub fn remove(&mut self, id: EntityId) -> Result<Entity> {
        self.entities.remove(&id).ok_or(Error::NotFound(id))
    }

    pub fn lookup(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn lookup_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn snapshot(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.lookup(id).map(Entity::snapshot)
    }

    /// Known ids, ascending.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn subscribe(&mut self, id: EntityId, callback: UpdateCallback) -> Result<SubscriptionHandle> {
        let entity = self.lookup_mut(id).ok_or(Error::NotFound(id))?;
        Ok(entity.subscribe(callback))
    }

    pub fn unsubscribe(&mut self, id: EntityId, handle: SubscriptionHandle) -> Result<()> {
        self.lookup_mut(id).ok_or(Error::NotFound(id))?.unsubscribe(handle)
    }

    /// Select the subscribers to notify for `payload`, honoring the
    /// de-duplication policy. Does not modify the entity.
    pub fn prepare_update(&self, id: EntityId, payload: &EntityPayload) -> Result<UpdateDispatch> {
        let entity = self.lookup(id).ok_or(Error::UnknownEntity(id))?;
        let suppressed = !should_notify(entity.resolved_type(), payload);
        let subscribers = if suppressed {
            Vec::new()
        } else {
            entity.subscribers().cloned().collect()
        };
        Ok(UpdateDispatch {
            snapshot: entity.snapshot(),
            suppressed,
            subscribers,
        })
    }

    /// Overwrite the cached value. Unconditional: suppressed updates are
    /// still cached.
    pub fn commit_update(&mut self, id: EntityId, payload: EntityPayload) -> Result<()> {
        let entity = self.lookup_mut(id).ok_or(Error::UnknownEntity(id))?;
        entity.set_value(payload);
        Ok(())
    }

    /// Prepare, notify and commit in one call. Returns the number of
    /// subscribers notified.
    pub fn apply_update(&mut self, id: EntityId, payload: EntityPayload) -> Result<usize> {
        let dispatch = self.prepare_update(id, &payload)?;
        let notified = dispatch.notify(&payload);
        self.commit_update(id, payload)?;
        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ResolutionState;
    use crate::types::EntityType;
    use std::sync::{Arc, Mutex};

    fn on(value: bool) -> EntityPayload {
        EntityPayload {
            value: Some(value),
            ..EntityPayload::default()
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut reg = EntityRegistry::new();
        reg.get_or_create(1, "door").begin_resolving();
        let again = reg.get_or_create(1, "renamed");
        assert_eq!(again.name(), "door");
        assert_eq!(again.state(), ResolutionState::Resolving);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_and_lookup() {
        let mut reg = EntityRegistry::new();
        reg.get_or_create(7, "x");
        assert!(reg.contains(7));
        assert_eq!(reg.remove(7).unwrap().id(), 7);
        assert!(matches!(reg.remove(7), Err(Error::NotFound(7))));
        assert!(reg.lookup(7).is_none());
    }

    #[test]
    fn update_unknown_entity() {
        let mut reg = EntityRegistry::new();
        let err = reg.apply_update(99, on(true)).unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(99)));
    }

    #[test]
    fn subscribe_requires_known_entity() {
        let mut reg = EntityRegistry::new();
        let err = reg.subscribe(3, Arc::new(|_, _| {})).unwrap_err();
        assert!(matches!(err, Error::NotFound(3)));
        let err = reg
            .unsubscribe(3, SubscriptionHandle::from_raw(1))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(3)));
    }

    #[test]
    fn subscribers_see_previous_value_in_handle_order() {
        let mut reg = EntityRegistry::new();
        reg.get_or_create(5, "lamp").set_value(on(false));

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            reg.subscribe(
                5,
                Arc::new(move |snap, payload| {
                    seen.lock()
                        .unwrap()
                        .push((tag, snap.is_on(), payload.value));
                }),
            )
            .unwrap();
        }

        assert_eq!(reg.apply_update(5, on(true)).unwrap(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", Some(false), Some(true)),
                ("second", Some(false), Some(true)),
            ]
        );
        assert_eq!(reg.snapshot(5).unwrap().is_on(), Some(true));
    }

    #[test]
    fn storage_monitor_false_emission_is_suppressed_but_cached() {
        let mut reg = EntityRegistry::new();
        reg.get_or_create(8, "tc").set_type(EntityType::StorageMonitor).unwrap();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        reg.subscribe(8, Arc::new(move |_, _| *counter.lock().unwrap() += 1))
            .unwrap();

        let contents = EntityPayload {
            value: Some(true),
            capacity: Some(24),
            ..EntityPayload::default()
        };
        assert_eq!(reg.apply_update(8, on(false)).unwrap(), 0);
        assert_eq!(reg.snapshot(8).unwrap().is_on(), Some(false));
        assert_eq!(reg.apply_update(8, contents).unwrap(), 1);
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(reg.snapshot(8).unwrap().capacity(), Some(24));
    }

    #[test]
    fn prepare_does_not_mutate() {
        let mut reg = EntityRegistry::new();
        reg.get_or_create(2, "sw");
        let dispatch = reg.prepare_update(2, &on(true)).unwrap();
        assert_eq!(dispatch.snapshot.value, None);
        // No subscribers: nothing to call, but not a policy suppression.
        assert!(!dispatch.is_suppressed());
        assert_eq!(dispatch.notify(&on(true)), 0);
        assert_eq!(reg.snapshot(2).unwrap().value, None);
    }

    #[test]
    fn ids_sorted() {
        let mut reg = EntityRegistry::new();
        for id in [30, 10, 20] {
            reg.get_or_create(id, "e");
        }
        assert_eq!(reg.ids(), vec![10, 20, 30]);
    }
}
