//! Classification and fan-out of unsolicited server broadcasts.

use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::types::{Broadcast, ChatMessage, EntityChanged, EntityPayload, EntityType, TeamChanged};

/// De-duplication policy for entity updates.
///
/// Storage monitors emit every logical update twice, once with the active
/// flag `true` (carrying the contents) and once with it `false`. Only the
/// `true` emission reaches subscribers. Every other kind, and any entity
/// whose type is not resolved yet, passes unfiltered.
pub fn should_notify(entity_type: Option<EntityType>, payload: &EntityPayload) -> bool {
    match entity_type {
        Some(EntityType::StorageMonitor) => payload.value == Some(true),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    EntityChanged(EntityChanged),
    TeamMessage(ChatMessage),
    TeamChanged(TeamChanged),
}

/// Pick the single event a broadcast carries. `None` for an empty broadcast.
pub fn classify(broadcast: Broadcast) -> Option<BroadcastEvent> {
    let Broadcast {
        entity_changed,
        team_message,
        team_changed,
    } = broadcast;
    entity_changed
        .map(BroadcastEvent::EntityChanged)
        .or_else(|| team_message.map(|m| BroadcastEvent::TeamMessage(m.message)))
        .or_else(|| team_changed.map(BroadcastEvent::TeamChanged))
}

/// Delivery channel for team broadcasts.
///
/// A bounded sink applies back-pressure: a full channel stalls the reader
/// until the consumer drains it.
pub enum Sink<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Sink<T> {
    /// Hand `item` over, waiting for capacity if bounded. Returns `false` if
    /// the receiver is gone.
    pub async fn deliver(&self, item: T) -> bool {
        match self {
            Self::Bounded(tx) => tx.send(item).await.is_ok(),
            Self::Unbounded(tx) => tx.send(item).is_ok(),
        }
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<T> From<mpsc::Sender<T>> for Sink<T> {
    fn from(tx: mpsc::Sender<T>) -> Self {
        Self::Bounded(tx)
    }
}

impl<T> From<mpsc::UnboundedSender<T>> for Sink<T> {
    fn from(tx: mpsc::UnboundedSender<T>) -> Self {
        Self::Unbounded(tx)
    }
}

#[derive(Default)]
pub struct BroadcastRouter {
    chat: Option<Sink<ChatMessage>>,
    team: Option<Sink<TeamChanged>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_chat_sink(&mut self, sink: Sink<ChatMessage>) {
        self.chat = Some(sink);
    }

    pub fn set_team_sink(&mut self, sink: Sink<TeamChanged>) {
        self.team = Some(sink);
    }

    /// Route one broadcast. Entity changes for ids the registry does not
    /// know fail with `UnknownEntity`; everything else succeeds.
    pub async fn route(&self, registry: &Mutex<EntityRegistry>, broadcast: Broadcast) -> Result<()> {
        let Some(event) = classify(broadcast) else {
            tracing::trace!("ignoring broadcast with no known payload");
            return Ok(());
        };

        match event {
            BroadcastEvent::EntityChanged(change) => self.entity_changed(registry, change).await,
            BroadcastEvent::TeamMessage(message) => {
                match &self.chat {
                    Some(sink) => {
                        if !sink.deliver(message).await {
                            tracing::warn!("chat sink receiver dropped, message discarded");
                        }
                    }
                    None => tracing::trace!("no chat sink configured"),
                }
                Ok(())
            }
            BroadcastEvent::TeamChanged(changed) => {
                match &self.team {
                    Some(sink) => {
                        if !sink.deliver(changed).await {
                            tracing::warn!("team sink receiver dropped, update discarded");
                        }
                    }
                    None => tracing::trace!("no team sink configured"),
                }
                Ok(())
            }
        }
    }

    async fn entity_changed(&self, registry: &Mutex<EntityRegistry>, change: EntityChanged) -> Result<()> {
        let EntityChanged { entity_id, payload } = change;

        // Subscribers run outside the lock so they may call back into the session.
        let dispatch = registry.lock().await.prepare_update(entity_id, &payload)?;
        if dispatch.is_suppressed() {
            tracing::debug!(entity_id, "suppressed duplicate storage monitor update");
        } else {
            let notified = dispatch.notify(&payload);
            tracing::debug!(entity_id, notified, "entity update dispatched");
        }

        registry.lock().await.commit_update(entity_id, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TeamInfo, TeamMessage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload(value: Option<bool>) -> EntityPayload {
        EntityPayload {
            value,
            ..EntityPayload::default()
        }
    }

    fn chat(text: &str) -> ChatMessage {
        ChatMessage {
            steam_id: 1,
            name: "p".into(),
            message: text.into(),
            color: "#fff".into(),
            time: 0,
        }
    }

    #[test]
    fn policy_only_filters_storage_monitor() {
        let t = payload(Some(true));
        let f = payload(Some(false));
        let none = payload(None);

        assert!(should_notify(Some(EntityType::StorageMonitor), &t));
        assert!(!should_notify(Some(EntityType::StorageMonitor), &f));
        assert!(!should_notify(Some(EntityType::StorageMonitor), &none));

        for kind in [None, Some(EntityType::Switch), Some(EntityType::Alarm)] {
            assert!(should_notify(kind, &t));
            assert!(should_notify(kind, &f));
            assert!(should_notify(kind, &none));
        }
    }

    #[test]
    fn classify_picks_one_event() {
        assert_eq!(classify(Broadcast::default()), None);

        let both = Broadcast {
            entity_changed: Some(EntityChanged { entity_id: 1, payload: payload(Some(true)) }),
            team_message: Some(TeamMessage { message: chat("hi") }),
            team_changed: None,
        };
        assert!(matches!(classify(both), Some(BroadcastEvent::EntityChanged(_))));

        let msg = Broadcast {
            team_message: Some(TeamMessage { message: chat("hi") }),
            ..Broadcast::default()
        };
        assert_eq!(classify(msg), Some(BroadcastEvent::TeamMessage(chat("hi"))));
    }

    #[tokio::test]
    async fn unknown_entity_is_reported() {
        let registry = Mutex::new(EntityRegistry::new());
        let router = BroadcastRouter::new();
        let b = Broadcast {
            entity_changed: Some(EntityChanged { entity_id: 99, payload: payload(Some(true)) }),
            ..Broadcast::default()
        };
        let err = router.route(&registry, b).await.unwrap_err();
        assert!(matches!(err, crate::Error::UnknownEntity(99)));
    }

    #[tokio::test]
    async fn storage_monitor_pair_notifies_once() {
        let registry = Mutex::new(EntityRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let mut reg = registry.lock().await;
            reg.get_or_create(4, "loot")
                .set_type(EntityType::StorageMonitor)
                .unwrap();
            let counter = hits.clone();
            reg.subscribe(4, Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        let router = BroadcastRouter::new();
        for value in [false, true] {
            let b = Broadcast {
                entity_changed: Some(EntityChanged { entity_id: 4, payload: payload(Some(value)) }),
                ..Broadcast::default()
            };
            router.route(&registry, b).await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.lock().await.snapshot(4).unwrap().is_on(), Some(true));
    }

    #[tokio::test]
    async fn team_events_reach_sinks() {
        let registry = Mutex::new(EntityRegistry::new());
        let (chat_tx, mut chat_rx) = mpsc::channel::<ChatMessage>(4);
        let (team_tx, mut team_rx) = mpsc::unbounded_channel::<TeamChanged>();
        let mut router = BroadcastRouter::new();
        router.set_chat_sink(chat_tx.into());
        router.set_team_sink(team_tx.into());

        let msg = Broadcast {
            team_message: Some(TeamMessage { message: chat("door open") }),
            ..Broadcast::default()
        };
        router.route(&registry, msg).await.unwrap();
        assert_eq!(chat_rx.recv().await.unwrap().message, "door open");

        let changed = TeamChanged { player_id: 9, team_info: TeamInfo::default() };
        let b = Broadcast {
            team_changed: Some(changed.clone()),
            ..Broadcast::default()
        };
        router.route(&registry, b).await.unwrap();
        assert_eq!(team_rx.recv().await.unwrap(), changed);
    }

    #[tokio::test]
    async fn team_events_without_sink_are_dropped_quietly() {
        let registry = Mutex::new(EntityRegistry::new());
        let router = BroadcastRouter::new();
        let msg = Broadcast {
            team_message: Some(TeamMessage { message: chat("x") }),
            ..Broadcast::default()
        };
        assert!(router.route(&registry, msg).await.is_ok());
    }
}
