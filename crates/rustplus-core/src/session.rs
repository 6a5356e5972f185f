//! The session: one connection, its correlation state and its entity cache.
//!
//! A `Session` is shared as `Arc<Session<_>>` between one reader task
//! (driving [`Session::run`], or `read_once` + `dispatch`) and any number of
//! writers calling `send` and the request helpers.
//!
//! # Locking
//!
//! - `correlation` (sequence allocator + pending table) is held across
//!   allocate, encode, write and register, so a response can never be
//!   matched before its continuation is in the table.
//! - `registry` is held only for short synchronous sections; callbacks and
//!   hooks run after it is released.
//! - `deferred` is held while deciding "queue or probe", while `connect`
//!   flushes and while `disconnect` detaches, so a registration never slips
//!   between the two.
//!
//! Acquisition order is `deferred -> registry` and
//! `deferred -> correlation -> transport`.

mod requests;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::codec::{Codec, JsonCodec};
use crate::config::ConnectionConfig;
use crate::entity::{EntitySnapshot, ResolutionState, SubscriptionHandle};
use crate::error::{Error, Result};
use crate::pending::{Continuation, DeviceCallback, PendingCalls};
use crate::registry::EntityRegistry;
use crate::resolution::{self, Registration};
use crate::router::{BroadcastRouter, Sink};
use crate::seq::SequenceAllocator;
use crate::transport::{Dialer, Transport};
use crate::types::{
    ChatMessage, EntityId, EntityPayload, EntityType, Message, Request, RequestKind, Response,
    SequenceId, TeamChanged,
};

#[derive(Debug, Default)]
struct Correlation {
    seq: SequenceAllocator,
    pending: PendingCalls,
}

pub struct Session<D: Dialer, C: Codec = JsonCodec> {
    config: ConnectionConfig,
    dialer: D,
    codec: C,
    transport: Mutex<Option<Arc<D::Transport>>>,
    correlation: Mutex<Correlation>,
    registry: Mutex<EntityRegistry>,
    deferred: Mutex<Vec<Registration>>,
    router: BroadcastRouter,
}

impl<D: Dialer> Session<D> {
    pub fn new(config: ConnectionConfig, dialer: D) -> Self {
        Self::with_codec(config, dialer, JsonCodec)
    }
}

impl<D: Dialer, C: Codec> Session<D, C> {
    pub fn with_codec(config: ConnectionConfig, dialer: D, codec: C) -> Self {
        Self {
            config,
            dialer,
            codec,
            transport: Mutex::new(None),
            correlation: Mutex::new(Correlation::default()),
            registry: Mutex::new(EntityRegistry::new()),
            deferred: Mutex::new(Vec::new()),
            router: BroadcastRouter::new(),
        }
    }

    /// Deliver team chat broadcasts to `sink`. A bounded sink stalls the
    /// reader while full.
    pub fn with_chat_sink(mut self, sink: impl Into<Sink<ChatMessage>>) -> Self {
        self.router.set_chat_sink(sink.into());
        self
    }

    pub fn with_team_sink(mut self, sink: impl Into<Sink<TeamChanged>>) -> Self {
        self.router.set_team_sink(sink.into());
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    // ─── Lifecycle ────────────────────────────────────────────────

    /// Dial the configured server, then probe every registration queued
    /// while disconnected, in queue order.
    ///
    /// If a probe cannot be sent, that registration is dropped (its channel
    /// closes), the ones after it stay queued and the error is returned.
    /// Without credentials nothing can be probed: the queue is dropped and
    /// [`Error::NoCredentials`] returned. The transport stays attached in
    /// both cases.
    pub async fn connect(&self) -> Result<()> {
        let mut deferred = self.deferred.lock().await;
        {
            let mut slot = self.transport.lock().await;
            if slot.is_some() {
                return Err(Error::AlreadyConnected);
            }
            let url = self.config.url();
            tracing::info!(url = %url, "connecting");
            let transport = self.dialer.dial(&url).await.map_err(Error::Connect)?;
            *slot = Some(Arc::new(transport));
        }
        tracing::info!("connected");

        if deferred.is_empty() {
            return Ok(());
        }
        if self.config.credential().is_none() {
            let dropped = std::mem::take(&mut *deferred).len();
            tracing::warn!(dropped, "no credentials configured, deferred registrations dropped");
            return Err(Error::NoCredentials);
        }

        let mut queue = std::mem::take(&mut *deferred).into_iter();
        let mut flushed = 0usize;
        while let Some(registration) = queue.next() {
            if let Err(err) = self.probe(registration).await {
                deferred.extend(queue.by_ref());
                tracing::warn!(flushed, requeued = deferred.len(), error = %err, "deferred flush failed");
                return Err(err);
            }
            flushed += 1;
        }
        tracing::debug!(flushed, "deferred registrations flushed");
        Ok(())
    }

    /// Detach and close the transport. Pending continuations are dropped
    /// without being invoked; awaiting callers see [`Error::Cancelled`].
    pub async fn disconnect(&self) -> Result<()> {
        // Serializes with `register`, which decides queue-or-probe under it.
        let _deferred = self.deferred.lock().await;
        let transport = self.transport.lock().await.take().ok_or(Error::NotConnected)?;
        let abandoned = self.correlation.lock().await.pending.abandon_all();
        tracing::info!(abandoned, "disconnected");
        transport.close().await.map_err(Error::Transport)
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    async fn current_transport(&self) -> Result<Arc<D::Transport>> {
        self.transport
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(Error::NotConnected)
    }

    /// A request of `kind` stamped with the session credential. `seq` is
    /// filled in by [`Self::send`].
    pub async fn build_request(&self, kind: RequestKind, entity_id: Option<EntityId>) -> Result<Request> {
        if !self.is_connected().await {
            return Err(Error::NotConnected);
        }
        let credential = self.config.credential().ok_or(Error::NoCredentials)?;
        Ok(Request {
            seq: 0,
            player_id: credential.player_id,
            player_token: credential.player_token,
            entity_id,
            kind,
        })
    }

    /// Stamp `request` with a fresh sequence id and the session credential,
    /// write it, and on a successful write register `continuation` under
    /// that id.
    pub async fn send(&self, mut request: Request, continuation: Option<Continuation>) -> Result<SequenceId> {
        let mut correlation = self.correlation.lock().await;
        let transport = self.current_transport().await?;
        let credential = self.config.credential().ok_or(Error::NoCredentials)?;

        let seq = correlation.seq.next();
        request.seq = seq;
        request.player_id = credential.player_id;
        request.player_token = credential.player_token;

        let frame = self.codec.encode(&request).map_err(Error::Encode)?;
        transport.write(frame).await.map_err(Error::Transport)?;

        if let Some(continuation) = continuation {
            correlation.pending.register(seq, continuation)?;
        }
        tracing::debug!(seq, kind = request.kind.as_str(), entity_id = ?request.entity_id, "request sent");
        Ok(seq)
    }

    /// Receive and decode one frame. `None` for an empty frame.
    pub async fn read_once(&self) -> Result<Option<Message>> {
        let transport = self.current_transport().await?;
        let frame = transport.read().await.map_err(Error::Transport)?;
        if frame.is_empty() {
            return Ok(None);
        }
        self.codec.decode(&frame).map(Some).map_err(Error::Decode)
    }

    /// Route a decoded message: responses to their continuation, broadcasts
    /// to the router.
    pub async fn dispatch(&self, message: Message) -> Result<()> {
        match message {
            Message::Response(response) => self.complete(response).await,
            Message::Broadcast(broadcast) => self.router.route(&self.registry, broadcast).await,
        }
    }

    /// Read loop. Undecodable frames and recoverable dispatch errors are
    /// logged and skipped. Returns `Ok(())` once the session is disconnected
    /// locally, `Err` on a fatal error.
    pub async fn run(&self) -> Result<()> {
        loop {
            let message = match self.read_once().await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(Error::Decode(err)) => {
                    tracing::warn!(error = %err, "dropping undecodable frame");
                    continue;
                }
                Err(Error::NotConnected) => return Ok(()),
                Err(err) => {
                    if !self.is_connected().await {
                        tracing::debug!(error = %err, "read loop stopped after disconnect");
                        return Ok(());
                    }
                    tracing::error!(error = %err, "read loop failed");
                    return Err(err);
                }
            };

            if let Err(err) = self.dispatch(message).await {
                if err.is_fatal() {
                    tracing::error!(error = %err, "dispatch failed");
                    return Err(err);
                }
                tracing::warn!(error = %err, "dispatch failed");
            }
        }
    }

    /// Number of requests still awaiting a response.
    pub async fn pending_calls(&self) -> usize {
        self.correlation.lock().await.pending.len()
    }

    async fn complete(&self, response: Response) -> Result<()> {
        let seq = response.seq;
        let Some(continuation) = self.correlation.lock().await.pending.take(seq) else {
            tracing::debug!(seq, "no pending call for response, ignoring");
            return Ok(());
        };
        tracing::trace!(seq, kind = continuation.kind(), "running continuation");

        match continuation {
            Continuation::Value(callback) => callback(response),
            Continuation::Reply(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!(seq, "response waiter went away");
                }
            }
            Continuation::Device { entity_id, callback } => {
                self.complete_device(entity_id, callback, response).await?;
            }
            Continuation::Register(registration) => {
                let resolved = {
                    let mut registry = self.registry.lock().await;
                    resolution::resolve(&mut registry, &registration, &response)?
                };
                match resolved {
                    Some(snapshot) => {
                        tracing::info!(
                            entity_id = snapshot.id,
                            name = %snapshot.name,
                            entity_type = ?snapshot.entity_type(),
                            "entity resolved"
                        );
                        registration.fulfil(&snapshot);
                    }
                    None => tracing::debug!(
                        entity_id = registration.id(),
                        "probe answered without a type, entity stays resolving"
                    ),
                }
            }
        }
        Ok(())
    }

    async fn complete_device(
        &self,
        entity_id: EntityId,
        callback: Option<DeviceCallback>,
        response: Response,
    ) -> Result<()> {
        let snapshot = self.registry.lock().await.snapshot(entity_id);
        let Some(snapshot) = snapshot else {
            // Removed while the request was in flight: the caller still hears back.
            if let Some(callback) = callback {
                let detached = EntitySnapshot {
                    id: entity_id,
                    name: String::new(),
                    state: ResolutionState::Referenced,
                    value: None,
                };
                callback(&response, &detached);
            }
            return Err(Error::UnknownEntity(entity_id));
        };
        if let Some(callback) = callback {
            callback(&response, &snapshot);
        }

        let Some(info) = response.entity_info() else {
            return Ok(());
        };
        let mut registry = self.registry.lock().await;
        let entity = registry
            .lookup_mut(entity_id)
            .ok_or(Error::UnknownEntity(entity_id))?;
        if let (Some(kind), None) = (info.entity_type, entity.resolved_type()) {
            entity.set_type(kind)?;
        }
        entity.set_value(info.payload.clone());
        Ok(())
    }

    // ─── Entities ─────────────────────────────────────────────────

    /// Register an entity for resolution.
    ///
    /// An entity that is already resolved is not probed again; its handlers
    /// are fulfilled immediately with the cached state. While disconnected
    /// the registration is queued until [`Self::connect`].
    pub async fn register(&self, registration: Registration) -> Result<()> {
        let mut deferred = self.deferred.lock().await;
        let resolved = {
            let mut registry = self.registry.lock().await;
            let entity = registry.get_or_create(registration.id(), registration.name());
            entity.resolved_type().map(|_| entity.snapshot())
        };

        if let Some(snapshot) = resolved {
            drop(deferred);
            tracing::debug!(entity_id = snapshot.id, "entity already resolved, no probe sent");
            registration.fulfil(&snapshot);
            return Ok(());
        }

        if !self.is_connected().await {
            tracing::debug!(entity_id = registration.id(), "not connected, registration queued");
            deferred.push(registration);
            return Ok(());
        }

        self.probe(registration).await?;
        Ok(())
    }

    /// Send a type probe for `registration`, moving its entity to `Resolving`.
    async fn probe(&self, registration: Registration) -> Result<SequenceId> {
        let id = registration.id();
        let started = self
            .registry
            .lock()
            .await
            .get_or_create(id, registration.name())
            .begin_resolving();

        let sent = match self.build_request(RequestKind::GetEntityInfo, Some(id)).await {
            Ok(request) => self.send(request, Some(Continuation::Register(registration))).await,
            Err(err) => Err(err),
        };
        match sent {
            Ok(seq) => {
                tracing::debug!(entity_id = id, seq, "probe sent");
                Ok(seq)
            }
            Err(err) => {
                if started {
                    if let Some(entity) = self.registry.lock().await.lookup_mut(id) {
                        entity.abort_resolving();
                    }
                }
                Err(err)
            }
        }
    }

    /// Add an entity whose type is already known, without probing.
    pub async fn add_entity(&self, id: EntityId, name: &str, entity_type: EntityType) -> Result<EntitySnapshot> {
        let mut registry = self.registry.lock().await;
        let entity = registry.get_or_create(id, name);
        if entity.resolved_type() != Some(entity_type) {
            entity.set_type(entity_type)?;
        }
        Ok(entity.snapshot())
    }

    /// Forget an entity. In-flight probes for it are not cancelled; their
    /// answer re-inserts it.
    pub async fn remove_entity(&self, id: EntityId) -> Result<()> {
        self.registry.lock().await.remove(id)?;
        tracing::debug!(entity_id = id, "entity removed");
        Ok(())
    }

    pub async fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.registry.lock().await.snapshot(id)
    }

    pub async fn entity_ids(&self) -> Vec<EntityId> {
        self.registry.lock().await.ids()
    }

    /// Registrations waiting for `connect`.
    pub async fn deferred_len(&self) -> usize {
        self.deferred.lock().await.len()
    }

    /// Call `callback` on every accepted update for `id`, with the entity as
    /// it was before the update and the incoming payload.
    pub async fn subscribe(
        &self,
        id: EntityId,
        callback: impl Fn(&EntitySnapshot, &EntityPayload) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        let handle = self.registry.lock().await.subscribe(id, Arc::new(callback))?;
        tracing::debug!(entity_id = id, handle = %handle, "subscribed");
        Ok(handle)
    }

    pub async fn unsubscribe(&self, id: EntityId, handle: SubscriptionHandle) -> Result<()> {
        self.registry.lock().await.unsubscribe(id, handle)
    }
}
