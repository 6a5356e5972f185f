//! Request helpers layered on [`Session::send`].
//!
//! The awaiting helpers (`request` and the typed wrappers) only complete
//! while a reader task is driving [`Session::run`].

use tokio::sync::oneshot;

use super::Session;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::pending::{Continuation, DeviceCallback};
use crate::transport::Dialer;
use crate::types::{
    CameraFrame, ChatMessage, EntityId, EntityType, MapInfo, MapMarker, RequestKind, Response,
    ResponsePayload, SequenceId, ServerInfo, TeamInfo, TimeInfo,
};

fn unexpected(expected: &'static str, payload: &Option<ResponsePayload>) -> Error {
    Error::UnexpectedResponse {
        expected,
        actual: payload.as_ref().map_or("empty", ResponsePayload::as_str),
    }
}

impl<D: Dialer, C: Codec> Session<D, C> {
    // ─── Entity requests ──────────────────────────────────────────

    /// Ask for an entity's current state. The entity is added to the
    /// registry if unknown. `callback` sees the response and the entity as
    /// it was before the answer is cached. If the entity is removed before
    /// the answer arrives, `callback` still runs, with a nameless
    /// `Referenced` snapshot, and the answer is not cached.
    pub async fn read_entity(
        &self,
        id: EntityId,
        name: &str,
        callback: Option<DeviceCallback>,
    ) -> Result<SequenceId> {
        self.registry.lock().await.get_or_create(id, name);
        let request = self.build_request(RequestKind::GetEntityInfo, Some(id)).await?;
        self.send(request, Some(Continuation::Device { entity_id: id, callback }))
            .await
    }

    /// Set a switch on or off. Refused for entities resolved to another type;
    /// unresolved entities are sent through.
    pub async fn write_entity(
        &self,
        id: EntityId,
        name: &str,
        value: bool,
        callback: Option<DeviceCallback>,
    ) -> Result<SequenceId> {
        let resolved = self.registry.lock().await.get_or_create(id, name).resolved_type();
        if let Some(entity_type) = resolved.filter(|t| *t != EntityType::Switch) {
            return Err(Error::NotASwitch { id, entity_type });
        }
        let request = self
            .build_request(RequestKind::SetEntityValue { value }, Some(id))
            .await?;
        self.send(request, Some(Continuation::Device { entity_id: id, callback }))
            .await
    }

    // ─── Generic requests ─────────────────────────────────────────

    /// Send `kind` and hand the response to `callback` when it arrives.
    pub async fn send_with(
        &self,
        kind: RequestKind,
        callback: impl FnOnce(Response) + Send + 'static,
    ) -> Result<SequenceId> {
        let request = self.build_request(kind, None).await?;
        self.send(request, Some(Continuation::Value(Box::new(callback))))
            .await
    }

    /// Send `kind` and wait for its response.
    pub async fn request(&self, kind: RequestKind) -> Result<Response> {
        self.request_for(None, kind).await
    }

    async fn request_for(&self, entity_id: Option<EntityId>, kind: RequestKind) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        let request = self.build_request(kind, entity_id).await?;
        let seq = self.send(request, Some(Continuation::Reply(tx))).await?;
        let response = rx.await.map_err(|_| Error::Cancelled(seq))?;
        if let Some(ResponsePayload::Error { error }) = &response.payload {
            return Err(Error::Server(error.clone()));
        }
        Ok(response)
    }

    async fn expect_success(&self, entity_id: Option<EntityId>, kind: RequestKind) -> Result<()> {
        match self.request_for(entity_id, kind).await?.payload {
            Some(ResponsePayload::Success) => Ok(()),
            other => Err(unexpected("success", &other)),
        }
    }

    // ─── Typed wrappers ───────────────────────────────────────────

    pub async fn server_info(&self) -> Result<ServerInfo> {
        match self.request(RequestKind::GetInfo).await?.payload {
            Some(ResponsePayload::Info(info)) => Ok(info),
            other => Err(unexpected("info", &other)),
        }
    }

    pub async fn time(&self) -> Result<TimeInfo> {
        match self.request(RequestKind::GetTime).await?.payload {
            Some(ResponsePayload::Time(time)) => Ok(time),
            other => Err(unexpected("time", &other)),
        }
    }

    pub async fn map(&self) -> Result<MapInfo> {
        match self.request(RequestKind::GetMap).await?.payload {
            Some(ResponsePayload::Map(map)) => Ok(map),
            other => Err(unexpected("map", &other)),
        }
    }

    pub async fn map_markers(&self) -> Result<Vec<MapMarker>> {
        match self.request(RequestKind::GetMapMarkers).await?.payload {
            Some(ResponsePayload::MapMarkers { markers }) => Ok(markers),
            other => Err(unexpected("map_markers", &other)),
        }
    }

    pub async fn team_info(&self) -> Result<TeamInfo> {
        match self.request(RequestKind::GetTeamInfo).await?.payload {
            Some(ResponsePayload::TeamInfo(team)) => Ok(team),
            other => Err(unexpected("team_info", &other)),
        }
    }

    pub async fn team_chat(&self) -> Result<Vec<ChatMessage>> {
        match self.request(RequestKind::GetTeamChat).await?.payload {
            Some(ResponsePayload::TeamChat { messages }) => Ok(messages),
            other => Err(unexpected("team_chat", &other)),
        }
    }

    pub async fn send_team_message(&self, message: impl Into<String>) -> Result<()> {
        let kind = RequestKind::SendTeamMessage {
            message: message.into(),
        };
        self.expect_success(None, kind).await
    }

    pub async fn camera_frame(&self, identifier: impl Into<String>, frame: u32) -> Result<CameraFrame> {
        let kind = RequestKind::GetCameraFrame {
            identifier: identifier.into(),
            frame,
        };
        match self.request(kind).await?.payload {
            Some(ResponsePayload::CameraFrame(frame)) => Ok(frame),
            other => Err(unexpected("camera_frame", &other)),
        }
    }

    pub async fn promote_to_leader(&self, steam_id: u64) -> Result<()> {
        self.expect_success(None, RequestKind::PromoteToLeader { steam_id })
            .await
    }

    /// Whether this player receives push notifications for an alarm.
    pub async fn check_subscription(&self, id: EntityId) -> Result<bool> {
        match self
            .request_for(Some(id), RequestKind::CheckSubscription)
            .await?
            .payload
        {
            Some(ResponsePayload::Flag { value }) => Ok(value),
            other => Err(unexpected("flag", &other)),
        }
    }

    pub async fn set_subscription(&self, id: EntityId, value: bool) -> Result<()> {
        self.expect_success(Some(id), RequestKind::SetSubscription { value })
            .await
    }
}
