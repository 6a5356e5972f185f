//! Wire-level message types exchanged with the companion server.
//!
//! Everything here is a plain value object. The session only looks inside
//! `Request::seq`, `Request::entity_id`, `Response::seq`, `EntityInfo` and
//! `Broadcast`; the rest is carried opaquely between caller and server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a remote entity (switch, alarm, storage monitor).
pub type EntityId = u32;

/// Request correlation id, echoed by the server on the matching response.
pub type SequenceId = u32;

// ─── Requests ─────────────────────────────────────────────────────

/// One outbound request. `seq` is stamped by the session at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: SequenceId,
    pub player_id: u64,
    pub player_token: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    GetInfo,
    GetTime,
    GetMap,
    GetTeamInfo,
    GetTeamChat,
    SendTeamMessage { message: String },
    /// The "describe" probe: asks the server for an entity's type and state.
    GetEntityInfo,
    SetEntityValue { value: bool },
    GetMapMarkers,
    GetCameraFrame { identifier: String, frame: u32 },
    PromoteToLeader { steam_id: u64 },
    CheckSubscription,
    SetSubscription { value: bool },
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetInfo => "get_info",
            Self::GetTime => "get_time",
            Self::GetMap => "get_map",
            Self::GetTeamInfo => "get_team_info",
            Self::GetTeamChat => "get_team_chat",
            Self::SendTeamMessage { .. } => "send_team_message",
            Self::GetEntityInfo => "get_entity_info",
            Self::SetEntityValue { .. } => "set_entity_value",
            Self::GetMapMarkers => "get_map_markers",
            Self::GetCameraFrame { .. } => "get_camera_frame",
            Self::PromoteToLeader { .. } => "promote_to_leader",
            Self::CheckSubscription => "check_subscription",
            Self::SetSubscription { .. } => "set_subscription",
        }
    }
}

// ─── Inbound messages ─────────────────────────────────────────────

/// A decoded inbound frame: either the answer to a request or an
/// unsolicited broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    Response(Response),
    Broadcast(Broadcast),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: SequenceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
}

impl Response {
    /// Entity info carried by this response, if any.
    pub fn entity_info(&self) -> Option<&EntityInfo> {
        match &self.payload {
            Some(ResponsePayload::EntityInfo(info)) => Some(info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    Success,
    Error { error: String },
    Info(ServerInfo),
    Time(TimeInfo),
    Map(MapInfo),
    TeamInfo(TeamInfo),
    TeamChat { messages: Vec<ChatMessage> },
    EntityInfo(EntityInfo),
    MapMarkers { markers: Vec<MapMarker> },
    CameraFrame(CameraFrame),
    Flag { value: bool },
}

impl ResponsePayload {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error { .. } => "error",
            Self::Info(_) => "info",
            Self::Time(_) => "time",
            Self::Map(_) => "map",
            Self::TeamInfo(_) => "team_info",
            Self::TeamChat { .. } => "team_chat",
            Self::EntityInfo(_) => "entity_info",
            Self::MapMarkers { .. } => "map_markers",
            Self::CameraFrame(_) => "camera_frame",
            Self::Flag { .. } => "flag",
        }
    }
}

/// Unsolicited server push. The server sets at most one field; an empty
/// broadcast (or one whose kind this client does not know) is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_changed: Option<EntityChanged>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_message: Option<TeamMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_changed: Option<TeamChanged>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChanged {
    pub entity_id: EntityId,
    pub payload: EntityPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMessage {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamChanged {
    pub player_id: u64,
    pub team_info: TeamInfo,
}

// ─── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Switch,
    Alarm,
    /// Capacity-limited container sensor.
    StorageMonitor,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Alarm => "alarm",
            Self::StorageMonitor => "storage_monitor",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub payload: EntityPayload,
}

/// Observed state of an entity. `value` is the on/active flag; the storage
/// fields are only populated for storage monitors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<StorageItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_protection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_expiry: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    pub item_id: i32,
    pub quantity: i32,
    #[serde(default)]
    pub item_is_blueprint: bool,
}

// ─── Server / map / team value objects ────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub header_image: String,
    #[serde(default)]
    pub url: String,
    pub map: String,
    pub map_size: u32,
    pub players: u32,
    pub max_players: u32,
    #[serde(default)]
    pub queued_players: u32,
    #[serde(default)]
    pub seed: u32,
    #[serde(default)]
    pub salt: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeInfo {
    pub day_length_minutes: f32,
    pub time_scale: f32,
    pub sunrise: f32,
    pub sunset: f32,
    pub time: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub jpg_image: Vec<u8>,
    #[serde(default)]
    pub ocean_margin: i32,
    #[serde(default)]
    pub monuments: Vec<Monument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monument {
    pub token: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: u32,
    #[serde(rename = "type")]
    pub marker_type: i32,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub steam_id: u64,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub leader_steam_id: u64,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub steam_id: u64,
    pub name: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub is_alive: bool,
    #[serde(default)]
    pub spawn_time: u32,
    #[serde(default)]
    pub death_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub steam_id: u64,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub color: String,
    /// Unix seconds.
    pub time: u32,
}

impl ChatMessage {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.time), 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub frame: u32,
    #[serde(default)]
    pub jpg_image: Vec<u8>,
}

// ─── Tests ────────────────────────────────────────────────────────
