//! Error types for the session engine.

use std::io;

use thiserror::Error;

use crate::entity::SubscriptionHandle;
use crate::types::{EntityId, EntityType, SequenceId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("session is not connected")]
    NotConnected,

    #[error("no player credentials configured")]
    NoCredentials,

    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[source] CodecError),

    #[error("failed to decode message: {0}")]
    Decode(#[source] CodecError),

    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("subscription {handle} is not registered on entity {entity_id}")]
    NotRegistered {
        entity_id: EntityId,
        handle: SubscriptionHandle,
    },

    /// The correlation invariant is broken: an id was allocated twice while
    /// still outstanding.
    #[error("request id {0} is already pending")]
    DuplicateId(SequenceId),

    #[error("entity {id} is already resolved as {existing}, refusing {attempted}")]
    TypeAlreadySet {
        id: EntityId,
        existing: EntityType,
        attempted: EntityType,
    },

    #[error("entity {id} is a {entity_type}, not a switch")]
    NotASwitch { id: EntityId, entity_type: EntityType },

    #[error("server rejected request: {0}")]
    Server(String),

    #[error("expected a {expected} response, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("request {0} was dropped before a response arrived")]
    Cancelled(SequenceId),
}

impl Error {
    /// Whether the read loop must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::DuplicateId(_))
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
