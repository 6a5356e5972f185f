//! rustplus-core: session correlation and entity-state engine for the
//! Rust+ companion protocol.
//! Matches responses to requests, resolves entity types through a probe
//! handshake, caches entity state and fans out broadcasts. No sockets here;
//! see `rustplus-ws` for the WebSocket transport.

pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod pending;
pub mod registry;
pub mod resolution;
pub mod router;
pub mod seq;
pub mod session;
pub mod transport;
pub mod types;

pub use codec::{Codec, JsonCodec};
pub use config::{ConfigError, ConnectionConfig, PlayerToken};
pub use entity::{EntitySnapshot, ResolutionState, SubscriptionHandle, UpdateCallback};
pub use error::{CodecError, Error, Result};
pub use pending::{Continuation, DeviceCallback, ValueCallback};
pub use resolution::Registration;
pub use router::Sink;
pub use session::Session;
pub use transport::{Dialer, Transport};
pub use types::{EntityId, EntityPayload, EntityType, Message, Request, RequestKind, Response, SequenceId};
