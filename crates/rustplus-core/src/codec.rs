//! Typed message <-> bytes conversion.
//!
//! The session is generic over [`Codec`] so the on-wire format can be
//! swapped without touching correlation logic. [`JsonCodec`] is the shipped
//! implementation.

use crate::error::CodecError;
use crate::types::{Message, Request};

pub trait Codec: Send + Sync {
    fn encode(&self, request: &Request) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// `serde_json` codec. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(request)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl JsonCodec {
    /// Server-side half: decode a request written by a client.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Server-side half: encode a message for a client to read.
    pub fn encode_message(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }
}
