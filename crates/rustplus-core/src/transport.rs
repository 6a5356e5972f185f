//! Byte-level duplex capability the session drives.
//!
//! One message per `write`/`read` call; framing belongs to the implementor.
//! Methods take `&self` so a reader task can sit in `read` while other
//! tasks `write`.

use std::future::Future;
use std::io;

pub mod memory;

pub trait Transport: Send + Sync + 'static {
    fn write(&self, frame: Vec<u8>) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait for the next inbound frame. An empty frame means "nothing to decode".
    fn read(&self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;

    fn close(&self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Opens a [`Transport`] to a URL.
pub trait Dialer: Send + Sync {
    type Transport: Transport;

    fn dial(&self, url: &str) -> impl Future<Output = io::Result<Self::Transport>> + Send;
}
