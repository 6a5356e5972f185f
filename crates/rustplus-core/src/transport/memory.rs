//! Channel-backed in-process transport.
//!
//! [`pair`] returns the client half (a [`Transport`]) and a [`MemoryPeer`]
//! that plays the server: it sees every frame the client writes and can
//! inject frames for the client to read. Used by tests across the workspace.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::{Dialer, Transport};
use crate::codec::JsonCodec;
use crate::types::{Broadcast, Message, Request, Response, ResponsePayload, SequenceId};

#[derive(Debug)]
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: CancellationToken,
    writes_left: AtomicUsize,
}

/// Server side of a [`MemoryTransport`].
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<Vec<u8>>,
    inject: mpsc::UnboundedSender<Vec<u8>>,
    closed: CancellationToken,
}

pub fn pair() -> (MemoryTransport, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();
    let transport = MemoryTransport {
        outbound: out_tx,
        inbound: Mutex::new(in_rx),
        closed: closed.clone(),
        writes_left: AtomicUsize::new(usize::MAX),
    };
    let peer = MemoryPeer {
        sent: out_rx,
        inject: in_tx,
        closed,
    };
    (transport, peer)
}

impl MemoryTransport {
    /// Accept `count` writes, then fail every later one with `BrokenPipe`.
    pub fn fail_writes_after(self, count: usize) -> Self {
        self.writes_left.store(count, Ordering::SeqCst);
        self
    }
}

impl Transport for MemoryTransport {
    async fn write(&self, frame: Vec<u8>) -> io::Result<()> {
        if self.closed.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        let budget = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if budget.is_err() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write budget exhausted"));
        }
        self.outbound
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))
    }

    async fn read(&self) -> io::Result<Vec<u8>> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "transport closed"))
            }
            frame = inbound.recv() => {
                frame.ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer dropped"))
            }
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

impl MemoryPeer {
    /// Next raw frame written by the client.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.sent.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.sent.try_recv().ok()
    }

    /// Queue a raw frame for the client. Returns `false` if the client half is gone.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.inject.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Next client frame decoded as a JSON request.
    pub async fn recv_request(&mut self) -> Option<Request> {
        let frame = self.recv().await?;
        JsonCodec.decode_request(&frame).ok()
    }

    pub fn try_recv_request(&mut self) -> Option<Request> {
        let frame = self.try_recv()?;
        JsonCodec.decode_request(&frame).ok()
    }

    pub fn send_message(&self, message: &Message) -> bool {
        match JsonCodec.encode_message(message) {
            Ok(frame) => self.send(frame),
            Err(_) => false,
        }
    }

    pub fn respond(&self, seq: SequenceId, payload: Option<ResponsePayload>) -> bool {
        self.send_message(&Message::Response(Response { seq, payload }))
    }

    pub fn broadcast(&self, broadcast: Broadcast) -> bool {
        self.send_message(&Message::Broadcast(broadcast))
    }
}

/// Hands out one pre-built [`MemoryTransport`], or always fails.
pub struct MemoryDialer {
    transport: Mutex<Option<MemoryTransport>>,
    dialed: Mutex<Vec<String>>,
    refuse: bool,
}

impl MemoryDialer {
    pub fn new(transport: MemoryTransport) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            dialed: Mutex::new(Vec::new()),
            refuse: false,
        }
    }

    /// A dialer plus the peer for the transport it will hand out.
    pub fn paired() -> (Self, MemoryPeer) {
        let (transport, peer) = pair();
        (Self::new(transport), peer)
    }

    /// A dialer whose every dial is refused.
    pub fn refusing() -> Self {
        Self {
            transport: Mutex::new(None),
            dialed: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    /// URLs passed to `dial`, in order.
    pub async fn dialed(&self) -> Vec<String> {
        self.dialed.lock().await.clone()
    }
}

impl Dialer for MemoryDialer {
    type Transport = MemoryTransport;

    async fn dial(&self, url: &str) -> io::Result<MemoryTransport> {
        self.dialed.lock().await.push(url.to_string());
        if self.refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "dial refused"));
        }
        self.transport.lock().await.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "memory transport already dialed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (transport, mut peer) = pair();
        transport.write(b"ping".to_vec()).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), b"ping");

        assert!(peer.send(b"pong".to_vec()));
        assert_eq!(transport.read().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn close_wakes_blocked_reader() {
        let (transport, peer) = pair();
        let transport = std::sync::Arc::new(transport);
        let reader = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.read().await })
        };
        tokio::task::yield_now().await;
        transport.close().await.unwrap();

        let err = reader.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert!(peer.is_closed());
        assert!(transport.write(vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn writes_fail_once_budget_is_spent() {
        let (transport, mut peer) = pair();
        let transport = transport.fail_writes_after(1);
        transport.write(b"one".to_vec()).await.unwrap();
        let err = transport.write(b"two".to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(peer.recv().await.unwrap(), b"one");
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_peer_is_eof() {
        let (transport, peer) = pair();
        drop(peer);
        let err = transport.read().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn dialer_hands_out_once_and_records_urls() {
        let (dialer, _peer) = MemoryDialer::paired();
        assert!(dialer.dial("ws://a:1").await.is_ok());
        assert!(dialer.dial("ws://a:1").await.is_err());
        assert_eq!(dialer.dialed().await, vec!["ws://a:1", "ws://a:1"]);

        let refusing = MemoryDialer::refusing();
        let err = refusing.dial("ws://b:2").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
