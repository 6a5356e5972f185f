//! rustplus-ws: WebSocket [`Transport`] for the companion protocol.
//! One protocol message per binary frame. Pings and pongs are answered by
//! tungstenite and never surface as frames.

use std::io;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rustplus_core::{Dialer, Transport};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: CancellationToken,
}

impl WsTransport {
    pub async fn connect(url: &str) -> io::Result<Self> {
        let (ws, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(into_io)?;
        tracing::debug!(url, status = %response.status(), "websocket handshake complete");
        let (sink, stream) = ws.split();
        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: CancellationToken::new(),
        })
    }

    async fn next_frame(&self) -> io::Result<Vec<u8>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "server closed websocket");
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "websocket closed by server",
                    ));
                }
                Some(Err(err)) => return Err(into_io(err)),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "websocket stream ended",
                    ));
                }
            }
        }
    }
}

impl Transport for WsTransport {
    async fn write(&self, frame: Vec<u8>) -> io::Result<()> {
        if self.closed.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        self.sink
            .lock()
            .await
            .send(Message::Binary(frame))
            .await
            .map_err(into_io)
    }

    async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "transport closed"))
            }
            frame = self.next_frame() => frame,
        }
    }

    /// Send a close frame and wake any blocked reader.
    async fn close(&self) -> io::Result<()> {
        self.closed.cancel();
        match self.sink.lock().await.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(into_io(err)),
        }
    }
}

/// Dials `ws://` (and, with the `tls` feature, `wss://`) URLs.
#[derive(Debug, Clone, Default)]
pub struct WsDialer {
    timeout: Option<Duration>,
}

impl WsDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a dial that has not completed the handshake within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Dialer for WsDialer {
    type Transport = WsTransport;

    async fn dial(&self, url: &str) -> io::Result<WsTransport> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, WsTransport::connect(url))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "websocket handshake timed out"))?,
            None => WsTransport::connect(url).await,
        }
    }
}

fn into_io(err: WsError) -> io::Error {
    match err {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::ConnectionAborted, err)
        }
        other => io::Error::other(other),
    }
}
