//! Session over a real WebSocket against a scripted loopback server.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use rustplus_core::types::{
    Broadcast, EntityChanged, EntityInfo, ResponsePayload, TimeInfo,
};
use rustplus_core::{
    ConnectionConfig, EntityPayload, EntityType, JsonCodec, Message, RequestKind, Registration,
    Response, Session, Transport,
};
use rustplus_ws::{WsDialer, WsTransport};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as Frame;

fn reply_to(kind: &RequestKind) -> Option<ResponsePayload> {
    match kind {
        RequestKind::GetTime => Some(ResponsePayload::Time(TimeInfo {
            day_length_minutes: 45.0,
            time_scale: 1.0,
            sunrise: 7.5,
            sunset: 19.5,
            time: 10.0,
        })),
        RequestKind::GetEntityInfo => Some(ResponsePayload::EntityInfo(EntityInfo {
            entity_type: Some(EntityType::Switch),
            payload: EntityPayload {
                value: Some(false),
                ..EntityPayload::default()
            },
        })),
        RequestKind::SetEntityValue { .. } => Some(ResponsePayload::Success),
        _ => Some(ResponsePayload::Error {
            error: "not_supported".into(),
        }),
    }
}

/// Accept one client and answer every request it sends. After a
/// `SetEntityValue`, also broadcast the new state. A ping precedes each reply.
async fn fake_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            let bytes = match frame {
                Frame::Binary(bytes) => bytes,
                Frame::Close(_) => break,
                _ => continue,
            };
            let request = JsonCodec.decode_request(&bytes).unwrap();
            let response = Message::Response(Response {
                seq: request.seq,
                payload: reply_to(&request.kind),
            });
            ws.send(Frame::Ping(Vec::new())).await.unwrap();
            ws.send(Frame::Binary(JsonCodec.encode_message(&response).unwrap()))
                .await
                .unwrap();

            if let (RequestKind::SetEntityValue { value }, Some(entity_id)) =
                (&request.kind, request.entity_id)
            {
                let broadcast = Message::Broadcast(Broadcast {
                    entity_changed: Some(EntityChanged {
                        entity_id,
                        payload: EntityPayload {
                            value: Some(*value),
                            ..EntityPayload::default()
                        },
                    }),
                    ..Broadcast::default()
                });
                ws.send(Frame::Binary(JsonCodec.encode_message(&broadcast).unwrap()))
                    .await
                    .unwrap();
            }
        }
    });
    addr
}

#[tokio::test]
async fn session_round_trips_over_websocket() {
    let addr = fake_server().await;
    let config = ConnectionConfig::new(addr.ip().to_string(), addr.port()).add_token(1, 2);
    let session = std::sync::Arc::new(Session::new(config, WsDialer::new()));
    session.connect().await.unwrap();
    let reader = tokio::spawn({
        let session = session.clone();
        async move { session.run().await }
    });

    let time = session.time().await.unwrap();
    assert_eq!(time.sunrise, 7.5);

    let (registration, resolved) = Registration::new(42, "gate").with_channel();
    session.register(registration).await.unwrap();
    let snapshot = resolved.await.unwrap();
    assert_eq!(snapshot.entity_type(), Some(EntityType::Switch));
    assert_eq!(snapshot.is_on(), Some(false));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .subscribe(42, move |_, payload| {
            let _ = tx.send(payload.value);
        })
        .await
        .unwrap();
    session.write_entity(42, "gate", true, None).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), Some(true));

    let err = session.map().await.unwrap_err();
    assert!(matches!(err, rustplus_core::Error::Server(ref e) if e == "not_supported"));

    session.disconnect().await.unwrap();
    assert!(reader.await.unwrap().is_ok());
}

#[tokio::test]
async fn close_wakes_blocked_reader() {
    let addr = fake_server().await;
    let transport = std::sync::Arc::new(WsTransport::connect(&format!("ws://{addr}")).await.unwrap());
    let reader = tokio::spawn({
        let transport = transport.clone();
        async move { transport.read().await }
    });
    tokio::task::yield_now().await;
    transport.close().await.unwrap();

    let err = reader.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionAborted);
    let err = transport.write(b"{}".to_vec()).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}
