//! WebSocket front door of the arena.
//!
//! Each accepted socket gets a reader loop (this task) and a writer task. The
//! reader parses JSON frames and forwards them to the hub; everything addressed to
//! the connection goes through its bounded outbound queue and the writer task, so
//! a slow client only ever loses its own messages.
//!
//! A connection must open with `session.hello`. Until then nothing reaches the hub.

use crate::config::ArenaConfig;
use crate::connections::ConnectionHandle;
use crate::error::ArenaError;
use crate::hub::HubHandle;
use arena_shared::{ClientEnvelope, ClientMessage, ConnectionId, Reply, ServerMessage, UserId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Why a connection ended early.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("no session.hello within the handshake timeout")]
    HelloTimeout,

    #[error("connection closed before the session was established")]
    ClosedEarly,

    #[error("connection rejected: {0}")]
    Rejected(#[from] ArenaError),
}

pub struct ArenaServer {
    listener: TcpListener,
    config: Arc<ArenaConfig>,
    hub: HubHandle,
    next_connection: AtomicU64,
}

impl ArenaServer {
    pub async fn bind(config: ArenaConfig, hub: HubHandle) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Arena listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config: Arc::new(config),
            hub,
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
            let config = Arc::clone(&self.config);
            let hub = self.hub.clone();

            tokio::spawn(async move {
                match serve_connection(stream, id, config, hub).await {
                    Ok(()) => debug!("Connection {} from {} closed", id, addr),
                    Err(e) => warn!("Connection {} from {} ended: {}", id, addr, e),
                }
            });
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    id: ConnectionId,
    config: Arc<ArenaConfig>,
    hub: HubHandle,
) -> Result<(), NetworkError> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    let (user, username, hello_ack) =
        match timeout(config.hello_timeout, read_hello(&mut sink, &mut source)).await {
            Ok(hello) => hello?,
            Err(_) => {
                let _ = send_frame(
                    &mut sink,
                    &ServerMessage::Error {
                        code: ArenaError::NoSession.code().to_string(),
                        message: NetworkError::HelloTimeout.to_string(),
                    },
                )
                .await;
                let _ = sink.close().await;
                return Err(NetworkError::HelloTimeout);
            }
        };

    let (handle, mut outbound) = ConnectionHandle::channel(id, user, config.outbound_buffer);
    if let Err(e) = hub.connect(handle.clone(), username).await {
        let rejection = match hello_ack {
            Some(ack) => ServerMessage::Ack(Reply::failure(ack, e.code(), e.to_string())),
            None => ServerMessage::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        };
        let _ = send_frame(&mut sink, &rejection).await;
        let _ = sink.close().await;
        return Err(e.into());
    }
    handle.acknowledge(hello_ack, Ok(Reply::success()));
    info!("Connection {} established for user {}", id, user);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = send_frame(&mut sink, &message).await {
                debug!("Connection {}: write failed: {}", id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let frame = match timeout(config.idle_timeout, source.next()).await {
            Err(_) => {
                info!("Connection {} idle for {:?}, closing", id, config.idle_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Connection {}: read failed: {}", id, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEnvelope>(&text) {
                Ok(envelope) => {
                    if !hub.dispatch(handle.clone(), envelope).await {
                        warn!("Hub is gone, closing connection {}", id);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Connection {}: malformed frame: {}", id, e);
                    handle.send(invalid_payload(e.to_string()));
                }
            },
            Message::Binary(_) => {
                handle.send(invalid_payload("binary frames are not supported"));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.disconnect(user, id).await;
    writer.abort();
    Ok(())
}

/// Waits for `session.hello`, answering anything else with an error frame.
async fn read_hello(
    sink: &mut WsSink,
    source: &mut WsSource,
) -> Result<(UserId, String, Option<u64>), NetworkError> {
    while let Some(frame) = source.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(NetworkError::ClosedEarly),
            _ => continue,
        };

        match serde_json::from_str::<ClientEnvelope>(&text) {
            Ok(ClientEnvelope {
                ack,
                message: ClientMessage::Hello { user_id, username },
            }) => return Ok((user_id, username, ack)),
            Ok(envelope) => {
                let e = ArenaError::NoSession;
                let reply = match envelope.ack {
                    Some(ack) => ServerMessage::Ack(Reply::failure(ack, e.code(), e.to_string())),
                    None => ServerMessage::Error {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    },
                };
                send_frame(sink, &reply).await?;
            }
            Err(e) => send_frame(sink, &invalid_payload(e.to_string())).await?,
        }
    }
    Err(NetworkError::ClosedEarly)
}

async fn send_frame(sink: &mut WsSink, message: &ServerMessage) -> Result<(), NetworkError> {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json.into())).await?,
        Err(e) => error!("Failed to serialize {:?}: {}", message, e),
    }
    Ok(())
}

fn invalid_payload(reason: impl Into<String>) -> ServerMessage {
    let e = ArenaError::invalid_payload(reason);
    ServerMessage::Error {
        code: e.code().to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::hub::Hub;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    async fn start_server(config: ArenaConfig) -> SocketAddr {
        let (hub, _task) = Hub::new(
            config.clone(),
            Arc::new(MemoryStore::new()),
            Box::new(MemoryDirectory::new()),
        )
        .spawn();
        let server = ArenaServer::bind(config, hub).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    fn test_config() -> ArenaConfig {
        ArenaConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            hello_timeout: Duration::from_millis(500),
            ..ArenaConfig::default()
        }
    }

    async fn next_message<S>(source: &mut S) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let frame = timeout(Duration::from_secs(2), source.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_hello_then_welcome() {
        let addr = start_server(test_config()).await;
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let (mut sink, mut source) = ws.split();

        let hello = r#"{"event":"session.hello","data":{"userId":7,"username":"neo"},"ack":1}"#;
        sink.send(Message::Text(hello.into())).await.unwrap();

        match next_message(&mut source).await {
            ServerMessage::Welcome { user_id, .. } => assert_eq!(user_id, UserId(7)),
            other => panic!("expected welcome, got {:?}", other),
        }
        assert_eq!(next_message(&mut source).await, ServerMessage::Ack(Reply::ok(1)));
    }

    #[tokio::test]
    async fn test_frames_before_hello_are_refused() {
        let addr = start_server(test_config()).await;
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let (mut sink, mut source) = ws.split();

        sink.send(Message::Text(r#"{"event":"queue.enter"}"#.into()))
            .await
            .unwrap();
        match next_message(&mut source).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, "NO_SESSION"),
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_get_an_error() {
        let addr = start_server(test_config()).await;
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let (mut sink, mut source) = ws.split();

        let hello = r#"{"event":"session.hello","data":{"userId":8,"username":"trin"}}"#;
        sink.send(Message::Text(hello.into())).await.unwrap();
        next_message(&mut source).await;

        sink.send(Message::Text("{not json".into())).await.unwrap();
        match next_message(&mut source).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, "INVALID_PAYLOAD"),
            other => panic!("expected an error, got {:?}", other),
        }
    }
}
