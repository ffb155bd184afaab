//! WebSocket client for the backend's Socket.IO endpoint.
//!
//! [`StreamClient`] holds the connection configuration. Call
//! [`StreamClient::connect`] to upgrade, complete the Engine.IO and
//! Socket.IO handshakes, and obtain a live [`StreamConnection`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use crate::messages::{encode_connect, encode_pong, parse_packet, Packet};

/// Upper bound on the whole handshake (upgrade + open + namespace connect).
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub type SocketStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the push-event endpoint.
#[derive(Debug, Clone)]
pub struct StreamClient {
    base_url: String,
}

/// A live, namespace-connected Socket.IO session.
pub struct StreamConnection {
    /// Engine.IO session id assigned by the server.
    pub sid: String,
    /// Server ping interval from the handshake.
    pub ping_interval: Duration,
    /// How long the server waits for a pong after each ping.
    pub ping_timeout: Duration,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: SocketStream,
}

impl StreamClient {
    /// * `base_url` - server base URL, e.g. `ws://host:3600` or
    ///   `http://host:3600` (the scheme is mapped to `ws`/`wss`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full Socket.IO WebSocket URL for this server.
    pub fn socket_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/socket.io/?EIO=4&transport=websocket")
    }

    /// Connect and complete the handshake.
    pub async fn connect(&self) -> Result<StreamConnection, StreamClientError> {
        tokio::time::timeout(HANDSHAKE_TIMEOUT, self.connect_inner())
            .await
            .map_err(|_| StreamClientError::Connection(format!(
                "Handshake with {} timed out",
                self.base_url
            )))?
    }

    async fn connect_inner(&self) -> Result<StreamConnection, StreamClientError> {
        let url = self.socket_url();
        let (mut ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            StreamClientError::Connection(format!("Failed to connect to {}: {e}", self.base_url))
        })?;

        let handshake = loop {
            match next_packet(&mut ws_stream).await? {
                Packet::Open(handshake) => break handshake,
                other => tracing::debug!(?other, "Ignoring packet before open"),
            }
        };

        ws_stream
            .send(Message::Text(encode_connect()))
            .await
            .map_err(|e| StreamClientError::Protocol(e.to_string()))?;

        loop {
            match next_packet(&mut ws_stream).await? {
                Packet::Connect => break,
                Packet::Ping => {
                    ws_stream
                        .send(Message::Text(encode_pong()))
                        .await
                        .map_err(|e| StreamClientError::Protocol(e.to_string()))?;
                }
                Packet::ConnectError(detail) => {
                    return Err(StreamClientError::Protocol(format!(
                        "Namespace connect refused: {detail}"
                    )));
                }
                other => tracing::debug!(?other, "Ignoring packet before namespace connect"),
            }
        }

        tracing::info!(sid = %handshake.sid, "Connected to event stream at {}", self.base_url);

        Ok(StreamConnection {
            sid: handshake.sid,
            ping_interval: Duration::from_millis(handshake.ping_interval),
            ping_timeout: Duration::from_millis(handshake.ping_timeout),
            ws_stream,
        })
    }
}

/// Read frames until one parses into a packet.
async fn next_packet(ws_stream: &mut SocketStream) -> Result<Packet, StreamClientError> {
    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => match parse_packet(&text) {
                Ok(packet) => return Ok(packet),
                Err(e) => tracing::warn!(error = %e, raw = %text, "Skipping malformed frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                return Err(StreamClientError::Protocol(format!(
                    "Closed during handshake: {frame:?}"
                )));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(StreamClientError::Protocol(e.to_string())),
            None => {
                return Err(StreamClientError::Protocol(
                    "Stream ended during handshake".into(),
                ))
            }
        }
    }
}

/// Errors that can occur when working with the stream client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_scheme_maps_to_ws() {
        let client = StreamClient::new("http://localhost:3600/");
        assert_eq!(
            client.socket_url(),
            "ws://localhost:3600/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn https_scheme_maps_to_wss() {
        let client = StreamClient::new("https://checkin.example.test");
        assert_eq!(
            client.socket_url(),
            "wss://checkin.example.test/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn ws_scheme_is_kept() {
        let client = StreamClient::new("ws://10.0.0.2:3600");
        assert!(client.socket_url().starts_with("ws://10.0.0.2:3600/socket.io/"));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let client = StreamClient::new("ws://127.0.0.1:9");
        assert!(client.connect().await.is_err());
    }
}
