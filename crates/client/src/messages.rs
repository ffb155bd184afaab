//! Socket.IO v4 packet framing and typed server events.
//!
//! The backend speaks Socket.IO over a plain WebSocket. Every text frame
//! is an Engine.IO packet (`0` open, `1` close, `2` ping, `3` pong,
//! `4` message, `6` noop); message packets carry a Socket.IO packet
//! (`0` connect, `1` disconnect, `2` event, `4` connect error). Events are
//! JSON arrays `["<name>", <arg>...]`.
//!
//! [`parse_packet`] turns a frame into a [`Packet`] and
//! [`ServerEvent::from_event`] maps known event names onto typed payloads.

use serde::Deserialize;

use rollcall_core::event::CheckinPayload;
use rollcall_core::types::ShiftId;

/// Client-emitted event declaring interest in the global dashboards channel.
pub const EMIT_JOIN_DASHBOARDS: &str = "joinDashboards";
/// Client-emitted event declaring interest in one shift's channel.
pub const EMIT_JOIN_SHIFT: &str = "joinShift";
/// Server event announcing that a new round has opened.
pub const EVENT_ROUND_STARTED: &str = "roundStarted";
/// Server event carrying one user's check-in update.
pub const EVENT_CHECKIN_UPDATED: &str = "checkinUpdated";

/// Engine.IO open handshake sent by the server right after the upgrade.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// One decoded text frame.
#[derive(Debug, Clone)]
pub enum Packet {
    /// Engine.IO open (`0{...}`).
    Open(Handshake),
    /// Engine.IO close (`1`).
    Close,
    /// Engine.IO ping (`2`); must be answered with a pong.
    Ping,
    /// Engine.IO pong (`3`).
    Pong,
    /// Engine.IO noop (`6`).
    Noop,
    /// Socket.IO namespace connect acknowledged (`40`).
    Connect,
    /// Socket.IO namespace disconnect (`41`).
    Disconnect,
    /// Socket.IO event (`42[...]`).
    Event {
        name: String,
        args: Vec<serde_json::Value>,
    },
    /// Socket.IO connect refused (`44{...}`).
    ConnectError(serde_json::Value),
}

/// Framing errors. The caller logs and skips the frame.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,

    #[error("unsupported packet type '{0}'")]
    Unsupported(String),

    #[error("malformed event payload: {0}")]
    Malformed(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse one WebSocket text frame.
pub fn parse_packet(text: &str) -> Result<Packet, PacketError> {
    let mut chars = text.chars();
    let engine_type = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    match engine_type {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => parse_socket_packet(rest),
        other => Err(PacketError::Unsupported(other.to_string())),
    }
}

fn parse_socket_packet(text: &str) -> Result<Packet, PacketError> {
    let mut chars = text.chars();
    let socket_type = chars.next().ok_or(PacketError::Empty)?;
    let rest = strip_namespace_and_ack(chars.as_str());

    match socket_type {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let mut items: Vec<serde_json::Value> = serde_json::from_str(rest)?;
            if items.is_empty() {
                return Err(PacketError::Malformed("event array is empty".into()));
            }
            let name = match items.remove(0) {
                serde_json::Value::String(name) => name,
                other => {
                    return Err(PacketError::Malformed(format!("event name is not a string: {other}")))
                }
            };
            Ok(Packet::Event { name, args: items })
        }
        '4' => {
            let detail = if rest.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(rest)?
            };
            Ok(Packet::ConnectError(detail))
        }
        other => Err(PacketError::Unsupported(format!("4{other}"))),
    }
}

/// Skip an optional `/namespace,` prefix and an optional numeric ack id.
fn strip_namespace_and_ack(text: &str) -> &str {
    let text = if text.starts_with('/') {
        text.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        text
    };
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

// ---- outgoing frames ----

/// Engine.IO pong answering a server ping.
pub fn encode_pong() -> String {
    "3".to_string()
}

/// Socket.IO connect request for the default namespace.
pub fn encode_connect() -> String {
    "40".to_string()
}

/// Socket.IO event frame `42["name", args...]`.
pub fn encode_event(name: &str, args: &[serde_json::Value]) -> String {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(serde_json::Value::String(name.to_string()));
    items.extend(args.iter().cloned());
    format!("42{}", serde_json::Value::Array(items))
}

// ---------------------------------------------------------------------------
// Typed server events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStartedData {
    #[serde(default)]
    pub shift_id: Option<ShiftId>,
}

/// Server events the live views care about.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    RoundStarted(RoundStartedData),
    CheckinUpdated(CheckinPayload),
}

impl ServerEvent {
    /// Map a decoded event onto a typed payload.
    ///
    /// Returns `Ok(None)` for event names this client does not handle.
    pub fn from_event(
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<Option<Self>, serde_json::Error> {
        let payload = args.first().cloned().unwrap_or(serde_json::Value::Null);
        match name {
            EVENT_ROUND_STARTED => Ok(Some(ServerEvent::RoundStarted(
                serde_json::from_value(object_or_empty(payload))?,
            ))),
            EVENT_CHECKIN_UPDATED => Ok(Some(ServerEvent::CheckinUpdated(
                serde_json::from_value(object_or_empty(payload))?,
            ))),
            _ => Ok(None),
        }
    }
}

/// A missing or `null` payload decodes as an empty object so that
/// field-level validation decides what to do with it.
fn object_or_empty(value: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::json!({})
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_open_handshake() {
        let packet =
            parse_packet(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
                .unwrap();
        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.ping_interval, 25000);
            }
            other => panic!("Expected Open, got {other:?}"),
        }
    }

    #[test]
    fn parse_ping_and_close() {
        assert_matches!(parse_packet("2").unwrap(), Packet::Ping);
        assert_matches!(parse_packet("1").unwrap(), Packet::Close);
        assert_matches!(parse_packet("6").unwrap(), Packet::Noop);
    }

    #[test]
    fn parse_namespace_connect_with_sid() {
        assert_matches!(parse_packet(r#"40{"sid":"xyz"}"#).unwrap(), Packet::Connect);
    }

    #[test]
    fn parse_event_with_payload() {
        let packet = parse_packet(r#"42["roundStarted",{"shiftId":"S1"}]"#).unwrap();
        match packet {
            Packet::Event { name, args } => {
                assert_eq!(name, "roundStarted");
                assert_eq!(args[0]["shiftId"], "S1");
            }
            other => panic!("Expected Event, got {other:?}"),
        }
    }

    #[test]
    fn parse_event_with_namespace_and_ack_id() {
        let packet = parse_packet(r#"42/admin,7["checkinUpdated",{"userId":"u1"}]"#).unwrap();
        assert_matches!(packet, Packet::Event { name, .. } if name == "checkinUpdated");
    }

    #[test]
    fn parse_connect_error() {
        let packet = parse_packet(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_matches!(packet, Packet::ConnectError(detail) if detail["message"] == "Not authorized");
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert_matches!(parse_packet(""), Err(PacketError::Empty));
        assert_matches!(parse_packet("9"), Err(PacketError::Unsupported(_)));
        assert_matches!(parse_packet("42not json"), Err(PacketError::Json(_)));
        assert_matches!(parse_packet("42[]"), Err(PacketError::Malformed(_)));
        assert_matches!(parse_packet("42[5]"), Err(PacketError::Malformed(_)));
    }

    #[test]
    fn encode_join_frames() {
        assert_eq!(encode_event(EMIT_JOIN_DASHBOARDS, &[]), r#"42["joinDashboards"]"#);
        assert_eq!(
            encode_event(EMIT_JOIN_SHIFT, &[serde_json::json!("S1")]),
            r#"42["joinShift","S1"]"#
        );
        assert_eq!(encode_connect(), "40");
        assert_eq!(encode_pong(), "3");
    }

    #[test]
    fn checkin_event_is_typed() {
        let args = vec![serde_json::json!({
            "shiftId": "S1", "userId": "u1", "round": 1, "status": "success", "checkinId": 5
        })];
        let event = ServerEvent::from_event(EVENT_CHECKIN_UPDATED, &args).unwrap();
        match event {
            Some(ServerEvent::CheckinUpdated(payload)) => {
                assert_eq!(payload.user_id.as_deref(), Some("u1"));
                assert_eq!(payload.checkin_id.as_deref(), Some("5"));
            }
            other => panic!("Expected CheckinUpdated, got {other:?}"),
        }
    }

    #[test]
    fn round_started_without_payload_has_no_shift() {
        let event = ServerEvent::from_event(EVENT_ROUND_STARTED, &[]).unwrap();
        assert_matches!(event, Some(ServerEvent::RoundStarted(data)) if data.shift_id.is_none());
    }

    #[test]
    fn unknown_event_names_are_ignored() {
        let event = ServerEvent::from_event("presence", &[serde_json::json!({})]).unwrap();
        assert!(event.is_none());
    }
}
