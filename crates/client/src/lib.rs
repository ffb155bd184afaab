//! REST and push-event client for the attendance admin backend.
//!
//! Provides the typed HTTP API wrapper, the Socket.IO-over-WebSocket
//! transport with packet framing, reconnection logic, and the
//! [`stream::EventStream`] that owns one long-lived connection and keeps
//! its channel membership alive across reconnects.

pub mod api;
pub mod client;
pub mod events;
pub mod messages;
pub mod models;
pub mod reconnect;
pub mod stream;
