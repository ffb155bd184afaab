//! Long-lived event stream with structural channel rejoin.
//!
//! [`EventStream`] owns one connection task (connect -> join -> process
//! -> reconnect). Channel membership is kept as desired state on the
//! client side: every time the transport opens, the full set is emitted
//! before [`StreamEvent::Connected`] is delivered, so a consumer that
//! resyncs on `Connected` never races a missing join.
//!
//! The stream is created explicitly with [`EventStream::start`] and torn
//! down with [`EventStream::shutdown`]; nothing about it is global.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rollcall_core::link::{LinkSignal, LinkState};
use rollcall_core::types::ShiftId;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{SocketStream, StreamClient, StreamConnection};
use crate::events::StreamEvent;
use crate::messages::{
    encode_event, encode_pong, parse_packet, Packet, ServerEvent, EMIT_JOIN_DASHBOARDS,
    EMIT_JOIN_SHIFT,
};
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Buffer between the connection task and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Slack added to the server ping interval when the handshake names no
/// ping timeout.
const DEFAULT_PING_GRACE: Duration = Duration::from_secs(20);

/// Silence tolerated when the handshake names no ping interval.
const DEFAULT_IDLE_LIMIT: Duration = Duration::from_secs(45);

/// How long [`EventStream::shutdown`] waits for the task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A logical channel on the push-event server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Global channel carrying `roundStarted` for every shift.
    Dashboards,
    /// Per-shift channel carrying `checkinUpdated`.
    Shift(ShiftId),
}

impl Channel {
    /// The frame that declares membership of this channel.
    pub fn join_frame(&self) -> String {
        match self {
            Channel::Dashboards => encode_event(EMIT_JOIN_DASHBOARDS, &[]),
            Channel::Shift(shift_id) => {
                encode_event(EMIT_JOIN_SHIFT, &[serde_json::Value::String(shift_id.clone())])
            }
        }
    }
}

/// Desired channel membership. One shift channel at a time.
#[derive(Debug, Default)]
struct Membership {
    dashboards: bool,
    shift: Option<ShiftId>,
}

impl Membership {
    fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(2);
        if self.dashboards {
            channels.push(Channel::Dashboards);
        }
        if let Some(shift_id) = &self.shift {
            channels.push(Channel::Shift(shift_id.clone()));
        }
        channels
    }
}

enum Command {
    Join(Channel),
}

/// Handle to a running event stream.
pub struct EventStream {
    membership: Arc<Mutex<Membership>>,
    command_tx: mpsc::UnboundedSender<Command>,
    link_rx: watch::Receiver<LinkState>,
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

impl EventStream {
    /// Spawn the connection task.
    ///
    /// Returns the handle plus the receiver on which [`StreamEvent`]s are
    /// delivered in arrival order.
    pub fn start(
        client: StreamClient,
        reconnect: ReconnectConfig,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let membership = Arc::new(Mutex::new(Membership::default()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (link_tx, link_rx) = watch::channel(LinkState::Disconnected);
        let cancel = CancellationToken::new();

        let task = ConnectionTask {
            client,
            reconnect,
            membership: Arc::clone(&membership),
            command_rx,
            event_tx,
            link_tx,
            cancel: cancel.clone(),
        };
        let task_handle = tokio::spawn(async move {
            tracing::info!(url = %task.client.base_url(), "Starting event stream task");
            task.run().await;
            tracing::info!("Event stream task exited");
        });

        (
            Self {
                membership,
                command_tx,
                link_rx,
                cancel,
                task_handle,
            },
            event_rx,
        )
    }

    /// Declare interest in the global dashboards channel.
    ///
    /// Re-declaring an existing membership emits nothing; the connection
    /// task re-joins the whole set on every open.
    pub fn join_dashboards(&self) {
        let changed = !std::mem::replace(&mut self.lock_membership().dashboards, true);
        if changed {
            let _ = self.command_tx.send(Command::Join(Channel::Dashboards));
        }
    }

    /// Declare interest in `shift_id`'s channel, replacing any previous
    /// shift channel in the desired set.
    pub fn join_shift(&self, shift_id: &str) {
        let previous = self.lock_membership().shift.replace(shift_id.to_string());
        if previous.as_deref() != Some(shift_id) {
            let _ = self
                .command_tx
                .send(Command::Join(Channel::Shift(shift_id.to_string())));
        }
    }

    /// Channels that will be (re-)joined on every open.
    pub fn channels(&self) -> Vec<Channel> {
        self.lock_membership().channels()
    }

    /// Observe link state transitions.
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link_rx.clone()
    }

    /// Stop the connection task and wait briefly for it to exit.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down event stream");
        self.cancel.cancel();
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task_handle).await;
    }

    fn lock_membership(&self) -> MutexGuard<'_, Membership> {
        self.membership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// State owned by the spawned connection task.
struct ConnectionTask {
    client: StreamClient,
    reconnect: ReconnectConfig,
    membership: Arc<Mutex<Membership>>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<StreamEvent>,
    link_tx: watch::Sender<LinkState>,
    cancel: CancellationToken,
}

/// Why a session ended.
enum SessionEnd {
    Dropped,
    Cancelled,
}

impl ConnectionTask {
    /// Core connection loop: connect -> session -> reconnect.
    ///
    /// Runs until the cancellation token is triggered or the consumer
    /// drops its receiver.
    async fn run(mut self) {
        let mut pending: Option<StreamConnection> = None;

        loop {
            self.signal(LinkSignal::Dial);
            let conn = match pending.take() {
                Some(conn) => conn,
                None => match self.client.connect().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
                        match reconnect_loop(&self.client, &self.reconnect, &self.cancel).await {
                            Some(conn) => conn,
                            None => return,
                        }
                    }
                },
            };

            let end = self.run_session(conn).await;
            self.signal(LinkSignal::Lost);

            if matches!(end, SessionEnd::Cancelled) || self.cancel.is_cancelled() {
                return;
            }
            if self.event_tx.send(StreamEvent::Disconnected).await.is_err() {
                return;
            }

            tracing::info!("Event stream lost, entering reconnect loop");
            self.signal(LinkSignal::Dial);
            match reconnect_loop(&self.client, &self.reconnect, &self.cancel).await {
                Some(conn) => pending = Some(conn),
                None => return,
            }
        }
    }

    /// Join every desired channel, announce `Connected`, then pump frames
    /// until the connection drops.
    async fn run_session(&mut self, conn: StreamConnection) -> SessionEnd {
        let idle_limit = idle_limit(conn.ping_interval, conn.ping_timeout);
        let mut ws_stream = conn.ws_stream;

        // Joins queued while disconnected are covered by the full re-emit.
        while self.command_rx.try_recv().is_ok() {}

        let channels = self
            .membership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .channels();
        for channel in &channels {
            if let Err(e) = ws_stream.send(Message::Text(channel.join_frame())).await {
                tracing::warn!(error = %e, ?channel, "Failed to join channel");
                return SessionEnd::Dropped;
            }
        }
        tracing::info!(sid = %conn.sid, channels = channels.len(), "Joined event channels");

        self.signal(LinkSignal::Opened);
        if self.event_tx.send(StreamEvent::Connected).await.is_err() {
            return SessionEnd::Cancelled;
        }

        let idle = tokio::time::sleep(idle_limit);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = ws_stream.close(None).await;
                    return SessionEnd::Cancelled;
                }
                _ = &mut idle => {
                    tracing::warn!(idle_ms = idle_limit.as_millis() as u64, "No frames from server, dropping connection");
                    return SessionEnd::Dropped;
                }
                Some(command) = self.command_rx.recv() => {
                    let Command::Join(channel) = command;
                    if let Err(e) = ws_stream.send(Message::Text(channel.join_frame())).await {
                        tracing::warn!(error = %e, ?channel, "Failed to join channel");
                        return SessionEnd::Dropped;
                    }
                    tracing::debug!(?channel, "Joined channel");
                }
                frame = ws_stream.next() => {
                    idle.as_mut().reset(tokio::time::Instant::now() + idle_limit);
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(end) = self.handle_text(&mut ws_stream, &text).await {
                                return end;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Event stream closed by server");
                            return SessionEnd::Dropped;
                        }
                        Some(Ok(_)) => {
                            // Binary attachments / raw frames are not used.
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Event stream receive error");
                            return SessionEnd::Dropped;
                        }
                        None => {
                            tracing::info!("Event stream exhausted");
                            return SessionEnd::Dropped;
                        }
                    }
                }
            }
        }
    }

    /// Handle one text frame. Returns `Some` when the session must end.
    async fn handle_text(&mut self, ws_stream: &mut SocketStream, text: &str) -> Option<SessionEnd> {
        let packet = match parse_packet(text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, raw = %text, "Failed to parse stream frame");
                return None;
            }
        };

        match packet {
            Packet::Ping => {
                if let Err(e) = ws_stream.send(Message::Text(encode_pong())).await {
                    tracing::warn!(error = %e, "Failed to answer ping");
                    return Some(SessionEnd::Dropped);
                }
                None
            }
            Packet::Close | Packet::Disconnect => {
                tracing::info!("Server ended the session");
                Some(SessionEnd::Dropped)
            }
            Packet::ConnectError(detail) => {
                tracing::warn!(%detail, "Server refused namespace");
                Some(SessionEnd::Dropped)
            }
            Packet::Event { name, args } => {
                let event = match ServerEvent::from_event(&name, &args) {
                    Ok(Some(ServerEvent::RoundStarted(data))) => match data.shift_id {
                        Some(shift_id) if !shift_id.is_empty() => {
                            StreamEvent::RoundStarted { shift_id }
                        }
                        _ => {
                            tracing::debug!("roundStarted without shiftId, ignoring");
                            return None;
                        }
                    },
                    Ok(Some(ServerEvent::CheckinUpdated(payload))) => {
                        StreamEvent::CheckinUpdated(payload)
                    }
                    Ok(None) => {
                        tracing::debug!(event = %name, "Ignoring unhandled event");
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(event = %name, error = %e, "Malformed event payload");
                        return None;
                    }
                };
                if self.event_tx.send(event).await.is_err() {
                    return Some(SessionEnd::Cancelled);
                }
                None
            }
            Packet::Open(_) | Packet::Connect | Packet::Pong | Packet::Noop => None,
        }
    }

    fn signal(&self, signal: LinkSignal) {
        self.link_tx.send_modify(|state| *state = state.on(signal));
    }
}

/// Longest silence from the server before the link is declared dead: one
/// ping interval plus the server's own ping timeout.
fn idle_limit(ping_interval: Duration, ping_timeout: Duration) -> Duration {
    if ping_interval.is_zero() {
        return DEFAULT_IDLE_LIMIT;
    }
    let grace = if ping_timeout.is_zero() {
        DEFAULT_PING_GRACE
    } else {
        ping_timeout
    };
    ping_interval + grace
}
