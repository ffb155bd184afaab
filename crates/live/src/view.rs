//! Live attendance view actor.
//!
//! A [`LiveView`] owns a [`Reconciler`] and drives it from two inputs:
//! [`StreamEvent`]s from the event stream and completions of the fetches
//! it spawned. Both are handled in arrival order inside one
//! `tokio::select!` loop, so the snapshot is only ever mutated by the
//! task running [`LiveView::run`]. Readers observe a [`LiveState`]
//! through the `watch` channel returned by [`LiveView::subscribe`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rollcall_client::events::StreamEvent;
use rollcall_core::attendance::ShiftSnapshot;
use rollcall_core::event::{AttendanceEvent, CheckinPayload};
use rollcall_core::link::{LinkSignal, LinkState};
use rollcall_core::types::ShiftId;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::reconciler::{EventDisposition, FetchResolution, FetchTicket, Reconciler};
use crate::source::{ChannelMembership, FetchError, SnapshotSource};

/// Which shift a view follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    /// The shift whose round is running now.
    #[default]
    Latest,
    /// The shift of the most recently completed round.
    Previous,
}

impl ViewMode {
    /// Lowercase name, as accepted by `VIEW_MODE`.
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Latest => "latest",
            ViewMode::Previous => "previous",
        }
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(ViewMode::Latest),
            "previous" => Ok(ViewMode::Previous),
            other => Err(format!("unknown view mode '{other}'")),
        }
    }
}

/// Everything a reader of a live view may observe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveState {
    pub active_shift: Option<ShiftId>,
    pub snapshot: Option<ShiftSnapshot>,
    /// User-visible message from the last failed read.
    pub error: Option<String>,
    pub loading: bool,
    pub link: LinkState,
}

enum Completion {
    Snapshot {
        ticket: FetchTicket,
        result: Result<ShiftSnapshot, FetchError>,
    },
    Discovered {
        generation: u64,
        force: bool,
        result: Result<Option<ShiftId>, FetchError>,
    },
}

pub struct LiveView<S: SnapshotSource, M: ChannelMembership> {
    mode: ViewMode,
    source: Arc<S>,
    membership: M,
    reconciler: Reconciler,
    link: LinkState,
    /// Bumped on every discovery and explicit activation; only the
    /// latest discovery may act on its result.
    discovery: u64,
    discovering: bool,
    outstanding: usize,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    state_tx: watch::Sender<LiveState>,
}

impl<S: SnapshotSource, M: ChannelMembership> LiveView<S, M> {
    pub fn new(mode: ViewMode, source: Arc<S>, membership: M) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(LiveState::default());
        Self {
            mode,
            source,
            membership,
            reconciler: Reconciler::new(),
            link: LinkState::Disconnected,
            discovery: 0,
            discovering: false,
            outstanding: 0,
            completion_tx,
            completion_rx,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state_tx.subscribe()
    }

    /// The state most recently published to subscribers.
    pub fn state(&self) -> LiveState {
        self.state_tx.borrow().clone()
    }

    /// Follow `shift_id`, fetching its snapshot unless it is already held.
    pub fn activate(&mut self, shift_id: &str) {
        self.discovery += 1;
        self.discovering = false;
        self.start_activation(shift_id, false);
    }

    /// Ask the source which shift this view should follow.
    pub fn discover(&mut self) {
        self.spawn_discovery(false);
    }

    pub fn on_round_started(&mut self, shift_id: &str) {
        match self.mode {
            ViewMode::Latest => {
                if self.reconciler.active_shift() == Some(shift_id) {
                    // A new round of the held shift changes the counted round.
                    self.start_activation(shift_id, true);
                } else {
                    self.activate(shift_id);
                }
            }
            ViewMode::Previous => self.spawn_discovery(true),
        }
    }

    /// The stream is open again: re-declare channels and resync.
    pub fn on_connection_opened(&mut self) {
        self.link = self.link.on(LinkSignal::Dial).on(LinkSignal::Opened);
        self.membership.join_dashboards();

        let active = self.reconciler.active_shift().map(str::to_string);
        match (self.mode, active) {
            (ViewMode::Latest, Some(shift_id)) => self.start_activation(&shift_id, true),
            _ => self.spawn_discovery(true),
        }
        self.publish();
    }

    pub fn on_connection_lost(&mut self) {
        self.link = self.link.on(LinkSignal::Lost).on(LinkSignal::Dial);
        tracing::info!(
            shift_id = self.reconciler.active_shift().unwrap_or("-"),
            "Event stream lost, snapshot may be stale until resync",
        );
        self.publish();
    }

    /// Validate a raw check-in payload and apply it.
    pub fn apply_payload(&mut self, payload: CheckinPayload) {
        match AttendanceEvent::try_from(payload) {
            Ok(event) => {
                self.apply_event(&event);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Discarding malformed check-in event");
            }
        }
    }

    pub fn apply_event(&mut self, event: &AttendanceEvent) -> EventDisposition {
        let disposition = self.reconciler.apply_event(event);
        match disposition {
            EventDisposition::Applied { counts_changed } => {
                tracing::debug!(
                    shift_id = %event.shift_id,
                    user_id = %event.user_id,
                    round = event.round.number(),
                    status = %event.status,
                    counts_changed,
                    "Applied check-in event",
                );
                self.publish();
            }
            other => {
                tracing::debug!(
                    shift_id = %event.shift_id,
                    user_id = %event.user_id,
                    round = event.round.number(),
                    reason = ?other,
                    "Discarding check-in event",
                );
            }
        }
        disposition
    }

    pub fn deactivate(&mut self) {
        self.discovery += 1;
        self.discovering = false;
        self.reconciler.deactivate();
        self.publish();
    }

    /// Forced resync of the active shift, or discovery when none is held.
    pub fn refresh(&mut self) {
        match self.reconciler.active_shift().map(str::to_string) {
            Some(shift_id) if self.mode == ViewMode::Latest => {
                self.start_activation(&shift_id, true);
            }
            _ => self.spawn_discovery(true),
        }
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => self.on_connection_opened(),
            StreamEvent::Disconnected => self.on_connection_lost(),
            StreamEvent::RoundStarted { shift_id } => self.on_round_started(&shift_id),
            StreamEvent::CheckinUpdated(payload) => self.apply_payload(payload),
        }
    }

    /// Process events and fetch completions until `cancel` fires or the
    /// event stream ends.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<StreamEvent>,
        refresh_interval: Option<Duration>,
        cancel: CancellationToken,
    ) {
        let mut refresh_timer = refresh_interval.map(|period| {
            let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        tracing::info!(mode = self.mode.as_str(), "Live view started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Live view shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_stream_event(event),
                    None => {
                        tracing::info!("Event stream closed, stopping live view");
                        break;
                    }
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.outstanding = self.outstanding.saturating_sub(1);
                    self.handle_completion(completion);
                }
                _ = tick(&mut refresh_timer) => {
                    tracing::debug!("Periodic refresh");
                    self.refresh();
                }
            }
        }
    }

    /// Wait until every spawned fetch has reported back and been applied.
    ///
    /// For driving a view without [`LiveView::run`].
    pub async fn settle(&mut self) {
        while self.outstanding > 0 {
            let Some(completion) = self.completion_rx.recv().await else {
                break;
            };
            self.outstanding -= 1;
            self.handle_completion(completion);
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot { ticket, result } => self.handle_snapshot(ticket, result),
            Completion::Discovered {
                generation,
                force,
                result,
            } => self.handle_discovery(generation, force, result),
        }
    }

    fn handle_snapshot(&mut self, ticket: FetchTicket, result: Result<ShiftSnapshot, FetchError>) {
        match self.reconciler.complete_fetch(&ticket, result) {
            FetchResolution::Replaced { deduped, drift } => {
                if deduped > 0 {
                    tracing::warn!(shift_id = %ticket.shift_id, deduped, "Dropped duplicate rows from snapshot");
                }
                if let Some(tally) = drift {
                    tracing::warn!(
                        shift_id = %ticket.shift_id,
                        tally = ?tally,
                        "Snapshot counts disagree with its rows",
                    );
                }
                tracing::info!(shift_id = %ticket.shift_id, "Snapshot loaded");
                self.link = self.link.on(LinkSignal::Resynced);
            }
            FetchResolution::Failed(message) => {
                tracing::warn!(shift_id = %ticket.shift_id, error = %message, "Snapshot fetch failed");
            }
            FetchResolution::Stale => {
                tracing::debug!(shift_id = %ticket.shift_id, ticket = ticket.id, "Discarding stale snapshot");
                return;
            }
        }
        self.publish();
    }

    fn handle_discovery(
        &mut self,
        generation: u64,
        force: bool,
        result: Result<Option<ShiftId>, FetchError>,
    ) {
        if generation != self.discovery {
            tracing::debug!(generation, "Discarding stale discovery result");
            return;
        }
        self.discovering = false;

        match result {
            Ok(Some(shift_id)) => {
                tracing::info!(shift_id = %shift_id, mode = self.mode.as_str(), "Discovered active shift");
                self.start_activation(&shift_id, force);
            }
            Ok(None) => {
                tracing::info!(mode = self.mode.as_str(), "No active shift");
                self.reconciler.deactivate();
                self.link = self.link.on(LinkSignal::Resynced);
            }
            Err(e) => {
                tracing::warn!(error = %e, mode = self.mode.as_str(), "Shift discovery failed");
                self.reconciler.set_error(e.to_string());
            }
        }
        self.publish();
    }

    /// Declare the shift channel and start a fetch when one is due.
    fn start_activation(&mut self, shift_id: &str, force: bool) {
        self.membership.join_shift(shift_id);
        let Some(ticket) = self.reconciler.begin_activate(shift_id, force) else {
            tracing::debug!(shift_id, force, "Activation already satisfied");
            return;
        };
        tracing::debug!(shift_id, ticket = ticket.id, force, "Fetching snapshot");

        let source = Arc::clone(&self.source);
        let tx = self.completion_tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let result = source.fetch_snapshot(&ticket.shift_id).await;
            let _ = tx.send(Completion::Snapshot { ticket, result });
        });
        self.publish();
    }

    fn spawn_discovery(&mut self, force: bool) {
        self.discovery += 1;
        self.discovering = true;
        let generation = self.discovery;
        let mode = self.mode;
        let source = Arc::clone(&self.source);
        let tx = self.completion_tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let result = match mode {
                ViewMode::Latest => source.fetch_current_round().await,
                ViewMode::Previous => source.fetch_previous_round().await,
            };
            let _ = tx.send(Completion::Discovered {
                generation,
                force,
                result,
            });
        });
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(LiveState {
            active_shift: self.reconciler.active_shift().map(str::to_string),
            snapshot: self.reconciler.snapshot().cloned(),
            error: self.reconciler.error().map(str::to_string),
            loading: self.reconciler.is_loading() || self.discovering,
            link: self.link,
        });
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
