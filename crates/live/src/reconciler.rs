//! Synchronous reconciliation state machine.
//!
//! [`Reconciler`] owns the active shift id, the held snapshot and the
//! bookkeeping for the one fetch that may be in flight. It performs no
//! I/O: callers start a fetch when [`Reconciler::begin_activate`] hands
//! out a [`FetchTicket`] and report back through
//! [`Reconciler::complete_fetch`]. A result whose ticket is no longer the
//! outstanding one is discarded, which is how switching shifts cancels
//! the relevance of an earlier fetch.

use rollcall_core::attendance::{ApplyOutcome, ShiftSnapshot, StatusCounts};
use rollcall_core::event::AttendanceEvent;
use rollcall_core::types::ShiftId;

use crate::source::FetchError;

/// Claim on the result of one snapshot fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: u64,
    pub shift_id: ShiftId,
}

/// What happened to a fetch result.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResolution {
    /// The held snapshot was replaced wholesale.
    Replaced {
        /// Duplicate rows dropped from the response.
        deduped: usize,
        /// Tally of the counted round when the server counts disagree.
        drift: Option<StatusCounts>,
    },
    /// The fetch failed; a snapshot of the same shift is kept.
    Failed(String),
    /// The result is no longer relevant and was dropped.
    Stale,
}

/// What happened to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Applied { counts_changed: bool },
    NoActiveShift,
    WrongShift,
    /// The held snapshot belongs to a different shift (a switch is in flight).
    NoSnapshot,
    UnknownUser,
}

/// Owner of the active shift, its snapshot and the outstanding fetch ticket.
#[derive(Debug, Default)]
pub struct Reconciler {
    active: Option<ShiftId>,
    snapshot: Option<ShiftSnapshot>,
    in_flight: Option<FetchTicket>,
    next_ticket: u64,
    error: Option<String>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_shift(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn snapshot(&self) -> Option<&ShiftSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Make `shift_id` the active shift.
    ///
    /// Returns a ticket when a fetch must be started. No ticket is issued
    /// while a fetch for the same shift is outstanding, nor (unless
    /// `force`) when a snapshot for that shift is already held.
    pub fn begin_activate(&mut self, shift_id: &str, force: bool) -> Option<FetchTicket> {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|ticket| ticket.shift_id == shift_id)
        {
            return None;
        }

        let holds_snapshot = self.active.as_deref() == Some(shift_id)
            && self
                .snapshot
                .as_ref()
                .is_some_and(|snapshot| snapshot.shift_id() == shift_id);
        if holds_snapshot && !force {
            return None;
        }

        self.active = Some(shift_id.to_string());
        self.next_ticket += 1;
        let ticket = FetchTicket {
            id: self.next_ticket,
            shift_id: shift_id.to_string(),
        };
        self.in_flight = Some(ticket.clone());
        Some(ticket)
    }

    /// Resolve a fetch started from `ticket`.
    pub fn complete_fetch(
        &mut self,
        ticket: &FetchTicket,
        result: Result<ShiftSnapshot, FetchError>,
    ) -> FetchResolution {
        if self.in_flight.as_ref() != Some(ticket) {
            return FetchResolution::Stale;
        }
        self.in_flight = None;
        if self.active.as_deref() != Some(ticket.shift_id.as_str()) {
            return FetchResolution::Stale;
        }

        let mut snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // A snapshot of another shift is no longer a valid stand-in.
                if self
                    .snapshot
                    .as_ref()
                    .is_some_and(|held| held.shift_id() != ticket.shift_id)
                {
                    self.snapshot = None;
                }
                let message = e.to_string();
                self.error = Some(message.clone());
                return FetchResolution::Failed(message);
            }
        };

        if snapshot.meta.shift_id.is_empty() {
            snapshot.meta.shift_id = ticket.shift_id.clone();
        } else if snapshot.meta.shift_id != ticket.shift_id {
            let message = format!(
                "snapshot for shift {} returned shift {}",
                ticket.shift_id, snapshot.meta.shift_id
            );
            self.error = Some(message.clone());
            return FetchResolution::Failed(message);
        }

        let deduped = snapshot.dedupe_rows();
        let drift = snapshot.count_drift();
        self.snapshot = Some(snapshot);
        self.error = None;
        FetchResolution::Replaced { deduped, drift }
    }

    /// Patch the held snapshot from one validated event.
    pub fn apply_event(&mut self, event: &AttendanceEvent) -> EventDisposition {
        let Some(active) = self.active.as_deref() else {
            return EventDisposition::NoActiveShift;
        };
        if event.shift_id != active {
            return EventDisposition::WrongShift;
        }
        let Some(snapshot) = self
            .snapshot
            .as_mut()
            .filter(|snapshot| snapshot.shift_id() == active)
        else {
            return EventDisposition::NoSnapshot;
        };

        match snapshot.apply(event) {
            ApplyOutcome::Applied { counts_changed, .. } => {
                EventDisposition::Applied { counts_changed }
            }
            ApplyOutcome::UnknownUser => EventDisposition::UnknownUser,
            ApplyOutcome::WrongShift => EventDisposition::WrongShift,
        }
    }

    /// Record a failure that is not tied to a snapshot fetch.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Forget the active shift and everything held for it.
    pub fn deactivate(&mut self) {
        self.active = None;
        self.snapshot = None;
        self.in_flight = None;
        self.error = None;
    }
}
