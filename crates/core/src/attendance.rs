//! Per-shift attendance snapshot and the rules for patching it.
//!
//! A [`ShiftSnapshot`] is created from a full `GET /admin/latest` response
//! and afterwards only changes through [`ShiftSnapshot::apply`]. Rows are
//! never inserted or removed by events; the row set only changes when the
//! whole snapshot is replaced.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::event::{opaque_id, AttendanceEvent};
use crate::status::{Round, RoundStatus};
use crate::types::{ShiftId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// RoundState / AttendanceRow
// ---------------------------------------------------------------------------

/// One user's state within one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    #[serde(default)]
    pub status: RoundStatus,
    /// Image references in capture order.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub images: Vec<String>,
    #[serde(default)]
    pub checkin_time: Option<String>,
    /// Opaque key for fetching full-resolution images.
    #[serde(default, deserialize_with = "opaque_id", skip_serializing_if = "Option::is_none")]
    pub checkin_id: Option<String>,
}

impl RoundState {
    /// Parsed check-in time, if present and RFC 3339.
    pub fn checked_in_at(&self) -> Option<Timestamp> {
        parse_timestamp(self.checkin_time.as_deref())
    }

    /// Merge an event into this state.
    ///
    /// The status is always replaced; images and check-in details only
    /// when the event carries them.
    fn merge(&mut self, event: &AttendanceEvent) {
        self.status = event.status;
        if let Some(images) = &event.images {
            self.images = images.clone();
        }
        if let Some(checkin_id) = &event.checkin_id {
            self.checkin_id = Some(checkin_id.clone());
        }
        if let Some(checkin_time) = &event.checkin_time {
            self.checkin_time = Some(checkin_time.clone());
        }
    }
}

/// One user's row in a shift snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website_name: Option<String>,
    /// Shift label as displayed next to the name.
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub round1: RoundState,
    #[serde(default)]
    pub round2: RoundState,
}

impl AttendanceRow {
    pub fn round(&self, round: Round) -> &RoundState {
        match round {
            Round::First => &self.round1,
            Round::Second => &self.round2,
        }
    }

    fn round_mut(&mut self, round: Round) -> &mut RoundState {
        match round {
            Round::First => &mut self.round1,
            Round::Second => &mut self.round2,
        }
    }
}

// ---------------------------------------------------------------------------
// StatusCounts
// ---------------------------------------------------------------------------

/// Aggregate number of users per counted status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub pending: u32,
    #[serde(default)]
    pub late: u32,
    #[serde(default)]
    pub absent: u32,
}

impl StatusCounts {
    /// Count `round` statuses across `rows`.
    pub fn tally<'a>(rows: impl IntoIterator<Item = &'a AttendanceRow>, round: Round) -> Self {
        let mut counts = Self::default();
        for row in rows {
            if let Some(slot) = counts.slot_mut(row.round(round).status) {
                *slot += 1;
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.success + self.pending + self.late + self.absent
    }

    /// Move one user from `from` to `to`.
    ///
    /// Zero delta when the statuses are equal. The decrement is floored
    /// at zero so drift in server-provided counts never underflows.
    pub fn transfer(&mut self, from: RoundStatus, to: RoundStatus) -> bool {
        if from == to {
            return false;
        }
        if let Some(slot) = self.slot_mut(from) {
            *slot = slot.saturating_sub(1);
        }
        if let Some(slot) = self.slot_mut(to) {
            *slot += 1;
        }
        from.is_counted() || to.is_counted()
    }

    fn slot_mut(&mut self, status: RoundStatus) -> Option<&mut u32> {
        match status {
            RoundStatus::Success => Some(&mut self.success),
            RoundStatus::Pending => Some(&mut self.pending),
            RoundStatus::Late => Some(&mut self.late),
            RoundStatus::Absent => Some(&mut self.absent),
            RoundStatus::None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ShiftSnapshot
// ---------------------------------------------------------------------------

/// Identity and timing of the round a snapshot describes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub shift_id: ShiftId,
    #[serde(default)]
    pub shift_name: String,
    #[serde(default)]
    pub shift_time: String,
    #[serde(default)]
    pub round: Option<i64>,
    #[serde(default)]
    pub start_at: Option<String>,
    /// Round close time (start plus the ten-minute window).
    #[serde(default, rename = "endAt10")]
    pub end_at: Option<String>,
}

impl SnapshotMeta {
    pub fn starts_at(&self) -> Option<Timestamp> {
        parse_timestamp(self.start_at.as_deref())
    }

    pub fn ends_at(&self) -> Option<Timestamp> {
        parse_timestamp(self.end_at.as_deref())
    }
}

/// The full attendance table for one shift's current round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftSnapshot {
    pub meta: SnapshotMeta,
    #[serde(default)]
    pub counts: StatusCounts,
    #[serde(default)]
    pub rows: Vec<AttendanceRow>,
}

/// Result of applying one [`AttendanceEvent`] to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The row was updated.
    Applied {
        previous: RoundStatus,
        counts_changed: bool,
    },
    /// The event belongs to a different shift.
    WrongShift,
    /// No row with the event's user id exists.
    UnknownUser,
}

impl ShiftSnapshot {
    pub fn shift_id(&self) -> &str {
        &self.meta.shift_id
    }

    /// The round whose statuses the aggregate counts describe.
    ///
    /// Falls back to round one when the backend reports no round (or a
    /// number outside 1..=2).
    pub fn counted_round(&self) -> Round {
        self.meta
            .round
            .and_then(|n| Round::try_from(n).ok())
            .unwrap_or(Round::First)
    }

    pub fn row(&self, user_id: &str) -> Option<&AttendanceRow> {
        self.rows.iter().find(|row| row.user_id == user_id)
    }

    /// Drop rows whose user id already appeared earlier in the list.
    ///
    /// Each dropped row is also taken out of the counts (its counted-round
    /// status moves to `None`), since the server counted it. Returns the
    /// number of rows removed.
    pub fn dedupe_rows(&mut self) -> usize {
        let counted = self.counted_round();
        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut dropped = Vec::new();
        self.rows.retain(|row| {
            let first = seen.insert(row.user_id.clone());
            if !first {
                dropped.push(row.round(counted).status);
            }
            first
        });
        for status in &dropped {
            self.counts.transfer(*status, RoundStatus::None);
        }
        dropped.len()
    }

    /// Compare the held counts against a tally of the counted round.
    ///
    /// Returns the tally when they disagree.
    pub fn count_drift(&self) -> Option<StatusCounts> {
        let tally = StatusCounts::tally(&self.rows, self.counted_round());
        (tally != self.counts).then_some(tally)
    }

    /// Patch one row from an event.
    pub fn apply(&mut self, event: &AttendanceEvent) -> ApplyOutcome {
        if event.shift_id != self.meta.shift_id {
            return ApplyOutcome::WrongShift;
        }
        let counted = self.counted_round();
        let Some(row) = self.rows.iter_mut().find(|row| row.user_id == event.user_id) else {
            return ApplyOutcome::UnknownUser;
        };

        let state = row.round_mut(event.round);
        let previous = state.status;
        state.merge(event);

        let counts_changed = event.round == counted && self.counts.transfer(previous, event.status);
        ApplyOutcome::Applied {
            previous,
            counts_changed,
        }
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<Timestamp> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

fn nullable_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
