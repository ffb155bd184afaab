//! Check-in status and round number vocabulary.
//!
//! These must match the string values the backend emits in snapshot rows
//! and `checkinUpdated` events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Outcome of one user's check-in for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Success,
    Pending,
    Late,
    Absent,
    /// No round has been opened for this slot yet.
    #[default]
    None,
}

impl RoundStatus {
    pub const ALL: [RoundStatus; 5] = [
        RoundStatus::Success,
        RoundStatus::Pending,
        RoundStatus::Late,
        RoundStatus::Absent,
        RoundStatus::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Success => "success",
            RoundStatus::Pending => "pending",
            RoundStatus::Late => "late",
            RoundStatus::Absent => "absent",
            RoundStatus::None => "none",
        }
    }

    /// Whether this status has a slot in the aggregate counts.
    pub fn is_counted(self) -> bool {
        !matches!(self, RoundStatus::None)
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoundStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown round status '{s}'")))
    }
}

/// One of the two check-in windows of a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Round {
    First,
    Second,
}

impl Round {
    /// `1` or `2`.
    pub fn number(self) -> u8 {
        match self {
            Round::First => 1,
            Round::Second => 2,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<i64> for Round {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Round::First),
            2 => Ok(Round::Second),
            other => Err(CoreError::Validation(format!(
                "round must be 1 or 2, got {other}"
            ))),
        }
    }
}
