//! Partial attendance updates pushed over the event stream.
//!
//! The stream is best-effort, so [`CheckinPayload`] deserializes
//! leniently (every field optional) and [`AttendanceEvent::try_from`]
//! decides whether the update is usable. Rejected payloads are dropped
//! by the caller without touching any state.

use serde::{Deserialize, Deserializer};

use crate::error::CoreError;
use crate::status::{Round, RoundStatus};
use crate::types::{ShiftId, UserId};

/// Raw `checkinUpdated` payload as it arrives on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinPayload {
    #[serde(default)]
    pub shift_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Kept untyped so that `"1"`, `3` or `null` are rejected during
    /// validation instead of failing the whole frame.
    #[serde(default)]
    pub round: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    /// Thumbnail list; preferred over `images` when both are present.
    #[serde(default)]
    pub thumbs: Option<Vec<String>>,
    #[serde(default, deserialize_with = "opaque_id")]
    pub checkin_id: Option<String>,
    #[serde(default)]
    pub checkin_time: Option<String>,
}

/// A validated partial update for one user's round.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceEvent {
    pub shift_id: ShiftId,
    pub user_id: UserId,
    pub round: Round,
    pub status: RoundStatus,
    /// Replacement image list; `None` keeps the images already held.
    pub images: Option<Vec<String>>,
    pub checkin_id: Option<String>,
    pub checkin_time: Option<String>,
}

impl AttendanceEvent {
    pub fn new(
        shift_id: impl Into<ShiftId>,
        user_id: impl Into<UserId>,
        round: Round,
        status: RoundStatus,
    ) -> Self {
        Self {
            shift_id: shift_id.into(),
            user_id: user_id.into(),
            round,
            status,
            images: None,
            checkin_id: None,
            checkin_time: None,
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_checkin(mut self, checkin_id: impl Into<String>, checkin_time: Option<String>) -> Self {
        self.checkin_id = Some(checkin_id.into());
        self.checkin_time = checkin_time;
        self
    }
}

/// Why a [`CheckinPayload`] was not turned into an [`AttendanceEvent`].
#[derive(Debug, thiserror::Error)]
pub enum EventRejection {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl TryFrom<CheckinPayload> for AttendanceEvent {
    type Error = EventRejection;

    fn try_from(payload: CheckinPayload) -> Result<Self, Self::Error> {
        let shift_id = non_empty(payload.shift_id).ok_or(EventRejection::MissingField("shiftId"))?;
        let user_id = non_empty(payload.user_id).ok_or(EventRejection::MissingField("userId"))?;

        let round = match payload.round {
            Some(serde_json::Value::Number(n)) => {
                let raw = n.as_i64().ok_or_else(|| {
                    CoreError::Validation(format!("round must be an integer, got {n}"))
                })?;
                Round::try_from(raw)?
            }
            Some(other) if !other.is_null() => {
                return Err(CoreError::Validation(format!("round must be a number, got {other}")).into());
            }
            _ => return Err(EventRejection::MissingField("round")),
        };

        let status = non_empty(payload.status)
            .ok_or(EventRejection::MissingField("status"))?
            .parse::<RoundStatus>()?;

        Ok(Self {
            shift_id,
            user_id,
            round,
            status,
            images: payload.thumbs.or(payload.images),
            checkin_id: payload.checkin_id.filter(|id| !id.is_empty()),
            checkin_time: payload.checkin_time,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Accept an identifier sent either as a JSON string or a JSON number.
pub(crate) fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
