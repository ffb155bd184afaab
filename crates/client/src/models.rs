//! Response and request bodies of the admin REST endpoints.
//!
//! The live snapshot itself is [`rollcall_core::attendance::ShiftSnapshot`];
//! the types here cover round discovery and the read-only listings used by
//! the dashboard, daily and absence screens.

use serde::{Deserialize, Serialize};

use rollcall_core::attendance::RoundState;
use rollcall_core::types::{ShiftId, UserId};

// ---------------------------------------------------------------------------
// Round discovery
// ---------------------------------------------------------------------------

/// The shift whose round is currently (or was most recently) running.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRound {
    pub shift_id: ShiftId,
    #[serde(default)]
    pub shift_name: Option<String>,
    #[serde(default)]
    pub round: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `GET /admin/round` and `GET /admin/previous`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoundResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub active: Option<ActiveRound>,
}

// ---------------------------------------------------------------------------
// Dashboard / daily listings
// ---------------------------------------------------------------------------

/// Why a user is excused for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceType {
    Dayoff,
    Sick,
    Personal,
}

/// One user's attendance in a dashboard or daily listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub website_name: Option<String>,
    pub shift_id: ShiftId,
    #[serde(default)]
    pub shift_name: String,
    #[serde(default)]
    pub round1: RoundState,
    #[serde(default)]
    pub round2: RoundState,
    /// Only present on the dashboard listing.
    #[serde(default)]
    pub remark: Option<AbsenceType>,
}

/// Shift summary heading a roster listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterShift {
    pub shift_id: ShiftId,
    #[serde(default)]
    pub shift_name: String,
    #[serde(default)]
    pub shift_time: String,
    #[serde(default)]
    pub user_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterMeta {
    #[serde(default)]
    pub server_time: Option<String>,
}

/// Body of `GET /admin/dashboard` and `GET /admin/daily`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterResponse {
    #[serde(default)]
    pub ok: bool,
    pub meta: RosterMeta,
    #[serde(default)]
    pub total_users: u32,
    #[serde(default)]
    pub shifts: Vec<RosterShift>,
    #[serde(default)]
    pub rows: Vec<RosterRow>,
}

// ---------------------------------------------------------------------------
// Absence roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AbsenceDate {
    pub y: i32,
    pub m: u32,
    pub day: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AbsenceCounts {
    #[serde(default)]
    pub dayoff: u32,
    #[serde(default)]
    pub sick: u32,
    #[serde(default)]
    pub personal: u32,
}

/// A user excused for the day, with the reason.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceRow {
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub website_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: AbsenceType,
    #[serde(default)]
    pub note: Option<String>,
}

/// Body of `GET /admin/absence`.
#[derive(Debug, Clone, Deserialize)]
pub struct AbsenceResponse {
    #[serde(default)]
    pub ok: bool,
    pub date: AbsenceDate,
    #[serde(default)]
    pub counts: AbsenceCounts,
    #[serde(default)]
    pub rows: Vec<AbsenceRow>,
}

// ---------------------------------------------------------------------------
// Check-in images / messaging hook
// ---------------------------------------------------------------------------

/// Body of `GET /admin/checkins/:id/images`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckinImagesResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Body of `POST /hook`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRequest {
    pub bot_name: String,
    pub bot_token: String,
    pub webhook_secret: String,
    pub webhook_url: String,
}

impl HookRequest {
    /// Name of the first blank field, if any.
    pub fn blank_field(&self) -> Option<&'static str> {
        [
            ("botName", &self.bot_name),
            ("botToken", &self.bot_token),
            ("webhookSecret", &self.webhook_secret),
            ("webhookUrl", &self.webhook_url),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }

    /// Copy with surrounding whitespace removed from every field.
    pub fn trimmed(&self) -> Self {
        Self {
            bot_name: self.bot_name.trim().to_string(),
            bot_token: self.bot_token.trim().to_string(),
            webhook_secret: self.webhook_secret.trim().to_string(),
            webhook_url: self.webhook_url.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_response_with_null_active() {
        let body: RoundResponse = serde_json::from_str(r#"{"ok":true,"active":null}"#).unwrap();
        assert!(body.ok);
        assert!(body.active.is_none());
    }

    #[test]
    fn round_response_with_active_shift() {
        let body: RoundResponse = serde_json::from_str(
            r#"{"ok":true,"active":{"shiftId":"S9","shiftName":"Night","round":2,"createdAt":"2026-01-05T13:00:00Z"}}"#,
        )
        .unwrap();
        let active = body.active.unwrap();
        assert_eq!(active.shift_id, "S9");
        assert_eq!(active.round, Some(2));
    }

    #[test]
    fn dashboard_row_carries_remark() {
        let body: RosterResponse = serde_json::from_value(serde_json::json!({
            "ok": true,
            "meta": { "serverTime": "2026-01-05T08:00:00Z" },
            "totalUsers": 1,
            "shifts": [{ "shiftId": "S1", "shiftName": "Morning", "shiftTime": "08:00", "userCount": 1 }],
            "rows": [{
                "userId": "u1", "name": "Anan", "shiftId": "S1", "shiftName": "Morning",
                "round1": { "status": "success", "images": ["a.jpg"], "checkinTime": null },
                "round2": { "status": "none", "images": [], "checkinTime": null },
                "remark": "sick"
            }]
        }))
        .unwrap();
        assert_eq!(body.rows[0].remark, Some(AbsenceType::Sick));
        assert_eq!(body.shifts[0].user_count, 1);
    }

    #[test]
    fn absence_row_type_field() {
        let body: AbsenceResponse = serde_json::from_value(serde_json::json!({
            "ok": true,
            "date": { "y": 2026, "m": 1, "day": 5 },
            "counts": { "dayoff": 1, "sick": 0, "personal": 0 },
            "rows": [{ "userId": "u4", "name": "Dao", "profileUrl": null, "websiteName": null, "type": "dayoff" }]
        }))
        .unwrap();
        assert_eq!(body.rows[0].kind, AbsenceType::Dayoff);
        assert_eq!(body.counts.dayoff, 1);
    }

    #[test]
    fn hook_request_detects_blank_fields() {
        let request = HookRequest {
            bot_name: "attendance-bot".into(),
            bot_token: "  ".into(),
            webhook_secret: "s3cret".into(),
            webhook_url: "https://example.test/admin/telegram/webhook".into(),
        };
        assert_eq!(request.blank_field(), Some("botToken"));
    }

    #[test]
    fn hook_request_serializes_camel_case() {
        let request = HookRequest {
            bot_name: " bot ".into(),
            bot_token: "t".into(),
            webhook_secret: "s".into(),
            webhook_url: "u".into(),
        }
        .trimmed();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["botName"], "bot");
        assert_eq!(json["webhookSecret"], "s");
    }
}
