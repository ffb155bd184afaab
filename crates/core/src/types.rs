/// Shift identifiers are opaque strings assigned by the backend.
pub type ShiftId = String;

/// User identifiers are opaque strings assigned by the backend.
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
