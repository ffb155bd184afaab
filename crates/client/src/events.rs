//! Events delivered by the [`EventStream`](crate::stream::EventStream)
//! to its consumer.
//!
//! These are the transport-independent signals a live view reacts to.
//! Raw frames are interpreted by the stream before anything is emitted
//! here.

use rollcall_core::event::CheckinPayload;
use rollcall_core::types::ShiftId;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The connection opened and every desired channel was re-joined.
    Connected,

    /// The connection dropped; a reconnect is in progress.
    Disconnected,

    /// A new round began for `shift_id`.
    RoundStarted { shift_id: ShiftId },

    /// One user's check-in changed. Validation happens in the consumer.
    CheckinUpdated(CheckinPayload),
}
