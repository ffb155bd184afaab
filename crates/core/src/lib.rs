//! Domain model and merge rules for live attendance views.
//!
//! Everything in this crate is synchronous and free of I/O so the
//! reconciliation rules can be exercised directly from tests.

pub mod attendance;
pub mod error;
pub mod event;
pub mod link;
pub mod status;
pub mod types;
