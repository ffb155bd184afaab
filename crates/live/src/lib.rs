//! Live attendance views.
//!
//! [`view::LiveView`] holds one shift's attendance snapshot, patches it
//! from push events and resyncs it on round changes and reconnects.
//! [`reconciler::Reconciler`] is the synchronous state machine underneath;
//! [`source`] defines the seams to the REST API and the event stream.

pub mod config;
pub mod reconciler;
pub mod source;
pub mod view;
