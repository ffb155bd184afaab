//! Lifecycle of the push-event link as seen by a live view.
//!
//! `Disconnected → Connecting → Joined → Synced`. The stream client drives
//! the first three states; the view promotes `Joined` to `Synced` once its
//! post-connect resync has landed. Any loss of the connection drops back to
//! `Disconnected`, so channel membership and the snapshot must be
//! re-established on every reconnect.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    /// Transport is open and every desired channel has been re-joined.
    Joined,
    /// Joined, and the held snapshot was refreshed after joining.
    Synced,
}

/// Inputs that move the link between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSignal {
    Dial,
    Opened,
    Resynced,
    Lost,
}

impl LinkState {
    /// Next state after `signal`. Signals that make no sense in the
    /// current state leave it unchanged.
    pub fn on(self, signal: LinkSignal) -> LinkState {
        use LinkSignal::*;
        use LinkState::*;

        match (self, signal) {
            (_, Lost) => Disconnected,
            (Disconnected, Dial) => Connecting,
            (Connecting | Joined | Synced, Opened) => Joined,
            (Joined | Synced, Resynced) => Synced,
            (state, _) => state,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, LinkState::Joined | LinkState::Synced)
    }
}
