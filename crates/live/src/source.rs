//! Seams between a live view and the outside world.
//!
//! [`SnapshotSource`] is how the view reads snapshots and discovers the
//! active shift; [`ChannelMembership`] is how it declares which push
//! channels it needs. Production code plugs in
//! [`AdminApi`](rollcall_client::api::AdminApi) and
//! [`EventStream`](rollcall_client::stream::EventStream); tests plug in
//! fakes.

use std::sync::Arc;

use async_trait::async_trait;
use rollcall_client::api::{AdminApi, AdminApiError};
use rollcall_client::stream::EventStream;
use rollcall_core::attendance::ShiftSnapshot;
use rollcall_core::types::ShiftId;

/// Errors surfaced to the view when a read fails.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<AdminApiError> for FetchError {
    fn from(err: AdminApiError) -> Self {
        match err {
            AdminApiError::NotFound(path) => FetchError::NotFound(path),
            other => FetchError::Network(other.to_string()),
        }
    }
}

/// Read side of the admin backend used by live views.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch_snapshot(&self, shift_id: &str) -> Result<ShiftSnapshot, FetchError>;

    /// Shift whose round is running now, if any.
    async fn fetch_current_round(&self) -> Result<Option<ShiftId>, FetchError>;

    /// Shift of the most recently completed round, if any.
    async fn fetch_previous_round(&self) -> Result<Option<ShiftId>, FetchError>;
}

#[async_trait]
impl SnapshotSource for AdminApi {
    async fn fetch_snapshot(&self, shift_id: &str) -> Result<ShiftSnapshot, FetchError> {
        Ok(AdminApi::fetch_snapshot(self, shift_id).await?)
    }

    async fn fetch_current_round(&self) -> Result<Option<ShiftId>, FetchError> {
        Ok(AdminApi::fetch_current_round(self)
            .await?
            .map(|active| active.shift_id))
    }

    async fn fetch_previous_round(&self) -> Result<Option<ShiftId>, FetchError> {
        Ok(AdminApi::fetch_previous_round(self)
            .await?
            .map(|active| active.shift_id))
    }
}

/// Desired push-channel membership of a view.
///
/// Calls are declarations, not one-shot emits: the implementation must
/// keep them in effect across reconnects.
pub trait ChannelMembership: Send + Sync {
    fn join_dashboards(&self);
    fn join_shift(&self, shift_id: &str);
}

impl ChannelMembership for EventStream {
    fn join_dashboards(&self) {
        EventStream::join_dashboards(self);
    }

    fn join_shift(&self, shift_id: &str) {
        EventStream::join_shift(self, shift_id);
    }
}

impl<T: ChannelMembership + ?Sized> ChannelMembership for Arc<T> {
    fn join_dashboards(&self) {
        (**self).join_dashboards();
    }

    fn join_shift(&self, shift_id: &str) {
        (**self).join_shift(shift_id);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn not_found_maps_to_not_found() {
        let err = FetchError::from(AdminApiError::NotFound("/admin/latest".into()));
        assert_matches!(err, FetchError::NotFound(path) if path == "/admin/latest");
    }

    #[test]
    fn other_api_errors_map_to_network() {
        let err = FetchError::from(AdminApiError::ApiError {
            status: 502,
            body: "bad gateway".into(),
        });
        assert_matches!(err, FetchError::Network(msg) if msg.contains("502"));
    }
}
