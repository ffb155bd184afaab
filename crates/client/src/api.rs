//! REST API client for the attendance admin endpoints.
//!
//! Wraps the backend HTTP API (round discovery, live snapshots, roster
//! listings, check-in images, messaging hook) using [`reqwest`].

use std::time::Duration;

use reqwest::{StatusCode, Url};
use rollcall_core::attendance::ShiftSnapshot;

use crate::models::{
    AbsenceResponse, ActiveRound, CheckinImagesResponse, HookRequest, HookResponse,
    RoundResponse, RosterResponse,
};

/// Default request timeout, matching the dashboard's HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for one admin backend.
#[derive(Clone)]
pub struct AdminApi {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the admin REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum AdminApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered 404 for the requested resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend returned any other non-2xx status code.
    #[error("Admin API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The request was rejected locally before any I/O.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AdminApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:3500`.
    /// * `timeout`  - per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AdminApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Discover the shift whose round is currently running.
    ///
    /// Sends `GET /admin/round`. `Ok(None)` means no round is active.
    pub async fn fetch_current_round(&self) -> Result<Option<ActiveRound>, AdminApiError> {
        let body: RoundResponse = self.get_json(&["admin", "round"], &[]).await?;
        Ok(body.active)
    }

    /// Discover the most recently completed round.
    ///
    /// Sends `GET /admin/previous`.
    pub async fn fetch_previous_round(&self) -> Result<Option<ActiveRound>, AdminApiError> {
        let body: RoundResponse = self.get_json(&["admin", "previous"], &[]).await?;
        Ok(body.active)
    }

    /// Fetch the full attendance snapshot for one shift.
    ///
    /// Sends `GET /admin/latest?shiftId=...`.
    pub async fn fetch_snapshot(&self, shift_id: &str) -> Result<ShiftSnapshot, AdminApiError> {
        self.get_json(&["admin", "latest"], &[("shiftId", shift_id)]).await
    }

    /// Fetch the multi-shift dashboard listing, optionally filtered.
    pub async fn fetch_dashboard(
        &self,
        shift_id: Option<&str>,
    ) -> Result<RosterResponse, AdminApiError> {
        self.get_json(&["admin", "dashboard"], &shift_filter(shift_id)).await
    }

    /// Fetch the day's attendance records, optionally filtered by shift.
    pub async fn fetch_daily(&self, shift_id: Option<&str>) -> Result<RosterResponse, AdminApiError> {
        self.get_json(&["admin", "daily"], &shift_filter(shift_id)).await
    }

    /// Fetch today's absence roster.
    pub async fn fetch_absence(&self) -> Result<AbsenceResponse, AdminApiError> {
        self.get_json(&["admin", "absence"], &[]).await
    }

    /// Fetch the full-resolution images of one check-in.
    ///
    /// `checkin_id` is sent as a single percent-encoded path segment.
    pub async fn fetch_checkin_images(&self, checkin_id: &str) -> Result<Vec<String>, AdminApiError> {
        let body: CheckinImagesResponse = self
            .get_json(&["admin", "checkins", checkin_id, "images"], &[])
            .await?;
        Ok(body.images.into_iter().filter(|img| !img.is_empty()).collect())
    }

    /// Register the messaging webhook.
    ///
    /// Blank fields are rejected before the request is sent.
    pub async fn set_hook(&self, request: &HookRequest) -> Result<HookResponse, AdminApiError> {
        let request = request.trimmed();
        if let Some(field) = request.blank_field() {
            return Err(AdminApiError::InvalidRequest(format!("`{field}` must not be blank")));
        }

        let response = self
            .client
            .post(self.endpoint(&["hook"])?)
            .json(&request)
            .send()
            .await?;

        let response = Self::ensure_success(response, "/hook").await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(HookResponse::default());
        }
        serde_json::from_str(&body).map_err(|e| AdminApiError::ApiError {
            status: StatusCode::OK.as_u16(),
            body: format!("unreadable hook response: {e}"),
        })
    }

    // ---- private helpers ----

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, AdminApiError> {
        let path = format!("/{}", segments.join("/"));
        tracing::debug!(path = %path, "Admin API request");
        let response = self
            .client
            .get(self.endpoint(segments)?)
            .query(query)
            .send()
            .await?;

        let response = Self::ensure_success(response, &path).await?;
        Ok(response.json::<T>().await?)
    }

    /// Base URL extended by `segments`, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AdminApiError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            AdminApiError::InvalidRequest(format!("bad base URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                AdminApiError::InvalidRequest(format!("base URL {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code. 404 becomes
    /// [`AdminApiError::NotFound`]; any other failure carries the body.
    async fn ensure_success(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, AdminApiError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AdminApiError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AdminApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn shift_filter(shift_id: Option<&str>) -> Vec<(&'static str, &str)> {
    shift_id
        .filter(|id| !id.is_empty())
        .map(|id| vec![("shiftId", id)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = AdminApi::with_client(reqwest::Client::new(), "http://localhost:3500/");
        assert_eq!(api.base_url(), "http://localhost:3500");
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let api = AdminApi::with_client(reqwest::Client::new(), "http://localhost:3500/api/");
        let url = api.endpoint(&["admin", "checkins", "a/b?x", "images"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3500/api/admin/checkins/a%2Fb%3Fx/images"
        );
    }

    #[test]
    fn unparsable_base_url_is_an_invalid_request() {
        let api = AdminApi::with_client(reqwest::Client::new(), "not a url");
        assert_matches!(api.endpoint(&["hook"]), Err(AdminApiError::InvalidRequest(_)));
    }

    #[test]
    fn empty_shift_filter_is_dropped() {
        assert!(shift_filter(None).is_empty());
        assert!(shift_filter(Some("")).is_empty());
        assert_eq!(shift_filter(Some("S1")), vec![("shiftId", "S1")]);
    }

    #[tokio::test]
    async fn blank_hook_fields_fail_before_sending() {
        // Port 9 (discard) is never contacted because validation fails first.
        let api = AdminApi::with_client(reqwest::Client::new(), "http://127.0.0.1:9");
        let request = HookRequest {
            bot_name: "bot".into(),
            bot_token: "token".into(),
            webhook_secret: " ".into(),
            webhook_url: "https://example.test/hook".into(),
        };

        let result = api.set_hook(&request).await;

        assert_matches!(result, Err(AdminApiError::InvalidRequest(msg)) if msg.contains("webhookSecret"));
    }
}
