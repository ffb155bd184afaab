//! Integration tests for `AdminApi` against an in-process HTTP responder.
//!
//! Each responder accepts a single connection, records the request line
//! and body, and answers with a canned status and JSON body. These tests
//! verify request shapes on the wire and how status codes map onto
//! `AdminApiError`.

use std::time::Duration;

use assert_matches::assert_matches;
use rollcall_client::api::{AdminApi, AdminApiError};
use rollcall_client::models::HookRequest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// What the responder saw from the client.
struct Recorded {
    request_line: String,
    body: String,
}

impl Recorded {
    /// Request target, e.g. `/admin/latest?shiftId=S1`.
    fn target(&self) -> &str {
        self.request_line.split_whitespace().nth(1).unwrap_or_default()
    }
}

/// Bind a responder that serves exactly one request with `status` and `body`.
async fn respond_once(status: u16, body: &'static str) -> (AdminApi, JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (mut tcp, _) = tokio::time::timeout(STEP_TIMEOUT, listener.accept())
            .await
            .expect("timed out waiting for client")
            .expect("accept failed");
        let recorded = read_request(&mut tcp).await;

        let response = format!(
            "HTTP/1.1 {status} Canned\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        );
        tcp.write_all(response.as_bytes()).await.unwrap();
        let _ = tcp.shutdown().await;
        recorded
    });

    let api = AdminApi::new(base_url, STEP_TIMEOUT).unwrap();
    (api, task)
}

async fn read_request(tcp: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = tcp.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before finishing the request head");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = tcp.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before finishing the request body");
        buf.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[head_end..head_end + content_length]).into_owned(),
    }
}

async fn recorded(task: JoinHandle<Recorded>) -> Recorded {
    tokio::time::timeout(STEP_TIMEOUT, task)
        .await
        .expect("responder did not finish")
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: snapshot fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_is_requested_by_shift_and_decoded() {
    let (api, server) = respond_once(
        200,
        r#"{
            "ok": true,
            "meta": { "shiftId": "S1", "shiftName": "Morning", "round": 1 },
            "counts": { "success": 1, "pending": 1, "late": 0, "absent": 0 },
            "rows": [
                { "userId": "u1", "name": "Ann", "round1": { "status": "success" }, "round2": { "status": "none" } },
                { "userId": "u2", "name": "Bo", "round1": { "status": "pending" }, "round2": { "status": "none" } }
            ]
        }"#,
    )
    .await;

    let snapshot = api.fetch_snapshot("S1").await.unwrap();

    assert_eq!(snapshot.shift_id(), "S1");
    assert_eq!(snapshot.rows.len(), 2);
    assert_eq!(snapshot.counts.success, 1);
    let seen = recorded(server).await;
    assert!(seen.request_line.starts_with("GET "));
    assert_eq!(seen.target(), "/admin/latest?shiftId=S1");
}

#[tokio::test]
async fn snapshot_404_is_not_found() {
    let (api, server) = respond_once(404, r#"{"ok":false}"#).await;

    let result = api.fetch_snapshot("S404").await;

    assert_matches!(result, Err(AdminApiError::NotFound(path)) if path == "/admin/latest");
    recorded(server).await;
}

#[tokio::test]
async fn snapshot_500_carries_status_and_body() {
    let (api, server) = respond_once(500, r#"{"ok":false,"error":"db down"}"#).await;

    let result = api.fetch_snapshot("S1").await;

    assert_matches!(
        result,
        Err(AdminApiError::ApiError { status: 500, body }) if body.contains("db down")
    );
    recorded(server).await;
}

// ---------------------------------------------------------------------------
// Test: round discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_active_round_is_none() {
    let (api, server) = respond_once(200, r#"{"ok":true,"active":null}"#).await;

    let active = api.fetch_current_round().await.unwrap();

    assert!(active.is_none());
    assert_eq!(recorded(server).await.target(), "/admin/round");
}

#[tokio::test]
async fn active_round_names_its_shift() {
    let (api, server) = respond_once(
        200,
        r#"{"ok":true,"active":{"shiftId":"S7","shiftName":"Night","round":2}}"#,
    )
    .await;

    let active = api.fetch_current_round().await.unwrap().unwrap();

    assert_eq!(active.shift_id, "S7");
    assert_eq!(active.round, Some(2));
    recorded(server).await;
}

#[tokio::test]
async fn previous_round_404_is_not_found() {
    let (api, server) = respond_once(404, "").await;

    let result = api.fetch_previous_round().await;

    assert_matches!(result, Err(AdminApiError::NotFound(path)) if path == "/admin/previous");
    assert_eq!(recorded(server).await.target(), "/admin/previous");
}

#[tokio::test]
async fn previous_round_500_is_an_api_error() {
    let (api, server) = respond_once(500, r#"{"ok":false}"#).await;

    let result = api.fetch_previous_round().await;

    assert_matches!(result, Err(AdminApiError::ApiError { status: 500, .. }));
    recorded(server).await;
}

// ---------------------------------------------------------------------------
// Test: check-in images and messaging hook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkin_id_is_sent_as_one_encoded_segment() {
    let (api, server) = respond_once(200, r#"{"ok":true,"images":["a.jpg","","b.jpg"]}"#).await;

    let images = api.fetch_checkin_images("a/b?x").await.unwrap();

    assert_eq!(images, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    assert_eq!(
        recorded(server).await.target(),
        "/admin/checkins/a%2Fb%3Fx/images"
    );
}

#[tokio::test]
async fn hook_is_posted_as_trimmed_camel_case() {
    let (api, server) = respond_once(200, r#"{"ok":true,"message":"Webhook set"}"#).await;
    let request = HookRequest {
        bot_name: " roll-bot ".into(),
        bot_token: "token-1".into(),
        webhook_secret: "s3cret".into(),
        webhook_url: "https://example.test/hook".into(),
    };

    let response = api.set_hook(&request).await.unwrap();

    assert_eq!(response.ok, Some(true));
    assert_eq!(response.message.as_deref(), Some("Webhook set"));

    let seen = recorded(server).await;
    assert!(seen.request_line.starts_with("POST "));
    assert_eq!(seen.target(), "/hook");
    let body: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "botName": "roll-bot",
            "botToken": "token-1",
            "webhookSecret": "s3cret",
            "webhookUrl": "https://example.test/hook"
        })
    );
}

#[tokio::test]
async fn empty_hook_reply_is_default() {
    let (api, server) = respond_once(200, "").await;
    let request = HookRequest {
        bot_name: "bot".into(),
        bot_token: "token".into(),
        webhook_secret: "secret".into(),
        webhook_url: "https://example.test/hook".into(),
    };

    let response = api.set_hook(&request).await.unwrap();

    assert_eq!(response.ok, None);
    assert_eq!(response.message, None);
    recorded(server).await;
}
