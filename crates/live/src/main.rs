//! `rollcall-watch` -- headless live attendance view.
//!
//! Connects to the admin backend's REST API and event stream, follows
//! the latest (or previous) round and logs a one-line summary every time
//! the reconciled state changes.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default                 | Description                     |
//! |-------------------------|----------|-------------------------|---------------------------------|
//! | `API_BASE_URL`          | no       | `http://localhost:3500` | REST base URL                   |
//! | `STREAM_URL`            | no       | `API_BASE_URL`          | Socket.IO base URL              |
//! | `VIEW_MODE`             | no       | `latest`                | `latest` or `previous`          |
//! | `REQUEST_TIMEOUT_SECS`  | no       | `20`                    | HTTP timeout                    |
//! | `REFRESH_INTERVAL_SECS` | no       | off                     | Seconds between forced resyncs  |

use std::sync::Arc;

use rollcall_client::api::AdminApi;
use rollcall_client::client::StreamClient;
use rollcall_client::reconnect::ReconnectConfig;
use rollcall_client::stream::EventStream;
use rollcall_live::config::WatchConfig;
use rollcall_live::view::{LiveState, LiveView};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_live=info,rollcall_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env()?;

    tracing::info!(
        api = %config.api_base_url,
        stream = %config.stream_url,
        mode = config.view_mode.as_str(),
        "Starting rollcall-watch",
    );

    let api = Arc::new(AdminApi::new(&config.api_base_url, config.request_timeout)?);
    let (stream, events) = EventStream::start(
        StreamClient::new(config.stream_url.clone()),
        ReconnectConfig::default(),
    );
    let stream = Arc::new(stream);
    stream.join_dashboards();

    let mut view = LiveView::new(config.view_mode, api, Arc::clone(&stream));
    let summary = tokio::spawn(log_summaries(view.subscribe()));
    // Load over REST without waiting for the stream to open.
    view.discover();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C");
        }
        ctrl_c.cancel();
    });

    view.run(events, config.refresh_interval, cancel).await;
    let _ = summary.await;

    match Arc::try_unwrap(stream) {
        Ok(stream) => stream.shutdown().await,
        Err(_) => tracing::warn!("Event stream still referenced at exit"),
    }

    tracing::info!("rollcall-watch stopped");
    Ok(())
}

/// Log one line per published state until the view goes away.
async fn log_summaries(mut rx: watch::Receiver<LiveState>) {
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        let link = format!("{:?}", state.link);

        match &state.snapshot {
            Some(snapshot) => {
                let counts = &snapshot.counts;
                tracing::info!(
                    shift_id = snapshot.shift_id(),
                    shift = %snapshot.meta.shift_name,
                    round = snapshot.counted_round().number(),
                    users = snapshot.rows.len(),
                    success = counts.success,
                    pending = counts.pending,
                    late = counts.late,
                    absent = counts.absent,
                    link = %link,
                    stream_open = state.link.is_open(),
                    loading = state.loading,
                    error = state.error.as_deref().unwrap_or("-"),
                    "Attendance",
                );
            }
            None => {
                tracing::info!(
                    shift_id = state.active_shift.as_deref().unwrap_or("-"),
                    link = %link,
                    stream_open = state.link.is_open(),
                    loading = state.loading,
                    error = state.error.as_deref().unwrap_or("-"),
                    "No snapshot held",
                );
            }
        }
    }
}
