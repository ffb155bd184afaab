//! Backoff schedule for re-establishing the event stream.
//!
//! [`reconnect_loop`] sleeps, dials, and repeats with growing delays
//! (1s, 2s, 4s ... capped at 30s by default) until a session is open or
//! the [`CancellationToken`] fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{StreamClient, StreamConnection};

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before the first redial.
    pub initial_delay: Duration,
    /// Ceiling for the wait between redials.
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// The infinite delay schedule described by this config.
    pub fn schedule(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            next: self.initial_delay.min(self.max_delay),
        }
    }
}

/// Delay that follows `current` under `config`, clamped to `max_delay`.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let millis = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(millis).min(config.max_delay)
}

/// Iterator over successive redial delays. Never ends.
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    config: &'a ReconnectConfig,
    next: Duration,
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = next_delay(current, self.config);
        Some(current)
    }
}

/// Redial `client` until a session opens.
///
/// Returns `None` as soon as `cancel` fires, whether the task is waiting
/// out a delay or in the middle of a handshake.
pub async fn reconnect_loop(
    client: &StreamClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<StreamConnection> {
    for (attempt, delay) in (1u32..).zip(config.schedule()) {
        tracing::info!(
            url = %client.base_url(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Waiting before redialing event stream",
        );

        let dialed = cancel
            .run_until_cancelled(async {
                tokio::time::sleep(delay).await;
                client.connect().await
            })
            .await;

        match dialed {
            None => {
                tracing::info!(url = %client.base_url(), "Redial cancelled");
                return None;
            }
            Some(Ok(conn)) => {
                tracing::info!(attempt, sid = %conn.sid, "Event stream re-established");
                return Some(conn);
            }
            Some(Err(e)) => {
                tracing::warn!(attempt, error = %e, "Redial failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(schedule: impl Iterator<Item = Duration>, n: usize) -> Vec<u64> {
        schedule.take(n).map(|d| d.as_secs()).collect()
    }

    #[test]
    fn default_schedule_doubles_then_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(secs(config.schedule(), 8), vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn initial_delay_above_cap_is_clamped() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(90),
            ..Default::default()
        };
        assert_eq!(secs(config.schedule(), 2), vec![30, 30]);
    }

    #[test]
    fn custom_multiplier_is_respected() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 3.0,
        };
        let millis: Vec<u128> = config.schedule().take(4).map(|d| d.as_millis()).collect();
        assert_eq!(millis, vec![100, 300, 900, 1000]);
    }

    #[tokio::test]
    async fn cancelled_token_returns_none() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = StreamClient::new("ws://127.0.0.1:9");
        let result = reconnect_loop(&client, &ReconnectConfig::default(), &cancel).await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_returns_promptly() {
        let cancel = CancellationToken::new();
        let client = StreamClient::new("ws://127.0.0.1:9");
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        assert!(reconnect_loop(&client, &config, &cancel).await.is_none());
    }
}
