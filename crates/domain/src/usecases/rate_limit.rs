//! Fixed-window publish rate limiter

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Limits how many posts go out per minute and per hour
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: Option<u32>,
    per_hour: Option<u32>,
    state: Mutex<RateLimiterState>,
}

#[derive(Debug)]
struct RateLimiterState {
    minute_window_start: Instant,
    hour_window_start: Instant,
    minute_count: u32,
    hour_count: u32,
}

impl RateLimiter {
    pub fn new(per_minute: Option<u32>, per_hour: Option<u32>) -> Self {
        let now = Instant::now();
        Self {
            per_minute,
            per_hour,
            state: Mutex::new(RateLimiterState {
                minute_window_start: now,
                hour_window_start: now,
                minute_count: 0,
                hour_count: 0,
            }),
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Wait until a publish slot is available, then take it
    pub async fn acquire(&self) {
        if self.per_minute.is_none() && self.per_hour.is_none() {
            return;
        }

        loop {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            if now.duration_since(state.minute_window_start) >= MINUTE {
                state.minute_window_start = now;
                state.minute_count = 0;
            }

            if now.duration_since(state.hour_window_start) >= HOUR {
                state.hour_window_start = now;
                state.hour_count = 0;
            }

            let mut wait_for = Duration::ZERO;
            if let Some(limit) = self.per_minute {
                if state.minute_count >= limit {
                    let elapsed = now.duration_since(state.minute_window_start);
                    wait_for = wait_for.max(MINUTE.saturating_sub(elapsed));
                }
            }

            if let Some(limit) = self.per_hour {
                if state.hour_count >= limit {
                    let elapsed = now.duration_since(state.hour_window_start);
                    wait_for = wait_for.max(HOUR.saturating_sub(elapsed));
                }
            }

            if wait_for.is_zero() {
                state.minute_count = state.minute_count.saturating_add(1);
                state.hour_count = state.hour_count.saturating_add(1);
                return;
            }

            drop(state);
            tracing::debug!(wait_ms = wait_for.as_millis() as u64, "Publish rate limit reached");
            sleep(wait_for).await;
        }
    }
}
