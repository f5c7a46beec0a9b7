//! Global token bucket over a 60-second sliding window, shared by every
//! provider in a single runner — there are no per-provider limits (see the
//! Non-goals in `SPEC_FULL.md`).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Holds a FIFO of recent call timestamps behind one mutex. `rpm = 0`
/// disables the limiter entirely (`acquire` returns immediately).
///
/// A token consumed by `acquire` is never refunded, even if the attempt it
/// guarded is subsequently cancelled — this keeps "at most `rpm` attempts
/// started per 60s window" an exact bound rather than an approximate one.
pub struct RateLimiter {
    rpm: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        Self {
            rpm,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks (asynchronously) until a slot is available, then records the
    /// new timestamp. No-op when `rpm == 0`.
    pub async fn acquire(&self) {
        if self.rpm == 0 {
            return;
        }
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().unwrap();
                let now = Instant::now();
                while let Some(&oldest) = timestamps.front() {
                    if now.duration_since(oldest) >= WINDOW {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                if timestamps.len() < self.rpm as usize {
                    timestamps.push_back(now);
                    return;
                }

                let oldest = *timestamps.front().expect("len >= rpm > 0 implies non-empty");
                WINDOW.saturating_sub(now.duration_since(oldest))
            };
            tokio::time::sleep(wait).await;
        }
    }

    #[cfg(test)]
    fn window_len(&self) -> usize {
        self.timestamps.lock().unwrap().len()
    }
}
