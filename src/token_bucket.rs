use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::trace;

struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Per-stream bandwidth cap in bytes per second.
///
/// A rate of zero disables throttling entirely. The bucket holds at most one
/// second worth of bytes, so a stream can burst that much after idling.
#[derive(Clone)]
pub struct TokenBucket {
    rate: f64,
    state: Arc<Mutex<BucketState>>,
}

impl TokenBucket {
    pub fn new(bytes_per_sec: u64) -> Self {
        let rate = bytes_per_sec as f64;
        Self {
            rate,
            state: Arc::new(Mutex::new(BucketState {
                tokens: rate,
                last: Instant::now(),
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    /// Wait until `amount` bytes may be sent
    pub async fn consume(&self, amount: usize) {
        if self.is_unlimited() {
            return;
        }

        let mut state = self.state.lock().await;
        let amount = amount as f64;

        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(state.last).as_secs_f64();
            // a chunk larger than the capacity must still be able to pass
            let capacity = self.rate.max(amount);
            state.tokens = (state.tokens + elapsed * self.rate).min(capacity);
            state.last = now;

            if state.tokens >= amount {
                state.tokens -= amount;
                return;
            }

            let wait = (amount - state.tokens) / self.rate;
            trace!(wait_secs = wait, "Throttling stream");
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}
