// =============================================================================
// Retry with exponential backoff + jitter
// =============================================================================
//
// The donor has no retry wrapper of its own — its resilience pattern is a
// fixed 5s reconnect delay around the websocket loop in `main.rs`. This
// generalizes that shape (sleep, retry, log) to exponential backoff with
// jitter for broker calls, since a single fixed delay is too slow for a
// transient 429/503 and too fast for a real outage.
//
// Only `TradeNovaError::BrokerTransient` is retried. Every other variant is
// returned immediately — a permanent rejection or a malformed response will
// not start succeeding on attempt two.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::TradeNovaError;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 3;

/// Runs `op` up to `MAX_ATTEMPTS` times, sleeping `BASE_DELAY * 2^attempt`
/// (plus up to 25% jitter) between retries. Only retries on
/// `TradeNovaError::BrokerTransient`.
pub async fn with_backoff<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, TradeNovaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TradeNovaError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(TradeNovaError::BrokerTransient(reason)) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    warn!(op_name, attempt, reason, "broker call exhausted retries");
                    return Err(TradeNovaError::BrokerTransient(reason));
                }

                let backoff = BASE_DELAY * 2u32.pow(attempt - 1);
                let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.25);
                let delay = backoff + Duration::from_secs_f64(backoff.as_secs_f64() * jitter_frac);

                warn!(op_name, attempt, reason, delay_ms = delay.as_millis() as u64, "retrying broker call");
                tokio::time::sleep(delay).await;
            }
            Err(other) => {
                debug!(op_name, error = %other, "broker call failed with non-retryable error");
                return Err(other);
            }
        }
    }
}
