//! Bounded retry with exponential backoff and a one-shot re-auth hook.
//!
//! Data-source HTTP calls fail in three distinct ways that need distinct
//! handling: transient upstream errors (retry with backoff), expired
//! session credentials (refresh once, then retry immediately), and
//! everything else (give up). Callers classify each outcome into a
//! [`CallResult`] and this module runs the loop.

use std::time::Duration;

use tracing::{debug, warn};

use crate::types::EngineError;

/// Retry knobs. `backoff_base_secs` is the first delay; each subsequent
/// transient failure doubles it.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 1.0,
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_base_secs * f64::from(1u32 << attempt.min(16)))
    }
}

/// Classified outcome of a single call attempt.
pub enum CallResult<T> {
    /// Success; the loop returns immediately.
    Ok(T),
    /// Upstream hiccup (rate limit, 5xx, timeout). Retried with backoff
    /// until attempts run out.
    Transient(String),
    /// Session credentials rejected. Triggers the re-auth hook at most
    /// once per logical call, then one immediate retry.
    AuthExpired(String),
    /// Unrecoverable; surfaced to the caller without retrying.
    Fatal(EngineError),
}

/// Run `call` until it succeeds, exhausts `policy.max_attempts`, or hits
/// a fatal error. `reauth` fires on the first `AuthExpired` outcome only;
/// a second expiry within the same logical call is treated as fatal.
pub async fn resilient_call<T, C, CFut, R, RFut>(
    policy: &RetryPolicy,
    what: &str,
    mut call: C,
    mut reauth: R,
) -> Result<T, EngineError>
where
    C: FnMut() -> CFut,
    CFut: std::future::Future<Output = CallResult<T>>,
    R: FnMut() -> RFut,
    RFut: std::future::Future<Output = Result<(), EngineError>>,
{
    let mut reauthed = false;
    let mut last_transient = String::new();
    let mut attempt = 0;

    while attempt < policy.max_attempts {
        match call().await {
            CallResult::Ok(value) => return Ok(value),
            CallResult::Fatal(err) => return Err(err),
            CallResult::AuthExpired(msg) => {
                if reauthed {
                    return Err(EngineError::DataUnavailable {
                        provider: what.to_string(),
                        message: format!("session rejected again after re-auth: {msg}"),
                    });
                }
                warn!(call = what, %msg, "session expired, re-authenticating");
                reauth().await?;
                reauthed = true;
                // Does not consume a retry attempt and skips the backoff;
                // the rejection was about credentials, not load.
            }
            CallResult::Transient(msg) => {
                last_transient = msg;
                attempt += 1;
                if attempt < policy.max_attempts {
                    let delay = policy.delay_for_attempt(attempt - 1);
                    debug!(
                        call = what,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        reason = %last_transient,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(EngineError::DataUnavailable {
        provider: what.to_string(),
        message: format!(
            "{} attempts exhausted, last error: {last_transient}",
            policy.max_attempts
        ),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
