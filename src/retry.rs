//! Bounded exponential backoff for transient failures.
//!
//! Only errors classified as transient are retried; validation and repo
//! failures fail fast.

use std::time::Duration;

use tracing::warn;

use crate::error::FerryError;

/// Default number of attempts for network-bound steps.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default initial delay; doubles per attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Run `op`, retrying transient failures up to `attempts` times with an
/// exponentially growing delay.
///
/// # Errors
/// The last error when attempts are exhausted, or immediately for
/// non-transient failures.
pub fn with_backoff<T>(
    description: &str,
    attempts: u32,
    initial_delay: Duration,
    mut op: impl FnMut() -> Result<T, FerryError>,
) -> Result<T, FerryError> {
    let attempts = attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(
                    %err,
                    attempt,
                    retry_in_secs = delay.as_secs_f64(),
                    "{description} failed transiently; retrying"
                );
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
