//! Fixed-delay retry helper.

use std::time::Duration;

use crate::core::error::ShimError;

/// Run `callback` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the first success. When every attempt fails the last error is
/// wrapped in [`ShimError::Retry`]; a single attempt returns its error as-is.
pub fn retry<T, F>(attempts: usize, delay: Duration, mut callback: F) -> Result<T, ShimError>
where
    F: FnMut() -> Result<T, ShimError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match callback() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= attempts {
            if attempts == 1 {
                return Err(err);
            }
            return Err(ShimError::Retry {
                attempts,
                last: Box::new(err),
            });
        }

        tracing::debug!(
            "attempt {}/{} failed, retrying in {:?}: {}",
            attempt,
            attempts,
            delay,
            err
        );
        std::thread::sleep(delay);
    }
}
