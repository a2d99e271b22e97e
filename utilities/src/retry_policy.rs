use std::{fmt::Display, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};

/// Upper bound on the wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Runs `f` until it succeeds or `max_tries` attempts have failed, doubling the wait
/// between attempts starting from `base_delay`. The last error is returned.
pub async fn retry_with_backoff<F, Fut, R, E>(
    f: F,
    max_tries: u8,
    base_delay: Duration,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
{
    retry_with_backoff_when(f, |_| true, max_tries, base_delay).await
}

/// Like [`retry_with_backoff`], but an error for which `should_retry` is false is returned
/// straight away.
pub async fn retry_with_backoff_when<F, Fut, R, E, P>(
    mut f: F,
    should_retry: P,
    max_tries: u8,
    base_delay: Duration,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut curr_try: u8 = 1;
    loop {
        match f().await {
            Ok(v) => {
                return Ok(v);
            }
            Err(e) => {
                warn!(error = %e, retry = %curr_try, "Error happened while running closure");
                if !should_retry(&e) {
                    warn!("Error is not retryable returning it");
                    return Err(e);
                }
                if curr_try >= max_tries {
                    warn!("Reached max retries returning error");
                    return Err(e);
                }
            }
        }
        let sleep_duration = backoff(base_delay, curr_try);
        curr_try += 1;
        info!(?sleep_duration, "Waiting before retry");
        sleep(sleep_duration).await;
    }
}

fn backoff(base_delay: Duration, curr_try: u8) -> Duration {
    let factor = 2u32.saturating_pow(u32::from(curr_try).saturating_sub(1));
    base_delay.saturating_mul(factor).min(MAX_BACKOFF)
}
