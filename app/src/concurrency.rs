use std::{error::Error, future::Future, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("concurrency conflict")]
pub struct ConflictError;

#[derive(Debug, Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

const MAX_RETRIES: u32 = 10;
const BACKOFF_STEP: Duration = Duration::from_millis(15);

/// This function implements a retry loop for concurrency conflicts. It will keep retrying the
/// callback as long as the callback returns an error whose chain includes [`ConflictError`]. After
/// [`MAX_RETRIES`] the result of the last attempt is returned as is.
pub async fn retry_loop<F: Future<Output = Result<T, E>>, T, E: Error + 'static>(
    mut cb: impl FnMut() -> F,
) -> Result<T, E> {
    for i in 1..MAX_RETRIES {
        match cb().await {
            Ok(result) => return Ok(result),
            Err(e) if is_conflict(Some(&e)) => {
                let backoff = BACKOFF_STEP * i;
                log::info!("got a conflict error, sleeping for {:?}", backoff);
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
    cb().await
}

/// Runs `f` to completion unless `deadline` elapses first. When the deadline hits, `f` is dropped,
/// which rolls back any database transaction it holds open.
pub async fn with_deadline<T>(
    deadline: Duration,
    f: impl Future<Output = T>,
) -> Result<T, DeadlineExceeded> {
    tokio::time::timeout(deadline, f)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}

fn is_conflict(e: Option<&(dyn Error + 'static)>) -> bool {
    e.map(|e| e.is::<ConflictError>() || is_conflict(e.source()))
        .unwrap_or(false)
}
