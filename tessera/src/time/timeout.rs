use super::sleep::current_time;
use crate::cancel::CancelScope;
use crate::error::{Error, Result};

use std::future::Future;
use std::time::{Duration, Instant};

/// Runs `body` for at most `duration`.
///
/// Returns `Ok(None)` if the deadline cancelled the body. The body only
/// notices at its next checkpoint, so it may overrun the deadline by as much
/// as it computes between checkpoints. A duration too long to be
/// represented as a deadline never cancels the body.
///
/// # Examples
///
/// ```rust,ignore
/// let reply = tessera::move_on_after(Duration::from_secs(1), fetch()).await?;
/// if reply.is_none() {
///     tracing::warn!("fetch timed out");
/// }
/// ```
pub async fn move_on_after<F, T>(duration: Duration, body: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    let scope = match current_time()?.checked_add(duration) {
        Some(deadline) => CancelScope::with_deadline(deadline),
        None => CancelScope::new(),
    };
    scope.run(body).await
}

/// Runs `body` until the runtime's clock reaches `deadline`.
pub async fn move_on_at<F, T>(deadline: Instant, body: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    CancelScope::with_deadline(deadline).run(body).await
}

/// Runs `body` for at most `duration`, failing with [`Error::TooSlow`] if
/// the deadline cancelled it.
pub async fn fail_after<F, T>(duration: Duration, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    move_on_after(duration, body).await?.ok_or(Error::TooSlow)
}

/// Runs `body` until `deadline`, failing with [`Error::TooSlow`] if the
/// deadline cancelled it.
pub async fn fail_at<F, T>(deadline: Instant, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    move_on_at(deadline, body).await?.ok_or(Error::TooSlow)
}
