//! Interrupt handling
//!
//! Ctrl-C cancels a shared token. The conversation loop observes it between
//! stages; the process exits once the loop returns or the grace delay runs
//! out, whichever comes first.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first Ctrl-C
pub fn cancel_on_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for interrupt");
                    return;
                }
                tracing::info!("interrupt received, shutting down");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    })
}

/// Resolves `grace` after `token` is cancelled
pub async fn grace_period(token: CancellationToken, grace: Duration) {
    token.cancelled().await;
    tokio::time::sleep(grace).await;
}

/// Drive `work` until it finishes or the grace period after cancellation ends
///
/// Returns `None` when the grace period won.
#[allow(clippy::future_not_send)]
pub async fn run_until_shutdown<F, T>(work: F, token: CancellationToken, grace: Duration) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        output = work => Some(output),
        () = grace_period(token, grace) => {
            tracing::debug!(?grace, "grace period elapsed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_work_finishing_first_wins() {
        let token = CancellationToken::new();
        let out = run_until_shutdown(async { 7 }, token, Duration::from_secs(5)).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_bounds_stuck_work() {
        let token = CancellationToken::new();
        token.cancel();

        let out = run_until_shutdown(
            std::future::pending::<()>(),
            token,
            Duration::from_millis(1000),
        )
        .await;
        assert!(out.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_grace_without_cancel() {
        let token = CancellationToken::new();
        let work = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "done"
        };

        let out = run_until_shutdown(work, token, Duration::from_millis(10)).await;
        assert_eq!(out, Some("done"));
    }
}
