// Background session refresh

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::{RefreshOutcome, SessionClient};
use super::state::SessionState;

/// When the next refresh fires
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshPolicy {
    /// Every `period`, regardless of expiry
    Fixed(Duration),

    /// `margin` before the access token expires, never sooner than `min_delay`
    BeforeExpiry { margin: Duration, min_delay: Duration },
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy::BeforeExpiry {
            margin: Duration::from_secs(60),
            min_delay: Duration::from_secs(5),
        }
    }
}

impl RefreshPolicy {
    /// Delay until the next tick, given the current session expiry
    pub fn next_delay(&self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        match *self {
            RefreshPolicy::Fixed(period) => period,
            RefreshPolicy::BeforeExpiry { margin, min_delay } => {
                let Some(expires_at) = expires_at else {
                    return min_delay;
                };
                let margin =
                    chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
                ((expires_at - margin) - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .max(min_delay)
            }
        }
    }
}

/// Why the refresh loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Handle dropped or cancelled
    Cancelled,
    /// Session became anonymous (logout)
    SignedOut,
    /// A refresh failed; the session has ended
    RefreshFailed,
}

/// Owner of a running refresh loop
///
/// Dropping the handle cancels the pending timer. An in-flight refresh call
/// is left to finish on its own.
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<LoopExit>>,
}

impl RefreshHandle {
    /// Start refreshing `client`'s session in the background
    pub fn spawn(client: Arc<SessionClient>, policy: RefreshPolicy) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(client, policy, cancel.clone()));

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the loop to stop
    pub async fn finished(mut self) -> Option<LoopExit> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    client: Arc<SessionClient>,
    policy: RefreshPolicy,
    cancel: CancellationToken,
) -> LoopExit {
    tracing::info!(policy = ?policy, "Session refresh loop started");
    let mut state_rx = client.subscribe();

    loop {
        if *state_rx.borrow_and_update() == SessionState::Anonymous {
            tracing::info!("Session signed out, stopping refresh loop");
            return LoopExit::SignedOut;
        }

        let delay = policy.next_delay(client.store().expires_at().await, Utc::now());
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            "Sleeping until next refresh"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Refresh loop cancelled");
                return LoopExit::Cancelled;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return LoopExit::Cancelled;
                }
                // Re-evaluate: logout or an external refresh moved the deadline
                continue;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        // Check cancellation before refreshing
        if cancel.is_cancelled() {
            return LoopExit::Cancelled;
        }

        match client.refresh().await {
            RefreshOutcome::Refreshed(info) => {
                tracing::debug!(
                    expires_at = %info.expires_at.to_rfc3339(),
                    "Refresh tick succeeded"
                );
            }
            RefreshOutcome::Skipped => {
                tracing::debug!("Refresh tick skipped, previous refresh still pending");
            }
            RefreshOutcome::Failed(e) => {
                tracing::warn!("Refresh tick failed, stopping loop: {}", e);
                return LoopExit::RefreshFailed;
            }
        }
    }
}
