//! Redirect grace window for hosts that start without a session id.
//!
//! Session ids can arrive asynchronously after the host starts, so the host
//! waits a short grace window before redirecting to its default view. The
//! check at the end of the window reads the receiver's *current* value, not
//! the value seen when the window was scheduled.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use varlens_core::types::SessionId;

/// How a grace window ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// A session id was present when the window closed.
    SessionResolved(SessionId),
    /// No session id arrived; the redirect callback ran.
    Redirected,
}

/// Owner of a scheduled grace window.
///
/// Cancelling or dropping the handle aborts the timer, so the redirect can
/// never fire after the host has been torn down.
#[derive(Debug)]
pub struct RedirectHandle {
    task: Option<JoinHandle<RedirectOutcome>>,
}

impl RedirectHandle {
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Redirect grace window cancelled");
            task.abort();
        }
    }

    /// Wait for the window to close. `None` if it was cancelled.
    pub async fn outcome(mut self) -> Option<RedirectOutcome> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for RedirectHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Schedule a redirect that runs after `grace` unless a session id is
/// present by then.
pub fn schedule_redirect<F>(
    rx: watch::Receiver<Option<SessionId>>,
    grace: Duration,
    on_redirect: F,
) -> RedirectHandle
where
    F: FnOnce() + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let current = rx.borrow().clone();
        match current {
            Some(session_id) => {
                debug!(session_id = %session_id, "Session resolved within grace window");
                RedirectOutcome::SessionResolved(session_id)
            }
            None => {
                info!(grace_ms = grace.as_millis() as u64, "No session resolved, redirecting");
                on_redirect();
                RedirectOutcome::Redirected
            }
        }
    });
    RedirectHandle { task: Some(task) }
}
