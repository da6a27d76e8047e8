use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Delayed-task executor shared by one engine instance.
///
/// Runs on the tokio timer, so tests driving a paused clock control every
/// resend, grace close and refresh deterministically. Cancelling drops all
/// tasks that have not fired yet.
#[derive(Clone, Default)]
pub struct Scheduler {
    token: Arc<Mutex<CancellationToken>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless the scheduler is cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.current_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(delay) => task.await,
            }
        });
    }

    /// Drop every pending task. Tasks scheduled afterwards run normally.
    pub fn cancel_all(&self) {
        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
        *token = CancellationToken::new();
        debug!("Scheduler cancelled pending tasks");
    }

    fn current_token(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
