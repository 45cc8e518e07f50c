use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancellation signal plus a tracker of every task spawned under it.
///
/// Cancelling the scope is the single shutdown signal: loops select on
/// `token().cancelled()` at each suspension point and exit.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Token cancelled with the scope but also cancellable on its own
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Cancel every task. Terminal.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Resolves once the scope is cancelled and all its tasks have exited
    pub async fn wait(&self) {
        self.tracker.wait().await
    }
}
