//! Cooperative cancellation for a discovery run.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use toolwire_core::{ToolwireError, ToolwireResult};

/// A cloneable cancellation signal shared by every discovery branch.
#[derive(Debug, Clone)]
pub struct DiscoveryCancel {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl DiscoveryCancel {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of self, so this cannot fail.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `fut` to completion unless cancellation comes first.
    pub async fn run<F: Future>(&self, fut: F) -> ToolwireResult<F::Output> {
        if self.is_cancelled() {
            return Err(ToolwireError::Cancelled("discovery was cancelled".into()));
        }
        tokio::select! {
            output = fut => Ok(output),
            () = self.cancelled() => Err(ToolwireError::Cancelled("discovery was cancelled".into())),
        }
    }
}

impl Default for DiscoveryCancel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes_when_not_cancelled() {
        let cancel = DiscoveryCancel::new();
        assert_eq!(cancel.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let cancel = DiscoveryCancel::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = cancel
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolwireError::Cancelled(_)));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_future() {
        let cancel = DiscoveryCancel::new();
        cancel.cancel();
        assert!(cancel.run(async { 1 }).await.is_err());
    }
}
