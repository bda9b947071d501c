//! Cooperative cancellation
//!
//! A [`CancellationToken`] is cancelled either directly or through any token it was
//! linked to. Linking is how a background job observes both the request that produced it
//! and the shutdown of the worker pool running it.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation signal.
///
/// Clones share state: cancelling one clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    own: Arc<watch::Sender<bool>>,
    // Own receiver first, then one receiver per linked ancestor.
    watched: Vec<watch::Receiver<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            own: Arc::new(tx),
            watched: vec![rx],
        }
    }

    /// Create a token that is cancelled when any of `parents` is cancelled, or when it is
    /// cancelled itself. Cancelling the linked token does not cancel the parents.
    pub fn linked(parents: &[&CancellationToken]) -> Self {
        let mut token = Self::new();
        for parent in parents {
            token.watched.extend(parent.watched.iter().cloned());
        }
        token
    }

    /// Signal cancellation to every clone and every token linked to this one.
    pub fn cancel(&self) {
        self.own.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.watched.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once the token, or any token it is linked to, is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let waits = self.watched.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    // Sender gone without cancelling: this source can never fire.
                    std::future::pending::<()>().await;
                }
            })
        });

        futures_util::future::select_all(waits).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
