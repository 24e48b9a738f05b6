//! Caller-supplied cancellation built on `tokio::sync::watch`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{MediaError, MediaResult};

/// Sender half; cancels every [`CancelSignal`] cloned from the pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Get another signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver half passed to every cancellable operation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// A signal that fires once `deadline` has elapsed.
///
/// Must be called from within a tokio runtime.
pub fn cancel_after(deadline: Duration) -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        handle.cancel();
    });
    signal
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled. Never resolves if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// A signal that fires when this one does or once `deadline` elapses,
    /// whichever comes first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_deadline(&self, deadline: Duration) -> CancelSignal {
        let (handle, child) = cancel_pair();
        let parent = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {}
                _ = handle.tx.closed() => return,
            }
            handle.cancel();
        });
        child
    }

    /// Race `fut` against cancellation.
    pub async fn run<F, T>(&self, fut: F) -> MediaResult<T>
    where
        F: Future<Output = MediaResult<T>>,
    {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        tokio::select! {
            result = fut => result,
            _ = self.cancelled() => Err(MediaError::Cancelled),
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_pair() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let signal = CancelSignal::never();
        let result =
            tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_returns_cancelled() {
        let (handle, signal) = cancel_pair();
        let task = tokio::spawn(async move {
            signal
                .run(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .await
        });
        handle.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_with_deadline_follows_parent_and_deadline() {
        let (handle, parent) = cancel_pair();
        let child = parent.with_deadline(Duration::from_secs(60));
        assert!(!child.is_cancelled());
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), child.cancelled())
            .await
            .unwrap();

        let short = CancelSignal::never().with_deadline(Duration::from_millis(5));
        tokio::time::timeout(Duration::from_secs(5), short.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_after_deadline() {
        let signal = cancel_after(Duration::from_millis(5));
        tokio::time::timeout(Duration::from_secs(5), signal.cancelled())
            .await
            .unwrap();
        assert!(signal.is_cancelled());
    }
}
