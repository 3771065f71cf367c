use std::future::Future;
use tokio::sync::watch;
use crate::error::AppError;

/// Requests cancellation of the job polling that holds the paired token.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation was requested; pends forever when the handle
    /// is gone without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.map(|_| ()).is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `fut` unless cancellation comes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AppError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

pub fn pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}
