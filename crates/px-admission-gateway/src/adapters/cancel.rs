//! Request cancellation plumbing.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::domain::error::CollaboratorError;
use crate::ports::outbound::CancelSignal;

/// Owner side of a request's [`CancelSignal`]. Fires when dropped, so an
/// abandoned request future cancels whatever it was waiting on.
#[derive(Debug)]
pub struct CancelGuard {
    tx: watch::Sender<bool>,
}

impl CancelGuard {
    pub fn channel() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal::from_receiver(rx))
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run a collaborator call bounded by `limit` and the cancel signal.
pub async fn guarded<F, T>(
    call: F,
    limit: Duration,
    mut cancel: CancelSignal,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    if cancel.is_cancelled() {
        return Err(CollaboratorError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(CollaboratorError::Cancelled),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(limit.as_millis() as u64)),
        },
    }
}
