//! Request-scoped context carrying cancellation.

use tokio_util::sync::CancellationToken;

use crate::{KappError, KappResult};

/// Per-request context. Cloning shares the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Context cancelled together with `self` but cancellable on its own.
    pub fn child(&self) -> Self {
        Self { cancel: self.cancel.child_token() }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` once the request is gone.
    pub fn check(&self, op: &str) -> KappResult<()> {
        if self.cancel.is_cancelled() {
            return Err(KappError::Cancelled(format!("{}: request cancelled", op)));
        }
        Ok(())
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
