//! Cooperative cancellation: a shared flag flipped by SIGINT/SIGTERM that
//! every long-running stage polls between work items (component §9's
//! "no coroutines, cancellation is cooperative" design note).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to a process-wide cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Installs a SIGINT/SIGTERM handler that cancels `token` on receipt.
///
/// Installation failure is non-fatal: it is logged and the run continues
/// without a signal-driven cancellation path (it can still be cancelled
/// programmatically through the returned token).
pub fn install_handler(token: CancellationToken) {
    let result = ctrlc::set_handler(move || {
        #[cfg(feature = "tracing")]
        tracing::warn!("received interrupt, cancelling run");
        token.cancel();
    });
    if let Err(_e) = result {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %_e, "failed to install signal handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
