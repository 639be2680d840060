//! Cooperative cancellation for graph builds and long traversals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::history::HistoryError;

/// Shared cancellation flag. Cloning yields another handle to the same flag;
/// integration passes and traversals poll it and bail out with
/// [`HistoryError::Canceled`] without leaving a graph half-mutated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Poll point: errors out once cancellation was requested.
    pub fn check(&self) -> Result<(), HistoryError> {
        if self.is_canceled() {
            Err(HistoryError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trips_all_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(HistoryError::Canceled)));
    }
}
