//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A shared flag for cooperatively cancelling long-running work.
///
/// Tree builds and merges check the flag at every node boundary; a raised
/// flag aborts the operation with [`Error::Interrupted`] before its batch is
/// committed, so cancelled work leaves no partial state behind.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Create a new, unraised interrupt flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Work observing this handle stops at its next
    /// suspension point.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if the flag has been raised.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Interrupted`] if the flag has been raised.
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}
