//! Completion tokens.
//!
//! A [`CompletionToken`] is a single-permit signal shared between the host
//! and a queue. The scheduler uses one long-lived token as the classifier
//! fence (created signaled, reset before every dispatch); backends use
//! fresh unsignaled tokens as one-shot queue-to-queue semaphores.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::errors::{Result, VrsError};

#[derive(Debug, Default)]
struct TokenState {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Cloneable handle to a shared signal.
#[derive(Debug, Clone, Default)]
pub struct CompletionToken {
    state: Arc<TokenState>,
}

impl CompletionToken {
    /// Unsignaled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that starts signaled, so the first host wait returns at once.
    #[must_use]
    pub fn signaled() -> Self {
        let token = Self::new();
        token.signal();
        token
    }

    pub fn signal(&self) {
        let mut signaled = self.state.signaled.lock();
        *signaled = true;
        self.state.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.state.signaled.lock() = false;
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.state.signaled.lock()
    }

    /// Blocks until signaled or `timeout` elapses.
    ///
    /// Expiry is reported as [`VrsError::FenceTimeout`].
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            if self.state.cond.wait_until(&mut signaled, deadline).timed_out() {
                if *signaled {
                    break;
                }
                return Err(VrsError::FenceTimeout { waited: timeout });
            }
        }
        Ok(())
    }
}
