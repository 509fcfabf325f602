use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::foundation::diagnostics::Stage;
use crate::foundation::error::{WavegramError, WavegramResult};

/// Cooperative cancellation flag shared between a caller and a running pipeline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Running child processes are killed at their next poll.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation checked at every suspension point of a run.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl RunControl {
    /// No deadline, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build from an optional timeout (measured from now) and an optional token.
    pub fn new(timeout: Option<Duration>, cancel: Option<CancelToken>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail with `Cancelled`/`TimedOut` tagged with `stage` when the run must stop.
    pub fn check(&self, stage: Stage) -> WavegramResult<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(WavegramError::Cancelled { stage });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(WavegramError::TimedOut { stage });
        }
        Ok(())
    }
}
