use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use humansize::{BINARY, format_size};
use tracing::{debug, info, warn};

use crate::{CaptureOutcome, SessionSummary, TerminalReason};

/// Structured events emitted by the session and the capture unit.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SessionStarted {
        url: String,
        total: Duration,
    },
    AttemptStarted {
        index: u32,
        path: PathBuf,
        requested: Duration,
    },
    /// Throttled heartbeat while an attempt is writing.
    Progress {
        index: u32,
        bytes: u64,
        elapsed: Duration,
        requested: Duration,
    },
    AttemptEnded {
        index: u32,
        path: PathBuf,
        outcome: CaptureOutcome,
        bytes: u64,
        elapsed: Duration,
        error: Option<String>,
    },
    /// An attempt wrote nothing and its file was removed.
    FileDiscarded {
        path: PathBuf,
    },
    RetryScheduled {
        retry: u32,
        max_retries: u32,
        delay: Duration,
        remaining: Duration,
    },
    SessionEnded {
        summary: SessionSummary,
    },
}

/// Sink for [`SessionEvent`]s, handed to the session explicitly.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<T: SessionObserver + ?Sized> SessionObserver for Arc<T> {
    fn on_event(&self, event: &SessionEvent) {
        (**self).on_event(event)
    }
}

/// Writes every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SessionStarted { url, total } => {
                info!(url = %url, duration = ?total, "Recording started");
            }
            SessionEvent::AttemptStarted {
                index,
                path,
                requested,
            } => {
                info!(
                    attempt = index,
                    path = %path.display(),
                    remaining = ?requested,
                    "Writing to output file"
                );
            }
            SessionEvent::Progress {
                index,
                bytes,
                elapsed,
                ..
            } => {
                debug!(
                    attempt = index,
                    size = %format_size(*bytes, BINARY),
                    elapsed = ?elapsed,
                    "Recording"
                );
            }
            SessionEvent::AttemptEnded {
                index,
                path,
                outcome,
                bytes,
                elapsed,
                error,
            } => match outcome {
                CaptureOutcome::Completed | CaptureOutcome::Cancelled => info!(
                    attempt = index,
                    path = %path.display(),
                    outcome = %outcome,
                    size = %format_size(*bytes, BINARY),
                    elapsed = ?elapsed,
                    "Attempt ended"
                ),
                CaptureOutcome::FailedEarly | CaptureOutcome::TimedOut => warn!(
                    attempt = index,
                    path = %path.display(),
                    outcome = %outcome,
                    size = %format_size(*bytes, BINARY),
                    elapsed = ?elapsed,
                    error = error.as_deref().unwrap_or("unknown"),
                    "Attempt ended early"
                ),
            },
            SessionEvent::FileDiscarded { path } => {
                info!(path = %path.display(), "Deleting empty file");
            }
            SessionEvent::RetryScheduled {
                retry,
                max_retries,
                delay,
                remaining,
            } => {
                warn!(
                    retry,
                    max = max_retries,
                    delay = ?delay,
                    remaining = ?remaining,
                    "Wait and retry"
                );
            }
            SessionEvent::SessionEnded { summary } => match summary.reason {
                TerminalReason::Completed | TerminalReason::Cancelled => info!(
                    reason = %summary.reason,
                    attempts = summary.attempts,
                    retries = summary.retries,
                    elapsed = ?summary.elapsed,
                    files = summary.files.len(),
                    "Recording ended"
                ),
                TerminalReason::RetryBudgetExhausted => warn!(
                    reason = %summary.reason,
                    attempts = summary.attempts,
                    retries = summary.retries,
                    elapsed = ?summary.elapsed,
                    files = summary.files.len(),
                    "Recording gave up"
                ),
            },
        }
    }
}

/// Forwards each event to every wrapped observer, in order.
#[derive(Default)]
pub struct FanoutObserver {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }
}

impl SessionObserver for FanoutObserver {
    fn on_event(&self, event: &SessionEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
