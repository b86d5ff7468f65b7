//! Recording session controller.
//!
//! Drives capture attempts until the planned duration has been recorded, the
//! retry budget is spent or the operator cancels. Elapsed time is the sum of
//! the measured attempt durations, so an attempt that dies after a few seconds
//! only consumes those seconds of the plan. Backoff pauses are not counted.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::capture::{CaptureOutcome, CaptureRequest, StreamCapture};
use crate::events::{SessionEvent, SessionObserver, TracingObserver};
use crate::namer::OutputNamer;
use crate::source::{HttpSource, StreamSource};
use crate::{RecordError, RecorderConfig, RecordingPlan};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The planned duration was recorded, or what is left of it is below the
    /// segment floor.
    Completed,
    /// An attempt failed after `max_retries` retries had already been used.
    RetryBudgetExhausted,
    /// The operator interrupted the session.
    Cancelled,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalReason::Completed => write!(f, "completed"),
            TerminalReason::RetryBudgetExhausted => write!(f, "retry budget exhausted"),
            TerminalReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub started_at: DateTime<Local>,
    pub attempts: u32,
    pub retries: u32,
    pub elapsed: Duration,
    pub bytes_written: u64,
    /// Output files left on disk, in attempt order.
    pub files: Vec<PathBuf>,
    pub reason: TerminalReason,
}

/// Mutable bookkeeping of a running session, touched once per iteration.
#[derive(Debug)]
struct SessionState {
    started_at: DateTime<Local>,
    elapsed: Duration,
    retry_count: u32,
    attempts: u32,
    bytes_written: u64,
    files: Vec<PathBuf>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            started_at: Local::now(),
            elapsed: Duration::ZERO,
            retry_count: 0,
            attempts: 0,
            bytes_written: 0,
            files: Vec::new(),
        }
    }

    fn finish(self, reason: TerminalReason) -> SessionSummary {
        SessionSummary {
            started_at: self.started_at,
            attempts: self.attempts,
            retries: self.retry_count,
            elapsed: self.elapsed,
            bytes_written: self.bytes_written,
            files: self.files,
            reason,
        }
    }
}

pub struct RecordingSession {
    capture: StreamCapture,
    backoff: Duration,
    observer: Arc<dyn SessionObserver>,
    token: CancellationToken,
}

impl RecordingSession {
    pub fn new(source: Arc<dyn StreamSource>, config: &RecorderConfig) -> Self {
        Self {
            capture: StreamCapture::new(source, config),
            backoff: config.backoff,
            observer: Arc::new(TracingObserver),
            token: CancellationToken::new(),
        }
    }

    /// Session recording over HTTP with a client built from `config`.
    pub fn http(config: &RecorderConfig) -> Result<Self, RecordError> {
        let source = HttpSource::new(config)?;
        Ok(Self::new(Arc::new(source), config))
    }

    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Token whose cancellation stops the session. Nothing is retried after
    /// a cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Record `plan` to completion.
    ///
    /// Transport failures are retried within the plan's budget and end up in
    /// the summary. `Err` means a naming or local I/O fault that stopped the
    /// session; an `OutputCollision` on the first attempt is reported before
    /// any network request is made.
    #[instrument(skip_all, fields(url = %plan.source_url()))]
    pub async fn run(&self, plan: &RecordingPlan) -> Result<SessionSummary, RecordError> {
        let namer = OutputNamer::from_plan(plan);
        let total = plan.total_duration();
        let mut state = SessionState::new();

        self.observer.on_event(&SessionEvent::SessionStarted {
            url: plan.source_url().to_string(),
            total,
        });

        let reason = loop {
            if self.token.is_cancelled() {
                break TerminalReason::Cancelled;
            }

            let remaining = total.saturating_sub(state.elapsed);
            if remaining.is_zero() {
                break TerminalReason::Completed;
            }
            // Not enough time left to be worth a file.
            if remaining <= plan.min_segment_duration() {
                debug!(
                    remaining = ?remaining,
                    floor = ?plan.min_segment_duration(),
                    "Remaining time below segment floor"
                );
                break TerminalReason::Completed;
            }

            let index = state.attempts;
            let output_path = namer.name(index, Local::now(), &state.files).await?;
            state.attempts += 1;

            let attempt = self
                .capture
                .capture(
                    CaptureRequest {
                        url: plan.source_url(),
                        output_path,
                        duration: remaining,
                        overwrite: plan.force_overwrite(),
                        attempt_index: index,
                    },
                    self.observer.as_ref(),
                    &self.token,
                )
                .await?;

            state.elapsed += attempt.elapsed;
            state.bytes_written += attempt.bytes_written;
            if attempt.kept && !state.files.contains(&attempt.output_path) {
                state.files.push(attempt.output_path);
            }

            match attempt.outcome {
                CaptureOutcome::Completed => continue,
                CaptureOutcome::Cancelled => break TerminalReason::Cancelled,
                CaptureOutcome::FailedEarly | CaptureOutcome::TimedOut => {}
            }

            let remaining = total.saturating_sub(state.elapsed);
            if remaining <= plan.min_segment_duration() {
                // Nothing worth retrying for; the loop head ends the session.
                continue;
            }
            if state.retry_count >= plan.max_retries() {
                break TerminalReason::RetryBudgetExhausted;
            }

            state.retry_count += 1;
            self.observer.on_event(&SessionEvent::RetryScheduled {
                retry: state.retry_count,
                max_retries: plan.max_retries(),
                delay: self.backoff,
                remaining,
            });

            tokio::select! {
                _ = self.token.cancelled() => break TerminalReason::Cancelled,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        };

        let summary = state.finish(reason);
        self.observer.on_event(&SessionEvent::SessionEnded {
            summary: summary.clone(),
        });
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingObserver, Script, ScriptedSource};
    use tempfile::TempDir;

    fn config(backoff: Duration) -> RecorderConfig {
        RecorderConfig {
            backoff,
            read_timeout: Duration::from_secs(5),
            progress_interval: Duration::from_millis(20),
            ..RecorderConfig::default()
        }
    }

    fn plan(temp: &TempDir, total: Duration) -> crate::config::RecordingPlanBuilder {
        RecordingPlan::builder("http://radio.test/live", total, temp.path().join("show"))
            .timestamp_suffix(false)
    }

    fn dir_entries(temp: &TempDir) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn reliable_stream_records_full_duration_into_one_file() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([Script::steady(
            Duration::from_millis(10),
            128,
        )]));
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(10)));
        let plan = plan(&temp, Duration::from_millis(300))
            .min_segment_duration(Duration::from_millis(50))
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.reason, TerminalReason::Completed);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.retries, 0);
        assert!(summary.elapsed >= Duration::from_millis(300));
        assert!(summary.elapsed < Duration::from_millis(400));
        assert_eq!(summary.files, vec![temp.path().join("show.mp3")]);
        assert_eq!(dir_entries(&temp), summary.files);
        assert!(std::fs::metadata(&summary.files[0]).unwrap().len() > 0);
        assert_eq!(source.opens(), 1);
    }

    #[tokio::test]
    async fn always_failing_stream_exhausts_budget() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([Script::Refuse]));
        let observer = Arc::new(RecordingObserver::default());
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)))
            .with_observer(observer.clone());
        let plan = plan(&temp, Duration::from_secs(60))
            .max_retries(3)
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.reason, TerminalReason::RetryBudgetExhausted);
        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.retries, 3);
        assert_eq!(source.opens(), 4);
        assert!(summary.files.is_empty());
        assert!(dir_entries(&temp).is_empty());

        let events = observer.events();
        let discarded = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::FileDiscarded { .. }))
            .count();
        let retries = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::RetryScheduled { .. }))
            .count();
        assert_eq!(discarded, 4);
        assert_eq!(retries, 3);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionEnded { summary }) if summary.reason == TerminalReason::RetryBudgetExhausted
        ));
    }

    #[tokio::test]
    async fn zero_budget_makes_a_single_attempt() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([Script::Refuse]));
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)));
        let plan = plan(&temp, Duration::from_secs(60))
            .max_retries(0)
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();
        assert_eq!(summary.reason, TerminalReason::RetryBudgetExhausted);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.retries, 0);
    }

    #[tokio::test]
    async fn recovers_after_two_failures() {
        // 120 s / 30 s floor / 3 retries scaled down to milliseconds.
        let temp = TempDir::new().unwrap();
        let flaky = Script::FailAfter {
            interval: Duration::from_millis(10),
            chunks: 5,
            chunk_size: 64,
        };
        let source = Arc::new(ScriptedSource::new([
            flaky,
            flaky,
            Script::steady(Duration::from_millis(10), 64),
        ]));
        let observer = Arc::new(RecordingObserver::default());
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(20)))
            .with_observer(observer.clone());
        let total = Duration::from_millis(1200);
        let plan = plan(&temp, total)
            .max_retries(3)
            .min_segment_duration(Duration::from_millis(300))
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.reason, TerminalReason::Completed);
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.retries, 2);
        assert_eq!(
            summary.files,
            vec![
                temp.path().join("show.mp3"),
                temp.path().join("show_1.mp3"),
                temp.path().join("show_2.mp3"),
            ]
        );
        assert!(summary.elapsed >= total);
        assert!(summary.elapsed < total + Duration::from_millis(100));

        // Each attempt is asked for exactly what the previous ones left over.
        let events = observer.events();
        let requested: Vec<Duration> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::AttemptStarted { requested, .. } => Some(*requested),
                _ => None,
            })
            .collect();
        let spent: Vec<Duration> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::AttemptEnded { elapsed, .. } => Some(*elapsed),
                _ => None,
            })
            .collect();
        assert_eq!(requested.len(), 3);
        assert_eq!(requested[0], total);
        assert_eq!(requested[1], total - spent[0]);
        assert_eq!(requested[2], total - spent[0] - spent[1]);
        assert_eq!(spent.iter().sum::<Duration>(), summary.elapsed);
    }

    #[tokio::test]
    async fn stops_at_segment_floor() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([
            Script::FailAfter {
                interval: Duration::from_millis(50),
                chunks: 3,
                chunk_size: 16,
            },
            Script::steady(Duration::from_millis(10), 16),
        ]));
        let observer = Arc::new(RecordingObserver::default());
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)))
            .with_observer(observer.clone());
        let plan = plan(&temp, Duration::from_millis(500))
            .min_segment_duration(Duration::from_millis(400))
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.reason, TerminalReason::Completed);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.retries, 0);
        assert_eq!(source.opens(), 1);
        assert!(
            !observer
                .events()
                .iter()
                .any(|e| matches!(e, SessionEvent::RetryScheduled { .. }))
        );
    }

    #[tokio::test]
    async fn duration_below_floor_records_nothing() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([Script::steady(
            Duration::from_millis(5),
            16,
        )]));
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)));
        let plan = plan(&temp, Duration::from_millis(100))
            .min_segment_duration(Duration::from_millis(200))
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();
        assert_eq!(summary.reason, TerminalReason::Completed);
        assert_eq!(summary.attempts, 0);
        assert_eq!(source.opens(), 0);
        assert!(summary.files.is_empty());
        assert!(dir_entries(&temp).is_empty());
    }

    #[tokio::test]
    async fn timestamped_overwrite_keeps_earlier_attempts() {
        let temp = TempDir::new().unwrap();
        let flaky = Script::FailAfter {
            interval: Duration::from_millis(5),
            chunks: 4,
            chunk_size: 500,
        };
        let source = Arc::new(ScriptedSource::new([flaky, flaky]));
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)));
        let plan = RecordingPlan::builder(
            "http://radio.test/live",
            Duration::from_secs(60),
            temp.path().join("kalw"),
        )
        .force_overwrite(true)
        .max_retries(1)
        .min_segment_duration(Duration::from_millis(50))
        .build()
        .unwrap();

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.reason, TerminalReason::RetryBudgetExhausted);
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.files.len(), 2);
        assert_ne!(summary.files[0], summary.files[1]);
        assert_eq!(dir_entries(&temp).len(), 2);
        let on_disk: u64 = summary
            .files
            .iter()
            .map(|f| std::fs::metadata(f).unwrap().len())
            .sum();
        assert_eq!(on_disk, summary.bytes_written);
        assert_eq!(on_disk, 2 * 4 * 500);
    }

    #[tokio::test]
    async fn plain_overwrite_lists_reused_file_once() {
        let temp = TempDir::new().unwrap();
        let flaky = Script::FailAfter {
            interval: Duration::from_millis(5),
            chunks: 2,
            chunk_size: 64,
        };
        let source = Arc::new(ScriptedSource::new([flaky, flaky, flaky]));
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)));
        let plan = plan(&temp, Duration::from_secs(60))
            .force_overwrite(true)
            .max_retries(2)
            .build()
            .unwrap();

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.files, vec![temp.path().join("show.mp3")]);
        assert_eq!(dir_entries(&temp), summary.files);
    }

    #[tokio::test]
    async fn existing_output_aborts_before_any_request() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("show.mp3"), b"yesterday").unwrap();
        let source = Arc::new(ScriptedSource::new([Script::steady(
            Duration::from_millis(5),
            16,
        )]));
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)));
        let plan = plan(&temp, Duration::from_secs(1))
            .min_segment_duration(Duration::from_millis(100))
            .build()
            .unwrap();

        let err = session.run(&plan).await.unwrap_err();

        assert!(matches!(err, RecordError::OutputCollision { .. }));
        assert_eq!(source.opens(), 0);
        assert_eq!(
            std::fs::read(temp.path().join("show.mp3")).unwrap(),
            b"yesterday"
        );
    }

    #[tokio::test]
    async fn cancellation_during_backoff_ends_session() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([Script::Refuse]));
        let token = CancellationToken::new();
        let session = RecordingSession::new(source.clone(), &config(Duration::from_secs(60)))
            .with_cancellation(token.clone());
        let plan = plan(&temp, Duration::from_secs(600)).build().unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), session.run(&plan))
            .await
            .expect("session did not stop after cancellation")
            .unwrap();

        assert_eq!(summary.reason, TerminalReason::Cancelled);
        assert_eq!(summary.attempts, 1);
        assert_eq!(source.opens(), 1);
    }

    #[tokio::test]
    async fn cancellation_during_attempt_keeps_partial_file() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new([Script::steady(
            Duration::from_millis(5),
            32,
        )]));
        let token = CancellationToken::new();
        let session = RecordingSession::new(source.clone(), &config(Duration::from_millis(5)))
            .with_cancellation(token.clone());
        let plan = plan(&temp, Duration::from_secs(600)).build().unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let summary = session.run(&plan).await.unwrap();

        assert_eq!(summary.reason, TerminalReason::Cancelled);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.retries, 0);
        assert_eq!(summary.files, vec![temp.path().join("show.mp3")]);
        assert!(summary.bytes_written > 0);
    }
}
