//! One bounded-duration attempt: stream bytes from the source into a fresh
//! output file until the requested wall-clock time has passed.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::events::{SessionEvent, SessionObserver};
use crate::source::StreamSource;
use crate::{RecordError, RecorderConfig};

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The full requested duration was recorded.
    Completed,
    /// The connection failed, errored or was closed before the deadline.
    FailedEarly,
    /// The stream stopped delivering data for longer than the read timeout.
    TimedOut,
    /// The operator interrupted the recording.
    Cancelled,
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureOutcome::Completed => write!(f, "completed"),
            CaptureOutcome::FailedEarly => write!(f, "failed early"),
            CaptureOutcome::TimedOut => write!(f, "timed out"),
            CaptureOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one attempt. Never outlives the controller iteration that
/// created it.
#[derive(Debug)]
pub struct CaptureAttempt {
    pub output_path: PathBuf,
    pub requested_duration: Duration,
    pub bytes_written: u64,
    /// Measured wall-clock time from the start of the attempt until the file
    /// was closed, connection setup included.
    pub elapsed: Duration,
    pub outcome: CaptureOutcome,
    /// False when the file ended up empty and was deleted.
    pub kept: bool,
    /// Transport fault behind a `FailedEarly` or `TimedOut` outcome.
    pub failure: Option<RecordError>,
}

/// Parameters of a single attempt.
#[derive(Debug, Clone)]
pub struct CaptureRequest<'a> {
    pub url: &'a Url,
    pub output_path: PathBuf,
    pub duration: Duration,
    /// Whether an existing file at `output_path` may be truncated.
    pub overwrite: bool,
    pub attempt_index: u32,
}

pub struct StreamCapture {
    source: Arc<dyn StreamSource>,
    read_timeout: Duration,
    progress_interval: Duration,
}

struct Stop {
    outcome: CaptureOutcome,
    failure: Option<RecordError>,
}

impl Stop {
    fn new(outcome: CaptureOutcome) -> Self {
        Self {
            outcome,
            failure: None,
        }
    }

    fn failed(outcome: CaptureOutcome, failure: RecordError) -> Self {
        Self {
            outcome,
            failure: Some(failure),
        }
    }
}

impl StreamCapture {
    pub fn new(source: Arc<dyn StreamSource>, config: &RecorderConfig) -> Self {
        Self {
            source,
            read_timeout: config.read_timeout,
            progress_interval: config.progress_interval,
        }
    }

    /// Run one attempt.
    ///
    /// Transport faults are reported through [`CaptureAttempt::outcome`].
    /// `Err` is returned only for faults of the output side: an existing file
    /// that may not be overwritten, or a failing local write. The output file
    /// is closed, and removed if empty, on every path.
    #[instrument(
        skip_all,
        fields(attempt = request.attempt_index, path = %request.output_path.display()),
        level = "debug"
    )]
    pub async fn capture(
        &self,
        request: CaptureRequest<'_>,
        observer: &dyn SessionObserver,
        token: &CancellationToken,
    ) -> Result<CaptureAttempt, RecordError> {
        let started = Instant::now();
        let deadline = deadline_after(started, request.duration);

        let mut file = OutputFile::create(&request.output_path, request.overwrite).await?;
        observer.on_event(&SessionEvent::AttemptStarted {
            index: request.attempt_index,
            path: request.output_path.clone(),
            requested: request.duration,
        });

        let pumped = self
            .pump(&mut file, &request, started, deadline, observer, token)
            .await;
        let bytes_written = file.bytes_written();
        let kept = file.close().await;
        let elapsed = started.elapsed();

        // A write failure outranks a failure to clean up after it.
        let stop = pumped?;
        let kept = kept?;

        observer.on_event(&SessionEvent::AttemptEnded {
            index: request.attempt_index,
            path: request.output_path.clone(),
            outcome: stop.outcome,
            bytes: bytes_written,
            elapsed,
            error: stop.failure.as_ref().map(ToString::to_string),
        });
        if !kept {
            observer.on_event(&SessionEvent::FileDiscarded {
                path: request.output_path.clone(),
            });
        }

        Ok(CaptureAttempt {
            output_path: request.output_path,
            requested_duration: request.duration,
            bytes_written,
            elapsed,
            outcome: stop.outcome,
            kept,
            failure: stop.failure,
        })
    }

    async fn pump(
        &self,
        file: &mut OutputFile,
        request: &CaptureRequest<'_>,
        started: Instant,
        deadline: Instant,
        observer: &dyn SessionObserver,
        token: &CancellationToken,
    ) -> Result<Stop, RecordError> {
        let open_deadline = deadline_after(Instant::now(), self.read_timeout).min(deadline);
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Stop::new(CaptureOutcome::Cancelled)),
            opened = timeout_at(open_deadline, self.source.open(request.url)) => opened,
        };

        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Ok(Stop::failed(CaptureOutcome::FailedEarly, e)),
            Err(_) => {
                return Ok(Stop::failed(
                    CaptureOutcome::TimedOut,
                    RecordError::Timeout(open_deadline - started),
                ));
            }
        };

        let mut last_progress = Instant::now();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Stop::new(CaptureOutcome::Completed));
            }

            // A read never waits past the attempt deadline, nor longer than
            // the stall limit.
            let read_deadline = deadline_after(now, self.read_timeout).min(deadline);
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Stop::new(CaptureOutcome::Cancelled)),
                next = timeout_at(read_deadline, stream.next()) => next,
            };

            match next {
                Err(_) if read_deadline >= deadline => {
                    return Ok(Stop::new(CaptureOutcome::Completed));
                }
                Err(_) => {
                    return Ok(Stop::failed(
                        CaptureOutcome::TimedOut,
                        RecordError::Timeout(self.read_timeout),
                    ));
                }
                Ok(None) => {
                    return Ok(Stop::failed(
                        CaptureOutcome::FailedEarly,
                        RecordError::StreamEnded,
                    ));
                }
                Ok(Some(Err(e))) => {
                    return Ok(Stop::failed(CaptureOutcome::FailedEarly, e));
                }
                Ok(Some(Ok(chunk))) => {
                    file.write(&chunk).await?;

                    if last_progress.elapsed() >= self.progress_interval {
                        last_progress = Instant::now();
                        observer.on_event(&SessionEvent::Progress {
                            index: request.attempt_index,
                            bytes: file.bytes_written(),
                            elapsed: started.elapsed(),
                            requested: request.duration,
                        });
                    }
                }
            }
        }
    }
}

/// Stand-in for a span too long to add to an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline_after(from: Instant, span: Duration) -> Instant {
    from.checked_add(span).unwrap_or_else(|| from + FAR_FUTURE)
}

/// Output file of one attempt.
///
/// [`OutputFile::close`] flushes, closes and deletes the file if it is empty.
/// If the handle is dropped without being closed, an empty file is still
/// removed.
struct OutputFile {
    path: PathBuf,
    file: Option<File>,
    bytes: u64,
    closed: bool,
}

impl OutputFile {
    async fn create(path: &Path, overwrite: bool) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = options.open(path).await.map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                RecordError::output_collision(path)
            } else {
                RecordError::from(e)
            }
        })?;

        debug!(path = %path.display(), overwrite, "Opened output file");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            bytes: 0,
            closed: false,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), RecordError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.bytes += chunk.len() as u64;
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Returns whether the file was kept.
    async fn close(mut self) -> Result<bool, RecordError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_data().await?;
        }
        self.closed = true;

        let len = tokio::fs::metadata(&self.path).await?.len();
        if len == 0 {
            debug!(path = %self.path.display(), "Deleting empty file");
            tokio::fs::remove_file(&self.path).await?;
            return Ok(false);
        }
        Ok(true)
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if !self.closed && self.bytes == 0 {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
