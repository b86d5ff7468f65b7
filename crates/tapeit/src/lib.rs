//! # tapeit engine
//!
//! Records an internet radio stream for a fixed amount of wall-clock time.
//! When the stream breaks, recording continues in a new file for the time
//! that is left, after a pause, until a retry budget runs out.
//!
//! ```no_run
//! use std::time::Duration;
//! use tapeit_engine::{RecorderConfig, RecordingPlan, RecordingSession};
//!
//! # async fn demo() -> Result<(), tapeit_engine::RecordError> {
//! let plan = RecordingPlan::builder(
//!     "http://live.str3am.com:2430/kalw",
//!     Duration::from_secs(90 * 60),
//!     "radio/kalw_bluegrass_signal",
//! )
//! .build()?;
//!
//! let session = RecordingSession::http(&RecorderConfig::default())?;
//! let summary = session.run(&plan).await?;
//! println!("{} after {:?}", summary.reason, summary.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod namer;
pub mod preset;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{CaptureAttempt, CaptureOutcome, CaptureRequest, StreamCapture};
pub use config::{RecorderConfig, RecordingPlan, RecordingPlanBuilder};
pub use error::RecordError;
pub use events::{FanoutObserver, SessionEvent, SessionObserver, TracingObserver};
pub use namer::OutputNamer;
pub use preset::PresetTable;
pub use session::{RecordingSession, SessionSummary, TerminalReason};
pub use source::{ByteStream, HttpSource, StreamSource};

pub use tokio_util::sync::CancellationToken;
