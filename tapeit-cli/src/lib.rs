//! Library target for the `tapeit` package.
//!
//! The deliverable is the `tapeit` binary (`src/main.rs`); the modules live
//! here so they can be unit tested.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;

use serde_json::json;
use tapeit_engine::{
    CancellationToken, FanoutObserver, RecordingSession, SessionSummary, TerminalReason,
    TracingObserver,
};
use tracing::{debug, info, warn};

use crate::cli::Args;
use crate::config::{FileConfig, resolve};
use crate::error::AppError;
use crate::progress::ProgressObserver;

/// Process exit code for a terminal reason.
pub fn exit_code(reason: TerminalReason) -> i32 {
    match reason {
        TerminalReason::Completed => 0,
        TerminalReason::RetryBudgetExhausted => 2,
        TerminalReason::Cancelled => 130,
    }
}

pub async fn run(args: Args) -> Result<TerminalReason, AppError> {
    let file = FileConfig::load(args.config.as_deref())?;

    if args.list_presets {
        for (name, url) in file.preset_table().iter() {
            println!("{name:<16} {url}");
        }
        return Ok(TerminalReason::Completed);
    }

    let resolved = resolve(&args, &file)?;
    debug!(plan = ?resolved.plan, recorder = ?resolved.recorder, "Resolved configuration");

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current file");
            interrupt.cancel();
        }
    });

    let mut observer = FanoutObserver::new().with(TracingObserver);
    if !args.quiet && !args.json {
        observer = observer.with(ProgressObserver::new());
    }

    let session = RecordingSession::http(&resolved.recorder)?
        .with_observer(observer)
        .with_cancellation(token);
    let summary = session.run(&resolved.plan).await?;

    report(&summary, args.json)?;
    Ok(summary.reason)
}

fn report(summary: &SessionSummary, as_json: bool) -> Result<(), AppError> {
    if as_json {
        let files: Vec<String> = summary
            .files
            .iter()
            .map(|f| f.display().to_string())
            .collect();
        let value = json!({
            "status": summary.reason.to_string(),
            "started_at": summary.started_at.to_rfc3339(),
            "attempts": summary.attempts,
            "retries": summary.retries,
            "elapsed_secs": summary.elapsed.as_secs_f64(),
            "bytes_written": summary.bytes_written,
            "files": files,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match summary.reason {
        TerminalReason::Completed => {}
        TerminalReason::RetryBudgetExhausted => warn!(
            retries = summary.retries,
            "Gave up after {} failed attempts",
            summary.retries + 1
        ),
        TerminalReason::Cancelled => info!("Recording interrupted"),
    }
    for file in &summary.files {
        eprintln!("{}", file.display());
    }
    Ok(())
}
