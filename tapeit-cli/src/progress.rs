//! Terminal progress bar driven by session events.

use std::time::Duration;

use humansize::{BINARY, format_size};
use indicatif::ProgressStyle;
use parking_lot::Mutex;
use tapeit_engine::{SessionEvent, SessionObserver};
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const TEMPLATE: &str =
    "{span_child_prefix}{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {percent:>3}% {msg}";

#[derive(Default)]
struct BarState {
    span: Option<Span>,
    total: Duration,
    /// Recorded time of finished attempts.
    done: Duration,
}

/// Shows one bar per attempt, measured against the whole session so the bar
/// keeps its position across retries.
#[derive(Default)]
pub struct ProgressObserver {
    state: Mutex<BarState>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(TEMPLATE)
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl SessionObserver for ProgressObserver {
    fn on_event(&self, event: &SessionEvent) {
        let mut state = self.state.lock();
        match event {
            SessionEvent::SessionStarted { total, .. } => {
                state.total = *total;
                state.done = Duration::ZERO;
            }
            SessionEvent::AttemptStarted { index, path, .. } => {
                let span = info_span!("recording", indicatif.pb_show = tracing::field::Empty);
                span.pb_set_style(&Self::style());
                span.pb_set_length(millis(state.total));
                span.pb_set_position(millis(state.done));
                span.pb_set_message(&format!("#{index} {}", path.display()));
                span.pb_start();
                state.span = Some(span);
            }
            SessionEvent::Progress {
                index,
                bytes,
                elapsed,
                ..
            } => {
                let position = millis((state.done + *elapsed).min(state.total));
                if let Some(span) = &state.span {
                    span.pb_set_position(position);
                    span.pb_set_message(&format!("#{index} {}", format_size(*bytes, BINARY)));
                }
            }
            SessionEvent::AttemptEnded { elapsed, .. } => {
                state.done += *elapsed;
                // Dropping the span removes the bar.
                state.span = None;
            }
            SessionEvent::FileDiscarded { .. }
            | SessionEvent::RetryScheduled { .. }
            | SessionEvent::SessionEnded { .. } => {}
        }
    }
}
