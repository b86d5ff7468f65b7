use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::filter::{IndicatifFilter, hide_indicatif_span_fields};
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::AppError;

/// Filter directive for a `-v` count, used when `RUST_LOG` is not set.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "tapeit=info,tapeit_engine=info,warn",
        (false, 2) => "tapeit=debug,tapeit_engine=debug,info",
        (false, _) => "trace",
    }
}

/// Install the global subscriber. Log lines go to stderr through the
/// indicatif writer so they do not tear the progress bar.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    // Only spans that ask for a bar get one.
    let indicatif_layer = IndicatifLayer::new()
        .with_span_field_formatter(hide_indicatif_span_fields(DefaultFields::new()));
    let writer = indicatif_layer.get_stderr_writer();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_target(verbose >= 2)
                .with_filter(filter),
        )
        .with(indicatif_layer.with_filter(IndicatifFilter::new(false)))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
