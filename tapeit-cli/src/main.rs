use std::process;

use clap::Parser;
use tapeit::cli::Args;
use tapeit::logging::init_logging;
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.quiet) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let started = std::time::Instant::now();
    debug!(args = ?args, "tapeit started");

    match tapeit::run(args).await {
        Ok(reason) => {
            debug!(elapsed = ?started.elapsed(), reason = %reason, "tapeit ended");
            process::exit(tapeit::exit_code(reason));
        }
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
