use std::path::PathBuf;

use clap::{ArgAction, Parser};

const EXAMPLES: &str = "\
Examples:
  tapeit -p kalw -o ~/media/radio/kalw_bluegrass_signal -d 90
  tapeit -u http://live.str3am.com:2430/kalw -o ~/media/radio/kalw";

/// Records an Internet radio stream for a certain duration and keeps
/// recording for the remaining duration when the stream breaks.
#[derive(Parser, Debug, Clone)]
#[command(name = "tapeit", version, about, after_help = EXAMPLES)]
pub struct Args {
    /// Prefix for output filenames with appended timestamp
    #[arg(
        short = 'o',
        value_name = "OUTFILEPREFIX",
        conflicts_with = "plain_prefix",
        required_unless_present_any = ["plain_prefix", "list_presets"]
    )]
    pub prefix: Option<PathBuf>,

    /// Prefix for output filenames without appended timestamp
    #[arg(short = 'O', value_name = "OUTFILEPREFIX")]
    pub plain_prefix: Option<PathBuf>,

    /// Radio station URL
    #[arg(short = 'u', long, conflicts_with = "preset")]
    pub url: Option<String>,

    /// Radio station preset [default: kalw]
    #[arg(short = 'p', long, value_name = "PRESETNAME")]
    pub preset: Option<String>,

    /// Duration of recording in minutes
    #[arg(short = 'd', long = "duration", value_name = "MINUTES", default_value_t = 60.0, value_parser = parse_minutes)]
    pub duration_minutes: f64,

    /// Output file extension [default: mp3]
    #[arg(short = 'e', long)]
    pub extension: Option<String>,

    /// Overwrite existing output files
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Failed attempts tolerated before giving up [default: 10]
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Do not start a new attempt with less than this many seconds left [default: 30]
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub min_segment: Option<f64>,

    /// Pause before retrying a failed attempt, in seconds [default: 60]
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub backoff: Option<f64>,

    /// Abandon an attempt when no data arrives for this many seconds [default: 30]
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub read_timeout: Option<f64>,

    /// Proxy URL (http://, https:// or socks5://)
    #[arg(long, env = "TAPEIT_PROXY")]
    pub proxy: Option<String>,

    /// Configuration file [default: <config dir>/tapeit/config.toml]
    #[arg(short = 'c', long, env = "TAPEIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the session summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// List the known presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// Print info (-vv for debug, -vvv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

fn parse_minutes(s: &str) -> Result<f64, String> {
    let minutes: f64 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a number of minutes"))?;
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(format!("duration must be positive, got `{s}`"));
    }
    Ok(minutes)
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a number of seconds"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("seconds must be zero or more, got `{s}`"));
    }
    Ok(secs)
}
