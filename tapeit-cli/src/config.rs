//! Resolution of command-line flags and the optional config file into what
//! the engine needs. Flags win over the file, the file wins over built-in
//! defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tapeit_engine::preset::DEFAULT_PRESET;
use tapeit_engine::{PresetTable, RecorderConfig, RecordingPlan, config as engine};
use tracing::debug;

use crate::cli::Args;
use crate::error::AppError;

/// Contents of `config.toml`.
///
/// ```toml
/// [presets]
/// wfmu = "http://stream0.wfmu.org/freeform-128k"
///
/// [defaults]
/// max_retries = 5
/// backoff_secs = 30
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub presets: BTreeMap<String, String>,
    pub defaults: Defaults,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    pub extension: Option<String>,
    pub max_retries: Option<u32>,
    pub min_segment_secs: Option<f64>,
    pub backoff_secs: Option<f64>,
    pub read_timeout_secs: Option<f64>,
    pub connect_timeout_secs: Option<f64>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl FileConfig {
    /// Load `explicit`, which must exist, or the default location, which may
    /// be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        debug!(path = %path.display(), "Loading config file");
        let content = std::fs::read_to_string(&path).map_err(|source| AppError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, AppError> {
        toml::from_str(content).map_err(|e| AppError::ConfigParse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tapeit").join("config.toml"))
    }

    pub fn preset_table(&self) -> PresetTable {
        let mut table = PresetTable::builtin();
        table.extend(self.presets.clone());
        table
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub plan: RecordingPlan,
    pub recorder: RecorderConfig,
}

pub fn resolve(args: &Args, file: &FileConfig) -> Result<Resolved, AppError> {
    let defaults = &file.defaults;

    // The preset must resolve before anything touches the disk or network.
    let url = match &args.url {
        Some(url) => url.clone(),
        None => {
            let name = args.preset.as_deref().unwrap_or(DEFAULT_PRESET);
            file.preset_table().resolve(name)?.to_owned()
        }
    };

    let (prefix, timestamped) = match (&args.prefix, &args.plain_prefix) {
        (Some(prefix), _) => (prefix.clone(), true),
        (None, Some(prefix)) => (prefix.clone(), false),
        (None, None) => {
            return Err(AppError::InvalidInput(
                "an output prefix (-o or -O) is required".to_string(),
            ));
        }
    };

    let total = secs("duration", args.duration_minutes * 60.0)?;
    let min_segment = args
        .min_segment
        .or(defaults.min_segment_secs)
        .map(|s| secs("min segment", s))
        .transpose()?
        .unwrap_or(engine::DEFAULT_MIN_SEGMENT);
    let extension = args
        .extension
        .clone()
        .or_else(|| defaults.extension.clone())
        .unwrap_or_else(|| engine::DEFAULT_EXTENSION.to_owned());
    let max_retries = args
        .max_retries
        .or(defaults.max_retries)
        .unwrap_or(engine::DEFAULT_MAX_RETRIES);

    let plan = RecordingPlan::builder(url, total, prefix)
        .timestamp_suffix(timestamped)
        .force_overwrite(args.force)
        .file_extension(extension)
        .max_retries(max_retries)
        .min_segment_duration(min_segment)
        .build()?;

    let mut recorder = RecorderConfig::default();
    if let Some(backoff) = args.backoff.or(defaults.backoff_secs) {
        recorder.backoff = secs("backoff", backoff)?;
    }
    if let Some(read_timeout) = args.read_timeout.or(defaults.read_timeout_secs) {
        recorder.read_timeout = secs("read timeout", read_timeout)?;
    }
    if let Some(connect_timeout) = defaults.connect_timeout_secs {
        recorder.connect_timeout = secs("connect timeout", connect_timeout)?;
    }
    if let Some(user_agent) = &defaults.user_agent {
        recorder.user_agent = user_agent.clone();
    }
    recorder.proxy = args.proxy.clone().or_else(|| defaults.proxy.clone());

    if recorder.read_timeout.is_zero() {
        return Err(AppError::InvalidInput(
            "read timeout must be greater than zero".to_string(),
        ));
    }

    Ok(Resolved { plan, recorder })
}

fn secs(what: &str, value: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| AppError::InvalidInput(format!("invalid {what}: {value} seconds")))
}
