use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("recording cancelled")]
    Cancelled,

    #[error("preset not found: `{name}` (available: {available})")]
    PresetNotFound { name: String, available: String },

    #[error("output file already exists: {}", path.display())]
    OutputCollision { path: PathBuf },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("stream ended by server")]
    StreamEnded,

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl RecordError {
    pub fn preset_not_found<'a>(
        name: impl Into<String>,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::PresetNotFound {
            name: name.into(),
            available: available.into_iter().collect::<Vec<_>>().join(", "),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn output_collision(path: impl Into<PathBuf>) -> Self {
        Self::OutputCollision { path: path.into() }
    }

    /// Faults of the remote stream. These are absorbed by the retry loop;
    /// everything else ends the session.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::StreamEnded
            | Self::Timeout(_) => true,
            Self::Cancelled
            | Self::PresetNotFound { .. }
            | Self::OutputCollision { .. }
            | Self::InvalidUrl { .. }
            | Self::Configuration { .. }
            | Self::Io { .. } => false,
        }
    }
}
