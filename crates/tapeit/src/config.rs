use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::RecordError;

pub const DEFAULT_USER_AGENT: &str = concat!("tapeit/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_EXTENSION: &str = "mp3";
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_MIN_SEGMENT: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Knobs of the transport and the retry loop. Unlike [`RecordingPlan`], none
/// of these change what gets recorded, only how hard we try.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Time allowed to establish the connection and receive response headers
    pub connect_timeout: Duration,

    /// Maximum time between two received chunks before the attempt is
    /// abandoned as stalled
    pub read_timeout: Duration,

    /// Fixed pause between a failed attempt and the next one
    pub backoff: Duration,

    /// User agent string
    pub user_agent: String,

    /// Extra request headers
    pub headers: HeaderMap,

    /// Proxy URL (`http://`, `https://` or `socks5://`)
    pub proxy: Option<String>,

    /// Minimum interval between two progress events of one attempt
    pub progress_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            backoff: DEFAULT_BACKOFF,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: RecorderConfig::get_default_headers(),
            proxy: None,
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl RecorderConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        // Raw bytes are written as received, never ask for a transfer encoding.
        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers
    }
}

/// What to record, where to put it and how much failure to tolerate.
///
/// Built once through [`RecordingPlan::builder`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RecordingPlan {
    source_url: Url,
    total_duration: Duration,
    output_prefix: PathBuf,
    use_timestamp_suffix: bool,
    force_overwrite: bool,
    file_extension: String,
    max_retries: u32,
    min_segment_duration: Duration,
}

impl RecordingPlan {
    pub fn builder(
        source_url: impl Into<String>,
        total_duration: Duration,
        output_prefix: impl Into<PathBuf>,
    ) -> RecordingPlanBuilder {
        RecordingPlanBuilder {
            source_url: source_url.into(),
            total_duration,
            output_prefix: output_prefix.into(),
            use_timestamp_suffix: true,
            force_overwrite: false,
            file_extension: DEFAULT_EXTENSION.to_owned(),
            max_retries: DEFAULT_MAX_RETRIES,
            min_segment_duration: DEFAULT_MIN_SEGMENT,
        }
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn output_prefix(&self) -> &Path {
        &self.output_prefix
    }

    pub fn use_timestamp_suffix(&self) -> bool {
        self.use_timestamp_suffix
    }

    pub fn force_overwrite(&self) -> bool {
        self.force_overwrite
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn min_segment_duration(&self) -> Duration {
        self.min_segment_duration
    }
}

#[derive(Debug, Clone)]
pub struct RecordingPlanBuilder {
    source_url: String,
    total_duration: Duration,
    output_prefix: PathBuf,
    use_timestamp_suffix: bool,
    force_overwrite: bool,
    file_extension: String,
    max_retries: u32,
    min_segment_duration: Duration,
}

impl RecordingPlanBuilder {
    /// Append the attempt start time (`_YYYYmmdd_HHMM`) to every filename.
    pub fn timestamp_suffix(mut self, enabled: bool) -> Self {
        self.use_timestamp_suffix = enabled;
        self
    }

    pub fn force_overwrite(mut self, enabled: bool) -> Self {
        self.force_overwrite = enabled;
        self
    }

    pub fn file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn min_segment_duration(mut self, floor: Duration) -> Self {
        self.min_segment_duration = floor;
        self
    }

    pub fn build(self) -> Result<RecordingPlan, RecordError> {
        let source_url = Url::parse(&self.source_url)
            .map_err(|e| RecordError::invalid_url(&self.source_url, e.to_string()))?;
        if !matches!(source_url.scheme(), "http" | "https") {
            return Err(RecordError::invalid_url(
                &self.source_url,
                format!("unsupported scheme `{}`", source_url.scheme()),
            ));
        }

        if self.total_duration.is_zero() {
            return Err(RecordError::configuration(
                "recording duration must be greater than zero",
            ));
        }

        if self.output_prefix.as_os_str().is_empty() {
            return Err(RecordError::configuration("output prefix is empty"));
        }

        let file_extension = self.file_extension.trim_start_matches('.').to_owned();
        if file_extension.is_empty() {
            return Err(RecordError::configuration("file extension is empty"));
        }

        Ok(RecordingPlan {
            source_url,
            total_duration: self.total_duration,
            output_prefix: self.output_prefix,
            use_timestamp_suffix: self.use_timestamp_suffix,
            force_overwrite: self.force_overwrite,
            file_extension,
            max_retries: self.max_retries,
            min_segment_duration: self.min_segment_duration,
        })
    }
}
