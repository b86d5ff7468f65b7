//! Output file naming.
//!
//! Every attempt gets its own path. A path that already exists is only reused
//! when overwriting was requested; otherwise the first attempt fails with
//! [`RecordError::OutputCollision`] and later attempts receive a numeric
//! suffix so that no earlier output is ever clobbered or appended to.
//! Overwriting only ever applies to files from before the session: with
//! timestamped names a path written earlier in the same session is never
//! reused.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::{RecordError, RecordingPlan};

/// Minute resolution, matching one file per recording segment.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";

#[derive(Debug, Clone)]
pub struct OutputNamer {
    prefix: PathBuf,
    extension: String,
    use_timestamp: bool,
    force_overwrite: bool,
}

impl OutputNamer {
    pub fn new(
        prefix: impl Into<PathBuf>,
        extension: impl Into<String>,
        use_timestamp: bool,
        force_overwrite: bool,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
            use_timestamp,
            force_overwrite,
        }
    }

    pub fn from_plan(plan: &RecordingPlan) -> Self {
        Self::new(
            plan.output_prefix(),
            plan.file_extension(),
            plan.use_timestamp_suffix(),
            plan.force_overwrite(),
        )
    }

    /// Resolve the output path for attempt `attempt_index` (0-based) which
    /// starts at `started_at`. `written` holds the files earlier attempts of
    /// the same session left on disk.
    pub async fn name(
        &self,
        attempt_index: u32,
        started_at: DateTime<Local>,
        written: &[PathBuf],
    ) -> Result<PathBuf, RecordError> {
        let stem = if self.use_timestamp {
            let mut stem = self.prefix.as_os_str().to_owned();
            stem.push(format!("_{}", started_at.format(TIMESTAMP_FORMAT)));
            stem
        } else {
            self.prefix.as_os_str().to_owned()
        };

        let candidate = self.with_extension(&stem, None);
        if self.is_free(&candidate, written).await? {
            return Ok(candidate);
        }

        if attempt_index == 0 {
            return Err(RecordError::output_collision(candidate));
        }

        let mut suffix = attempt_index;
        loop {
            let path = self.with_extension(&stem, Some(suffix));
            if self.is_free(&path, written).await? {
                debug!(
                    taken = %candidate.display(),
                    path = %path.display(),
                    "Output path taken, using numbered name"
                );
                return Ok(path);
            }
            suffix = suffix.checked_add(1).ok_or_else(|| {
                RecordError::configuration(format!(
                    "no free output name left for {}",
                    candidate.display()
                ))
            })?;
        }
    }

    async fn is_free(&self, path: &Path, written: &[PathBuf]) -> Result<bool, RecordError> {
        if self.force_overwrite {
            // Plain names are reused on purpose when overwriting.
            return Ok(!self.use_timestamp || !written.iter().any(|p| p == path));
        }
        Ok(!exists(path).await?)
    }

    fn with_extension(&self, stem: &OsString, suffix: Option<u32>) -> PathBuf {
        let mut name = stem.clone();
        if let Some(n) = suffix {
            name.push(format!("_{n}"));
        }
        name.push(".");
        name.push(&self.extension);
        PathBuf::from(name)
    }
}

async fn exists(path: &Path) -> Result<bool, RecordError> {
    Ok(tokio::fs::try_exists(path).await?)
}
