//! Named radio station presets.
//!
//! Lookup is an exact match on an ordered map, so resolution and the list of
//! available names in error messages are deterministic.

use std::collections::BTreeMap;

use tracing::debug;

use crate::RecordError;

/// Stations known without any configuration.
pub const BUILTIN_PRESETS: &[(&str, &str)] = &[
    ("kalw", "http://live.str3am.com:2430/kalw"),
    ("kpfa", "http://streams1.kpfa.org:8000/kpfa_64"),
];

pub const DEFAULT_PRESET: &str = "kalw";

#[derive(Debug, Clone, Default)]
pub struct PresetTable {
    entries: BTreeMap<String, String>,
}

impl PresetTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_PRESETS
                .iter()
                .map(|(name, url)| ((*name).to_owned(), (*url).to_owned()))
                .collect(),
        }
    }

    /// Add presets, replacing existing entries of the same name.
    pub fn extend<I, K, V>(&mut self, presets: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, url) in presets {
            self.entries.insert(name.into(), url.into());
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&str, RecordError> {
        match self.entries.get(name) {
            Some(url) => {
                debug!(preset = name, url = %url, "Resolved preset");
                Ok(url)
            }
            None => Err(RecordError::preset_not_found(name, self.names())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
