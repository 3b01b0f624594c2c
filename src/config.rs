use std::path::PathBuf;
use std::str::FromStr;

use crate::model::Ms;

const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_RETENTION_MS: Ms = 7 * 24 * 3_600_000;

/// Daemon settings, read from `SPOTBOOK_*` environment variables.
/// Unset or unparsable values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    /// How long ended reservations are kept before the reaper prunes them.
    pub retention_ms: Ms,
    /// Optional file with one spot name per line, created at startup if missing.
    pub spots_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            retention_ms: DEFAULT_RETENTION_MS,
            spots_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("SPOTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parse_var(&lookup, "SPOTBOOK_METRICS_PORT"),
            compact_threshold: parse_var(&lookup, "SPOTBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            retention_ms: parse_var(&lookup, "SPOTBOOK_RETENTION_MS").unwrap_or(defaults.retention_ms),
            spots_file: lookup("SPOTBOOK_SPOTS_FILE").map(PathBuf::from),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("spotbook.wal")
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Spot names from a seed file: trimmed, blank lines and `#` comments skipped.
pub fn parse_spot_names(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
