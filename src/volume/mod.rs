//! Volume backup and restore.

pub mod backup;
pub mod filter;
pub mod restore;

use chrono::{Local, NaiveDate};

/// Archive files are gzip-compressed tar streams.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Archive file name for a volume: `<name>_<YYYY-MM-DD>.tar.gz`.
pub fn archive_file_name(volume: &str) -> String {
    format!(
        "{}_{}{}",
        volume,
        Local::now().format("%Y-%m-%d"),
        ARCHIVE_SUFFIX
    )
}

/// Derive the target volume name from an archive file name.
///
/// Strips the `.tar.gz` suffix, then a trailing `_<YYYY-MM-DD>` date stamp
/// when one is present, so names produced by [`archive_file_name`] round-trip
/// even when the volume name itself contains underscores. Plain
/// `<name>.tar.gz` files restore under their stem. Returns `None` for files
/// that are not archives.
pub fn volume_name_from_archive(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    if let Some((base, suffix)) = stem.rsplit_once('_') {
        if !base.is_empty() && NaiveDate::parse_from_str(suffix, "%Y-%m-%d").is_ok() {
            return Some(base.to_string());
        }
    }
    Some(stem.to_string())
}

/// Outcome of one per-volume operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Skipped,
    Failed(String),
}

/// Aggregated result of a backup or restore run. Each volume's outcome is
/// recorded exactly once.
#[derive(Debug, Default)]
pub struct Summary {
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl Summary {
    pub fn record(&mut self, name: String, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => self.succeeded.push(name),
            Outcome::Skipped => self.skipped.push(name),
            Outcome::Failed(reason) => self.failed.push((name, reason)),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
