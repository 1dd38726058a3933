//! File-backed caches and report outputs
//!
//! Caches are append-only delimited files extended incrementally across
//! runs; every rewrite goes through a temp file and an atomic rename so an
//! interrupted run never leaves a half-written cache behind.

pub mod kyc_export;
pub mod lp_cache;
pub mod report;
pub mod txn_cache;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

pub use kyc_export::{read_kyc_export, write_kyc_export};
pub use lp_cache::LpCache;
pub use txn_cache::TxnCache;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A file exists but its contents cannot be interpreted.
    #[error("malformed file {path}: {detail}")]
    Malformed { path: String, detail: String },
    /// A report column could not be mapped back to a known role.
    #[error("unrecognized column '{label}' in {path}")]
    UnknownColumn { path: String, label: String },
}

/// Create (if needed) and return `parent/name`.
pub fn ensure_dir(parent: &Path, name: &str) -> io::Result<PathBuf> {
    let dir = parent.join(name);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Whether a file is older than `max_age_hours`, or absent.
pub fn is_stale(path: &Path, max_age_hours: u64) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else {
        return true;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age.as_secs() > max_age_hours * 3600,
        Err(_) => false,
    }
}

/// Write to a sibling temp file, then atomically replace `path`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
