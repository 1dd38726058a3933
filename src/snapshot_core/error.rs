//! Error taxonomy for the snapshot core

use thiserror::Error;

/// Errors surfaced by the snapshot core.
///
/// Per-pool failures (`EmptyInput`, `MissingRatio`) halt only that pool's
/// pipeline; the run continues with sibling pools. `SchemaMismatch` is a
/// loud failure: a merge step found the table in a shape it cannot use.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    /// No transfer events were available for a pool.
    #[error("no transfer events to process for pool '{pool}'")]
    EmptyInput { pool: String },
    /// No usable LP exchange ratio exists for a checkpoint.
    #[error("missing LP ratio for checkpoint {timestamp}")]
    MissingRatio { timestamp: i64 },
    /// An address failed checksum normalization.
    #[error("invalid address '{input}'")]
    InvalidAddress { input: String },
    /// Expected columns or assignments were absent during a merge step.
    #[error("schema mismatch: {what}")]
    SchemaMismatch { what: String },
    /// A checkpoint series was empty or not strictly ascending.
    #[error("invalid checkpoint series: {reason}")]
    InvalidCheckpoints { reason: String },
    /// A tier table was empty or its minimums were not ascending.
    #[error("invalid tier table: {reason}")]
    InvalidTiers { reason: String },
}
