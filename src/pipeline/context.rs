//! Immutable per-network run context

use crate::snapshot_core::types::CheckpointSeries;

/// Everything a network iteration needs, resolved once up front.
///
/// Components receive this by reference; nothing mutates it mid-run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub token_name: String,
    pub network: String,
    /// The authoritative final-balance instant.
    pub snapshot_timestamp: i64,
    /// Chain block at or after the snapshot instant.
    pub snapshot_block: u64,
    pub checkpoints: CheckpointSeries,
    pub points_enabled: bool,
}
