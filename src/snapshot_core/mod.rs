//! Snapshot Core - Balance Reconstruction Engine
//!
//! This module reconstructs per-wallet holdings for staking and farming
//! pools at historical checkpoints and derives the launchpad outputs from
//! them.
//!
//! # Architecture
//!
//! ```text
//! TransferEvent list -> filter (denylist, signed deltas)
//!     |
//! accumulator (clamped cumulative balances per checkpoint)
//!     |
//! lp_ratio (LP units -> underlying-token units, optional)
//!     |
//! points (per-pool columns + loyalty points)
//!     |
//! merge (network tables, project table, KYC/registration/delegation)
//!     |
//! tiers (total holdings -> tier + pool weight)
//! ```

pub mod accumulator;
pub mod address;
pub mod error;
pub mod filter;
pub mod lp_ratio;
pub mod merge;
pub mod points;
pub mod tiers;
pub mod types;

pub use accumulator::{accumulate, BalanceTable};
pub use error::SnapshotError;
pub use filter::{filter_events, FilteredEvents, WalletDelta};
pub use lp_ratio::{convert, ConvertedBalances, LpRatioSample, LpRatioSeries};
pub use merge::{
    resolve_kyc_records, ColumnRole, ColumnSpec, Delegation, KycRecord, KycStatus, RegStatus,
    WideRow, WideTable,
};
pub use points::{build_pool_snapshot, PoolColumns, PoolRow, PoolSnapshot};
pub use tiers::{Tier, TierAssignment, TierTable};
pub use types::{CheckpointSeries, PoolKind, PoolSpec, TransferEvent};
