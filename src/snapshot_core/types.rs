//! Core data model for snapshot computation

use alloy_primitives::Address;
use rust_decimal::Decimal;

use super::error::SnapshotError;

/// One token transfer touching a pool contract.
///
/// Values are raw on-chain units with no decimal scaling. A `None` side
/// means the address failed normalization upstream and is excluded from
/// wallet consideration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferEvent {
    pub block_number: u64,
    pub timestamp: i64,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: u128,
}

/// Whether a pool stakes the target token directly or farms an LP pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Stake,
    Farm,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Stake => "stake",
            PoolKind::Farm => "farm",
        }
    }
}

/// Pool metadata resolved during discovery.
///
/// The multiplier is a percentage used only for points accrual; the owner
/// feeds the exclusion list, never the balance computation.
#[derive(Debug, Clone)]
pub struct PoolSpec {
    pub name: String,
    pub contract: Address,
    pub multiplier: Decimal,
    pub owner: Option<Address>,
    pub target_token: Address,
    pub kind: PoolKind,
}

/// Ordered snapshot instants.
///
/// The last element is the authoritative final-balance instant; interior
/// elements contribute to points when the series spans more than one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSeries(Vec<i64>);

impl CheckpointSeries {
    pub fn new(timestamps: Vec<i64>) -> Result<Self, SnapshotError> {
        if timestamps.is_empty() {
            return Err(SnapshotError::InvalidCheckpoints {
                reason: "series is empty".to_string(),
            });
        }
        if timestamps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SnapshotError::InvalidCheckpoints {
                reason: "timestamps must be strictly ascending".to_string(),
            });
        }
        Ok(Self(timestamps))
    }

    /// Daily checkpoints ending at `end`, one per day of the scoring window.
    /// A period below one day degenerates to a single instantaneous query.
    pub fn daily(end: i64, period_days: usize, day_secs: i64) -> Self {
        let days = period_days.max(1);
        let start = end - (days as i64 - 1) * day_secs;
        Self((0..days).map(|i| start + i as i64 * day_secs).collect())
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The final-balance instant.
    pub fn last(&self) -> i64 {
        *self.0.last().unwrap_or(&0)
    }

    /// More than one checkpoint means the series spans a scoring window.
    pub fn spans_window(&self) -> bool {
        self.0.len() > 1
    }
}

/// Raw on-chain units as an exact decimal integer.
pub fn units_to_decimal(units: u128) -> Decimal {
    Decimal::try_from_i128_with_scale(units as i128, 0).unwrap_or(Decimal::MAX)
}
