//! Tier bucketing from total holdings

use rust_decimal::Decimal;

use super::error::SnapshotError;

/// One tier threshold: the minimum holding and the allocation weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub min_tokens: Decimal,
    pub pool_weight: Decimal,
}

/// A wallet's assigned tier and pool weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierAssignment {
    pub tier: usize,
    pub pool_weight: Decimal,
}

/// Ordered tier thresholds; index 0 is the zero-weight floor tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, SnapshotError> {
        if tiers.is_empty() {
            return Err(SnapshotError::InvalidTiers {
                reason: "tier table is empty".to_string(),
            });
        }
        if tiers.windows(2).any(|w| w[0].min_tokens >= w[1].min_tokens) {
            return Err(SnapshotError::InvalidTiers {
                reason: "tier minimums must be strictly ascending".to_string(),
            });
        }
        Ok(Self { tiers })
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// The highest tier whose minimum the total reaches.
    ///
    /// Amounts exactly equal to a tier's minimum belong to that tier, not
    /// the one below; monotonic in the total by construction.
    pub fn classify(&self, total: Decimal) -> TierAssignment {
        for i in 0..self.tiers.len() - 1 {
            if total < self.tiers[i + 1].min_tokens {
                return TierAssignment {
                    tier: i,
                    pool_weight: self.tiers[i].pool_weight,
                };
            }
        }
        let last = self.tiers.len() - 1;
        TierAssignment {
            tier: last,
            pool_weight: self.tiers[last].pool_weight,
        }
    }
}
