//! Historical LP exchange-ratio series and unit conversion

use std::collections::BTreeMap;

use alloy_primitives::Address;
use rust_decimal::Decimal;

use super::accumulator::BalanceTable;
use super::error::SnapshotError;
use super::types::{units_to_decimal, CheckpointSeries};

/// Total LP supply and underlying-token reserve observed at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpRatioSample {
    pub lp_supply: u128,
    pub token_reserve: u128,
}

/// Timestamp-keyed exchange samples for one LP contract.
///
/// The series is an incremental cache: samples already present are never
/// recomputed, missing checkpoints are back-filled from a collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LpRatioSeries {
    samples: BTreeMap<i64, LpRatioSample>,
}

impl LpRatioSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timestamp: i64, sample: LpRatioSample) {
        self.samples.insert(timestamp, sample);
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.samples.contains_key(&timestamp)
    }

    pub fn get(&self, timestamp: i64) -> Option<&LpRatioSample> {
        self.samples.get(&timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i64, &LpRatioSample)> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Underlying reserve divided by LP supply at a checkpoint.
    ///
    /// `None` when no sample exists or the recorded supply is zero; callers
    /// must treat that as an error condition, never as a zero ratio.
    pub fn ratio_at(&self, timestamp: i64) -> Option<Decimal> {
        let sample = self.samples.get(&timestamp)?;
        if sample.lp_supply == 0 {
            return None;
        }
        units_to_decimal(sample.token_reserve).checked_div(units_to_decimal(sample.lp_supply))
    }

    /// Checkpoints not yet covered by a sample.
    pub fn missing_for(&self, checkpoints: &CheckpointSeries) -> Vec<i64> {
        checkpoints
            .as_slice()
            .iter()
            .copied()
            .filter(|ts| !self.samples.contains_key(ts))
            .collect()
    }
}

/// LP balances converted to underlying-token units, plus the retained
/// pre-conversion final-checkpoint LP amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedBalances {
    pub token_units: BTreeMap<Address, Vec<Decimal>>,
    pub lp_final: BTreeMap<Address, u128>,
}

/// Multiply every checkpoint balance by that checkpoint's exchange ratio.
///
/// Fails with `MissingRatio` on the first checkpoint without a usable
/// sample; the caller decides whether to degrade the pool to unconverted.
pub fn convert(
    table: &BalanceTable,
    series: &LpRatioSeries,
) -> Result<ConvertedBalances, SnapshotError> {
    let ratios: Vec<Decimal> = table
        .checkpoints
        .iter()
        .map(|&ts| {
            series
                .ratio_at(ts)
                .ok_or(SnapshotError::MissingRatio { timestamp: ts })
        })
        .collect::<Result<_, _>>()?;

    let mut token_units = BTreeMap::new();
    let mut lp_final = BTreeMap::new();
    for (wallet, row) in &table.rows {
        let converted: Vec<Decimal> = row
            .iter()
            .zip(&ratios)
            .map(|(&units, ratio)| units_to_decimal(units) * ratio)
            .collect();
        token_units.insert(*wallet, converted);
        lp_final.insert(*wallet, row.last().copied().unwrap_or(0));
    }

    Ok(ConvertedBalances {
        token_units,
        lp_final,
    })
}
