//! Per-pool points accrual and column assembly

use std::collections::BTreeMap;

use alloy_primitives::Address;
use rust_decimal::Decimal;

use super::accumulator::BalanceTable;
use super::error::SnapshotError;
use super::lp_ratio::{convert, LpRatioSeries};
use super::types::{units_to_decimal, PoolKind, PoolSpec};

/// Labeled column set exposed by one pool snapshot.
///
/// Presence is computed, never hard-coded: the LP column exists only when a
/// conversion was applied, the points column only when points are enabled
/// for the run. Downstream merging reads this schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolColumns {
    pub token_label: String,
    pub lp_label: Option<String>,
    pub points_label: Option<String>,
}

/// One wallet's values in a pool snapshot, in raw units.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRow {
    pub token_amount: Decimal,
    pub lp_amount: Option<Decimal>,
    pub points: Option<Decimal>,
}

/// Final per-pool output: typed column descriptor plus wallet rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub pool: String,
    pub kind: PoolKind,
    pub columns: PoolColumns,
    pub rows: BTreeMap<Address, PoolRow>,
}

pub fn token_column_label(token_name: &str, pool_name: &str) -> String {
    format!("{} ({})", token_name, pool_name)
}

pub fn lp_column_label(pool_name: &str) -> String {
    format!("LP ({})", pool_name)
}

pub fn points_column_label(pool_name: &str) -> String {
    format!("SSP ({})", pool_name)
}

/// Assemble one pool's snapshot from its balance table.
///
/// Points are the sum over interior checkpoints (all but the final instant)
/// of `balance * multiplier / 100`, in exact decimal arithmetic. LP pools
/// convert every checkpoint to underlying-token units first and retain the
/// pre-conversion final balance as the LP amount.
pub fn build_pool_snapshot(
    token_name: &str,
    pool: &PoolSpec,
    table: &BalanceTable,
    lp_history: Option<&LpRatioSeries>,
    points_enabled: bool,
) -> Result<PoolSnapshot, SnapshotError> {
    let (series_by_wallet, lp_final) = match lp_history {
        Some(history) => {
            let converted = convert(table, history)?;
            (converted.token_units, Some(converted.lp_final))
        }
        None => {
            let raw: BTreeMap<Address, Vec<Decimal>> = table
                .rows
                .iter()
                .map(|(wallet, row)| {
                    (*wallet, row.iter().map(|&units| units_to_decimal(units)).collect())
                })
                .collect();
            (raw, None)
        }
    };

    let columns = PoolColumns {
        token_label: token_column_label(token_name, &pool.name),
        lp_label: lp_final
            .as_ref()
            .map(|_| lp_column_label(&pool.name)),
        points_label: points_enabled.then(|| points_column_label(&pool.name)),
    };

    let mut rows = BTreeMap::new();
    for (wallet, balances) in &series_by_wallet {
        let token_amount = balances.last().copied().unwrap_or(Decimal::ZERO);

        let points = points_enabled.then(|| {
            let interior = &balances[..balances.len().saturating_sub(1)];
            let accrued: Decimal = interior.iter().copied().sum();
            accrued * pool.multiplier / Decimal::ONE_HUNDRED
        });

        let lp_amount = lp_final
            .as_ref()
            .map(|finals| units_to_decimal(finals.get(wallet).copied().unwrap_or(0)));

        rows.insert(
            *wallet,
            PoolRow {
                token_amount,
                lp_amount,
                points,
            },
        );
    }

    Ok(PoolSnapshot {
        pool: pool.name.clone(),
        kind: pool.kind,
        columns,
        rows,
    })
}
