//! Checkpointed cumulative balances with floor-at-zero semantics

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::Address;

use super::filter::FilteredEvents;
use super::types::CheckpointSeries;

/// Per-wallet balances in raw units, one value per checkpoint.
///
/// Row presence means "ever interacted"; wallets never observed in a window
/// carry their prior checkpoint's value forward, and never-observed wallets
/// hold a full row of zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceTable {
    pub checkpoints: Vec<i64>,
    pub rows: BTreeMap<Address, Vec<u128>>,
}

impl BalanceTable {
    pub fn balance(&self, wallet: &Address, checkpoint_index: usize) -> Option<u128> {
        self.rows.get(wallet).and_then(|row| row.get(checkpoint_index)).copied()
    }
}

/// Compute every wallet's clamped running balance at each checkpoint.
///
/// Single forward pass over the timestamp-sorted deltas: checkpoint `i`
/// consumes exactly the events in the half-open window
/// `(checkpoint[i-1], checkpoint[i]]`, applying
/// `running = max(0, running + delta)` per event, then writes the running
/// value of every wallet into column `i`. Events after the final checkpoint
/// are never consumed. O(events + wallets x checkpoints).
pub fn accumulate(filtered: &FilteredEvents, checkpoints: &CheckpointSeries) -> BalanceTable {
    let stamps = checkpoints.as_slice();

    let mut rows: BTreeMap<Address, Vec<u128>> = filtered
        .wallets
        .iter()
        .map(|wallet| (*wallet, vec![0u128; stamps.len()]))
        .collect();

    let mut running: HashMap<Address, i128> =
        filtered.wallets.iter().map(|wallet| (*wallet, 0i128)).collect();

    let mut cursor = 0;
    for (i, &stamp) in stamps.iter().enumerate() {
        while cursor < filtered.deltas.len() && filtered.deltas[cursor].timestamp <= stamp {
            let delta = filtered.deltas[cursor];
            cursor += 1;
            if delta.timestamp <= 0 {
                continue;
            }
            if let Some(balance) = running.get_mut(&delta.wallet) {
                *balance = balance.saturating_add(delta.delta).max(0);
            }
        }

        for (wallet, balance) in &running {
            if let Some(row) = rows.get_mut(wallet) {
                row[i] = *balance as u128;
            }
        }
    }

    BalanceTable {
        checkpoints: stamps.to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_core::filter::filter_events;
    use crate::snapshot_core::types::TransferEvent;
    use alloy_primitives::{address, Address};
    use std::collections::HashSet;

    const POOL: Address = address!("00000000000000000000000000000000000000aa");
    const WALLET_X: Address = address!("00000000000000000000000000000000000000b1");
    const WALLET_Y: Address = address!("00000000000000000000000000000000000000b2");

    fn event(from: Address, to: Address, value: u128, timestamp: i64) -> TransferEvent {
        TransferEvent {
            block_number: 1,
            timestamp,
            from: Some(from),
            to: Some(to),
            value,
        }
    }

    fn run(events: &[TransferEvent], checkpoints: Vec<i64>) -> BalanceTable {
        let exclude: HashSet<Address> = [POOL].into_iter().collect();
        let filtered = filter_events("p", events, &exclude).unwrap();
        accumulate(&filtered, &CheckpointSeries::new(checkpoints).unwrap())
    }

    #[test]
    fn test_deposit_then_withdrawal_across_checkpoints() {
        // Scenario: +100 at t=10, -40 at t=20, checkpoints [15, 25].
        let events = vec![
            event(WALLET_X, POOL, 100, 10),
            event(POOL, WALLET_X, 40, 20),
        ];

        let table = run(&events, vec![15, 25]);

        assert_eq!(table.balance(&WALLET_X, 0), Some(100));
        assert_eq!(table.balance(&WALLET_X, 1), Some(60));
    }

    #[test]
    fn test_clamping_floors_at_zero() {
        // A withdrawal larger than the running balance clamps to 0, not -140.
        let events = vec![
            event(WALLET_X, POOL, 100, 10),
            event(POOL, WALLET_X, 40, 20),
            event(POOL, WALLET_X, 200, 25),
        ];

        let table = run(&events, vec![15, 25]);

        assert_eq!(table.balance(&WALLET_X, 1), Some(0));
    }

    #[test]
    fn test_carry_forward_without_events() {
        let events = vec![event(WALLET_X, POOL, 70, 10)];

        let table = run(&events, vec![15, 25, 35]);

        assert_eq!(table.balance(&WALLET_X, 0), Some(70));
        assert_eq!(table.balance(&WALLET_X, 1), Some(70));
        assert_eq!(table.balance(&WALLET_X, 2), Some(70));
    }

    #[test]
    fn test_untouched_wallet_has_zero_row() {
        // Y only appears after the final checkpoint; its row stays all-zero.
        let events = vec![
            event(WALLET_X, POOL, 70, 10),
            event(WALLET_Y, POOL, 10, 99),
        ];

        let table = run(&events, vec![15, 25]);

        assert_eq!(table.balance(&WALLET_Y, 0), Some(0));
        assert_eq!(table.balance(&WALLET_Y, 1), Some(0));
    }

    #[test]
    fn test_window_boundaries_are_half_open() {
        // An event exactly at a checkpoint belongs to that checkpoint's window.
        let events = vec![
            event(WALLET_X, POOL, 30, 15),
            event(WALLET_X, POOL, 5, 16),
        ];

        let table = run(&events, vec![15, 25]);

        assert_eq!(table.balance(&WALLET_X, 0), Some(30));
        assert_eq!(table.balance(&WALLET_X, 1), Some(35));
    }

    #[test]
    fn test_balances_never_negative() {
        let events = vec![
            event(POOL, WALLET_X, 500, 5),
            event(WALLET_X, POOL, 20, 12),
            event(POOL, WALLET_X, 80, 25),
        ];

        let table = run(&events, vec![10, 20, 30]);

        for row in table.rows.values() {
            for &balance in row {
                // u128 storage already enforces this; the assertion documents it.
                assert!(balance < u128::MAX / 2);
            }
        }
        assert_eq!(table.balance(&WALLET_X, 0), Some(0));
        assert_eq!(table.balance(&WALLET_X, 1), Some(20));
        assert_eq!(table.balance(&WALLET_X, 2), Some(0));
    }

    #[test]
    fn test_idempotence() {
        let events = vec![
            event(WALLET_X, POOL, 100, 10),
            event(POOL, WALLET_X, 40, 20),
            event(WALLET_Y, POOL, 7, 21),
        ];

        let first = run(&events, vec![15, 25]);
        let second = run(&events, vec![15, 25]);

        assert_eq!(first, second);
    }
}
