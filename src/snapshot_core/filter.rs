//! Transfer filtering into per-wallet signed deltas

use std::collections::{BTreeSet, HashSet};

use alloy_primitives::Address;

use super::error::SnapshotError;
use super::types::TransferEvent;

/// One signed balance delta attributed to a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletDelta {
    pub timestamp: i64,
    pub wallet: Address,
    pub delta: i128,
}

/// Filter output: deltas in scan order plus the set of touched wallets.
#[derive(Debug, Clone)]
pub struct FilteredEvents {
    pub deltas: Vec<WalletDelta>,
    pub wallets: BTreeSet<Address>,
}

/// Partition raw transfers into signed per-wallet deltas.
///
/// Sign convention: every row where the wallet appears as `to` contributes
/// `-value`, every row where it appears as `from` contributes `+value`,
/// regardless of which side is the pool contract. A wallet appearing in both
/// roles of one event produces two independent rows. Denylisted addresses
/// (pool contracts, owners) and unparseable addresses are excluded from the
/// wallet set entirely.
///
/// Deltas are stable-sorted by timestamp with `to` rows ahead of `from` rows
/// at equal timestamps.
pub fn filter_events(
    pool: &str,
    events: &[TransferEvent],
    exclude: &HashSet<Address>,
) -> Result<FilteredEvents, SnapshotError> {
    if events.is_empty() {
        return Err(SnapshotError::EmptyInput {
            pool: pool.to_string(),
        });
    }

    let mut wallets = BTreeSet::new();
    for event in events {
        for side in [event.from, event.to].into_iter().flatten() {
            if !exclude.contains(&side) {
                wallets.insert(side);
            }
        }
    }

    let mut deltas = Vec::with_capacity(events.len());
    for event in events {
        if let Some(to) = event.to {
            if wallets.contains(&to) {
                deltas.push(WalletDelta {
                    timestamp: event.timestamp,
                    wallet: to,
                    delta: -signed_value(event.value),
                });
            }
        }
    }
    for event in events {
        if let Some(from) = event.from {
            if wallets.contains(&from) {
                deltas.push(WalletDelta {
                    timestamp: event.timestamp,
                    wallet: from,
                    delta: signed_value(event.value),
                });
            }
        }
    }

    deltas.sort_by_key(|d| d.timestamp);

    Ok(FilteredEvents { deltas, wallets })
}

fn signed_value(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}
