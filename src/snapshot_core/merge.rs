//! Cross-pool and cross-dataset merge layer
//!
//! Combines per-pool snapshots into a per-network wide table, per-network
//! summaries into the project-wide table, and folds in KYC, registration
//! and wallet-delegation data. Numeric columns carry typed roles; totals
//! are computed from the roles, never by matching on label text.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use alloy_primitives::Address;
use rust_decimal::Decimal;

use super::error::SnapshotError;
use super::points::PoolSnapshot;
use super::tiers::{TierAssignment, TierTable};
use super::types::PoolKind;

/// Raw on-chain units per whole token (18 decimals).
fn unit_scale() -> Decimal {
    Decimal::new(1_000_000_000_000_000_000, 0)
}

/// Role tags for generated numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// A single pool's token-equivalent amount.
    PoolToken(PoolKind),
    /// A single pool's retained LP amount.
    PoolLp,
    /// A single pool's accrued points.
    PoolPoints,
    /// Network-level sums over pool columns.
    TotalStakedFarmed,
    TotalStaked,
    TotalFarmed,
    TotalLp,
    TotalPoints,
    /// Per-network summary columns copied into the project table.
    NetworkToken,
    NetworkPoints,
    /// Project-level derived columns, recomputed by `process_tiers`.
    GrandTotal,
    GrandPoints,
    PointsShare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub label: String,
    pub role: ColumnRole,
}

/// KYC status as reported by the provider, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KycStatus {
    Approved,
    NoData,
    Other(String),
}

impl KycStatus {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "approved" => KycStatus::Approved,
            "" | "no_data" => KycStatus::NoData,
            _ => KycStatus::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KycStatus::Approved => "approved",
            KycStatus::NoData => "no_data",
            KycStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IDO registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegStatus {
    Registered,
    NotRegistered,
}

impl RegStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "registered" => RegStatus::Registered,
            _ => RegStatus::NotRegistered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegStatus::Registered => "registered",
            RegStatus::NotRegistered => "not_registered",
        }
    }
}

impl fmt::Display for RegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One KYC export record: identity reference, optional wallet, status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycRecord {
    pub ref_id: Option<Address>,
    pub wallet: Option<Address>,
    pub status: KycStatus,
}

/// One primary-to-delegate wallet delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delegation {
    pub primary: Address,
    pub delegate: Address,
}

/// One wallet's row: numeric values aligned with the table's columns, plus
/// typed status and tier fields.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub values: Vec<Decimal>,
    pub kyc: Option<KycStatus>,
    pub registration: Option<RegStatus>,
    pub tier: Option<TierAssignment>,
}

/// Wallet-indexed wide table with an explicit column schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub columns: Vec<ColumnSpec>,
    pub rows: BTreeMap<Address, WideRow>,
}

// ---- column labels -------------------------------------------------------

pub fn total_staked_farmed_label(token: &str) -> String {
    format!("Total Staked and Farmed {}", token)
}

pub fn total_staked_label(token: &str) -> String {
    format!("Total Staked {}", token)
}

pub fn total_farmed_label(token: &str) -> String {
    format!("Total Farmed {}", token)
}

pub const TOTAL_LP_LABEL: &str = "Total LP";
pub const TOTAL_POINTS_LABEL: &str = "Total SSP";
pub const POINTS_SHARE_LABEL: &str = "SSP %";

pub fn network_token_label(network: &str, token: &str) -> String {
    format!("{} - {}", network, token)
}

pub fn network_points_label(network: &str) -> String {
    format!("{} - SSP", network)
}

pub fn grand_total_label(token: &str) -> String {
    format!("Total {}", token)
}

/// Reconstruct the role of a project-level column from its label.
///
/// Only labels this crate itself writes are recognized; anything else is a
/// schema mismatch for the caller to raise.
pub fn parse_project_label(label: &str, token: &str) -> Option<ColumnRole> {
    if label == grand_total_label(token) {
        Some(ColumnRole::GrandTotal)
    } else if label == TOTAL_POINTS_LABEL {
        Some(ColumnRole::GrandPoints)
    } else if label == POINTS_SHARE_LABEL {
        Some(ColumnRole::PointsShare)
    } else if label.ends_with(&format!(" - {}", token)) {
        Some(ColumnRole::NetworkToken)
    } else if label.ends_with(" - SSP") {
        Some(ColumnRole::NetworkPoints)
    } else {
        None
    }
}

// ---- table operations ----------------------------------------------------

impl WideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn zero_row(&self) -> WideRow {
        WideRow {
            values: vec![Decimal::ZERO; self.columns.len()],
            kyc: None,
            registration: None,
            tier: None,
        }
    }

    fn tracks_kyc(&self) -> bool {
        self.rows.values().any(|row| row.kyc.is_some())
    }

    fn tracks_registration(&self) -> bool {
        self.rows.values().any(|row| row.registration.is_some())
    }

    pub fn column_index(&self, role: ColumnRole) -> Option<usize> {
        self.columns.iter().position(|c| c.role == role)
    }

    /// Value of the first column with the given role.
    pub fn value(&self, wallet: &Address, role: ColumnRole) -> Option<Decimal> {
        let idx = self.column_index(role)?;
        self.rows.get(wallet).and_then(|row| row.values.get(idx)).copied()
    }

    /// Value of a column addressed by its label.
    pub fn value_by_label(&self, wallet: &Address, label: &str) -> Option<Decimal> {
        let idx = self.columns.iter().position(|c| c.label == label)?;
        self.rows.get(wallet).and_then(|row| row.values.get(idx)).copied()
    }

    fn ensure_row(&mut self, wallet: Address) -> &mut WideRow {
        let template = self.zero_row();
        self.rows.entry(wallet).or_insert(template)
    }

    fn sum_roles(&self, row: &WideRow, matches: impl Fn(ColumnRole) -> bool) -> Decimal {
        self.columns
            .iter()
            .zip(&row.values)
            .filter(|(spec, _)| matches(spec.role))
            .map(|(_, value)| *value)
            .sum()
    }

    /// Combine one network's pool snapshots into a wide table.
    ///
    /// Raw units are scaled to whole tokens here (the single 1e18 shift).
    /// Total columns lead, followed by each pool's column set; the points
    /// total is present only when some pool produced a points column.
    pub fn from_pool_snapshots(token_name: &str, snapshots: &[PoolSnapshot]) -> Option<WideTable> {
        if snapshots.is_empty() {
            return None;
        }

        let mut pool_columns: Vec<ColumnSpec> = Vec::new();
        for snap in snapshots {
            pool_columns.push(ColumnSpec {
                label: snap.columns.token_label.clone(),
                role: ColumnRole::PoolToken(snap.kind),
            });
            if let Some(lp_label) = &snap.columns.lp_label {
                pool_columns.push(ColumnSpec {
                    label: lp_label.clone(),
                    role: ColumnRole::PoolLp,
                });
            }
            if let Some(points_label) = &snap.columns.points_label {
                pool_columns.push(ColumnSpec {
                    label: points_label.clone(),
                    role: ColumnRole::PoolPoints,
                });
            }
        }

        let wallets: BTreeSet<Address> = snapshots
            .iter()
            .flat_map(|snap| snap.rows.keys().copied())
            .collect();

        let scale = unit_scale();
        let mut values: BTreeMap<Address, Vec<Decimal>> = BTreeMap::new();
        for wallet in &wallets {
            let mut row = Vec::with_capacity(pool_columns.len());
            for snap in snapshots {
                let pool_row = snap.rows.get(wallet);
                row.push(
                    pool_row
                        .map(|r| r.token_amount / scale)
                        .unwrap_or(Decimal::ZERO),
                );
                if snap.columns.lp_label.is_some() {
                    row.push(
                        pool_row
                            .and_then(|r| r.lp_amount)
                            .map(|lp| lp / scale)
                            .unwrap_or(Decimal::ZERO),
                    );
                }
                if snap.columns.points_label.is_some() {
                    row.push(
                        pool_row
                            .and_then(|r| r.points)
                            .map(|p| p / scale)
                            .unwrap_or(Decimal::ZERO),
                    );
                }
            }
            values.insert(*wallet, row);
        }

        let has_points = pool_columns
            .iter()
            .any(|c| c.role == ColumnRole::PoolPoints);

        let mut total_columns = vec![
            ColumnSpec {
                label: total_staked_farmed_label(token_name),
                role: ColumnRole::TotalStakedFarmed,
            },
            ColumnSpec {
                label: total_staked_label(token_name),
                role: ColumnRole::TotalStaked,
            },
            ColumnSpec {
                label: total_farmed_label(token_name),
                role: ColumnRole::TotalFarmed,
            },
            ColumnSpec {
                label: TOTAL_LP_LABEL.to_string(),
                role: ColumnRole::TotalLp,
            },
        ];
        if has_points {
            total_columns.push(ColumnSpec {
                label: TOTAL_POINTS_LABEL.to_string(),
                role: ColumnRole::TotalPoints,
            });
        }

        let mut table = WideTable {
            columns: total_columns.into_iter().chain(pool_columns).collect(),
            rows: BTreeMap::new(),
        };

        let total_count = table.columns.len() - values.values().next().map_or(0, Vec::len);
        for (wallet, pool_values) in values {
            let staked: Decimal = sum_matching(&table.columns[total_count..], &pool_values, |r| {
                r == ColumnRole::PoolToken(PoolKind::Stake)
            });
            let farmed: Decimal = sum_matching(&table.columns[total_count..], &pool_values, |r| {
                r == ColumnRole::PoolToken(PoolKind::Farm)
            });
            let lp: Decimal = sum_matching(&table.columns[total_count..], &pool_values, |r| {
                r == ColumnRole::PoolLp
            });

            let mut row_values = vec![staked + farmed, staked, farmed, lp];
            if has_points {
                let points = sum_matching(&table.columns[total_count..], &pool_values, |r| {
                    r == ColumnRole::PoolPoints
                });
                row_values.push(points);
            }
            row_values.extend(pool_values);

            table.rows.insert(
                wallet,
                WideRow {
                    values: row_values,
                    kyc: None,
                    registration: None,
                    tier: None,
                },
            );
        }

        Some(table)
    }

    /// Copy a network table's summary columns into this project table.
    ///
    /// Outer union on wallets: new wallets get zero-filled rows, existing
    /// rows get zeros for the new columns.
    pub fn merge_network(
        &mut self,
        network: &str,
        token_name: &str,
        net: &WideTable,
    ) -> Result<(), SnapshotError> {
        let token_idx = net
            .column_index(ColumnRole::TotalStakedFarmed)
            .ok_or_else(|| SnapshotError::SchemaMismatch {
                what: format!("network table for '{}' has no staked-and-farmed total", network),
            })?;
        let points_idx = net.column_index(ColumnRole::TotalPoints);

        self.push_column(ColumnSpec {
            label: network_token_label(network, token_name),
            role: ColumnRole::NetworkToken,
        });
        if points_idx.is_some() {
            self.push_column(ColumnSpec {
                label: network_points_label(network),
                role: ColumnRole::NetworkPoints,
            });
        }

        let column_count = self.columns.len();
        for (wallet, net_row) in &net.rows {
            let row = self.ensure_row(*wallet);
            row.values.resize(column_count, Decimal::ZERO);
            let base = column_count - 1 - points_idx.map_or(0, |_| 1);
            row.values[base] = net_row.values[token_idx];
            if let Some(p_idx) = points_idx {
                row.values[column_count - 1] = net_row.values[p_idx];
            }
        }

        Ok(())
    }

    fn push_column(&mut self, spec: ColumnSpec) {
        self.columns.push(spec);
        for row in self.rows.values_mut() {
            row.values.push(Decimal::ZERO);
        }
    }

    /// Recompute grand totals, points share and tier assignments.
    ///
    /// Previously derived columns are dropped first, so the step is safe to
    /// re-run after later merges change the row set. The grand total sums
    /// network token columns only.
    pub fn process_tiers(
        &mut self,
        token_name: &str,
        tiers: Option<&TierTable>,
        points_enabled: bool,
    ) -> Result<(), SnapshotError> {
        self.drop_derived_columns();

        let grand_totals: BTreeMap<Address, Decimal> = self
            .rows
            .iter()
            .map(|(wallet, row)| {
                (*wallet, self.sum_roles(row, |r| r == ColumnRole::NetworkToken))
            })
            .collect();

        let mut derived: Vec<(ColumnSpec, BTreeMap<Address, Decimal>)> = vec![(
            ColumnSpec {
                label: grand_total_label(token_name),
                role: ColumnRole::GrandTotal,
            },
            grand_totals.clone(),
        )];

        if points_enabled {
            let grand_points: BTreeMap<Address, Decimal> = self
                .rows
                .iter()
                .map(|(wallet, row)| {
                    (*wallet, self.sum_roles(row, |r| r == ColumnRole::NetworkPoints))
                })
                .collect();
            let points_sum: Decimal = grand_points.values().copied().sum();
            let shares: BTreeMap<Address, Decimal> = grand_points
                .iter()
                .map(|(wallet, points)| {
                    let share = if points_sum.is_zero() {
                        Decimal::ZERO
                    } else {
                        points / points_sum * Decimal::ONE_HUNDRED
                    };
                    (*wallet, share)
                })
                .collect();
            derived.push((
                ColumnSpec {
                    label: TOTAL_POINTS_LABEL.to_string(),
                    role: ColumnRole::GrandPoints,
                },
                grand_points,
            ));
            derived.push((
                ColumnSpec {
                    label: POINTS_SHARE_LABEL.to_string(),
                    role: ColumnRole::PointsShare,
                },
                shares,
            ));
        }

        let derived_specs: Vec<ColumnSpec> = derived.iter().map(|(spec, _)| spec.clone()).collect();
        let mut columns = derived_specs;
        columns.append(&mut self.columns);
        self.columns = columns;

        for (wallet, row) in self.rows.iter_mut() {
            let mut values: Vec<Decimal> = derived
                .iter()
                .map(|(_, map)| map.get(wallet).copied().unwrap_or(Decimal::ZERO))
                .collect();
            values.append(&mut row.values);
            row.values = values;

            row.tier = match tiers {
                Some(table) => Some(table.classify(
                    grand_totals.get(wallet).copied().unwrap_or(Decimal::ZERO),
                )),
                None => None,
            };
        }

        Ok(())
    }

    fn drop_derived_columns(&mut self) {
        let retained: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, spec)| {
                !matches!(
                    spec.role,
                    ColumnRole::GrandTotal | ColumnRole::GrandPoints | ColumnRole::PointsShare
                )
            })
            .map(|(i, _)| i)
            .collect();
        if retained.len() == self.columns.len() {
            return;
        }
        self.columns = retained.iter().map(|&i| self.columns[i].clone()).collect();
        for row in self.rows.values_mut() {
            row.values = retained.iter().map(|&i| row.values[i]).collect();
        }
    }

    /// Fold resolved KYC statuses into the table.
    ///
    /// Wallets known only to the KYC provider are added with zero-filled
    /// rows; every row then carries an explicit status, `no_data` when the
    /// provider had nothing.
    pub fn merge_kyc(&mut self, statuses: &BTreeMap<Address, KycStatus>) {
        for wallet in statuses.keys() {
            self.ensure_row(*wallet);
        }
        for (wallet, row) in self.rows.iter_mut() {
            row.kyc = Some(
                statuses
                    .get(wallet)
                    .cloned()
                    .unwrap_or(KycStatus::NoData),
            );
        }
    }

    /// Fold IDO registration membership into the table.
    pub fn merge_registration(&mut self, registered: &BTreeSet<Address>) {
        let kyc_tracked = self.tracks_kyc();
        for wallet in registered {
            if !self.rows.contains_key(wallet) {
                let mut row = self.zero_row();
                if kyc_tracked {
                    row.kyc = Some(KycStatus::NoData);
                }
                self.rows.insert(*wallet, row);
            }
        }
        for row in self.rows.values_mut() {
            row.registration = Some(RegStatus::NotRegistered);
        }
        for wallet in registered {
            if let Some(row) = self.rows.get_mut(wallet) {
                row.registration = Some(RegStatus::Registered);
            }
        }
    }

    /// Apply wallet delegations: reconcile statuses by most-favorable-wins,
    /// then fold each primary row into its delegate's identity, summing
    /// numeric columns.
    pub fn merge_delegation(
        &mut self,
        delegations: &[Delegation],
        reconcile_kyc: bool,
        reconcile_registration: bool,
    ) {
        let kyc_tracked = self.tracks_kyc() || reconcile_kyc;
        let reg_tracked = self.tracks_registration() || reconcile_registration;

        for delegation in delegations {
            for wallet in [delegation.primary, delegation.delegate] {
                if !self.rows.contains_key(&wallet) {
                    let mut row = self.zero_row();
                    if kyc_tracked {
                        row.kyc = Some(KycStatus::NoData);
                    }
                    if reg_tracked {
                        row.registration = Some(RegStatus::NotRegistered);
                    }
                    self.rows.insert(wallet, row);
                }
            }
        }

        for delegation in delegations {
            let primary = delegation.primary;
            let delegate = delegation.delegate;

            if reconcile_kyc {
                let any_approved = [primary, delegate].iter().any(|w| {
                    self.rows.get(w).map(|r| r.kyc == Some(KycStatus::Approved)) == Some(true)
                });
                let resolved = if any_approved {
                    Some(KycStatus::Approved)
                } else {
                    self.rows.get(&delegate).and_then(|r| r.kyc.clone())
                };
                for wallet in [primary, delegate] {
                    if let Some(row) = self.rows.get_mut(&wallet) {
                        row.kyc = resolved.clone();
                    }
                }
            }

            if reconcile_registration {
                let any_registered = [primary, delegate].iter().any(|w| {
                    self.rows
                        .get(w)
                        .map(|r| r.registration == Some(RegStatus::Registered))
                        == Some(true)
                });
                let resolved = if any_registered {
                    Some(RegStatus::Registered)
                } else {
                    self.rows.get(&delegate).and_then(|r| r.registration)
                };
                for wallet in [primary, delegate] {
                    if let Some(row) = self.rows.get_mut(&wallet) {
                        row.registration = resolved;
                    }
                }
            }

            if primary == delegate {
                continue;
            }
            if let Some(primary_row) = self.rows.remove(&primary) {
                if let Some(delegate_row) = self.rows.get_mut(&delegate) {
                    for (target, source) in
                        delegate_row.values.iter_mut().zip(&primary_row.values)
                    {
                        *target += *source;
                    }
                    // Tier is stale after folding; recomputed by process_tiers.
                    delegate_row.tier = None;
                }
            }
        }
    }

    /// Rows eligible for the final whitelist.
    ///
    /// Always requires registration and KYC approval; tier > 0 additionally
    /// when tiering is in effect.
    pub fn whitelist(&self, tiered: bool) -> Result<WideTable, SnapshotError> {
        if tiered && self.rows.values().any(|row| row.tier.is_none()) {
            return Err(SnapshotError::SchemaMismatch {
                what: "whitelist requested tier filtering but tier assignments are absent"
                    .to_string(),
            });
        }
        let rows: BTreeMap<Address, WideRow> = self
            .rows
            .iter()
            .filter(|(_, row)| {
                let tier_ok = !tiered || row.tier.map(|t| t.tier > 0).unwrap_or(false);
                tier_ok
                    && row.registration == Some(RegStatus::Registered)
                    && row.kyc == Some(KycStatus::Approved)
            })
            .map(|(wallet, row)| (*wallet, row.clone()))
            .collect();
        Ok(WideTable {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Wallets grouped by tier number, floor tier excluded.
    pub fn tier_groups(&self) -> BTreeMap<usize, Vec<Address>> {
        let mut groups: BTreeMap<usize, Vec<Address>> = BTreeMap::new();
        for (wallet, row) in &self.rows {
            if let Some(assignment) = row.tier {
                if assignment.tier > 0 {
                    groups.entry(assignment.tier).or_default().push(*wallet);
                }
            }
        }
        groups
    }
}

/// Resolve raw KYC records to one status per wallet identity.
///
/// The identity is the record's refId, falling back to its wallet; records
/// without either are dropped. When one identity appears more than once an
/// approved record wins, otherwise the first record seen.
pub fn resolve_kyc_records(records: &[KycRecord]) -> BTreeMap<Address, KycStatus> {
    let mut resolved: BTreeMap<Address, KycStatus> = BTreeMap::new();
    for record in records {
        let Some(identity) = record.ref_id.or(record.wallet) else {
            continue;
        };
        match resolved.get(&identity) {
            Some(KycStatus::Approved) => {}
            Some(_) if record.status == KycStatus::Approved => {
                resolved.insert(identity, KycStatus::Approved);
            }
            Some(_) => {}
            None => {
                resolved.insert(identity, record.status.clone());
            }
        }
    }
    resolved
}

fn sum_matching(
    columns: &[ColumnSpec],
    values: &[Decimal],
    matches: impl Fn(ColumnRole) -> bool,
) -> Decimal {
    columns
        .iter()
        .zip(values)
        .filter(|(spec, _)| matches(spec.role))
        .map(|(_, value)| *value)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_core::points::{PoolColumns, PoolRow, PoolSnapshot};
    use alloy_primitives::{address, Address};
    use rust_decimal_macros::dec;

    const WALLET_X: Address = address!("00000000000000000000000000000000000000b1");
    const WALLET_Y: Address = address!("00000000000000000000000000000000000000b2");
    const WALLET_Z: Address = address!("00000000000000000000000000000000000000b3");

    /// Pool snapshot with one wallet holding `tokens` whole tokens (raw units).
    fn stake_snapshot(pool: &str, wallet: Address, tokens: i64, points: Option<i64>) -> PoolSnapshot {
        let scale = dec!(1000000000000000000);
        let mut rows = BTreeMap::new();
        rows.insert(
            wallet,
            PoolRow {
                token_amount: Decimal::from(tokens) * scale,
                lp_amount: None,
                points: points.map(|p| Decimal::from(p) * scale),
            },
        );
        PoolSnapshot {
            pool: pool.to_string(),
            kind: PoolKind::Stake,
            columns: PoolColumns {
                token_label: format!("SFUND ({})", pool),
                lp_label: None,
                points_label: points.map(|_| format!("SSP ({})", pool)),
            },
            rows,
        }
    }

    fn network_table(wallet: Address, tokens: i64, points: Option<i64>) -> WideTable {
        WideTable::from_pool_snapshots(
            "SFUND",
            &[stake_snapshot("Pool", wallet, tokens, points)],
        )
        .unwrap()
    }

    #[test]
    fn test_from_pool_snapshots_scales_and_totals() {
        let table = network_table(WALLET_X, 100, Some(7));

        assert_eq!(
            table.value(&WALLET_X, ColumnRole::TotalStakedFarmed),
            Some(dec!(100))
        );
        assert_eq!(table.value(&WALLET_X, ColumnRole::TotalStaked), Some(dec!(100)));
        assert_eq!(table.value(&WALLET_X, ColumnRole::TotalFarmed), Some(dec!(0)));
        assert_eq!(table.value(&WALLET_X, ColumnRole::TotalPoints), Some(dec!(7)));
    }

    #[test]
    fn test_no_points_column_without_points() {
        let table = network_table(WALLET_X, 100, None);
        assert_eq!(table.column_index(ColumnRole::TotalPoints), None);
    }

    #[test]
    fn test_merge_network_outer_union_zero_fills() {
        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();
        project
            .merge_network("ETH", "SFUND", &network_table(WALLET_Y, 40, None))
            .unwrap();

        assert_eq!(
            project.value_by_label(&WALLET_X, "BSC - SFUND"),
            Some(dec!(100))
        );
        assert_eq!(project.value_by_label(&WALLET_X, "ETH - SFUND"), Some(dec!(0)));
        assert_eq!(project.value_by_label(&WALLET_Y, "ETH - SFUND"), Some(dec!(40)));
        assert_eq!(project.value_by_label(&WALLET_Y, "BSC - SFUND"), Some(dec!(0)));
    }

    #[test]
    fn test_merge_is_order_insensitive() {
        let bsc = network_table(WALLET_X, 100, None);
        let eth = network_table(WALLET_X, 50, None);
        let arb = network_table(WALLET_Y, 10, None);

        let mut forward = WideTable::new();
        forward.merge_network("BSC", "SFUND", &bsc).unwrap();
        forward.merge_network("ETH", "SFUND", &eth).unwrap();
        forward.merge_network("ARB", "SFUND", &arb).unwrap();
        forward.process_tiers("SFUND", None, false).unwrap();

        let mut reversed = WideTable::new();
        reversed.merge_network("ARB", "SFUND", &arb).unwrap();
        reversed.merge_network("BSC", "SFUND", &bsc).unwrap();
        reversed.merge_network("ETH", "SFUND", &eth).unwrap();
        reversed.process_tiers("SFUND", None, false).unwrap();

        for wallet in [WALLET_X, WALLET_Y] {
            assert_eq!(
                forward.value(&wallet, ColumnRole::GrandTotal),
                reversed.value(&wallet, ColumnRole::GrandTotal)
            );
            for spec in &forward.columns {
                assert_eq!(
                    forward.value_by_label(&wallet, &spec.label),
                    reversed.value_by_label(&wallet, &spec.label),
                    "column {} differs",
                    spec.label
                );
            }
        }
    }

    #[test]
    fn test_merge_network_requires_total_column() {
        let mut project = WideTable::new();
        let bare = WideTable::new();
        let err = project.merge_network("BSC", "SFUND", &bare).unwrap_err();
        assert!(matches!(err, SnapshotError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_process_tiers_assigns_and_recomputes() {
        use crate::snapshot_core::tiers::{Tier, TierTable};

        let tiers = TierTable::new(vec![
            Tier { min_tokens: dec!(0), pool_weight: dec!(0) },
            Tier { min_tokens: dec!(100), pool_weight: dec!(10) },
        ])
        .unwrap();

        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();
        project
            .merge_network("ETH", "SFUND", &network_table(WALLET_Y, 40, None))
            .unwrap();
        project.process_tiers("SFUND", Some(&tiers), false).unwrap();

        assert_eq!(project.value(&WALLET_X, ColumnRole::GrandTotal), Some(dec!(100)));
        assert_eq!(project.rows.get(&WALLET_X).unwrap().tier.unwrap().tier, 1);
        assert_eq!(project.rows.get(&WALLET_Y).unwrap().tier.unwrap().tier, 0);

        // Re-running replaces the derived columns instead of duplicating them.
        project.process_tiers("SFUND", Some(&tiers), false).unwrap();
        let grand_totals = project
            .columns
            .iter()
            .filter(|c| c.role == ColumnRole::GrandTotal)
            .count();
        assert_eq!(grand_totals, 1);
    }

    #[test]
    fn test_points_share_sums_to_hundred() {
        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, Some(30)))
            .unwrap();
        project
            .merge_network("ETH", "SFUND", &network_table(WALLET_Y, 40, Some(10)))
            .unwrap();
        project.process_tiers("SFUND", None, true).unwrap();

        assert_eq!(project.value(&WALLET_X, ColumnRole::PointsShare), Some(dec!(75)));
        assert_eq!(project.value(&WALLET_Y, ColumnRole::PointsShare), Some(dec!(25)));
    }

    #[test]
    fn test_merge_kyc_introduces_unknown_wallet() {
        // A wallet present only in the KYC export gets a zero row with the
        // approved status; registration later defaults to not_registered.
        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();

        let mut statuses = BTreeMap::new();
        statuses.insert(WALLET_Z, KycStatus::Approved);
        project.merge_kyc(&statuses);
        project.merge_registration(&BTreeSet::new());

        let row = project.rows.get(&WALLET_Z).unwrap();
        assert_eq!(row.kyc, Some(KycStatus::Approved));
        assert_eq!(row.registration, Some(RegStatus::NotRegistered));
        assert!(row.values.iter().all(|v| v.is_zero()));
        assert_eq!(
            project.rows.get(&WALLET_X).unwrap().kyc,
            Some(KycStatus::NoData)
        );
    }

    #[test]
    fn test_delegation_reconciles_then_folds() {
        // Primary has no_data KYC and 100 tokens; delegate is approved with
        // 40. Post-merge the delegate's row carries 140 and approval.
        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();
        project
            .merge_network("ETH", "SFUND", &network_table(WALLET_Y, 40, None))
            .unwrap();

        let mut statuses = BTreeMap::new();
        statuses.insert(WALLET_Y, KycStatus::Approved);
        project.merge_kyc(&statuses);
        project.merge_registration(&[WALLET_X].into_iter().collect());

        project.merge_delegation(
            &[Delegation {
                primary: WALLET_X,
                delegate: WALLET_Y,
            }],
            true,
            true,
        );

        assert!(!project.rows.contains_key(&WALLET_X));
        let row = project.rows.get(&WALLET_Y).unwrap();
        assert_eq!(row.kyc, Some(KycStatus::Approved));
        assert_eq!(row.registration, Some(RegStatus::Registered));
        assert_eq!(
            project.value_by_label(&WALLET_Y, "BSC - SFUND"),
            Some(dec!(100))
        );
        assert_eq!(
            project.value_by_label(&WALLET_Y, "ETH - SFUND"),
            Some(dec!(40))
        );
    }

    #[test]
    fn test_delegation_without_statuses_keeps_delegate_values() {
        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();

        project.merge_delegation(
            &[Delegation {
                primary: WALLET_X,
                delegate: WALLET_Z,
            }],
            false,
            false,
        );

        assert_eq!(
            project.value_by_label(&WALLET_Z, "BSC - SFUND"),
            Some(dec!(100))
        );
    }

    #[test]
    fn test_whitelist_requires_all_gates() {
        use crate::snapshot_core::tiers::{Tier, TierTable};

        let tiers = TierTable::new(vec![
            Tier { min_tokens: dec!(0), pool_weight: dec!(0) },
            Tier { min_tokens: dec!(50), pool_weight: dec!(10) },
        ])
        .unwrap();

        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();
        project
            .merge_network("ETH", "SFUND", &network_table(WALLET_Y, 60, None))
            .unwrap();

        let mut statuses = BTreeMap::new();
        statuses.insert(WALLET_X, KycStatus::Approved);
        statuses.insert(WALLET_Y, KycStatus::Approved);
        project.merge_kyc(&statuses);
        // Only X registered.
        project.merge_registration(&[WALLET_X].into_iter().collect());
        project.process_tiers("SFUND", Some(&tiers), false).unwrap();

        let whitelist = project.whitelist(true).unwrap();
        assert!(whitelist.rows.contains_key(&WALLET_X));
        assert!(!whitelist.rows.contains_key(&WALLET_Y));
    }

    #[test]
    fn test_whitelist_without_tiers_fails_loudly_when_tiered() {
        let mut project = WideTable::new();
        project
            .merge_network("BSC", "SFUND", &network_table(WALLET_X, 100, None))
            .unwrap();
        let err = project.whitelist(true).unwrap_err();
        assert!(matches!(err, SnapshotError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_resolve_kyc_prefers_approved() {
        let records = vec![
            KycRecord {
                ref_id: Some(WALLET_X),
                wallet: None,
                status: KycStatus::Other("inreview".to_string()),
            },
            KycRecord {
                ref_id: Some(WALLET_X),
                wallet: None,
                status: KycStatus::Approved,
            },
            KycRecord {
                ref_id: None,
                wallet: Some(WALLET_Y),
                status: KycStatus::Other("waiting".to_string()),
            },
            KycRecord {
                ref_id: None,
                wallet: None,
                status: KycStatus::Approved,
            },
        ];

        let resolved = resolve_kyc_records(&records);

        assert_eq!(resolved.get(&WALLET_X), Some(&KycStatus::Approved));
        assert_eq!(
            resolved.get(&WALLET_Y),
            Some(&KycStatus::Other("waiting".to_string()))
        );
        assert_eq!(resolved.len(), 2);
    }
}
