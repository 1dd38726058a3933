//! Wide-table CSV reports
//!
//! Writes the per-network, raw and combined snapshot tables, the whitelist
//! and the per-tier wallet files. The raw snapshot is read back in project
//! mode; column roles are reconstructed from the labels this module itself
//! wrote, and a label that cannot be mapped is a loud error rather than a
//! silently ignored column.

use std::path::Path;

use alloy_primitives::Address;
use rust_decimal::Decimal;

use crate::snapshot_core::address;
use crate::snapshot_core::merge::{
    parse_project_label, ColumnSpec, KycStatus, RegStatus, WideRow, WideTable,
};
use crate::snapshot_core::tiers::TierAssignment;

use super::{atomic_write, StoreError};

pub const WALLET_HEADER: &str = "Wallet";
const REGISTRATION_HEADER: &str = "Registration";
const KYC_HEADER: &str = "KYC";
const TIER_HEADER: &str = "Tier";
const POOL_WEIGHT_HEADER: &str = "Pool Weight";

/// Write a wide table.
///
/// Status columns lead when tracked (Registration, then KYC), followed by
/// tier columns when any row carries an assignment, then the numeric
/// columns in table order.
pub fn write_wide_table(path: &Path, table: &WideTable) -> Result<(), StoreError> {
    let has_registration = table.rows.values().any(|row| row.registration.is_some());
    let has_kyc = table.rows.values().any(|row| row.kyc.is_some());
    let has_tier = table.rows.values().any(|row| row.tier.is_some());

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut headers = vec![WALLET_HEADER.to_string()];
    if has_registration {
        headers.push(REGISTRATION_HEADER.to_string());
    }
    if has_kyc {
        headers.push(KYC_HEADER.to_string());
    }
    if has_tier {
        headers.push(TIER_HEADER.to_string());
        headers.push(POOL_WEIGHT_HEADER.to_string());
    }
    headers.extend(table.columns.iter().map(|c| c.label.clone()));
    writer.write_record(&headers)?;

    for (wallet, row) in &table.rows {
        let mut record = vec![address::checksum(wallet)];
        if has_registration {
            record.push(
                row.registration
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
            );
        }
        if has_kyc {
            record.push(row.kyc.as_ref().map(|k| k.to_string()).unwrap_or_default());
        }
        if has_tier {
            match row.tier {
                Some(assignment) => {
                    record.push(assignment.tier.to_string());
                    record.push(assignment.pool_weight.normalize().to_string());
                }
                None => {
                    record.push(String::new());
                    record.push(String::new());
                }
            }
        }
        record.extend(row.values.iter().map(|v| v.normalize().to_string()));
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|e| StoreError::Malformed {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    atomic_write(path, &bytes)?;
    Ok(())
}

/// Read a project-level wide table previously written by this module.
pub fn read_wide_table(path: &Path, token_name: &str) -> Result<WideTable, StoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    if headers.first().map(String::as_str) != Some(WALLET_HEADER) {
        return Err(StoreError::Malformed {
            path: path.display().to_string(),
            detail: format!("first column must be '{}'", WALLET_HEADER),
        });
    }

    let mut registration_idx = None;
    let mut kyc_idx = None;
    let mut tier_idx = None;
    let mut weight_idx = None;
    let mut value_columns: Vec<(usize, ColumnSpec)> = Vec::new();

    for (idx, label) in headers.iter().enumerate().skip(1) {
        match label.as_str() {
            REGISTRATION_HEADER => registration_idx = Some(idx),
            KYC_HEADER => kyc_idx = Some(idx),
            TIER_HEADER => tier_idx = Some(idx),
            POOL_WEIGHT_HEADER => weight_idx = Some(idx),
            _ => match parse_project_label(label, token_name) {
                Some(role) => value_columns.push((
                    idx,
                    ColumnSpec {
                        label: label.clone(),
                        role,
                    },
                )),
                None => {
                    return Err(StoreError::UnknownColumn {
                        path: path.display().to_string(),
                        label: label.clone(),
                    })
                }
            },
        }
    }

    let mut table = WideTable::new();
    table.columns = value_columns.iter().map(|(_, spec)| spec.clone()).collect();

    for record in reader.records() {
        let record = record?;
        let raw_wallet = record.get(0).unwrap_or_default();
        let Some(wallet) = address::normalize(raw_wallet) else {
            log::warn!("Skipping row with invalid wallet '{}'", raw_wallet);
            continue;
        };

        let mut values = Vec::with_capacity(value_columns.len());
        for (idx, spec) in &value_columns {
            let field = record.get(*idx).unwrap_or_default();
            let value = field.trim().parse::<Decimal>().map_err(|_| StoreError::Malformed {
                path: path.display().to_string(),
                detail: format!("bad value '{}' in column '{}'", field, spec.label),
            })?;
            values.push(value);
        }

        let field_at = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim);
        let registration = field_at(registration_idx)
            .filter(|s| !s.is_empty())
            .map(RegStatus::parse);
        let kyc = field_at(kyc_idx)
            .filter(|s| !s.is_empty())
            .map(KycStatus::parse);
        let tier = match (field_at(tier_idx), field_at(weight_idx)) {
            (Some(tier), Some(weight)) if !tier.is_empty() => {
                let parsed_tier = tier.parse().map_err(|_| StoreError::Malformed {
                    path: path.display().to_string(),
                    detail: format!("bad tier '{}'", tier),
                })?;
                let pool_weight = weight.parse().map_err(|_| StoreError::Malformed {
                    path: path.display().to_string(),
                    detail: format!("bad pool weight '{}'", weight),
                })?;
                Some(TierAssignment {
                    tier: parsed_tier,
                    pool_weight,
                })
            }
            _ => None,
        };

        table.rows.insert(
            wallet,
            WideRow {
                values,
                kyc,
                registration,
                tier,
            },
        );
    }

    Ok(table)
}

/// Write a bare wallet list, one checksummed address per line.
pub fn write_wallet_list(path: &Path, wallets: &[Address]) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([WALLET_HEADER])?;
    for wallet in wallets {
        writer.write_record([address::checksum(wallet)])?;
    }
    let bytes = writer.into_inner().map_err(|e| StoreError::Malformed {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    atomic_write(path, &bytes)?;
    Ok(())
}

/// Write a tier file: lower-cased addresses, no header.
pub fn write_tier_file(path: &Path, wallets: &[Address]) -> Result<(), StoreError> {
    let mut contents = String::new();
    for wallet in wallets {
        contents.push_str(&address::checksum(wallet).to_lowercase());
        contents.push('\n');
    }
    atomic_write(path, contents.as_bytes())?;
    Ok(())
}

/// Write primary/delegate wallet pairs.
pub fn write_delegations(
    path: &Path,
    delegations: &[crate::snapshot_core::merge::Delegation],
) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["primaryWallet", "delegatedWallet"])?;
    for delegation in delegations {
        writer.write_record([
            address::checksum(&delegation.primary),
            address::checksum(&delegation.delegate),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| StoreError::Malformed {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    atomic_write(path, &bytes)?;
    Ok(())
}
