//! KYC export persistence
//!
//! The provider export is cached to disk so the project flow can reuse it
//! without refetching (the fetcher honors a staleness window).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::snapshot_core::address;
use crate::snapshot_core::merge::{KycRecord, KycStatus};

use super::{atomic_write, StoreError};

pub const KYC_EXPORT_FILENAME: &str = "KYC_EXPORT.csv";

#[derive(Debug, Serialize, Deserialize)]
struct ExportRecord {
    #[serde(rename = "refId")]
    ref_id: String,
    wallet: String,
    status: String,
}

pub fn write_kyc_export(path: &Path, records: &[KycRecord]) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(ExportRecord {
            ref_id: record.ref_id.map(|a| address::checksum(&a)).unwrap_or_default(),
            wallet: record.wallet.map(|a| address::checksum(&a)).unwrap_or_default(),
            status: record.status.to_string(),
        })?;
    }
    let bytes = writer.into_inner().map_err(|e| StoreError::Malformed {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    atomic_write(path, &bytes)?;
    Ok(())
}

/// Load a previously written export; an absent file yields no records.
pub fn read_kyc_export(path: &Path) -> Result<Vec<KycRecord>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize::<ExportRecord>() {
        let record = record?;
        records.push(KycRecord {
            ref_id: address::normalize(&record.ref_id),
            wallet: address::normalize(&record.wallet),
            status: KycStatus::parse(&record.status),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Address};

    const WALLET: Address = address!("00000000000000000000000000000000000000b1");

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KYC_EXPORT_FILENAME);

        let records = vec![
            KycRecord {
                ref_id: Some(WALLET),
                wallet: Some(WALLET),
                status: KycStatus::Approved,
            },
            KycRecord {
                ref_id: None,
                wallet: None,
                status: KycStatus::Other("inreview".to_string()),
            },
        ];
        write_kyc_export(&path, &records).unwrap();

        assert_eq!(read_kyc_export(&path).unwrap(), records);
    }

    #[test]
    fn test_missing_export_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_kyc_export(&dir.path().join("absent.csv")).unwrap();
        assert!(records.is_empty());
    }
}
