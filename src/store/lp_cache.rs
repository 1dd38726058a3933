//! Incremental LP ratio sample cache
//!
//! One CSV per LP contract, keyed by checkpoint timestamp. Samples already
//! present are never refetched; new checkpoints are back-filled and the
//! file rewritten atomically.

use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::snapshot_core::address;
use crate::snapshot_core::lp_ratio::{LpRatioSample, LpRatioSeries};

use super::{atomic_write, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct LpRecord {
    #[serde(rename = "timeStamp")]
    timestamp: i64,
    #[serde(rename = "lpAmount")]
    lp_supply: String,
    #[serde(rename = "tokenAmount")]
    token_reserve: String,
}

pub struct LpCache {
    path: PathBuf,
}

impl LpCache {
    pub fn for_contract(dir: &Path, lp_contract: &Address) -> Self {
        Self {
            path: dir.join(format!("LP_HISTORY_{}.csv", address::checksum(lp_contract))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<LpRatioSeries, StoreError> {
        let mut series = LpRatioSeries::new();
        if !self.path.exists() {
            return Ok(series);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        for record in reader.deserialize::<LpRecord>() {
            let record = record?;
            let parse = |field: &str, name: &str| -> Result<u128, StoreError> {
                field.parse().map_err(|_| StoreError::Malformed {
                    path: self.path.display().to_string(),
                    detail: format!("bad {} '{}'", name, field),
                })
            };
            series.insert(
                record.timestamp,
                LpRatioSample {
                    lp_supply: parse(&record.lp_supply, "lpAmount")?,
                    token_reserve: parse(&record.token_reserve, "tokenAmount")?,
                },
            );
        }
        Ok(series)
    }

    pub fn store(&self, series: &LpRatioSeries) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (&timestamp, sample) in series.iter() {
            writer.serialize(LpRecord {
                timestamp,
                lp_supply: sample.lp_supply.to_string(),
                token_reserve: sample.token_reserve.to_string(),
            })?;
        }
        let bytes = writer.into_inner().map_err(|e| StoreError::Malformed {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })?;
        atomic_write(&self.path, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const LP: Address = address!("00000000000000000000000000000000000000cc");

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LpCache::for_contract(dir.path(), &LP);

        let mut series = LpRatioSeries::new();
        series.insert(15, LpRatioSample { lp_supply: 10, token_reserve: 20 });
        series.insert(25, LpRatioSample { lp_supply: 10, token_reserve: 25 });
        cache.store(&series).unwrap();

        assert_eq!(cache.load().unwrap(), series);
    }

    #[test]
    fn test_missing_cache_is_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LpCache::for_contract(dir.path(), &LP);
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn test_extend_preserves_existing_samples() {
        // Back-fill protocol: load, add only missing timestamps, rewrite.
        let dir = tempfile::tempdir().unwrap();
        let cache = LpCache::for_contract(dir.path(), &LP);

        let mut series = LpRatioSeries::new();
        series.insert(15, LpRatioSample { lp_supply: 10, token_reserve: 20 });
        cache.store(&series).unwrap();

        let mut reloaded = cache.load().unwrap();
        assert!(reloaded.contains(15));
        reloaded.insert(25, LpRatioSample { lp_supply: 10, token_reserve: 25 });
        cache.store(&reloaded).unwrap();

        let series = cache.load().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.get(15),
            Some(&LpRatioSample { lp_supply: 10, token_reserve: 20 })
        );
    }
}
