//! Per-pool transfer-event cache
//!
//! One CSV file per pool contract, holding every transfer fetched so far in
//! block order. A refresh resumes from the highest cached block (re-reading
//! that block to catch stragglers) and deduplicates on the full row.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::snapshot_core::address;
use crate::snapshot_core::types::TransferEvent;

use super::{atomic_write, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    #[serde(rename = "blockNumber")]
    block_number: u64,
    #[serde(rename = "timeStamp")]
    timestamp: i64,
    from: String,
    to: String,
    value: String,
}

pub struct TxnCache {
    path: PathBuf,
}

impl TxnCache {
    pub fn for_pool(dir: &Path, contract: &Address) -> Self {
        Self {
            path: dir.join(format!("{}.csv", address::checksum(contract))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cached events; an absent file is an empty cache.
    pub fn load(&self) -> Result<Vec<TransferEvent>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut events = Vec::new();
        for record in reader.deserialize::<CacheRecord>() {
            let record = record?;
            let value = record.value.parse().map_err(|_| StoreError::Malformed {
                path: self.path.display().to_string(),
                detail: format!("bad value '{}'", record.value),
            })?;
            events.push(TransferEvent {
                block_number: record.block_number,
                timestamp: record.timestamp,
                from: address::normalize(&record.from),
                to: address::normalize(&record.to),
                value,
            });
        }
        Ok(events)
    }

    /// Rewrite the cache atomically.
    pub fn store(&self, events: &[TransferEvent]) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for event in events {
            writer.serialize(CacheRecord {
                block_number: event.block_number,
                timestamp: event.timestamp,
                from: event.from.map(|a| address::checksum(&a)).unwrap_or_default(),
                to: event.to.map(|a| address::checksum(&a)).unwrap_or_default(),
                value: event.value.to_string(),
            })?;
        }
        let bytes = writer.into_inner().map_err(|e| StoreError::Malformed {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })?;
        atomic_write(&self.path, &bytes)?;
        Ok(())
    }

    /// The block a refresh should resume from.
    pub fn last_block(events: &[TransferEvent]) -> u64 {
        events.last().map(|e| e.block_number).unwrap_or(0)
    }

    /// Drop duplicate rows, keeping the first occurrence.
    pub fn dedupe(events: Vec<TransferEvent>) -> Vec<TransferEvent> {
        let mut seen = HashSet::with_capacity(events.len());
        events.into_iter().filter(|e| seen.insert(*e)).collect()
    }
}
