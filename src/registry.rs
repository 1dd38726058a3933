//! Token, pool and tier registry
//!
//! The registry file maps each token to its per-network contracts and pool
//! definitions, plus an optional tier table. Addresses stay raw strings
//! here; normalization happens when a run resolves them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::snapshot_core::error::SnapshotError;
use crate::snapshot_core::tiers::{Tier, TierTable};

#[derive(Debug, Clone, Deserialize)]
pub struct PoolDef {
    pub name: String,
    pub contract: String,
    /// Percentage multiplier for points accrual.
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkToken {
    pub contract: String,
    #[serde(default)]
    pub lp_contract: Option<String>,
    #[serde(default)]
    pub stake: Vec<PoolDef>,
    #[serde(default)]
    pub farm: Vec<PoolDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierEntry {
    #[serde(rename = "MIN_TOKENS")]
    pub min_tokens: Decimal,
    #[serde(rename = "POOL_WEIGHT")]
    pub pool_weight: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    #[serde(rename = "TIERS", default)]
    pub tiers: Option<BTreeMap<String, TierEntry>>,
    #[serde(flatten)]
    pub networks: BTreeMap<String, NetworkToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRegistry(pub BTreeMap<String, TokenEntry>);

impl TokenRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry: TokenRegistry =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        if registry.0.is_empty() {
            return Err(ConfigError::InvalidArgument(format!(
                "no tokens defined in {}",
                path.display()
            )));
        }
        Ok(registry)
    }

    pub fn token_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get(&self, token: &str) -> Option<&TokenEntry> {
        self.0.get(token)
    }

    pub fn networks_of(&self, token: &str) -> Vec<String> {
        self.get(token)
            .map(|entry| entry.networks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Tier table for a token, ordered by numeric tier key.
    pub fn tier_table(&self, token: &str) -> Result<Option<TierTable>, SnapshotError> {
        let Some(tiers) = self.get(token).and_then(|entry| entry.tiers.as_ref()) else {
            return Ok(None);
        };

        let mut ordered: Vec<(usize, &TierEntry)> = Vec::with_capacity(tiers.len());
        for (key, entry) in tiers {
            let index = key.parse().map_err(|_| SnapshotError::InvalidTiers {
                reason: format!("non-numeric tier key '{}'", key),
            })?;
            ordered.push((index, entry));
        }
        ordered.sort_by_key(|(index, _)| *index);

        if ordered.iter().enumerate().any(|(i, (index, _))| i != *index) {
            return Err(SnapshotError::InvalidTiers {
                reason: "tier keys must be contiguous from 0".to_string(),
            });
        }

        let table = TierTable::new(
            ordered
                .into_iter()
                .map(|(_, entry)| Tier {
                    min_tokens: entry.min_tokens,
                    pool_weight: entry.pool_weight,
                })
                .collect(),
        )?;
        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> TokenRegistry {
        let raw = r#"{
            "SFUND": {
                "TIERS": {
                    "0": { "MIN_TOKENS": 0, "POOL_WEIGHT": 0 },
                    "1": { "MIN_TOKENS": 100, "POOL_WEIGHT": 10 },
                    "2": { "MIN_TOKENS": 500, "POOL_WEIGHT": 20 }
                },
                "BSC": {
                    "contract": "0x0000000000000000000000000000000000000010",
                    "lp_contract": "0x0000000000000000000000000000000000000011",
                    "stake": [
                        { "name": "Stake Pool 1", "contract": "0x0000000000000000000000000000000000000012", "multiplier": 100 }
                    ],
                    "farm": [
                        { "name": "Farm Pool 1", "contract": "0x0000000000000000000000000000000000000013", "multiplier": 150 }
                    ]
                }
            },
            "OTHER": {
                "BSC": {
                    "contract": "0x0000000000000000000000000000000000000020",
                    "stake": [],
                    "farm": []
                }
            }
        }"#;
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_parse_registry() {
        let registry = sample();
        assert_eq!(registry.token_names(), vec!["OTHER", "SFUND"]);
        assert_eq!(registry.networks_of("SFUND"), vec!["BSC"]);

        let entry = registry.get("SFUND").unwrap();
        let network = &entry.networks["BSC"];
        assert_eq!(network.stake.len(), 1);
        assert_eq!(network.farm[0].multiplier, dec!(150));
    }

    #[test]
    fn test_tier_table_ordered_by_key() {
        let registry = sample();
        let table = registry.tier_table("SFUND").unwrap().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.classify(dec!(500)).tier, 2);
    }

    #[test]
    fn test_tier_table_absent() {
        let registry = sample();
        assert!(registry.tier_table("OTHER").unwrap().is_none());
    }

    #[test]
    fn test_tiers_key_excluded_from_networks() {
        // The TIERS block must not be mistaken for a network.
        let registry = sample();
        assert!(!registry.networks_of("SFUND").contains(&"TIERS".to_string()));
    }
}
