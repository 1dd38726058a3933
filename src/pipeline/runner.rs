//! Snapshot run orchestration
//!
//! Drives one token's snapshot: per network, resolve the snapshot block,
//! discover pools (farms with LP history, stakes, cross-token farms holding
//! the target token), build the exclusion list, then fetch-and-calculate
//! each pool. Pool failures are isolated; a failed pool contributes no
//! columns instead of corrupting the merge.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};

use crate::cli::PoolFilter;
use crate::config::{Secrets, Settings};
use crate::fetch_core::explorer::{ExplorerClient, RawTransfer, TransferSource, TXN_BATCH_SIZE};
use crate::fetch_core::kyc::KycClient;
use crate::fetch_core::rpc::{PairStateSource, RpcClient};
use crate::registry::{PoolDef, TokenRegistry};
use crate::snapshot_core::address;
use crate::snapshot_core::accumulator::accumulate;
use crate::snapshot_core::error::SnapshotError;
use crate::snapshot_core::filter::filter_events;
use crate::snapshot_core::lp_ratio::{LpRatioSample, LpRatioSeries};
use crate::snapshot_core::merge::WideTable;
use crate::snapshot_core::points::{build_pool_snapshot, PoolSnapshot};
use crate::snapshot_core::types::{CheckpointSeries, PoolKind, PoolSpec, TransferEvent};
use crate::store::kyc_export::{write_kyc_export, KYC_EXPORT_FILENAME};
use crate::store::{ensure_dir, is_stale, report, LpCache, TxnCache};

use super::context::RunContext;
use super::PipelineError;

const KYC_MAX_AGE_HOURS: u64 = 12;

pub fn raw_snapshot_filename(token: &str, filter: PoolFilter) -> String {
    match filter.file_tag() {
        Some(tag) => format!("Raw_{}_{}_Snapshot.csv", token, tag),
        None => format!("Raw_{}_Snapshot.csv", token),
    }
}

pub fn network_snapshot_filename(token: &str, network: &str, filter: PoolFilter) -> String {
    match filter.file_tag() {
        Some(tag) => format!("{}_{}_{}_Snapshot.csv", token, network, tag),
        None => format!("{}_{}_Snapshot.csv", token, network),
    }
}

pub struct SnapshotRun<'a> {
    pub settings: &'a Settings,
    pub registry: &'a TokenRegistry,
    pub secrets: &'a Secrets,
    pub pool_filter: PoolFilter,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl SnapshotRun<'_> {
    /// Snapshot one token across all of its networks and write the raw
    /// project-wide table.
    pub async fn run_token(
        &self,
        token_name: &str,
        snapshot_dt: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let points_enabled = self.settings.ssp_period > 1
            && self.settings.points_token.as_deref() == Some(token_name);
        let period = if points_enabled { self.settings.ssp_period } else { 1 };
        let snapshot_ts = snapshot_dt.timestamp();
        let checkpoints = CheckpointSeries::daily(snapshot_ts, period, self.settings.day_secs);

        if points_enabled {
            log::info!(
                "* Points window: {} days ending {}",
                period,
                snapshot_dt.format("%d %b %Y %H:%M:%S")
            );
        }

        let mut project = WideTable::new();
        for network in self.registry.networks_of(token_name) {
            match self
                .run_network(token_name, &network, &checkpoints, points_enabled)
                .await
            {
                Ok(Some(net_table)) => {
                    let filename = network_snapshot_filename(token_name, &network, self.pool_filter);
                    report::write_wide_table(&self.output_dir.join(&filename), &net_table)?;
                    log::info!("** Saved as: {}", filename);
                    project.merge_network(&network, token_name, &net_table)?;
                }
                Ok(None) => {
                    log::warn!("No pool produced columns for {} on {}", token_name, network)
                }
                Err(e) => {
                    log::error!("❌ Snapshot failed for {} on {}: {}", token_name, network, e)
                }
            }
        }

        if project.is_empty() {
            log::warn!("Nothing to write for {}", token_name);
            return Ok(());
        }

        let tiers = self.registry.tier_table(token_name)?;
        if tiers.is_some() {
            log::info!("* Calculating tiers and points");
        }
        project.process_tiers(token_name, tiers.as_ref(), points_enabled)?;

        let filename = raw_snapshot_filename(token_name, self.pool_filter);
        report::write_wide_table(&self.output_dir.join(&filename), &project)?;
        log::info!("** Saved as: {}", filename);

        if self.settings.points_token.as_deref() == Some(token_name) {
            self.refresh_kyc_export().await;
        }

        Ok(())
    }

    async fn run_network(
        &self,
        token_name: &str,
        network: &str,
        checkpoints: &CheckpointSeries,
        points_enabled: bool,
    ) -> Result<Option<WideTable>, PipelineError> {
        let entry = self
            .registry
            .get(token_name)
            .ok_or_else(|| PipelineError::Fatal(format!("unknown token '{}'", token_name)))?;
        let net_cfg = entry.networks.get(network).ok_or_else(|| {
            PipelineError::Fatal(format!("token '{}' has no '{}' entry", token_name, network))
        })?;
        let net_settings = self.settings.networks.get(network).ok_or_else(|| {
            PipelineError::Fatal(format!("no settings for network '{}'", network))
        })?;

        let call_delay = Duration::from_millis(self.settings.api_call_delay_ms);
        // Networks with a chain id go through the multichain endpoint.
        let (api_url, api_key) = if net_settings.chain_id.is_empty() {
            (
                net_settings.api_url.clone().ok_or_else(|| {
                    PipelineError::Fatal(format!("no explorer API URL for '{}'", network))
                })?,
                net_settings.api_key.clone().unwrap_or_default(),
            )
        } else {
            (
                self.settings.multichain_api_url.clone().ok_or_else(|| {
                    PipelineError::Fatal("multichain API URL is not configured".to_string())
                })?,
                self.secrets.multichain_api_key.clone().unwrap_or_default(),
            )
        };
        let explorer =
            ExplorerClient::new(api_url, api_key, net_settings.chain_id.clone(), call_delay)?;
        let rpc = if net_settings.rpc_nodes.is_empty() {
            None
        } else {
            Some(RpcClient::new(
                net_settings.rpc_nodes.clone(),
                self.settings.max_rpc_tries,
                call_delay,
            )?)
        };

        let pair_source: Option<&dyn PairStateSource> = rpc.as_ref().map(|client| client as _);

        let snapshot_block = explorer.block_by_time(checkpoints.last()).await?;

        log::info!("* Snapshot Details *");
        log::info!("   Token: {} (on {} chain)", token_name, network);
        log::info!("   Timestamp: {}", checkpoints.last());
        log::info!("   Block: {}", snapshot_block);

        let ctx = RunContext {
            token_name: token_name.to_string(),
            network: network.to_string(),
            snapshot_timestamp: checkpoints.last(),
            snapshot_block,
            checkpoints: checkpoints.clone(),
            points_enabled,
        };

        let token_dir = ensure_dir(&self.data_dir, &format!("{}_{}", token_name, network))?;

        let token_contract = address::normalize(&net_cfg.contract).ok_or(
            SnapshotError::InvalidAddress {
                input: net_cfg.contract.clone(),
            },
        )?;
        let lp_contract = net_cfg.lp_contract.as_deref().and_then(address::normalize);

        let mut exclude: HashSet<Address> = self
            .settings
            .exclude
            .iter()
            .filter_map(|raw| address::normalize(raw))
            .collect();

        log::info!("* Gathering data");
        let mut pools: Vec<(PoolSpec, Option<LpRatioSeries>)> = Vec::new();

        if self.pool_filter.includes_farm() {
            if let Some(lp) = lp_contract {
                let lp_history = self
                    .resolve_lp_history(&explorer, pair_source, &ctx, lp, token_contract, &token_dir)
                    .await;
                log::info!("** Collecting info on farm contracts");
                for def in &net_cfg.farm {
                    if let Some(spec) = query_pool(&explorer, def, PoolKind::Farm, lp).await {
                        add_exclusions(&mut exclude, &spec);
                        pools.push((spec, lp_history.clone()));
                    }
                }
            } else if !net_cfg.farm.is_empty() {
                log::warn!(
                    "Farm pools configured without an LP contract on {}, skipping them",
                    network
                );
            }
        }

        if self.pool_filter.includes_stake() {
            log::info!("** Collecting info on stake contracts");
            for def in &net_cfg.stake {
                if let Some(spec) = query_pool(&explorer, def, PoolKind::Stake, token_contract).await
                {
                    add_exclusions(&mut exclude, &spec);
                    pools.push((spec, None));
                }
            }
        }

        if self.pool_filter.includes_farm() {
            log::info!(
                "** Collecting info on possible farm contracts with {} in them",
                token_name
            );
            for (other_name, other_entry) in
                self.registry.0.iter().filter(|(name, _)| *name != token_name)
            {
                let Some(other_cfg) = other_entry.networks.get(network) else {
                    continue;
                };
                let Some(other_lp) = other_cfg.lp_contract.as_deref().and_then(address::normalize)
                else {
                    continue;
                };
                let lp_history = self
                    .resolve_lp_history(
                        &explorer,
                        pair_source,
                        &ctx,
                        other_lp,
                        token_contract,
                        &token_dir,
                    )
                    .await;
                if lp_history.is_none() {
                    continue;
                }
                for def in &other_cfg.farm {
                    if let Some(spec) = query_pool(&explorer, def, PoolKind::Farm, other_lp).await {
                        log::info!("*** {} farm '{}' holds {}", other_name, spec.name, token_name);
                        add_exclusions(&mut exclude, &spec);
                        pools.push((spec, lp_history.clone()));
                    }
                }
            }
        }

        log::info!("* Processing {} pools/contracts", pools.len());
        let mut snapshots: Vec<PoolSnapshot> = Vec::new();
        for (spec, lp_history) in &pools {
            match self
                .snapshot_pool(&explorer, &ctx, spec, lp_history.as_ref(), &token_dir, &exclude)
                .await
            {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => log::error!("❌ Pool '{}' failed: {}", spec.name, e),
            }
        }

        Ok(WideTable::from_pool_snapshots(token_name, &snapshots))
    }

    /// Fetch, filter and accumulate one pool into its snapshot columns.
    pub async fn snapshot_pool(
        &self,
        explorer: &dyn TransferSource,
        ctx: &RunContext,
        pool: &PoolSpec,
        lp_history: Option<&LpRatioSeries>,
        token_dir: &Path,
        exclude: &HashSet<Address>,
    ) -> Result<PoolSnapshot, PipelineError> {
        log::info!("   Pool: {} ({})", pool.name, pool.kind.as_str());
        log::info!("   Contract: {}", address::checksum(&pool.contract));
        if ctx.points_enabled {
            log::info!("   Points Multiplier: {}", pool.multiplier);
        }

        let cache = TxnCache::for_pool(token_dir, &pool.contract);
        let events =
            fetch_pool_events(&cache, explorer, pool.contract, pool.target_token, ctx.snapshot_block)
                .await?;

        let filtered = filter_events(&pool.name, &events, exclude)?;
        log::info!(
            "* Processing {} deltas for {} unique wallets",
            filtered.deltas.len(),
            filtered.wallets.len()
        );

        let table = accumulate(&filtered, &ctx.checkpoints);

        match build_pool_snapshot(&ctx.token_name, pool, &table, lp_history, ctx.points_enabled) {
            Ok(snapshot) => Ok(snapshot),
            Err(SnapshotError::MissingRatio { timestamp }) => {
                log::warn!(
                    "LP ratio unavailable at {}, keeping '{}' unconverted",
                    timestamp,
                    pool.name
                );
                Ok(build_pool_snapshot(
                    &ctx.token_name,
                    pool,
                    &table,
                    None,
                    ctx.points_enabled,
                )?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the LP ratio cache and back-fill missing checkpoints.
    ///
    /// Returns `None` when the pair does not contain the target token or
    /// nothing at all could be resolved; partial series are returned (and
    /// persisted) so the pool can degrade to unconverted downstream.
    pub async fn resolve_lp_history(
        &self,
        explorer: &dyn TransferSource,
        pair_source: Option<&dyn PairStateSource>,
        ctx: &RunContext,
        lp: Address,
        token: Address,
        token_dir: &Path,
    ) -> Option<LpRatioSeries> {
        log::info!("** Checking historical LP values for {}", address::checksum(&lp));

        let cache = LpCache::for_contract(token_dir, &lp);
        let mut series = match cache.load() {
            Ok(series) => series,
            Err(e) => {
                log::warn!("LP cache unreadable ({}), starting empty", e);
                LpRatioSeries::new()
            }
        };

        // Checkpoints before the pair existed can never have a sample.
        let creation = match explorer.creation_timestamp(lp).await {
            Ok(ts) => ts,
            Err(e) => {
                log::warn!("Could not resolve creation time of {}: {}", address::checksum(&lp), e);
                None
            }
        };
        let wanted: Vec<i64> = ctx
            .checkpoints
            .as_slice()
            .iter()
            .copied()
            .filter(|ts| creation.map_or(true, |c| *ts >= c))
            .collect();
        if wanted.is_empty() {
            return None;
        }

        let missing: Vec<i64> = wanted
            .iter()
            .copied()
            .filter(|ts| !series.contains(*ts))
            .collect();
        if missing.is_empty() {
            log::info!("*** We already have the most up-to-date data");
            return Some(series);
        }

        let Some(pair_source) = pair_source else {
            log::warn!(
                "No RPC nodes configured for {}, cannot back-fill LP history",
                ctx.network
            );
            return (!series.is_empty()).then_some(series);
        };

        let (token0, token1) = match pair_source.pair_tokens(lp).await {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("Could not read pair tokens of {}: {}", address::checksum(&lp), e);
                return (!series.is_empty()).then_some(series);
            }
        };
        let reserve_index = if token0 == token {
            0
        } else if token1 == token {
            1
        } else {
            log::info!(
                "**** Skipping LP token {}, target token is not part of the pair",
                address::checksum(&lp)
            );
            return None;
        };

        log::info!(
            "*** Fetching {} missing LP samples for {}",
            missing.len(),
            address::checksum(&lp)
        );
        for ts in missing {
            let block = match explorer.block_by_time(ts).await {
                Ok(block) => block,
                Err(e) => {
                    log::warn!("Could not resolve block for {}: {}", ts, e);
                    continue;
                }
            };
            match pair_source.supply_and_reserve(lp, block, reserve_index).await {
                Ok((lp_supply, token_reserve)) => {
                    series.insert(
                        ts,
                        LpRatioSample {
                            lp_supply,
                            token_reserve,
                        },
                    );
                }
                Err(e) => log::warn!("Could not sample LP state at {}: {}", ts, e),
            }
        }

        // Persist whatever resolved, even when gaps remain.
        if let Err(e) = cache.store(&series) {
            log::warn!("Could not persist LP cache: {}", e);
        }

        (!series.is_empty()).then_some(series)
    }

    /// Refresh the on-disk KYC export unless it is still fresh.
    async fn refresh_kyc_export(&self) {
        log::info!("* Checking KYC data");
        let path = self.data_dir.join(KYC_EXPORT_FILENAME);
        if !is_stale(&path, KYC_MAX_AGE_HOURS) {
            log::info!(
                "** Last KYC download was less than {} hours ago, no need to download again",
                KYC_MAX_AGE_HOURS
            );
            return;
        }

        log::info!("** Fetching KYC data from provider");
        let client = match KycClient::new(
            self.secrets.kyc_api_url.clone(),
            self.secrets.kyc_api_key.clone(),
            self.secrets.kyc_client_id.clone(),
        ) {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Could not build KYC client: {}", e);
                return;
            }
        };

        match client.fetch_all().await {
            Ok(records) => match write_kyc_export(&path, &records) {
                Ok(()) => log::info!("*** Saved {} KYC records", records.len()),
                Err(e) => log::warn!("Could not save KYC export: {}", e),
            },
            Err(e) => log::warn!("KYC export fetch failed: {}", e),
        }
    }
}

async fn query_pool(
    explorer: &dyn TransferSource,
    def: &PoolDef,
    kind: PoolKind,
    target_token: Address,
) -> Option<PoolSpec> {
    let Some(contract) = address::normalize(&def.contract) else {
        log::error!("! Pool contract address is invalid - pool: {}", def.name);
        return None;
    };
    let owner = match explorer.contract_creator(contract).await {
        Ok(owner) => owner,
        Err(e) => {
            log::warn!("Could not resolve owner of '{}': {}", def.name, e);
            None
        }
    };
    if owner.is_none() {
        log::warn!("! Pool contract owner is empty - pool: {}", def.name);
    }

    Some(PoolSpec {
        name: def.name.clone(),
        contract,
        multiplier: def.multiplier,
        owner,
        target_token,
        kind,
    })
}

fn add_exclusions(exclude: &mut HashSet<Address>, pool: &PoolSpec) {
    exclude.insert(pool.contract);
    if let Some(owner) = pool.owner {
        exclude.insert(owner);
    }
}

/// Extend the per-pool transfer cache up to the snapshot block.
///
/// Resumes from the highest cached block (re-reading it to catch
/// stragglers), pages in explorer batches, deduplicates, and rewrites the
/// cache only when new rows arrived.
pub async fn fetch_pool_events(
    cache: &TxnCache,
    source: &dyn TransferSource,
    pool: Address,
    token: Address,
    end_block: u64,
) -> Result<Vec<TransferEvent>, PipelineError> {
    let mut events = cache.load()?;
    let cached_count = events.len();
    let mut start_block = TxnCache::last_block(&events);

    log::info!("* Checking transactions");
    if start_block <= end_block {
        log::info!("* Fetching new transactions");
    }

    while start_block <= end_block {
        let batch = source
            .token_transfers(Some(pool), token, start_block, end_block)
            .await?;
        if batch.is_empty() {
            break;
        }

        let batch_len = batch.len();
        let last_batch_block: u64 = batch
            .last()
            .and_then(|raw| raw.block_number.trim().parse().ok())
            .unwrap_or(end_block);
        events.extend(batch.iter().filter_map(RawTransfer::to_event));

        if batch_len < TXN_BATCH_SIZE {
            break;
        }
        if last_batch_block <= start_block {
            // A full batch inside one block cannot advance the cursor.
            break;
        }
        start_block = last_batch_block;
    }

    let events = TxnCache::dedupe(events);
    if events.len() > cached_count {
        log::info!("** Fetched {} new transfers", events.len() - cached_count);
        cache.store(&events)?;
    } else {
        log::info!("** We already have the most up-to-date data");
    }

    Ok(events)
}
