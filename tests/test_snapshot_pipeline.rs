//! End-to-end pipeline tests against in-memory collaborators
//!
//! Exercises the fetch-cache-calculate path the production runner uses,
//! with fake explorer and pair-state sources instead of the network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_primitives::{address, Address};
use async_trait::async_trait;
use rust_decimal_macros::dec;

use tiersnap::cli::PoolFilter;
use tiersnap::config::{Secrets, Settings};
use tiersnap::fetch_core::explorer::{RawTransfer, TransferSource};
use tiersnap::fetch_core::rpc::PairStateSource;
use tiersnap::fetch_core::FetchError;
use tiersnap::pipeline::runner::{fetch_pool_events, SnapshotRun};
use tiersnap::pipeline::RunContext;
use tiersnap::registry::TokenRegistry;
use tiersnap::snapshot_core::merge::{ColumnRole, WideTable};
use tiersnap::snapshot_core::types::{CheckpointSeries, PoolKind, PoolSpec};
use tiersnap::store::TxnCache;

const POOL: Address = address!("00000000000000000000000000000000000000aa");
const LP_CONTRACT: Address = address!("0000000000000000000000000000000000000011");
const TOKEN: Address = address!("0000000000000000000000000000000000000010");
const OTHER_TOKEN: Address = address!("0000000000000000000000000000000000000020");
const WALLET_X: Address = address!("00000000000000000000000000000000000000b1");
const WALLET_Y: Address = address!("00000000000000000000000000000000000000b2");
const OWNER: Address = address!("00000000000000000000000000000000000000ee");

const UNIT: u128 = 1_000_000_000_000_000_000;

fn raw_transfer(block: u64, timestamp: i64, from: Address, to: Address, tokens: u128) -> RawTransfer {
    RawTransfer {
        block_number: block.to_string(),
        time_stamp: timestamp.to_string(),
        from: from.to_checksum(None),
        to: to.to_checksum(None),
        value: (tokens * UNIT).to_string(),
    }
}

/// Explorer fake serving a fixed transfer list, counting list calls.
struct FakeExplorer {
    transfers: Vec<RawTransfer>,
    list_calls: AtomicUsize,
}

impl FakeExplorer {
    fn new(transfers: Vec<RawTransfer>) -> Self {
        Self {
            transfers,
            list_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TransferSource for FakeExplorer {
    async fn token_transfers(
        &self,
        _holder: Option<Address>,
        _token: Address,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawTransfer>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transfers
            .iter()
            .filter(|raw| {
                let block: u64 = raw.block_number.parse().unwrap();
                block >= start_block && block <= end_block
            })
            .cloned()
            .collect())
    }

    async fn block_by_time(&self, timestamp: i64) -> Result<u64, FetchError> {
        // Blocks are minted one per second in this fake chain.
        Ok(timestamp as u64)
    }

    async fn contract_creator(&self, _contract: Address) -> Result<Option<Address>, FetchError> {
        Ok(Some(OWNER))
    }

    async fn creation_timestamp(&self, _contract: Address) -> Result<Option<i64>, FetchError> {
        Ok(Some(0))
    }
}

/// Pair-state fake: supply 10, reserve grows with the block number.
struct FakePairState;

#[async_trait]
impl PairStateSource for FakePairState {
    async fn pair_tokens(&self, _lp: Address) -> Result<(Address, Address), FetchError> {
        Ok((TOKEN, OTHER_TOKEN))
    }

    async fn supply_and_reserve(
        &self,
        _lp: Address,
        block: u64,
        reserve_index: usize,
    ) -> Result<(u128, u128), FetchError> {
        assert_eq!(reserve_index, 0, "target token is token0 in this fake");
        Ok((10, 10 + block as u128))
    }
}

fn test_settings() -> Settings {
    serde_json::from_str("{}").unwrap()
}

fn test_secrets() -> Secrets {
    Secrets {
        kyc_api_url: "http://localhost/kyc".to_string(),
        kyc_api_key: "k".to_string(),
        kyc_client_id: "c".to_string(),
        backend_api_url: "http://localhost/backend".to_string(),
        backend_get_api_key: "g".to_string(),
        backend_post_api_key: None,
        multichain_api_key: None,
    }
}

fn test_registry() -> TokenRegistry {
    serde_json::from_str(
        r#"{
            "SFUND": {
                "BSC": {
                    "contract": "0x0000000000000000000000000000000000000010",
                    "stake": [],
                    "farm": []
                }
            }
        }"#,
    )
    .unwrap()
}

fn run_context(checkpoints: Vec<i64>, points_enabled: bool) -> RunContext {
    let checkpoints = CheckpointSeries::new(checkpoints).unwrap();
    RunContext {
        token_name: "SFUND".to_string(),
        network: "BSC".to_string(),
        snapshot_timestamp: checkpoints.last(),
        snapshot_block: checkpoints.last() as u64,
        checkpoints,
        points_enabled,
    }
}

fn stake_pool_spec() -> PoolSpec {
    PoolSpec {
        name: "Stake Pool 1".to_string(),
        contract: POOL,
        multiplier: dec!(100),
        owner: Some(OWNER),
        target_token: TOKEN,
        kind: PoolKind::Stake,
    }
}

#[tokio::test]
async fn test_snapshot_pool_end_to_end() {
    let settings = test_settings();
    let registry = test_registry();
    let secrets = test_secrets();
    let data_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let run = SnapshotRun {
        settings: &settings,
        registry: &registry,
        secrets: &secrets,
        pool_filter: PoolFilter::All,
        data_dir: data_dir.path().to_path_buf(),
        output_dir: output_dir.path().to_path_buf(),
    };

    let explorer = FakeExplorer::new(vec![
        raw_transfer(10, 10, WALLET_X, POOL, 600),
        raw_transfer(150, 150, WALLET_Y, POOL, 90),
        raw_transfer(250, 250, POOL, WALLET_X, 100),
    ]);

    let ctx = run_context(vec![100, 200, 300], true);
    let exclude: HashSet<Address> = [POOL, OWNER].into_iter().collect();

    let snapshot = run
        .snapshot_pool(
            &explorer,
            &ctx,
            &stake_pool_spec(),
            None,
            data_dir.path(),
            &exclude,
        )
        .await
        .unwrap();

    let network = WideTable::from_pool_snapshots("SFUND", &[snapshot]).unwrap();
    assert_eq!(
        network.value(&WALLET_X, ColumnRole::TotalStaked),
        Some(dec!(500))
    );
    assert_eq!(
        network.value(&WALLET_Y, ColumnRole::TotalStaked),
        Some(dec!(90))
    );
    // Interior balances 600 + 600 at multiplier 100%.
    assert_eq!(
        network.value(&WALLET_X, ColumnRole::TotalPoints),
        Some(dec!(1200))
    );
}

#[tokio::test]
async fn test_fetch_pool_events_caches_incrementally() {
    let data_dir = tempfile::tempdir().unwrap();
    let cache = TxnCache::for_pool(data_dir.path(), &POOL);

    let explorer = FakeExplorer::new(vec![
        raw_transfer(10, 10, WALLET_X, POOL, 1),
        raw_transfer(20, 20, WALLET_X, POOL, 2),
    ]);

    let events = fetch_pool_events(&cache, &explorer, POOL, TOKEN, 300)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(cache.path().exists());

    // Second run resumes from the cached tip and deduplicates the overlap.
    let events = fetch_pool_events(&cache, &explorer, POOL, TOKEN, 300)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(explorer.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_snapshot_pool_empty_events_fails_per_pool() {
    let settings = test_settings();
    let registry = test_registry();
    let secrets = test_secrets();
    let data_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let run = SnapshotRun {
        settings: &settings,
        registry: &registry,
        secrets: &secrets,
        pool_filter: PoolFilter::All,
        data_dir: data_dir.path().to_path_buf(),
        output_dir: output_dir.path().to_path_buf(),
    };

    let explorer = FakeExplorer::new(Vec::new());
    let ctx = run_context(vec![100], false);

    let result = run
        .snapshot_pool(
            &explorer,
            &ctx,
            &stake_pool_spec(),
            None,
            data_dir.path(),
            &HashSet::new(),
        )
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_resolve_lp_history_backfills_and_persists() {
    let settings = test_settings();
    let registry = test_registry();
    let secrets = test_secrets();
    let data_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let run = SnapshotRun {
        settings: &settings,
        registry: &registry,
        secrets: &secrets,
        pool_filter: PoolFilter::All,
        data_dir: data_dir.path().to_path_buf(),
        output_dir: output_dir.path().to_path_buf(),
    };

    let explorer = FakeExplorer::new(Vec::new());
    let pair_state = FakePairState;
    let ctx = run_context(vec![100, 200], false);

    let series = run
        .resolve_lp_history(
            &explorer,
            Some(&pair_state),
            &ctx,
            LP_CONTRACT,
            TOKEN,
            data_dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 2);
    // Reserve = 10 + block, supply = 10.
    assert_eq!(series.ratio_at(100), Some(dec!(11)));
    assert_eq!(series.ratio_at(200), Some(dec!(21)));

    // A second resolve finds the cache complete and refetches nothing.
    let again = run
        .resolve_lp_history(&explorer, None, &ctx, LP_CONTRACT, TOKEN, data_dir.path())
        .await
        .unwrap();
    assert_eq!(again, series);
}

#[tokio::test]
async fn test_lp_pair_without_target_token_is_skipped() {
    struct ForeignPair;

    #[async_trait]
    impl PairStateSource for ForeignPair {
        async fn pair_tokens(&self, _lp: Address) -> Result<(Address, Address), FetchError> {
            Ok((OTHER_TOKEN, OTHER_TOKEN))
        }

        async fn supply_and_reserve(
            &self,
            _lp: Address,
            _block: u64,
            _reserve_index: usize,
        ) -> Result<(u128, u128), FetchError> {
            unreachable!("pair without the target token must not be sampled")
        }
    }

    let settings = test_settings();
    let registry = test_registry();
    let secrets = test_secrets();
    let data_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let run = SnapshotRun {
        settings: &settings,
        registry: &registry,
        secrets: &secrets,
        pool_filter: PoolFilter::All,
        data_dir: data_dir.path().to_path_buf(),
        output_dir: output_dir.path().to_path_buf(),
    };

    let explorer = FakeExplorer::new(Vec::new());
    let ctx = run_context(vec![100], false);

    let series = run
        .resolve_lp_history(
            &explorer,
            Some(&ForeignPair),
            &ctx,
            LP_CONTRACT,
            TOKEN,
            data_dir.path(),
        )
        .await;

    assert!(series.is_none());
}
