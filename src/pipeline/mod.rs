//! Pipeline orchestration
//!
//! Entry point for a full run: load configuration, resolve the snapshot
//! instant, then either compute a fresh snapshot (per token, per network,
//! per pool) or combine a previous one into a project whitelist.

pub mod context;
pub mod project;
pub mod runner;

use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;

use crate::cli;
use crate::config::{ConfigError, Secrets, Settings};
use crate::fetch_core::backend::BackendClient;
use crate::fetch_core::FetchError;
use crate::registry::TokenRegistry;
use crate::snapshot_core::error::SnapshotError;
use crate::store::{ensure_dir, StoreError};

pub use context::RunContext;
pub use project::ProjectRun;
pub use runner::SnapshotRun;

const NOTIFY_POLL_DELAY_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Run-level fatal condition; terminates with a printed diagnostic.
    #[error("{0}")]
    Fatal(String),
}

pub async fn run(args: cli::Args) -> Result<(), PipelineError> {
    let started = Instant::now();

    log::info!("* Importing config files");
    let mut settings = Settings::load(&args.config_file)?;
    settings.apply_env();
    let registry = TokenRegistry::load(&args.tokens_file)?;

    log::info!("* Checking required variables");
    let secrets = Secrets::from_env()?;
    log::info!("** All required variables are set");

    let main_dir = std::env::current_dir()?;
    let output_dir = ensure_dir(&main_dir, &settings.output_dir)?;
    let data_dir = ensure_dir(&main_dir, &settings.data_dir)?;

    let snapshot_dt = cli::resolve_snapshot_datetime(args.date.as_deref(), &args.hour, Utc::now())?;

    let token_name = match &args.token {
        Some(raw) => {
            let upper = raw.to_uppercase();
            if registry.get(&upper).is_some() {
                upper
            } else {
                let fallback = registry.token_names().remove(0);
                log::warn!("Unknown token '{}', falling back to '{}'", raw, fallback);
                fallback
            }
        }
        None => registry.token_names().remove(0),
    };

    log::info!("* Target token: {}", token_name);
    log::info!("* Snapshot date: {}", snapshot_dt.format("%d.%m.%Y %H:%M:%S"));

    match &args.project_id {
        None => {
            let run = SnapshotRun {
                settings: &settings,
                registry: &registry,
                secrets: &secrets,
                pool_filter: args.pools,
                data_dir: data_dir.clone(),
                output_dir: output_dir.clone(),
            };
            run.run_token(&token_name, snapshot_dt).await?;
        }
        Some(project_id) => {
            let run = ProjectRun {
                settings: &settings,
                registry: &registry,
                secrets: &secrets,
                pool_filter: args.pools,
                data_dir: data_dir.clone(),
                output_dir: output_dir.clone(),
            };
            run.run(&token_name, project_id).await?;
        }
    }

    if let Some(post_api_key) = &secrets.backend_post_api_key {
        log::info!("* Triggering snapshot data update on backend");
        let backend = BackendClient::new(
            secrets.backend_api_url.clone(),
            secrets.backend_get_api_key.clone(),
        )?;
        match backend
            .notify_snapshot(
                post_api_key,
                snapshot_dt.timestamp(),
                Duration::from_secs(NOTIFY_POLL_DELAY_SECS),
            )
            .await
        {
            Ok(true) => log::info!("** Snapshot data update is complete"),
            Ok(false) => log::error!("! Backend did not confirm the snapshot update"),
            Err(e) => log::error!("! Backend snapshot update failed: {}", e),
        }
    }

    log::info!("* Snapshot process is complete");
    log::info!("Execution time: {:.2} seconds", started.elapsed().as_secs_f64());

    Ok(())
}
