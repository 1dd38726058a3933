//! Project whitelist flow
//!
//! Combines a previously created raw snapshot with the KYC export, IDO
//! registration and wallet-delegation data, recomputes tiers, and writes
//! the combined snapshot, the whitelist and the per-tier wallet files.

use std::path::PathBuf;

use alloy_primitives::Address;

use crate::cli::PoolFilter;
use crate::config::{Secrets, Settings};
use crate::fetch_core::backend::BackendClient;
use crate::registry::TokenRegistry;
use crate::snapshot_core::merge::resolve_kyc_records;
use crate::store::kyc_export::KYC_EXPORT_FILENAME;
use crate::store::{ensure_dir, read_kyc_export, report};

use super::runner::raw_snapshot_filename;
use super::PipelineError;

pub struct ProjectRun<'a> {
    pub settings: &'a Settings,
    pub registry: &'a TokenRegistry,
    pub secrets: &'a Secrets,
    pub pool_filter: PoolFilter,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ProjectRun<'_> {
    pub async fn run(&self, token_name: &str, project_id: &str) -> Result<(), PipelineError> {
        let points_enabled = self.settings.ssp_period > 1
            && self.settings.points_token.as_deref() == Some(token_name);

        let filename = raw_snapshot_filename(token_name, self.pool_filter);
        let path = self.output_dir.join(&filename);
        if !path.exists() {
            return Err(PipelineError::Fatal(format!(
                "couldn't locate previously created raw snapshot file -> {}",
                filename
            )));
        }

        let mut table = report::read_wide_table(&path, token_name)?;
        if table.is_empty() {
            return Err(PipelineError::Fatal(format!(
                "raw snapshot {} holds no wallets",
                filename
            )));
        }

        log::info!("Project ID: {}", project_id);

        log::info!("* Loading KYC data");
        let kyc_path = self.data_dir.join(KYC_EXPORT_FILENAME);
        let kyc_records = match read_kyc_export(&kyc_path) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("KYC export unreadable ({}), continuing without it", e);
                Vec::new()
            }
        };
        let have_kyc = !kyc_records.is_empty();
        if have_kyc {
            log::info!("* Processing KYC data ({} records)", kyc_records.len());
            table.merge_kyc(&resolve_kyc_records(&kyc_records));
        }

        // Registration data is the reason a project id was requested; its
        // absence is fatal for the whole run.
        log::info!("* Fetching IDO registration data");
        let backend = BackendClient::new(
            self.secrets.backend_api_url.clone(),
            self.secrets.backend_get_api_key.clone(),
        )?;
        let registration = backend.registration_export(project_id).await?;

        let suffix = registration
            .project_name
            .clone()
            .unwrap_or_else(|| project_id.to_string());
        let project_dir = ensure_dir(&self.output_dir, &format!("{}_{}", suffix, project_id))?;

        let have_registration = !registration.wallets.is_empty();
        if have_registration {
            log::info!(
                "* Saving IDO registration data ({} wallets)",
                registration.wallets.len()
            );
            let wallets: Vec<Address> = registration.wallets.iter().copied().collect();
            let reg_filename = format!("{}_IDO_Registration_Export.csv", suffix);
            report::write_wallet_list(&project_dir.join(&reg_filename), &wallets)?;
            log::info!("** Saved as {}", reg_filename);

            table.merge_registration(&registration.wallets);
        }

        log::info!("* Fetching wallet delegation data");
        let delegations = backend.delegation_export().await?;
        if !delegations.is_empty() {
            log::info!("* Saving wallet delegation data ({} wallets)", delegations.len());
            let delegation_filename = format!("{}_Wallet_Delegation_Export.csv", suffix);
            report::write_delegations(&project_dir.join(&delegation_filename), &delegations)?;
            log::info!("** Saved as {}", delegation_filename);

            table.merge_delegation(&delegations, have_kyc, have_registration);
        }

        let tiers = self.registry.tier_table(token_name)?;
        if tiers.is_some() {
            log::info!("* Calculating tiers and points");
        }
        table.process_tiers(token_name, tiers.as_ref(), points_enabled)?;

        log::info!("* Saving combined (kyc + registration + delegation) snapshot");
        let combined_filename = format!("{}_Snapshot.csv", suffix);
        report::write_wide_table(&project_dir.join(&combined_filename), &table)?;
        log::info!("** Saved as: {}", combined_filename);

        log::info!("* Saving whitelist");
        let whitelist = table.whitelist(tiers.is_some())?;
        let whitelist_filename = format!("{}_Whitelist.csv", suffix);
        report::write_wide_table(&project_dir.join(&whitelist_filename), &whitelist)?;
        log::info!(
            "** Saved {} wallets as: {}",
            whitelist.rows.len(),
            whitelist_filename
        );

        if tiers.is_some() {
            log::info!("* Creating tier files");
            for (tier, wallets) in whitelist.tier_groups() {
                let tier_filename = format!("Tier{}_{}.csv", tier, suffix);
                report::write_tier_file(&project_dir.join(&tier_filename), &wallets)?;
                log::info!("** Saved Tier {} wallets to {}", tier, tier_filename);
            }
        }

        Ok(())
    }
}
